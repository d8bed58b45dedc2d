//! The registry of pipeline variants.
//!
//! A variant is described declaratively by a [`VariantDescriptor`]: its name,
//! the positional data-source arguments it takes, its default mix weights, any
//! extra options, and a build function. The command line is generated from these
//! descriptors, and worker processes look the same descriptors up by name.
//!
//! The registry is populated explicitly at startup. To add variants, build a
//! [`PipelineRegistry`] from your own descriptors (usually extending
//! [`builtin_variants`]) and hand it to [`cli::run`](crate::cli::run):
//!
//! ```no_run
//! use ironstream::registry::{
//!     builtin_variants, PipelineRegistry, SourceArity, SourceSpec, VariantDescriptor, WeightSpec,
//! };
//! use ironstream::stage::{StageChain, Tag};
//!
//! let mut variants = builtin_variants();
//! variants.push(VariantDescriptor {
//!     name: "tagged",
//!     description: "Single source with a fixed target-language tag",
//!     sources: SourceArity::Fixed(vec![SourceSpec::new("data", "Chunk directory")]),
//!     weights: WeightSpec::Fixed(vec![1.0]),
//!     options: vec![],
//!     build: |ctx| Ok(StageChain::new().then(Tag::new("<2en> ")).apply(ctx.open_source(0)?)),
//! });
//! let registry = PipelineRegistry::from_descriptors(variants)?;
//! ironstream::cli::run(registry)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::config::{ConfigError, PipelineArgs};
use crate::pipeline::PipelineContext;
use crate::stage::{BitextFilter, CaseMix, RecordStream, StageChain, Tag};
use anyhow::Result;
use std::collections::BTreeMap;

/// Builds a worker's record stream from its context.
pub type BuildFn = fn(&PipelineContext<'_>) -> Result<RecordStream>;

/// One positional data-source argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceSpec {
    pub name: &'static str,
    pub help: &'static str,
}

impl SourceSpec {
    #[must_use]
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self { name, help }
    }
}

/// How many data sources a variant takes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceArity {
    /// Exactly these positional arguments, in order.
    Fixed(Vec<SourceSpec>),
    /// One or more paths collected under a single positional argument.
    Variadic(SourceSpec),
}

/// Default mixing weights.
#[derive(Clone, Debug, PartialEq)]
pub enum WeightSpec {
    /// One weight per fixed source; also fixes how many `--mix-weights` values
    /// the command line accepts.
    Fixed(Vec<f64>),
    /// As many weights as sources given at invocation; uniform when omitted.
    PerSource,
}

/// An extra `--name value` option of a variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OptionSpec {
    pub name: &'static str,
    pub help: &'static str,
    pub default: Option<&'static str>,
    pub required: bool,
}

impl OptionSpec {
    #[must_use]
    pub const fn with_default(name: &'static str, help: &'static str, default: &'static str) -> Self {
        Self {
            name,
            help,
            default: Some(default),
            required: false,
        }
    }

    #[must_use]
    pub const fn required(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            default: None,
            required: true,
        }
    }
}

/// Declarative description of a pipeline variant.
#[derive(Clone)]
pub struct VariantDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub sources: SourceArity,
    pub weights: WeightSpec,
    pub options: Vec<OptionSpec>,
    pub build: BuildFn,
}

impl VariantDescriptor {
    /// Fixed default weights, or `None` for "uniform over the given sources".
    #[must_use]
    pub fn default_weights(&self) -> Option<&[f64]> {
        match &self.weights {
            WeightSpec::Fixed(w) => Some(w),
            WeightSpec::PerSource => None,
        }
    }

    /// Number of sources, if fixed.
    #[must_use]
    pub fn fixed_source_count(&self) -> Option<usize> {
        match &self.sources {
            SourceArity::Fixed(specs) => Some(specs.len()),
            SourceArity::Variadic(_) => None,
        }
    }

    /// `args` with every declared option default filled in where the
    /// invocation left the option out.
    #[must_use]
    pub fn with_option_defaults(&self, args: &PipelineArgs) -> PipelineArgs {
        let mut args = args.clone();
        for option in &self.options {
            if let Some(default) = option.default {
                args.options
                    .entry(option.name.to_string())
                    .or_insert_with(|| default.to_string());
            }
        }
        args
    }

    /// Check the descriptor is self-consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (&self.sources, &self.weights) {
            (SourceArity::Fixed(specs), _) if specs.is_empty() => Err(ConfigError::NoSources),
            (SourceArity::Fixed(specs), WeightSpec::Fixed(w)) if specs.len() != w.len() => {
                Err(ConfigError::WeightCountMismatch {
                    sources: specs.len(),
                    weights: w.len(),
                })
            }
            (SourceArity::Variadic(_), WeightSpec::Fixed(w)) => {
                Err(ConfigError::WeightCountMismatch {
                    sources: 0,
                    weights: w.len(),
                })
            }
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for VariantDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariantDescriptor")
            .field("name", &self.name)
            .field("sources", &self.sources)
            .field("weights", &self.weights)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Name → variant mapping, filled once at startup.
#[derive(Clone, Debug, Default)]
pub struct PipelineRegistry {
    variants: BTreeMap<&'static str, VariantDescriptor>,
}

impl PipelineRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in variants.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_descriptors(builtin_variants())
    }

    pub fn from_descriptors<I>(descriptors: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = VariantDescriptor>,
    {
        let mut registry = Self::new();
        for d in descriptors {
            registry.register(d)?;
        }
        Ok(registry)
    }

    /// Add a variant. Names must be unique and descriptors self-consistent.
    pub fn register(&mut self, descriptor: VariantDescriptor) -> Result<(), ConfigError> {
        descriptor.validate()?;
        if self.variants.contains_key(descriptor.name) {
            return Err(ConfigError::DuplicatePipeline(descriptor.name.to_string()));
        }
        self.variants.insert(descriptor.name, descriptor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&VariantDescriptor, ConfigError> {
        self.variants
            .get(name)
            .ok_or_else(|| ConfigError::UnknownPipeline(name.to_string()))
    }

    /// Registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.variants.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariantDescriptor> {
        self.variants.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

/// The variants shipped with the binary.
#[must_use]
pub fn builtin_variants() -> Vec<VariantDescriptor> {
    vec![
        VariantDescriptor {
            name: "default",
            description: "Stream a single parallel corpus",
            sources: SourceArity::Fixed(vec![SourceSpec::new(
                "parallel_data",
                "Path to parallel data (folder with chunk files)",
            )]),
            weights: WeightSpec::Fixed(vec![1.0]),
            options: vec![ext_option(".gz")],
            build: build_default,
        },
        VariantDescriptor {
            name: "multistream",
            description: "Mix a variable number of data sources.\n\
                          Weights are given with --mix-weights, one per path (default: equal).",
            sources: SourceArity::Variadic(SourceSpec::new(
                "paths",
                "Dataset directories to mix, each holding chunk files ending with --ext",
            )),
            weights: WeightSpec::PerSource,
            options: vec![ext_option(".tsv")],
            build: build_multistream,
        },
        VariantDescriptor {
            name: "example",
            description: "Example pipeline with two data streams",
            sources: SourceArity::Fixed(vec![
                SourceSpec::new("parallel_data", "Path to parallel data (folder with chunk files)"),
                SourceSpec::new(
                    "backtrans_data",
                    "Path to backtranslation data (folder with chunk files)",
                ),
            ]),
            weights: WeightSpec::Fixed(vec![0.5, 0.5]),
            options: vec![
                ext_option(".gz"),
                OptionSpec::with_default("tag", "Tag prepended to backtranslated sources", "<FR>"),
            ],
            build: build_example,
        },
    ]
}

const fn ext_option(default: &'static str) -> OptionSpec {
    OptionSpec::with_default("ext", "Extension of the chunk files inside data directories", default)
}

fn build_default(ctx: &PipelineContext<'_>) -> Result<RecordStream> {
    ctx.open_source(0)
}

fn build_multistream(ctx: &PipelineContext<'_>) -> Result<RecordStream> {
    let streams = ctx.open_all_sources()?;
    ctx.mix(streams)
}

/// Proportions of unchanged / lowercased / title-cased records in `example`.
const EXAMPLE_CASE_MIX: [f64; 3] = [0.95, 0.04, 0.01];

fn build_example(ctx: &PipelineContext<'_>) -> Result<RecordStream> {
    let parallel = StageChain::new()
        .then(CaseMix::new(EXAMPLE_CASE_MIX, ctx.seed_for(100)))
        .apply(ctx.open_source(0)?);

    let tag = ctx.config().require_option("tag")?;
    let backtrans = StageChain::new()
        .then(CaseMix::new(EXAMPLE_CASE_MIX, ctx.seed_for(101)))
        .then(Tag::new(format!("{tag} ")))
        .apply(ctx.open_source(1)?);

    let mixed = ctx.mix(vec![parallel, backtrans])?;
    Ok(StageChain::new().then(BitextFilter::new(2)).apply(mixed))
}
