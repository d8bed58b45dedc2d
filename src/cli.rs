//! Command-line front end.
//!
//! Global options are declared with clap's derive API in [`GlobalArgs`]; the
//! subcommands are generated from the [`PipelineRegistry`] so each variant gets
//! its own positional source arguments, `--mix-weights`, `--no-shuffle` and
//! declared options. Global options come before the variant name:
//!
//! ```text
//! ironstream -n 8 --seed 1234 example data/parallel data/backtrans --tag "<DE>"
//! ```

use crate::collector::{RunOptions, SamplingConfig, WORKER_COMMAND, orchestrate};
use crate::config::{ConfigError, Defaults, PipelineArgs, PipelineConfig};
use crate::registry::{PipelineRegistry, SourceArity, VariantDescriptor, WeightSpec};
use crate::seed::{LaunchCoords, WorkerCoords};
use crate::worker;
use anyhow::{Context, Result, bail};
use clap::{Arg, ArgAction, ArgMatches, Args, Command, FromArgMatches, value_parser};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const MIX_WEIGHTS: &str = "mix_weights";
const NO_SHUFFLE: &str = "no_shuffle";

fn default_num_processes() -> usize {
    num_cpus::get().clamp(1, Defaults::NUM_PROCESSES)
}

/// Options shared by every pipeline variant.
#[derive(Args, Clone, Debug, PartialEq, Eq)]
pub struct GlobalArgs {
    /// Random seed; 0 derives one from the clock
    #[arg(short = 's', long, default_value_t = Defaults::SEED)]
    pub seed: u64,

    /// Number of worker processes
    #[arg(short = 'n', long, default_value_t = default_num_processes())]
    pub num_processes: usize,

    /// Records held in each source's shuffle buffer
    #[arg(short = 'b', long, default_value_t = Defaults::BUFFER_SIZE)]
    pub buffer_size: usize,

    /// Records per batch sent from a worker to the collector
    #[arg(short = 'q', long, default_value_t = Defaults::QUEUE_BUFFER_SIZE)]
    pub queue_buffer_size: usize,

    /// Log every Nth record; 0 disables
    #[arg(long, visible_alias = "lr", default_value_t = Defaults::LOG_RATE)]
    pub log_rate: u64,

    /// Log the first N records
    #[arg(long, visible_alias = "lf", default_value_t = Defaults::LOG_FIRST)]
    pub log_first: u64,

    /// Write sampled records to this file instead of the log
    #[arg(long)]
    pub sample_file: Option<PathBuf>,

    /// Only log errors
    #[arg(long)]
    pub quiet: bool,
}

impl GlobalArgs {
    #[must_use]
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            seed: self.seed,
            num_processes: self.num_processes,
            sampling: SamplingConfig {
                log_rate: self.log_rate,
                log_first: self.log_first,
            },
            sample_file: self.sample_file.clone(),
            quiet: self.quiet,
        }
    }
}

/// Build the full command for `registry`.
#[must_use]
pub fn build_command(registry: &PipelineRegistry) -> Command {
    let root = Command::new("ironstream")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Stream endless, shuffled, mixed training records to stdout")
        .subcommand_required(true)
        .arg_required_else_help(true);
    let mut cmd = GlobalArgs::augment_args(root);
    for variant in registry.iter() {
        cmd = cmd.subcommand(variant_command(variant));
    }
    cmd.subcommand(
        Command::new(WORKER_COMMAND)
            .hide(true)
            .about("Run one worker; reads its spec as JSON on stdin"),
    )
}

fn variant_command(variant: &VariantDescriptor) -> Command {
    let mut cmd = Command::new(variant.name).about(variant.description);
    match &variant.sources {
        SourceArity::Fixed(specs) => {
            for spec in specs {
                cmd = cmd.arg(
                    Arg::new(spec.name)
                        .help(spec.help)
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                );
            }
        }
        SourceArity::Variadic(spec) => {
            cmd = cmd.arg(
                Arg::new(spec.name)
                    .help(spec.help)
                    .required(true)
                    .num_args(1..)
                    .value_parser(value_parser!(PathBuf)),
            );
        }
    }

    let weights = Arg::new(MIX_WEIGHTS)
        .short('w')
        .long("mix-weights")
        .value_name("WEIGHT")
        .allow_negative_numbers(true)
        .value_parser(value_parser!(f64));
    let weights = match &variant.weights {
        WeightSpec::Fixed(defaults) => weights.num_args(defaults.len()).help(format!(
            "Weights for the data sources, one per source (default: {defaults:?})"
        )),
        WeightSpec::PerSource => weights
            .num_args(1..)
            .help("Weights for the data sources, one per path (default: equal)"),
    };
    cmd = cmd.arg(weights).arg(
        Arg::new(NO_SHUFFLE)
            .long("no-shuffle")
            .action(ArgAction::SetTrue)
            .help("Read chunks in order without shuffling"),
    );

    for option in &variant.options {
        let mut arg = Arg::new(option.name)
            .long(option.name)
            .help(option.help)
            .value_parser(value_parser!(String));
        if let Some(default) = option.default {
            arg = arg.default_value(default);
        }
        if option.required {
            arg = arg.required(true);
        }
        cmd = cmd.arg(arg);
    }
    cmd
}

/// Turn a variant's parsed subcommand into [`PipelineArgs`].
///
/// # Errors
/// Fails if a declared positional is missing from `matches`.
pub fn pipeline_args(
    variant: &VariantDescriptor,
    matches: &ArgMatches,
    globals: &GlobalArgs,
) -> Result<PipelineArgs> {
    let mut sources = Vec::new();
    let mut source_names = Vec::new();
    match &variant.sources {
        SourceArity::Fixed(specs) => {
            for spec in specs {
                let path = matches
                    .get_one::<PathBuf>(spec.name)
                    .with_context(|| format!("missing data source '{}'", spec.name))?;
                sources.push(path.clone());
                source_names.push(spec.name.to_string());
            }
        }
        SourceArity::Variadic(spec) => {
            for (i, path) in matches
                .get_many::<PathBuf>(spec.name)
                .into_iter()
                .flatten()
                .enumerate()
            {
                sources.push(path.clone());
                source_names.push(format!("{}[{i}]", spec.name));
            }
        }
    }

    let options: BTreeMap<String, String> = variant
        .options
        .iter()
        .filter_map(|o| {
            matches
                .get_one::<String>(o.name)
                .map(|v| (o.name.to_string(), v.clone()))
        })
        .collect();

    Ok(PipelineArgs {
        sources,
        source_names,
        mix_weights: matches
            .get_many::<f64>(MIX_WEIGHTS)
            .map(|values| values.copied().collect()),
        buffer_size: globals.buffer_size,
        queue_buffer_size: globals.queue_buffer_size,
        shuffle: !matches.get_flag(NO_SHUFFLE),
        options,
    })
}

/// Validate everything that can be checked before any worker starts.
///
/// # Errors
/// Fails on invalid weights, sizes, worker counts, or missing directories.
pub fn preflight(
    variant: &VariantDescriptor,
    args: &PipelineArgs,
    globals: &GlobalArgs,
    launch: LaunchCoords,
) -> Result<()> {
    if globals.num_processes == 0 {
        return Err(ConfigError::InvalidWorkerCount { id: 0, count: 0 }.into());
    }
    PipelineConfig::new(args, variant.default_weights(), WorkerCoords::solo(), launch, 0)?;
    for option in variant.options.iter().filter(|o| o.required) {
        if !args.options.contains_key(option.name) {
            return Err(ConfigError::MissingOption(option.name.to_string()).into());
        }
    }
    for dir in &args.sources {
        if !dir.is_dir() {
            bail!("data directory {} does not exist", dir.display());
        }
    }
    Ok(())
}

/// Install the stderr log subscriber. `RUST_LOG` overrides the default level
/// unless `quiet` is set.
pub fn init_logging(quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ironstream=info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Parse the process arguments against `registry` and run.
///
/// # Errors
/// Any configuration, worker, or I/O failure.
pub fn run(registry: PipelineRegistry) -> Result<()> {
    run_from(registry, std::env::args_os())
}

/// [`run`] with explicit arguments (the first one is the program name).
pub fn run_from<I, T>(registry: PipelineRegistry, argv: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let matches = build_command(&registry).get_matches_from(argv);
    let globals = GlobalArgs::from_arg_matches(&matches)?;
    init_logging(globals.quiet);

    let Some((name, sub)) = matches.subcommand() else {
        bail!("no pipeline given");
    };
    if name == WORKER_COMMAND {
        return worker::run_from_stdin(&registry);
    }

    let variant = registry.get(name)?;
    let args = pipeline_args(variant, sub, &globals)?;
    let launch = LaunchCoords::discover(|key| std::env::var(key).ok())?;
    preflight(variant, &args, &globals, launch)?;

    let program = std::env::current_exe().context("locate own executable")?;
    orchestrate(&program, name, &args, launch, &globals.run_options())?;
    Ok(())
}
