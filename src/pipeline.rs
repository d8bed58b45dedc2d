use crate::config::{Defaults, PipelineArgs, PipelineConfig};
use crate::io::chunked::ChunkReadFn;
use crate::mixer::mix;
use crate::record::Record;
use crate::registry::PipelineRegistry;
use crate::seed::{LaunchCoords, WorkerCoords};
use crate::shard::{SourceOptions, open_data_source, text_reader};
use crate::stage::RecordStream;
use anyhow::{Context, Result, bail};
use tracing::info;

/// Salt separating the mixer's generator from the per-source ones.
const MIXER_SALT: u64 = 0x6d69_7865_72;

/// What a variant's build function sees: the frozen configuration plus helpers
/// for opening its sources the standard way.
pub struct PipelineContext<'a> {
    config: &'a PipelineConfig,
}

impl<'a> PipelineContext<'a> {
    #[must_use]
    pub const fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &'a PipelineConfig {
        self.config
    }

    /// A seed for one random component of this worker's pipeline. Different
    /// salts give unrelated streams; the same salt always gives the same one.
    #[must_use]
    pub fn seed_for(&self, salt: u64) -> u64 {
        let mut z = self.config.seed() ^ salt.wrapping_mul(0x9E37_79B9_7F4A_7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Open source `index` as tab-separated text chunks.
    pub fn open_source(&self, index: usize) -> Result<RecordStream> {
        self.open_source_with(index, text_reader())
    }

    /// Open source `index` with a custom chunk decoder. The chunk extension comes
    /// from the `ext` option, defaulting to `.gz`.
    pub fn open_source_with(&self, index: usize, read_fn: ChunkReadFn) -> Result<RecordStream> {
        let Some(dir) = self.config.sources().get(index) else {
            bail!(
                "source index {index} out of range ({} sources)",
                self.config.sources().len()
            );
        };
        let ext = self.config.option("ext").unwrap_or(Defaults::EXT);
        let ext = (!ext.is_empty()).then_some(ext);
        let iter = open_data_source(
            dir,
            read_fn,
            SourceOptions {
                ext,
                buffer_size: self.config.buffer_size(),
                seed: self.seed_for(index as u64),
                shuffle: self.config.shuffle(),
                worker: self.config.worker(),
                launch: self.config.launch(),
            },
        )?;
        Ok(Box::new(iter))
    }

    /// Open every declared source as text.
    pub fn open_all_sources(&self) -> Result<Vec<RecordStream>> {
        (0..self.config.sources().len())
            .map(|i| self.open_source(i))
            .collect()
    }

    /// Mix `streams` with the configured weights.
    pub fn mix(&self, streams: Vec<RecordStream>) -> Result<RecordStream> {
        mix(
            streams,
            self.config.mix_weights().as_slice(),
            self.seed_for(MIXER_SALT),
        )
    }
}

/// One worker's instance of a pipeline variant: an endless record stream.
pub struct Pipeline {
    name: String,
    config: PipelineConfig,
    stream: RecordStream,
}

impl Pipeline {
    /// Look up `name` in `registry`, validate `args` for this worker and build
    /// the stream.
    pub fn create(
        registry: &PipelineRegistry,
        name: &str,
        args: &PipelineArgs,
        worker: WorkerCoords,
        launch: LaunchCoords,
        seed: u64,
    ) -> Result<Self> {
        let variant = registry.get(name)?;
        let args = variant.with_option_defaults(args);
        let config = PipelineConfig::new(&args, variant.default_weights(), worker, launch, seed)?;
        info!("Using mix weights:\n{}", config.describe_weights());
        let stream = (variant.build)(&PipelineContext::new(&config))
            .with_context(|| format!("build pipeline '{name}'"))?;
        Ok(Self {
            name: name.to_string(),
            config,
            stream,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }
}

impl Iterator for Pipeline {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.stream.next()
    }
}
