use anyhow::Result;
use ironstream::PipelineRegistry;

fn main() -> Result<()> {
    ironstream::cli::run(PipelineRegistry::builtin()?)
}
