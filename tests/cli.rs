use ironstream::cli::{GlobalArgs, build_command, pipeline_args, preflight};
use ironstream::config::Defaults;
use ironstream::registry::PipelineRegistry;
use ironstream::seed::LaunchCoords;
use ironstream::testing::ChunkDir;
use clap::FromArgMatches;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Command, Stdio};

fn parse(argv: &[&str]) -> anyhow::Result<(GlobalArgs, ironstream::PipelineArgs)> {
    let registry = PipelineRegistry::builtin()?;
    let matches = build_command(&registry).try_get_matches_from(argv)?;
    let globals = GlobalArgs::from_arg_matches(&matches)?;
    let (name, sub) = matches
        .subcommand()
        .ok_or_else(|| anyhow::anyhow!("no subcommand"))?;
    let args = pipeline_args(registry.get(name)?, sub, &globals)?;
    Ok((globals, args))
}

#[test]
fn test_command_definition_is_valid() -> anyhow::Result<()> {
    build_command(&PipelineRegistry::builtin()?).debug_assert();
    Ok(())
}

#[test]
fn test_global_defaults() -> anyhow::Result<()> {
    let (globals, args) = parse(&["ironstream", "default", "data/par"])?;
    assert_eq!(globals.seed, Defaults::SEED);
    assert_eq!(globals.buffer_size, Defaults::BUFFER_SIZE);
    assert_eq!(globals.log_first, Defaults::LOG_FIRST);
    assert!(globals.num_processes >= 1);
    assert!(!globals.quiet);
    assert_eq!(args.sources, [PathBuf::from("data/par")]);
    assert_eq!(args.mix_weights, None);
    assert!(args.shuffle);
    assert_eq!(args.options.get("ext").map(String::as_str), Some(".gz"));
    Ok(())
}

#[test]
fn test_global_options_and_aliases() -> anyhow::Result<()> {
    let (globals, args) = parse(&[
        "ironstream", "-s", "9", "-n", "3", "-b", "100", "-q", "10", "--lr", "50", "--lf", "2",
        "--quiet", "default", "corpus", "--no-shuffle",
    ])?;
    assert_eq!(globals.seed, 9);
    assert_eq!(globals.num_processes, 3);
    assert_eq!(globals.log_rate, 50);
    assert_eq!(globals.log_first, 2);
    assert!(globals.quiet);
    assert_eq!(args.buffer_size, 100);
    assert_eq!(args.queue_buffer_size, 10);
    assert_eq!(args.flush_size(), 10);
    assert!(!args.shuffle);
    Ok(())
}

#[test]
fn test_example_arguments() -> anyhow::Result<()> {
    let (_, args) = parse(&[
        "ironstream", "example", "par", "bt", "--mix-weights", "2", "1", "--tag", "<DE>",
    ])?;
    assert_eq!(args.sources, [PathBuf::from("par"), PathBuf::from("bt")]);
    assert_eq!(args.source_names, ["parallel_data", "backtrans_data"]);
    assert_eq!(args.mix_weights, Some(vec![2.0, 1.0]));
    assert_eq!(args.options.get("tag").map(String::as_str), Some("<DE>"));
    Ok(())
}

#[test]
fn test_fixed_weight_count_enforced_by_parser() -> anyhow::Result<()> {
    let registry = PipelineRegistry::builtin()?;
    let result = build_command(&registry).try_get_matches_from([
        "ironstream", "example", "par", "bt", "-w", "1", "2", "3",
    ]);
    assert!(result.is_err());
    Ok(())
}

#[test]
fn test_multistream_variadic_paths() -> anyhow::Result<()> {
    let (_, args) = parse(&[
        "ironstream", "multistream", "a", "b", "c", "-w", "1", "1", "2",
    ])?;
    assert_eq!(args.sources.len(), 3);
    assert_eq!(args.source_names[2], "paths[2]");
    assert_eq!(args.mix_weights, Some(vec![1.0, 1.0, 2.0]));
    assert_eq!(args.options.get("ext").map(String::as_str), Some(".tsv"));
    Ok(())
}

#[test]
fn test_unknown_pipeline_is_a_parse_error() -> anyhow::Result<()> {
    let registry = PipelineRegistry::builtin()?;
    assert!(
        build_command(&registry)
            .try_get_matches_from(["ironstream", "nonexistent", "x"])
            .is_err()
    );
    Ok(())
}

#[test]
fn test_preflight_checks() -> anyhow::Result<()> {
    let registry = PipelineRegistry::builtin()?;
    let dir = ChunkDir::with_parallel_chunks("p", 1, 1, ".tsv")?;
    let dir_arg = dir.path().to_string_lossy().into_owned();
    let multistream = registry.get("multistream")?;

    let (globals, args) = parse(&["ironstream", "multistream", &dir_arg])?;
    preflight(multistream, &args, &globals, LaunchCoords::default())?;

    let (globals, args) = parse(&["ironstream", "multistream", &dir_arg, "-w", "-1"])?;
    assert!(preflight(multistream, &args, &globals, LaunchCoords::default()).is_err());

    let (globals, args) = parse(&["ironstream", "multistream", "/no/such/dir"])?;
    assert!(preflight(multistream, &args, &globals, LaunchCoords::default()).is_err());

    let (globals, args) = parse(&["ironstream", "-n", "0", "multistream", &dir_arg])?;
    assert!(preflight(multistream, &args, &globals, LaunchCoords::default()).is_err());
    Ok(())
}

fn binary() -> Command {
    Command::new(env!("CARGO_BIN_EXE_ironstream"))
}

#[test]
fn test_end_to_end_stream_and_disconnect() -> anyhow::Result<()> {
    let dir = ChunkDir::with_parallel_chunks("e2e", 4, 25, ".gz")?;
    let mut child = binary()
        .args(["-n", "2", "-b", "32", "-q", "8", "--seed", "11", "default"])
        .arg(dir.path())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow::anyhow!("no stdout"))?;
    let lines: Vec<String> = BufReader::new(stdout)
        .lines()
        .take(500)
        .collect::<Result<_, _>>()?;
    assert_eq!(lines.len(), 500);
    for line in &lines {
        let fields: Vec<&str> = line.split('\t').collect();
        assert_eq!(fields.len(), 2, "bad line {line}");
        assert!(fields[0].starts_with("e2e-"));
        assert_eq!(fields[1], fields[0].to_uppercase());
    }

    // dropping the reader closes the pipe; the orchestrator must exit cleanly
    let status = child.wait()?;
    assert!(status.success(), "exit status {status}");
    Ok(())
}

#[test]
fn test_end_to_end_same_seed_same_prefix() -> anyhow::Result<()> {
    let dir = ChunkDir::with_parallel_chunks("rep", 3, 10, ".tsv")?;
    let run = || -> anyhow::Result<Vec<String>> {
        let mut child = binary()
            .args(["-n", "2", "-b", "16", "-q", "4", "--seed", "5", "--quiet", "multistream"])
            .arg(dir.path())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("no stdout"))?;
        let lines = BufReader::new(stdout)
            .lines()
            .take(200)
            .collect::<Result<Vec<_>, _>>()?;
        child.wait()?;
        Ok(lines)
    };
    assert_eq!(run()?, run()?);
    Ok(())
}

#[test]
fn test_end_to_end_missing_directory_fails() -> anyhow::Result<()> {
    let status = binary()
        .args(["--quiet", "default", "/no/such/corpus"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    assert!(!status.success());
    Ok(())
}

#[test]
fn test_end_to_end_worker_failure_propagates() -> anyhow::Result<()> {
    // the directory exists but holds no `.gz` chunks, so every worker fails
    let dir = ChunkDir::with_parallel_chunks("x", 2, 2, ".tsv")?;
    let output = binary()
        .args(["-n", "2", "--quiet", "default"])
        .arg(dir.path())
        .stderr(Stdio::null())
        .output()?;
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    Ok(())
}

#[test]
fn test_end_to_end_one_failing_worker_stops_the_run() -> anyhow::Result<()> {
    // worker 0 owns a readable chunk; worker 1 owns one that is not UTF-8
    let dir = ChunkDir::with_parallel_chunks("ok", 1, 50, ".tsv")?;
    std::fs::write(dir.path().join("chunk.001.tsv"), b"\xff\xfe\tbroken\n")?;

    let mut child = binary()
        .args(["-n", "2", "-b", "8", "-q", "4", "--seed", "3", "--quiet", "multistream"])
        .arg(dir.path())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow::anyhow!("no stdout"))?;
    // the run must end on its own, well before the reader would give up
    let lines = BufReader::new(stdout)
        .lines()
        .take(2000)
        .collect::<Result<Vec<_>, _>>()?;
    assert!(lines.len() < 2000, "stream kept going without worker 1");
    assert!(lines.iter().all(|l| l.starts_with("ok-")));

    let status = child.wait()?;
    assert!(!status.success());
    Ok(())
}
