use ironstream::io::compression::{builtin_codecs, codec_for_path, create_writer, open_reader};
use ironstream::io::glob::{expand_glob, list_chunk_files};
use ironstream::io::text::{read_records, write_lines};
use ironstream::metrics::{RunStats, RunSummary};
use std::io::{Read, Write};
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_codecs_chosen_by_extension() {
    let names: Vec<&str> = builtin_codecs().iter().map(|c| c.name()).collect();
    assert_eq!(names, ["gzip", "zstd", "bzip2", "xz"]);
    assert_eq!(codec_for_path("part.00000.GZ").map(|c| c.name()), Some("gzip"));
    assert_eq!(codec_for_path("part.00000.zst").map(|c| c.name()), Some("zstd"));
    assert!(codec_for_path("part.00000.tsv").is_none());
}

#[test]
fn test_every_codec_reads_back() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    for ext in ["gz", "zst", "bz2", "xz", "tsv"] {
        let path = tmp.path().join(format!("chunk.{ext}"));
        write_lines(&path, &["hallo\thello", "welt\tworld"])?;
        let records = read_records(&path)?;
        assert_eq!(records.len(), 2, "codec {ext}");
        assert_eq!(records[1].get(1), Some("world"));
    }
    Ok(())
}

#[test]
fn test_mislabelled_gzip_detected_by_magic() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let gz = tmp.path().join("part.gz");
    {
        let mut w = create_writer(&gz)?;
        w.write_all(b"a\tb\n")?;
    }
    let renamed = tmp.path().join("part.00003");
    std::fs::rename(&gz, &renamed)?;

    let mut text = String::new();
    open_reader(&renamed)?.read_to_string(&mut text)?;
    assert_eq!(text, "a\tb\n");
    Ok(())
}

#[test]
fn test_glob_skips_directories_and_sorts() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    for name in ["b.gz", "a.gz", "c.tsv"] {
        std::fs::write(tmp.path().join(name), b"")?;
    }
    std::fs::create_dir(tmp.path().join("d.gz"))?;

    let pattern = format!("{}/*.gz", tmp.path().display());
    let files = expand_glob(&pattern)?;
    let names: Vec<_> = files
        .iter()
        .filter_map(|p| p.file_name()?.to_str())
        .collect();
    assert_eq!(names, ["a.gz", "b.gz"]);

    assert_eq!(list_chunk_files(tmp.path(), None)?.len(), 3);
    assert!(list_chunk_files(tmp.path().join("a.gz"), None).is_err());
    Ok(())
}

#[test]
fn test_summary_saved_as_json() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let mut stats = RunStats::default();
    stats.observe("x\ty");
    let summary = RunSummary::new(&stats, Duration::ZERO, Duration::from_secs(2));
    let path = tmp.path().join("summary.json");
    summary.save_to_file(&path)?;

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(json["lines_produced"], 1);
    Ok(())
}
