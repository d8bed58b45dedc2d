use ironstream::channel::FrameReader;
use ironstream::collector::{Collector, CollectorError, SamplingConfig};
use ironstream::metrics::{RunStats, RunSummary};
use ironstream::testing::{encode_frames, labelled_batches};
use std::cell::RefCell;
use std::io::{self, Cursor, Write};
use std::rc::Rc;
use std::time::Duration;

fn channel(label: &str, sizes: &[usize]) -> anyhow::Result<FrameReader<Cursor<Vec<u8>>>> {
    Ok(FrameReader::new(Cursor::new(encode_frames(&labelled_batches(
        label, sizes,
    ))?)))
}

fn quiet() -> SamplingConfig {
    SamplingConfig {
        log_rate: 0,
        log_first: 0,
    }
}

fn output_lines(out: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(out).lines().map(String::from).collect()
}

/// Run until a finite test channel runs dry and return the worker it belonged to.
fn run_until_closed<W: io::Write>(
    collector: &mut Collector,
    channels: Vec<FrameReader<Cursor<Vec<u8>>>>,
    out: &mut W,
) -> anyhow::Result<usize> {
    let err = collector
        .run(channels, out)
        .err()
        .ok_or_else(|| anyhow::anyhow!("run ended without a closed channel"))?;
    match err.downcast_ref::<CollectorError>() {
        Some(CollectorError::ChannelClosed { worker }) => Ok(*worker),
        None => Err(err),
    }
}

#[test]
fn test_round_robin_one_batch_per_turn() -> anyhow::Result<()> {
    let channels = vec![channel("a", &[2, 2])?, channel("b", &[1, 1])?];
    let mut out = Vec::new();
    let mut collector = Collector::new(quiet());
    assert_eq!(run_until_closed(&mut collector, channels, &mut out)?, 0);
    assert_eq!(
        output_lines(&out),
        ["a-0-0", "a-0-1", "b-0-0", "a-1-0", "a-1-1", "b-1-0"]
    );
    Ok(())
}

#[test]
fn test_closed_channel_stops_the_run() -> anyhow::Result<()> {
    let channels = vec![
        channel("a", &[1, 1, 1])?,
        channel("b", &[1])?,
        channel("c", &[1, 1])?,
    ];
    let mut out = Vec::new();
    let mut collector = Collector::new(quiet());
    // worker 1 dies after its first batch; nothing is forwarded past that point
    assert_eq!(run_until_closed(&mut collector, channels, &mut out)?, 1);
    assert_eq!(output_lines(&out), ["a-0-0", "b-0-0", "c-0-0", "a-1-0"]);
    let stats = collector.stats();
    assert_eq!(stats.lines, 4);
    assert_eq!(stats.batches, 4);
    assert!(!stats.consumer_disconnected);
    Ok(())
}

#[test]
fn test_field_histogram() -> anyhow::Result<()> {
    let batches = vec![vec![
        "a\tb".to_string(),
        "c\td".to_string(),
        "lonely".to_string(),
    ]];
    let reader = FrameReader::new(Cursor::new(encode_frames(&batches)?));
    let mut out = Vec::new();
    let mut collector = Collector::new(quiet());
    run_until_closed(&mut collector, vec![reader], &mut out)?;
    let stats = collector.stats();
    assert_eq!(stats.num_fields.get(&2), Some(&2));
    assert_eq!(stats.num_fields.get(&1), Some(&1));
    Ok(())
}

/// Accepts `remaining` writes, then fails with a broken pipe.
struct HangUp {
    remaining: usize,
    written: Vec<u8>,
}

impl Write for HangUp {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        self.remaining -= 1;
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_consumer_disconnect_ends_run_cleanly() -> anyhow::Result<()> {
    let channels = vec![channel("a", &[3, 3, 3])?, channel("b", &[3, 3, 3])?];
    // two writes per line (text + newline): let exactly four lines through
    let mut out = HangUp {
        remaining: 8,
        written: Vec::new(),
    };
    let stats = Collector::new(quiet()).run(channels, &mut out)?.clone();
    assert!(stats.consumer_disconnected);
    assert_eq!(stats.lines, 4);
    assert_eq!(output_lines(&out.written).len(), 4);
    Ok(())
}

#[test]
fn test_sampling_rule() {
    let s = SamplingConfig {
        log_rate: 10,
        log_first: 3,
    };
    let sampled: Vec<u64> = (1..=30).filter(|&n| s.should_sample(n)).collect();
    assert_eq!(sampled, [1, 2, 3, 10, 20, 30]);

    let off = SamplingConfig {
        log_rate: 0,
        log_first: 0,
    };
    assert!(!(1..1000).any(|n| off.should_sample(n)));
}

#[derive(Clone, Default)]
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_samples_go_to_sample_sink() -> anyhow::Result<()> {
    let samples = SharedBuf::default();
    let mut collector = Collector::new(SamplingConfig {
        log_rate: 4,
        log_first: 1,
    })
    .with_sample_sink(Box::new(samples.clone()));
    let mut out = Vec::new();
    run_until_closed(&mut collector, vec![channel("a", &[5, 4])?], &mut out)?;
    let text = String::from_utf8(samples.0.borrow().clone())?;
    assert_eq!(text.lines().collect::<Vec<_>>(), ["a-0-0", "a-0-3", "a-1-2"]);
    Ok(())
}

#[test]
fn test_corrupt_channel_is_an_error() -> anyhow::Result<()> {
    let mut bytes = encode_frames(&labelled_batches("a", &[2]))?;
    bytes.truncate(bytes.len() - 1);
    let mut out = Vec::new();
    let err = Collector::new(quiet())
        .run(vec![FrameReader::new(Cursor::new(bytes))], &mut out)
        .err()
        .ok_or_else(|| anyhow::anyhow!("corrupt channel accepted"))?;
    assert!(err.downcast_ref::<CollectorError>().is_none());
    Ok(())
}

#[test]
fn test_summary_json() -> anyhow::Result<()> {
    let mut stats = RunStats::default();
    for line in ["a\tb", "c\td", "e"] {
        stats.observe(line);
    }
    let summary = RunSummary::new(&stats, Duration::from_secs(1), Duration::from_secs(4));
    assert_eq!(summary.lines_produced, 3);
    assert!((summary.yield_rate - 0.75).abs() < 1e-9);
    assert!((summary.yield_rate_sans_overhead - 1.0).abs() < 1e-9);

    let json: serde_json::Value = serde_json::from_str(&summary.to_json()?)?;
    assert_eq!(json["lines_produced"], 3);
    assert_eq!(json["num_fields"]["2"], 2);
    assert_eq!(json["consumer_disconnected"], false);
    Ok(())
}
