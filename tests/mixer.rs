use ironstream::mixer::{Mixer, MixerError, mix};
use ironstream::testing::{assert_share, cycle_stream, finite_stream};
use ironstream::{Record, RecordStream};

fn two_sources() -> Vec<RecordStream> {
    vec![cycle_stream(&["a\tA"]), cycle_stream(&["b\tB"])]
}

fn draw(mixer: impl Iterator<Item = anyhow::Result<Record>>, n: usize) -> anyhow::Result<Vec<String>> {
    mixer
        .take(n)
        .map(|r| r.map(|rec| rec.get(0).unwrap_or("").to_string()))
        .collect()
}

#[test]
fn test_equal_weights_converge() -> anyhow::Result<()> {
    let mixer = Mixer::new(two_sources(), &[0.5, 0.5], 2024)?;
    let out = draw(mixer, 100_000)?;
    let a = out.iter().filter(|s| *s == "a").count();
    assert_share(a, out.len(), 0.5, 0.01);
    Ok(())
}

#[test]
fn test_uneven_weights_converge() -> anyhow::Result<()> {
    let mixer = Mixer::new(two_sources(), &[0.9, 0.1], 7)?;
    let out = draw(mixer, 50_000)?;
    let b = out.iter().filter(|s| *s == "b").count();
    assert_share(b, out.len(), 0.1, 0.01);
    Ok(())
}

#[test]
fn test_zero_weight_source_is_never_read() -> anyhow::Result<()> {
    let streams = vec![cycle_stream(&["a\tA"]), finite_stream(&[]), cycle_stream(&["c\tC"])];
    let mixer = Mixer::new(streams, &[0.5, 0.0, 0.5], 11)?;
    let out = draw(mixer, 10_000)?;
    assert!(out.iter().all(|s| s != "b"));
    Ok(())
}

#[test]
fn test_same_seed_same_choices() -> anyhow::Result<()> {
    let a = draw(Mixer::new(two_sources(), &[0.3, 0.7], 99)?, 1_000)?;
    let b = draw(Mixer::new(two_sources(), &[0.3, 0.7], 99)?, 1_000)?;
    let c = draw(Mixer::new(two_sources(), &[0.3, 0.7], 100)?, 1_000)?;
    assert_eq!(a, b);
    assert_ne!(a, c);
    Ok(())
}

#[test]
fn test_select_uses_cumulative_weights() -> anyhow::Result<()> {
    let mixer = Mixer::new(
        vec![cycle_stream(&["a"]), cycle_stream(&["b"]), cycle_stream(&["c"])],
        &[0.2, 0.3, 0.5],
        0,
    )?;
    assert_eq!(mixer.select(0.0), 0);
    assert_eq!(mixer.select(0.2), 0);
    assert_eq!(mixer.select(0.21), 1);
    assert_eq!(mixer.select(0.5), 1);
    assert_eq!(mixer.select(0.99), 2);
    // rounding overshoot falls back to the first stream
    assert_eq!(mixer.select(1.5), 0);
    Ok(())
}

#[test]
fn test_exhausted_source_is_fatal() -> anyhow::Result<()> {
    let streams = vec![finite_stream(&["a\tA"]), finite_stream(&["b\tB"])];
    let mut mixer = Mixer::new(streams, &[0.5, 0.5], 1)?;
    let mut produced = 0;
    let err = loop {
        match mixer.next() {
            Some(Ok(_)) => produced += 1,
            Some(Err(e)) => break e,
            None => panic!("mixer ended without reporting exhaustion"),
        }
    };
    assert!(produced <= 2);
    assert!(matches!(
        err.downcast_ref::<MixerError>(),
        Some(MixerError::Exhausted { .. })
    ));
    assert!(mixer.next().is_none());
    Ok(())
}

#[test]
fn test_mixer_rejects_mismatched_weights() {
    assert!(Mixer::new(two_sources(), &[1.0], 0).is_err());
    assert!(Mixer::new(Vec::new(), &[], 0).is_err());
}

#[test]
fn test_mix_single_stream_passthrough() -> anyhow::Result<()> {
    let out = draw(mix(vec![finite_stream(&["x\tX", "y\tY"])], &[1.0], 0)?, 10)?;
    assert_eq!(out, ["x", "y"]);
    Ok(())
}
