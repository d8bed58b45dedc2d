use ironstream::channel::{BatchWriter, FrameReader, write_batch};
use ironstream::testing::{encode_frames, labelled_batches};
use std::io::Cursor;

#[test]
fn test_batches_flush_at_flush_size() -> anyhow::Result<()> {
    let mut writer = BatchWriter::new(Vec::new(), 5);
    for i in 0..12 {
        writer.push(format!("line-{i}"))?;
    }
    assert_eq!(writer.stats().batches, 2);
    let (bytes, stats) = writer.finish()?;
    assert_eq!(stats.records, 12);
    assert_eq!(stats.batches, 3);

    let sizes: Vec<usize> = FrameReader::new(Cursor::new(bytes))
        .map(|b| b.map(|lines| lines.len()))
        .collect::<anyhow::Result<_>>()?;
    assert_eq!(sizes, [5, 5, 2]);
    Ok(())
}

#[test]
fn test_frames_preserve_lines_in_order() -> anyhow::Result<()> {
    let batches = labelled_batches("w", &[3, 1]);
    let mut reader = FrameReader::new(Cursor::new(encode_frames(&batches)?));
    assert_eq!(reader.read_batch()?, Some(batches[0].clone()));
    assert_eq!(reader.read_batch()?, Some(batches[1].clone()));
    assert_eq!(reader.read_batch()?, None);
    Ok(())
}

#[test]
fn test_lines_with_tabs_and_unicode() -> anyhow::Result<()> {
    let batch = vec!["Grüße\tgreetings".to_string(), "空\tempty".to_string()];
    let mut bytes = Vec::new();
    write_batch(&mut bytes, &batch)?;
    let mut reader = FrameReader::new(Cursor::new(bytes));
    assert_eq!(reader.read_batch()?, Some(batch));
    Ok(())
}

#[test]
fn test_finish_without_records_sends_nothing() -> anyhow::Result<()> {
    let (bytes, stats) = BatchWriter::new(Vec::new(), 4).finish()?;
    assert!(bytes.is_empty());
    assert_eq!(stats.batches, 0);
    Ok(())
}

#[test]
fn test_truncated_frame_is_an_error() -> anyhow::Result<()> {
    let mut bytes = encode_frames(&labelled_batches("w", &[4]))?;
    bytes.truncate(bytes.len() - 3);
    let mut reader = FrameReader::new(Cursor::new(bytes));
    assert!(reader.read_batch().is_err());
    Ok(())
}

#[test]
fn test_oversized_frame_header_rejected() {
    let bytes = u32::MAX.to_le_bytes().to_vec();
    let mut reader = FrameReader::new(Cursor::new(bytes));
    assert!(reader.read_batch().is_err());
}
