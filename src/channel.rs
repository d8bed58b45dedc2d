//! Batch framing between worker processes and the orchestrator.
//!
//! Each worker owns one unidirectional byte stream (its stdout). Records cross it
//! as *batches*: a 4-byte little-endian length followed by a `postcard`-encoded
//! `Vec<String>` of canonical lines. Sending lines instead of structured records
//! keeps the hot path to one allocation per batch on either side.
//!
//! [`BatchWriter`] implements the flush rule: a batch goes out as soon as it holds
//! `flush_size` lines, and whatever is left is sent by [`BatchWriter::finish`].

use anyhow::{Context, Result, bail};
use std::io::{self, BufRead, BufReader, Read, Write};

/// Upper bound on a single frame; anything larger is a corrupt stream.
pub const MAX_FRAME_BYTES: usize = 1 << 30;

/// Write one batch frame.
pub fn write_batch<W: Write>(sink: &mut W, lines: &[String]) -> io::Result<()> {
    let payload = postcard::to_allocvec(lines).map_err(io::Error::other)?;
    let len = u32::try_from(payload.len()).map_err(io::Error::other)?;
    sink.write_all(&len.to_le_bytes())?;
    sink.write_all(&payload)?;
    sink.flush()
}

/// Reads batch frames from one worker channel.
pub struct FrameReader<R: Read> {
    inner: BufReader<R>,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
        }
    }

    /// Blocking read of the next batch. `Ok(None)` means the writer closed the
    /// channel cleanly between frames.
    ///
    /// # Errors
    /// Fails on I/O errors, a truncated frame, or an undecodable payload.
    pub fn read_batch(&mut self) -> Result<Option<Vec<String>>> {
        if self.inner.fill_buf().context("read frame header")?.is_empty() {
            return Ok(None);
        }
        let mut header = [0u8; 4];
        self.inner
            .read_exact(&mut header)
            .context("truncated frame header")?;
        let len = u32::from_le_bytes(header) as usize;
        if len > MAX_FRAME_BYTES {
            bail!("frame of {len} bytes exceeds the {MAX_FRAME_BYTES} byte limit");
        }
        let mut payload = vec![0u8; len];
        self.inner
            .read_exact(&mut payload)
            .with_context(|| format!("truncated frame body ({len} bytes expected)"))?;
        let lines: Vec<String> = postcard::from_bytes(&payload).context("decode batch frame")?;
        Ok(Some(lines))
    }
}

impl<R: Read> Iterator for FrameReader<R> {
    type Item = Result<Vec<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_batch().transpose()
    }
}

/// Counters reported by a finished [`BatchWriter`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub records: u64,
    pub batches: u64,
}

/// Accumulates lines and flushes them as frames of `flush_size`.
pub struct BatchWriter<W: Write> {
    sink: W,
    batch: Vec<String>,
    flush_size: usize,
    stats: BatchStats,
}

impl<W: Write> BatchWriter<W> {
    pub fn new(sink: W, flush_size: usize) -> Self {
        let flush_size = flush_size.max(1);
        Self {
            sink,
            batch: Vec::with_capacity(flush_size.min(65_536)),
            flush_size,
            stats: BatchStats::default(),
        }
    }

    /// Queue one line, flushing if the batch is full.
    pub fn push(&mut self, line: String) -> io::Result<()> {
        self.batch.push(line);
        self.stats.records += 1;
        if self.batch.len() >= self.flush_size {
            self.flush_batch()?;
        }
        Ok(())
    }

    fn flush_batch(&mut self) -> io::Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        write_batch(&mut self.sink, &self.batch)?;
        self.batch.clear();
        self.stats.batches += 1;
        Ok(())
    }

    /// Send the final partial batch, if any, and hand back the sink.
    pub fn finish(mut self) -> io::Result<(W, BatchStats)> {
        self.flush_batch()?;
        Ok((self.sink, self.stats))
    }

    #[must_use]
    pub const fn stats(&self) -> BatchStats {
        self.stats
    }

    #[must_use]
    pub const fn flush_size(&self) -> usize {
        self.flush_size
    }
}
