//! Transparent compression for chunk files.
//!
//! Corpora are usually split into compressed chunks. Readers pick a codec from
//! the file extension first and fall back to the stream's magic bytes, so a
//! mislabelled `part.00003` that is really gzip still decodes.
//!
//! When enabled via feature flags, the following codecs are available:
//! - **Gzip** (`.gz`) - `compression-gzip`
//! - **Zstd** (`.zst`) - `compression-zstd`
//! - **Bzip2** (`.bz2`) - `compression-bzip2`
//! - **Xz** (`.xz`) - `compression-xz`
//!
//! ```no_run
//! use ironstream::io::compression::{open_reader, create_writer};
//! use std::io::{Read, Write};
//! # fn main() -> anyhow::Result<()> {
//! let mut w = create_writer("chunks/part.00000.gz")?;
//! w.write_all(b"hallo\thello\n")?;
//! drop(w);
//!
//! let mut text = String::new();
//! open_reader("chunks/part.00000.gz")?.read_to_string(&mut text)?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// A compression format usable for chunk files.
pub trait Codec: Send + Sync {
    /// Human-readable codec name (e.g. "gzip").
    fn name(&self) -> &'static str;

    /// Lowercase extensions including the leading dot.
    fn extensions(&self) -> &'static [&'static str];

    /// Signature at the start of a compressed stream, if the format has one.
    fn magic_bytes(&self) -> Option<&'static [u8]>;

    fn wrap_reader(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>>;

    fn wrap_writer(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>>;
}

static CODECS: &[&dyn Codec] = &[
    #[cfg(feature = "compression-gzip")]
    &GzipCodec,
    #[cfg(feature = "compression-zstd")]
    &ZstdCodec,
    #[cfg(feature = "compression-bzip2")]
    &Bzip2Codec,
    #[cfg(feature = "compression-xz")]
    &XzCodec,
];

/// Codecs compiled into this build.
#[must_use]
pub fn builtin_codecs() -> &'static [&'static dyn Codec] {
    CODECS
}

/// The codec whose extension matches `path`, case-insensitively.
#[must_use]
pub fn codec_for_path(path: impl AsRef<Path>) -> Option<&'static dyn Codec> {
    let lower = path.as_ref().to_string_lossy().to_lowercase();
    builtin_codecs()
        .iter()
        .copied()
        .find(|codec| codec.extensions().iter().any(|ext| lower.ends_with(ext)))
}

fn codec_for_magic<R: BufRead>(reader: &mut R) -> Option<&'static dyn Codec> {
    let head = reader.fill_buf().ok()?;
    if head.is_empty() {
        return None;
    }
    builtin_codecs().iter().copied().find(|codec| {
        codec
            .magic_bytes()
            .is_some_and(|magic| head.len() >= magic.len() && head.starts_with(magic))
    })
}

/// Wrap `reader` with a decompressor chosen from `path_hint` or the magic bytes.
/// Uncompressed input is returned buffered but otherwise untouched.
pub fn auto_detect_reader<R: Read + 'static>(
    reader: R,
    path_hint: impl AsRef<Path>,
) -> Result<Box<dyn Read>> {
    if let Some(codec) = codec_for_path(&path_hint) {
        return codec
            .wrap_reader(Box::new(reader))
            .with_context(|| format!("wrap reader with {} codec", codec.name()));
    }

    let mut buffered = BufReader::new(reader);
    if let Some(codec) = codec_for_magic(&mut buffered) {
        return codec
            .wrap_reader(Box::new(buffered))
            .with_context(|| format!("wrap reader with {} codec", codec.name()));
    }
    Ok(Box::new(buffered))
}

/// Wrap `writer` with the compressor matching `path_hint`'s extension, if any.
pub fn auto_detect_writer<W: Write + 'static>(
    writer: W,
    path_hint: impl AsRef<Path>,
) -> Result<Box<dyn Write>> {
    if let Some(codec) = codec_for_path(&path_hint) {
        return codec
            .wrap_writer(Box::new(writer))
            .with_context(|| format!("wrap writer with {} codec", codec.name()));
    }
    Ok(Box::new(BufWriter::new(writer)))
}

/// Open a chunk file for reading, decompressing as needed.
pub fn open_reader(path: impl AsRef<Path>) -> Result<Box<dyn Read>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    auto_detect_reader(file, path)
        .with_context(|| format!("setup decompression for {}", path.display()))
}

/// Create a chunk file for writing, compressing according to its extension.
///
/// The returned writer finishes the compressed stream when dropped.
pub fn create_writer(path: impl AsRef<Path>) -> Result<Box<dyn Write>> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    auto_detect_writer(file, path)
        .with_context(|| format!("setup compression for {}", path.display()))
}

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl Codec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> Option<&'static [u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn wrap_reader(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        // Chunks produced by `split | pigz` may be multi-member.
        Ok(Box::new(flate2::read::MultiGzDecoder::new(reader)))
    }

    fn wrap_writer(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        Ok(Box::new(GzEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl Codec for ZstdCodec {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> Option<&'static [u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn wrap_reader(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as Box<dyn Read>)
    }

    fn wrap_writer(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>> {
        zstd::stream::write::Encoder::new(writer, 3)
            .map(|e| Box::new(e.auto_finish()) as Box<dyn Write>)
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl Codec for Bzip2Codec {
    fn name(&self) -> &'static str {
        "bzip2"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".bz2", ".bzip2"]
    }

    fn magic_bytes(&self) -> Option<&'static [u8]> {
        Some(&[0x42, 0x5a, 0x68])
    }

    fn wrap_reader(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        Ok(Box::new(bzip2::read::MultiBzDecoder::new(reader)))
    }

    fn wrap_writer(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>> {
        use bzip2::Compression;
        use bzip2::write::BzEncoder;
        Ok(Box::new(BzEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl Codec for XzCodec {
    fn name(&self) -> &'static str {
        "xz"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".xz"]
    }

    fn magic_bytes(&self) -> Option<&'static [u8]> {
        Some(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00])
    }

    fn wrap_reader(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        Ok(Box::new(xz2::read::XzDecoder::new_multi_decoder(reader)))
    }

    fn wrap_writer(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>> {
        Ok(Box::new(xz2::write::XzEncoder::new(writer, 6)))
    }
}
