//! Chunk-file I/O: enumeration, transparent decompression, line decoding and
//! the infinite shuffled reader the data sources are built on.

pub mod chunked;
pub mod compression;
pub mod glob;
pub mod text;
