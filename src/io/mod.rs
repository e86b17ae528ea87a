//! File-facing side of the engine: decoding, compression, folder expansion,
//! and the read and write paths built on the pure components.

pub mod compression;
pub mod glob;
pub mod lines;
pub mod reader;
pub mod writer;
