//! Transparent compression for flat files.
//!
//! The codec is chosen from the file extension (`.gz`, `.zst`, `.bz2`, `.xz`),
//! falling back to magic bytes on read when the extension says nothing. Each
//! codec sits behind its own Cargo feature; a file that needs a codec that was
//! not compiled in fails to open with an `Unsupported` I/O error rather than
//! being read as garbage.
//!
//! ```no_run
//! use flatrecord::io::compression::{auto_detect_reader, auto_detect_writer};
//! use std::fs::File;
//! # fn main() -> anyhow::Result<()> {
//! let reader = auto_detect_reader(File::open("app.log.gz")?, "app.log.gz")?;
//! let writer = auto_detect_writer(File::create("out.csv.zst")?, "out.csv.zst")?;
//! writer.finish()?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Zstd,
    Bzip2,
    Xz,
}

impl Compression {
    const ALL: [Compression; 4] = [Self::Gzip, Self::Zstd, Self::Bzip2, Self::Xz];

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Zstd => "zstd",
            Self::Bzip2 => "bzip2",
            Self::Xz => "xz",
        }
    }

    fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::None => &[],
            Self::Gzip => &[".gz", ".gzip"],
            Self::Zstd => &[".zst", ".zstd"],
            Self::Bzip2 => &[".bz2", ".bzip2"],
            Self::Xz => &[".xz"],
        }
    }

    fn magic(&self) -> &'static [u8] {
        match self {
            Self::None => &[],
            Self::Gzip => &[0x1f, 0x8b],
            Self::Zstd => &[0x28, 0xb5, 0x2f, 0xfd],
            Self::Bzip2 => b"BZh",
            Self::Xz => &[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00],
        }
    }

    fn feature(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Gzip => "compression-gzip",
            Self::Zstd => "compression-zstd",
            Self::Bzip2 => "compression-bzip2",
            Self::Xz => "compression-xz",
        }
    }

    /// Detect from the file extension, case-insensitively.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let name = path.as_ref().to_string_lossy().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.extensions().iter().any(|ext| name.ends_with(ext)))
            .unwrap_or(Self::None)
    }

    /// Detect from the first bytes of a stream.
    pub fn from_magic(head: &[u8]) -> Self {
        Self::ALL
            .into_iter()
            .find(|c| head.starts_with(c.magic()))
            .unwrap_or(Self::None)
    }

    pub fn is_compressed(&self) -> bool {
        *self != Self::None
    }

    fn unsupported(&self) -> io::Error {
        io::Error::new(
            io::ErrorKind::Unsupported,
            format!(
                "{} support not compiled in (enable the `{}` feature)",
                self.name(),
                self.feature()
            ),
        )
    }

    /// Wrap `reader` with the matching decompressor.
    pub fn wrap_reader<R: Read + Send + 'static>(
        &self,
        reader: R,
    ) -> io::Result<Box<dyn Read + Send>> {
        match self {
            Self::None => Ok(Box::new(reader)),
            #[cfg(feature = "compression-gzip")]
            Self::Gzip => Ok(Box::new(flate2::read::MultiGzDecoder::new(reader))),
            #[cfg(feature = "compression-zstd")]
            Self::Zstd => Ok(Box::new(zstd::stream::read::Decoder::new(reader)?)),
            #[cfg(feature = "compression-bzip2")]
            Self::Bzip2 => Ok(Box::new(bzip2::read::MultiBzDecoder::new(reader))),
            #[cfg(feature = "compression-xz")]
            Self::Xz => Ok(Box::new(xz2::read::XzDecoder::new_multi_decoder(reader))),
            #[allow(unreachable_patterns)]
            other => Err(other.unsupported()),
        }
    }

    /// Wrap `writer` with the matching compressor.
    pub fn wrap_writer<W: Write>(&self, writer: W) -> io::Result<CompressedWriter<W>> {
        match self {
            Self::None => Ok(CompressedWriter::Plain(writer)),
            #[cfg(feature = "compression-gzip")]
            Self::Gzip => Ok(CompressedWriter::Gzip(flate2::write::GzEncoder::new(
                writer,
                flate2::Compression::default(),
            ))),
            #[cfg(feature = "compression-zstd")]
            Self::Zstd => Ok(CompressedWriter::Zstd(zstd::stream::write::Encoder::new(
                writer, 3,
            )?)),
            #[cfg(feature = "compression-bzip2")]
            Self::Bzip2 => Ok(CompressedWriter::Bzip2(bzip2::write::BzEncoder::new(
                writer,
                bzip2::Compression::default(),
            ))),
            #[cfg(feature = "compression-xz")]
            Self::Xz => Ok(CompressedWriter::Xz(xz2::write::XzEncoder::new(writer, 6))),
            #[allow(unreachable_patterns)]
            other => Err(other.unsupported()),
        }
    }
}

/// A writer that may be compressing. [`finish`](Self::finish) must be called
/// to write the trailer; dropping it is best effort.
pub enum CompressedWriter<W: Write> {
    Plain(W),
    #[cfg(feature = "compression-gzip")]
    Gzip(flate2::write::GzEncoder<W>),
    #[cfg(feature = "compression-zstd")]
    Zstd(zstd::stream::write::Encoder<'static, W>),
    #[cfg(feature = "compression-bzip2")]
    Bzip2(bzip2::write::BzEncoder<W>),
    #[cfg(feature = "compression-xz")]
    Xz(xz2::write::XzEncoder<W>),
}

impl<W: Write> CompressedWriter<W> {
    /// Flush, write any compression trailer, and hand back the inner writer.
    pub fn finish(self) -> io::Result<W> {
        match self {
            Self::Plain(mut w) => {
                w.flush()?;
                Ok(w)
            }
            #[cfg(feature = "compression-gzip")]
            Self::Gzip(e) => e.finish(),
            #[cfg(feature = "compression-zstd")]
            Self::Zstd(e) => e.finish(),
            #[cfg(feature = "compression-bzip2")]
            Self::Bzip2(e) => e.finish(),
            #[cfg(feature = "compression-xz")]
            Self::Xz(e) => e.finish(),
        }
    }

    fn inner(&mut self) -> &mut dyn Write {
        match self {
            Self::Plain(w) => w,
            #[cfg(feature = "compression-gzip")]
            Self::Gzip(e) => e,
            #[cfg(feature = "compression-zstd")]
            Self::Zstd(e) => e,
            #[cfg(feature = "compression-bzip2")]
            Self::Bzip2(e) => e,
            #[cfg(feature = "compression-xz")]
            Self::Xz(e) => e,
        }
    }
}

impl<W: Write> Write for CompressedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner().flush()
    }
}

/// Open-side detection: extension first, then magic bytes.
pub fn auto_detect_reader<R: Read + Send + 'static>(
    reader: R,
    path_hint: impl AsRef<Path>,
) -> Result<Box<dyn BufRead + Send>> {
    let by_ext = Compression::from_path(&path_hint);
    if by_ext.is_compressed() {
        let inner = by_ext
            .wrap_reader(reader)
            .with_context(|| format!("wrap reader with {} codec", by_ext.name()))?;
        return Ok(Box::new(BufReader::new(inner)));
    }

    let mut buffered = BufReader::new(reader);
    let by_magic = Compression::from_magic(buffered.fill_buf()?);
    if by_magic.is_compressed() {
        tracing::debug!(codec = by_magic.name(), "detected compression from content");
        let inner = by_magic
            .wrap_reader(buffered)
            .with_context(|| format!("wrap reader with {} codec", by_magic.name()))?;
        return Ok(Box::new(BufReader::new(inner)));
    }
    Ok(Box::new(buffered))
}

/// Write-side detection, by extension only.
pub fn auto_detect_writer<W: Write>(
    writer: W,
    path_hint: impl AsRef<Path>,
) -> Result<CompressedWriter<W>> {
    let codec = Compression::from_path(path_hint);
    codec
        .wrap_writer(writer)
        .with_context(|| format!("wrap writer with {} codec", codec.name()))
}
