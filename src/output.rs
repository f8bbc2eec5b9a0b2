//! Netpbm image output.
//!
//! Frames are written as binary PPM (`P6`, RGB) or PGM (`P5`, luma only)
//! with the minimal header `P6\n<width> <height>\n255\n`.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{CaptureError, Result};

/// Kind of image written by a [`FrameWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// Binary PPM, 3 bytes per pixel.
    Rgb,
    /// Binary PGM, 1 byte per pixel.
    Gray,
}

impl ImageKind {
    /// Netpbm magic number.
    #[must_use]
    pub const fn magic(self) -> &'static str {
        match self {
            Self::Rgb => "P6",
            Self::Gray => "P5",
        }
    }

    /// File extension without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Rgb => "ppm",
            Self::Gray => "pgm",
        }
    }

    /// Bytes per pixel.
    #[must_use]
    pub const fn channels(self) -> usize {
        match self {
            Self::Rgb => 3,
            Self::Gray => 1,
        }
    }

    /// Payload length of a full image.
    #[must_use]
    pub const fn image_len(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.channels()
    }
}

/// Write a netpbm header followed by the raw pixel bytes.
pub fn write_image<W: Write>(
    out: &mut W,
    kind: ImageKind,
    width: u32,
    height: u32,
    pixels: &[u8],
) -> io::Result<()> {
    write!(out, "{}\n{width} {height}\n255\n", kind.magic())?;
    out.write_all(pixels)
}

/// Write a binary PPM image.
pub fn write_ppm<W: Write>(out: &mut W, width: u32, height: u32, rgb: &[u8]) -> io::Result<()> {
    write_image(out, ImageKind::Rgb, width, height, rgb)
}

/// Write a binary PGM image.
pub fn write_pgm<W: Write>(out: &mut W, width: u32, height: u32, gray: &[u8]) -> io::Result<()> {
    write_image(out, ImageKind::Gray, width, height, gray)
}

/// Writes frames to sequentially numbered files, `<prefix>-0000.ppm`,
/// `<prefix>-0001.ppm`, ...
#[derive(Debug)]
pub struct FrameWriter {
    dir: PathBuf,
    prefix: String,
    kind: ImageKind,
    next: u32,
}

impl FrameWriter {
    /// Create a writer for `dir`. The directory must exist.
    #[must_use]
    pub fn new<P: Into<PathBuf>>(dir: P, prefix: &str, kind: ImageKind) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.to_owned(),
            kind,
            next: 0,
        }
    }

    /// Number of files written so far.
    #[must_use]
    pub const fn written(&self) -> u32 {
        self.next
    }

    /// Path the next frame will be written to.
    #[must_use]
    pub fn next_path(&self) -> PathBuf {
        self.dir.join(format!(
            "{}-{:04}.{}",
            self.prefix,
            self.next,
            self.kind.extension()
        ))
    }

    /// Write one frame and advance the sequence. Returns the file path.
    pub fn write(&mut self, width: u32, height: u32, pixels: &[u8]) -> Result<PathBuf> {
        let path = self.next_path();
        write_file(&path, self.kind, width, height, pixels).map_err(|source| {
            CaptureError::Output {
                path: path.clone(),
                source,
            }
        })?;

        debug!(path = %path.display(), bytes = pixels.len(), "image written");
        self.next += 1;
        Ok(path)
    }
}

fn write_file(path: &Path, kind: ImageKind, width: u32, height: u32, pixels: &[u8]) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write_image(&mut out, kind, width, height, pixels)?;
    out.flush()
}
