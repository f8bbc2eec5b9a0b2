//! yuyv-capture binary: grab frames from a V4L2 device and save them as images.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use yuyv_capture::config::{DEFAULT_BUFFER_COUNT, DEFAULT_DEVICE};
use yuyv_capture::convert;
use yuyv_capture::output::{FrameWriter, ImageKind};
use yuyv_capture::{CaptureConfig, CaptureSession};

/// Capture YUYV frames from a V4L2 device and write them as PPM images.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Device node to capture from
    #[arg(default_value = DEFAULT_DEVICE)]
    device: PathBuf,

    /// Number of frames to capture
    #[arg(short = 'n', long, default_value_t = 1)]
    frames: u32,

    /// Directory the images are written to
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// File name prefix
    #[arg(short, long, default_value = "frame")]
    prefix: String,

    /// Write grayscale PGM images (luma only) instead of PPM
    #[arg(long)]
    gray: bool,

    /// Number of buffers to request from the driver
    #[arg(long, default_value_t = DEFAULT_BUFFER_COUNT)]
    buffers: u32,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(&Args::parse()) {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let config = CaptureConfig {
        buffer_count: args.buffers,
        ..CaptureConfig::for_device(&args.device)
    };
    let (width, height) = (config.format.width, config.format.height);

    let mut session = CaptureSession::open_device(config)
        .with_context(|| format!("cannot start capture on {}", args.device.display()))?;

    if let Some(caps) = session.capabilities() {
        info!(card = %caps.card, driver = %caps.driver, "capturing");
    }

    let kind = if args.gray { ImageKind::Gray } else { ImageKind::Rgb };
    let mut writer = FrameWriter::new(&args.output_dir, &args.prefix, kind);
    let expected = kind.image_len(width, height);
    let mut pixels = Vec::with_capacity(expected);

    for _ in 0..args.frames {
        let metadata = match kind {
            ImageKind::Rgb => session.grab_into(&mut pixels)?,
            ImageKind::Gray => {
                let (luma, metadata) = session.grab_with(convert::decode_luma)?;
                pixels = luma;
                metadata
            }
        };

        if pixels.len() != expected {
            warn!(
                sequence = metadata.sequence,
                bytes_used = metadata.bytes_used,
                "short frame skipped"
            );
            continue;
        }

        let path = writer.write(width, height, &pixels)?;
        info!(
            path = %path.display(),
            sequence = metadata.sequence,
            slot = metadata.slot,
            "frame saved"
        );
    }

    session.close()?;
    info!(written = writer.written(), "done");
    Ok(())
}
