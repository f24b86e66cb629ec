//! Recording Export — writes one frame of a recorded session as PNG images.
//!
//! Usage:
//!   recording-export [options] [session-dir]
//!
//! Options:
//!   --frame <n>             Frame number to export (default: 0)
//!   --base <dir>            Use the newest session under <dir> (default: recordings)
//!   --out <dir>             Output directory (default: <session-dir>/png)
//!   --color-size <WxH>      Color resolution (default: 1920x1080)
//!   --depth-size <WxH>      Depth/index resolution (default: 512x424)

use anyhow::Result;
use rgbd_recorder::export::export_frame;
use rgbd_recorder::{FrameGeometry, RecordingReader, StreamKind};
use std::path::PathBuf;

struct Args {
    session: Option<PathBuf>,
    base: PathBuf,
    frame: u64,
    out: Option<PathBuf>,
    geometry: FrameGeometry,
}

fn parse_size(s: &str) -> Option<(usize, usize)> {
    let (w, h) = s.split_once('x')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut session = None;
    let mut base = PathBuf::from("recordings");
    let mut frame = 0;
    let mut out = None;
    let mut geometry = FrameGeometry::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--frame" if i + 1 < args.len() => {
                frame = args[i + 1].parse().unwrap_or(0);
                i += 2;
            }
            "--base" if i + 1 < args.len() => {
                base = PathBuf::from(&args[i + 1]);
                i += 2;
            }
            "--out" if i + 1 < args.len() => {
                out = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--color-size" if i + 1 < args.len() => {
                if let Some((w, h)) = parse_size(&args[i + 1]) {
                    geometry.color_width = w;
                    geometry.color_height = h;
                }
                i += 2;
            }
            "--depth-size" if i + 1 < args.len() => {
                if let Some((w, h)) = parse_size(&args[i + 1]) {
                    geometry.depth_width = w;
                    geometry.depth_height = h;
                }
                i += 2;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                session = Some(PathBuf::from(other));
                i += 1;
            }
        }
    }

    Args {
        session,
        base,
        frame,
        out,
        geometry,
    }
}

fn print_usage() {
    println!("Recording Export — writes one recorded frame of every stream as PNG");
    println!();
    println!("Usage: recording-export [options] [session-dir]");
    println!();
    println!("Options:");
    println!("  --frame <n>             Frame number to export (default: 0)");
    println!("  --base <dir>            Use the newest session under <dir> (default: recordings)");
    println!("  --out <dir>             Output directory (default: <session-dir>/png)");
    println!("  --color-size <WxH>      Color resolution (default: 1920x1080)");
    println!("  --depth-size <WxH>      Depth/index resolution (default: 512x424)");
    println!();
    println!("Examples:");
    println!("  recording-export --frame 12");
    println!("  recording-export recordings/2024-05-01_09-00-00 --out /tmp/frames");
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rgbd_recorder=info".parse()?)
                .add_directive("recording_export=info".parse()?)
                .add_directive("warn".parse()?),
        )
        .init();

    let args = parse_args();
    args.geometry.validate()?;

    let session = match args.session {
        Some(dir) => dir,
        None => RecordingReader::sessions(&args.base)?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("No sessions under {}", args.base.display()))?,
    };
    let reader = RecordingReader::open(&session, args.geometry)?;

    println!("Session: {}", session.display());
    for stream in StreamKind::ALL {
        println!("  {:<14}{} frames", stream.dir_name(), reader.frame_count(stream));
    }

    let out = args.out.unwrap_or_else(|| session.join("png"));
    let written = export_frame(&reader, args.frame, &out)?;
    if written.is_empty() {
        anyhow::bail!("No stream has frame {}", args.frame);
    }
    for path in &written {
        println!("Wrote {}", path.display());
    }
    Ok(())
}
