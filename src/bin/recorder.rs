//! RGB-D Recorder — captures color, depth, body index and depth-aligned color
//! to one raw file per frame and stream.
//!
//! Usage:
//!   recorder [options]
//!
//! Options:
//!   --output-dir <dir>      Base directory for sessions (default: recordings)
//!   --fps <n>               Frames saved per second (default: 10, 0 = none)
//!   --capture-fps <n>       Source frame rate (default: 30)
//!   --duration <seconds>    Stop after N seconds (default: Ctrl+C)
//!   --no-color              Skip the COLOR stream
//!   --no-depth              Skip the DEPTH stream
//!   --no-index              Skip the INDEX stream
//!   --no-tracked            Skip the TRACKEDCOLOR stream
//!   --noise <mm>            Depth noise of the synthetic source (default: 0)
//!   --realsense             Capture from an Intel RealSense camera

use anyhow::Result;
use rgbd_recorder::{
    ActiveStreams, CaptureSource, FrameGeometry, PatternSource, PinholeProjection,
    RecordingController, SessionConfig, SessionSummary, StreamKind,
};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

struct Args {
    output_dir: String,
    save_fps: u32,
    capture_fps: u32,
    duration_secs: Option<u64>,
    streams: ActiveStreams,
    noise_mm: u16,
    realsense: bool,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut output_dir = "recordings".to_string();
    let mut save_fps = rgbd_recorder::controller::DEFAULT_SAVE_FPS;
    let mut capture_fps = rgbd_recorder::controller::DEFAULT_CAPTURE_FPS;
    let mut duration_secs: Option<u64> = None;
    let mut streams = ActiveStreams::all();
    let mut noise_mm = 0;
    let mut realsense = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--output-dir" if i + 1 < args.len() => {
                output_dir = args[i + 1].clone();
                i += 2;
            }
            "--fps" if i + 1 < args.len() => {
                save_fps = args[i + 1].parse().unwrap_or(save_fps);
                i += 2;
            }
            "--capture-fps" if i + 1 < args.len() => {
                capture_fps = args[i + 1].parse().unwrap_or(capture_fps);
                i += 2;
            }
            "--duration" if i + 1 < args.len() => {
                duration_secs = args[i + 1].parse().ok();
                i += 2;
            }
            "--no-color" => {
                streams.color = false;
                i += 1;
            }
            "--no-depth" => {
                streams.depth = false;
                i += 1;
            }
            "--no-index" => {
                streams.index = false;
                i += 1;
            }
            "--no-tracked" => {
                streams.tracked_color = false;
                i += 1;
            }
            "--noise" if i + 1 < args.len() => {
                noise_mm = args[i + 1].parse().unwrap_or(0);
                i += 2;
            }
            "--realsense" => {
                realsense = true;
                i += 1;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Ignoring unknown argument: {}", other);
                i += 1;
            }
        }
    }

    Args {
        output_dir,
        save_fps,
        capture_fps,
        duration_secs,
        streams,
        noise_mm,
        realsense,
    }
}

fn print_usage() {
    println!("RGB-D Recorder — records color + depth + body index + aligned color, one file per frame");
    println!();
    println!("Usage: recorder [options]");
    println!();
    println!("Options:");
    println!("  --output-dir <dir>      Base directory for sessions (default: recordings)");
    println!("  --fps <n>               Frames saved per second (default: 10, 0 = none)");
    println!("  --capture-fps <n>       Source frame rate (default: 30)");
    println!("  --duration <seconds>    Stop after N seconds (default: Ctrl+C)");
    println!("  --no-color              Skip the COLOR stream");
    println!("  --no-depth              Skip the DEPTH stream");
    println!("  --no-index              Skip the INDEX stream");
    println!("  --no-tracked            Skip the TRACKEDCOLOR stream");
    println!("  --noise <mm>            Depth noise of the synthetic source (default: 0)");
    println!("  --realsense             Capture from an Intel RealSense camera");
    println!();
    println!("Press Ctrl+C once to stop and finish saving, twice to discard the backlog.");
    println!();
    println!("Examples:");
    println!("  recorder --duration 10");
    println!("  recorder --output-dir /data/takes --fps 30 --no-index");
    println!("  recorder --realsense --no-index --fps 15 --capture-fps 15");
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

fn open_source(args: &Args) -> Result<(Box<dyn CaptureSource>, PinholeProjection)> {
    if args.realsense {
        #[cfg(feature = "realsense")]
        {
            let geometry = FrameGeometry::new(640, 480, 640, 480);
            let source = rgbd_recorder::RealSenseSource::open(geometry, args.capture_fps, None)?;
            let projection = source.projection();
            return Ok((Box::new(source), projection));
        }
        #[cfg(not(feature = "realsense"))]
        anyhow::bail!("recorder was built without the `realsense` feature");
    }

    let source = PatternSource::new(FrameGeometry::default())
        .fps(args.capture_fps)
        .noise(args.noise_mm);
    Ok((Box::new(source), PinholeProjection::default()))
}

/// Capture until `stop` fires, then drain. `discard` hard-stops the drain.
fn run_capture(
    args: Args,
    stop: CancellationToken,
    discard: CancellationToken,
) -> Result<Vec<SessionSummary>> {
    let (mut source, projection) = open_source(&args)?;
    let config = SessionConfig::default()
        .geometry(source.geometry())
        .streams(args.streams);

    let mut recorder = RecordingController::new(config).with_projection(projection);
    recorder.set_capture_fps(args.capture_fps);
    recorder.set_save_fps(args.save_fps);

    recorder.start_recording(&args.output_dir)?;
    record(source.as_mut(), &mut recorder, &stop, &discard)?;
    Ok(recorder.completed().to_vec())
}

/// Feed `recorder` from `source` until `stop` fires or capture fails.
///
/// The recording is always stopped and drained before returning, so frames
/// already handed to the writers are saved even when capture failed.
fn record(
    source: &mut dyn CaptureSource,
    recorder: &mut RecordingController,
    stop: &CancellationToken,
    discard: &CancellationToken,
) -> Result<()> {
    let mut captured: u64 = 0;
    let mut kept: u64 = 0;
    let mut last_report = Instant::now();
    let mut capture_error = None;
    while !stop.is_cancelled() {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::info!("Source exhausted after {} frames", captured);
                break;
            }
            Err(e) => {
                capture_error = Some(e);
                break;
            }
        };
        captured += 1;
        match recorder.on_frame(&frame) {
            Ok(true) => kept += 1,
            Ok(false) => {}
            Err(e) => {
                capture_error = Some(e.into());
                break;
            }
        }
        if last_report.elapsed() >= Duration::from_secs(5) {
            tracing::info!("Captured {} frames, saved {}", captured, kept);
            last_report = Instant::now();
        }
    }
    if let Some(e) = &capture_error {
        tracing::error!("Capture failed after {} frames: {:#}", captured, e);
    }

    recorder.stop_recording()?;
    tracing::info!("Capture stopped, finishing writes...");
    while recorder.is_saving() {
        if discard.is_cancelled() {
            tracing::warn!("Discarding unsaved frames");
            recorder.shutdown();
            recorder.wait_until_saved(Duration::from_secs(10));
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    match capture_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rgbd_recorder=info".parse()?)
                .add_directive("recorder=info".parse()?)
                .add_directive("warn".parse()?),
        )
        .init();

    let args = parse_args();
    let stop = CancellationToken::new();
    let discard = CancellationToken::new();

    // Ctrl+C handler: first press stops capture, second discards the backlog
    let stop_clone = stop.clone();
    let discard_clone = discard.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Ctrl+C received, stopping...");
        stop_clone.cancel();
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Ctrl+C received again, discarding queued frames...");
        discard_clone.cancel();
    });

    // Duration timer
    if let Some(secs) = args.duration_secs {
        let stop_clone = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            tracing::info!("Duration reached ({}s), stopping...", secs);
            stop_clone.cancel();
        });
    }

    println!();
    println!("========================================");
    println!("RGB-D Recorder");
    println!("========================================");
    println!(
        "Source:     {}",
        if args.realsense { "RealSense" } else { "synthetic pattern" }
    );
    println!(
        "Streams:    {}",
        args.streams
            .iter()
            .map(|s| s.dir_name())
            .collect::<Vec<_>>()
            .join(" ")
    );
    println!("Save rate:  {} of {} fps", args.save_fps, args.capture_fps);
    println!("Output dir: {}", args.output_dir);
    if let Some(d) = args.duration_secs {
        println!("Duration:   {}s", d);
    } else {
        println!("Duration:   until Ctrl+C");
    }
    println!("========================================");
    println!();

    let start = Instant::now();
    let summaries =
        tokio::task::spawn_blocking(move || run_capture(args, stop, discard)).await??;
    let elapsed = start.elapsed().as_secs();

    println!();
    println!("========================================");
    println!("Recording complete");
    println!("========================================");
    for summary in &summaries {
        println!("Session:    {}", summary.directory.display());
        println!("Frames:     {}", summary.frames_added);
        for stream in StreamKind::ALL {
            if let Some(written) = summary.frames_written(stream) {
                println!("  {:<14}{} files", stream.dir_name(), written);
            }
        }
        for (stream, message) in &summary.failures {
            println!("  {:<14}FAILED: {}", stream.dir_name(), message);
        }
    }
    println!("Duration:   {}s", elapsed);
    println!("========================================");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Yields `frames` pattern frames, then fails like a device timeout.
    struct FlakySource {
        inner: PatternSource,
        frames: u64,
    }

    impl CaptureSource for FlakySource {
        fn geometry(&self) -> FrameGeometry {
            self.inner.geometry()
        }

        fn next_frame(&mut self) -> Result<Option<rgbd_recorder::CaptureFrame<'_>>> {
            if self.inner.frame_number() >= self.frames {
                anyhow::bail!("Frame didn't arrive within 5000 ms");
            }
            self.inner.next_frame()
        }
    }

    #[test]
    fn test_capture_error_still_saves_accepted_frames() {
        let tmp = tempfile::tempdir().unwrap();
        let geometry = FrameGeometry::new(8, 4, 4, 4);
        let mut source = FlakySource {
            inner: PatternSource::new(geometry).fps(0),
            frames: 40,
        };
        let config = SessionConfig::new(tmp.path())
            .geometry(geometry)
            .streams(ActiveStreams::from_kinds(&[StreamKind::Depth, StreamKind::Index]))
            .poll_interval(Duration::from_millis(2));
        let mut recorder = RecordingController::new(config);
        recorder.set_save_fps(30);
        recorder.start_recording(tmp.path()).unwrap();

        let err = record(
            &mut source,
            &mut recorder,
            &CancellationToken::new(),
            &CancellationToken::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("didn't arrive"));

        assert!(!recorder.is_recording());
        assert!(!recorder.is_saving());
        let summary = &recorder.completed()[0];
        assert_eq!(summary.frames_added, 40);
        assert_eq!(summary.frames_written(StreamKind::Depth), Some(40));
        assert_eq!(summary.frames_written(StreamKind::Index), Some(40));
    }
}
