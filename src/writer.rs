//! Background stream writers.
//!
//! Every output stream gets one [`StreamWriter`]: a FIFO queue plus a dedicated
//! OS thread that drains it to `<dir>/<seq>.<ext>`. What gets written is
//! decided by a [`FrameSink`]; the queue, numbering, stop protocol and error
//! reporting are shared by all sinks.
//!
//! State machine:
//!
//! ```text
//! Running ──soft──▶ SoftStopRequested ──queue empty──▶ Stopped
//!    │                     │
//!    └──────hard───────────┴──▶ HardStopRequested ──discard queue──▶ Stopped
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::StreamKind;
use crate::error::{RecorderError, Result};
use crate::pool::PoolEntry;

/// Something queued at a writer that holds pool entries.
pub trait Releasable: Send + 'static {
    /// Give back every pool hold this item carries.
    fn release(self);
}

impl<T: Send + Sync + 'static> Releasable for PoolEntry<T> {
    fn release(self) {
        PoolEntry::release(self)
    }
}

/// Serialization strategy of a writer.
pub trait FrameSink: Send + 'static {
    type Item: Releasable;

    /// Serialize one queued item into `out`. The writer owns file creation,
    /// numbering and releasing the item.
    fn write_frame(&mut self, item: &Self::Item, out: &mut dyn Write) -> std::io::Result<()>;
}

/// Lifecycle of a writer thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Running,
    /// Draining the queue, then stopping.
    SoftStopRequested,
    /// Discarding the queue, then stopping.
    HardStopRequested,
    Stopped,
}

impl WriterState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Running,
            1 => Self::SoftStopRequested,
            2 => Self::HardStopRequested,
            _ => Self::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Running => 0,
            Self::SoftStopRequested => 1,
            Self::HardStopRequested => 2,
            Self::Stopped => 3,
        }
    }
}

struct Shared {
    state: AtomicU8,
    frames_written: AtomicU64,
    failure: Mutex<Option<String>>,
}

impl Shared {
    fn state(&self) -> WriterState {
        WriterState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move from one of `from` to `to`. Returns false if the current state is not in `from`.
    fn transition(&self, from: &[WriterState], to: WriterState) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if !from.contains(&WriterState::from_u8(current)) {
                return false;
            }
            match self.state.compare_exchange(
                current,
                to.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn set_failure(&self, message: String) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(message);
    }

    fn failure(&self) -> Option<String> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Per-writer totals reported after the thread has been joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterSummary {
    pub stream: StreamKind,
    pub directory: PathBuf,
    pub frames_written: u64,
}

/// A queue of frames persisted by a dedicated background thread.
pub struct StreamWriter<S: FrameSink> {
    stream: StreamKind,
    directory: PathBuf,
    /// Sender side of the queue. The writer thread takes it before its final
    /// drain, so nothing can be queued after that drain.
    tx: Arc<Mutex<Option<Sender<S::Item>>>>,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl<S: FrameSink> StreamWriter<S> {
    /// Create `directory` (if needed) and start the writer thread in `Running` state.
    pub fn spawn(
        stream: StreamKind,
        directory: impl Into<PathBuf>,
        sink: S,
        poll_interval: Duration,
    ) -> Result<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory).map_err(|e| RecorderError::io(&directory, e))?;

        let (tx, rx) = mpsc::channel::<S::Item>();
        let shared = Arc::new(Shared {
            state: AtomicU8::new(WriterState::Running.as_u8()),
            frames_written: AtomicU64::new(0),
            failure: Mutex::new(None),
        });

        let tx = Arc::new(Mutex::new(Some(tx)));

        let thread_shared = Arc::clone(&shared);
        let thread_tx = Arc::clone(&tx);
        let thread_dir = directory.clone();
        let handle = std::thread::Builder::new()
            .name(format!("{}-writer", stream.dir_name().to_lowercase()))
            .spawn(move || {
                writer_loop(stream, &thread_dir, sink, &rx, &thread_shared, poll_interval);
                thread_tx.lock().unwrap_or_else(PoisonError::into_inner).take();
                let late = discard_queue(&rx);
                if late > 0 {
                    tracing::debug!("{}: released {} frames queued during shutdown", stream, late);
                }
                thread_shared
                    .state
                    .store(WriterState::Stopped.as_u8(), Ordering::Release);
            })
            .map_err(|e| RecorderError::io(&directory, e))?;

        tracing::debug!("{} writer started in {}", stream, directory.display());

        Ok(Self {
            stream,
            directory,
            tx,
            shared,
            handle: Some(handle),
        })
    }

    /// Append an item to the tail of the queue. Never waits on the writer.
    ///
    /// Once the writer thread is shutting down (failure or completed stop)
    /// the item is released immediately instead of being queued.
    pub fn enqueue(&self, item: S::Item) {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = tx.as_ref() else {
            tracing::trace!("{} writer is gone, dropping frame", self.stream);
            item.release();
            return;
        };
        if let Err(mpsc::SendError(item)) = tx.send(item) {
            item.release();
        }
    }

    /// Finish writing everything queued, then stop. No-op unless running.
    pub fn request_soft_stop(&self) {
        if self
            .shared
            .transition(&[WriterState::Running], WriterState::SoftStopRequested)
        {
            tracing::debug!("{} writer: soft stop requested", self.stream);
        }
    }

    /// Stop at the next iteration, discarding queued frames. No-op once stopped.
    pub fn request_hard_stop(&self) {
        if self.shared.transition(
            &[WriterState::Running, WriterState::SoftStopRequested],
            WriterState::HardStopRequested,
        ) {
            tracing::debug!("{} writer: hard stop requested", self.stream);
        }
    }

    pub fn state(&self) -> WriterState {
        self.shared.state()
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == WriterState::Stopped
    }

    pub fn stream(&self) -> StreamKind {
        self.stream
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Files successfully written so far; also the next sequence number.
    pub fn frames_written(&self) -> u64 {
        self.shared.frames_written.load(Ordering::Acquire)
    }

    /// Error message if the writer stopped because a write failed.
    pub fn failure(&self) -> Option<String> {
        self.shared.failure()
    }

    /// Wait until the thread reports `Stopped`. Returns false on timeout.
    pub fn wait_until_stopped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_stopped() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep((deadline - now).min(Duration::from_millis(2)));
        }
    }

    /// Join the writer thread.
    ///
    /// A still-running writer is soft-stopped first, so this returns once the
    /// queue is drained. Reports the write failure, if any.
    pub fn join(&mut self) -> Result<WriterSummary> {
        self.request_soft_stop();
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                return Err(RecorderError::WriterPanicked(self.stream));
            }
        }
        if let Some(message) = self.failure() {
            return Err(RecorderError::Writer {
                stream: self.stream,
                message,
            });
        }
        Ok(WriterSummary {
            stream: self.stream,
            directory: self.directory.clone(),
            frames_written: self.frames_written(),
        })
    }
}

impl<S: FrameSink> Drop for StreamWriter<S> {
    fn drop(&mut self) {
        // Detach rather than join: dropping must not block the producer.
        if self.handle.is_some() {
            self.request_soft_stop();
        }
    }
}

fn writer_loop<S: FrameSink>(
    stream: StreamKind,
    directory: &Path,
    mut sink: S,
    rx: &Receiver<S::Item>,
    shared: &Shared,
    poll_interval: Duration,
) {
    let mut sequence: u64 = 0;

    loop {
        let item = match shared.state() {
            WriterState::HardStopRequested | WriterState::Stopped => {
                let discarded = discard_queue(rx);
                tracing::info!(
                    "{}: stopped after {} frames ({} queued frames discarded)",
                    stream,
                    sequence,
                    discarded
                );
                return;
            }
            WriterState::SoftStopRequested => match rx.try_recv() {
                Ok(item) => item,
                Err(_) => {
                    tracing::info!("{}: done saving, {} frames", stream, sequence);
                    return;
                }
            },
            WriterState::Running => match rx.recv_timeout(poll_interval) {
                Ok(item) => item,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::debug!("{}: queue closed after {} frames", stream, sequence);
                    return;
                }
            },
        };

        // A hard stop may have arrived while we were waiting on the queue.
        if shared.state() == WriterState::HardStopRequested {
            item.release();
            continue;
        }

        let path = directory.join(format!("{}.{}", sequence, stream.extension()));
        let result = write_file(&mut sink, &item, &path);
        item.release();

        match result {
            Ok(()) => {
                sequence += 1;
                shared.frames_written.store(sequence, Ordering::Release);
                tracing::trace!("{}: wrote {}", stream, path.display());
            }
            Err(e) => {
                let _ = std::fs::remove_file(&path);
                tracing::error!("{}: failed to write {}: {}", stream, path.display(), e);
                shared.set_failure(format!("{}: {}", path.display(), e));
                let discarded = discard_queue(rx);
                if discarded > 0 {
                    tracing::warn!("{}: dropped {} queued frames after failure", stream, discarded);
                }
                return;
            }
        }
    }
}

fn write_file<S: FrameSink>(sink: &mut S, item: &S::Item, path: &Path) -> std::io::Result<()> {
    let file = File::create_new(path)?;
    let mut out = BufWriter::new(file);
    sink.write_frame(item, &mut out)?;
    out.flush()
}

/// Release everything still queued without writing it.
fn discard_queue<I: Releasable>(rx: &Receiver<I>) -> usize {
    let mut discarded = 0;
    while let Ok(item) = rx.try_recv() {
        item.release();
        discarded += 1;
    }
    discarded
}
