//! Reading recorded sessions back.
//!
//! Frame files carry no header, so the reader must be told the geometry the
//! session was recorded with.

use std::path::{Path, PathBuf};

use crate::config::{FrameGeometry, StreamKind};
use crate::error::{RecorderError, Result};

/// Random access to the frames of one session directory.
#[derive(Debug, Clone)]
pub struct RecordingReader {
    directory: PathBuf,
    geometry: FrameGeometry,
    counts: [u64; 4],
}

impl RecordingReader {
    /// Open `<base>/<timestamp>` and count the frames of every stream.
    ///
    /// A stream's frame count is the length of the gap-free run `0, 1, 2, ...`
    /// of files in its directory; missing stream directories count as empty.
    pub fn open(directory: impl Into<PathBuf>, geometry: FrameGeometry) -> Result<Self> {
        let directory = directory.into();
        if !directory.is_dir() {
            return Err(RecorderError::io(
                &directory,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not a session directory"),
            ));
        }
        let mut counts = [0u64; 4];
        for (slot, stream) in counts.iter_mut().zip(StreamKind::ALL) {
            *slot = count_frames(&directory, stream);
        }
        tracing::debug!(
            "Opened {}: color {}, depth {}, index {}, tracked {}",
            directory.display(),
            counts[0],
            counts[1],
            counts[2],
            counts[3]
        );
        Ok(Self {
            directory,
            geometry,
            counts,
        })
    }

    /// Session directories under `base`, oldest first.
    pub fn sessions(base: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let base = base.as_ref();
        let entries = std::fs::read_dir(base).map_err(|e| RecorderError::io(base, e))?;
        let mut sessions: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_dir()
                    && StreamKind::ALL
                        .iter()
                        .any(|s| path.join(s.dir_name()).is_dir())
            })
            .collect();
        sessions.sort_by_cached_key(|path| session_order(path));
        Ok(sessions)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    pub fn frame_count(&self, stream: StreamKind) -> u64 {
        self.counts[stream_slot(stream)]
    }

    /// Streams with at least one frame.
    pub fn streams(&self) -> Vec<StreamKind> {
        StreamKind::ALL
            .into_iter()
            .filter(|s| self.frame_count(*s) > 0)
            .collect()
    }

    /// Path of frame `n` of `stream`, whether or not it exists.
    pub fn frame_path(&self, stream: StreamKind, n: u64) -> PathBuf {
        self.directory
            .join(stream.dir_name())
            .join(format!("{}.{}", n, stream.extension()))
    }

    fn read_bytes(&self, stream: StreamKind, n: u64, bytes_per_sample: usize) -> Result<Vec<u8>> {
        let path = self.frame_path(stream, n);
        let bytes = std::fs::read(&path).map_err(|e| RecorderError::io(&path, e))?;
        let expected = self.geometry.samples(stream) * bytes_per_sample;
        if bytes.len() != expected {
            return Err(RecorderError::FrameSize {
                stream,
                expected,
                actual: bytes.len(),
            });
        }
        Ok(bytes)
    }

    /// RGBA8 color frame `n`.
    pub fn color(&self, n: u64) -> Result<Vec<u8>> {
        self.read_bytes(StreamKind::Color, n, 1)
    }

    /// Depth frame `n` in raw sensor units.
    pub fn depth(&self, n: u64) -> Result<Vec<u16>> {
        let bytes = self.read_bytes(StreamKind::Depth, n, 2)?;
        Ok(bytes
            .chunks_exact(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
            .collect())
    }

    /// Body-index mask `n`.
    pub fn index(&self, n: u64) -> Result<Vec<u8>> {
        self.read_bytes(StreamKind::Index, n, 1)
    }

    /// Depth-aligned RGBA8 frame `n`.
    pub fn tracked_color(&self, n: u64) -> Result<Vec<u8>> {
        self.read_bytes(StreamKind::TrackedColor, n, 1)
    }
}

fn stream_slot(stream: StreamKind) -> usize {
    match stream {
        StreamKind::Color => 0,
        StreamKind::Depth => 1,
        StreamKind::Index => 2,
        StreamKind::TrackedColor => 3,
    }
}

fn count_frames(directory: &Path, stream: StreamKind) -> u64 {
    let dir = directory.join(stream.dir_name());
    let mut n = 0;
    while dir.join(format!("{}.{}", n, stream.extension())).is_file() {
        n += 1;
    }
    n
}

/// Sort key of a session directory: its timestamp, then the `_N` collision suffix.
fn session_order(path: &Path) -> (String, u32) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.rsplit_once('_') {
        Some((stamp, suffix)) => match suffix.parse() {
            Ok(n) => (stamp.to_string(), n),
            Err(_) => (name, 0),
        },
        None => (name, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, stream: StreamKind, n: u64, bytes: &[u8]) {
        let d = dir.join(stream.dir_name());
        std::fs::create_dir_all(&d).unwrap();
        std::fs::write(d.join(format!("{}.{}", n, stream.extension())), bytes).unwrap();
    }

    #[test]
    fn test_counts_stop_at_first_gap() {
        let tmp = tempfile::tempdir().unwrap();
        let geometry = FrameGeometry::new(1, 1, 1, 2);
        for n in [0, 1, 3] {
            write(tmp.path(), StreamKind::Index, n, &[0, 255]);
        }
        let reader = RecordingReader::open(tmp.path(), geometry).unwrap();
        assert_eq!(reader.frame_count(StreamKind::Index), 2);
        assert_eq!(reader.frame_count(StreamKind::Color), 0);
        assert_eq!(reader.streams(), vec![StreamKind::Index]);
        assert_eq!(reader.index(1).unwrap(), vec![0, 255]);
    }

    #[test]
    fn test_depth_is_little_endian() {
        let tmp = tempfile::tempdir().unwrap();
        let geometry = FrameGeometry::new(1, 1, 2, 1);
        write(tmp.path(), StreamKind::Depth, 0, &[0x94, 0x11, 0x01, 0x00]);
        let reader = RecordingReader::open(tmp.path(), geometry).unwrap();
        assert_eq!(reader.depth(0).unwrap(), vec![4500, 1]);
    }

    #[test]
    fn test_wrong_size_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let geometry = FrameGeometry::new(2, 1, 1, 1);
        write(tmp.path(), StreamKind::Color, 0, &[1, 2, 3, 4]);
        let reader = RecordingReader::open(tmp.path(), geometry).unwrap();
        assert!(matches!(
            reader.color(0),
            Err(RecorderError::FrameSize {
                stream: StreamKind::Color,
                expected: 8,
                actual: 4
            })
        ));
        assert!(matches!(reader.color(5), Err(RecorderError::Io { .. })));
    }

    #[test]
    fn test_sessions_are_sorted_and_filtered() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["2024-05-02_10-00-00", "2024-05-01_09-00-00"] {
            std::fs::create_dir_all(tmp.path().join(name).join("DEPTH")).unwrap();
        }
        std::fs::create_dir_all(tmp.path().join("notes")).unwrap();
        let sessions = RecordingReader::sessions(tmp.path()).unwrap();
        let names: Vec<_> = sessions
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["2024-05-01_09-00-00", "2024-05-02_10-00-00"]);
    }

    #[test]
    fn test_collision_suffixes_sort_numerically() {
        let tmp = tempfile::tempdir().unwrap();
        for name in [
            "2024-05-01_09-00-00_10",
            "2024-05-01_09-00-01",
            "2024-05-01_09-00-00_2",
            "2024-05-01_09-00-00",
        ] {
            std::fs::create_dir_all(tmp.path().join(name).join("COLOR")).unwrap();
        }
        let sessions = RecordingReader::sessions(tmp.path()).unwrap();
        let names: Vec<_> = sessions
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "2024-05-01_09-00-00",
                "2024-05-01_09-00-00_2",
                "2024-05-01_09-00-00_10",
                "2024-05-01_09-00-01",
            ]
        );
    }
}
