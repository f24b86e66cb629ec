//! Verbatim buffer sinks for the color, depth and body-index streams.

use std::io::Write;
use std::marker::PhantomData;

use crate::pool::PoolEntry;
use crate::writer::FrameSink;

/// A sample type that can be written to disk without a header.
pub trait RawSample: Copy + Default + Send + Sync + 'static {
    /// Write `samples` in their on-disk representation.
    fn write_samples(samples: &[Self], out: &mut dyn Write) -> std::io::Result<()>;
}

impl RawSample for u8 {
    fn write_samples(samples: &[Self], out: &mut dyn Write) -> std::io::Result<()> {
        out.write_all(samples)
    }
}

impl RawSample for u16 {
    /// Little-endian, two bytes per sample.
    fn write_samples(samples: &[Self], out: &mut dyn Write) -> std::io::Result<()> {
        let mut chunk = [0u8; 4096];
        for block in samples.chunks(chunk.len() / 2) {
            for (dst, sample) in chunk.chunks_exact_mut(2).zip(block) {
                dst.copy_from_slice(&sample.to_le_bytes());
            }
            out.write_all(&chunk[..block.len() * 2])?;
        }
        Ok(())
    }
}

/// Writes each pooled buffer unmodified, one file per frame.
pub struct RawSink<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> RawSink<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for RawSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: RawSample> FrameSink for RawSink<T> {
    type Item = PoolEntry<T>;

    fn write_frame(&mut self, item: &Self::Item, out: &mut dyn Write) -> std::io::Result<()> {
        let buffer = item.read();
        T::write_samples(&buffer, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::pool::FramePool;

    #[test]
    fn test_u16_little_endian() {
        let mut out = Vec::new();
        u16::write_samples(&[0x0102, 0xA0B0, 4500], &mut out).unwrap();
        assert_eq!(out, vec![0x02, 0x01, 0xB0, 0xA0, 0x94, 0x11]);
    }

    #[test]
    fn test_u16_spans_several_chunks() {
        let samples: Vec<u16> = (0..5000u16).collect();
        let mut out = Vec::new();
        u16::write_samples(&samples, &mut out).unwrap();
        assert_eq!(out.len(), 10_000);
        assert_eq!(&out[9998..], &4999u16.to_le_bytes());
    }

    #[test]
    fn test_raw_sink_writes_buffer() {
        let mut pool = FramePool::<u8>::new("index", 3, PoolConfig::new(1));
        let entry = pool.acquire(1);
        entry.copy_from(&[0, 255, 3]);

        let mut out = Vec::new();
        RawSink::<u8>::new().write_frame(&entry, &mut out).unwrap();
        assert_eq!(out, vec![0, 255, 3]);
        entry.release();
    }
}
