//! Decoded PCM data as seen by the stage.
//!
//! Decoding itself is delegated to a [`SoundLoader`] and the [`SoundDecoder`]s it
//! opens. This module only describes the decoded format and sizes the chunks
//! the stage pulls from a decoder.

mod loader;

use crate::error::Result;
pub use loader::SoundLoader;
use std::time::Duration;

/// Layout of decoded PCM data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    /// Sample rate in Hz (e.g., 22050, 44100)
    pub sample_rate: u32,
    /// Number of interleaved channels (1 = mono, 2 = stereo)
    pub channels: u16,
    /// Bits per sample (8 or 16 for most devices)
    pub bits_per_sample: u16,
}

impl PcmFormat {
    pub fn new(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
        }
    }

    /// Bytes in one frame (one sample from every channel).
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.bits_per_sample as usize / 8
    }

    /// Size in bytes of a chunk holding `duration` worth of audio.
    ///
    /// Never returns less than one frame, so a decoder can always make progress.
    pub fn chunk_bytes(&self, duration: Duration) -> usize {
        let frames = (self.sample_rate as u128 * duration.as_millis() / 1000) as usize;
        frames.max(1) * self.bytes_per_frame().max(1)
    }
}

/// A forward-only PCM decoder over one resource.
pub trait SoundDecoder: Send {
    /// Format of the PCM bytes produced by [`read_chunk`](Self::read_chunk).
    fn format(&self) -> PcmFormat;

    /// Fills `buf` with as many PCM bytes as are available, up to its length.
    ///
    /// Returns `Ok(0)` once the end of the data has been reached.
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// Decodes everything remaining in `decoder`.
pub fn decode_to_end(decoder: &mut dyn SoundDecoder, chunk: usize) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut scratch = vec![0u8; chunk.max(1)];
    loop {
        let read = decoder.read_chunk(&mut scratch)?;
        if read == 0 {
            break;
        }
        data.extend_from_slice(&scratch[..read]);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting {
        remaining: usize,
    }

    impl SoundDecoder for Counting {
        fn format(&self) -> PcmFormat {
            PcmFormat::new(8000, 1, 8)
        }

        fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
            let n = buf.len().min(self.remaining);
            buf[..n].fill(0x80);
            self.remaining -= n;
            Ok(n)
        }
    }

    #[test]
    fn chunk_bytes_follow_the_format() {
        let format = PcmFormat::new(44100, 2, 16);
        assert_eq!(format.bytes_per_frame(), 4);
        assert_eq!(format.chunk_bytes(Duration::from_millis(500)), 22050 * 4);
        assert_eq!(format.chunk_bytes(Duration::from_secs(1)), 44100 * 4);
    }

    #[test]
    fn tiny_durations_still_read_one_frame() {
        let format = PcmFormat::new(8000, 1, 16);
        assert_eq!(format.chunk_bytes(Duration::from_micros(10)), 2);
    }

    #[test]
    fn decode_to_end_drains_the_decoder() {
        let mut decoder = Counting { remaining: 1000 };
        let data = decode_to_end(&mut decoder, 256).unwrap();
        assert_eq!(data.len(), 1000);
        assert_eq!(decoder.read_chunk(&mut [0u8; 4]).unwrap(), 0);
    }
}
