//! **AudioClip** — the one audio artifact that moves through the pipeline.
//!
//! 16-bit little-endian mono PCM plus sample rate plus a *declared* duration.
//! The duration is carried, not derived: the synthesis worker declares
//! `min(len * 0.1, 3.0)` seconds and the playback sink must honor that
//! contract even when a real synthesizer replaces the placeholder.

use std::io::Write;
use std::time::Duration;

/// PCM sample buffer with its sample rate and declared duration.
///
/// Ownership transfers from producer to consumer exactly once per turn:
/// capture → transcription, synthesis → playback.
#[derive(Debug, Clone)]
pub struct AudioClip {
    /// 16-bit little-endian mono samples.
    pub pcm: Vec<u8>,
    /// Sample rate in Hz (capture default 16000, synthesis default 22050).
    pub sample_rate: u32,
    /// Declared duration. For captured audio this is derived from the
    /// buffer; synthesis workers declare it explicitly.
    pub duration: Duration,
}

impl AudioClip {
    /// Build a clip with an explicitly declared duration.
    pub fn new(pcm: Vec<u8>, sample_rate: u32, duration: Duration) -> Self {
        Self {
            pcm,
            sample_rate,
            duration,
        }
    }

    /// Build a clip from raw PCM bytes, deriving the duration from the
    /// buffer length (`bytes / (rate * 2)` seconds, 16-bit mono).
    pub fn from_pcm(pcm: Vec<u8>, sample_rate: u32) -> Self {
        let secs = pcm.len() as f64 / (f64::from(sample_rate) * 2.0);
        Self {
            pcm,
            sample_rate,
            duration: Duration::from_secs_f64(secs),
        }
    }

    /// Build a clip from f32 samples in -1.0..1.0 (capture format).
    pub fn from_samples(samples: &[f32], sample_rate: u32) -> Self {
        let mut pcm = Vec::with_capacity(samples.len() * 2);
        for &s in samples {
            let clamped = s.clamp(-1.0, 1.0);
            let i = (clamped * 32767.0).round() as i16;
            pcm.extend_from_slice(&i.to_le_bytes());
        }
        Self::from_pcm(pcm, sample_rate)
    }

    /// A silent clip of the given duration. Test fixture for scripted
    /// recordings; the transcription placeholder only looks at length.
    pub fn silence(duration: Duration, sample_rate: u32) -> Self {
        let samples = (duration.as_secs_f64() * f64::from(sample_rate)).floor() as usize;
        Self::new(vec![0u8; samples * 2], sample_rate, duration)
    }

    /// Estimated duration in seconds from the buffer alone. The
    /// transcription placeholder buckets on this, not on `duration`.
    pub fn estimated_secs(&self) -> f64 {
        self.pcm.len() as f64 / (f64::from(self.sample_rate) * 2.0)
    }

    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }

    /// Wrap the PCM payload in a minimal 44-byte RIFF/WAVE header so the
    /// playback sink gets a self-contained byte stream.
    pub fn to_wav(&self) -> Vec<u8> {
        let data_len = self.pcm.len() as u32;
        let file_len = 44 + data_len;

        let mut buf = Vec::with_capacity(44 + self.pcm.len());
        // RIFF header
        buf.write_all(b"RIFF").unwrap();
        buf.write_all(&(file_len - 8).to_le_bytes()).unwrap();
        buf.write_all(b"WAVE").unwrap();
        // fmt subchunk
        buf.write_all(b"fmt ").unwrap();
        buf.write_all(&16u32.to_le_bytes()).unwrap(); // subchunk1 size
        buf.write_all(&1u16.to_le_bytes()).unwrap(); // PCM
        buf.write_all(&1u16.to_le_bytes()).unwrap(); // mono
        buf.write_all(&self.sample_rate.to_le_bytes()).unwrap();
        buf.write_all(&(self.sample_rate * 2).to_le_bytes()).unwrap(); // byte rate
        buf.write_all(&2u16.to_le_bytes()).unwrap(); // block align
        buf.write_all(&16u16.to_le_bytes()).unwrap(); // bits per sample
        // data subchunk
        buf.write_all(b"data").unwrap();
        buf.write_all(&data_len.to_le_bytes()).unwrap();
        buf.extend_from_slice(&self.pcm);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_duration_matches_buffer() {
        let clip = AudioClip::from_pcm(vec![0u8; 32000], 16000);
        assert!((clip.duration.as_secs_f64() - 1.0).abs() < 1e-9);
        assert!((clip.estimated_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn silence_has_expected_length() {
        let clip = AudioClip::silence(Duration::from_millis(2500), 16000);
        assert_eq!(clip.pcm.len(), 40_000 * 2);
        assert!((clip.estimated_secs() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn samples_round_to_i16() {
        let clip = AudioClip::from_samples(&[0.0, 1.0, -1.0], 16000);
        assert_eq!(clip.pcm.len(), 6);
        assert_eq!(i16::from_le_bytes([clip.pcm[2], clip.pcm[3]]), 32767);
        assert_eq!(i16::from_le_bytes([clip.pcm[4], clip.pcm[5]]), -32767);
    }

    #[test]
    fn wav_header_is_well_formed() {
        let clip = AudioClip::from_pcm(vec![0u8; 320], 16000);
        let wav = clip.to_wav();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(wav.len(), 44 + 320);
        let data_len = u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]);
        assert_eq!(data_len, 320);
    }
}
