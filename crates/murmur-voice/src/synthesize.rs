//! **Text-to-speech channel** — turn reply text into a playable clip.
//!
//! Mirrors the transcription channel's two-phase lifecycle. The shipped
//! worker renders a fixed-amplitude sine tone whose frequency is perturbed
//! by the text length; it is a placeholder, not synthesis. A real worker
//! must preserve the artifact contract exactly: PCM buffer + sample rate +
//! declared duration.

use std::thread;
use std::time::Duration;

use crate::channel::{InitParams, Lifecycle, StageWorker, WorkerChannel};
use crate::clip::AudioClip;
use crate::error::VoiceResult;

/// Per-request synthesis options.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisOptions {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self { sample_rate: 22050 }
    }
}

/// One synthesis request crossing the worker boundary.
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub text: String,
    pub options: SynthesisOptions,
}

/// Message-passing boundary to the text-to-speech worker.
pub struct SynthesisChannel {
    channel: WorkerChannel<SpeechRequest, AudioClip>,
}

impl SynthesisChannel {
    pub fn spawn<W>(worker: W) -> Self
    where
        W: StageWorker<Request = SpeechRequest, Response = AudioClip>,
    {
        Self {
            channel: WorkerChannel::spawn("tts", worker),
        }
    }

    /// Spawn the placeholder worker with its demo latencies.
    pub fn placeholder() -> Self {
        Self::spawn(PlaceholderTtsWorker::default())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.channel = self.channel.with_timeout(timeout);
        self
    }

    /// Idempotent one-time model setup.
    pub async fn initialize(&self, model_ref: &str) -> VoiceResult<()> {
        self.channel.initialize(model_ref).await
    }

    /// Synthesize one reply. Requires `Ready`.
    pub async fn synthesize(
        &self,
        text: &str,
        options: SynthesisOptions,
    ) -> VoiceResult<AudioClip> {
        self.channel
            .request(SpeechRequest {
                text: text.to_string(),
                options,
            })
            .await
    }

    pub fn state(&self) -> Lifecycle {
        self.channel.state()
    }
}

/// Synthesized duration: one tenth of a second per character, capped at 3 s.
pub fn placeholder_duration_secs(text: &str) -> f64 {
    (text.len() as f64 * 0.1).min(3.0)
}

/// Placeholder text-to-speech worker.
///
/// Renders `sin(2π f t) * 0.1` at `f = 440 + (len % 10) * 50` Hz for
/// `min(len * 0.1, 3.0)` seconds, 16-bit mono.
#[derive(Debug, Clone)]
pub struct PlaceholderTtsWorker {
    /// Simulated model-load time.
    pub load_delay: Duration,
    /// Simulated per-request render time.
    pub render_delay: Duration,
}

impl Default for PlaceholderTtsWorker {
    fn default() -> Self {
        Self {
            load_delay: Duration::from_millis(800),
            render_delay: Duration::from_millis(150),
        }
    }
}

impl PlaceholderTtsWorker {
    /// Zero-delay variant for tests.
    pub fn instant() -> Self {
        Self {
            load_delay: Duration::ZERO,
            render_delay: Duration::ZERO,
        }
    }
}

impl StageWorker for PlaceholderTtsWorker {
    type Request = SpeechRequest;
    type Response = AudioClip;

    fn load(&mut self, _params: &InitParams) -> Result<(), String> {
        thread::sleep(self.load_delay);
        Ok(())
    }

    fn run(&mut self, request: SpeechRequest) -> Result<AudioClip, String> {
        thread::sleep(self.render_delay);

        let sample_rate = request.options.sample_rate;
        let text_len = request.text.len();
        let duration_secs = placeholder_duration_secs(&request.text);
        let samples = (f64::from(sample_rate) * duration_secs).floor() as usize;
        let frequency = 440.0 + (text_len % 10) as f64 * 50.0;

        let mut pcm = Vec::with_capacity(samples * 2);
        for i in 0..samples {
            let t = i as f64 / f64::from(sample_rate);
            let sample = (2.0 * std::f64::consts::PI * frequency * t).sin() * 0.1;
            let value = (sample * 32767.0) as i16;
            pcm.extend_from_slice(&value.to_le_bytes());
        }

        Ok(AudioClip::new(
            pcm,
            sample_rate,
            Duration::from_secs_f64(duration_secs),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VoiceError;

    #[tokio::test]
    async fn duration_and_buffer_follow_the_contract() {
        let ch = SynthesisChannel::spawn(PlaceholderTtsWorker::instant());
        ch.initialize("tts-mini.bin").await.unwrap();
        let opts = SynthesisOptions::default();

        let long = "x".repeat(80);
        for text in ["Hi", "Tell me a joke", long.as_str()] {
            let clip = ch.synthesize(text, opts).await.unwrap();
            let expected_secs = placeholder_duration_secs(text);
            assert!(
                (clip.duration.as_secs_f64() - expected_secs).abs() < 1e-9,
                "declared duration for {:?}",
                text.len()
            );
            let expected_samples = (f64::from(opts.sample_rate) * expected_secs).floor() as usize;
            assert_eq!(clip.pcm.len(), expected_samples * 2);
            assert_eq!(clip.sample_rate, opts.sample_rate);
        }
    }

    #[tokio::test]
    async fn long_text_caps_at_three_seconds() {
        let ch = SynthesisChannel::spawn(PlaceholderTtsWorker::instant());
        ch.initialize("tts-mini.bin").await.unwrap();

        let text = "a".repeat(500);
        let clip = ch
            .synthesize(&text, SynthesisOptions::default())
            .await
            .unwrap();
        assert!((clip.duration.as_secs_f64() - 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn synthesize_before_initialize_fails() {
        let ch = SynthesisChannel::spawn(PlaceholderTtsWorker::instant());
        let err = ch
            .synthesize("hello", SynthesisOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, VoiceError::InvalidState { .. }));
    }

    #[test]
    fn tone_is_not_silence() {
        let mut worker = PlaceholderTtsWorker::instant();
        let clip = worker
            .run(SpeechRequest {
                text: "hello there".to_string(),
                options: SynthesisOptions::default(),
            })
            .unwrap();
        let peak = clip
            .pcm
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]).unsigned_abs())
            .max()
            .unwrap();
        // Amplitude 0.1 of full scale, allowing for sample phase.
        assert!(peak > 2500 && peak <= 3277);
    }
}
