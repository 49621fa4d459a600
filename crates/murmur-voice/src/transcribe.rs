//! **Speech-to-text channel** — turn a captured clip into text.
//!
//! The shipped worker is a placeholder: it buckets the clip's estimated
//! duration into one-second intervals and returns a canned phrase. It is a
//! test fixture standing in for real inference, isolated behind the same
//! channel contract so a real Whisper worker can replace it without
//! touching the orchestrator.

use std::thread;
use std::time::Duration;

use crate::channel::{InitParams, Lifecycle, StageWorker, WorkerChannel};
use crate::clip::AudioClip;
use crate::error::VoiceResult;

/// Transcription output: text plus a confidence in [0, 1].
#[derive(Debug, Clone)]
pub struct Transcript {
    pub text: String,
    pub confidence: f32,
}

/// Message-passing boundary to the speech-to-text worker.
pub struct TranscriptionChannel {
    channel: WorkerChannel<AudioClip, Transcript>,
}

impl TranscriptionChannel {
    /// Spawn a channel around any transcription worker.
    pub fn spawn<W>(worker: W) -> Self
    where
        W: StageWorker<Request = AudioClip, Response = Transcript>,
    {
        Self {
            channel: WorkerChannel::spawn("stt", worker),
        }
    }

    /// Spawn the placeholder worker with its demo latencies.
    pub fn placeholder() -> Self {
        Self::spawn(PlaceholderSttWorker::default())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.channel = self.channel.with_timeout(timeout);
        self
    }

    /// Idempotent one-time model setup. See `WorkerChannel::initialize`.
    pub async fn initialize(&self, model_ref: &str) -> VoiceResult<()> {
        self.channel.initialize(model_ref).await
    }

    /// Transcribe one clip. Requires the channel to be `Ready`; on timeout
    /// or worker error the turn must fail — no substitute text is produced
    /// at this boundary.
    pub async fn transcribe(&self, clip: AudioClip) -> VoiceResult<Transcript> {
        self.channel.request(clip).await
    }

    pub fn state(&self) -> Lifecycle {
        self.channel.state()
    }
}

/// Canned phrases, one per one-second duration bucket (0-1s, 1-2s, ... 9s+).
const CANNED_PHRASES: [&str; 10] = [
    "Hi",
    "Hello",
    "How are you?",
    "What's the weather like?",
    "Can you help me with something?",
    "Tell me a joke",
    "What time is it?",
    "How do I make coffee?",
    "What's the capital of France?",
    "Can you explain how this voice assistant works?",
];

/// Placeholder speech-to-text worker.
///
/// Buckets the clip's byte-length-derived duration into `CANNED_PHRASES`
/// and reports a confidence in [0.85, 0.95). Not a transcription
/// algorithm — a stand-in for model inference with the same shape.
#[derive(Debug, Clone)]
pub struct PlaceholderSttWorker {
    /// Simulated model-load time.
    pub load_delay: Duration,
    /// Simulated per-request inference time.
    pub infer_delay: Duration,
}

impl Default for PlaceholderSttWorker {
    fn default() -> Self {
        Self {
            load_delay: Duration::from_millis(1000),
            infer_delay: Duration::from_millis(200),
        }
    }
}

impl PlaceholderSttWorker {
    /// Zero-delay variant for tests.
    pub fn instant() -> Self {
        Self {
            load_delay: Duration::ZERO,
            infer_delay: Duration::ZERO,
        }
    }
}

impl StageWorker for PlaceholderSttWorker {
    type Request = AudioClip;
    type Response = Transcript;

    fn load(&mut self, _params: &InitParams) -> Result<(), String> {
        thread::sleep(self.load_delay);
        Ok(())
    }

    fn run(&mut self, clip: AudioClip) -> Result<Transcript, String> {
        thread::sleep(self.infer_delay);

        let secs = clip.estimated_secs();
        let bucket = (secs.floor() as usize).min(CANNED_PHRASES.len() - 1);
        // Deterministic stand-in for the original's random jitter.
        let jitter = (clip.pcm.len() % 100) as f32 / 1000.0;

        Ok(Transcript {
            text: CANNED_PHRASES[bucket].to_string(),
            confidence: 0.85 + jitter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VoiceError;

    fn clip_of(secs: f64) -> AudioClip {
        AudioClip::silence(Duration::from_secs_f64(secs), 16000)
    }

    #[tokio::test]
    async fn buckets_follow_estimated_duration() {
        let ch = TranscriptionChannel::spawn(PlaceholderSttWorker::instant());
        ch.initialize("whisper-tiny.bin").await.unwrap();

        let cases = [
            (0.5, "Hi"),
            (1.5, "Hello"),
            (2.5, "How are you?"),
            (3.5, "What's the weather like?"),
            (8.2, "What's the capital of France?"),
            (15.0, "Can you explain how this voice assistant works?"),
        ];
        for (secs, expected) in cases {
            let t = ch.transcribe(clip_of(secs)).await.unwrap();
            assert_eq!(t.text, expected, "bucket for {secs}s");
        }
    }

    #[tokio::test]
    async fn every_bucket_yields_text_and_bounded_confidence() {
        let ch = TranscriptionChannel::spawn(PlaceholderSttWorker::instant());
        ch.initialize("whisper-tiny.bin").await.unwrap();

        for tenth in 0..100 {
            let t = ch.transcribe(clip_of(f64::from(tenth) / 10.0)).await.unwrap();
            assert!(!t.text.is_empty());
            assert!((0.0..=1.0).contains(&t.confidence));
        }
    }

    #[tokio::test]
    async fn transcribe_before_initialize_fails() {
        let ch = TranscriptionChannel::spawn(PlaceholderSttWorker::instant());
        let err = ch.transcribe(clip_of(1.0)).await.unwrap_err();
        assert!(matches!(err, VoiceError::InvalidState { .. }));
    }
}
