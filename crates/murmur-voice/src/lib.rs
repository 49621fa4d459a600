//! # Murmur Voice - Turn-Taking Pipeline
//!
//! One conversational turn: record microphone audio, transcribe it behind a
//! worker boundary, generate a reply through a hosted completion API,
//! synthesize speech behind a second worker boundary, and play the result.
//! The shipped speech workers are placeholders (canned phrases, sine tones)
//! isolated behind the same channel contract a real model would use.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Turn Orchestrator                       │
//! │  ┌──────────┐  ┌─────────────┐  ┌──────────┐  ┌───────────┐ │
//! │  │ Mic In   │→ │ STT channel │→ │ Response │→ │TTS channel│ │
//! │  │ (cpal)   │  │ (worker)    │  │ (reqwest)│  │ (worker)  │ │
//! │  └──────────┘  └─────────────┘  └──────────┘  └─────┬─────┘ │
//! │        ┌──────────────┐                             │       │
//! │        │  Audio Out   │←────────────────────────────┘       │
//! │        │  (rodio)     │     one clip per turn               │
//! │        └──────────────┘                                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stage timings (stt, api, tts, total in milliseconds) are published to an
//! observer after playback begins, one record per completed turn.

pub mod capture;
pub mod channel;
pub mod clip;
pub mod error;
pub mod orchestrator;
pub mod playback;
pub mod respond;
pub mod synthesize;
pub mod transcribe;

pub use capture::{MicBackend, MicCapture, ScriptedMic, CAPTURE_SAMPLE_RATE};
pub use channel::{
    ChannelMessage, InitParams, Lifecycle, StageWorker, WorkerChannel, DEFAULT_REQUEST_TIMEOUT,
};
pub use clip::AudioClip;
pub use error::{VoiceError, VoiceResult};
pub use orchestrator::{CompletedTurn, TimingRecord, TurnOrchestrator, TurnPhase};
pub use playback::{NullSink, PlaybackSink, SpeakerSink};
pub use respond::{GeneratedReply, ResponseGenerator, TokenUsage};
pub use synthesize::{
    placeholder_duration_secs, PlaceholderTtsWorker, SpeechRequest, SynthesisChannel,
    SynthesisOptions,
};
pub use transcribe::{PlaceholderSttWorker, Transcript, TranscriptionChannel};
