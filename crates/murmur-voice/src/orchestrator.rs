//! **TurnOrchestrator** — the main coordination layer.
//!
//! Sequences one conversational turn: capture → transcribe → generate →
//! synthesize → play. The orchestrator is the only component aware of the
//! full chain; each stage consumes its predecessor's output by ownership
//! transfer. Stages never overlap.
//!
//! Timing: each stage is measured with its own clock, and the total is
//! wall-clock from capture-stop to playback-start. The total is an
//! independent measurement, not the sum of the stages.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::capture::MicBackend;
use crate::error::{VoiceError, VoiceResult};
use crate::playback::PlaybackSink;
use crate::respond::{GeneratedReply, ResponseGenerator};
use crate::synthesize::{SynthesisChannel, SynthesisOptions};
use crate::transcribe::{Transcript, TranscriptionChannel};

/// Per-turn latency measurements in milliseconds, all non-negative.
///
/// `total` covers capture-stop to playback-start and can be smaller than
/// `stt + api + tts` would suggest; treat it as independently measured.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TimingRecord {
    /// Speech-to-text latency.
    pub stt: f64,
    /// Remote response generation latency.
    pub api: f64,
    /// Speech synthesis latency.
    pub tts: f64,
    /// Capture-stop to playback-start.
    pub total: f64,
}

/// Where the orchestrator is in the turn state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Recording,
    Transcribing,
    Generating,
    Synthesizing,
    Playing,
}

impl TurnPhase {
    pub fn name(self) -> &'static str {
        match self {
            TurnPhase::Idle => "idle",
            TurnPhase::Recording => "recording",
            TurnPhase::Transcribing => "transcribing",
            TurnPhase::Generating => "generating",
            TurnPhase::Synthesizing => "synthesizing",
            TurnPhase::Playing => "playing",
        }
    }
}

/// Everything a completed turn exposes to the UI layer. The synthesized
/// clip itself is owned by the playback sink by the time this exists.
#[derive(Debug, Clone)]
pub struct CompletedTurn {
    pub transcript: Transcript,
    pub reply: GeneratedReply,
    pub timing: TimingRecord,
    pub finished_at: DateTime<Utc>,
}

/// Sequences the four pipeline stages into one conversational turn.
pub struct TurnOrchestrator {
    mic: Box<dyn MicBackend>,
    stt: TranscriptionChannel,
    responder: ResponseGenerator,
    tts: SynthesisChannel,
    sink: Box<dyn PlaybackSink>,
    synthesis_options: SynthesisOptions,
    phase: TurnPhase,
    timing_tx: mpsc::UnboundedSender<TimingRecord>,
    timing_rx: Option<mpsc::UnboundedReceiver<TimingRecord>>,
}

impl TurnOrchestrator {
    pub fn new(
        mic: Box<dyn MicBackend>,
        stt: TranscriptionChannel,
        responder: ResponseGenerator,
        tts: SynthesisChannel,
        sink: Box<dyn PlaybackSink>,
    ) -> Self {
        let (timing_tx, timing_rx) = mpsc::unbounded_channel();
        Self {
            mic,
            stt,
            responder,
            tts,
            sink,
            synthesis_options: SynthesisOptions::default(),
            phase: TurnPhase::Idle,
            timing_tx,
            timing_rx: Some(timing_rx),
        }
    }

    pub fn with_synthesis_options(mut self, options: SynthesisOptions) -> Self {
        self.synthesis_options = options;
        self
    }

    /// Initialize both worker channels. Convenience for callers that do
    /// not need to stagger the two setups.
    pub async fn initialize(&self, stt_model: &str, tts_model: &str) -> VoiceResult<()> {
        self.stt.initialize(stt_model).await?;
        self.tts.initialize(tts_model).await?;
        Ok(())
    }

    /// One timing record arrives here per completed turn. Can be taken
    /// exactly once.
    pub fn take_timing_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<TimingRecord>> {
        self.timing_rx.take()
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Start recording. Requires `Idle`.
    pub fn begin_turn(&mut self) -> VoiceResult<()> {
        if self.phase != TurnPhase::Idle {
            return Err(VoiceError::InvalidState {
                expected: "idle",
                actual: self.phase.name(),
            });
        }
        self.mic.start()?;
        self.phase = TurnPhase::Recording;
        debug!("turn started, recording");
        Ok(())
    }

    /// Stop recording and drive the pipeline to playback. Requires
    /// `Recording`.
    ///
    /// A turn either completes fully or is abandoned: on any stage failure
    /// the orchestrator returns to `Idle`, surfaces the error, and
    /// publishes no timing record.
    pub async fn end_turn(&mut self) -> VoiceResult<CompletedTurn> {
        if self.phase != TurnPhase::Recording {
            return Err(VoiceError::InvalidState {
                expected: "recording",
                actual: self.phase.name(),
            });
        }

        let result = self.run_pipeline().await;
        self.phase = TurnPhase::Idle;
        result
    }

    async fn run_pipeline(&mut self) -> VoiceResult<CompletedTurn> {
        let turn_start = Instant::now();

        let recording = self.mic.stop()?;
        debug!(
            bytes = recording.pcm.len(),
            secs = recording.estimated_secs(),
            "capture finalized"
        );

        self.phase = TurnPhase::Transcribing;
        let stage = Instant::now();
        let transcript = self.stt.transcribe(recording).await?;
        let stt = elapsed_ms(stage);
        info!(text = %transcript.text, confidence = transcript.confidence, "transcription complete");

        self.phase = TurnPhase::Generating;
        let stage = Instant::now();
        let reply = self.responder.generate(&transcript.text).await;
        let api = elapsed_ms(stage);
        info!(reply = %reply.text, "response ready");

        self.phase = TurnPhase::Synthesizing;
        let stage = Instant::now();
        let clip = self
            .tts
            .synthesize(&reply.text, self.synthesis_options)
            .await?;
        let tts = elapsed_ms(stage);
        debug!(secs = clip.duration.as_secs_f64(), "synthesis complete");

        self.phase = TurnPhase::Playing;
        self.sink.play(clip)?;

        let timing = TimingRecord {
            stt,
            api,
            tts,
            total: elapsed_ms(turn_start),
        };
        // Fire-and-forget: a missing or dropped observer never blocks the turn.
        let _ = self.timing_tx.send(timing);
        info!(
            stt_ms = timing.stt,
            api_ms = timing.api,
            tts_ms = timing.tts,
            total_ms = timing.total,
            "turn complete"
        );

        Ok(CompletedTurn {
            transcript,
            reply,
            timing,
            finished_at: Utc::now(),
        })
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
