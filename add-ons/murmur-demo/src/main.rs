//! Murmur demo — one voice turn per Enter keypress.
//!
//! Wires the pipeline to the real microphone and speakers when available,
//! falling back to scripted fixtures on headless machines. Set
//! `MURMUR_API_KEY` (or `OPENAI_API_KEY` / `OPENROUTER_API_KEY`) in `.env`
//! for real replies; without a key every reply is the local fallback echo.

use std::time::Duration;

use murmur_voice::{
    MicBackend, MicCapture, NullSink, PlaybackSink, ResponseGenerator, ScriptedMic, SpeakerSink,
    SynthesisChannel, TranscriptionChannel, TurnOrchestrator,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Murmur demo — press Enter to start recording, Enter again to stop, Ctrl+C to quit.");

    let mic: Box<dyn MicBackend> = match MicCapture::new() {
        Ok(m) => Box::new(m),
        Err(e) => {
            warn!(error = %e, "no microphone; using a scripted 2.5s recording per turn");
            Box::new(ScriptedMic::new(
                std::iter::repeat(murmur_voice::AudioClip::silence(
                    Duration::from_millis(2500),
                    murmur_voice::CAPTURE_SAMPLE_RATE,
                ))
                .take(64)
                .collect(),
            ))
        }
    };

    let sink: Box<dyn PlaybackSink> = match SpeakerSink::new() {
        Ok(s) => Box::new(s),
        Err(e) => {
            warn!(error = %e, "no output device; playback is discarded");
            Box::new(NullSink::new())
        }
    };

    let responder = match ResponseGenerator::from_env() {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "running offline; replies will echo the transcript");
            ResponseGenerator::offline()
        }
    };

    let mut orchestrator = TurnOrchestrator::new(
        mic,
        TranscriptionChannel::placeholder(),
        responder,
        SynthesisChannel::placeholder(),
        sink,
    );

    info!("loading placeholder models...");
    orchestrator
        .initialize("models/whisper-tiny.bin", "models/tts-mini.bin")
        .await?;
    info!("ready");

    let mut timing_rx = orchestrator
        .take_timing_receiver()
        .expect("timing receiver already taken");
    tokio::spawn(async move {
        while let Some(timing) = timing_rx.recv().await {
            match serde_json::to_string(&timing) {
                Ok(json) => println!("timing: {json}"),
                Err(e) => warn!(error = %e, "timing record serialization failed"),
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        println!("\n[Enter] start recording");
        if lines.next_line().await?.is_none() {
            break;
        }
        if let Err(e) = orchestrator.begin_turn() {
            warn!(error = %e, "could not start the turn");
            continue;
        }

        println!("recording... [Enter] stop");
        if lines.next_line().await?.is_none() {
            break;
        }
        match orchestrator.end_turn().await {
            Ok(turn) => {
                println!("you said:  {}", turn.transcript.text);
                println!("assistant: {}", turn.reply.text);
            }
            Err(e) => warn!(error = %e, "turn failed"),
        }
    }

    Ok(())
}
