//! Integration tests for the full turn pipeline.
//!
//! These run entirely on fixtures: scripted microphone, placeholder
//! workers with zero delay, a null playback sink, and a response generator
//! pointed at an unroutable endpoint so the fallback path is exercised
//! deterministically.

use std::time::Duration;

use murmur_voice::{
    placeholder_duration_secs, NullSink, PlaceholderSttWorker, PlaceholderTtsWorker,
    ResponseGenerator, ScriptedMic, SynthesisChannel, TranscriptionChannel, TurnOrchestrator,
    TurnPhase, VoiceError,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Generator whose endpoint is unreachable: every call falls back to the
/// local echo reply without touching the network stack's happy path.
fn unreachable_generator() -> ResponseGenerator {
    ResponseGenerator::new("http://127.0.0.1:9", "test-key", "gpt-3.5-turbo")
}

#[tokio::test]
async fn full_turn_with_network_failure() {
    init_logging();

    // 2.5 s of captured audio buckets to "How are you?".
    let mic = ScriptedMic::speaking_for(Duration::from_millis(2500));
    let sink = NullSink::new();
    let played = sink.history();

    let mut orch = TurnOrchestrator::new(
        Box::new(mic),
        TranscriptionChannel::spawn(PlaceholderSttWorker::instant()),
        unreachable_generator(),
        SynthesisChannel::spawn(PlaceholderTtsWorker::instant()),
        Box::new(sink),
    );
    orch.initialize("whisper-tiny.bin", "tts-mini.bin")
        .await
        .unwrap();
    let mut timing_rx = orch.take_timing_receiver().unwrap();

    orch.begin_turn().unwrap();
    let turn = orch.end_turn().await.unwrap();

    assert_eq!(turn.transcript.text, "How are you?");
    assert!((0.0..=1.0).contains(&turn.transcript.confidence));

    // Network is down: the reply is the local fallback echoing the transcript.
    assert!(turn.reply.text.contains("How are you?"));
    assert!(turn.reply.usage.is_none());

    // The played clip honors the synthesis duration contract.
    let played = played.lock().unwrap();
    assert_eq!(played.len(), 1);
    let expected_secs = placeholder_duration_secs(&turn.reply.text);
    assert!((played[0].duration.as_secs_f64() - expected_secs).abs() < 1e-9);
    let expected_bytes =
        (f64::from(played[0].sample_rate) * expected_secs).floor() as usize * 2;
    assert_eq!(played[0].pcm.len(), expected_bytes);

    // Exactly one timing record, all fields non-negative.
    let timing = timing_rx.try_recv().unwrap();
    assert!(timing.stt >= 0.0 && timing.api >= 0.0 && timing.tts >= 0.0 && timing.total >= 0.0);
    assert!(timing_rx.try_recv().is_err());

    assert_eq!(orch.phase(), TurnPhase::Idle);
}

#[tokio::test]
async fn consecutive_turns_reuse_the_channels() {
    init_logging();

    let mic = ScriptedMic::new(vec![
        murmur_voice::AudioClip::silence(Duration::from_millis(500), 16000),
        murmur_voice::AudioClip::silence(Duration::from_millis(1500), 16000),
    ]);
    let mut orch = TurnOrchestrator::new(
        Box::new(mic),
        TranscriptionChannel::spawn(PlaceholderSttWorker::instant()),
        unreachable_generator(),
        SynthesisChannel::spawn(PlaceholderTtsWorker::instant()),
        Box::new(NullSink::new()),
    );
    orch.initialize("whisper-tiny.bin", "tts-mini.bin")
        .await
        .unwrap();
    let mut timing_rx = orch.take_timing_receiver().unwrap();

    orch.begin_turn().unwrap();
    let first = orch.end_turn().await.unwrap();
    assert_eq!(first.transcript.text, "Hi");

    orch.begin_turn().unwrap();
    let second = orch.end_turn().await.unwrap();
    assert_eq!(second.transcript.text, "Hello");

    assert!(timing_rx.try_recv().is_ok());
    assert!(timing_rx.try_recv().is_ok());
    assert!(timing_rx.try_recv().is_err());
}

#[tokio::test]
async fn end_turn_before_begin_fails_cleanly() {
    init_logging();

    let mut orch = TurnOrchestrator::new(
        Box::new(ScriptedMic::new(Vec::new())),
        TranscriptionChannel::spawn(PlaceholderSttWorker::instant()),
        unreachable_generator(),
        SynthesisChannel::spawn(PlaceholderTtsWorker::instant()),
        Box::new(NullSink::new()),
    );

    let err = orch.end_turn().await.unwrap_err();
    assert!(matches!(err, VoiceError::InvalidState { .. }));
    assert_eq!(orch.phase(), TurnPhase::Idle);
}

#[tokio::test]
async fn slow_transcription_fails_the_turn() {
    init_logging();

    let slow_stt = PlaceholderSttWorker {
        load_delay: Duration::ZERO,
        infer_delay: Duration::from_millis(300),
    };
    let mut orch = TurnOrchestrator::new(
        Box::new(ScriptedMic::speaking_for(Duration::from_secs(1))),
        TranscriptionChannel::spawn(slow_stt).with_timeout(Duration::from_millis(20)),
        unreachable_generator(),
        SynthesisChannel::spawn(PlaceholderTtsWorker::instant()),
        Box::new(NullSink::new()),
    );
    orch.initialize("whisper-tiny.bin", "tts-mini.bin")
        .await
        .unwrap();
    let mut timing_rx = orch.take_timing_receiver().unwrap();

    orch.begin_turn().unwrap();
    let err = orch.end_turn().await.unwrap_err();
    assert!(matches!(err, VoiceError::RequestTimeout { stage: "stt", .. }));

    // The failed turn published nothing and the orchestrator is idle again.
    assert!(timing_rx.try_recv().is_err());
    assert_eq!(orch.phase(), TurnPhase::Idle);
}
