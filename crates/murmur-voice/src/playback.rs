//! **Playback sink** — consumes one synthesized clip per turn.
//!
//! `SpeakerSink` feeds the clip, wrapped as WAV, to a rodio sink on the
//! default output device. `NullSink` records what would have played, for
//! tests and headless machines.

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use tracing::debug;

use crate::clip::AudioClip;
use crate::error::{VoiceError, VoiceResult};

/// Consumes one clip per turn. `play` begins playback and returns; it does
/// not block until the clip finishes.
pub trait PlaybackSink {
    fn play(&mut self, clip: AudioClip) -> VoiceResult<()>;
    fn is_playing(&self) -> bool;
    fn stop(&mut self);
}

/// Real playback on the default output device.
pub struct SpeakerSink {
    _stream: OutputStream,
    _stream_handle: OutputStreamHandle,
    sink: Sink,
}

impl SpeakerSink {
    pub fn new() -> VoiceResult<Self> {
        let (stream, stream_handle) =
            OutputStream::try_default().map_err(|e| VoiceError::Playback(e.to_string()))?;
        let sink =
            Sink::try_new(&stream_handle).map_err(|e| VoiceError::Playback(e.to_string()))?;
        Ok(Self {
            _stream: stream,
            _stream_handle: stream_handle,
            sink,
        })
    }

    /// Block until queued audio finishes (demo convenience).
    pub fn sleep_until_end(&self) {
        self.sink.sleep_until_end();
    }
}

impl PlaybackSink for SpeakerSink {
    fn play(&mut self, clip: AudioClip) -> VoiceResult<()> {
        if clip.is_empty() {
            return Ok(());
        }
        debug!(
            secs = clip.duration.as_secs_f64(),
            sample_rate = clip.sample_rate,
            "queueing clip for playback"
        );
        let cursor = Cursor::new(clip.to_wav());
        let source = Decoder::new(cursor)
            .map_err(|e| VoiceError::Playback(format!("decode failed: {e}")))?;
        self.sink.append(source.convert_samples::<f32>());
        Ok(())
    }

    fn is_playing(&self) -> bool {
        !self.sink.empty()
    }

    fn stop(&mut self) {
        self.sink.stop();
    }
}

/// Records played clips instead of producing sound.
#[derive(Default)]
pub struct NullSink {
    played: Arc<Mutex<Vec<AudioClip>>>,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared view of everything played so far. Clone before handing the
    /// sink to the orchestrator.
    pub fn history(&self) -> Arc<Mutex<Vec<AudioClip>>> {
        Arc::clone(&self.played)
    }
}

impl PlaybackSink for NullSink {
    fn play(&mut self, clip: AudioClip) -> VoiceResult<()> {
        self.played
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(clip);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        false
    }

    fn stop(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn null_sink_records_clips() {
        let mut sink = NullSink::new();
        let history = sink.history();
        sink.play(AudioClip::silence(Duration::from_secs(1), 22050))
            .unwrap();
        let played = history.lock().unwrap();
        assert_eq!(played.len(), 1);
        assert_eq!(played[0].sample_rate, 22050);
    }

    #[test]
    #[ignore] // Requires an output device.
    fn speaker_sink_plays_wav() {
        let mut sink = SpeakerSink::new().expect("no output device");
        sink.play(AudioClip::silence(Duration::from_millis(50), 22050))
            .unwrap();
        sink.sleep_until_end();
    }
}
