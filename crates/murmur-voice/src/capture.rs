//! **Microphone capture** — one exclusive session, one clip per recording.
//!
//! `MicCapture` buffers f32 samples from the cpal input callback into a
//! shared buffer; dropping the stream releases the device on every exit
//! path. `ScriptedMic` is the fixture for tests and machines without audio
//! hardware.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tracing::{debug, info};

use crate::clip::AudioClip;
use crate::error::{VoiceError, VoiceResult};

/// Capture sample rate in Hz (16 kHz mono, the usual speech rate).
pub const CAPTURE_SAMPLE_RATE: u32 = 16000;

/// A microphone session: `start` acquires the device exclusively, `stop`
/// finalizes buffering and yields one clip.
pub trait MicBackend {
    /// Begin buffering. Errors: `PermissionDenied`, `DeviceUnavailable`,
    /// `AlreadyRecording`.
    fn start(&mut self) -> VoiceResult<()>;

    /// Finalize and yield the recorded clip. Errors: `NoAudioCaptured` if
    /// nothing was buffered. The device is released regardless of outcome.
    fn stop(&mut self) -> VoiceResult<AudioClip>;

    fn is_recording(&self) -> bool;
}

/// Real microphone capture via cpal.
pub struct MicCapture {
    device: Device,
    config: StreamConfig,
    buffer: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
}

impl MicCapture {
    /// Open the default input device at 16 kHz mono.
    pub fn new() -> VoiceResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| VoiceError::DeviceUnavailable("no input device".to_string()))?;

        let supported = device
            .supported_input_configs()
            .map_err(map_device_error)?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(CAPTURE_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(CAPTURE_SAMPLE_RATE)
            })
            .ok_or_else(|| {
                VoiceError::DeviceUnavailable("no mono 16 kHz input config".to_string())
            })?;
        let config = supported
            .with_sample_rate(SampleRate(CAPTURE_SAMPLE_RATE))
            .config();

        info!(
            device = device.name().unwrap_or_default(),
            sample_rate = CAPTURE_SAMPLE_RATE,
            "microphone ready"
        );

        Ok(Self {
            device,
            config,
            buffer: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }
}

impl MicBackend for MicCapture {
    fn start(&mut self) -> VoiceResult<()> {
        if self.stream.is_some() {
            return Err(VoiceError::AlreadyRecording);
        }

        self.buffer.lock().unwrap_or_else(|e| e.into_inner()).clear();
        let buffer = Arc::clone(&self.buffer);

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    buffer
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .extend_from_slice(data);
                },
                |err| {
                    tracing::error!(error = %err, "capture stream error");
                },
                None,
            )
            .map_err(map_build_error)?;
        stream.play().map_err(|e| {
            // The stream drops here, releasing the device.
            VoiceError::DeviceUnavailable(e.to_string())
        })?;

        self.stream = Some(stream);
        debug!("recording started");
        Ok(())
    }

    fn stop(&mut self) -> VoiceResult<AudioClip> {
        // Release the device first, success or not.
        drop(self.stream.take());

        let samples = std::mem::take(
            &mut *self.buffer.lock().unwrap_or_else(|e| e.into_inner()),
        );
        if samples.is_empty() {
            return Err(VoiceError::NoAudioCaptured);
        }

        let clip = AudioClip::from_samples(&samples, CAPTURE_SAMPLE_RATE);
        debug!(
            samples = samples.len(),
            secs = clip.duration.as_secs_f64(),
            "recording finalized"
        );
        Ok(clip)
    }

    fn is_recording(&self) -> bool {
        self.stream.is_some()
    }
}

fn map_device_error(err: cpal::SupportedStreamConfigsError) -> VoiceError {
    let text = err.to_string();
    if text.to_lowercase().contains("denied") {
        VoiceError::PermissionDenied(text)
    } else {
        VoiceError::DeviceUnavailable(text)
    }
}

fn map_build_error(err: cpal::BuildStreamError) -> VoiceError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => {
            VoiceError::DeviceUnavailable("device not available".to_string())
        }
        other => {
            let text = other.to_string();
            if text.to_lowercase().contains("denied") {
                VoiceError::PermissionDenied(text)
            } else {
                VoiceError::DeviceUnavailable(text)
            }
        }
    }
}

/// Scripted microphone: yields pre-recorded clips, one per session.
pub struct ScriptedMic {
    clips: VecDeque<AudioClip>,
    recording: bool,
}

impl ScriptedMic {
    pub fn new(clips: Vec<AudioClip>) -> Self {
        Self {
            clips: clips.into(),
            recording: false,
        }
    }

    /// A mic that "hears" silence of the given length each session.
    pub fn speaking_for(duration: Duration) -> Self {
        Self::new(vec![AudioClip::silence(duration, CAPTURE_SAMPLE_RATE)])
    }
}

impl MicBackend for ScriptedMic {
    fn start(&mut self) -> VoiceResult<()> {
        if self.recording {
            return Err(VoiceError::AlreadyRecording);
        }
        self.recording = true;
        Ok(())
    }

    fn stop(&mut self) -> VoiceResult<AudioClip> {
        self.recording = false;
        self.clips.pop_front().ok_or(VoiceError::NoAudioCaptured)
    }

    fn is_recording(&self) -> bool {
        self.recording
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_mic_enforces_single_session() {
        let mut mic = ScriptedMic::speaking_for(Duration::from_secs(1));
        mic.start().unwrap();
        assert!(matches!(mic.start(), Err(VoiceError::AlreadyRecording)));
        let clip = mic.stop().unwrap();
        assert!((clip.estimated_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn scripted_mic_runs_dry() {
        let mut mic = ScriptedMic::new(Vec::new());
        mic.start().unwrap();
        assert!(matches!(mic.stop(), Err(VoiceError::NoAudioCaptured)));
        // The session ended even though no audio was captured.
        assert!(!mic.is_recording());
    }

    #[test]
    #[ignore] // Requires audio hardware.
    fn real_mic_opens_and_releases() {
        let mut mic = MicCapture::new().expect("no input device");
        mic.start().unwrap();
        std::thread::sleep(Duration::from_millis(200));
        let _ = mic.stop();
        assert!(!mic.is_recording());
    }
}
