//! Audible alert tone.
//!
//! `AlertSignal` holds at most one `Playback` at a time. `trigger` stops and releases the
//! current playback before starting the next, and `stop` can be called at any time.

#[cfg(feature = "audio-pulse")]
mod pulse;

use std::f64::consts::PI;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::AudioError;

#[cfg(feature = "audio-pulse")]
pub use pulse::PulseAudioOutput;

/// Description of the alert tone: a sine at `frequency_hz` with a trailing linear fade-out.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ToneRequest {
    pub frequency_hz: f64,
    pub duration: Duration,
    /// Share of the samples, at the end, that ramp linearly down to silence.
    pub fade_fraction: f64,
    pub sample_rate: u32,
}

impl Default for ToneRequest {
    fn default() -> Self {
        Self {
            frequency_hz: 1000.0,
            duration: Duration::from_millis(300),
            fade_fraction: 0.2,
            sample_rate: 44_100,
        }
    }
}

impl ToneRequest {
    pub fn sample_count(&self) -> usize {
        (self.duration.as_millis() as u64 * self.sample_rate as u64 / 1000) as usize
    }

    /// Render mono signed 16-bit PCM.
    pub fn synthesize(&self) -> Result<Vec<i16>, AudioError> {
        if self.sample_rate == 0 {
            return Err(AudioError::Tone("sample rate must be non-zero".into()));
        }
        if !(self.frequency_hz > 0.0 && self.frequency_hz < self.sample_rate as f64 / 2.0) {
            return Err(AudioError::Tone(format!(
                "frequency {} Hz outside (0, {}) Hz",
                self.frequency_hz,
                self.sample_rate / 2
            )));
        }
        if !(0.0..=1.0).contains(&self.fade_fraction) {
            return Err(AudioError::Tone(format!(
                "fade fraction {} outside [0, 1]",
                self.fade_fraction
            )));
        }
        let count = self.sample_count();
        if count == 0 {
            return Err(AudioError::Tone("tone is shorter than one sample".into()));
        }

        let fade = (self.fade_fraction * count as f64) as usize;
        let step = 2.0 * PI * self.frequency_hz / self.sample_rate as f64;
        let samples = (0..count)
            .map(|i| {
                let amplitude = if fade > 0 && i >= count - fade {
                    (count - i) as f64 / fade as f64
                } else {
                    1.0
                };
                (i16::MAX as f64 * amplitude * (step * i as f64).sin()) as i16
            })
            .collect();
        Ok(samples)
    }
}

/// A tone that has been handed to an output device.
pub trait Playback: Send {
    /// Stop and release the device resource. Idempotent.
    fn stop(&mut self);

    fn is_active(&self) -> bool;
}

/// Sink for 16-bit mono PCM.
pub trait AudioOutput: Send + Sync {
    fn name(&self) -> &'static str;

    fn play(&self, samples: Arc<[i16]>, sample_rate: u32)
        -> Result<Box<dyn Playback>, AudioError>;
}

/// Plays the configured tone, replacing any tone still in flight.
pub struct AlertSignal {
    output: Arc<dyn AudioOutput>,
    tone: Arc<[i16]>,
    sample_rate: u32,
    current: Mutex<Option<Box<dyn Playback>>>,
    triggers: AtomicU64,
}

impl AlertSignal {
    /// Synthesizes the tone once; every trigger replays the same samples.
    pub fn new(output: Arc<dyn AudioOutput>, tone: &ToneRequest) -> Result<Self, AudioError> {
        let samples = tone.synthesize()?;
        Ok(Self {
            output,
            tone: Arc::from(samples),
            sample_rate: tone.sample_rate,
            current: Mutex::new(None),
            triggers: AtomicU64::new(0),
        })
    }

    pub fn trigger(&self) {
        self.triggers.fetch_add(1, Ordering::Relaxed);
        let mut current = self.lock();
        if let Some(mut previous) = current.take() {
            previous.stop();
        }
        match self.output.play(Arc::clone(&self.tone), self.sample_rate) {
            Ok(playback) => *current = Some(playback),
            Err(err) => log::warn!("AlertSignal: {} failed to play tone: {}", self.output.name(), err),
        }
    }

    pub fn stop(&self) {
        if let Some(mut playback) = self.lock().take() {
            playback.stop();
            log::debug!("AlertSignal: tone stopped");
        }
    }

    pub fn is_playing(&self) -> bool {
        self.lock().as_ref().is_some_and(|playback| playback.is_active())
    }

    /// Number of `trigger` calls since construction.
    pub fn trigger_count(&self) -> u64 {
        self.triggers.load(Ordering::Relaxed)
    }

    pub fn tone_len(&self) -> usize {
        self.tone.len()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn Playback>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for AlertSignal {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Output with no device behind it. Playback is "active" for the tone's duration.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullAudioOutput;

struct TimedPlayback {
    until: Instant,
    stopped: bool,
}

impl Playback for TimedPlayback {
    fn stop(&mut self) {
        self.stopped = true;
    }

    fn is_active(&self) -> bool {
        !self.stopped && Instant::now() < self.until
    }
}

impl AudioOutput for NullAudioOutput {
    fn name(&self) -> &'static str {
        "null"
    }

    fn play(
        &self,
        samples: Arc<[i16]>,
        sample_rate: u32,
    ) -> Result<Box<dyn Playback>, AudioError> {
        if sample_rate == 0 {
            return Err(AudioError::Device("sample rate must be non-zero".into()));
        }
        let duration =
            Duration::from_secs_f64(samples.len() as f64 / sample_rate as f64);
        log::info!("AlertSignal: beep ({} ms, no audio device)", duration.as_millis());
        Ok(Box::new(TimedPlayback {
            until: Instant::now() + duration,
            stopped: false,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Counts playbacks that have started and not been stopped.
    #[derive(Default)]
    struct Recording {
        active: Arc<AtomicUsize>,
        started: AtomicUsize,
    }

    struct RecordingPlayback {
        active: Arc<AtomicUsize>,
        live: bool,
    }

    impl Playback for RecordingPlayback {
        fn stop(&mut self) {
            if self.live {
                self.live = false;
                self.active.fetch_sub(1, Ordering::SeqCst);
            }
        }

        fn is_active(&self) -> bool {
            self.live
        }
    }

    impl AudioOutput for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn play(&self, _: Arc<[i16]>, _: u32) -> Result<Box<dyn Playback>, AudioError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.active.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(RecordingPlayback {
                active: Arc::clone(&self.active),
                live: true,
            }))
        }
    }

    #[test]
    fn default_tone_shape() -> anyhow::Result<()> {
        let tone = ToneRequest::default();
        let samples = tone.synthesize()?;
        assert_eq!(samples.len(), 13_230);
        assert_eq!(samples[0], 0);
        // Quarter period of 1 kHz at 44.1 kHz is ~11 samples; peak near full scale.
        let peak = samples[..100].iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);
        assert!(peak > 32_000);
        Ok(())
    }

    #[test]
    fn fade_out_ramps_to_silence() -> anyhow::Result<()> {
        let samples = ToneRequest::default().synthesize()?;
        let fade_start = samples.len() - samples.len() / 5;
        let body_peak = samples[..fade_start].iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);
        let tail_peak = samples[samples.len() - 50..]
            .iter()
            .map(|s| s.unsigned_abs())
            .max()
            .unwrap_or(0);
        assert!(body_peak > 32_000);
        assert!(tail_peak < 32_767 / 40, "tail peak {tail_peak}");
        Ok(())
    }

    #[test]
    fn invalid_tones_are_rejected() {
        let above_nyquist = ToneRequest {
            frequency_hz: 30_000.0,
            ..ToneRequest::default()
        };
        assert!(above_nyquist.synthesize().is_err());

        let bad_fade = ToneRequest {
            fade_fraction: 1.5,
            ..ToneRequest::default()
        };
        assert!(bad_fade.synthesize().is_err());
    }

    #[test]
    fn retrigger_leaves_exactly_one_tone_active() -> anyhow::Result<()> {
        let output = Arc::new(Recording::default());
        let signal = AlertSignal::new(output.clone(), &ToneRequest::default())?;

        signal.trigger();
        signal.trigger();
        assert_eq!(output.started.load(Ordering::SeqCst), 2);
        assert_eq!(output.active.load(Ordering::SeqCst), 1);
        assert!(signal.is_playing());
        assert_eq!(signal.trigger_count(), 2);
        Ok(())
    }

    #[test]
    fn stop_is_idempotent_and_safe_when_idle() -> anyhow::Result<()> {
        let output = Arc::new(Recording::default());
        let signal = AlertSignal::new(output.clone(), &ToneRequest::default())?;

        signal.stop();
        signal.trigger();
        signal.stop();
        signal.stop();
        assert_eq!(output.active.load(Ordering::SeqCst), 0);
        assert!(!signal.is_playing());
        Ok(())
    }

    #[test]
    fn null_output_is_active_for_the_tone_duration() -> anyhow::Result<()> {
        let signal = AlertSignal::new(Arc::new(NullAudioOutput), &ToneRequest::default())?;
        signal.trigger();
        assert!(signal.is_playing());
        signal.stop();
        assert!(!signal.is_playing());
        Ok(())
    }
}
