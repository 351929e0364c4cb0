#![cfg(feature = "audio-pulse")]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::bounded;
use libpulse_binding::sample::{Format, Spec};
use libpulse_binding::stream::Direction;
use libpulse_simple_binding::Simple;

use super::{AudioOutput, Playback};
use crate::error::AudioError;

/// Chunk length written between cancellation checks.
const CHUNK_MS: u32 = 10;

/// PulseAudio playback of mono S16NE on a helper thread.
#[derive(Clone, Debug, Default)]
pub struct PulseAudioOutput {
    device: Option<String>,
}

impl PulseAudioOutput {
    /// `device` is a PulseAudio sink name, or `None` for the server default.
    pub fn new(device: Option<String>) -> Self {
        Self { device }
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }
}

struct PulsePlayback {
    cancel: Arc<AtomicBool>,
    active: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Playback for PulsePlayback {
    fn stop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("PulseAudioOutput: playback thread panicked");
            }
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for PulsePlayback {
    fn drop(&mut self) {
        self.stop();
    }
}

impl AudioOutput for PulseAudioOutput {
    fn name(&self) -> &'static str {
        "pulseaudio"
    }

    fn play(
        &self,
        samples: Arc<[i16]>,
        sample_rate: u32,
    ) -> Result<Box<dyn Playback>, AudioError> {
        let spec = Spec {
            format: Format::S16NE,
            channels: 1,
            rate: sample_rate,
        };
        if !spec.is_valid() {
            return Err(AudioError::Device(format!(
                "invalid sample spec ({} Hz mono)",
                sample_rate
            )));
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let active = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);
        let device = self.device.clone();
        let thread_cancel = Arc::clone(&cancel);
        let thread_active = Arc::clone(&active);

        let handle = std::thread::Builder::new()
            .name("leafwatch-tone".into())
            .spawn(move || {
                let simple = match Simple::new(
                    None,
                    "leafwatch",
                    Direction::Playback,
                    device.as_deref(),
                    "alert-tone",
                    &spec,
                    None,
                    None,
                ) {
                    Ok(simple) => {
                        let _ = ready_tx.send(Ok(()));
                        simple
                    }
                    Err(err) => {
                        thread_active.store(false, Ordering::SeqCst);
                        let _ = ready_tx.send(Err(AudioError::Device(err.to_string())));
                        return;
                    }
                };

                let chunk = (sample_rate * CHUNK_MS / 1000).max(1) as usize;
                for block in samples.chunks(chunk) {
                    if thread_cancel.load(Ordering::SeqCst) {
                        break;
                    }
                    let bytes: Vec<u8> = block.iter().flat_map(|s| s.to_ne_bytes()).collect();
                    if let Err(err) = simple.write(&bytes) {
                        log::warn!("PulseAudioOutput: write error: {}", err);
                        break;
                    }
                }
                let finished = if thread_cancel.load(Ordering::SeqCst) {
                    simple.flush()
                } else {
                    simple.drain()
                };
                if let Err(err) = finished {
                    log::debug!("PulseAudioOutput: stream close: {}", err);
                }
                thread_active.store(false, Ordering::SeqCst);
            })
            .map_err(|err| AudioError::Device(format!("failed to spawn tone thread: {}", err)))?;

        let mut playback = PulsePlayback {
            cancel,
            active,
            handle: Some(handle),
        };
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(playback)),
            Ok(Err(err)) => {
                playback.stop();
                Err(err)
            }
            Err(_) => {
                playback.stop();
                Err(AudioError::Device("tone thread exited before connecting".into()))
            }
        }
    }
}
