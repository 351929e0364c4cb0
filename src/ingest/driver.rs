use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::CameraSource;
use crate::error::ResourceBindError;
use crate::scheduler::{FrameGate, UiEvent, UiSink};

/// Consecutive capture failures before the driver reports the preview lost and reconnects.
const MAX_CAPTURE_FAILURES: u32 = 10;
const STALL_BACKOFF: Duration = Duration::from_millis(5);
const ERROR_BACKOFF: Duration = Duration::from_millis(100);
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Runs the camera context: pulls frames from a source and hands each to the gate.
pub struct CameraDriver {
    device: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CameraDriver {
    /// Bind the source and start delivering frames.
    ///
    /// A bind failure is returned to the caller, who keeps the pipeline running without a
    /// preview.
    pub fn start(
        mut source: Box<dyn CameraSource>,
        gate: FrameGate,
        ui: UiSink,
    ) -> Result<Self, ResourceBindError> {
        source.connect()?;
        let device = source.device().to_string();
        ui.publish(UiEvent::PreviewLive {
            device: device.clone(),
        });

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("leafwatch-camera".into())
            .spawn(move || capture_loop(source, gate, ui, thread_stop))
            .map_err(|err| ResourceBindError {
                device: device.clone(),
                reason: format!("failed to spawn camera thread: {}", err),
            })?;

        Ok(Self {
            device,
            stop,
            handle: Some(handle),
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Stop delivering frames and join the camera thread. Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            log::info!("CameraDriver: stopping {}", self.device);
            if handle.join().is_err() {
                log::error!("CameraDriver: camera thread panicked");
            }
        }
    }
}

impl Drop for CameraDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(
    mut source: Box<dyn CameraSource>,
    gate: FrameGate,
    ui: UiSink,
    stop: Arc<AtomicBool>,
) {
    let mut failures = 0u32;
    while !stop.load(Ordering::SeqCst) {
        match source.next_frame() {
            Ok(Some(frame)) => {
                failures = 0;
                gate.on_frame(frame);
            }
            Ok(None) => {
                log::trace!("CameraDriver: pool exhausted, source stalled");
                thread::sleep(STALL_BACKOFF);
            }
            Err(err) => {
                failures += 1;
                log::warn!("CameraDriver: {} (failure {})", err, failures);
                if failures < MAX_CAPTURE_FAILURES {
                    thread::sleep(ERROR_BACKOFF);
                    continue;
                }
                ui.publish(UiEvent::PreviewUnavailable(err.to_string()));
                while !stop.load(Ordering::SeqCst) {
                    thread::sleep(RECONNECT_BACKOFF);
                    match source.connect() {
                        Ok(()) => {
                            log::info!("CameraDriver: reconnected to {}", source.device());
                            ui.publish(UiEvent::PreviewLive {
                                device: source.device().to_string(),
                            });
                            failures = 0;
                            break;
                        }
                        Err(err) => log::warn!("CameraDriver: reconnect failed: {}", err),
                    }
                }
            }
        }
    }
    let stats = source.stats();
    log::info!(
        "CameraDriver: {} stopped after {} frame(s), {} stall(s)",
        stats.device,
        stats.frames_captured,
        stats.stalls
    );
}
