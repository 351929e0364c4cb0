use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{select, Receiver, TryRecvError};

use crate::alert::AlertSignal;
use crate::convert::ColorspaceConverter;
use crate::error::{FrameError, ModelLoadError};
use crate::frame::{RawFrame, RgbBuffer};
use crate::infer::{InferenceEngine, InputSpec};
use crate::preprocess::Preprocessor;
use crate::tensor::Tensor;

use super::state::{AlertToggle, InferenceResult, Label, UiEvent, UiSink};
use super::{FrameState, FrameTrace, SchedulerSettings, Shared};

/// Builds the engine on the worker thread, given the tensor contract the preprocessor produces.
pub type EngineLoader =
    Box<dyn FnOnce(InputSpec) -> Result<InferenceEngine, ModelLoadError> + Send + 'static>;

/// One accepted frame on its way from the camera context to the worker.
pub(crate) struct Job {
    pub(crate) frame: RawFrame,
    pub(crate) trace: FrameTrace,
    pub(crate) accepted_at: Instant,
}

/// Everything the worker context owns exclusively.
pub(crate) struct Worker {
    pub(crate) settings: SchedulerSettings,
    pub(crate) shared: Arc<Shared>,
    pub(crate) work_rx: Receiver<Job>,
    pub(crate) cancel_rx: Receiver<()>,
    pub(crate) ui: UiSink,
    pub(crate) alert: Option<Arc<AlertSignal>>,
    pub(crate) alert_enabled: AlertToggle,
}

/// Per-frame scratch that lives as long as the worker.
struct Stages {
    engine: InferenceEngine,
    converter: ColorspaceConverter,
    preprocessor: Preprocessor,
    rgb: RgbBuffer,
    tensor: Tensor,
}

impl Worker {
    pub(crate) fn spawn(self, loader: EngineLoader) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("leafwatch-worker".into())
            .spawn(move || self.run(loader))
    }

    fn run(self, loader: EngineLoader) {
        let preprocessor = Preprocessor::new(self.settings.preprocess);
        let input = InputSpec {
            shape: preprocessor.output_shape(),
            layout: self.settings.layout,
        };

        let started = Instant::now();
        let engine = match loader(input) {
            Ok(engine) => engine,
            Err(err) => {
                log::error!("PipelineScheduler: model load failed: {}", err);
                self.ui.publish(UiEvent::LoadFailed(err.to_string()));
                self.drain();
                return;
            }
        };
        if self.is_cancelled() {
            log::info!("PipelineScheduler: cancelled during model load");
            self.drain();
            return;
        }
        log::info!(
            "PipelineScheduler: ready ({} on {}, loaded in {} ms)",
            engine.backend_name(),
            engine.accelerator(),
            started.elapsed().as_millis()
        );
        let ready = UiEvent::Ready {
            backend: engine.backend_name(),
            accelerator: engine.accelerator(),
        };
        let mut stages = Stages {
            engine,
            converter: ColorspaceConverter::new(self.settings.matrix),
            tensor: Tensor::zeros(preprocessor.output_shape()),
            preprocessor,
            rgb: RgbBuffer::new(),
        };
        self.shared.ready.store(true, Ordering::SeqCst);
        self.ui.publish(ready);

        loop {
            select! {
                recv(self.cancel_rx) -> _ => break,
                recv(self.work_rx) -> job => match job {
                    Ok(job) => self.handle(&mut stages, job),
                    Err(_) => break,
                },
            }
        }
        self.shared.ready.store(false, Ordering::SeqCst);
        self.drain();
        log::info!("PipelineScheduler: worker stopped");
    }

    fn handle(&self, stages: &mut Stages, job: Job) {
        let Job {
            frame,
            mut trace,
            accepted_at,
        } = job;
        let sequence = trace.sequence();
        let queued = accepted_at.elapsed();
        trace.advance(FrameState::Accepted);
        let outcome = self.process(stages, frame, &mut trace);

        match outcome {
            Ok(result) => {
                self.shared.stats.completed.fetch_add(1, Ordering::Relaxed);
                log::debug!(
                    "PipelineScheduler: frame {} {:?} confidence {:.3} ({} ms after acceptance)",
                    sequence,
                    result.label,
                    result.confidence,
                    queued.as_millis()
                );
                self.publish(result, &mut trace);
            }
            Err(FrameError::Cancelled) => {
                self.shared.stats.cancelled.fetch_add(1, Ordering::Relaxed);
                let stage = trace.state();
                trace.advance(FrameState::Failed);
                log::debug!("PipelineScheduler: frame {} cancelled while {:?}", sequence, stage);
            }
            Err(err) => {
                self.shared.stats.failed.fetch_add(1, Ordering::Relaxed);
                let stage = trace.state();
                trace.advance(FrameState::Failed);
                log::error!(
                    "PipelineScheduler: frame {} failed while {:?}: {}",
                    sequence,
                    stage,
                    err
                );
            }
        }
        self.shared.busy.store(false, Ordering::SeqCst);
    }

    /// Converting, Preprocessing, Inferring. The frame is released right after conversion, and
    /// on every error path by scope exit.
    fn process(
        &self,
        stages: &mut Stages,
        frame: RawFrame,
        trace: &mut FrameTrace,
    ) -> Result<InferenceResult, FrameError> {
        let sequence = trace.sequence();
        trace.advance(FrameState::Converting);
        stages.rgb.ensure_capacity(frame.width, frame.height);
        stages.converter.convert(&frame, &mut stages.rgb)?;
        drop(frame);

        self.check_cancel()?;
        trace.advance(FrameState::Preprocessing);
        stages.preprocessor.prepare_into(&stages.rgb, &mut stages.tensor);

        self.check_cancel()?;
        trace.advance(FrameState::Inferring);
        let confidence = stages.engine.infer(&stages.tensor)?;

        Ok(InferenceResult {
            confidence,
            label: Label::from_confidence(confidence, self.settings.thresholds.positive),
            sequence,
        })
    }

    /// Alert (when enabled and above threshold), then hand the result to the UI context.
    fn publish(&self, result: InferenceResult, trace: &mut FrameTrace) {
        if result.confidence > self.settings.thresholds.alert && self.alert_enabled.is_enabled() {
            if let Some(alert) = &self.alert {
                alert.trigger();
            }
        }
        trace.advance(FrameState::Published);
        self.ui.publish(UiEvent::Result(result));
    }

    fn is_cancelled(&self) -> bool {
        // Any message, or the sender being dropped, means stop.
        !matches!(self.cancel_rx.try_recv(), Err(TryRecvError::Empty))
    }

    fn check_cancel(&self) -> Result<(), FrameError> {
        if self.is_cancelled() {
            return Err(FrameError::Cancelled);
        }
        Ok(())
    }

    /// Release frames still queued when the worker exits.
    fn drain(&self) {
        let mut released = 0u64;
        while let Ok(Job {
            frame, mut trace, ..
        }) = self.work_rx.try_recv()
        {
            drop(frame);
            trace.advance(FrameState::Dropped);
            released += 1;
        }
        if released > 0 {
            self.shared
                .stats
                .cancelled
                .fetch_add(released, Ordering::Relaxed);
            log::debug!("PipelineScheduler: released {} pending frame(s)", released);
        }
        self.shared.busy.store(false, Ordering::SeqCst);
    }
}
