//! Worker to UI handoff.
//!
//! The worker never touches presentation state. It sends `UiEvent`s over a channel; the context
//! that owns `UiState` drains them and is the only writer of `DisplayState`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::infer::Accelerator;

pub const INITIAL_STATUS: &str = "Initializing...";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Label {
    Positive,
    Negative,
}

impl Label {
    /// Positive strictly above `threshold`.
    pub fn from_confidence(confidence: f32, threshold: f32) -> Self {
        if confidence > threshold {
            Label::Positive
        } else {
            Label::Negative
        }
    }
}

/// Outcome of one completed inference.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InferenceResult {
    pub confidence: f32,
    pub label: Label,
    /// Sequence number of the frame the result came from.
    pub sequence: u64,
}

/// User-visible text for each label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Labels {
    pub positive: String,
    pub negative: String,
    pub waiting: String,
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            positive: "Leaf roll detected".to_string(),
            negative: "No leaf roll detected".to_string(),
            waiting: "Waiting for input...".to_string(),
        }
    }
}

impl Labels {
    pub fn text(&self, label: Label) -> &str {
        match label {
            Label::Positive => &self.positive,
            Label::Negative => &self.negative,
        }
    }
}

/// User-controlled alert switch. Written by the UI, read by the worker.
#[derive(Clone, Debug, Default)]
pub struct AlertToggle(Arc<AtomicBool>);

impl AlertToggle {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum UiEvent {
    /// Model loaded; frames may now enter conversion.
    Ready {
        backend: &'static str,
        accelerator: Accelerator,
    },
    /// Model loading failed. The pipeline stays not ready.
    LoadFailed(String),
    Result(InferenceResult),
    PreviewLive { device: String },
    PreviewUnavailable(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum PreviewState {
    Pending,
    Live(String),
    Unavailable(String),
}

/// Everything the presentation layer renders.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayState {
    pub status: String,
    pub result_text: String,
    pub confidence: Option<f32>,
    pub ready: bool,
    pub preview: PreviewState,
    pub load_error: Option<String>,
    pub last_result: Option<InferenceResult>,
}

impl DisplayState {
    pub fn new(labels: &Labels) -> Self {
        Self {
            status: INITIAL_STATUS.to_string(),
            result_text: labels.waiting.clone(),
            confidence: None,
            ready: false,
            preview: PreviewState::Pending,
            load_error: None,
            last_result: None,
        }
    }

    /// `Confidence: 90.00%`, or an empty string before the first result.
    pub fn confidence_percent(&self) -> String {
        match self.confidence {
            Some(confidence) => format!("Confidence: {:.2}%", confidence * 100.0),
            None => String::new(),
        }
    }

    fn apply(&mut self, event: UiEvent, labels: &Labels) {
        match event {
            UiEvent::Ready {
                backend,
                accelerator,
            } => {
                self.ready = true;
                self.status = format!("Model loaded ({} on {})", backend, accelerator);
            }
            UiEvent::LoadFailed(reason) => {
                self.ready = false;
                self.status = "Model failed to load".to_string();
                self.load_error = Some(reason);
            }
            UiEvent::Result(result) => {
                self.result_text = labels.text(result.label).to_string();
                self.confidence = Some(result.confidence);
                self.last_result = Some(result);
            }
            UiEvent::PreviewLive { device } => self.preview = PreviewState::Live(device),
            UiEvent::PreviewUnavailable(reason) => {
                self.preview = PreviewState::Unavailable(reason);
            }
        }
    }
}

/// Sending half held by the worker and the camera driver.
#[derive(Clone, Debug)]
pub struct UiSink {
    tx: Sender<UiEvent>,
}

impl UiSink {
    /// Send an update. A UI that has gone away is not an error for the sender.
    pub fn publish(&self, event: UiEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("PipelineScheduler: UI receiver gone, update dropped");
        }
    }
}

/// Receiving half, owned by the UI context.
#[derive(Debug)]
pub struct UiState {
    rx: Receiver<UiEvent>,
    labels: Labels,
    display: DisplayState,
}

pub fn ui_channel(labels: Labels) -> (UiSink, UiState) {
    let (tx, rx) = unbounded();
    let display = DisplayState::new(&labels);
    (
        UiSink { tx },
        UiState {
            rx,
            labels,
            display,
        },
    )
}

impl UiState {
    pub fn display(&self) -> &DisplayState {
        &self.display
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    /// Apply every queued update without blocking. Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.display.apply(event, &self.labels);
            applied += 1;
        }
        applied
    }

    /// Block up to `timeout` for one update, then drain the rest.
    pub fn wait(&mut self, timeout: Duration) -> usize {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => {
                self.display.apply(event, &self.labels);
                1 + self.pump()
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Pump updates until `predicate` holds or `timeout` passes.
    pub fn wait_until(
        &mut self,
        timeout: Duration,
        predicate: impl Fn(&DisplayState) -> bool,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        self.pump();
        loop {
            if predicate(&self.display) {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match self.rx.recv_timeout(remaining) {
                Ok(event) => self.display.apply(event, &self.labels),
                Err(RecvTimeoutError::Timeout) => return false,
                Err(RecvTimeoutError::Disconnected) => return predicate(&self.display),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_waiting() {
        let (_sink, ui) = ui_channel(Labels::default());
        assert_eq!(ui.display().status, INITIAL_STATUS);
        assert_eq!(ui.display().result_text, "Waiting for input...");
        assert!(!ui.display().ready);
        assert_eq!(ui.display().confidence_percent(), "");
    }

    #[test]
    fn applies_updates_in_order() {
        let (sink, mut ui) = ui_channel(Labels::default());
        sink.publish(UiEvent::Ready {
            backend: "constant",
            accelerator: Accelerator::Cpu,
        });
        sink.publish(UiEvent::Result(InferenceResult {
            confidence: 0.9,
            label: Label::Positive,
            sequence: 1,
        }));
        sink.publish(UiEvent::Result(InferenceResult {
            confidence: 0.25,
            label: Label::Negative,
            sequence: 2,
        }));
        assert_eq!(ui.pump(), 3);

        let display = ui.display();
        assert!(display.ready);
        assert_eq!(display.result_text, "No leaf roll detected");
        assert_eq!(display.confidence_percent(), "Confidence: 25.00%");
        assert_eq!(display.last_result.map(|r| r.sequence), Some(2));
    }

    #[test]
    fn load_failure_keeps_pipeline_not_ready() {
        let (sink, mut ui) = ui_channel(Labels::default());
        sink.publish(UiEvent::LoadFailed("model asset is empty".into()));
        ui.pump();
        assert!(!ui.display().ready);
        assert_eq!(ui.display().load_error.as_deref(), Some("model asset is empty"));
        assert_eq!(ui.display().result_text, "Waiting for input...");
    }

    #[test]
    fn label_threshold_is_strict() {
        assert_eq!(Label::from_confidence(0.5, 0.5), Label::Negative);
        assert_eq!(Label::from_confidence(0.5001, 0.5), Label::Positive);
    }

    #[test]
    fn wait_until_times_out() {
        let (_sink, mut ui) = ui_channel(Labels::default());
        assert!(!ui.wait_until(Duration::from_millis(20), |d| d.ready));
    }

    #[test]
    fn toggle_is_shared() {
        let toggle = AlertToggle::new(false);
        let worker_view = toggle.clone();
        toggle.set(true);
        assert!(worker_view.is_enabled());
    }
}
