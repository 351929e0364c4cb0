//! Runtime assembly: scheduler, camera context and alert output wired from a `LeafwatchConfig`.

use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::alert::{AlertSignal, AudioOutput};
use crate::config::LeafwatchConfig;
use crate::frame::FramePool;
use crate::infer::{AcceleratorPreference, InferenceEngine, ModelAsset};
use crate::ingest::{open_source, CameraDriver};
use crate::scheduler::{
    AlertToggle, EngineLoader, PipelineScheduler, StatsSnapshot, UiEvent, UiSink,
};

/// Loader that memory-maps `path` and walks the backend chain from `preference`.
pub fn model_loader(path: PathBuf, preference: AcceleratorPreference) -> EngineLoader {
    Box::new(move |input| {
        let asset = ModelAsset::open(&path)?;
        log::info!(
            "InferenceEngine: loading {} ({} bytes, mapped: {})",
            asset.name(),
            asset.len(),
            asset.is_mapped()
        );
        InferenceEngine::load(&asset, preference, input)
    })
}

/// Audio output selected by the compiled features: PulseAudio when available, silent otherwise.
pub fn default_audio_output(device: Option<String>) -> Arc<dyn AudioOutput> {
    #[cfg(feature = "audio-pulse")]
    {
        Arc::new(crate::alert::PulseAudioOutput::new(device))
    }
    #[cfg(not(feature = "audio-pulse"))]
    {
        if let Some(device) = device {
            log::warn!(
                "Pipeline: audio device {} ignored (built without audio-pulse)",
                device
            );
        }
        Arc::new(crate::alert::NullAudioOutput)
    }
}

/// The running pipeline. Owns every execution context except the UI.
pub struct Pipeline {
    scheduler: PipelineScheduler,
    camera: Option<CameraDriver>,
    alert: Arc<AlertSignal>,
    alert_enabled: AlertToggle,
    pool: FramePool,
}

impl Pipeline {
    /// Start with the model, camera and audio output named by `config`.
    pub fn start(config: &LeafwatchConfig, ui: UiSink) -> Result<Self> {
        let loader = model_loader(config.model.path.clone(), config.model.accelerator);
        let output = default_audio_output(config.alert.device.clone());
        Self::start_with(config, loader, output, ui)
    }

    /// Start with an explicit engine loader and audio output.
    ///
    /// The model loads in the background; until it does, every frame is dropped as not ready.
    /// A camera that cannot be bound leaves the pipeline running without a preview.
    pub fn start_with(
        config: &LeafwatchConfig,
        loader: EngineLoader,
        output: Arc<dyn AudioOutput>,
        ui: UiSink,
    ) -> Result<Self> {
        let alert = Arc::new(
            AlertSignal::new(output, &config.alert.tone)
                .map_err(|e| anyhow!("failed to prepare alert tone: {}", e))?,
        );
        let alert_enabled = AlertToggle::new(config.alert.enabled);

        let scheduler = PipelineScheduler::start(
            config.scheduler_settings(),
            loader,
            ui.clone(),
            Some(Arc::clone(&alert)),
            alert_enabled.clone(),
        )
        .map_err(|e| anyhow!("failed to spawn worker: {}", e))?;

        let pool = FramePool::new(config.camera.buffers);
        let camera = match open_source(&config.camera, pool.clone())
            .and_then(|source| CameraDriver::start(source, scheduler.gate(), ui.clone()))
        {
            Ok(driver) => Some(driver),
            Err(err) => {
                log::warn!("Pipeline: running without preview: {}", err);
                ui.publish(UiEvent::PreviewUnavailable(err.to_string()));
                None
            }
        };

        Ok(Self {
            scheduler,
            camera,
            alert,
            alert_enabled,
            pool,
        })
    }

    pub fn is_ready(&self) -> bool {
        self.scheduler.is_ready()
    }

    pub fn has_preview(&self) -> bool {
        self.camera.as_ref().is_some_and(CameraDriver::is_running)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.scheduler.stats()
    }

    /// Frame buffers currently held downstream of the camera.
    pub fn frames_in_use(&self) -> usize {
        self.pool.outstanding()
    }

    pub fn alert_toggle(&self) -> AlertToggle {
        self.alert_enabled.clone()
    }

    /// Only affects results published after the call; a playing tone runs to completion.
    pub fn set_alert_enabled(&self, enabled: bool) {
        self.alert_enabled.set(enabled);
    }

    pub fn alert(&self) -> &AlertSignal {
        &self.alert
    }

    /// Tear down in order: worker, camera, tone. Idempotent.
    pub fn shutdown(&mut self) {
        self.scheduler.shutdown();
        if let Some(mut camera) = self.camera.take() {
            camera.stop();
        }
        self.alert.stop();
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}
