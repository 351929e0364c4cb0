//! leafwatchd - camera inspection daemon
//!
//! This daemon:
//! 1. Loads configuration (JSON file, env overrides, then command-line flags)
//! 2. Starts the pipeline: camera, paced inference worker, alert tone
//! 3. Acts as the presentation layer, printing each published result
//! 4. Reads line commands from stdin (`a` toggles the alert, `on`/`off` set it, `s` logs stats)
//! 5. Tears down in order on Ctrl-C: worker, camera, tone

use anyhow::{anyhow, Result};
use clap::Parser;
use crossbeam_channel::{bounded, unbounded, Receiver};
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use leafwatch::config::parse_flag;
use leafwatch::scheduler::PreviewState;
use leafwatch::{ui_channel, AcceleratorPreference, LeafwatchConfig, Pipeline};

#[path = "../ui.rs"]
mod ui;

const UI_POLL: Duration = Duration::from_millis(200);
const STATS_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the ONNX classifier model.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Camera device node, or stub://name for the synthetic camera.
    #[arg(long)]
    camera: Option<String>,
    /// Initial state of the audible alert (on|off).
    #[arg(long, value_name = "on|off")]
    alert: Option<String>,
    /// Minimum time between inferences, in milliseconds.
    #[arg(long)]
    interval_ms: Option<u64>,
    /// Accelerator to try first (auto|gpu|native|cpu).
    #[arg(long)]
    accelerator: Option<AcceleratorPreference>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: ui::UiMode,
}

/// A line typed on stdin while the daemon runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Command {
    ToggleAlert,
    SetAlert(bool),
    Stats,
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim().to_ascii_lowercase();
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        ["a"] | ["alert"] => Some(Command::ToggleAlert),
        ["s"] | ["stats"] => Some(Command::Stats),
        ["alert", value] | [value] => parse_flag(value).map(Command::SetAlert),
        _ => None,
    }
}

fn spawn_command_reader() -> Result<Receiver<Command>> {
    let (tx, rx) = unbounded();
    std::thread::Builder::new()
        .name("leafwatch-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match parse_command(&line) {
                    Some(command) => {
                        if tx.send(command).is_err() {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => log::warn!(
                        "unknown command {:?} (a: toggle alert, on|off: set alert, s: stats)",
                        line.trim()
                    ),
                }
            }
        })?;
    Ok(rx)
}

fn apply_command(pipeline: &Pipeline, command: Command) {
    let enabled = match command {
        Command::ToggleAlert => !pipeline.alert_toggle().is_enabled(),
        Command::SetAlert(enabled) => enabled,
        Command::Stats => {
            log_stats(pipeline);
            return;
        }
    };
    pipeline.set_alert_enabled(enabled);
    log::info!("alert {}", if enabled { "on" } else { "off" });
}

fn log_stats(pipeline: &Pipeline) {
    let stats = pipeline.stats();
    log::info!(
        "stats: seen {}, dispatched {}, completed {}, failed {}, dropped {} (not ready {}, busy {}, paced {}), alerts {}, frames in use {}",
        stats.seen,
        stats.dispatched,
        stats.completed,
        stats.failed,
        stats.dropped(),
        stats.dropped_not_ready,
        stats.dropped_busy,
        stats.dropped_paced,
        pipeline.alert().trigger_count(),
        pipeline.frames_in_use()
    );
}

impl Args {
    fn apply(&self, cfg: &mut LeafwatchConfig) -> Result<()> {
        if let Some(model) = &self.model {
            cfg.model.path = model.clone();
        }
        if let Some(camera) = &self.camera {
            cfg.camera.device = camera.clone();
        }
        if let Some(alert) = &self.alert {
            cfg.alert.enabled =
                parse_flag(alert).ok_or_else(|| anyhow!("--alert must be on or off"))?;
        }
        if let Some(ms) = self.interval_ms {
            cfg.min_interval = Duration::from_millis(ms);
        }
        if let Some(accelerator) = self.accelerator {
            cfg.model.accelerator = accelerator;
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(args.ui, is_tty, !stdout_is_tty);

    let cfg = {
        let _stage = ui.stage("Load configuration");
        let mut cfg = LeafwatchConfig::load()?;
        args.apply(&mut cfg)?;
        cfg.validate()?;
        cfg
    };
    log::info!(
        "leafwatchd {}: model {}, camera {}, interval {} ms, alert {}",
        env!("CARGO_PKG_VERSION"),
        cfg.model.path.display(),
        cfg.camera.device,
        cfg.min_interval.as_millis(),
        if cfg.alert.enabled { "on" } else { "off" }
    );

    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let (sink, mut state) = ui_channel(cfg.labels.clone());
    let mut pipeline = Pipeline::start(&cfg, sink)?;

    {
        let stage = ui.stage("Load model");
        stage.detail(&cfg.model.path.display().to_string());
        loop {
            if shutdown_rx.try_recv().is_ok() {
                log::info!("shutdown requested during model load");
                pipeline.shutdown();
                return Ok(());
            }
            state.wait(UI_POLL);
            let display = state.display();
            if display.ready {
                break;
            }
            if let Some(reason) = &display.load_error {
                log::error!("model unavailable, inference disabled: {}", reason);
                stage.fail(reason.clone());
                break;
            }
        }
    }
    log::info!("status: {}", state.display().status);
    if let PreviewState::Unavailable(reason) = &state.display().preview {
        log::warn!("no camera preview: {}", reason);
    }

    let commands = spawn_command_reader()?;
    log::info!("leafwatchd running, waiting for shutdown signal (Ctrl-C)...");
    let mut last_sequence = None;
    let mut last_preview = state.display().preview.clone();
    let mut last_stats = Instant::now();
    while shutdown_rx.try_recv().is_err() {
        for command in commands.try_iter() {
            apply_command(&pipeline, command);
        }
        state.wait(UI_POLL);
        let display = state.display();

        let sequence = display.last_result.map(|result| result.sequence);
        if sequence != last_sequence {
            last_sequence = sequence;
            ui.report(display);
        }
        if display.preview != last_preview {
            match &display.preview {
                PreviewState::Live(device) => log::info!("camera preview live on {}", device),
                PreviewState::Unavailable(reason) => log::warn!("camera preview lost: {}", reason),
                PreviewState::Pending => {}
            }
            last_preview = display.preview.clone();
        }
        if last_stats.elapsed() >= STATS_INTERVAL {
            last_stats = Instant::now();
            log_stats(&pipeline);
        }
    }

    log::info!("shutdown signal received, stopping pipeline...");
    {
        let _stage = ui.stage("Stop pipeline");
        pipeline.shutdown();
    }
    state.pump();
    Ok(())
}
