//! personwatch - live person detection with rolling statistics

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossbeam_channel::{bounded, select, tick, Receiver};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use person_watch::config::resolve_camera_device;
use person_watch::{
    AppConfig, BackendRegistry, CameraSource, DetectorService, FallbackNotice, Frame,
    StatsSnapshot,
};

#[path = "../ui.rs"]
mod ui;

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON, or TOML when the extension is .toml).
    #[arg(long, env = "PERSONWATCH_CONFIG")]
    config: Option<PathBuf>,
    /// Detection method: HOG or YOLO.
    #[arg(long)]
    method: Option<String>,
    /// Camera index (0 = /dev/video0), device path, or stub://<name>.
    /// Defaults to the synthetic stub://camera0 scene; real devices need the
    /// ingest-v4l2 feature.
    #[arg(long)]
    camera: Option<String>,
    /// ONNX model for YOLO detection.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Worker frames per second.
    #[arg(long)]
    fps: Option<u32>,
    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    seconds: Option<u64>,
    /// Toggle HOG/YOLO once after this many seconds.
    #[arg(long)]
    switch_after: Option<u64>,
    /// Save the last annotated frame here on exit (.png or .jpg).
    #[arg(long)]
    snapshot: Option<PathBuf>,
    /// Events to print from the history on exit.
    #[arg(long)]
    history: Option<usize>,
    /// Print stats as JSON lines on stdout.
    #[arg(long)]
    json: bool,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = ui::Ui::from_flag(Some(&args.ui), std::io::stderr().is_terminal());

    let config = {
        let _stage = ui.stage("Load configuration");
        load_config(&args)?
    };
    let history_limit = args.history.unwrap_or(config.stats.history_limit);

    let mut service = {
        let _stage = ui.stage("Select detector");
        let camera = CameraSource::new(config.camera.clone())?;
        DetectorService::new(config, BackendRegistry::builtin(), Box::new(camera))?
    };
    if let Some(notice) = service.fallback() {
        report_fallback(notice);
    }

    let (stop_tx, stop_rx) = bounded(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("install Ctrl-C handler")?;

    {
        let _stage = ui.stage("Open camera");
        service.start()?;
    }

    let outcome = watch(&mut service, &args, &ui, &stop_rx);
    service.stop()?;
    let last_frame = outcome?;

    let stats = service.stats();
    eprintln!("{}", format_stats(&stats));
    eprintln!("Recent detections:");
    for event in service.history(history_limit).iter().rev() {
        eprintln!(
            "  {} - {} person(s)",
            event.timestamp().format("%H:%M:%S"),
            event.count()
        );
    }

    if let Some(path) = &args.snapshot {
        let _stage = ui.stage("Save snapshot");
        let frame = last_frame.context("no frame was processed, nothing to save")?;
        frame
            .into_image()
            .save(path)
            .with_context(|| format!("write snapshot {}", path.display()))?;
    }

    Ok(())
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = AppConfig::load_from(args.config.as_deref())?;
    if let Some(method) = &args.method {
        config.detector.method = method.parse()?;
    }
    if let Some(camera) = &args.camera {
        config.camera.device = resolve_camera_device(camera);
    }
    if let Some(model) = &args.model {
        config.detector.model_path = Some(model.clone());
    }
    if let Some(fps) = args.fps {
        config.runtime.target_fps = fps;
    }
    config.validate()?;
    Ok(config)
}

/// Poll the service until Ctrl-C, the time limit, or a worker failure.
/// Returns the last annotated frame seen.
fn watch(
    service: &mut DetectorService,
    args: &Args,
    ui: &ui::Ui,
    stop_rx: &Receiver<()>,
) -> Result<Option<Frame>> {
    let render = tick(service.config().runtime.render_interval());
    let started = Instant::now();
    let deadline = args.seconds.map(Duration::from_secs);
    let mut switch_at = args.switch_after.map(Duration::from_secs);
    let mut last_report = Instant::now();
    let mut last_frame: Option<Frame> = None;
    let mut last_reported_frame = 0;
    let live = ui.live();
    if !ui.is_pretty() {
        log::info!("press Ctrl-C to stop");
    }

    loop {
        let interrupted = select! {
            recv(stop_rx) -> _ => true,
            recv(render) -> _ => false,
        };
        if interrupted {
            live.println("interrupted, stopping");
            break;
        }

        if !service.is_running() {
            live.finish();
            match service.last_failure() {
                Some(failure) => bail!("detection stopped: {}", failure),
                None => break,
            }
        }

        if let Some(latest) = service.latest() {
            if latest.frame_number != last_reported_frame {
                last_reported_frame = latest.frame_number;
                last_frame = Some(latest.frame);
            }
        }

        if last_report.elapsed() >= REPORT_INTERVAL {
            last_report = Instant::now();
            let stats = service.stats();
            if args.json {
                let line = serde_json::json!({
                    "method": service.active_method(),
                    "frame": last_reported_frame,
                    "stats": stats,
                });
                println!("{}", line);
            } else {
                live.update(&format!(
                    "{} [{}]",
                    format_stats(&stats),
                    service.active_method()
                ));
            }
        }

        let elapsed = started.elapsed();
        if switch_at.is_some_and(|at| elapsed >= at) {
            switch_at = None;
            let next = service.active_method().toggled();
            live.println(&format!("switching to {}", next));
            service.stop()?;
            if let Some(notice) = service.switch_method(next.label())? {
                report_fallback(&notice);
            }
            service.start()?;
            last_reported_frame = 0;
        }

        if deadline.is_some_and(|limit| elapsed >= limit) {
            break;
        }
    }

    live.finish();
    Ok(last_frame)
}

fn format_stats(stats: &StatsSnapshot) -> String {
    format!(
        "Current: {} | Avg: {:.1} | Max: {}",
        stats.current_count, stats.average_count, stats.max_count
    )
}

fn report_fallback(notice: &FallbackNotice) {
    log::warn!(
        "{} unavailable, using {}: {}",
        notice.requested,
        notice.active,
        notice.reason
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn camera_help_names_synthetic_default() {
        let help = Args::command().render_long_help().to_string();
        assert!(help.contains("stub://camera0"));
        assert!(help.contains("ingest-v4l2"));
    }

    #[test]
    fn camera_flag_overrides_config() {
        let args = Args::parse_from(["personwatch", "--camera", "0", "--fps", "12"]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.camera.device, "/dev/video0");
        assert_eq!(config.runtime.target_fps, 12);
    }
}
