//! Detection runtime.
//!
//! `DetectorService` owns the frame source, the active backend and the current
//! `DetectionSession`. While running, a worker thread pulls frames on a fixed
//! tick, runs the backend, feeds the session and publishes the newest
//! annotated frame. The presentation layer only reads snapshots.
//!
//! Source and backend move into the worker on `start` and come back on
//! `stop`, so they are never shared between threads.

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::AppConfig;
use crate::detect::{BackendRegistry, DetectorBackend, DetectorMethod, FallbackNotice};
use crate::frame::{BoundingBox, Frame};
use crate::ingest::FrameSource;
use crate::session::{DetectionEvent, DetectionSession, StatsSnapshot};

/// Worker frames between periodic health lines.
const HEALTH_LOG_EVERY: u64 = 300;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// The most recent frame the worker finished.
#[derive(Clone, Debug)]
pub struct LatestFrame {
    pub frame: Frame,
    pub count: usize,
    pub stats: StatsSnapshot,
    /// 1-based count of frames processed since the last `start`.
    pub frame_number: u64,
}

struct WorkerParts {
    source: Box<dyn FrameSource>,
    backend: Box<dyn DetectorBackend>,
}

struct Worker {
    handle: JoinHandle<WorkerParts>,
    stop_tx: Sender<()>,
}

struct WorkerContext {
    session: Arc<DetectionSession>,
    latest: Arc<Mutex<Option<LatestFrame>>>,
    failure: Arc<Mutex<Option<String>>>,
    interval: Duration,
    stop_rx: Receiver<()>,
}

pub struct DetectorService {
    config: AppConfig,
    registry: BackendRegistry,
    session: Arc<DetectionSession>,
    parts: Option<WorkerParts>,
    worker: Option<Worker>,
    latest: Arc<Mutex<Option<LatestFrame>>>,
    failure: Arc<Mutex<Option<String>>>,
    fallback: Option<FallbackNotice>,
}

impl DetectorService {
    /// Select a backend for the configured method and build the first session.
    pub fn new(
        config: AppConfig,
        registry: BackendRegistry,
        source: Box<dyn FrameSource>,
    ) -> Result<Self> {
        let selection = registry
            .select(config.detector.method, &config.detector)
            .context("select detector backend")?;
        check_pairing(selection.backend.as_ref(), source.as_ref())?;
        let session = Arc::new(DetectionSession::new(selection.active, &config));
        log::info!(
            "detector ready: {} ({})",
            selection.active,
            selection.backend.name()
        );
        Ok(Self {
            config,
            registry,
            session,
            parts: Some(WorkerParts {
                source,
                backend: selection.backend,
            }),
            worker: None,
            latest: Arc::new(Mutex::new(None)),
            failure: Arc::new(Mutex::new(None)),
            fallback: selection.fallback,
        })
    }

    /// Open the source and spawn the worker.
    ///
    /// A service that is already running is left alone.
    pub fn start(&mut self) -> Result<StartOutcome> {
        if self.is_running() {
            return Ok(StartOutcome::AlreadyRunning);
        }
        self.reap()?;

        let mut parts = self
            .parts
            .take()
            .ok_or_else(|| anyhow!("detector service lost its frame source"))?;
        if let Err(err) = parts.source.open() {
            let device = parts.source.stats().device;
            self.parts = Some(parts);
            return Err(err.context(format!("could not open camera {}", device)));
        }

        *lock(&self.failure) = None;
        *lock(&self.latest) = None;

        let (stop_tx, stop_rx) = bounded(0);
        let context = WorkerContext {
            session: Arc::clone(&self.session),
            latest: Arc::clone(&self.latest),
            failure: Arc::clone(&self.failure),
            interval: self.config.runtime.frame_interval(),
            stop_rx,
        };
        let handle = std::thread::Builder::new()
            .name("person-watch-worker".to_string())
            .spawn(move || run_worker(parts, context))
            .context("spawn detection worker")?;
        self.worker = Some(Worker { handle, stop_tx });

        log::info!("detection started ({})", self.session.method());
        Ok(StartOutcome::Started)
    }

    /// Stop the worker, wait for it and close the source. Safe to repeat.
    pub fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        drop(worker.stop_tx);
        self.join(worker.handle)?;
        log::info!("detection stopped");
        Ok(())
    }

    /// Rebuild backend and session for another method.
    ///
    /// Only allowed while stopped. History starts empty for the new method.
    /// Returns the fallback notice when the requested method was unavailable.
    pub fn switch_method(&mut self, name: &str) -> Result<Option<FallbackNotice>> {
        if self.is_running() {
            bail!("cannot switch detection method while detection is running");
        }
        self.reap()?;
        let requested: DetectorMethod = name.parse()?;
        let parts = self
            .parts
            .as_mut()
            .ok_or_else(|| anyhow!("detector service lost its frame source"))?;

        let selection = self
            .registry
            .select(requested, &self.config.detector)
            .with_context(|| format!("switch detector to {}", requested))?;
        check_pairing(selection.backend.as_ref(), parts.source.as_ref())?;
        parts.backend = selection.backend;
        self.session = Arc::new(DetectionSession::new(selection.active, &self.config));
        self.config.detector.method = selection.active;
        self.fallback = selection.fallback.clone();
        *lock(&self.latest) = None;

        log::info!("detection method set to {}", selection.active);
        Ok(selection.fallback)
    }

    pub fn latest(&self) -> Option<LatestFrame> {
        lock(&self.latest).clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.session.get_current_stats()
    }

    pub fn history(&self, limit: usize) -> Vec<DetectionEvent> {
        self.session.get_detection_history(limit)
    }

    pub fn active_method(&self) -> DetectorMethod {
        self.session.method()
    }

    /// Set when the last selection fell back to the baseline method.
    pub fn fallback(&self) -> Option<&FallbackNotice> {
        self.fallback.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Why the worker last stopped on its own, if it did.
    pub fn last_failure(&self) -> Option<String> {
        lock(&self.failure).clone()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    // Collect a worker that exited on its own.
    fn reap(&mut self) -> Result<()> {
        match self.worker.take() {
            Some(worker) => self.join(worker.handle),
            None => Ok(()),
        }
    }

    fn join(&mut self, handle: JoinHandle<WorkerParts>) -> Result<()> {
        match handle.join() {
            Ok(parts) => {
                self.parts = Some(parts);
                Ok(())
            }
            Err(_) => {
                let message = "detection worker panicked".to_string();
                *lock(&self.failure) = Some(message.clone());
                Err(anyhow!(message))
            }
        }
    }
}

impl Drop for DetectorService {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::error!("failed to stop detection: {:#}", err);
        }
    }
}

fn run_worker(mut parts: WorkerParts, context: WorkerContext) -> WorkerParts {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| worker_loop(&mut parts, &context)));
    if outcome.is_err() {
        let message = "detection worker panicked".to_string();
        log::error!("{}, stopping detection", message);
        *lock(&context.failure) = Some(message);
    }
    parts.source.close();
    parts
}

fn worker_loop(parts: &mut WorkerParts, context: &WorkerContext) {
    let ticker = tick(context.interval);
    let backend_name = parts.backend.name();
    let mut frame_number: u64 = 0;

    loop {
        let stopping = select! {
            recv(context.stop_rx) -> _ => true,
            recv(ticker) -> _ => false,
        };
        if stopping {
            break;
        }

        let frame = match parts.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(err) => {
                let message = format!("{:#}", err);
                log::error!("frame source failed, stopping detection: {}", message);
                *lock(&context.failure) = Some(message);
                break;
            }
        };
        frame_number += 1;

        let regions = match detect_guarded(parts.backend.as_mut(), &frame) {
            Ok(regions) => regions,
            Err(err) => {
                log::warn!(
                    "{} detection failed on frame {}: {:#}",
                    backend_name,
                    frame_number,
                    err
                );
                Vec::new()
            }
        };

        let processed = context.session.process(&frame, &regions);
        let stats = context.session.get_current_stats();
        *lock(&context.latest) = Some(LatestFrame {
            frame: processed.annotated,
            count: processed.count,
            stats,
            frame_number,
        });

        if frame_number % HEALTH_LOG_EVERY == 0 {
            log::debug!(
                "worker health: frame={} healthy={} captured={}",
                frame_number,
                parts.source.is_healthy(),
                parts.source.stats().frames_captured
            );
        }
    }
}

// A panicking backend costs one frame, not the worker.
fn detect_guarded(backend: &mut dyn DetectorBackend, frame: &Frame) -> Result<Vec<BoundingBox>> {
    panic::catch_unwind(AssertUnwindSafe(|| backend.detect(frame)))
        .unwrap_or_else(|_| Err(anyhow!("{} backend panicked", backend.name())))
}

/// Synthetic-only backends cannot see real cameras.
fn check_pairing(backend: &dyn DetectorBackend, source: &dyn FrameSource) -> Result<()> {
    let device = source.stats().device;
    if backend.synthetic_only() && !device.starts_with("stub://") {
        bail!(
            "the {} {} backend only detects stub:// scenes, not {} (build with backend-opencv for real HOG detection)",
            backend.method(),
            backend.name(),
            device
        );
    }
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
