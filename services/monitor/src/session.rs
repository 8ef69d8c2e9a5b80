//! Camera session: the per-camera detect, filter and report loop.
//!
//! A session moves through `Starting → Resolving → Streaming → (Detecting ⇄ Idle)
//! → Stopping → Terminated`. Whatever ends the streaming loop (budget, stop
//! request, detection, fault), teardown runs exactly once and in a fixed
//! order: frame relay, then decoder, then the diagnostics reader.

use crate::camera::{CameraDescriptor, CameraKey};
use crate::config::SessionConfig;
use crate::decoder::{DecoderError, DecoderExit, DecoderLauncher, DecoderProcess};
use crate::detector::{DetectionAdapter, Detection};
use crate::diagnostics::{run_diagnostics, DiagnosticSummary};
use crate::frame_relay::{Frame, FrameRelay, RelayStats};
use crate::probe::{FrameDims, StreamProber};
use crate::reporter::{EventDebounce, EventReporter};
use crate::zone::{Point, ZoneFilter, ZoneRegistry};
use futures::FutureExt;
use parking_lot::RwLock;
use serde::Serialize;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};
use uuid::Uuid;

/// Lifecycle phase of a camera session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Starting,
    Resolving,
    Streaming,
    Detecting,
    Idle,
    Stopping,
    Terminated,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionExit {
    BudgetExpired,
    Stopped,
    Detected,
    ProbeFailed,
    DecoderFailed,
    InternalError,
}

/// Counters for one session.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_seen: u64,
    pub frames_processed: u64,
    pub detections_kept: u64,
    pub detections_zone_rejected: u64,
    pub detector_failures: u64,
    pub events_sent: u64,
}

/// Final result of a session.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub exit: SessionExit,
    pub decoder_exit: Option<DecoderExit>,
    pub stats: SessionStats,
    pub relay: Option<RelayStats>,
    pub diagnostics: Option<DiagnosticSummary>,
    pub elapsed: Duration,
}

/// State shared between a session and its owner.
///
/// Only the session writes the phase. The owner may request a stop.
#[derive(Debug)]
pub struct SessionControl {
    running: AtomicBool,
    phase: RwLock<SessionPhase>,
}

impl SessionControl {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            phase: RwLock::new(SessionPhase::Starting),
        }
    }

    /// Ask the session to stop at its next loop iteration.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.read()
    }

    fn set_phase(&self, phase: SessionPhase) {
        let mut current = self.phase.write();
        if *current != phase {
            trace!(from = ?*current, to = ?phase, "Session phase change");
            *current = phase;
        }
    }
}

/// Owner's handle on a running session task.
pub struct SessionHandle {
    key: CameraKey,
    id: Uuid,
    control: Arc<SessionControl>,
    task: JoinHandle<SessionOutcome>,
    started_at: Instant,
}

impl SessionHandle {
    /// Launch `run` as a session task with a fresh control block and tracing span.
    pub fn launch<F, Fut>(key: CameraKey, run: F) -> Self
    where
        F: FnOnce(Arc<SessionControl>) -> Fut,
        Fut: Future<Output = SessionOutcome> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let control = Arc::new(SessionControl::new());
        let span = info_span!(
            "session",
            session_id = %id,
            camera_id = key.camera_id,
            recorder_id = %key.recorder_id
        );
        let task = tokio::spawn(run(control.clone()).instrument(span));

        Self {
            key,
            id,
            control,
            task,
            started_at: Instant::now(),
        }
    }

    pub fn key(&self) -> &CameraKey {
        &self.key
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn control(&self) -> Arc<SessionControl> {
        self.control.clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.control.phase()
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn stop(&self) {
        self.control.stop();
    }

    /// True until the session task, teardown included, has finished.
    pub fn is_alive(&self) -> bool {
        !self.task.is_finished()
    }

    /// Wait for the session to finish.
    pub async fn join(self) -> SessionOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(session_id = %self.id, camera = %self.key, error = %e, "Session task failed");
                SessionOutcome {
                    exit: SessionExit::InternalError,
                    decoder_exit: None,
                    stats: SessionStats::default(),
                    relay: None,
                    diagnostics: None,
                    elapsed: self.started_at.elapsed(),
                }
            }
        }
    }
}

/// Process-scoped dependencies shared by every session.
#[derive(Clone)]
pub struct SessionContext {
    pub config: SessionConfig,
    pub terminate_grace: Duration,
    pub prober: Arc<dyn StreamProber>,
    pub launcher: Arc<dyn DecoderLauncher>,
    pub detector: Arc<DetectionAdapter>,
    pub reporter: Arc<dyn EventReporter>,
    pub zones: Arc<ZoneRegistry>,
}

/// Decoder, relay and diagnostics reader for one session.
struct Pipeline {
    decoder: DecoderProcess,
    relay: FrameRelay,
    diagnostics: JoinHandle<DiagnosticSummary>,
    diagnostics_cancel: CancellationToken,
}

impl Pipeline {
    fn start(
        launcher: &dyn DecoderLauncher,
        camera: &Arc<CameraDescriptor>,
        dims: FrameDims,
        reporter: Arc<dyn EventReporter>,
    ) -> Result<Self, DecoderError> {
        let command = launcher.command(&camera.stream_uri, dims);
        let (decoder, pipes) = DecoderProcess::spawn(command)?;

        let relay = FrameRelay::start(pipes.stdout, dims);
        let diagnostics_cancel = CancellationToken::new();
        let diagnostics = tokio::spawn(run_diagnostics(
            pipes.stderr,
            camera.clone(),
            reporter,
            diagnostics_cancel.clone(),
        ));

        Ok(Self {
            decoder,
            relay,
            diagnostics,
            diagnostics_cancel,
        })
    }

    /// Stop the relay, reap the decoder, then drain the diagnostics reader.
    async fn teardown(self, grace: Duration) -> (Option<DecoderExit>, RelayStats, Option<DiagnosticSummary>) {
        let Pipeline {
            decoder,
            mut relay,
            diagnostics,
            diagnostics_cancel,
        } = self;

        relay.stop().await;
        let relay_stats = relay.stats();

        let pid = decoder.pid();
        let decoder_exit = match decoder.terminate(grace).await {
            Ok(exit) => Some(exit),
            Err(e) => {
                error!(pid = ?pid, error = %e, "Failed to stop decoder");
                None
            }
        };

        diagnostics_cancel.cancel();
        let summary = match diagnostics.await {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!(error = %e, "Diagnostics reader ended abnormally");
                None
            }
        };

        (decoder_exit, relay_stats, summary)
    }
}

/// One monitoring session for one camera.
pub struct CameraSession {
    camera: Arc<CameraDescriptor>,
    context: SessionContext,
    control: Arc<SessionControl>,
    zone: Option<ZoneFilter>,
    debounce: EventDebounce,
    error_event_sent: bool,
    stats: SessionStats,
    started_at: Instant,
}

impl CameraSession {
    pub fn new(camera: CameraDescriptor, context: SessionContext, control: Arc<SessionControl>) -> Self {
        let zone = context.zones.filter_for(&camera.key());
        let debounce = EventDebounce::new(context.config.event_delay());
        Self {
            camera: Arc::new(camera),
            context,
            control,
            zone,
            debounce,
            error_event_sent: false,
            stats: SessionStats::default(),
            started_at: Instant::now(),
        }
    }

    /// Run the session to completion.
    pub async fn run(mut self) -> SessionOutcome {
        info!(
            camera_name = %self.camera.camera_name,
            recorder_name = %self.camera.recorder_name,
            stream = ?self.camera.stream_kind,
            uri = %self.camera.redacted_uri(),
            zone = self.zone.is_some(),
            "Session starting"
        );

        self.control.set_phase(SessionPhase::Resolving);
        let dims = match self.context.prober.probe(&self.camera.stream_uri).await {
            Ok(dims) => dims,
            Err(e) => {
                error!(error = %e, "Stream probe failed");
                self.report_error_once(&format!("stream probe failed: {}", e)).await;
                return self.finish(SessionExit::ProbeFailed, None, None, None);
            }
        };
        debug!(width = dims.width, height = dims.height, "Stream probed");

        if !self.control.is_running() {
            return self.finish(SessionExit::Stopped, None, None, None);
        }

        let pipeline = match Pipeline::start(
            self.context.launcher.as_ref(),
            &self.camera,
            dims,
            self.context.reporter.clone(),
        ) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                error!(error = %e, "Decoder failed to start");
                self.report_error_once(&format!("decoder failed to start: {}", e)).await;
                return self.finish(SessionExit::DecoderFailed, None, None, None);
            }
        };
        info!(pid = ?pipeline.decoder.pid(), "Streaming");
        self.control.set_phase(SessionPhase::Streaming);

        let streamed = AssertUnwindSafe(self.stream(&pipeline.relay)).catch_unwind().await;
        let exit = match streamed {
            Ok(exit) => exit,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(panic = %message, "Session loop panicked");
                self.report_error_once(&format!("internal error: {}", message)).await;
                SessionExit::InternalError
            }
        };

        self.control.set_phase(SessionPhase::Stopping);
        let (decoder_exit, relay, diagnostics) = pipeline.teardown(self.context.terminate_grace).await;
        self.finish(exit, decoder_exit, Some(relay), diagnostics)
    }

    async fn stream(&mut self, relay: &FrameRelay) -> SessionExit {
        let budget = self.context.config.time_budget();
        // The budget covers streaming only, not the probe or decoder start.
        let streaming_started = Instant::now();
        let frame_wait = self.context.config.frame_wait();
        let process_every = self.context.config.process_every.max(1);
        let mut last_sequence = 0;

        loop {
            if !self.control.is_running() {
                info!("Stop requested");
                return SessionExit::Stopped;
            }
            if streaming_started.elapsed() >= budget {
                debug!(budget_secs = budget.as_secs(), "Session budget expired");
                return SessionExit::BudgetExpired;
            }

            let sequence = relay.sequence();
            if sequence == last_sequence {
                if relay.is_finished() {
                    warn!("Decoder output ended");
                    self.report_error_once("decoder output ended").await;
                    return SessionExit::DecoderFailed;
                }
                tokio::time::sleep(frame_wait).await;
                continue;
            }
            last_sequence = sequence;

            let Some(frame) = relay.read() else {
                continue;
            };
            self.stats.frames_seen += 1;
            if self.stats.frames_seen % process_every != 0 {
                self.control.set_phase(SessionPhase::Idle);
                continue;
            }

            self.control.set_phase(SessionPhase::Detecting);
            let confirmed = self.process(&frame).await;
            self.control.set_phase(SessionPhase::Idle);

            if confirmed {
                if self.debounce.try_fire(Instant::now()) {
                    self.context.reporter.report_detection(&self.camera).await;
                    self.stats.events_sent += 1;
                } else {
                    debug!("Detection inside event window; not reported");
                }

                if self.context.config.stop_on_detection {
                    return SessionExit::Detected;
                }
            }
        }
    }

    /// Detect on one frame; true if any detection survives the zone filter.
    async fn process(&mut self, frame: &Frame) -> bool {
        self.stats.frames_processed += 1;

        let detections = match self.context.detector.detect(frame).await {
            Ok(detections) => detections,
            Err(e) => {
                self.stats.detector_failures += 1;
                warn!(sequence = frame.sequence, error = %e, "Detection failed");
                return false;
            }
        };

        let mut kept = 0;
        for detection in &detections {
            if self.in_zone(detection, frame) {
                kept += 1;
            } else {
                self.stats.detections_zone_rejected += 1;
            }
        }
        self.stats.detections_kept += kept;

        if kept > 0 {
            info!(sequence = frame.sequence, kept, "Person detected");
        }
        kept > 0
    }

    /// Zone test on the box center, scaled into the zone reference frame.
    fn in_zone(&self, detection: &Detection, frame: &Frame) -> bool {
        let Some(zone) = &self.zone else {
            return true;
        };

        let (cx, cy) = detection.bounding_box.center();
        let scale_x = self.context.config.zone_reference_width as f64 / frame.width.max(1) as f64;
        let scale_y = self.context.config.zone_reference_height as f64 / frame.height.max(1) as f64;
        zone.contains(Point::new(cx as f64 * scale_x, cy as f64 * scale_y))
    }

    async fn report_error_once(&mut self, reason: &str) {
        if self.error_event_sent {
            return;
        }
        self.error_event_sent = true;
        self.context.reporter.report_error(&self.camera, reason).await;
    }

    fn finish(
        self,
        exit: SessionExit,
        decoder_exit: Option<DecoderExit>,
        relay: Option<RelayStats>,
        diagnostics: Option<DiagnosticSummary>,
    ) -> SessionOutcome {
        self.control.set_phase(SessionPhase::Terminated);
        let elapsed = self.started_at.elapsed();

        info!(
            exit = ?exit,
            decoder_exit = ?decoder_exit,
            elapsed_ms = elapsed.as_millis() as u64,
            frames_seen = self.stats.frames_seen,
            frames_processed = self.stats.frames_processed,
            detections_kept = self.stats.detections_kept,
            zone_rejected = self.stats.detections_zone_rejected,
            detector_failures = self.stats.detector_failures,
            events_sent = self.stats.events_sent,
            "Session terminated"
        );

        SessionOutcome {
            exit,
            decoder_exit,
            stats: self.stats,
            relay,
            diagnostics,
            elapsed,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::decoder::testing::ShellLauncher;
    use crate::detector::testing::{detection, ScriptedDetector};
    use crate::detector::{DetectorError, ObjectDetector};
    use crate::reporter::testing::{sample_descriptor, RecordingReporter};
    use crate::zone::ZoneConfig;

    fn launch(context: SessionContext) -> SessionHandle {
        let camera = sample_descriptor();
        SessionHandle::launch(camera.key(), move |control| {
            CameraSession::new(camera, context, control).run()
        })
    }

    fn person() -> Detection {
        detection("person", 0.9, [0.0, 0.0, 2.0, 2.0])
    }

    struct PanickingDetector;

    #[async_trait::async_trait]
    impl ObjectDetector for PanickingDetector {
        async fn detect(&self, _frame: &Frame, _classes: &[String]) -> Result<Vec<Detection>, DetectorError> {
            panic!("model crashed");
        }
    }

    #[tokio::test]
    async fn test_budget_expiry_without_detection() {
        let detector = idle_detector();
        let reporter = Arc::new(RecordingReporter::default());
        let context = context(
            session_config(1),
            Arc::new(FixedProber::tiny()),
            detector.clone(),
            reporter.clone(),
        );

        let handle = launch(context);
        let control = handle.control();
        let outcome = handle.join().await;

        assert_eq!(outcome.exit, SessionExit::BudgetExpired);
        assert_eq!(control.phase(), SessionPhase::Terminated);
        assert!(outcome.decoder_exit.is_some());
        assert!(outcome.stats.frames_seen > 0);
        assert!(outcome.stats.frames_processed > 0);
        assert!(outcome.stats.frames_processed <= outcome.stats.frames_seen);
        assert!(detector.calls() > 0);
        assert_eq!(reporter.detection_count(), 0);
        assert_eq!(reporter.error_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_probe_does_not_consume_budget() {
        let detector = idle_detector();
        let context = context(
            session_config(1),
            Arc::new(FixedProber::slow(Duration::from_millis(1500))),
            detector.clone(),
            Arc::new(RecordingReporter::default()),
        );

        let outcome = launch(context).join().await;

        assert_eq!(outcome.exit, SessionExit::BudgetExpired);
        assert!(outcome.stats.frames_seen > 0);
        assert!(outcome.stats.frames_processed > 0);
        assert!(detector.calls() > 0);
        assert!(outcome.elapsed >= Duration::from_millis(2500));
    }

    #[tokio::test]
    async fn test_probe_failure_reports_once_and_terminates() {
        let reporter = Arc::new(RecordingReporter::default());
        let context = context(
            session_config(5),
            Arc::new(FixedProber::failing()),
            idle_detector(),
            reporter.clone(),
        );

        let outcome = launch(context).join().await;

        assert_eq!(outcome.exit, SessionExit::ProbeFailed);
        assert!(outcome.decoder_exit.is_none());
        assert_eq!(reporter.error_count(), 1);
        assert_eq!(reporter.detection_count(), 0);
    }

    #[tokio::test]
    async fn test_detection_ends_session_early() {
        let reporter = Arc::new(RecordingReporter::default());
        let context = context(
            session_config(10),
            Arc::new(FixedProber::tiny()),
            Arc::new(ScriptedDetector::returning(vec![person()])),
            reporter.clone(),
        );

        let outcome = launch(context).join().await;

        assert_eq!(outcome.exit, SessionExit::Detected);
        assert!(outcome.elapsed < Duration::from_secs(10));
        assert!(outcome.decoder_exit.is_some());
        assert_eq!(outcome.stats.events_sent, 1);
        assert_eq!(reporter.detection_count(), 1);
    }

    #[tokio::test]
    async fn test_continuous_mode_debounces_reports() {
        let reporter = Arc::new(RecordingReporter::default());
        let mut config = session_config(1);
        config.stop_on_detection = false;
        let context = context(
            config,
            Arc::new(FixedProber::tiny()),
            Arc::new(ScriptedDetector::returning(vec![person()])),
            reporter.clone(),
        );

        let outcome = launch(context).join().await;

        assert_eq!(outcome.exit, SessionExit::BudgetExpired);
        assert!(outcome.stats.detections_kept > 1);
        assert_eq!(reporter.detection_count(), 1);
    }

    #[tokio::test]
    async fn test_zone_rejects_detection_outside_area() {
        let reporter = Arc::new(RecordingReporter::default());
        let mut context = context(
            session_config(1),
            Arc::new(FixedProber::tiny()),
            Arc::new(ScriptedDetector::returning(vec![person()])),
            reporter.clone(),
        );
        let mut zones = ZoneRegistry::empty();
        zones.insert(
            sample_descriptor().key(),
            ZoneConfig::Area {
                polygon: vec![
                    Point::new(600.0, 300.0),
                    Point::new(640.0, 300.0),
                    Point::new(640.0, 360.0),
                    Point::new(600.0, 360.0),
                ],
            },
        );
        context.zones = Arc::new(zones);

        let outcome = launch(context).join().await;

        assert_eq!(outcome.exit, SessionExit::BudgetExpired);
        assert!(outcome.stats.detections_zone_rejected > 0);
        assert_eq!(outcome.stats.detections_kept, 0);
        assert_eq!(reporter.detection_count(), 0);
    }

    #[tokio::test]
    async fn test_zone_accepts_scaled_center() {
        let reporter = Arc::new(RecordingReporter::default());
        let mut context = context(
            session_config(5),
            Arc::new(FixedProber::tiny()),
            Arc::new(ScriptedDetector::returning(vec![person()])),
            reporter.clone(),
        );
        // Box center (1, 1) in a 4x2 frame is (160, 180) in reference space.
        let mut zones = ZoneRegistry::empty();
        zones.insert(
            sample_descriptor().key(),
            ZoneConfig::Area {
                polygon: vec![
                    Point::new(100.0, 100.0),
                    Point::new(200.0, 100.0),
                    Point::new(200.0, 200.0),
                    Point::new(100.0, 200.0),
                ],
            },
        );
        context.zones = Arc::new(zones);

        let outcome = launch(context).join().await;

        assert_eq!(outcome.exit, SessionExit::Detected);
        assert_eq!(reporter.detection_count(), 1);
    }

    #[tokio::test]
    async fn test_stop_request_ends_session() {
        let context = context(
            session_config(60),
            Arc::new(FixedProber::tiny()),
            idle_detector(),
            Arc::new(RecordingReporter::default()),
        );

        let handle = launch(context);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(handle.is_alive());
        handle.stop();

        let outcome = tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .unwrap();
        assert_eq!(outcome.exit, SessionExit::Stopped);
        assert!(outcome.decoder_exit.is_some());
    }

    #[tokio::test]
    async fn test_decoder_spawn_failure() {
        let reporter = Arc::new(RecordingReporter::default());
        let mut context = context(
            session_config(5),
            Arc::new(FixedProber::tiny()),
            idle_detector(),
            reporter.clone(),
        );
        context.launcher = Arc::new(MissingLauncher);

        let outcome = launch(context).join().await;

        assert_eq!(outcome.exit, SessionExit::DecoderFailed);
        assert_eq!(reporter.error_count(), 1);
    }

    #[tokio::test]
    async fn test_decoder_exit_ends_session() {
        let reporter = Arc::new(RecordingReporter::default());
        let mut context = context(
            session_config(30),
            Arc::new(FixedProber::tiny()),
            idle_detector(),
            reporter.clone(),
        );
        context.launcher = Arc::new(ExitingLauncher);

        let outcome = tokio::time::timeout(Duration::from_secs(10), launch(context).join())
            .await
            .unwrap();

        assert_eq!(outcome.exit, SessionExit::DecoderFailed);
        assert_eq!(reporter.error_count(), 1);
    }

    #[tokio::test]
    async fn test_panic_in_loop_still_tears_down() {
        let reporter = Arc::new(RecordingReporter::default());
        let context = context(
            session_config(10),
            Arc::new(FixedProber::tiny()),
            Arc::new(PanickingDetector),
            reporter.clone(),
        );

        let handle = launch(context);
        let control = handle.control();
        let outcome = handle.join().await;

        assert_eq!(outcome.exit, SessionExit::InternalError);
        assert!(outcome.decoder_exit.is_some());
        assert_eq!(control.phase(), SessionPhase::Terminated);
        assert_eq!(reporter.error_count(), 1);
    }

    #[tokio::test]
    async fn test_stderr_disconnect_reported_during_session() {
        let reporter = Arc::new(RecordingReporter::default());
        let mut context = context(
            session_config(1),
            Arc::new(FixedProber::tiny()),
            idle_detector(),
            reporter.clone(),
        );
        context.launcher = Arc::new(ShellLauncher {
            stderr_script: "echo 'Error number -10054 occurred' >&2; \
                            echo 'Error number -10054 occurred' >&2;"
                .to_string(),
        });

        let outcome = launch(context).join().await;

        assert_eq!(outcome.exit, SessionExit::BudgetExpired);
        assert_eq!(reporter.error_count(), 1);
        let diagnostics = outcome.diagnostics.unwrap();
        assert_eq!(diagnostics.reported, 1);
        assert_eq!(diagnostics.suppressed, 1);
    }

    struct MissingLauncher;

    impl DecoderLauncher for MissingLauncher {
        fn command(&self, _stream_uri: &str, _dims: FrameDims) -> tokio::process::Command {
            tokio::process::Command::new("/nonexistent/decoder-binary")
        }
    }

    /// Writes one frame and exits.
    struct ExitingLauncher;

    impl DecoderLauncher for ExitingLauncher {
        fn command(&self, _stream_uri: &str, dims: FrameDims) -> tokio::process::Command {
            let mut command = tokio::process::Command::new("sh");
            command
                .arg("-c")
                .arg(format!("head -c {} /dev/zero", dims.frame_size()));
            command
        }
    }
}
