//! Decoder diagnostic stream classification.
//!
//! RTSP decoders emit bursts of near-duplicate errors around a single root
//! cause. The classifier keeps explicit per-category state so that known
//! benign cascades are logged once and then suppressed, while conditions that
//! need operator attention are forwarded to the error-event path.

use crate::camera::CameraDescriptor;
use crate::reporter::EventReporter;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

const PARAMETER_SET_ROOT: &str = "non-existing PPS";
const PARAMETER_SET_CASCADE: &[&str] = &[
    "non-existing PPS",
    "non-existing SPS",
    "decode_slice_header error",
    "no frame!",
    "sps_id",
    "pps_id",
    "Invalid NAL unit size",
    "Error splitting the input into NAL units",
    "missing picture in access unit",
];

const REFERENCE_ROOT: &str = "Missing reference picture";
const REFERENCE_CASCADE: &[&str] = &[
    "Missing reference picture",
    "error while decoding MB",
    "concealing",
    "Could not find ref with POC",
    "reference picture missing during reorder",
    "mmco: unref short failure",
];

const DISCONNECT_MARKERS: &[&str] = &["10054", "Connection reset by peer"];

/// Category of a single diagnostic line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    MissingParameterSet,
    MissingReference,
    RemoteDisconnect,
    Other,
}

impl DiagnosticKind {
    pub fn classify(line: &str) -> Self {
        if DISCONNECT_MARKERS.iter().any(|m| line.contains(m)) {
            DiagnosticKind::RemoteDisconnect
        } else if line.contains(PARAMETER_SET_ROOT) {
            DiagnosticKind::MissingParameterSet
        } else if line.contains(REFERENCE_ROOT) {
            DiagnosticKind::MissingReference
        } else {
            DiagnosticKind::Other
        }
    }
}

/// What to do with one diagnostic line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Blank line.
    Ignore,
    /// Known noise; trace only.
    Suppressed,
    /// First occurrence of a benign root cause; log, no event.
    Logged,
    /// Needs an error event.
    Report,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cascade {
    ParameterSet,
    Reference,
}

impl Cascade {
    fn matches(self, line: &str) -> bool {
        let patterns = match self {
            Cascade::ParameterSet => PARAMETER_SET_CASCADE,
            Cascade::Reference => REFERENCE_CASCADE,
        };
        patterns.iter().any(|p| line.contains(p))
    }
}

/// Per-session classifier state.
#[derive(Debug, Default)]
pub struct DiagnosticClassifier {
    parameter_set_logged: bool,
    reference_logged: bool,
    disconnect_reported: bool,
    active_cascade: Option<Cascade>,
}

impl DiagnosticClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one line and update the suppression state.
    pub fn observe(&mut self, line: &str) -> (DiagnosticKind, Verdict) {
        let line = line.trim();
        if line.is_empty() {
            return (DiagnosticKind::Other, Verdict::Ignore);
        }

        if let Some(cascade) = self.active_cascade {
            if cascade.matches(line) {
                let kind = match cascade {
                    Cascade::ParameterSet => DiagnosticKind::MissingParameterSet,
                    Cascade::Reference => DiagnosticKind::MissingReference,
                };
                return (kind, Verdict::Suppressed);
            }
        }

        let kind = DiagnosticKind::classify(line);
        let verdict = match kind {
            DiagnosticKind::MissingParameterSet => {
                self.active_cascade = Some(Cascade::ParameterSet);
                first_time(&mut self.parameter_set_logged, Verdict::Logged)
            }
            DiagnosticKind::MissingReference => {
                self.active_cascade = Some(Cascade::Reference);
                first_time(&mut self.reference_logged, Verdict::Logged)
            }
            DiagnosticKind::RemoteDisconnect => {
                self.active_cascade = None;
                first_time(&mut self.disconnect_reported, Verdict::Report)
            }
            DiagnosticKind::Other => {
                self.active_cascade = None;
                Verdict::Report
            }
        };

        (kind, verdict)
    }
}

fn first_time(flag: &mut bool, verdict: Verdict) -> Verdict {
    if *flag {
        Verdict::Suppressed
    } else {
        *flag = true;
        verdict
    }
}

/// Counters for one diagnostic stream.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiagnosticSummary {
    pub lines: u64,
    pub suppressed: u64,
    pub logged: u64,
    pub reported: u64,
}

/// Drain a decoder's diagnostic stream until EOF or cancellation.
pub async fn run_diagnostics<R>(
    stream: R,
    camera: Arc<CameraDescriptor>,
    reporter: Arc<dyn EventReporter>,
    cancel: CancellationToken,
) -> DiagnosticSummary
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    let mut classifier = DiagnosticClassifier::new();
    let mut summary = DiagnosticSummary::default();

    loop {
        // Cancellation wins over lines still buffered in the pipe.
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = lines.next_line() => next,
        };

        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                debug!(camera_id = camera.camera_id, error = %e, "Diagnostic stream read failed");
                break;
            }
        };

        let (kind, verdict) = classifier.observe(&line);
        if verdict == Verdict::Ignore {
            continue;
        }
        summary.lines += 1;

        match verdict {
            Verdict::Ignore => {}
            Verdict::Suppressed => {
                summary.suppressed += 1;
                trace!(camera_id = camera.camera_id, kind = ?kind, line = %line, "Decoder diagnostic suppressed");
            }
            Verdict::Logged => {
                summary.logged += 1;
                error!(
                    camera_id = camera.camera_id,
                    recorder_id = %camera.recorder_id,
                    kind = ?kind,
                    line = %line,
                    "Decoder error; follow-on errors will be suppressed"
                );
            }
            Verdict::Report => {
                summary.reported += 1;
                warn!(
                    camera_id = camera.camera_id,
                    recorder_id = %camera.recorder_id,
                    kind = ?kind,
                    line = %line,
                    "Decoder error"
                );
                reporter.report_error(&camera, line.trim()).await;
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::testing::RecordingReporter;
    use crate::reporter::testing::sample_descriptor;

    #[test]
    fn test_classify() {
        assert_eq!(
            DiagnosticKind::classify("[h264 @ 0x55] non-existing PPS 0 referenced"),
            DiagnosticKind::MissingParameterSet
        );
        assert_eq!(
            DiagnosticKind::classify("[h264 @ 0x55] Missing reference picture, default is 65530"),
            DiagnosticKind::MissingReference
        );
        assert_eq!(
            DiagnosticKind::classify("rtsp://cam: Error number -10054 occurred"),
            DiagnosticKind::RemoteDisconnect
        );
        assert_eq!(
            DiagnosticKind::classify("rtsp://cam: Connection reset by peer"),
            DiagnosticKind::RemoteDisconnect
        );
        assert_eq!(
            DiagnosticKind::classify("rtsp://cam: 401 Unauthorized"),
            DiagnosticKind::Other
        );
    }

    #[test]
    fn test_parameter_set_cascade_logged_once() {
        let mut classifier = DiagnosticClassifier::new();
        let lines = [
            "[h264 @ 0x55] non-existing PPS 0 referenced",
            "[h264 @ 0x55] decode_slice_header error",
            "[h264 @ 0x55] no frame!",
            "[h264 @ 0x55] non-existing PPS 0 referenced",
            "[h264 @ 0x55] decode_slice_header error",
            "[h264 @ 0x55] no frame!",
        ];

        let verdicts: Vec<Verdict> = lines.iter().map(|l| classifier.observe(l).1).collect();
        assert_eq!(verdicts.iter().filter(|v| **v == Verdict::Logged).count(), 1);
        assert_eq!(verdicts.iter().filter(|v| **v == Verdict::Report).count(), 0);
        assert_eq!(verdicts.iter().filter(|v| **v == Verdict::Suppressed).count(), 5);
    }

    #[test]
    fn test_reference_cascade_logged_once() {
        let mut classifier = DiagnosticClassifier::new();
        assert_eq!(
            classifier.observe("Missing reference picture, default is 65530").1,
            Verdict::Logged
        );
        assert_eq!(
            classifier.observe("error while decoding MB 12 4, bytestream -5").1,
            Verdict::Suppressed
        );
        assert_eq!(
            classifier.observe("concealing 812 DC, 812 AC, 812 MV errors in P frame").1,
            Verdict::Suppressed
        );
    }

    #[test]
    fn test_cascade_ends_on_different_error() {
        let mut classifier = DiagnosticClassifier::new();
        classifier.observe("non-existing PPS 0 referenced");
        assert_eq!(classifier.observe("Server returned 404 Not Found").1, Verdict::Report);
        // Cascade lines no longer have a root to attach to.
        assert_eq!(classifier.observe("decode_slice_header error").1, Verdict::Report);
        // The root itself is only ever logged once per session.
        assert_eq!(
            classifier.observe("non-existing PPS 0 referenced").1,
            Verdict::Suppressed
        );
    }

    #[test]
    fn test_disconnect_reported_once() {
        let mut classifier = DiagnosticClassifier::new();
        let line = "rtsp://cam: Error number -10054 occurred";
        assert_eq!(classifier.observe(line).1, Verdict::Report);
        assert_eq!(classifier.observe(line).1, Verdict::Suppressed);
        assert_eq!(classifier.observe(line).1, Verdict::Suppressed);
    }

    #[test]
    fn test_other_reported_every_time() {
        let mut classifier = DiagnosticClassifier::new();
        assert_eq!(classifier.observe("method DESCRIBE failed: 401").1, Verdict::Report);
        assert_eq!(classifier.observe("method DESCRIBE failed: 401").1, Verdict::Report);
    }

    #[test]
    fn test_blank_lines_ignored() {
        let mut classifier = DiagnosticClassifier::new();
        assert_eq!(classifier.observe("   ").1, Verdict::Ignore);
    }

    #[tokio::test]
    async fn test_run_diagnostics_parameter_set_burst() {
        let stream: &[u8] = b"non-existing PPS 0 referenced\n\
            decode_slice_header error\n\
            no frame!\n\
            non-existing PPS 0 referenced\n\
            decode_slice_header error\n\
            no frame!\n";
        let reporter = Arc::new(RecordingReporter::default());

        let summary = run_diagnostics(
            stream,
            Arc::new(sample_descriptor()),
            reporter.clone(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(summary.logged, 1);
        assert_eq!(summary.suppressed, 5);
        assert_eq!(summary.reported, 0);
        assert_eq!(reporter.error_count(), 0);
    }

    #[tokio::test]
    async fn test_run_diagnostics_disconnect_reports_once() {
        let stream: &[u8] = b"Error number -10054 occurred\n\
            Error number -10054 occurred\n\
            Error number -10054 occurred\n";
        let reporter = Arc::new(RecordingReporter::default());

        let summary = run_diagnostics(
            stream,
            Arc::new(sample_descriptor()),
            reporter.clone(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(summary.reported, 1);
        assert_eq!(reporter.error_count(), 1);
        assert_eq!(reporter.detection_count(), 0);
    }

    #[tokio::test]
    async fn test_run_diagnostics_cancelled_skips_buffered_lines() {
        let stream: &[u8] = b"rtsp://cam: 401 Unauthorized
            rtsp://cam: 404 Not Found
            rtsp://cam: method DESCRIBE failed
";
        let reporter = Arc::new(RecordingReporter::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        for _ in 0..20 {
            let summary = run_diagnostics(
                stream,
                Arc::new(sample_descriptor()),
                reporter.clone(),
                cancel.clone(),
            )
            .await;
            assert_eq!(summary, DiagnosticSummary::default());
        }
        assert_eq!(reporter.error_count(), 0);
    }
}
