//! Camwatch Monitor - admission-controlled person detection for VMS camera fleets
//!
//! This library runs short, bounded monitoring sessions against recorder
//! cameras. It handles:
//!
//! - Admission of monitor requests under a fixed session capacity
//! - Per-camera sessions: stream probe, external decoder, freshest-frame relay
//! - Person detection with optional side/area zone filtering
//! - Transient VMS events and fullscreen actions on confirmed detections
//!
//! # Architecture
//!
//! ```text
//! POST /set-cameras -> AdmissionScheduler -> CameraSession
//!     CameraSession: ffprobe -> ffmpeg -> FrameRelay -> DetectionAdapter -> ZoneFilter -> EventReporter -> VMS
//!                                     \-> stderr -> DiagnosticClassifier -> EventReporter
//! ```

pub mod api;
pub mod camera;
pub mod config;
pub mod decoder;
pub mod detector;
pub mod diagnostics;
pub mod frame_relay;
pub mod inventory;
pub mod probe;
pub mod reporter;
pub mod scheduler;
pub mod session;
pub mod vms;
pub mod zone;

// Re-export main types
pub use camera::{CameraDescriptor, CameraKey, Credentials, MonitorRequest, StreamKind};
pub use config::{ConfigValidationError, MonitorConfig};
pub use decoder::{DecoderError, DecoderExit, DecoderLauncher, DecoderProcess, FfmpegLauncher};
pub use detector::{BoundingBox, Detection, DetectionAdapter, DetectorError, HttpDetector, ObjectDetector};
pub use diagnostics::{DiagnosticClassifier, DiagnosticKind, DiagnosticSummary, Verdict};
pub use frame_relay::{Frame, FrameRelay, RelayStats};
pub use inventory::{CameraInventory, InventoryError, JsonInventory};
pub use probe::{FfprobeProber, FrameDims, ProbeError, StreamProber};
pub use reporter::{EventDebounce, EventReporter, ReportOutcome, VmsReporter};
pub use scheduler::{
    AdmissionScheduler, CameraSessionLauncher, LaunchError, SchedulerError, SchedulerStatus,
    SessionLauncher,
};
pub use session::{
    CameraSession, SessionContext, SessionControl, SessionExit, SessionHandle, SessionOutcome,
    SessionPhase, SessionStats,
};
pub use vms::{FullscreenAction, VmsClient, VmsError};
pub use zone::{area_test, side_test, Point, Side, ZoneConfig, ZoneError, ZoneFilter, ZoneRegistry};
