//! Event reporting to the VMS.
//!
//! A confirmed detection becomes a transient custom event: a scheduled time
//! shortly in the future, a fullscreen-camera action, and a deferred removal
//! of that scheduled time. Error conditions take the same path on a separate
//! event when one is configured.

use crate::camera::CameraDescriptor;
use crate::config::VmsConfig;
use crate::vms::{FullscreenAction, VmsClient};
use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Which of the VMS calls for one report succeeded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportOutcome {
    pub scheduled: bool,
    pub action_applied: bool,
}

/// Sink for detection and error events.
#[async_trait]
pub trait EventReporter: Send + Sync {
    /// Raise the detection event and bring the camera to fullscreen.
    async fn report_detection(&self, camera: &CameraDescriptor) -> ReportOutcome;

    /// Raise the error event for a camera, if the sink has one.
    async fn report_error(&self, camera: &CameraDescriptor, reason: &str) -> ReportOutcome;
}

/// `HH:MM:SS` of `now + lead`, in the VMS's local wall-clock format.
pub fn scheduled_time<Tz: TimeZone>(now: DateTime<Tz>, lead: Duration) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let lead = chrono::Duration::from_std(lead).unwrap_or_else(|_| chrono::Duration::zero());
    (now + lead).format("%H:%M:%S").to_string()
}

/// Reports through the VMS REST API.
pub struct VmsReporter {
    client: Arc<VmsClient>,
    config: VmsConfig,
}

impl VmsReporter {
    pub fn new(client: Arc<VmsClient>, config: VmsConfig) -> Self {
        Self { client, config }
    }

    /// Schedule a custom event. Returns whether the create call succeeded and the time used.
    async fn raise_event(&self, event_id: &str, camera: &CameraDescriptor) -> (bool, String) {
        let time = scheduled_time(Local::now(), self.config.event_lead());

        let scheduled = match self.client.schedule_event(event_id, &time).await {
            Ok(()) => {
                debug!(event_id, scheduled_time = %time, camera_id = camera.camera_id, "Event scheduled");
                true
            }
            Err(e) => {
                warn!(event_id, camera_id = camera.camera_id, error = %e, "Failed to schedule event");
                false
            }
        };

        (scheduled, time)
    }

    fn schedule_removal(&self, event_id: String, time: String) {
        let client = self.client.clone();
        let delay = self.config.event_removal_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match client.delete_scheduled_event(&event_id, &time).await {
                Ok(()) => debug!(event_id = %event_id, scheduled_time = %time, "Event removed"),
                Err(e) => warn!(event_id = %event_id, scheduled_time = %time, error = %e, "Failed to remove event"),
            }
        });
    }
}

#[async_trait]
impl EventReporter for VmsReporter {
    async fn report_detection(&self, camera: &CameraDescriptor) -> ReportOutcome {
        let event_id = &self.config.detection_event_id;
        let (scheduled, time) = self.raise_event(event_id, camera).await;

        let action = FullscreenAction::new(
            &camera.recorder_id,
            camera.camera_id,
            self.config.monitor_id,
            &self.config.legend_text,
        );
        let action_applied = match self.client.fullscreen_camera(&self.config.source_id, &action).await {
            Ok(()) => true,
            Err(e) => {
                warn!(camera_id = camera.camera_id, error = %e, "Failed to set fullscreen action");
                false
            }
        };
        self.schedule_removal(event_id.clone(), time);

        info!(
            camera_id = camera.camera_id,
            recorder_id = %camera.recorder_id,
            camera_name = %camera.camera_name,
            scheduled,
            action_applied,
            "Detection reported"
        );

        ReportOutcome {
            scheduled,
            action_applied,
        }
    }

    async fn report_error(&self, camera: &CameraDescriptor, reason: &str) -> ReportOutcome {
        let Some(event_id) = self.config.error_event_id.as_deref() else {
            warn!(
                camera_id = camera.camera_id,
                recorder_id = %camera.recorder_id,
                reason,
                "Camera error (no error event configured)"
            );
            return ReportOutcome::default();
        };

        let (scheduled, time) = self.raise_event(event_id, camera).await;
        self.schedule_removal(event_id.to_string(), time);
        info!(
            camera_id = camera.camera_id,
            recorder_id = %camera.recorder_id,
            reason,
            scheduled,
            "Error reported"
        );

        ReportOutcome {
            scheduled,
            action_applied: false,
        }
    }
}

/// Suppresses repeat reports inside a fixed window.
#[derive(Debug, Clone)]
pub struct EventDebounce {
    window: Duration,
    last_sent: Option<Instant>,
}

impl EventDebounce {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_sent: None,
        }
    }

    /// Returns true and records `now` if no report was sent within the window.
    pub fn try_fire(&mut self, now: Instant) -> bool {
        match self.last_sent {
            Some(last) if now.saturating_duration_since(last) < self.window => false,
            _ => {
                self.last_sent = Some(now);
                true
            }
        }
    }

    pub fn last_sent(&self) -> Option<Instant> {
        self.last_sent
    }
}
