//! Admission-controlled scheduling of camera sessions.
//!
//! Requests queue without bound and are admitted strictly in arrival order
//! while fewer than `capacity` sessions are alive. A request for a camera
//! that already has a live session waits in a deferred list and is admitted
//! ahead of newer requests once that session has ended.

use crate::camera::{CameraKey, MonitorRequest};
use crate::config::SchedulerConfig;
use crate::inventory::{CameraInventory, InventoryError};
use crate::session::{CameraSession, SessionContext, SessionHandle, SessionOutcome};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors that can occur while launching a session.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Camera resolution failed: {0}")]
    Inventory(#[from] InventoryError),
}

/// Errors returned by the scheduler's public entry points.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Scheduler already started")]
    AlreadyStarted,

    #[error("Scheduler is shut down")]
    Closed,
}

/// Starts a session for an admitted request.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self, request: &MonitorRequest) -> Result<SessionHandle, LaunchError>;
}

/// Resolves a request against the inventory and runs a [`CameraSession`] for it.
pub struct CameraSessionLauncher {
    inventory: Arc<dyn CameraInventory>,
    context: SessionContext,
}

impl CameraSessionLauncher {
    pub fn new(inventory: Arc<dyn CameraInventory>, context: SessionContext) -> Self {
        Self { inventory, context }
    }
}

#[async_trait]
impl SessionLauncher for CameraSessionLauncher {
    async fn launch(&self, request: &MonitorRequest) -> Result<SessionHandle, LaunchError> {
        let camera = self.inventory.resolve(request).await?;
        let context = self.context.clone();
        Ok(SessionHandle::launch(camera.key(), move |control| {
            CameraSession::new(camera, context, control).run()
        }))
    }
}

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub active: usize,
    pub pending: usize,
    pub capacity: usize,
    pub admitted_total: u64,
    pub dropped_total: u64,
}

struct SchedulerShared {
    active: Mutex<Vec<SessionHandle>>,
    pending: AtomicUsize,
    admitted_total: AtomicU64,
    dropped_total: AtomicU64,
}

impl SchedulerShared {
    fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    fn is_active(&self, key: &CameraKey) -> bool {
        self.active
            .lock()
            .iter()
            .any(|handle| handle.key() == key && handle.is_alive())
    }

    /// Drop handles whose sessions have finished. Returns how many were removed.
    fn reap(&self) -> usize {
        let mut active = self.active.lock();
        let before = active.len();
        active.retain(|handle| handle.is_alive());
        before - active.len()
    }
}

/// Bounded-concurrency scheduler for camera sessions.
pub struct AdmissionScheduler {
    config: SchedulerConfig,
    launcher: Arc<dyn SessionLauncher>,
    sender: mpsc::UnboundedSender<MonitorRequest>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<MonitorRequest>>>,
    shared: Arc<SchedulerShared>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AdmissionScheduler {
    pub fn new(config: SchedulerConfig, launcher: Arc<dyn SessionLauncher>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            config,
            launcher,
            sender,
            receiver: Mutex::new(Some(receiver)),
            shared: Arc::new(SchedulerShared {
                active: Mutex::new(Vec::new()),
                pending: AtomicUsize::new(0),
                admitted_total: AtomicU64::new(0),
                dropped_total: AtomicU64::new(0),
            }),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Queue a request. Never blocks.
    pub fn enqueue(&self, request: MonitorRequest) -> Result<(), SchedulerError> {
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(request).is_err() {
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(SchedulerError::Closed);
        }
        Ok(())
    }

    /// Spawn the admission loop.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let receiver = self
            .receiver
            .lock()
            .take()
            .ok_or(SchedulerError::AlreadyStarted)?;

        let control = AdmissionLoop {
            config: self.config.clone(),
            launcher: self.launcher.clone(),
            receiver,
            shared: self.shared.clone(),
            cancel: self.cancel.clone(),
            deferred: VecDeque::new(),
            last_observed: None,
        };
        *self.task.lock() = Some(tokio::spawn(control.run()));
        Ok(())
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            active: self.shared.active_count(),
            pending: self.shared.pending.load(Ordering::SeqCst),
            capacity: self.config.capacity,
            admitted_total: self.shared.admitted_total.load(Ordering::SeqCst),
            dropped_total: self.shared.dropped_total.load(Ordering::SeqCst),
        }
    }

    /// Ask every live session to stop. Returns how many were asked.
    pub fn stop_all(&self) -> usize {
        let active = self.shared.active.lock();
        for handle in active.iter() {
            handle.stop();
        }
        info!(sessions = active.len(), "Stop requested for all sessions");
        active.len()
    }

    /// Halt admission, stop every session and wait for all teardowns.
    pub async fn shutdown(&self) -> Vec<SessionOutcome> {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Admission loop ended abnormally");
            }
        }

        self.stop_all();
        let handles: Vec<SessionHandle> = std::mem::take(&mut *self.shared.active.lock());
        let outcomes = futures::future::join_all(handles.into_iter().map(SessionHandle::join)).await;
        info!(sessions = outcomes.len(), "Scheduler shut down");
        outcomes
    }
}

enum Next {
    Request(MonitorRequest),
    Idle,
    Closed,
}

/// The scheduler's single control loop.
struct AdmissionLoop {
    config: SchedulerConfig,
    launcher: Arc<dyn SessionLauncher>,
    receiver: mpsc::UnboundedReceiver<MonitorRequest>,
    shared: Arc<SchedulerShared>,
    cancel: CancellationToken,
    deferred: VecDeque<MonitorRequest>,
    last_observed: Option<(usize, usize)>,
}

impl AdmissionLoop {
    async fn run(mut self) {
        info!(capacity = self.config.capacity, "Admission loop started");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let reaped = self.shared.reap();
            if reaped > 0 {
                debug!(reaped, "Finished sessions removed");
            }
            self.log_transition();

            if self.shared.active_count() >= self.config.capacity {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.config.saturated_backoff()) => continue,
                }
            }

            match self.next_request().await {
                Next::Request(request) => self.admit(request).await,
                Next::Idle => {}
                Next::Closed => break,
            }
        }

        // Receiver drops here, so later enqueues fail.
        info!("Admission loop stopped");
    }

    /// Next admissible request: released deferrals first, then the queue.
    async fn next_request(&mut self) -> Next {
        if let Some(index) = self
            .deferred
            .iter()
            .position(|request| !self.shared.is_active(&request.key()))
        {
            if let Some(request) = self.deferred.remove(index) {
                return Next::Request(request);
            }
        }

        let received = tokio::select! {
            _ = self.cancel.cancelled() => return Next::Closed,
            received = tokio::time::timeout(self.config.queue_poll(), self.receiver.recv()) => received,
        };

        match received {
            Ok(Some(request)) => {
                let key = request.key();
                if self.shared.is_active(&key) || self.deferred.iter().any(|r| r.key() == key) {
                    debug!(camera = %key, "Camera already monitored; deferring request");
                    self.deferred.push_back(request);
                    Next::Idle
                } else {
                    Next::Request(request)
                }
            }
            Ok(None) => Next::Closed,
            Err(_) => Next::Idle,
        }
    }

    async fn admit(&mut self, request: MonitorRequest) {
        let key = request.key();
        let result = self.launcher.launch(&request).await;
        self.shared.pending.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(handle) => {
                self.shared.admitted_total.fetch_add(1, Ordering::SeqCst);
                info!(camera = %key, session_id = %handle.id(), "Session admitted");
                self.shared.active.lock().push(handle);
            }
            Err(e) => {
                self.shared.dropped_total.fetch_add(1, Ordering::SeqCst);
                warn!(camera = %key, error = %e, "Request dropped");
            }
        }
    }

    fn log_transition(&mut self) {
        let observed = (
            self.shared.active_count(),
            self.shared.pending.load(Ordering::SeqCst),
        );
        if self.last_observed != Some(observed) {
            info!(
                active = observed.0,
                pending = observed.1,
                capacity = self.config.capacity,
                "Scheduler state"
            );
            self.last_observed = Some(observed);
        }
    }
}
