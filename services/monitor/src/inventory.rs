//! Camera inventory lookup.
//!
//! Resolves a [`MonitorRequest`] into a [`CameraDescriptor`] using the
//! recorder export written by the discovery tooling. The export is read once
//! at startup and is read-only afterwards.

use crate::camera::{CameraDescriptor, CameraKey, Credentials, MonitorRequest, StreamKind};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Placeholder the discovery tooling writes for missing values.
const UNAVAILABLE_MARKERS: &[&str] = &["", "indisponível", "Indisponível", "unavailable"];

/// Name used when the export has none.
const UNAVAILABLE_NAME: &str = "Indisponível";

/// Errors that can occur while resolving a camera.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Failed to read inventory file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse inventory file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Camera {0} not found in inventory")]
    UnknownCamera(CameraKey),

    #[error("Camera {0} has no usable stream")]
    NoUsableStream(CameraKey),

    #[error("Invalid stream URI for camera {key}: {message}")]
    InvalidStreamUri { key: CameraKey, message: String },
}

/// Source of resolved camera descriptors.
#[async_trait]
pub trait CameraInventory: Send + Sync {
    async fn resolve(&self, request: &MonitorRequest) -> Result<CameraDescriptor, InventoryError>;
}

#[derive(Debug, Clone, Deserialize)]
struct RecorderEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    guid: Option<String>,
    #[serde(default)]
    cameras: Option<Vec<CameraEntry>>,
}

#[derive(Debug, Clone, Deserialize)]
struct CameraEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    id: serde_json::Value,
    #[serde(default)]
    streams: Option<Vec<StreamEntry>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamEntry {
    #[serde(default)]
    stream_id: serde_json::Value,
    #[serde(default)]
    remote_url: Option<RemoteUrl>,
}

#[derive(Debug, Clone, Deserialize)]
struct RemoteUrl {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Clone)]
struct StreamRecord {
    url: String,
    credentials: Credentials,
}

#[derive(Debug, Clone)]
struct CameraRecord {
    recorder_name: String,
    camera_name: String,
    primary: Option<StreamRecord>,
    secondary: Option<StreamRecord>,
}

/// Inventory backed by a recorder export file.
#[derive(Debug, Default)]
pub struct JsonInventory {
    cameras: HashMap<CameraKey, CameraRecord>,
}

impl JsonInventory {
    /// Load an inventory from a JSON export on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, InventoryError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let inventory = Self::from_json(&raw)?;
        info!(
            path = %path.as_ref().display(),
            cameras = inventory.len(),
            "Camera inventory loaded"
        );
        Ok(inventory)
    }

    /// Parse an inventory from the export's JSON text.
    pub fn from_json(raw: &str) -> Result<Self, InventoryError> {
        let recorders: Vec<RecorderEntry> = serde_json::from_str(raw)?;
        let mut cameras = HashMap::new();

        for recorder in recorders {
            let Some(guid) = present(&recorder.guid) else {
                debug!(recorder = ?recorder.name, "Skipping recorder without guid");
                continue;
            };
            let recorder_name = display_name(&recorder.name);

            for camera in recorder.cameras.unwrap_or_default() {
                let camera_name = display_name(&camera.name);
                let Some(camera_id) = as_integer(&camera.id) else {
                    debug!(recorder = %guid, camera = %camera_name, "Skipping camera without numeric id");
                    continue;
                };

                let mut record = CameraRecord {
                    recorder_name: recorder_name.clone(),
                    camera_name,
                    primary: None,
                    secondary: None,
                };

                for stream in camera.streams.unwrap_or_default() {
                    let Some(stream_record) = stream.remote_url.as_ref().and_then(usable_stream) else {
                        continue;
                    };
                    match as_integer(&stream.stream_id) {
                        Some(0) => record.primary = Some(stream_record),
                        Some(1) => record.secondary = Some(stream_record),
                        _ => {}
                    }
                }

                cameras.insert(CameraKey::new(camera_id, guid.clone()), record);
            }
        }

        Ok(Self { cameras })
    }

    /// Number of cameras known to the inventory.
    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    fn resolve_key(&self, key: &CameraKey) -> Result<CameraDescriptor, InventoryError> {
        let record = self
            .cameras
            .get(key)
            .ok_or_else(|| InventoryError::UnknownCamera(key.clone()))?;

        // The secondary ("extra") stream is cheaper to decode; the primary is the fallback.
        let (kind, stream) = match (&record.secondary, &record.primary) {
            (Some(secondary), _) => (StreamKind::Secondary, secondary),
            (None, Some(primary)) => (StreamKind::Primary, primary),
            (None, None) => return Err(InventoryError::NoUsableStream(key.clone())),
        };

        let stream_uri = inject_credentials(&stream.url, &stream.credentials).map_err(|message| {
            InventoryError::InvalidStreamUri {
                key: key.clone(),
                message,
            }
        })?;

        Ok(CameraDescriptor {
            camera_id: key.camera_id,
            recorder_id: key.recorder_id.clone(),
            recorder_name: record.recorder_name.clone(),
            camera_name: record.camera_name.clone(),
            stream_uri,
            stream_kind: kind,
            credentials: stream.credentials.clone(),
        })
    }
}

#[async_trait]
impl CameraInventory for JsonInventory {
    async fn resolve(&self, request: &MonitorRequest) -> Result<CameraDescriptor, InventoryError> {
        self.resolve_key(&request.key())
    }
}

fn as_integer(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .filter(|v| !UNAVAILABLE_MARKERS.contains(&v.trim()))
        .map(str::to_string)
}

fn display_name(value: &Option<String>) -> String {
    present(value).unwrap_or_else(|| UNAVAILABLE_NAME.to_string())
}

fn usable_stream(remote: &RemoteUrl) -> Option<StreamRecord> {
    let url = present(&remote.url)?;
    Some(StreamRecord {
        url,
        credentials: Credentials {
            username: present(&remote.username).unwrap_or_default(),
            password: present(&remote.password).unwrap_or_default(),
        },
    })
}

/// Write the stream credentials into the URI's userinfo.
fn inject_credentials(url: &str, credentials: &Credentials) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|e| e.to_string())?;
    if parsed.host_str().is_none() {
        return Err("stream URI has no host".to_string());
    }
    if !credentials.username.is_empty() {
        parsed
            .set_username(&credentials.username)
            .map_err(|_| "cannot set username".to_string())?;
        parsed
            .set_password(Some(&credentials.password))
            .map_err(|_| "cannot set password".to_string())?;
    }
    Ok(parsed.to_string())
}
