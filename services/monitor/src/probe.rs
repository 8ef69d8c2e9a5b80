//! Stream probing: discover the frame dimensions of a camera stream.

use crate::config::DecoderConfig;
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Errors that can occur while probing a stream.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Failed to launch prober: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Prober timed out after {0:?}")]
    Timeout(Duration),

    #[error("Prober exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Malformed prober output: {0}")]
    Malformed(String),
}

/// Width and height of a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDims {
    pub width: u32,
    pub height: u32,
}

impl FrameDims {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size in bytes of one packed 3-channel frame.
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Obtains stream metadata for a stream URI.
#[async_trait]
pub trait StreamProber: Send + Sync {
    async fn probe(&self, stream_uri: &str) -> Result<FrameDims, ProbeError>;
}

/// Prober backed by `ffprobe`.
pub struct FfprobeProber {
    binary: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
}

impl FfprobeProber {
    pub fn new(config: &DecoderConfig) -> Self {
        Self {
            binary: config.ffprobe_path.clone(),
            timeout: config.probe_timeout(),
        }
    }

    fn args(stream_uri: &str) -> Vec<String> {
        [
            "-v",
            "error",
            "-rtsp_transport",
            "tcp",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "json",
            stream_uri,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

#[async_trait]
impl StreamProber for FfprobeProber {
    async fn probe(&self, stream_uri: &str) -> Result<FrameDims, ProbeError> {
        let child = Command::new(&self.binary)
            .args(Self::args(stream_uri))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ProbeError::Spawn)?;

        // On timeout the child is dropped and killed.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))?
            .map_err(ProbeError::Spawn)?;

        if !output.status.success() {
            return Err(ProbeError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let dims = parse_probe_output(&output.stdout)?;
        debug!(width = dims.width, height = dims.height, "Stream probed");
        Ok(dims)
    }
}

/// Extract the first video stream's dimensions from ffprobe's JSON output.
pub fn parse_probe_output(stdout: &[u8]) -> Result<FrameDims, ProbeError> {
    let parsed: ProbeOutput =
        serde_json::from_slice(stdout).map_err(|e| ProbeError::Malformed(e.to_string()))?;

    let stream = parsed
        .streams
        .first()
        .ok_or_else(|| ProbeError::Malformed("no video stream".to_string()))?;

    match (stream.width, stream.height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => Ok(FrameDims::new(width, height)),
        _ => Err(ProbeError::Malformed("missing width/height".to_string())),
    }
}
