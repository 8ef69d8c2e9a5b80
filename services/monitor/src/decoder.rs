//! Decoder process supervision.
//!
//! One external decoder process runs per camera session. It writes raw,
//! fixed-size frames to stdout and diagnostics to stderr. The supervisor
//! owns the child process and guarantees it is reaped: a graceful stop
//! request first, a forced kill once the grace period runs out.

use crate::config::DecoderConfig;
use crate::probe::FrameDims;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

/// Errors that can occur while supervising a decoder.
#[derive(Debug, Error)]
pub enum DecoderError {
    #[error("Failed to spawn decoder: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Decoder output pipe unavailable: {0}")]
    MissingPipe(&'static str),

    #[error("Failed to reap decoder: {0}")]
    Reap(#[source] std::io::Error),
}

/// Builds the command line for a decoder process.
pub trait DecoderLauncher: Send + Sync {
    fn command(&self, stream_uri: &str, dims: FrameDims) -> Command;
}

/// Launches ffmpeg with low-latency, TCP-transport RTSP input and raw output.
pub struct FfmpegLauncher {
    binary: String,
    pixel_format: String,
}

impl FfmpegLauncher {
    pub fn new(config: &DecoderConfig) -> Self {
        Self {
            binary: config.ffmpeg_path.clone(),
            pixel_format: config.pixel_format.clone(),
        }
    }

    fn args(&self, stream_uri: &str) -> Vec<String> {
        [
            "-hide_banner",
            "-loglevel",
            "error",
            "-fflags",
            "nobuffer",
            "-flags",
            "low_delay",
            "-strict",
            "experimental",
            "-rtsp_transport",
            "tcp",
            "-i",
            stream_uri,
            "-f",
            "rawvideo",
            "-pix_fmt",
            self.pixel_format.as_str(),
            "-",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

impl DecoderLauncher for FfmpegLauncher {
    fn command(&self, stream_uri: &str, _dims: FrameDims) -> Command {
        let mut command = Command::new(&self.binary);
        command.args(self.args(stream_uri));
        command
    }
}

/// How a decoder process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderExit {
    /// Exited on its own or after the stop request.
    Exited(Option<i32>),
    /// Did not exit within the grace period and was killed.
    Killed,
}

/// A running decoder process.
pub struct DecoderProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    pid: Option<u32>,
}

/// Output pipes of a freshly spawned decoder.
pub struct DecoderPipes {
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

impl DecoderProcess {
    /// Spawn a decoder from a prepared command, wiring all three stdio pipes.
    pub fn spawn(mut command: Command) -> Result<(Self, DecoderPipes), DecoderError> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(DecoderError::Spawn)?;

        let stdout = child
            .stdout
            .take()
            .ok_or(DecoderError::MissingPipe("stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(DecoderError::MissingPipe("stderr"))?;
        let stdin = child.stdin.take();
        let pid = child.id();

        debug!(pid = ?pid, "Decoder spawned");

        Ok((Self { child, stdin, pid }, DecoderPipes { stdout, stderr }))
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Stop the decoder and wait for it to be reaped.
    ///
    /// Sends ffmpeg's interactive quit command, waits up to `grace`, then kills.
    pub async fn terminate(mut self, grace: Duration) -> Result<DecoderExit, DecoderError> {
        if let Some(mut stdin) = self.stdin.take() {
            // The process may already be gone; a broken pipe is expected then.
            let _ = stdin.write_all(b"q").await;
            let _ = stdin.flush().await;
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(pid = ?self.pid, status = %status, "Decoder exited");
                Ok(DecoderExit::Exited(status.code()))
            }
            Ok(Err(e)) => Err(DecoderError::Reap(e)),
            Err(_) => {
                warn!(
                    pid = ?self.pid,
                    grace_ms = grace.as_millis() as u64,
                    "Decoder ignored stop request, killing"
                );
                self.child.kill().await.map_err(DecoderError::Reap)?;
                info!(pid = ?self.pid, "Decoder killed");
                Ok(DecoderExit::Killed)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Stand-in decoder: a shell loop that writes zeroed frames forever.
    pub struct ShellLauncher {
        pub stderr_script: String,
    }

    impl ShellLauncher {
        pub fn silent() -> Self {
            Self {
                stderr_script: String::new(),
            }
        }
    }

    impl DecoderLauncher for ShellLauncher {
        fn command(&self, _stream_uri: &str, dims: FrameDims) -> Command {
            let script = format!(
                "{} while true; do head -c {} /dev/zero 2>/dev/null; sleep 0.02; done",
                self.stderr_script,
                dims.frame_size()
            );
            let mut command = Command::new("sh");
            command.arg("-c").arg(script);
            command
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ffmpeg_args() {
        let launcher = FfmpegLauncher::new(&DecoderConfig::default());
        let args = launcher.args("rtsp://cam/stream");
        let joined = args.join(" ");
        assert!(joined.contains("-rtsp_transport tcp"));
        assert!(joined.contains("-fflags nobuffer"));
        assert!(joined.contains("-flags low_delay"));
        assert!(joined.contains("-f rawvideo -pix_fmt bgr24 -"));
        assert!(joined.contains("-i rtsp://cam/stream"));
        assert!(joined.contains("-loglevel error"));
    }

    #[tokio::test]
    async fn test_terminate_exits_gracefully() {
        // Reads stdin until the quit command arrives.
        let mut command = Command::new("sh");
        command.arg("-c").arg("read line; exit 0");
        let (process, _pipes) = DecoderProcess::spawn(command).unwrap();

        let exit = process.terminate(Duration::from_secs(5)).await.unwrap();
        assert_eq!(exit, DecoderExit::Exited(Some(0)));
    }

    #[tokio::test]
    async fn test_terminate_kills_after_grace() {
        let mut command = Command::new("sh");
        command.arg("-c").arg("exec sleep 30");
        let (process, _pipes) = DecoderProcess::spawn(command).unwrap();

        let exit = process
            .terminate(Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(exit, DecoderExit::Killed);
    }

    #[tokio::test]
    async fn test_spawn_missing_binary() {
        let command = Command::new("/nonexistent/decoder-binary");
        assert!(matches!(
            DecoderProcess::spawn(command),
            Err(DecoderError::Spawn(_))
        ));
    }
}
