//! Freshest-frame relay between a decoder's raw output and the detection loop.
//!
//! A producer task reads fixed-size frames from the decoder and overwrites a
//! single slot. Consumers always see the most recent complete frame; older
//! frames are dropped without a queue.

use crate::probe::FrameDims;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// One decoded frame: packed 3-channel pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Position in the decoder's output, starting at 1
    pub sequence: u64,
    pub captured_at: Instant,
}

/// Counters for the relay's producer.
#[derive(Debug, Default, Clone)]
pub struct RelayStats {
    pub frames_received: u64,
    pub short_reads: u64,
    pub bytes_received: u64,
}

struct RelayShared {
    slot: Mutex<Option<Frame>>,
    sequence: AtomicU64,
    stats: Mutex<RelayStats>,
}

/// Single-slot relay of the most recent decoded frame.
pub struct FrameRelay {
    shared: Arc<RelayShared>,
    cancel: CancellationToken,
    producer: Option<JoinHandle<()>>,
}

impl FrameRelay {
    /// Start the producer task against a decoder's raw-video output.
    pub fn start<R>(reader: R, dims: FrameDims) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let shared = Arc::new(RelayShared {
            slot: Mutex::new(None),
            sequence: AtomicU64::new(0),
            stats: Mutex::new(RelayStats::default()),
        });
        let cancel = CancellationToken::new();

        let producer = tokio::spawn(produce(reader, dims, shared.clone(), cancel.clone()));

        Self {
            shared,
            cancel,
            producer: Some(producer),
        }
    }

    /// Copy of the latest frame, or `None` if no frame has arrived yet. Never blocks on I/O.
    pub fn read(&self) -> Option<Frame> {
        self.shared.slot.lock().clone()
    }

    /// Sequence number of the latest frame (0 before the first frame).
    pub fn sequence(&self) -> u64 {
        self.shared.sequence.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> RelayStats {
        self.shared.stats.lock().clone()
    }

    /// Whether the producer task has exited.
    pub fn is_finished(&self) -> bool {
        self.producer.as_ref().map_or(true, |p| p.is_finished())
    }

    /// Signal the producer to exit and wait for it. Idempotent.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(producer) = self.producer.take() {
            if let Err(e) = producer.await {
                warn!(error = %e, "Frame relay producer ended abnormally");
            }
        }
    }
}

impl Drop for FrameRelay {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn produce<R>(mut reader: R, dims: FrameDims, shared: Arc<RelayShared>, cancel: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    let frame_size = dims.frame_size();
    let mut buf = vec![0u8; frame_size];

    loop {
        let filled = tokio::select! {
            _ = cancel.cancelled() => break,
            filled = read_frame(&mut reader, &mut buf) => filled,
        };

        match filled {
            Ok(0) => {
                debug!("Decoder output closed");
                break;
            }
            Ok(n) if n < frame_size => {
                // Incomplete frame: a decode glitch, not an error.
                shared.stats.lock().short_reads += 1;
                trace!(bytes = n, expected = frame_size, "Discarding short frame");
            }
            Ok(_) => {
                let sequence = shared.sequence.load(Ordering::Relaxed) + 1;
                let frame = Frame {
                    data: std::mem::replace(&mut buf, vec![0u8; frame_size]),
                    width: dims.width,
                    height: dims.height,
                    sequence,
                    captured_at: Instant::now(),
                };
                *shared.slot.lock() = Some(frame);
                shared.sequence.store(sequence, Ordering::Release);

                let mut stats = shared.stats.lock();
                stats.frames_received += 1;
                stats.bytes_received += frame_size as u64;
            }
            Err(e) => {
                warn!(error = %e, "Decoder output read failed");
                break;
            }
        }
    }
}

/// Fill `buf` with one frame. Returns fewer bytes only at end of stream.
async fn read_frame<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    const DIMS: FrameDims = FrameDims {
        width: 4,
        height: 2,
    };

    async fn wait_for_sequence(relay: &FrameRelay, sequence: u64) {
        for _ in 0..200 {
            if relay.sequence() >= sequence {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("relay never reached sequence {}", sequence);
    }

    #[tokio::test]
    async fn test_read_before_first_frame() {
        let (_writer, reader) = tokio::io::duplex(1024);
        let mut relay = FrameRelay::start(reader, DIMS);
        assert!(relay.read().is_none());
        assert_eq!(relay.sequence(), 0);
        relay.stop().await;
    }

    #[tokio::test]
    async fn test_latest_frame_wins() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut relay = FrameRelay::start(reader, DIMS);

        writer.write_all(&[1u8; 24]).await.unwrap();
        writer.write_all(&[2u8; 24]).await.unwrap();
        wait_for_sequence(&relay, 2).await;

        let frame = relay.read().unwrap();
        assert_eq!(frame.data, vec![2u8; 24]);
        assert_eq!(frame.sequence, 2);
        assert_eq!((frame.width, frame.height), (4, 2));

        relay.stop().await;
    }

    #[tokio::test]
    async fn test_read_returns_independent_copy() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut relay = FrameRelay::start(reader, DIMS);

        writer.write_all(&[7u8; 24]).await.unwrap();
        wait_for_sequence(&relay, 1).await;

        let mut first = relay.read().unwrap();
        first.data[0] = 0;
        let second = relay.read().unwrap();
        assert_eq!(second.data[0], 7);

        relay.stop().await;
    }

    #[tokio::test]
    async fn test_read_after_stop_keeps_last_frame() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut relay = FrameRelay::start(reader, DIMS);

        writer.write_all(&[9u8; 24]).await.unwrap();
        wait_for_sequence(&relay, 1).await;

        relay.stop().await;
        assert!(relay.is_finished());

        for _ in 0..3 {
            let frame = relay.read().unwrap();
            assert_eq!(frame.data, vec![9u8; 24]);
        }

        // A second stop is harmless.
        relay.stop().await;
    }

    #[tokio::test]
    async fn test_short_trailing_read_is_discarded() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut relay = FrameRelay::start(reader, DIMS);

        writer.write_all(&[3u8; 24]).await.unwrap();
        writer.write_all(&[4u8; 10]).await.unwrap();
        drop(writer);

        for _ in 0..200 {
            if relay.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(relay.is_finished());

        let frame = relay.read().unwrap();
        assert_eq!(frame.data, vec![3u8; 24]);
        let stats = relay.stats();
        assert_eq!(stats.frames_received, 1);
        assert_eq!(stats.short_reads, 1);

        relay.stop().await;
    }
}
