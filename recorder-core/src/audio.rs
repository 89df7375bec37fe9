//! # Audio Capture Module
//!
//! This module is the boundary to the live input device. A `SampleSource`
//! opens a capture stream that pushes fixed-size mono blocks into a
//! `BlockQueue`; the session worker drains that queue.
//!
//! ## Features
//! - `SampleSource` / `CaptureHandle` traits so sessions can run on any producer
//! - Bounded, non-blocking hand-off from the device callback (drop-oldest)
//! - CPAL-backed source with exact sample-rate matching (no resampling),
//!   recording the first channel of multi-channel devices
//! - Driver faults forwarded as events instead of being printed and lost

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SupportedStreamConfigRange;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::{info, warn};

use crate::config::CaptureConfig;
use crate::error::{RecorderError, Result};

/// Number of events the device callback may run ahead of the session worker.
pub const QUEUE_DEPTH: usize = 64;

/// Something the capture side reports to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// One block of mono samples, oldest first.
    Block(Vec<f32>),
    /// A driver fault. Transient faults are logged, fatal ones end the session.
    Fault { message: String, fatal: bool },
}

/// Producer end of the bounded channel between a capture callback and the
/// session worker.
///
/// `push` never blocks. When the queue is full the oldest queued event is
/// discarded to make room, so a stalled consumer costs stale data rather
/// than memory or a blocked audio thread.
#[derive(Debug, Clone)]
pub struct BlockQueue {
    sender: Sender<CaptureEvent>,
    // Kept so the producer can evict the oldest entry on overflow.
    evict: Receiver<CaptureEvent>,
    dropped: Arc<AtomicU64>,
}

impl BlockQueue {
    /// Creates a queue holding at most `depth` events and the receiver to drain it.
    pub fn bounded(depth: usize) -> (Self, Receiver<CaptureEvent>) {
        let (sender, receiver) = crossbeam_channel::bounded(depth.max(1));
        let queue = Self {
            sender,
            evict: receiver.clone(),
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (queue, receiver)
    }

    pub fn push(&self, event: CaptureEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                if self.evict.try_recv().is_ok() {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                // Still full only if the consumer raced us; then this event is the one lost.
                if self.sender.try_send(event).is_err() {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    pub fn push_block(&self, block: Vec<f32>) {
        self.push(CaptureEvent::Block(block));
    }

    /// Events discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// A live capture stream. Dropping or closing it stops delivery.
pub trait CaptureHandle {
    /// Stops the stream. No block may be pushed after this returns.
    fn close(self: Box<Self>);
}

/// Anything that can deliver mono sample blocks at a fixed rate.
///
/// `open` runs on the session worker thread and the returned handle never
/// leaves it, so handles need not be `Send` (CPAL streams are not on every
/// platform).
pub trait SampleSource: Send {
    /// Starts delivering blocks of `config.block_size` samples into `queue`.
    ///
    /// Fails with `RecorderError::DeviceOpen` when the device is missing or
    /// cannot run mono at exactly `config.sample_rate`.
    fn open(&mut self, config: &CaptureConfig, queue: BlockQueue) -> Result<Box<dyn CaptureHandle>>;
}

/// Captures from a CPAL input device.
#[derive(Debug, Clone, Default)]
pub struct CpalSource {
    /// Device to open; `None` means the host's default input.
    device_name: Option<String>,
}

impl CpalSource {
    pub fn default_device() -> Self {
        Self { device_name: None }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
        }
    }
}

impl SampleSource for CpalSource {
    fn open(&mut self, config: &CaptureConfig, queue: BlockQueue) -> Result<Box<dyn CaptureHandle>> {
        start_audio_capture(self.device_name.as_deref(), config, queue)
            .map(|stream| Box::new(CpalCapture { stream }) as Box<dyn CaptureHandle>)
            .map_err(|e| RecorderError::DeviceOpen(format!("{:#}", e)))
    }
}

struct CpalCapture {
    stream: cpal::Stream,
}

impl CaptureHandle for CpalCapture {
    fn close(self: Box<Self>) {
        if let Err(e) = self.stream.pause() {
            warn!("[AUDIO] Error pausing stream: {}", e);
        }
        // Dropping the stream tears down the backend callback thread.
        drop(self.stream);
        info!("[AUDIO] Input stream closed");
    }
}

/// Opens the input device and starts streaming blocks into `queue`.
///
/// The device callback re-frames whatever the driver delivers into blocks
/// of exactly `config.block_size` samples before pushing them.
fn start_audio_capture(
    device_name: Option<&str>,
    config: &CaptureConfig,
    queue: BlockQueue,
) -> anyhow::Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = match device_name {
        Some(name) => host
            .input_devices()?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| anyhow!("Input device '{}' not found", name))?,
        None => host
            .default_input_device()
            .ok_or_else(|| anyhow!("No input device available"))?,
    };

    info!("[AUDIO] Using audio input device: {}", device.name()?);

    let configs = device
        .supported_input_configs()
        .context("Failed to query input configurations")?
        .collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, config.sample_rate).ok_or_else(|| {
        anyhow!(
            "Device cannot capture f32 at exactly {} Hz",
            config.sample_rate
        )
    })?;
    let channels = usize::from(supported_config.channels());

    let stream_config: cpal::StreamConfig = supported_config
        .with_sample_rate(cpal::SampleRate(config.sample_rate))
        .into();

    info!(
        "[AUDIO] Selected sample rate: {} Hz, {} channel(s), block size: {} samples",
        config.sample_rate, channels, config.block_size
    );

    let block_size = config.block_size;
    let fault_queue = queue.clone();
    let err_fn = move |err: cpal::StreamError| {
        let fatal = matches!(err, cpal::StreamError::DeviceNotAvailable);
        fault_queue.push(CaptureEvent::Fault {
            message: err.to_string(),
            fatal,
        });
    };

    // This buffer will accumulate audio data from the callback.
    let mut pending = Vec::with_capacity(block_size * 2);

    let stream = device.build_input_stream(
        &stream_config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            extend_first_channel(&mut pending, data, channels);

            // While we have enough data for a full block, hand it off.
            while pending.len() >= block_size {
                let block: Vec<f32> = pending.drain(..block_size).collect();
                queue.push_block(block);
            }
        },
        err_fn,
        None,
    )?;

    stream.play()?;

    Ok(stream)
}

/// Finds an f32 configuration whose rate range contains `sample_rate`,
/// preferring the fewest channels. Only the first channel is recorded.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    sample_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| {
            c.channels() > 0
                && c.sample_format() == cpal::SampleFormat::F32
                && c.min_sample_rate().0 <= sample_rate
                && sample_rate <= c.max_sample_rate().0
        })
        .min_by_key(|c| c.channels())
}

/// Appends the first channel of interleaved `data` to `pending`.
fn extend_first_channel(pending: &mut Vec<f32>, data: &[f32], channels: usize) {
    if channels <= 1 {
        pending.extend_from_slice(data);
    } else {
        pending.extend(data.chunks_exact(channels).map(|frame| frame[0]));
    }
}

/// Lists the names of the host's input devices.
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| RecorderError::DeviceOpen(e.to_string()))?;
    Ok(devices
        .map(|d| d.name().unwrap_or_else(|_| "Unknown Device".to_string()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_delivers_in_order() {
        let (queue, receiver) = BlockQueue::bounded(4);
        queue.push_block(vec![1.0]);
        queue.push_block(vec![2.0]);
        assert_eq!(receiver.try_recv().unwrap(), CaptureEvent::Block(vec![1.0]));
        assert_eq!(receiver.try_recv().unwrap(), CaptureEvent::Block(vec![2.0]));
        assert_eq!(queue.dropped(), 0);
    }

    #[test]
    fn test_queue_drops_oldest_when_full() {
        let (queue, receiver) = BlockQueue::bounded(2);
        for i in 0..5 {
            queue.push_block(vec![i as f32]);
        }
        let drained: Vec<_> = receiver.try_iter().collect();
        assert_eq!(
            drained,
            vec![CaptureEvent::Block(vec![3.0]), CaptureEvent::Block(vec![4.0])]
        );
        assert_eq!(queue.dropped(), 3);
    }

    fn range(channels: u16, min: u32, max: u32) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            cpal::SampleRate(min),
            cpal::SampleRate(max),
            cpal::SupportedBufferSize::Unknown,
            cpal::SampleFormat::F32,
        )
    }

    #[test]
    fn test_stereo_only_device_is_accepted() {
        let found = find_supported_config(vec![range(2, 8000, 48_000)], 40_000);
        assert_eq!(found.map(|c| c.channels()), Some(2));
    }

    #[test]
    fn test_fewest_channels_preferred() {
        let configs = vec![range(2, 8000, 48_000), range(1, 8000, 48_000), range(4, 8000, 48_000)];
        let found = find_supported_config(configs, 40_000);
        assert_eq!(found.map(|c| c.channels()), Some(1));
    }

    #[test]
    fn test_rate_must_be_inside_the_range() {
        assert!(find_supported_config(vec![range(1, 44_100, 48_000)], 40_000).is_none());
    }

    #[test]
    fn test_first_channel_is_kept() {
        let mut pending = Vec::new();
        extend_first_channel(&mut pending, &[1.0, -1.0, 2.0, -2.0, 3.0, -3.0], 2);
        assert_eq!(pending, vec![1.0, 2.0, 3.0]);
        extend_first_channel(&mut pending, &[4.0, 5.0], 1);
        assert_eq!(pending, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_push_after_consumer_gone_is_silent() {
        let (queue, receiver) = BlockQueue::bounded(1);
        drop(receiver);
        // The eviction receiver keeps the channel connected; pushes still never block.
        queue.push_block(vec![0.0]);
        queue.push_block(vec![0.0]);
        assert_eq!(queue.dropped(), 1);
    }
}
