//! # Session Module
//!
//! `SessionController` owns the rolling buffer, the analyzer and the sample
//! source, and drives them from a dedicated worker thread.
//!
//! ## Architecture
//! - **Device callback**: pushes blocks into a bounded `BlockQueue` and returns
//! - **Worker thread**: drains the queue, appends to the buffer, analyzes,
//!   publishes an `AnalysisFrame`
//! - **Readers** (UI, export): only ever see immutable frames and snapshots
//!
//! The buffer, analyzer and source move into the worker on `start` and come
//! back through `JoinHandle::join` on `stop`, so exactly one thread can mutate
//! the buffer and nothing touches it once `stop` has returned.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::{debug, error, info, warn};

use crate::audio::{BlockQueue, CaptureEvent, SampleSource, QUEUE_DEPTH};
use crate::buffer::{has_signal, AudioSnapshot, CircularAudioBuffer};
use crate::config::CaptureConfig;
use crate::error::{RecorderError, Result};
use crate::fft::{SpectralAnalyzer, Spectrum};

/// Consecutive transient faults (with no block in between) that end a session.
pub const MAX_CONSECUTIVE_FAULTS: u32 = 16;

/// Frames a subscriber may lag behind before it starts missing frames.
pub const FRAME_CHANNEL_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
    Stopped,
}

/// Result of one append + analyze cycle.
#[derive(Debug, Clone)]
pub struct AnalysisFrame {
    /// Strictly increasing across the controller's lifetime.
    pub sequence: u64,
    pub sample_rate: u32,
    /// The whole rolling window at the end of this cycle.
    pub waveform: AudioSnapshot,
    pub spectrum: Spectrum,
}

impl AnalysisFrame {
    pub fn has_signal(&self) -> bool {
        self.spectrum.has_signal
    }
}

/// Counters describing the capture health of a controller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    pub cycles: u64,
    pub blocks: u64,
    pub faults: u64,
    /// Blocks discarded by the capture queue because the worker fell behind.
    pub dropped_blocks: u64,
    /// Cycles whose append + analyze took longer than one block period.
    pub slow_cycles: u64,
    /// Most recent driver fault, as `RecorderError::DeviceRuntime`.
    pub last_fault: Option<RecorderError>,
}

#[derive(Debug, Default)]
struct StatsCounters {
    cycles: AtomicU64,
    blocks: AtomicU64,
    faults: AtomicU64,
    dropped_blocks: AtomicU64,
    slow_cycles: AtomicU64,
    last_fault: Mutex<Option<RecorderError>>,
}

type Subscribers = Arc<Mutex<Vec<Sender<Arc<AnalysisFrame>>>>>;

/// Everything the worker borrows for the duration of a recording.
struct WorkerParts {
    buffer: CircularAudioBuffer,
    analyzer: SpectralAnalyzer,
    source: Box<dyn SampleSource>,
    next_sequence: u64,
}

/// Worker thread management structure.
struct AudioWorker {
    shutdown_tx: Sender<()>,
    thread_handle: JoinHandle<WorkerParts>,
    queue: BlockQueue,
}

pub struct SessionController {
    config: CaptureConfig,
    state: SessionState,
    // `None` while a worker holds them.
    parts: Option<WorkerParts>,
    worker: Option<AudioWorker>,
    /// Buffer contents at the moment recording started, served until the first frame.
    resume_snapshot: Option<AudioSnapshot>,
    latest: Arc<Mutex<Option<Arc<AnalysisFrame>>>>,
    subscribers: Subscribers,
    stats: Arc<StatsCounters>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl SessionController {
    /// Creates an idle controller with a silent buffer of `config.buffer_len()` samples.
    pub fn new(config: CaptureConfig, source: Box<dyn SampleSource>) -> Result<Self> {
        config.validate()?;
        let buffer = CircularAudioBuffer::with_duration(config.sample_rate, config.duration_secs);
        info!(
            "[SESSION] Created session: {} Hz, {} s window ({} samples), spectrum up to {} Hz",
            config.sample_rate,
            config.duration_secs,
            buffer.len(),
            config.max_frequency
        );
        Ok(Self {
            config,
            state: SessionState::Idle,
            parts: Some(WorkerParts {
                buffer,
                analyzer: SpectralAnalyzer::new(),
                source,
                next_sequence: 0,
            }),
            worker: None,
            resume_snapshot: None,
            latest: Arc::new(Mutex::new(None)),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            stats: Arc::new(StatsCounters::default()),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Starts recording. Does nothing if already recording.
    ///
    /// Opens the sample source on a new worker thread and waits for the open
    /// to succeed. On failure the state is left untouched and the error is
    /// returned.
    pub fn start(&mut self) -> Result<()> {
        self.poll();
        if self.state == SessionState::Recording {
            debug!("[SESSION] start() while recording, ignoring");
            return Ok(());
        }

        let parts = self.parts.take().ok_or_else(|| {
            RecorderError::DeviceOpen("capture source was lost after a worker failure".into())
        })?;
        let resume_snapshot = parts.buffer.snapshot();

        let (queue, events) = BlockQueue::bounded(QUEUE_DEPTH);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<()>>(1);

        let context = WorkerContext {
            config: self.config.clone(),
            latest: Arc::clone(&self.latest),
            subscribers: Arc::clone(&self.subscribers),
            stats: Arc::clone(&self.stats),
        };
        let worker_queue = queue.clone();
        let spawned = thread::Builder::new()
            .name("audio-session".into())
            .spawn(move || run_worker(parts, context, worker_queue, events, shutdown_rx, ready_tx));
        let thread_handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                // The closure (and the parts inside it) is gone with the failed spawn.
                error!("[SESSION] Failed to spawn audio worker: {}", e);
                return Err(RecorderError::DeviceOpen(format!("failed to spawn worker: {}", e)));
            }
        };

        let opened = ready_rx.recv().unwrap_or_else(|_| {
            Err(RecorderError::DeviceOpen("audio worker exited during startup".into()))
        });

        if let Err(e) = opened {
            warn!("[SESSION] Could not start recording: {}", e);
            self.reap(thread_handle);
            return Err(e);
        }

        self.resume_snapshot = Some(resume_snapshot);
        self.worker = Some(AudioWorker {
            shutdown_tx,
            thread_handle,
            queue,
        });
        self.state = SessionState::Recording;
        info!("[SESSION] Recording started");
        Ok(())
    }

    /// Stops recording and waits for the worker to finish.
    ///
    /// When this returns the source is closed and the buffer will not change
    /// again until the next `start`. Does nothing unless recording.
    pub fn stop(&mut self) {
        if self.state != SessionState::Recording {
            debug!("[SESSION] stop() while not recording, ignoring");
            return;
        }
        if let Some(worker) = self.worker.take() {
            info!("[SESSION] Shutting down audio worker...");
            // The worker may already be gone after a fatal fault.
            let _ = worker.shutdown_tx.send(());
            self.stats
                .dropped_blocks
                .fetch_add(worker.queue.dropped(), Ordering::Relaxed);
            self.reap(worker.thread_handle);
        }
        self.resume_snapshot = None;
        self.state = SessionState::Stopped;
        info!("[SESSION] Recording stopped");
    }

    /// Collects a worker that ended on its own (fatal device fault) and moves
    /// the session to `Stopped`. Returns the resulting state.
    pub fn poll(&mut self) -> SessionState {
        let finished = self
            .worker
            .as_ref()
            .is_some_and(|w| w.thread_handle.is_finished());
        if finished {
            warn!("[SESSION] Audio worker ended unexpectedly, stopping session");
            self.stop();
        }
        self.state
    }

    /// The whole rolling window, oldest sample first.
    ///
    /// While recording this is the waveform of the latest published frame.
    pub fn current_buffer(&self) -> AudioSnapshot {
        if let Some(parts) = &self.parts {
            return parts.buffer.snapshot();
        }
        if let Some(frame) = self.latest_frame() {
            return Arc::clone(&frame.waveform);
        }
        self.resume_snapshot
            .clone()
            .unwrap_or_else(|| vec![0.0; self.config.buffer_len()].into())
    }

    /// False when the window is pure silence; exporters must not normalize then.
    pub fn has_signal(&self) -> bool {
        has_signal(&self.current_buffer())
    }

    pub fn latest_frame(&self) -> Option<Arc<AnalysisFrame>> {
        self.latest.lock().ok().and_then(|latest| latest.clone())
    }

    /// Registers an observer. Every published frame is offered to it; a
    /// receiver more than `FRAME_CHANNEL_DEPTH` frames behind misses frames.
    pub fn subscribe(&self) -> Receiver<Arc<AnalysisFrame>> {
        let (tx, rx) = crossbeam_channel::bounded(FRAME_CHANNEL_DEPTH);
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    pub fn stats(&self) -> SessionStats {
        let live_drops = self.worker.as_ref().map_or(0, |w| w.queue.dropped());
        SessionStats {
            cycles: self.stats.cycles.load(Ordering::Relaxed),
            blocks: self.stats.blocks.load(Ordering::Relaxed),
            faults: self.stats.faults.load(Ordering::Relaxed),
            dropped_blocks: self.stats.dropped_blocks.load(Ordering::Relaxed) + live_drops,
            slow_cycles: self.stats.slow_cycles.load(Ordering::Relaxed),
            last_fault: self.stats.last_fault.lock().ok().and_then(|f| f.clone()),
        }
    }

    /// Resets the window to silence. Only possible while not recording;
    /// returns whether the buffer was cleared.
    pub fn clear(&mut self) -> bool {
        match &mut self.parts {
            Some(parts) if self.state != SessionState::Recording => {
                parts.buffer.clear();
                if let Ok(mut latest) = self.latest.lock() {
                    *latest = None;
                }
                info!("[SESSION] Buffer cleared");
                true
            }
            _ => {
                warn!("[SESSION] Cannot clear the buffer while recording");
                false
            }
        }
    }

    fn reap(&mut self, handle: JoinHandle<WorkerParts>) {
        match handle.join() {
            Ok(parts) => self.parts = Some(parts),
            Err(_) => {
                error!("[SESSION] Audio worker panicked; capture source is lost");
                self.parts = None;
            }
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Shared handles the worker publishes through.
struct WorkerContext {
    config: CaptureConfig,
    latest: Arc<Mutex<Option<Arc<AnalysisFrame>>>>,
    subscribers: Subscribers,
    stats: Arc<StatsCounters>,
}

fn run_worker(
    mut parts: WorkerParts,
    context: WorkerContext,
    queue: BlockQueue,
    events: Receiver<CaptureEvent>,
    shutdown_rx: Receiver<()>,
    ready_tx: Sender<Result<()>>,
) -> WorkerParts {
    info!("[AUDIO-THREAD] Opening sample source...");
    let capture = match parts.source.open(&context.config, queue) {
        Ok(capture) => capture,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return parts;
        }
    };
    let _ = ready_tx.send(Ok(()));

    let mut consecutive_faults = 0u32;
    let block_period = context.config.block_period();
    let mut warned_slow = false;
    info!("[AUDIO-THREAD] Entering capture loop...");

    loop {
        crossbeam_channel::select! {
            recv(events) -> msg => match msg {
                Ok(first) => {
                    // Merge everything that queued up while the last cycle ran.
                    let cycle_start = Instant::now();
                    let mut appended = false;
                    let mut fatal = false;
                    for event in std::iter::once(first).chain(events.try_iter()) {
                        match event {
                            CaptureEvent::Block(block) => {
                                parts.buffer.append(&block);
                                context.stats.blocks.fetch_add(1, Ordering::Relaxed);
                                consecutive_faults = 0;
                                appended = true;
                            }
                            CaptureEvent::Fault { message, fatal: is_fatal } => {
                                consecutive_faults += 1;
                                record_fault(&context.stats, &message);
                                if is_fatal || consecutive_faults >= MAX_CONSECUTIVE_FAULTS {
                                    error!("[AUDIO-THREAD] Fatal stream fault: {}", message);
                                    fatal = true;
                                    break;
                                }
                                warn!("[AUDIO-THREAD] Stream fault, continuing: {}", message);
                            }
                        }
                    }
                    if appended {
                        publish_cycle(&mut parts, &context);
                        let elapsed = cycle_start.elapsed();
                        if elapsed > block_period {
                            context.stats.slow_cycles.fetch_add(1, Ordering::Relaxed);
                            if !warned_slow {
                                warned_slow = true;
                                warn_slow_cycle(elapsed, block_period);
                            }
                        }
                    }
                    if fatal {
                        break;
                    }
                }
                Err(_) => {
                    warn!("[AUDIO-THREAD] Capture queue closed");
                    break;
                }
            },
            recv(shutdown_rx) -> _ => {
                info!("[AUDIO-THREAD] Received shutdown signal");
                break;
            },
        }
    }

    info!("[AUDIO-THREAD] Closing sample source and exiting...");
    capture.close();
    parts
}

fn record_fault(stats: &StatsCounters, message: &str) {
    stats.faults.fetch_add(1, Ordering::Relaxed);
    if let Ok(mut last) = stats.last_fault.lock() {
        *last = Some(RecorderError::DeviceRuntime(message.to_string()));
    }
}

fn warn_slow_cycle(elapsed: Duration, block_period: Duration) {
    warn!(
        "[AUDIO-THREAD] Analysis cycle took {:.1} ms, longer than one block ({:.1} ms); blocks will queue up",
        elapsed.as_secs_f64() * 1000.0,
        block_period.as_secs_f64() * 1000.0
    );
}

/// Analyzes the current window and hands the frame to every observer.
fn publish_cycle(parts: &mut WorkerParts, context: &WorkerContext) {
    let waveform = parts.buffer.snapshot();
    let config = &context.config;

    let analyzer = &mut parts.analyzer;
    let spectrum = match catch_unwind(AssertUnwindSafe(|| {
        analyzer.analyze(&waveform, config.sample_rate, config.max_frequency)
    })) {
        Ok(spectrum) => spectrum,
        Err(_) => {
            error!("[AUDIO-THREAD] Analysis panicked, skipping this frame");
            parts.analyzer = SpectralAnalyzer::new();
            return;
        }
    };

    let frame = Arc::new(AnalysisFrame {
        sequence: parts.next_sequence,
        sample_rate: config.sample_rate,
        waveform,
        spectrum,
    });
    parts.next_sequence += 1;

    if let Ok(mut latest) = context.latest.lock() {
        *latest = Some(Arc::clone(&frame));
    }
    if let Ok(mut subscribers) = context.subscribers.lock() {
        subscribers.retain(|tx| match tx.try_send(Arc::clone(&frame)) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
    context.stats.cycles.fetch_add(1, Ordering::Relaxed);
}
