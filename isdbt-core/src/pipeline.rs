//! Single-producer/single-consumer capture pipeline.
//!
//! A producer thread drains the tuner's data-capture endpoint into a
//! [`CircularByteBuffer`]; the caller's thread runs the consumer, which
//! moves fixed-size blocks from the buffer to every [`Sink`]. One mutex and
//! one condition variable guard the buffer; each side re-checks its own
//! predicate after every wake.
//!
//! ```text
//! Idle --start--> Running --stop--> Stopping --(producer joined)--> Idle
//! ```

use std::io::{self, Write};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use log::{debug, error, info, trace, warn};

use crate::error::{PipelineError, SinkWriteError, TunerError};
use crate::ring_buffer::CircularByteBuffer;
use crate::tuner::CaptureSource;

/// Source of the periodic signal-strength telemetry.
pub trait SignalMonitor {
    /// Current signal strength, 0..=100.
    fn signal_strength(&mut self) -> Result<u8, TunerError>;
}

/// A monitor that reports nothing.
impl SignalMonitor for () {
    fn signal_strength(&mut self) -> Result<u8, TunerError> {
        Err(TunerError::NotOpen)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Ring buffer size in bytes (power of two).
    pub buffer_capacity: usize,
    /// Maximum bytes pulled from the device per read.
    pub chunk_size: usize,
    /// Bytes handed to the sinks per consumer iteration.
    pub block_size: usize,
    /// Query signal strength every this many blocks. 0 disables it.
    pub status_interval: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 1 << 28,
            chunk_size: 4096,
            block_size: 4096,
            status_interval: 100,
        }
    }
}

impl PipelineConfig {
    fn validate(&self) -> Result<(), PipelineError> {
        if self.chunk_size == 0 || self.block_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "chunk and block sizes must be non-zero".to_string(),
            ));
        }
        if self.chunk_size > self.buffer_capacity || self.block_size > self.buffer_capacity {
            return Err(PipelineError::InvalidConfig(format!(
                "chunk ({}) and block ({}) must fit in the {} byte buffer",
                self.chunk_size, self.block_size, self.buffer_capacity
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    Idle = 0,
    Running = 1,
    Stopping = 2,
}

impl PipelineState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => PipelineState::Running,
            2 => PipelineState::Stopping,
            _ => PipelineState::Idle,
        }
    }
}

/// Byte counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Bytes read from the capture endpoint.
    pub bytes_read: u64,
    /// Bytes handed to the sinks.
    pub bytes_delivered: u64,
    /// Bytes read but discarded because nobody was left to drain them.
    pub bytes_dropped: u64,
    /// Blocks handed to the sinks (the final one may be partial).
    pub blocks: u64,
    /// Sink writes that failed or came back short.
    pub short_writes: u64,
}

struct Shared {
    buffer: Option<CircularByteBuffer>,
    consumer_active: bool,
    producer_done: bool,
    /// Producer holds a chunk that does not fit in the free space.
    producer_blocked: bool,
    stats: PipelineStats,
}

struct Context {
    state: AtomicU8,
    shared: Mutex<Shared>,
    cond: Condvar,
}

impl Context {
    fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: PipelineState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Shared>) -> MutexGuard<'a, Shared> {
        self.cond.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves `Running` to `Stopping` and wakes both sides.
    fn request_stop(&self) -> bool {
        let changed = self
            .state
            .compare_exchange(
                PipelineState::Running as u8,
                PipelineState::Stopping as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        // Taking the lock orders the wake after any in-progress predicate check.
        let _guard = self.lock();
        self.cond.notify_all();
        changed
    }
}

/// Cloneable handle that asks a running pipeline to stop.
///
/// Safe to call from a signal handler thread or a timer.
#[derive(Clone)]
pub struct StopHandle {
    ctx: Arc<Context>,
}

impl StopHandle {
    pub fn stop(&self) {
        if self.ctx.request_stop() {
            info!("[Pipeline] Stop requested");
        }
    }

    pub fn is_running(&self) -> bool {
        self.ctx.state() == PipelineState::Running
    }
}

/// A named byte-stream destination.
pub struct Sink {
    name: String,
    writer: Box<dyn Write + Send>,
}

impl Sink {
    pub fn new(name: impl Into<String>, writer: impl Write + Send + 'static) -> Self {
        Self {
            name: name.into(),
            writer: Box::new(writer),
        }
    }

    /// One `write` call; anything less than the whole block is an error.
    fn write_block(&mut self, block: &[u8]) -> Result<(), SinkWriteError> {
        match self.writer.write(block) {
            Ok(n) if n == block.len() => Ok(()),
            Ok(n) => Err(SinkWriteError::ShortWrite {
                sink: self.name.clone(),
                written: n,
                expected: block.len(),
            }),
            Err(source) => Err(SinkWriteError::Io {
                sink: self.name.clone(),
                source,
            }),
        }
    }
}

/// Fans each block out to every sink.
#[derive(Default)]
pub struct SinkSet {
    sinks: Vec<Sink>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Sink) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Writes `block` to every sink and returns the failures.
    pub fn deliver(&mut self, block: &[u8]) -> Vec<SinkWriteError> {
        self.sinks
            .iter_mut()
            .filter_map(|sink| sink.write_block(block).err())
            .collect()
    }

    pub fn flush(&mut self) {
        for sink in &mut self.sinks {
            if let Err(e) = sink.writer.flush() {
                warn!("[Pipeline] Flushing sink {} failed: {}", sink.name, e);
            }
        }
    }
}

pub struct CapturePipeline {
    config: PipelineConfig,
    ctx: Arc<Context>,
    producer: Option<JoinHandle<()>>,
}

impl CapturePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            ctx: Arc::new(Context {
                state: AtomicU8::new(PipelineState::Idle as u8),
                shared: Mutex::new(Shared {
                    buffer: None,
                    consumer_active: false,
                    producer_done: false,
                    producer_blocked: false,
                    stats: PipelineStats::default(),
                }),
                cond: Condvar::new(),
            }),
            producer: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.ctx.state()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            ctx: Arc::clone(&self.ctx),
        }
    }

    /// Bytes currently held in the ring buffer.
    pub fn buffered_bytes(&self) -> usize {
        self.ctx
            .lock()
            .buffer
            .as_ref()
            .map_or(0, CircularByteBuffer::fill_bytes)
    }

    /// Allocates the ring buffer and spawns the producer on `source`.
    pub fn start<S>(&mut self, source: S) -> Result<(), PipelineError>
    where
        S: CaptureSource + 'static,
    {
        if self.ctx.state() != PipelineState::Idle {
            return Err(PipelineError::AlreadyRunning);
        }
        self.config.validate()?;
        let buffer = CircularByteBuffer::new(self.config.buffer_capacity)?;
        info!(
            "[Pipeline] Starting: buffer={} bytes (mirrored={}), chunk={}, block={}",
            buffer.capacity(),
            buffer.is_mirrored(),
            self.config.chunk_size,
            self.config.block_size
        );

        {
            let mut shared = self.ctx.lock();
            shared.buffer = Some(buffer);
            shared.consumer_active = false;
            shared.producer_done = false;
            shared.producer_blocked = false;
            shared.stats = PipelineStats::default();
        }
        self.ctx.set_state(PipelineState::Running);

        let ctx = Arc::clone(&self.ctx);
        let chunk_size = self.config.chunk_size;
        let spawned = thread::Builder::new()
            .name("isdbt-producer".to_string())
            .spawn(move || run_producer(&ctx, &source, chunk_size));

        match spawned {
            Ok(handle) => {
                self.producer = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.ctx.set_state(PipelineState::Idle);
                self.ctx.lock().buffer = None;
                Err(PipelineError::Spawn(e))
            }
        }
    }

    /// Runs the consumer on the calling thread until the pipeline is
    /// stopped and every buffered byte has been delivered.
    ///
    /// Every `status_interval` blocks the monitor is asked for the signal
    /// strength; failures there are logged and ignored.
    pub fn run_consumer<M>(&self, sinks: &mut SinkSet, monitor: &mut M) -> Result<(), PipelineError>
    where
        M: SignalMonitor + ?Sized,
    {
        if self.ctx.state() == PipelineState::Idle {
            return Err(PipelineError::NotRunning);
        }
        let block_size = self.config.block_size;
        let mut block = vec![0u8; block_size];
        let mut stats = PipelineStats::default();

        self.ctx.lock().consumer_active = true;
        debug!("[Pipeline] Consumer attached ({} sink(s))", sinks.len());

        loop {
            let n = self.take_block(&mut block);
            if n == 0 {
                break;
            }

            for e in sinks.deliver(&block[..n]) {
                warn!("[Pipeline] {}", e);
                stats.short_writes += 1;
            }
            stats.bytes_delivered += n as u64;
            stats.blocks += 1;

            let interval = self.config.status_interval;
            if interval > 0 && stats.blocks % interval == 0 {
                match monitor.signal_strength() {
                    Ok(strength) => info!(
                        "[Pipeline] Signal strength {}% ({} bytes delivered)",
                        strength, stats.bytes_delivered
                    ),
                    Err(e) => debug!("[Pipeline] Signal strength unavailable: {}", e),
                }
            }
        }

        sinks.flush();
        let mut shared = self.ctx.lock();
        shared.consumer_active = false;
        shared.stats.bytes_delivered += stats.bytes_delivered;
        shared.stats.blocks += stats.blocks;
        shared.stats.short_writes += stats.short_writes;
        self.ctx.cond.notify_all();
        debug!("[Pipeline] Consumer finished: {:?}", stats);
        Ok(())
    }

    /// Copies the next block into `block`. Returns 0 once the pipeline has
    /// stopped and the buffer is empty.
    ///
    /// A partial block is taken when the producer is stuck on a chunk that
    /// does not fit, otherwise both sides would wait on each other whenever
    /// `capacity - chunk < fill < block`.
    fn take_block(&self, block: &mut [u8]) -> usize {
        let mut shared = self.ctx.lock();
        loop {
            let draining = shared.producer_done && self.ctx.state() != PipelineState::Running;
            let producer_blocked = shared.producer_blocked;
            let Some(buffer) = shared.buffer.as_mut() else {
                return 0;
            };
            let fill = buffer.fill_bytes();

            let n = if fill >= block.len() {
                block.len()
            } else if draining {
                // Final partial block, or nothing left.
                fill
            } else if producer_blocked && fill > 0 {
                trace!("[Pipeline] Taking partial block of {} bytes", fill);
                fill
            } else {
                shared = self.ctx.wait(shared);
                continue;
            };

            if n > 0 {
                block[..n].copy_from_slice(&buffer.readable_span()[..n]);
                buffer.commit_read(n);
                self.ctx.cond.notify_all();
            }
            return n;
        }
    }

    /// Stops the producer, waits for it to exit, releases the buffer and
    /// returns the run's counters.
    pub fn stop(&mut self) -> Result<PipelineStats, PipelineError> {
        if self.ctx.state() == PipelineState::Idle {
            return Err(PipelineError::NotRunning);
        }
        self.ctx.request_stop();

        let joined = match self.producer.take() {
            Some(handle) => handle.join().map_err(|_| PipelineError::ProducerPanicked),
            None => Ok(()),
        };

        let stats = {
            let mut shared = self.ctx.lock();
            if let Some(buffer) = shared.buffer.take() {
                if buffer.fill_bytes() > 0 {
                    shared.stats.bytes_dropped += buffer.fill_bytes() as u64;
                    warn!(
                        "[Pipeline] Released buffer with {} undelivered bytes",
                        buffer.fill_bytes()
                    );
                }
            }
            shared.stats
        };
        self.ctx.set_state(PipelineState::Idle);
        info!(
            "[Pipeline] Stopped: read={} delivered={} dropped={} short_writes={}",
            stats.bytes_read, stats.bytes_delivered, stats.bytes_dropped, stats.short_writes
        );

        joined.map(|_| stats)
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        if self.ctx.state() != PipelineState::Idle {
            if let Err(e) = self.stop() {
                error!("[Pipeline] Stop on drop failed: {}", e);
            }
        }
    }
}

fn run_producer<S: CaptureSource + ?Sized>(ctx: &Context, source: &S, chunk_size: usize) {
    debug!("[Pipeline] Producer started");
    let mut chunk = vec![0u8; chunk_size];

    while ctx.state() == PipelineState::Running {
        let n = match source.read_chunk(&mut chunk) {
            Ok(0) => 0,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => 0,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("[Pipeline] Read from capture device failed: {}", e);
                0
            }
        };

        if n == 0 {
            if let Err(e) = source.wait_readable() {
                error!("[Pipeline] Waiting for capture data failed: {}", e);
                break;
            }
            continue;
        }

        trace!("[Pipeline] Read {} bytes", n);
        commit_chunk(ctx, &chunk[..n]);
    }

    let mut shared = ctx.lock();
    shared.producer_done = true;
    ctx.cond.notify_all();
    debug!("[Pipeline] Producer exited");
}

/// Blocks until `data` fits, then publishes it. Only gives up when the
/// pipeline is stopping and no consumer is left to make room.
fn commit_chunk(ctx: &Context, data: &[u8]) {
    let mut shared = ctx.lock();
    shared.stats.bytes_read += data.len() as u64;
    let mut reported_full = false;

    loop {
        let consumer_active = shared.consumer_active;
        let Some(buffer) = shared.buffer.as_mut() else {
            shared.stats.bytes_dropped += data.len() as u64;
            return;
        };

        if buffer.free_bytes() >= data.len() {
            buffer.writable_span()[..data.len()].copy_from_slice(data);
            buffer.commit_write(data.len());
            shared.producer_blocked = false;
            ctx.cond.notify_all();
            return;
        }

        if ctx.state() != PipelineState::Running && !consumer_active {
            warn!(
                "[Pipeline] Discarding {} bytes: buffer full and no consumer attached",
                data.len()
            );
            shared.stats.bytes_dropped += data.len() as u64;
            shared.producer_blocked = false;
            return;
        }

        if !reported_full {
            warn!(
                "[Pipeline] Buffer full ({} bytes free, need {}), waiting for consumer",
                buffer.free_bytes(),
                data.len()
            );
            reported_full = true;
        }
        shared.producer_blocked = true;
        ctx.cond.notify_all();
        shared = ctx.wait(shared);
    }
}
