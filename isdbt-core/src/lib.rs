//! ISDB-T tuner control and capture pipeline.
//!
//! This crate drives a Linux DVB v5 adapter tuned to ISDB-T and streams
//! its transport stream to one or more sinks.
//!
//! - [`tuner::TunerResource`]: opens the frontend/demux/dvr endpoints of one
//!   adapter, tunes it from a [`ChannelRequest`], reports signal state and
//!   releases everything on `close`.
//! - [`ring_buffer::CircularByteBuffer`]: a circular buffer whose read and
//!   write windows are always contiguous (double-mapped on Linux).
//! - [`pipeline::CapturePipeline`]: a producer thread draining the dvr
//!   endpoint into the buffer and a consumer writing blocks to [`Sink`]s.
//!
//! ```rust,no_run
//! use std::fs::File;
//! use isdbt_core::pipeline::{CapturePipeline, PipelineConfig, Sink, SinkSet};
//! use isdbt_core::tuner::{wait_for_lock, LockPolicy, PlatformBackend, TunerResource};
//! use isdbt_core::{ChannelRequest, ReceptionMode};
//!
//! let mut tuner = TunerResource::new(PlatformBackend::default());
//! tuner.open(None)?;
//! tuner.tune(&ChannelRequest::new(599_142_857, ReceptionMode::Full))?;
//! if wait_for_lock(&mut tuner, &LockPolicy::default()).is_locked() {
//!     let source = tuner.capture_source().expect("open resource has a capture source");
//!     let mut pipeline = CapturePipeline::new(PipelineConfig::default());
//!     pipeline.start(source)?;
//!
//!     let mut sinks = SinkSet::new();
//!     sinks.push(Sink::new("out.ts", File::create("out.ts")?));
//!     pipeline.run_consumer(&mut sinks, &mut tuner)?;
//!     pipeline.stop()?;
//! }
//! tuner.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod pipeline;
pub mod ring_buffer;
pub mod tuner;
pub mod types;

pub use error::{BufferError, LastError, PipelineError, SinkWriteError, TunerError};
pub use pipeline::{
    CapturePipeline, PipelineConfig, PipelineState, PipelineStats, SignalMonitor, Sink, SinkSet,
    StopHandle,
};
pub use ring_buffer::CircularByteBuffer;
pub use tuner::{enumerate_adapters, format_adapter_list, TunerResource};
pub use types::{
    AdapterInfo, ChannelRequest, Endpoint, FrontendInfo, FrontendStatus, FrontendType,
    LayerConfig, LayerMask, ReceptionMode, SegmentCount, ISDBT_BANDWIDTH_HZ,
};
