//! `fluxlog` — the hot-path engine of an asynchronous, low-latency
//! structured logger.
//!
//! Producers copy a small argument payload into a thread-local ring buffer
//! and return; a single background worker later drains committed frames,
//! invokes the caller-supplied formatter for each one, and batches the
//! resulting bytes to a [`writer::Writer`].
//!
//! This crate implements the engine only: the thread-local input buffer
//! ([`input_buffer`]), the shared commit queue ([`queue`]), the output
//! buffer ([`output_buffer`]), the consumer worker ([`worker`]), the
//! cross-thread notification primitive ([`signal`]), a fast float
//! descaling helper ([`descale`]), and the façade that ties them together
//! ([`logger`]). Formatting concrete user types, the high-level
//! level/macro API, and the `Writer` sink itself are left to the caller.

pub mod constants;
pub mod descale;
pub mod dispatch;
pub mod error;
pub mod input_buffer;
pub mod logger;
pub mod output_buffer;
pub mod queue;
pub mod signal;
pub mod worker;
pub mod writer;

pub use descale::descale;
pub use dispatch::{DispatchHandle, DispatchOp, DispatchResult, TypeDescriptor};
pub use error::{LogError, Result, WriteError};
pub use logger::{ErrorPolicy, Logger, LoggerBuilder};
pub use output_buffer::OutputBuffer;
pub use signal::EventSignal;
pub use writer::Writer;
