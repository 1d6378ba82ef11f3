//! The façade tying the engine together (spec.md §4.6, "LogFront").
//!
//! `LoggerBuilder` is grounded on `RingBufferConfig`
//! (`flux/src/disruptor/mod.rs`): a `Default`-backed builder of `with_*`
//! methods that validate eagerly, consumed by a single `open` call that
//! starts the consumer thread. `Logger::log` is the producer path of
//! spec.md §4.6's four steps: obtain-or-create this thread's `InputBuffer`,
//! reserve, write the handle and payload, commit, then push the resulting
//! `CommitExtent` to the shared queue.

use crate::constants;
use crate::dispatch::{self, handle_for, DispatchHandle, Loggable, TypeDescriptor};
use crate::error::LogError;
use crate::input_buffer::InputBuffer;
use crate::output_buffer::OutputBuffer;
use crate::queue::{CommitExtent, CommitQueue};
use crate::signal::EventSignal;
use crate::worker::Worker;
use crate::writer::Writer;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// How the worker should react to a sink failure during a frame's flush
/// (spec.md §4.4.2/§7), applied independently for temporary and permanent
/// errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Drop the frame, count it as lost, and report it immediately.
    Ignore,
    /// Drop the frame, count it as lost, and defer a single report until
    /// the next successful flush.
    NotifyOnRecovery,
    /// Retry the same frame with backoff until the writer recovers.
    Block,
    /// Terminate the worker and mark the logger dead.
    FailImmediately,
}

/// Invoked when a user formatter fails for a reason unrelated to the sink
/// (spec.md §6, `format_error_callback`).
pub type FormatErrorCallback = Box<dyn FnMut(TypeDescriptor, &LogError) + Send>;

/// Invoked when a frame is lost to a flush failure, with the sink's error
/// code and the cumulative lost-frame count (spec.md §6, `flush_error_callback`).
pub type FlushErrorCallback = Box<dyn FnMut(i32, u64) + Send>;

fn default_queue_capacity() -> usize {
    (constants::PAGE_SIZE / std::mem::size_of::<CommitExtent>()).max(1)
}

/// `0` substitutes `default` (spec.md §6's "any size of 0 substitutes a
/// default").
fn resolve_size(requested: usize, default: usize) -> usize {
    if requested == 0 {
        default
    } else {
        requested
    }
}

/// Builder for [`Logger`], grounded on the teacher's `RingBufferConfig`.
pub struct LoggerBuilder {
    output_buffer_capacity: usize,
    queue_capacity: usize,
    input_buffer_capacity: usize,
    temporary_error_policy: ErrorPolicy,
    permanent_error_policy: ErrorPolicy,
    format_error_callback: Option<FormatErrorCallback>,
    flush_error_callback: Option<FlushErrorCallback>,
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        Self {
            output_buffer_capacity: constants::DEFAULT_OUTPUT_BUFFER_CAPACITY,
            queue_capacity: default_queue_capacity(),
            input_buffer_capacity: constants::DEFAULT_INPUT_BUFFER_CAPACITY,
            temporary_error_policy: ErrorPolicy::Block,
            permanent_error_policy: ErrorPolicy::Ignore,
            format_error_callback: None,
            flush_error_callback: None,
        }
    }
}

impl LoggerBuilder {
    /// Start from the spec.md §6 defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Output buffer capacity in bytes. `0` substitutes the default (two
    /// typical disk sectors, 8192 bytes).
    pub fn with_output_buffer_capacity(mut self, bytes: usize) -> Self {
        self.output_buffer_capacity = resolve_size(bytes, constants::DEFAULT_OUTPUT_BUFFER_CAPACITY);
        self
    }

    /// Shared commit queue capacity in elements. `0` substitutes
    /// `page_size / size_of::<CommitExtent>()`.
    pub fn with_queue_capacity(mut self, elements: usize) -> Self {
        self.queue_capacity = resolve_size(elements, default_queue_capacity());
        self
    }

    /// Per-thread input buffer capacity in bytes. `0` substitutes the
    /// default (8192 bytes).
    pub fn with_input_buffer_capacity(mut self, bytes: usize) -> Self {
        self.input_buffer_capacity = resolve_size(bytes, constants::DEFAULT_INPUT_BUFFER_CAPACITY);
        self
    }

    /// Policy applied when the sink classifies a flush failure as temporary.
    pub fn with_temporary_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.temporary_error_policy = policy;
        self
    }

    /// Policy applied when the sink classifies a flush failure as permanent.
    pub fn with_permanent_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.permanent_error_policy = policy;
        self
    }

    /// Register the format-error callback.
    pub fn with_format_error_callback(mut self, callback: FormatErrorCallback) -> Self {
        self.format_error_callback = Some(callback);
        self
    }

    /// Register the flush-error callback.
    pub fn with_flush_error_callback(mut self, callback: FlushErrorCallback) -> Self {
        self.flush_error_callback = Some(callback);
        self
    }

    /// Start the consumer thread and return a handle to the running logger.
    pub fn open(self, writer: Box<dyn Writer>) -> Result<Logger, LogError> {
        let handle_size = std::mem::size_of::<DispatchHandle>();
        if self.input_buffer_capacity <= handle_size {
            return Err(LogError::InvalidConfig {
                message: "input buffer capacity must exceed the dispatch handle size",
            });
        }
        if self.output_buffer_capacity == 0 {
            return Err(LogError::InvalidConfig { message: "output buffer capacity must be non-zero" });
        }
        if self.queue_capacity == 0 {
            return Err(LogError::InvalidConfig { message: "queue capacity must be non-zero" });
        }

        let queue_full_event = Arc::new(EventSignal::new());
        let queue_drained_event = Arc::new(EventSignal::new());
        let panic_event = Arc::new(EventSignal::new());
        let panic_flag = Arc::new(AtomicBool::new(false));
        let dead = Arc::new(AtomicBool::new(false));

        let queue = Arc::new(CommitQueue::new(
            self.queue_capacity,
            queue_full_event.clone(),
            queue_drained_event.clone(),
        ));
        let output = OutputBuffer::new(self.output_buffer_capacity, writer);

        let worker = Worker::new(
            output,
            queue.clone(),
            queue_full_event.clone(),
            queue_drained_event,
            panic_event.clone(),
            panic_flag.clone(),
            dead.clone(),
            self.temporary_error_policy,
            self.permanent_error_policy,
            self.format_error_callback,
            self.flush_error_callback,
        );
        let worker_handle = std::thread::Builder::new()
            .name("fluxlog-worker".to_string())
            .spawn(move || worker.run())
            .expect("failed to spawn fluxlog worker thread");

        Ok(Logger {
            id: NEXT_LOGGER_ID.fetch_add(1, Ordering::Relaxed),
            input_buffer_capacity: self.input_buffer_capacity,
            queue,
            queue_full_event,
            panic_flag,
            panic_event,
            dead,
            worker_handle: Some(worker_handle),
        })
    }
}

static NEXT_LOGGER_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static THREAD_BUFFERS: RefCell<HashMap<usize, Arc<InputBuffer>>> = RefCell::new(HashMap::new());
}

/// A running logger: the producer-facing handle returned by
/// [`LoggerBuilder::open`].
pub struct Logger {
    id: usize,
    input_buffer_capacity: usize,
    queue: Arc<CommitQueue>,
    queue_full_event: Arc<EventSignal>,
    panic_flag: Arc<AtomicBool>,
    panic_event: Arc<EventSignal>,
    dead: Arc<AtomicBool>,
    worker_handle: Option<JoinHandle<Result<(), LogError>>>,
}

impl Logger {
    fn thread_buffer(&self) -> Arc<InputBuffer> {
        THREAD_BUFFERS.with(|cell| {
            cell.borrow_mut()
                .entry(self.id)
                .or_insert_with(|| InputBuffer::new(self.input_buffer_capacity, self.queue_full_event.clone()))
                .clone()
        })
    }

    /// Log one record (spec.md §4.6's `log(frame_size, write_payload_fn)`,
    /// specialized to a typed [`Loggable`] value instead of a raw
    /// size-plus-closure pair). Producers see no failure indication: a
    /// frame too large for even a freshly-wrapped input buffer is silently
    /// dropped, matching spec.md §7's "producer code sees no failure
    /// indication for any of the above".
    pub fn log<T: Loggable>(&self, value: T) {
        if self.dead.load(Ordering::Acquire) {
            return;
        }
        let buffer = self.thread_buffer();
        let handle = handle_for::<T>();
        let frame_size = dispatch::frame_size::<T>();
        let Ok(slice) = buffer.reserve(frame_size) else {
            return;
        };
        let handle_size = std::mem::size_of::<DispatchHandle>();
        unsafe {
            (slice.as_mut_ptr() as *mut DispatchHandle).write_unaligned(handle);
            // The payload offset (`frame_start + handle_size`) accumulates
            // from prior frames' sizes and carries no alignment guarantee,
            // so this must be an unaligned write, matching the handle word.
            (slice[handle_size..].as_mut_ptr() as *mut T).write_unaligned(value);
        }
        buffer.commit(frame_size);
        let extent = CommitExtent { buffer: buffer.clone(), commit_end: buffer.write_offset() };
        self.queue.push_blocking(Some(extent));
    }

    /// Request an immediate flush-and-park (spec.md §4.6's `panic_flush`):
    /// set the panic flag, wake the worker, and wait for it to acknowledge
    /// that the output buffer has been flushed. The worker does not return
    /// from its loop after this; any further `log` call produces no bytes.
    pub fn panic_flush(&self) {
        self.panic_flag.store(true, Ordering::Release);
        self.queue_full_event.signal();
        self.panic_event.wait(0);
    }

    /// Push the termination sentinel, join the worker, and assert the
    /// queue drained (spec.md §4.6's `close`).
    pub fn close(&mut self) {
        if let Some(handle) = self.worker_handle.take() {
            self.queue.push_blocking(None);
            let _ = handle.join();
            assert!(self.queue.is_empty(), "worker exited without draining the commit queue");
        }
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        self.close();
    }
}
