//! The single background consumer thread that drains committed frames,
//! invokes formatters, and batches bytes to the [`crate::writer::Writer`]
//! (spec.md §4.4, "ConsumerWorker").
//!
//! The drain loop, its exponential backoff, the touched-set notification,
//! and the panic-flush terminal sleep are all grounded directly in spec.md
//! §4.4.1/§4.4.4; the error-policy taxonomy in §4.4.2/§7. There is no
//! teacher counterpart for a consumer this shaped (the teacher's consumers
//! poll a `RingBuffer<T>` via a `WaitStrategy`, not a queue of byte-range
//! extents), so the backoff and wait-primitive *style* is grounded on
//! `flux/src/disruptor/wait_strategy.rs` while the loop structure itself
//! follows spec.md directly.

use crate::constants::{EXCESSIVE_OUTPUT_SYNTHETIC_CODE, INITIAL_BACKOFF_MS, MAX_BACKOFF_MS};
use crate::dispatch::{DispatchHandle, DispatchOp, DispatchResult};
use crate::error::LogError;
use crate::logger::{ErrorPolicy, FlushErrorCallback, FormatErrorCallback};
use crate::output_buffer::OutputBuffer;
use crate::queue::{CommitExtent, CommitQueue};
use crate::signal::EventSignal;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The exponential backoff schedule shared by the queue-drain poll (§4.4.1)
/// and the `BLOCK` flush-error retry (§4.4.2): starts at
/// [`INITIAL_BACKOFF_MS`], grows by `max(1, wait_ms / 4)` after every
/// unsuccessful attempt, capped at [`MAX_BACKOFF_MS`].
struct Backoff {
    wait_ms: u64,
}

impl Backoff {
    fn new() -> Self {
        Self { wait_ms: INITIAL_BACKOFF_MS }
    }

    /// Wait on `event` for the current backoff duration, then grow it.
    /// `wait_ms == 0` means "poll immediately" here, not "wait forever" —
    /// [`EventSignal::wait`]'s `0` means indefinite, so a plain yield
    /// substitutes for the zero-duration case.
    fn wait(&mut self, event: &EventSignal) {
        if self.wait_ms == 0 {
            std::thread::yield_now();
        } else {
            event.wait(self.wait_ms);
        }
        self.wait_ms = (self.wait_ms + (self.wait_ms / 4).max(1)).min(MAX_BACKOFF_MS);
    }
}

#[cfg(feature = "tracing-diagnostics")]
fn trace_lost_frame(code: i32, lost_frame_count: u64) {
    tracing::warn!(code, lost_frame_count, "frame lost to a flush error");
}
#[cfg(not(feature = "tracing-diagnostics"))]
fn trace_lost_frame(_code: i32, _lost_frame_count: u64) {}

#[cfg(feature = "tracing-diagnostics")]
fn trace_format_error(type_name: &str, err: &LogError) {
    tracing::warn!(type_name, %err, "formatter failed");
}
#[cfg(not(feature = "tracing-diagnostics"))]
fn trace_format_error(_type_name: &str, _err: &LogError) {}

#[cfg(feature = "tracing-diagnostics")]
fn trace_fatal_flush(temporary: bool, code: i32) {
    tracing::error!(temporary, code, "fatal flush error, worker terminating");
}
#[cfg(not(feature = "tracing-diagnostics"))]
fn trace_fatal_flush(_temporary: bool, _code: i32) {}

/// The consumer side of the engine, owning the [`OutputBuffer`] for the
/// logger's entire open lifetime.
pub struct Worker {
    output: OutputBuffer,
    queue: Arc<CommitQueue>,
    queue_full_event: Arc<EventSignal>,
    queue_drained_event: Arc<EventSignal>,
    panic_event: Arc<EventSignal>,
    panic_flag: Arc<AtomicBool>,
    dead: Arc<AtomicBool>,
    temporary_error_policy: ErrorPolicy,
    permanent_error_policy: ErrorPolicy,
    format_error_callback: Option<FormatErrorCallback>,
    flush_error_callback: Option<FlushErrorCallback>,
    lost_frame_count: u64,
    /// Notify-on-recovery's deferred callback: the code to report the next
    /// time a flush this worker performs succeeds.
    notify_pending: Option<i32>,
    /// Number of distinct frames `frame_end`'d into the output buffer since
    /// the last successful (or discarded) flush — the batch size a later
    /// idle/close-time flush failure would count as lost.
    pending_frame_count: u64,
    touched: Vec<Arc<crate::input_buffer::InputBuffer>>,
}

impl Worker {
    /// Build a new worker. Not started until `run` is called on its own
    /// thread (spec.md §4.4: "runs on a single thread started by `open`").
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        output: OutputBuffer,
        queue: Arc<CommitQueue>,
        queue_full_event: Arc<EventSignal>,
        queue_drained_event: Arc<EventSignal>,
        panic_event: Arc<EventSignal>,
        panic_flag: Arc<AtomicBool>,
        dead: Arc<AtomicBool>,
        temporary_error_policy: ErrorPolicy,
        permanent_error_policy: ErrorPolicy,
        format_error_callback: Option<FormatErrorCallback>,
        flush_error_callback: Option<FlushErrorCallback>,
    ) -> Self {
        Self {
            output,
            queue,
            queue_full_event,
            queue_drained_event,
            panic_event,
            panic_flag,
            dead,
            temporary_error_policy,
            permanent_error_policy,
            format_error_callback,
            flush_error_callback,
            lost_frame_count: 0,
            notify_pending: None,
            pending_frame_count: 0,
            touched: Vec::new(),
        }
    }

    /// The main drain loop (spec.md §4.4). Returns once the termination
    /// sentinel is popped and the final flush completes, or propagates
    /// [`LogError::FatalFlush`] when the active policy is `FAIL_IMMEDIATELY`.
    pub fn run(mut self) -> Result<(), LogError> {
        loop {
            match self.pop_with_backoff() {
                None => {
                    self.flush_output()?;
                    return Ok(());
                }
                Some(extent) => {
                    self.process_extent(extent)?;
                    // Signal every producer touched by this extent right
                    // away; not just once the queue goes idle, or a producer
                    // blocked in `InputBuffer::reserve` on a full ring would
                    // starve as long as more extents keep arriving.
                    for buffer in self.touched.drain(..) {
                        buffer.signal_input_consumed();
                        buffer.clear_touched();
                    }
                }
            }
        }
    }

    /// If the panic flag is set, flush, signal panic-done, and park this
    /// thread forever (spec.md §4.4.4). Returns normally otherwise.
    fn maybe_run_panic_sequence(&mut self) {
        if self.panic_flag.load(Ordering::Acquire) {
            let _ = self.output.flush();
            self.panic_event.signal();
            loop {
                std::thread::park();
            }
        }
    }

    /// Pop the next extent, implementing the §4.4.1 backoff/idle protocol
    /// while the queue is empty. `None` is the termination sentinel.
    fn pop_with_backoff(&mut self) -> Option<CommitExtent> {
        let mut backoff = Backoff::new();
        loop {
            self.maybe_run_panic_sequence();
            if let Some(extent) = self.queue.pop() {
                // A producer may be blocked in `push_blocking` waiting for
                // room; signal on every successful pop; not just once the
                // queue goes fully idle, or a steady stream of frames would
                // starve that wakeup forever.
                self.queue_drained_event.signal();
                return extent;
            }
            self.maybe_run_panic_sequence();

            self.queue_drained_event.signal();
            for buffer in self.touched.drain(..) {
                buffer.signal_input_consumed();
                buffer.clear_touched();
            }
            if !self.output.is_empty() {
                let _ = self.flush_output();
            }
            backoff.wait(&self.queue_full_event);
        }
    }

    /// Iterate every frame in `[extent.buffer.read_offset(), extent.commit_end)`.
    fn process_extent(&mut self, extent: CommitExtent) -> Result<(), LogError> {
        let buffer = extent.buffer;
        let mut offset = buffer.read_offset();
        // Not `offset < extent.commit_end`: when a frame's commit lands
        // exactly on the capacity boundary, the next reserve wraps (writes
        // the marker, resets the write cursor near 0) within the span this
        // very extent covers, so `commit_end` can be numerically smaller
        // than the pre-wrap `offset`. Equality still holds once the marker
        // is consumed and `offset` resets.
        while offset != extent.commit_end {
            // SAFETY: offset is a live frame boundary per InputBuffer's contract.
            let handle = unsafe { buffer.handle_at(offset) };
            if handle.is_wraparound_marker() {
                offset = buffer.wraparound();
                continue;
            }

            let payload = buffer.payload_ptr_at(offset);
            match unsafe { handle.call(DispatchOp::Apply, &mut self.output, payload) } {
                DispatchResult::Applied(Ok(())) => {
                    self.output.frame_end();
                    self.pending_frame_count += 1;
                }
                DispatchResult::Applied(Err(err)) => {
                    self.handle_apply_error(&handle, payload, err)?;
                }
                _ => unreachable!("DispatchOp::Apply always yields DispatchResult::Applied"),
            }

            let frame_size = match unsafe { handle.call(DispatchOp::Destroy, &mut self.output, payload) }
            {
                DispatchResult::Destroyed(size) => size,
                _ => unreachable!("DispatchOp::Destroy always yields DispatchResult::Destroyed"),
            };
            offset = buffer.discard_input_frame(frame_size);
            if buffer.mark_touched() {
                self.touched.push(buffer.clone());
            }
        }
        Ok(())
    }

    /// Resolve a formatter failure per spec.md §4.4.2/§7.
    ///
    /// For `ExcessiveOutputByFrame`, always reports via the flush-error
    /// callback regardless of policy. For `Flush`, classifies
    /// temporary/permanent and applies the matching [`ErrorPolicy`],
    /// retrying the same frame under `Block` until the writer recovers. For
    /// [`LogError::Format`], reports via the format-error callback. Returns
    /// `Err` only for `FAIL_IMMEDIATELY`, which the caller propagates to
    /// terminate the worker.
    fn handle_apply_error(
        &mut self,
        handle: &DispatchHandle,
        payload: *mut u8,
        mut err: LogError,
    ) -> Result<(), LogError> {
        let mut retry_backoff = Backoff::new();
        loop {
            self.output.revert_frame();

            if err.is_format_error() {
                self.report_format_error(handle, payload, &err);
                return Ok(());
            }

            match err {
                LogError::ExcessiveOutputByFrame { .. } => {
                    self.lost_frame_count += 1;
                    self.report_flush_error(EXCESSIVE_OUTPUT_SYNTHETIC_CODE, self.lost_frame_count);
                    return Ok(());
                }
                LogError::Flush { temporary, code } => {
                    let policy =
                        if temporary { self.temporary_error_policy } else { self.permanent_error_policy };
                    match policy {
                        ErrorPolicy::Ignore => {
                            self.lost_frame_count += 1;
                            self.report_flush_error(code, self.lost_frame_count);
                            return Ok(());
                        }
                        ErrorPolicy::NotifyOnRecovery => {
                            self.lost_frame_count += 1;
                            self.notify_pending = Some(code);
                            return Ok(());
                        }
                        ErrorPolicy::FailImmediately => {
                            self.dead.store(true, Ordering::Release);
                            trace_fatal_flush(temporary, code);
                            return Err(LogError::FatalFlush { temporary, code });
                        }
                        ErrorPolicy::Block => {
                            // Check here too, not just in pop_with_backoff's idle
                            // branch: a BLOCK retry can spin indefinitely while the
                            // writer stays down, and panic_flush must still be able
                            // to interrupt it.
                            self.maybe_run_panic_sequence();
                            retry_backoff.wait(&self.queue_full_event);
                            match self.flush_output() {
                                Ok(()) => {
                                    match unsafe {
                                        handle.call(DispatchOp::Apply, &mut self.output, payload)
                                    } {
                                        DispatchResult::Applied(Ok(())) => {
                                            self.output.frame_end();
                                            self.pending_frame_count += 1;
                                            return Ok(());
                                        }
                                        DispatchResult::Applied(Err(next_err)) => {
                                            err = next_err;
                                            continue;
                                        }
                                        _ => unreachable!(
                                            "DispatchOp::Apply always yields DispatchResult::Applied"
                                        ),
                                    }
                                }
                                Err(next_err) => {
                                    err = next_err;
                                    continue;
                                }
                            }
                        }
                    }
                }
                other => unreachable!("non-format, non-flush error in flush-error handling: {other:?}"),
            }
        }
    }

    /// Flush the output buffer. On success, resets the pending-frame batch
    /// and fires any deferred `NOTIFY_ON_RECOVERY` callback. On failure,
    /// applies the same [`ErrorPolicy`] taxonomy §4.4.2 defines for a
    /// per-frame flush error, but against the whole pending batch: `IGNORE`
    /// and `NOTIFY_ON_RECOVERY` count every buffered frame as lost and
    /// discard them, `BLOCK` retries with backoff until the writer
    /// recovers, and `FAIL_IMMEDIATELY` terminates the worker.
    fn flush_output(&mut self) -> Result<(), LogError> {
        let mut backoff = Backoff::new();
        loop {
            match self.output.flush() {
                Ok(()) => {
                    self.pending_frame_count = 0;
                    if let Some(code) = self.notify_pending.take() {
                        self.report_flush_error(code, self.lost_frame_count);
                    }
                    return Ok(());
                }
                Err(LogError::Flush { temporary, code }) => {
                    let policy =
                        if temporary { self.temporary_error_policy } else { self.permanent_error_policy };
                    match policy {
                        ErrorPolicy::Ignore => {
                            self.lost_frame_count += self.pending_frame_count;
                            self.report_flush_error(code, self.lost_frame_count);
                            self.output.discard_pending();
                            self.pending_frame_count = 0;
                            return Ok(());
                        }
                        ErrorPolicy::NotifyOnRecovery => {
                            self.lost_frame_count += self.pending_frame_count;
                            self.notify_pending = Some(code);
                            self.output.discard_pending();
                            self.pending_frame_count = 0;
                            return Ok(());
                        }
                        ErrorPolicy::Block => {
                            self.maybe_run_panic_sequence();
                            backoff.wait(&self.queue_full_event);
                        }
                        ErrorPolicy::FailImmediately => {
                            self.dead.store(true, Ordering::Release);
                            trace_fatal_flush(temporary, code);
                            return Err(LogError::FatalFlush { temporary, code });
                        }
                    }
                }
                Err(other) => unreachable!("OutputBuffer::flush only raises LogError::Flush: {other:?}"),
            }
        }
    }

    fn report_flush_error(&mut self, code: i32, lost_frame_count: u64) {
        trace_lost_frame(code, lost_frame_count);
        if let Some(callback) = self.flush_error_callback.as_mut() {
            let _ = catch_unwind(AssertUnwindSafe(|| callback(code, lost_frame_count)));
        }
    }

    fn report_format_error(&mut self, handle: &DispatchHandle, payload: *mut u8, err: &LogError) {
        let descriptor = match unsafe { handle.call(DispatchOp::GetTypeId, &mut self.output, payload) } {
            DispatchResult::TypeId(descriptor) => descriptor,
            _ => unreachable!("DispatchOp::GetTypeId always yields DispatchResult::TypeId"),
        };
        trace_format_error(descriptor.name, err);
        if let Some(callback) = self.format_error_callback.as_mut() {
            let _ = catch_unwind(AssertUnwindSafe(|| callback(descriptor, err)));
        }
    }
}
