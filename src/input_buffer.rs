//! The thread-local input ring buffer each producing thread writes frames
//! into (spec.md §3/§4.1, "ThreadInputBuffer").
//!
//! Unlike the teacher's `RingBuffer<T>` (`flux/src/disruptor/spsc/ring_buffer.rs`),
//! which indexes a slice of typed slots with a power-of-two mask, this ring
//! holds raw bytes and represents wraparound explicitly: a reserved
//! `WRAPAROUND_MARKER` handle is written at the current write position and
//! the write cursor restarts at offset 0, matching
//! `reckless`'s `thread_input_buffer` rather than a modulo-indexed ring.
//!
//! `read_index` is consumer-owned, `write_index` producer-owned; the two
//! sides share one allocation through `UnsafeCell`, safe only because the
//! spec's own concurrency model restricts each buffer to exactly one
//! producer and one consumer (spec.md §5, "each `ThreadInputBuffer` has one
//! producer ... and one consumer").

use crate::dispatch::DispatchHandle;
use crate::error::LogError;
use crate::signal::EventSignal;
use std::cell::{Cell, UnsafeCell};
use std::mem::size_of;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

const HANDLE_SIZE: usize = size_of::<DispatchHandle>();

/// A thread-local ring of bytes holding serialized frames, shared between
/// the owning producer thread and the consumer worker via `Arc`.
///
/// The backing allocation is `capacity + HANDLE_SIZE` bytes: the extra
/// `HANDLE_SIZE` bytes are padding past the logical `capacity` boundary so a
/// wraparound marker can always be written at any write position strictly
/// less than `capacity`, even one within the last `HANDLE_SIZE` bytes of the
/// ring, without touching the not-yet-read region at the front.
pub struct InputBuffer {
    buffer: UnsafeCell<Box<[u8]>>,
    capacity: usize,
    read_index: AtomicUsize,
    write_index: Cell<usize>,
    input_consumed_event: EventSignal,
    input_consumed_flag: AtomicBool,
    queue_full_event: Arc<EventSignal>,
}

// SAFETY: `buffer` is written only by the single owning producer thread
// (via `reserve`/`commit`) and read only by the single consumer thread (via
// `handle_at`/`payload_ptr_at`), with the two never touching overlapping
// bytes by the blocking protocol `reserve` enforces against `read_index`.
// `write_index` (a `Cell`) is touched only by the producer thread.
unsafe impl Sync for InputBuffer {}

impl InputBuffer {
    /// Create a new input buffer of the given logical capacity.
    pub fn new(capacity: usize, queue_full_event: Arc<EventSignal>) -> Arc<Self> {
        Arc::new(Self {
            buffer: UnsafeCell::new(vec![0u8; capacity + HANDLE_SIZE].into_boxed_slice()),
            capacity,
            read_index: AtomicUsize::new(0),
            write_index: Cell::new(0),
            input_consumed_event: EventSignal::new(),
            input_consumed_flag: AtomicBool::new(false),
            queue_full_event,
        })
    }

    /// Logical capacity in bytes (excluding the wraparound-marker padding).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn buffer_ptr(&self) -> *mut u8 {
        unsafe { (*self.buffer.get()).as_mut_ptr() }
    }

    // Sound only under this type's single-producer contract: every live
    // `&mut [u8]` this hands out aliases a region only the owning producer
    // thread ever writes, and `reserve`'s own fullness check keeps it clear
    // of whatever the consumer currently owns.
    #[allow(clippy::mut_from_ref)]
    fn slice_at(&self, offset: usize, len: usize) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.buffer_ptr().add(offset), len) }
    }

    fn write_marker_at(&self, offset: usize) {
        unsafe {
            (self.buffer_ptr().add(offset) as *mut DispatchHandle)
                .write_unaligned(DispatchHandle::WRAPAROUND_MARKER);
        }
    }

    /// Reserve `frame_size` writable bytes (handle word included), blocking
    /// until the ring has room. Producer-only.
    ///
    /// Fails permanently with [`LogError::FrameTooLarge`] if `frame_size`
    /// could never fit even in a freshly drained ring.
    pub fn reserve(&self, frame_size: usize) -> Result<&mut [u8], LogError> {
        let max_frame = self.capacity - HANDLE_SIZE;
        if frame_size > max_frame {
            return Err(LogError::FrameTooLarge { frame_size, max: max_frame });
        }
        loop {
            let read = self.read_index.load(Ordering::Acquire);
            let write = self.write_index.get();

            if write >= read {
                let tail_room = self.capacity - write;
                if frame_size <= tail_room {
                    return Ok(self.slice_at(write, frame_size));
                }
                if frame_size < read {
                    self.write_marker_at(write);
                    self.write_index.set(0);
                    return Ok(self.slice_at(0, frame_size));
                }
            } else {
                let room = read - write;
                if frame_size < room {
                    return Ok(self.slice_at(write, frame_size));
                }
            }

            self.queue_full_event.signal();
            self.input_consumed_event.wait(0);
        }
    }

    /// Advance the write cursor by `frame_size`. Must follow a matching
    /// `reserve`. Producer-only.
    pub fn commit(&self, frame_size: usize) {
        self.write_index.set(self.write_index.get() + frame_size);
    }

    /// The producer's current write offset, for building the
    /// [`crate::queue::CommitExtent`] that follows a `commit`. Producer-only.
    pub fn write_offset(&self) -> usize {
        self.write_index.get()
    }

    /// The consumer's current read offset. Consumer-only.
    pub fn read_offset(&self) -> usize {
        self.read_index.load(Ordering::Relaxed)
    }

    /// Read the handle word at `offset` without disturbing either cursor.
    /// Consumer-only.
    ///
    /// # Safety
    /// `offset` must be a live frame boundary previously returned by
    /// `read_offset`, `discard_input_frame`, or `wraparound`.
    pub unsafe fn handle_at(&self, offset: usize) -> DispatchHandle {
        unsafe { (self.buffer_ptr().add(offset) as *const DispatchHandle).read_unaligned() }
    }

    /// Pointer to the payload bytes following the handle word at `offset`.
    /// Consumer-only.
    pub fn payload_ptr_at(&self, offset: usize) -> *mut u8 {
        unsafe { self.buffer_ptr().add(offset + HANDLE_SIZE) }
    }

    /// Advance `read_index` by `n` (the frame size `DESTROY` reported) and
    /// return the new offset. Consumer-only.
    pub fn discard_input_frame(&self, n: usize) -> usize {
        let new_read = self.read_index.load(Ordering::Relaxed) + n;
        self.read_index.store(new_read, Ordering::Release);
        new_read
    }

    /// Consume a `WRAPAROUND_MARKER`: reset `read_index` to 0 and return it.
    /// Consumer-only.
    pub fn wraparound(&self) -> usize {
        self.read_index.store(0, Ordering::Release);
        0
    }

    /// Wake a producer blocked in `reserve` due to fullness.
    pub fn signal_input_consumed(&self) {
        self.input_consumed_event.signal();
    }

    /// Mark this buffer touched during the current drain round. Returns
    /// `true` the first time it's called since the flag was last cleared —
    /// the signal for "add this buffer to the touched set now" (spec.md
    /// §4.4.3's dedup-by-flag rule).
    pub fn mark_touched(&self) -> bool {
        self.input_consumed_flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Clear the touched flag at the end of a drain round.
    pub fn clear_touched(&self) {
        self.input_consumed_flag.store(false, Ordering::Relaxed);
    }
}
