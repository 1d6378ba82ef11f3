//! The formatter dispatch handle: the opaque first-class value stored at
//! the start of every input frame (spec.md §3, "Formatter dispatch
//! handle").
//!
//! Rather than a trait object (two words: vtable pointer + data pointer),
//! the handle is a single function pointer, monomorphized per payload type
//! `T` via [`handle_for`] — the frame format reserves exactly one handle
//! word, matching the teacher's habit (`flux/src/disruptor/mod.rs`'s
//! `RingBufferEntry` trait) of picking the representation that keeps the
//! hot-path frame layout fixed-size and branch-free.

use crate::error::LogError;
use crate::output_buffer::OutputBuffer;
use std::any::TypeId;

/// The operation a call through a [`DispatchFn`] should perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOp {
    /// Format the payload and append the result to the output buffer.
    Apply,
    /// Release any resources the payload owns and report the frame size.
    Destroy,
    /// Report a stable description of the payload's source type.
    GetTypeId,
}

/// A stable, comparable description of a payload's source type, reported
/// only when a formatter error needs to be attributed to a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeDescriptor {
    /// The payload type's name, for diagnostics.
    pub name: &'static str,
    /// A stable identity for the payload type.
    pub id: TypeId,
}

/// The value produced by invoking a [`DispatchFn`] for a given [`DispatchOp`].
pub enum DispatchResult {
    /// Result of [`DispatchOp::Apply`]. A [`LogError::Format`] means the
    /// formatter itself failed; any other variant means the output buffer's
    /// `reserve` propagated an excessive-output or flush failure through the
    /// formatter's `?` the same way it would propagate to any caller.
    Applied(Result<(), LogError>),
    /// Result of [`DispatchOp::Destroy`]: the frame size in bytes, handle
    /// prefix included, so the consumer can advance `read_index`.
    Destroyed(usize),
    /// Result of [`DispatchOp::GetTypeId`].
    TypeId(TypeDescriptor),
}

/// The three-way dispatch function stored in every frame's handle word.
///
/// # Safety
///
/// `payload` must point to a live, correctly-aligned value of the type this
/// function pointer was monomorphized for ([`handle_for`]), except after a
/// successful `Destroy` call, after which it must not be dereferenced again.
pub type DispatchFn = unsafe fn(DispatchOp, &mut OutputBuffer, *mut u8) -> DispatchResult;

/// The formatter dispatch handle placed at the head of every frame.
///
/// `WRAPAROUND_MARKER` is the one reserved value (`None`) that is not a
/// valid handle otherwise — it must never be produced by [`handle_for`].
#[repr(transparent)]
#[derive(Clone, Copy)]
pub struct DispatchHandle(pub(crate) Option<DispatchFn>);

impl DispatchHandle {
    /// The reserved sentinel written at the ring's current write position
    /// when a frame must wrap around to offset 0.
    pub const WRAPAROUND_MARKER: DispatchHandle = DispatchHandle(None);

    /// Whether this handle is the wraparound sentinel rather than a real
    /// dispatch function.
    pub fn is_wraparound_marker(&self) -> bool {
        self.0.is_none()
    }

    /// Invoke the handle's dispatch function.
    ///
    /// # Safety
    ///
    /// See [`DispatchFn`]; `self` must not be [`Self::WRAPAROUND_MARKER`].
    pub unsafe fn call(
        &self,
        op: DispatchOp,
        output: &mut OutputBuffer,
        payload: *mut u8,
    ) -> DispatchResult {
        let dispatch_fn = self.0.expect("call() on WRAPAROUND_MARKER");
        unsafe { dispatch_fn(op, output, payload) }
    }
}

/// A payload type that knows how to format itself into an [`OutputBuffer`].
///
/// External formatter implementations for concrete types are out of this
/// crate's scope (spec.md §1); this trait is the seam they would implement
/// against.
pub trait Loggable: Send + 'static {
    /// Format `self` and append the result to `output`. Propagate
    /// [`OutputBuffer`] failures with `?`; return `Err(LogError::Format(..))`
    /// for a failure in the formatting logic itself.
    fn format(&self, output: &mut OutputBuffer) -> Result<(), LogError>;
}

unsafe fn dispatch_impl<T: Loggable>(
    op: DispatchOp,
    output: &mut OutputBuffer,
    payload: *mut u8,
) -> DispatchResult {
    match op {
        DispatchOp::Apply => {
            // The payload's address is `frame_start + size_of::<DispatchHandle>()`,
            // and `frame_start` is a running sum of prior frames' sizes, so it
            // carries no alignment guarantee beyond 1 — read it unaligned into
            // an owned value rather than dereferencing a `&T` in place.
            let value = unsafe { (payload as *const T).read_unaligned() };
            let result = value.format(output);
            std::mem::forget(value);
            DispatchResult::Applied(result)
        }
        DispatchOp::Destroy => {
            let value = unsafe { (payload as *const T).read_unaligned() };
            drop(value);
            DispatchResult::Destroyed(frame_size::<T>())
        }
        DispatchOp::GetTypeId => DispatchResult::TypeId(TypeDescriptor {
            name: std::any::type_name::<T>(),
            id: TypeId::of::<T>(),
        }),
    }
}

/// Total bytes a frame carrying a `T` payload occupies, handle word
/// included — what a producer must request from
/// [`crate::input_buffer::InputBuffer::reserve`].
pub const fn frame_size<T>() -> usize {
    std::mem::size_of::<DispatchHandle>() + std::mem::size_of::<T>()
}

/// Build the dispatch handle for payloads of type `T`.
pub fn handle_for<T: Loggable>() -> DispatchHandle {
    DispatchHandle(Some(dispatch_impl::<T> as DispatchFn))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::VecWriter;

    struct Greeting(&'static str);

    impl Loggable for Greeting {
        fn format(&self, output: &mut OutputBuffer) -> Result<(), LogError> {
            output.write_bytes(self.0.as_bytes())
        }
    }

    #[test]
    fn wraparound_marker_is_not_a_valid_handle() {
        assert!(DispatchHandle::WRAPAROUND_MARKER.is_wraparound_marker());
        let handle = handle_for::<Greeting>();
        assert!(!handle.is_wraparound_marker());
    }

    #[test]
    fn apply_then_destroy_round_trip() {
        let handle = handle_for::<Greeting>();
        let mut value = Greeting("hi");
        let mut output = OutputBuffer::new(64, Box::new(VecWriter::new()));
        let payload = &mut value as *mut Greeting as *mut u8;
        unsafe {
            match handle.call(DispatchOp::Apply, &mut output, payload) {
                DispatchResult::Applied(Ok(())) => {}
                _ => panic!("expected Applied(Ok(()))"),
            }
            match handle.call(DispatchOp::GetTypeId, &mut output, payload) {
                DispatchResult::TypeId(desc) => assert_eq!(desc.id, TypeId::of::<Greeting>()),
                _ => panic!("expected TypeId"),
            }
            match handle.call(DispatchOp::Destroy, &mut output, payload) {
                DispatchResult::Destroyed(size) => assert_eq!(size, frame_size::<Greeting>()),
                _ => panic!("expected Destroyed"),
            }
        }
    }
}
