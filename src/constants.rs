//! Engine-wide constants.
//!
//! Mirrors the defaults `basic_log::open` falls back to when the caller
//! passes `0` for a size: two disk sectors for the byte buffers, and
//! `page_size / size_of::<CommitExtent>()` for the queue.

/// Default output buffer capacity in bytes (two typical 4 KiB disk sectors).
pub const DEFAULT_OUTPUT_BUFFER_CAPACITY: usize = 8192;

/// Default thread-local input buffer capacity in bytes.
pub const DEFAULT_INPUT_BUFFER_CAPACITY: usize = 8192;

/// Upper bound the queue-drain backoff in [`crate::worker`] will spin up to.
pub const MAX_BACKOFF_MS: u64 = 1000;

/// Starting point for the queue-drain exponential backoff.
pub const INITIAL_BACKOFF_MS: u64 = 0;

/// Typical page size, used only to size the default commit queue capacity
/// (`page_size / size_of::<CommitExtent>()`); not queried from the OS, same
/// as the teacher's own constant of this name.
pub const PAGE_SIZE: usize = 4096;

/// A synthetic writer error code attached to the flush-error callback when
/// reporting an excessive-output-by-frame loss, which never reaches the
/// writer itself.
pub const EXCESSIVE_OUTPUT_SYNTHETIC_CODE: i32 = -1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_two_disk_sectors() {
        assert_eq!(DEFAULT_OUTPUT_BUFFER_CAPACITY, 8192);
        assert_eq!(DEFAULT_INPUT_BUFFER_CAPACITY, 8192);
    }

    #[test]
    fn backoff_cap_is_one_second() {
        assert_eq!(MAX_BACKOFF_MS, 1000);
    }
}
