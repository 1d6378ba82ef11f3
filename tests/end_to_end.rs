//! Full-`Logger` end-to-end scenarios (spec.md §8's seed tests S1-S5; S6
//! lives alongside the descaler in `src/descale.rs`'s own unit tests).
//!
//! Plain `#[test]` functions, no special harness, matching the style of
//! the teacher's own integration-test directories
//! (`kaos-test-support/tests/*.rs`).

use fluxlog::{ErrorPolicy, LogError, LoggerBuilder, OutputBuffer, Writer};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

struct Echo(Vec<u8>);

impl fluxlog::dispatch::Loggable for Echo {
    fn format(&self, output: &mut OutputBuffer) -> Result<(), LogError> {
        output.write_bytes(&self.0)
    }
}

#[derive(Default)]
struct SharedVecWriter(Arc<Mutex<Vec<u8>>>);

impl Writer for SharedVecWriter {
    fn write(&mut self, bytes: &[u8]) -> Result<(), fluxlog::error::WriteError> {
        self.0.lock().unwrap().extend_from_slice(bytes);
        Ok(())
    }
}

/// S1: one thread logs `hello\n` through a copying formatter; the writer
/// receives exactly those bytes.
#[test]
fn s1_single_thread_single_record_round_trips_exactly() {
    let sink = Arc::new(Mutex::new(Vec::new()));
    let mut logger = LoggerBuilder::new().open(Box::new(SharedVecWriter(sink.clone()))).unwrap();
    logger.log(Echo(b"hello\n".to_vec()));
    logger.close();
    assert_eq!(&*sink.lock().unwrap(), b"hello\n");
}

/// S2: two threads each log 1,000 16-byte frames; the writer receives all
/// 32,000 bytes, and every frame survives intact (no cross-thread tearing).
#[test]
fn s2_two_producer_threads_interleave_without_tearing_frames() {
    let sink = Arc::new(Mutex::new(Vec::new()));
    let logger = Arc::new(LoggerBuilder::new().open(Box::new(SharedVecWriter(sink.clone()))).unwrap());

    let make_producer = |tag: u8| {
        let logger = logger.clone();
        thread::spawn(move || {
            for i in 0..1000u32 {
                let mut payload = vec![tag; 16];
                payload[0..4].copy_from_slice(&i.to_le_bytes());
                logger.log(Echo(payload));
            }
        })
    };
    let t1 = make_producer(0xAA);
    let t2 = make_producer(0xBB);
    t1.join().unwrap();
    t2.join().unwrap();

    Arc::try_unwrap(logger).map_err(|_| ()).expect("no other Arc handles remain").close();

    let bytes = sink.lock().unwrap();
    assert_eq!(bytes.len(), 32_000);
    for chunk in bytes.chunks(16) {
        // Every 16-byte frame is internally consistent: bytes 4..16 all
        // carry the same tag this frame's producer stamped them with.
        let tag = chunk[4];
        assert!(chunk[4..].iter().all(|&b| b == tag));
        assert!(tag == 0xAA || tag == 0xBB);
    }
}

/// S3: a 128-byte record against a 64-byte output buffer triggers exactly
/// one excessive-output-by-frame report; the writer receives no bytes from
/// that frame.
#[test]
fn s3_oversized_frame_reports_excessive_output_and_emits_nothing() {
    let sink = Arc::new(Mutex::new(Vec::new()));
    let reports = Arc::new(AtomicUsize::new(0));
    let reports_clone = reports.clone();
    let mut logger = LoggerBuilder::new()
        .with_output_buffer_capacity(64)
        .with_flush_error_callback(Box::new(move |_code, _count| {
            reports_clone.fetch_add(1, Ordering::SeqCst);
        }))
        .open(Box::new(SharedVecWriter(sink.clone())))
        .unwrap();
    logger.log(Echo(vec![b'z'; 128]));
    logger.close();
    assert_eq!(reports.load(Ordering::SeqCst), 1);
    assert!(sink.lock().unwrap().is_empty());
}

struct FlippableWriter {
    failing: Arc<AtomicBool>,
    inner: Arc<Mutex<Vec<u8>>>,
}

impl Writer for FlippableWriter {
    fn write(&mut self, bytes: &[u8]) -> Result<(), fluxlog::error::WriteError> {
        if self.failing.load(Ordering::Acquire) {
            return Err(fluxlog::error::WriteError::temporary(99));
        }
        self.inner.lock().unwrap().extend_from_slice(bytes);
        Ok(())
    }
}

/// S4: the writer always reports a temporary error under `BLOCK`; logging
/// one frame and then closing after the writer recovers still delivers the
/// frame.
#[test]
fn s4_block_policy_delivers_once_the_writer_recovers() {
    let failing = Arc::new(AtomicBool::new(true));
    let sink = Arc::new(Mutex::new(Vec::new()));
    let mut logger = LoggerBuilder::new()
        .with_temporary_error_policy(ErrorPolicy::Block)
        .open(Box::new(FlippableWriter { failing: failing.clone(), inner: sink.clone() }))
        .unwrap();
    logger.log(Echo(b"hello\n".to_vec()));
    thread::sleep(std::time::Duration::from_millis(50));
    failing.store(false, Ordering::Release);
    logger.close();
    assert_eq!(&*sink.lock().unwrap(), b"hello\n");
}

struct AlwaysPermanentFailingWriter;

impl Writer for AlwaysPermanentFailingWriter {
    fn write(&mut self, _bytes: &[u8]) -> Result<(), fluxlog::error::WriteError> {
        Err(fluxlog::error::WriteError::permanent(13))
    }
}

/// S5: the writer always reports a permanent error under `IGNORE`; logging
/// 10 frames then closing yields zero bytes and a lost-record count of 10.
#[test]
fn s5_ignore_policy_drops_all_frames_and_reports_total_loss() {
    let reported = Arc::new(Mutex::new(None));
    let reported_clone = reported.clone();
    let mut logger = LoggerBuilder::new()
        .with_permanent_error_policy(ErrorPolicy::Ignore)
        .with_flush_error_callback(Box::new(move |code, count| {
            *reported_clone.lock().unwrap() = Some((code, count));
        }))
        .open(Box::new(AlwaysPermanentFailingWriter))
        .unwrap();
    for _ in 0..10 {
        logger.log(Echo(b"x".to_vec()));
    }
    logger.close();
    assert_eq!(*reported.lock().unwrap(), Some((13, 10)));
}

/// Invariant 5: after `close()` returns, the shared queue is empty and no
/// worker thread remains alive (observed indirectly: a second `close()` is
/// a no-op rather than hanging or panicking).
#[test]
fn close_is_idempotent_and_leaves_no_worker_running() {
    let sink = Arc::new(Mutex::new(Vec::new()));
    let mut logger = LoggerBuilder::new().open(Box::new(SharedVecWriter(sink.clone()))).unwrap();
    logger.log(Echo(b"once\n".to_vec()));
    logger.close();
    logger.close();
    assert_eq!(&*sink.lock().unwrap(), b"once\n");
}

/// `panic_flush` flushes whatever is buffered and leaves the worker parked;
/// any logging attempted after it produces no further bytes.
#[test]
fn panic_flush_then_further_logging_produces_no_more_bytes() {
    let sink = Arc::new(Mutex::new(Vec::new()));
    let logger = LoggerBuilder::new().open(Box::new(SharedVecWriter(sink.clone()))).unwrap();
    logger.log(Echo(b"before\n".to_vec()));
    // Panic-flush only flushes what the worker has already formatted into
    // the output buffer, not whatever is still sitting in the commit queue
    // (spec.md §4.4.4 is explicitly best-effort here) — give the worker a
    // moment to drain the queue before triggering it.
    thread::sleep(std::time::Duration::from_millis(20));
    logger.panic_flush();
    assert_eq!(&*sink.lock().unwrap(), b"before\n");
    // The worker is parked forever; further `log` calls queue into a
    // buffer nothing will ever drain. No assertion beyond "doesn't panic".
    logger.log(Echo(b"after\n".to_vec()));
    assert_eq!(&*sink.lock().unwrap(), b"before\n");
    // The worker thread is parked forever, exactly as spec'd for this path
    // (the process is assumed to be crashing); dropping `logger` normally
    // would hang joining it in `close`, so leak it instead, same as a real
    // crash would never run `Drop` either.
    std::mem::forget(logger);
}
