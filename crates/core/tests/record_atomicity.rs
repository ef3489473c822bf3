//! Concurrent readers must never observe a torn runtime record.
//!
//! The pool's status endpoints and the external scheduler both read the
//! record file while the supervisor is still rewriting it; atomic
//! replace guarantees every read parses as a complete document.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cuebridge_core::record::{TaskRuntimeRecord, TaskStatus};

#[test]
fn concurrent_reads_always_see_complete_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("task_0.runtime.json");

    // Seed an initial record so readers never hit a missing file.
    let mut record = TaskRuntimeRecord::begin("job-race", 0, "raw.log".into(), "ev.jsonl".into());
    record.write(&path).unwrap();

    let stop = Arc::new(AtomicBool::new(false));

    let writer = {
        let path = path.clone();
        let stop = stop.clone();
        std::thread::spawn(move || {
            let mut iterations = 0u32;
            while !stop.load(Ordering::Relaxed) {
                // Alternate between a running and a finalized document so
                // the content length varies between writes.
                let mut record = TaskRuntimeRecord::begin(
                    "job-race",
                    0,
                    "raw.log".into(),
                    "ev.jsonl".into(),
                );
                record.pid = Some(iterations);
                if iterations % 2 == 0 {
                    record.finish(
                        TaskStatus::Failed,
                        Some(1),
                        Some(format!("iteration {iterations}")),
                    );
                }
                record.write(&path).unwrap();
                iterations += 1;
            }
            iterations
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let path = path.clone();
            let stop = stop.clone();
            std::thread::spawn(move || {
                let mut reads = 0u32;
                while !stop.load(Ordering::Relaxed) {
                    let record = TaskRuntimeRecord::read(&path)
                        .expect("reader observed a torn or missing record");
                    assert_eq!(record.job_id, "job-race");
                    reads += 1;
                }
                reads
            })
        })
        .collect();

    std::thread::sleep(Duration::from_millis(500));
    stop.store(true, Ordering::Relaxed);

    let writes = writer.join().unwrap();
    let total_reads: u32 = readers.into_iter().map(|r| r.join().unwrap()).sum();

    // Sanity: both sides actually contended.
    assert!(writes > 10, "writer barely ran ({writes} writes)");
    assert!(total_reads > 10, "readers barely ran ({total_reads} reads)");
}
