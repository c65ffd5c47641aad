use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::TrafficResult;

/// Fixed-size worker pool every frame runs on. One thread means serial
/// execution.
#[derive(Debug)]
pub struct WorkerPool {
    pool: ThreadPool,
    threads: usize,
}

impl WorkerPool {
    pub fn serial() -> TrafficResult<Self> {
        Self::with_threads(1)
    }

    pub fn with_threads(threads: usize) -> TrafficResult<Self> {
        let threads = threads.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("traffic-worker-{}", i))
            .build()?;
        Ok(Self { pool, threads })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn is_parallel(&self) -> bool {
        self.threads > 1
    }

    /// Runs `op` inside the pool so nested rayon work stays on its threads.
    pub fn install<R, F>(&self, op: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        self.pool.install(op)
    }
}
