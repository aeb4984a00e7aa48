use std::sync::Arc;
use thiserror::Error;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Error, Debug)]
pub enum PoolError {
    /// No usable concurrency primitive; the scheduler runs sequentially.
    #[error("concurrency unavailable: {0}")]
    ConcurrencyUnavailable(String),

    /// A single submission was refused. The task is dropped unrun.
    #[error("task submission rejected: {0}")]
    Rejected(String),
}

/// A bounded set of OS worker threads.
///
/// Implementations either run a submitted task exactly once or drop it; the
/// scheduler relies on that to account for every file.
pub trait WorkerPool: Send + Sync {
    fn size(&self) -> usize;
    fn submit(&self, task: Task) -> Result<(), PoolError>;
}

pub trait PoolFactory: Send + Sync {
    fn build(&self, workers: usize) -> Result<Arc<dyn WorkerPool>, PoolError>;
}

pub struct RayonPool {
    pool: rayon::ThreadPool,
    size: usize,
}

impl RayonPool {
    pub fn new(workers: usize) -> Result<Self, PoolError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("provenance-worker-{}", i))
            .build()
            .map_err(|e| PoolError::ConcurrencyUnavailable(e.to_string()))?;
        Ok(Self {
            size: pool.current_num_threads(),
            pool,
        })
    }
}

impl WorkerPool for RayonPool {
    fn size(&self) -> usize {
        self.size
    }

    fn submit(&self, task: Task) -> Result<(), PoolError> {
        self.pool.spawn(task);
        Ok(())
    }
}

pub struct RayonPoolFactory;

impl PoolFactory for RayonPoolFactory {
    fn build(&self, workers: usize) -> Result<Arc<dyn WorkerPool>, PoolError> {
        Ok(Arc::new(RayonPool::new(workers)?))
    }
}
