use thiserror::Error;

/// Typed failures raised while building the road network or standing up the
/// worker pool. Nothing in the per-frame pipeline produces these.
#[derive(Debug, Error)]
pub enum TrafficError {
    #[error("path '{0}' needs at least two nodes")]
    PathTooShort(String),

    #[error("path '{path}' section {section} has zero arc length")]
    DegenerateSection { path: String, section: usize },

    #[error("worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

pub type TrafficResult<T> = Result<T, TrafficError>;
