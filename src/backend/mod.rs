//! Execution backend dispatcher for frontier expansion
//!
//! Expanding a level costs roughly one pass over the matched rows of every
//! parent combination. Small levels run on the calling thread; large ones are
//! split across the rayon pool when the `rayon` feature is enabled.

/// Minimum estimated work (parents plus matched rows) before going parallel
pub const PARALLEL_WORK_THRESHOLD: usize = 1 << 16;

/// Backend used to expand one level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Expand parents one after another on the calling thread
    Sequential,
    /// Expand parents on the rayon thread pool
    Parallel,
}

/// Cost-based backend selection
pub struct BackendDispatcher {
    _private: (),
}

impl BackendDispatcher {
    /// Select a backend from the level size and the rows it will scan
    ///
    /// # Arguments
    /// * `frontier_len` - Number of parent combinations to expand
    /// * `matched_rows` - Total matched rows across those parents
    #[must_use]
    pub const fn select(frontier_len: usize, matched_rows: usize) -> Backend {
        if cfg!(feature = "rayon")
            && frontier_len > 1
            && frontier_len.saturating_add(matched_rows) >= PARALLEL_WORK_THRESHOLD
        {
            Backend::Parallel
        } else {
            Backend::Sequential
        }
    }
}
