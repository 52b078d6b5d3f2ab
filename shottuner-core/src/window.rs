//! Fixed-Size Sample Window for Rolling Statistics
//!
//! ## Overview
//!
//! The shot validator needs a rolling mean and standard deviation of recent
//! distance readings to reject statistical outliers. This module provides a
//! fixed-capacity ring buffer of `f64` samples with those statistics
//! computed over whatever the window currently holds.
//!
//! ## Design Rationale
//!
//! A ring buffer fits the outlier-gate use case exactly:
//! - O(1) insertion, overwriting the oldest sample when full (recent
//!   shots matter, old ones do not)
//! - bounded memory with a compile-time capacity
//! - the window is tiny (default 32 samples), so `mean`/`std_dev` just
//!   iterate rather than maintaining incremental sums that can drift
//!
//! The window is cleared at every coefficient phase boundary so statistics
//! from one coefficient's shots never influence the next coefficient's
//! outlier gate.

/// Fixed-capacity ring buffer of samples with rolling statistics
///
/// `N` is the window capacity. Pushing into a full window overwrites the
/// oldest sample.
#[derive(Debug, Clone)]
pub struct SampleWindow<const N: usize> {
    data: [f64; N],
    write_pos: usize,
    len: usize,
}

impl<const N: usize> SampleWindow<N> {
    /// Create an empty window
    pub const fn new() -> Self {
        Self {
            data: [0.0; N],
            write_pos: 0,
            len: 0,
        }
    }

    /// Add a sample, overwriting the oldest when full
    pub fn push(&mut self, sample: f64) {
        self.data[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % N;

        if self.len < N {
            self.len += 1;
        }
    }

    /// Number of samples currently held
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the window holds no samples
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drop all samples
    pub fn clear(&mut self) {
        self.write_pos = 0;
        self.len = 0;
    }

    /// Mean of the held samples, `None` when empty
    pub fn mean(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }

        // Before the first wraparound the live samples are the first `len`
        // slots; after it every slot is live and `len == N`. Either way the
        // first `len` slots are exactly the window contents.
        let live = &self.data[..self.len];
        Some(live.iter().sum::<f64>() / self.len as f64)
    }

    /// Population standard deviation over the window, `None` when empty
    pub fn std_dev(&self) -> Option<f64> {
        let mean = self.mean()?;
        let live = &self.data[..self.len];
        let var = live.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / self.len as f64;
        Some(var.sqrt())
    }
}

impl<const N: usize> Default for SampleWindow<N> {
    fn default() -> Self {
        Self::new()
    }
}
