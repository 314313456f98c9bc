use std::collections::HashSet;

use jobscout_core::JobPosting;
use tracing::debug;

pub trait DedupHook: Send + Sync {
    /// Returns the part of `batch` to append to `existing`, in batch order.
    fn apply(&self, batch: Vec<JobPosting>, existing: &[JobPosting]) -> Vec<JobPosting>;
}

/// Used when `settings.dedupe` is off; duplicates may then coexist.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDedupHook;

impl DedupHook for NoopDedupHook {
    fn apply(&self, batch: Vec<JobPosting>, _existing: &[JobPosting]) -> Vec<JobPosting> {
        batch
    }
}

/// Drops postings whose id is already in the collection, or earlier in the same batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdDedupEngine;

impl DedupHook for IdDedupEngine {
    fn apply(&self, batch: Vec<JobPosting>, existing: &[JobPosting]) -> Vec<JobPosting> {
        let mut seen: HashSet<String> = existing.iter().map(|p| p.id.clone()).collect();
        let incoming = batch.len();
        let fresh: Vec<JobPosting> = batch
            .into_iter()
            .filter(|posting| seen.insert(posting.id.clone()))
            .collect();
        debug!(incoming, fresh = fresh.len(), "dedup applied");
        fresh
    }
}
