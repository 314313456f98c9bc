use chrono::{DateTime, Duration, Utc};
use jobscout_core::JobPosting;
use tracing::debug;

/// Ages out postings by `scraped_at`. Postings whose timestamp cannot be parsed are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionFilter {
    max_age_days: Option<u32>,
}

impl RetentionFilter {
    /// `None` or `Some(0)` disables retention.
    pub fn new(max_age_days: Option<u32>) -> Self {
        Self {
            max_age_days: max_age_days.filter(|days| *days > 0),
        }
    }

    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let days = self.max_age_days?;
        now.checked_sub_signed(Duration::days(i64::from(days)))
    }

    pub fn apply(&self, postings: Vec<JobPosting>, now: DateTime<Utc>) -> Vec<JobPosting> {
        let Some(cutoff) = self.cutoff(now) else {
            return postings;
        };
        let before = postings.len();
        let kept: Vec<JobPosting> = postings
            .into_iter()
            .filter(|posting| match posting.scraped_at_time() {
                Some(scraped_at) => scraped_at > cutoff,
                None => true,
            })
            .collect();
        debug!(%cutoff, removed = before - kept.len(), "retention applied");
        kept
    }
}

/// Postings scraped within the last `hours` hours.
pub fn recent_postings(postings: &[JobPosting], hours: i64, now: DateTime<Utc>) -> Vec<&JobPosting> {
    let Some(since) = now.checked_sub_signed(Duration::hours(hours)) else {
        return postings.iter().collect();
    };
    postings
        .iter()
        .filter(|posting| posting.scraped_at_time().is_some_and(|ts| ts > since))
        .collect()
}
