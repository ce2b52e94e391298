//! Collaborators that act on an accepted posting after it is stored.

use anyhow::Result;
use tracing::info;

use crate::browser::Browser;
use crate::models::{OutreachProfile, StoredJob};

/// Announces an accepted posting. The return value is only logged.
pub trait Notifier {
    fn notify(&self, job: &StoredJob, profiles: &[OutreachProfile]) -> bool;
}

/// Writes accepted postings to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, job: &StoredJob, profiles: &[OutreachProfile]) -> bool {
        info!(
            posting_id = %job.posting_id,
            title = %job.title,
            company = %job.company,
            score = job.match_score,
            url = %job.job_url,
            contacts = profiles.len(),
            "new match"
        );
        true
    }
}

/// Finds people worth contacting about a posting. Runs on the pipeline's
/// browser session and may leave it on another page.
pub trait OutreachFinder<B: Browser> {
    fn find(&self, browser: &mut B, job: &StoredJob) -> Result<Vec<OutreachProfile>>;
}

/// Outreach disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOutreach;

impl<B: Browser> OutreachFinder<B> for NoOutreach {
    fn find(&self, _browser: &mut B, _job: &StoredJob) -> Result<Vec<OutreachProfile>> {
        Ok(Vec::new())
    }
}
