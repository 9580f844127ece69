use std::collections::HashSet;

use log::debug;

use crate::error::{BuildEventsError, Result};
use crate::providers::ProviderApi;

use super::types::{BuildInfo, Job};

/// Pulls complete job snapshots out of a [`ProviderApi`], following every page.
pub struct SnapshotFetcher<P> {
    client: P,
}

impl<P: ProviderApi> SnapshotFetcher<P> {
    pub fn new(client: P) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &P {
        &self.client
    }

    pub async fn fetch_build(&self, locator: &P::Locator) -> Result<BuildInfo> {
        self.client.get_build(locator).await
    }

    /// Fetches every job of the build. A failure on any page fails the whole
    /// snapshot; callers never see a partial job list. A cursor seen earlier
    /// in the same snapshot is an error.
    pub async fn fetch_jobs(&self, locator: &P::Locator) -> Result<Vec<Job>> {
        let mut all_jobs = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen: HashSet<String> = HashSet::new();

        loop {
            let page = self.client.list_jobs(locator, cursor.as_deref()).await?;
            all_jobs.extend(page.jobs);

            let next = page.next_page_token.filter(|token| !token.is_empty());
            match next {
                None => break,
                Some(token) if !seen.insert(token.clone()) => {
                    return Err(BuildEventsError::Pagination(format!(
                        "cursor {token} repeated while listing jobs for {locator}"
                    )));
                }
                Some(token) => {
                    debug!("Fetching next page of jobs for {locator}: {token}");
                    cursor = Some(token);
                }
            }
        }

        Ok(all_jobs)
    }
}
