//! Membership Module
//!
//! The population eligible for fortunes: followers of the labeler account,
//! fetched page by page from the social graph.

pub mod bsky;
pub mod notifications;

pub use bsky::BskyClient;
pub use notifications::NotificationPoller;

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

use crate::error::Result;
use crate::fortune::Identity;

/// One page of members.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembersPage {
    pub identities: Vec<Identity>,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait MembershipProvider: Send + Sync {
    async fn fetch_members_page(&self, cursor: Option<&str>) -> Result<MembersPage>;
}

/// Page through `provider` until the cursor runs out.
///
/// Any page error aborts the whole fetch: a truncated membership would
/// wrongly remove members that were simply not reached.
pub async fn fetch_all_members(
    provider: &dyn MembershipProvider,
    page_delay: Duration,
) -> Result<BTreeSet<Identity>> {
    let mut members = BTreeSet::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = provider.fetch_members_page(cursor.as_deref()).await?;
        pages += 1;
        members.extend(page.identities);

        match page.next_cursor {
            Some(next) if !next.is_empty() => cursor = Some(next),
            _ => break,
        }
        if !page_delay.is_zero() {
            tokio::time::sleep(page_delay).await;
        }
    }

    debug!(pages, members = members.len(), "Membership fetch complete");
    Ok(members)
}
