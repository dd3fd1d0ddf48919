//! Browser-side half of the poll, without the DOM.
//!
//! [`widget::PollWidget`] runs the vote state machine and produces a
//! [`widget::PollView`] for whatever draws the bars. Tallies come from a
//! [`TallyBackend`]:
//!
//! - [`api::HttpTallyBackend`] talks to `/poll-api`; the server owns the counts.
//! - [`local_store::LocalPollStore`] keeps counts in device storage. It is the
//!   offline variant and disagrees with the server by construction, so only
//!   one of the two should back a given page.
//!
//! Vote-once is enforced by a marker in device storage. Clearing storage
//! clears the marker, so it gates the UI and nothing more.

pub mod api;
pub mod local_store;
pub mod storage;
pub mod widget;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::ClientError;
use crate::models::{PollDefinition, Tallies, VoteResponse};

pub const DEFAULT_API_URL: &str = "https://robotwranglers.org/poll-api.php";
pub const DEFAULT_MARKER_KEY: &str = "userVotedCharleyVsGarry";
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(5);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait TallyBackend: Send + Sync {
    async fn fetch_tallies(&self, poll_name: &str) -> Result<Tallies, ClientError>;

    async fn submit_vote(&self, poll_name: &str, option: &str) -> Result<VoteResponse, ClientError>;
}

#[derive(Debug, Clone)]
pub struct WidgetConfig {
    pub api_url: String,
    pub poll: PollDefinition,
    pub marker_key: String,
    pub refresh_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            poll: PollDefinition::default(),
            marker_key: DEFAULT_MARKER_KEY.to_string(),
            refresh_interval: REFRESH_INTERVAL,
            request_timeout: REQUEST_TIMEOUT,
        }
    }
}
