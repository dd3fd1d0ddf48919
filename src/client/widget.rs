use log::{info, warn};
use std::sync::{Arc, Mutex, MutexGuard};

use super::api::HttpTallyBackend;
use super::local_store::{LOCAL_MARKER_KEY, LocalPollStore};
use super::storage::KeyValueStore;
use super::{TallyBackend, WidgetConfig};
use crate::error::ClientError;
use crate::models::{LocalMarker, PollDefinition, Tallies};
use crate::voting::shares::{calculate_shares, votes_label};

pub const ALREADY_VOTED_MESSAGE: &str = "You have already voted!";
pub const FIRST_VOTE_MESSAGE: &str = "Be the first to vote!";
pub const SUBMITTING_MESSAGE: &str = "Submitting your vote...";
pub const VOTE_ERROR_MESSAGE: &str = "Error submitting vote. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteState {
    Unvoted,
    Voting { option: String },
    Voted { option: String },
    /// Last submission failed; the device may vote again.
    Error { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Neutral,
    Voted,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Recorded,
    AlreadyVoted,
    InFlight,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionView {
    pub option_id: String,
    pub label: String,
    pub count: u64,
    pub percent: u32,
    pub votes_text: String,
    pub selected: bool,
    pub clickable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollView {
    pub options: Vec<OptionView>,
    pub status: String,
    pub status_kind: StatusKind,
}

struct WidgetState {
    vote: VoteState,
    tallies: Option<Tallies>,
    notice: Option<String>,
}

pub struct PollWidget {
    backend: Arc<dyn TallyBackend>,
    store: Arc<dyn KeyValueStore>,
    poll: PollDefinition,
    marker_key: String,
    state: Mutex<WidgetState>,
}

impl PollWidget {
    pub fn new(
        backend: Arc<dyn TallyBackend>,
        store: Arc<dyn KeyValueStore>,
        poll: PollDefinition,
        marker_key: impl Into<String>,
    ) -> Self {
        let marker_key = marker_key.into();
        let vote = match read_marker(store.as_ref(), &marker_key) {
            Some(marker) => VoteState::Voted {
                option: marker.option,
            },
            None => VoteState::Unvoted,
        };

        Self {
            backend,
            store,
            poll,
            marker_key,
            state: Mutex::new(WidgetState {
                vote,
                tallies: None,
                notice: None,
            }),
        }
    }

    /// Server-backed widget.
    pub fn from_config(
        config: &WidgetConfig,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, ClientError> {
        let backend = HttpTallyBackend::new(config.api_url.clone(), config.request_timeout)?;
        Ok(Self::new(
            Arc::new(backend),
            store,
            config.poll.clone(),
            config.marker_key.clone(),
        ))
    }

    /// Device-only widget; tallies and marker both live in `store`.
    pub fn local(store: Arc<dyn KeyValueStore>, poll: PollDefinition) -> Self {
        let backend = LocalPollStore::new(store.clone(), poll.clone());
        Self::new(Arc::new(backend), store, poll, LOCAL_MARKER_KEY)
    }

    pub fn poll(&self) -> &PollDefinition {
        &self.poll
    }

    pub fn state(&self) -> VoteState {
        self.lock().vote.clone()
    }

    pub fn marker(&self) -> Option<LocalMarker> {
        read_marker(self.store.as_ref(), &self.marker_key)
    }

    /// Re-reads tallies. On failure the previous tallies stay on display.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        match self.backend.fetch_tallies(&self.poll.name).await {
            Ok(tallies) => {
                self.lock().tallies = Some(tallies);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to load votes for '{}': {}", self.poll.name, e);
                Err(e)
            }
        }
    }

    pub async fn click(&self, option_id: &str) -> Result<ClickOutcome, ClientError> {
        if !self.poll.has_option(option_id) {
            return Err(ClientError::UnknownOption(option_id.to_string()));
        }

        let marker = self.marker();
        {
            let mut state = self.lock();
            if matches!(state.vote, VoteState::Voting { .. }) {
                return Ok(ClickOutcome::InFlight);
            }
            if matches!(state.vote, VoteState::Voted { .. }) {
                state.notice = Some(ALREADY_VOTED_MESSAGE.to_string());
                return Ok(ClickOutcome::AlreadyVoted);
            }

            // Another widget on this device may have voted since we loaded.
            if let Some(marker) = marker {
                state.vote = VoteState::Voted {
                    option: marker.option,
                };
                state.notice = Some(ALREADY_VOTED_MESSAGE.to_string());
                return Ok(ClickOutcome::AlreadyVoted);
            }

            state.vote = VoteState::Voting {
                option: option_id.to_string(),
            };
            state.notice = None;
        }

        let result = match self.backend.submit_vote(&self.poll.name, option_id).await {
            Ok(response) if response.success => Ok(response.votes),
            Ok(_) => Err(ClientError::NotAccepted),
            Err(e) => Err(e),
        };

        match result {
            Ok(votes) => {
                self.save_marker(option_id);
                let mut state = self.lock();
                state.tallies = Some(votes);
                state.vote = VoteState::Voted {
                    option: option_id.to_string(),
                };
                info!("Vote for '{}' recorded in '{}'", option_id, self.poll.name);
                Ok(ClickOutcome::Recorded)
            }
            Err(e) => {
                warn!("Error voting for '{}': {}", option_id, e);
                self.lock().vote = VoteState::Error {
                    message: VOTE_ERROR_MESSAGE.to_string(),
                };
                Err(e)
            }
        }
    }

    pub fn view(&self) -> PollView {
        let state = self.lock();
        let tallies = state
            .tallies
            .clone()
            .unwrap_or_else(|| self.poll.zero_tallies());

        let (selected, clickable) = match &state.vote {
            VoteState::Voting { option } | VoteState::Voted { option } => {
                (Some(option.as_str()), false)
            }
            VoteState::Unvoted | VoteState::Error { .. } => (None, true),
        };

        let shares = calculate_shares(&self.poll, &tallies);
        let total: u64 = shares.iter().map(|s| s.count).sum();

        let options = shares
            .into_iter()
            .map(|share| OptionView {
                selected: selected == Some(share.option_id.as_str()),
                clickable,
                votes_text: votes_label(share.count),
                option_id: share.option_id,
                label: share.label,
                count: share.count,
                percent: share.percent,
            })
            .collect();

        let (status, status_kind) = match (&state.notice, &state.vote) {
            (Some(notice), _) => (notice.clone(), StatusKind::Neutral),
            (None, VoteState::Voted { option }) => {
                let label = self.poll.label_for(option).unwrap_or(option);
                (
                    format!("You voted for {}! Thanks for participating!", label),
                    StatusKind::Voted,
                )
            }
            (None, VoteState::Error { message }) => (message.clone(), StatusKind::Error),
            (None, VoteState::Voting { .. }) => (SUBMITTING_MESSAGE.to_string(), StatusKind::Neutral),
            (None, VoteState::Unvoted) if total == 0 => {
                (FIRST_VOTE_MESSAGE.to_string(), StatusKind::Neutral)
            }
            (None, VoteState::Unvoted) => (String::new(), StatusKind::Neutral),
        };

        PollView {
            options,
            status,
            status_kind,
        }
    }

    fn save_marker(&self, option_id: &str) {
        let saved = serde_json::to_string(&LocalMarker::now(option_id))
            .map_err(ClientError::from)
            .and_then(|raw| self.store.set(&self.marker_key, &raw));

        // The vote already counted; a missing marker only re-enables the buttons.
        if let Err(e) = saved {
            warn!("Could not save local vote marker '{}': {}", self.marker_key, e);
        }
    }

    fn lock(&self) -> MutexGuard<'_, WidgetState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn read_marker(store: &dyn KeyValueStore, key: &str) -> Option<LocalMarker> {
    match store.get(key) {
        Ok(raw) => raw.as_deref().and_then(LocalMarker::parse),
        Err(e) => {
            warn!("Could not read local vote marker '{}': {}", key, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::storage::MemoryStore;
    use crate::models::VoteResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Server stand-in that can be told to fail or to answer without success.
    struct ScriptedBackend {
        tallies: Mutex<Tallies>,
        fail_votes: AtomicUsize,
        decline: bool,
    }

    impl ScriptedBackend {
        fn new() -> Self {
            Self {
                tallies: Mutex::new(PollDefinition::default().zero_tallies()),
                fail_votes: AtomicUsize::new(0),
                decline: false,
            }
        }
    }

    #[async_trait]
    impl TallyBackend for ScriptedBackend {
        async fn fetch_tallies(&self, _poll_name: &str) -> Result<Tallies, ClientError> {
            Ok(self.tallies.lock().unwrap().clone())
        }

        async fn submit_vote(&self, _poll_name: &str, option: &str) -> Result<VoteResponse, ClientError> {
            if self.fail_votes.load(Ordering::SeqCst) > 0 {
                self.fail_votes.fetch_sub(1, Ordering::SeqCst);
                return Err(ClientError::Rejected {
                    status: 500,
                    message: "Storage unavailable".to_string(),
                });
            }
            if self.decline {
                return Ok(VoteResponse {
                    success: false,
                    votes: Tallies::new(),
                });
            }
            let mut tallies = self.tallies.lock().unwrap();
            *tallies.entry(option.to_string()).or_insert(0) += 1;
            Ok(VoteResponse {
                success: true,
                votes: tallies.clone(),
            })
        }
    }

    fn widget_with(backend: ScriptedBackend) -> (Arc<MemoryStore>, PollWidget) {
        let store = Arc::new(MemoryStore::new());
        let widget = PollWidget::new(
            Arc::new(backend),
            store.clone(),
            PollDefinition::default(),
            "userVotedCharleyVsGarry",
        );
        (store, widget)
    }

    #[tokio::test]
    async fn fresh_widget_invites_first_vote() {
        let (_store, widget) = widget_with(ScriptedBackend::new());
        widget.refresh().await.unwrap();

        let view = widget.view();
        assert_eq!(widget.state(), VoteState::Unvoted);
        assert_eq!(view.status, FIRST_VOTE_MESSAGE);
        assert!(view.options.iter().all(|o| o.clickable && o.percent == 0));
        assert_eq!(view.options[0].votes_text, "0 votes");
    }

    #[tokio::test]
    async fn successful_vote_records_marker_and_locks_options() {
        let (store, widget) = widget_with(ScriptedBackend::new());

        let outcome = widget.click("charley").await.unwrap();
        assert_eq!(outcome, ClickOutcome::Recorded);
        assert_eq!(
            widget.state(),
            VoteState::Voted {
                option: "charley".to_string()
            }
        );
        assert_eq!(widget.marker().unwrap().option, "charley");
        assert!(store.get("userVotedCharleyVsGarry").unwrap().is_some());

        let view = widget.view();
        assert_eq!(view.status, "You voted for Charley! Thanks for participating!");
        assert_eq!(view.status_kind, StatusKind::Voted);
        assert_eq!(view.options[0].votes_text, "1 vote");
        assert_eq!(view.options[0].percent, 100);
        assert!(view.options[0].selected);
        assert!(view.options.iter().all(|o| !o.clickable));
    }

    #[tokio::test]
    async fn second_click_is_refused() {
        let (_store, widget) = widget_with(ScriptedBackend::new());
        widget.click("garry").await.unwrap();

        assert_eq!(widget.click("charley").await.unwrap(), ClickOutcome::AlreadyVoted);
        assert_eq!(widget.view().status, ALREADY_VOTED_MESSAGE);
        widget.refresh().await.unwrap();
        assert_eq!(widget.view().options[0].count, 0);
    }

    #[tokio::test]
    async fn failed_vote_reverts_and_allows_retry() {
        let backend = ScriptedBackend::new();
        backend.fail_votes.store(1, Ordering::SeqCst);
        let (store, widget) = widget_with(backend);

        let err = widget.click("garry").await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected { status: 500, .. }));
        assert!(store.get("userVotedCharleyVsGarry").unwrap().is_none());

        let view = widget.view();
        assert_eq!(view.status, VOTE_ERROR_MESSAGE);
        assert_eq!(view.status_kind, StatusKind::Error);
        assert!(view.options.iter().all(|o| o.clickable && !o.selected));

        assert_eq!(widget.click("garry").await.unwrap(), ClickOutcome::Recorded);
        assert_eq!(widget.marker().unwrap().option, "garry");
    }

    #[tokio::test]
    async fn response_without_success_is_a_failure() {
        let mut backend = ScriptedBackend::new();
        backend.decline = true;
        let (_store, widget) = widget_with(backend);

        let err = widget.click("charley").await.unwrap_err();
        assert!(matches!(err, ClientError::NotAccepted));
        assert!(widget.marker().is_none());
        assert!(matches!(widget.state(), VoteState::Error { .. }));
    }

    #[tokio::test]
    async fn marker_from_earlier_visit_starts_voted() {
        let store = Arc::new(MemoryStore::new());
        store.set("userVotedCharleyVsGarry", "garry").unwrap();

        let widget = PollWidget::new(
            Arc::new(ScriptedBackend::new()),
            store,
            PollDefinition::default(),
            "userVotedCharleyVsGarry",
        );
        assert_eq!(
            widget.state(),
            VoteState::Voted {
                option: "garry".to_string()
            }
        );
        assert_eq!(widget.view().status, "You voted for Garry! Thanks for participating!");
    }

    #[tokio::test]
    async fn marker_written_elsewhere_blocks_click() {
        let (store, widget) = widget_with(ScriptedBackend::new());
        store.set("userVotedCharleyVsGarry", "charley").unwrap();

        assert_eq!(widget.click("garry").await.unwrap(), ClickOutcome::AlreadyVoted);
        widget.refresh().await.unwrap();
        assert_eq!(widget.view().options[1].count, 0);
    }

    #[tokio::test]
    async fn unknown_option_is_rejected_without_state_change() {
        let (_store, widget) = widget_with(ScriptedBackend::new());
        assert!(matches!(
            widget.click("robot").await,
            Err(ClientError::UnknownOption(_))
        ));
        assert_eq!(widget.state(), VoteState::Unvoted);
    }

    #[tokio::test]
    async fn local_widget_counts_on_device() {
        let store = Arc::new(MemoryStore::new());
        let widget = PollWidget::local(store.clone(), PollDefinition::default());

        widget.click("garry").await.unwrap();
        widget.refresh().await.unwrap();

        let view = widget.view();
        assert_eq!(view.options[1].count, 1);
        assert_eq!(view.options[1].percent, 100);
        assert!(store.get(LOCAL_MARKER_KEY).unwrap().is_some());
    }
}
