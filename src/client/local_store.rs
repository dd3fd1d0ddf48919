use async_trait::async_trait;
use log::warn;
use std::sync::{Arc, Mutex};

use super::TallyBackend;
use super::storage::KeyValueStore;
use crate::error::ClientError;
use crate::models::{PollDefinition, Tallies, VoteResponse};

pub const LOCAL_VOTES_KEY: &str = "pollVotes";
pub const LOCAL_MARKER_KEY: &str = "robotPollVote";

/// Tallies kept in device storage under a single fixed key. Each device
/// counts only its own votes; nothing here is shared with the server.
pub struct LocalPollStore {
    store: Arc<dyn KeyValueStore>,
    poll: PollDefinition,
    write_lock: Mutex<()>,
}

impl LocalPollStore {
    pub fn new(store: Arc<dyn KeyValueStore>, poll: PollDefinition) -> Self {
        Self {
            store,
            poll,
            write_lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<Tallies, ClientError> {
        let mut tallies = self.poll.zero_tallies();

        if let Some(raw) = self.store.get(LOCAL_VOTES_KEY)? {
            match serde_json::from_str::<Tallies>(&raw) {
                Ok(saved) => tallies.extend(saved),
                Err(e) => warn!("Discarding unreadable local tallies: {}", e),
            }
        }

        Ok(tallies)
    }
}

#[async_trait]
impl TallyBackend for LocalPollStore {
    // The key is fixed, so there is only ever one local poll.
    async fn fetch_tallies(&self, _poll_name: &str) -> Result<Tallies, ClientError> {
        self.load()
    }

    async fn submit_vote(&self, _poll_name: &str, option: &str) -> Result<VoteResponse, ClientError> {
        if !self.poll.has_option(option) {
            return Err(ClientError::UnknownOption(option.to_string()));
        }

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut votes = self.load()?;
        *votes.entry(option.to_string()).or_insert(0) += 1;
        self.store
            .set(LOCAL_VOTES_KEY, &serde_json::to_string(&votes)?)?;

        Ok(VoteResponse {
            success: true,
            votes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::storage::MemoryStore;

    fn local_store() -> (Arc<MemoryStore>, LocalPollStore) {
        let memory = Arc::new(MemoryStore::new());
        let store = LocalPollStore::new(memory.clone(), PollDefinition::default());
        (memory, store)
    }

    #[tokio::test]
    async fn starts_with_zeroes() {
        let (_memory, store) = local_store();
        let tallies = store.fetch_tallies("charley-vs-garry").await.unwrap();
        assert_eq!(tallies, PollDefinition::default().zero_tallies());
    }

    #[tokio::test]
    async fn votes_persist_under_fixed_key() {
        let (memory, store) = local_store();
        store.submit_vote("charley-vs-garry", "charley").await.unwrap();
        let response = store.submit_vote("charley-vs-garry", "charley").await.unwrap();

        assert!(response.success);
        assert_eq!(response.votes["charley"], 2);
        assert_eq!(
            memory.get(LOCAL_VOTES_KEY).unwrap().as_deref(),
            Some(r#"{"charley":2,"garry":0}"#)
        );
    }

    #[tokio::test]
    async fn reads_tallies_written_by_the_old_page() {
        let (memory, store) = local_store();
        memory
            .set(LOCAL_VOTES_KEY, r#"{"charley": 4, "garry": 1}"#)
            .unwrap();

        let tallies = store.fetch_tallies("charley-vs-garry").await.unwrap();
        assert_eq!(tallies["charley"], 4);
        assert_eq!(tallies["garry"], 1);
    }

    #[tokio::test]
    async fn rejects_unknown_option() {
        let (memory, store) = local_store();
        let err = store.submit_vote("charley-vs-garry", "bob").await.unwrap_err();
        assert!(matches!(err, ClientError::UnknownOption(_)));
        assert_eq!(memory.get(LOCAL_VOTES_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_tallies_fall_back_to_zero() {
        let (memory, store) = local_store();
        memory.set(LOCAL_VOTES_KEY, "not json").unwrap();
        let tallies = store.fetch_tallies("charley-vs-garry").await.unwrap();
        assert_eq!(tallies["charley"], 0);
    }
}
