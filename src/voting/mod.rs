pub mod shares;

use crate::db::Database;
use crate::error::PollError;
use crate::models::{PollDefinition, Tallies, VoteRequest, is_valid_poll_name};
use log::info;
use std::sync::Arc;

/// Owner of the authoritative counters. Every poll name shares the option set
/// of the configured poll; requests are independent and hold no state here.
pub struct TallyService {
    database: Arc<Database>,
    poll: PollDefinition,
}

impl TallyService {
    pub fn new(database: Arc<Database>, poll: PollDefinition) -> Self {
        Self { database, poll }
    }

    pub fn default_poll(&self) -> &PollDefinition {
        &self.poll
    }

    /// Seeds the configured poll's counters.
    pub async fn init(&self) -> Result<(), PollError> {
        self.ensure_poll_initialized(&self.poll.name, &self.poll.option_ids())
            .await
    }

    pub async fn ensure_poll_initialized(
        &self,
        poll_name: &str,
        options: &[String],
    ) -> Result<(), PollError> {
        check_poll_name(poll_name)?;
        self.database.ensure_poll(poll_name, options).await?;
        Ok(())
    }

    /// Current counts for `poll_name`, zero-filled over the configured
    /// options. Reads never write rows, and any name gets an answer.
    pub async fn get_tallies(&self, poll_name: &str) -> Result<Tallies, PollError> {
        // Start every option at zero so unknown polls still get a full mapping
        let mut tallies = self.poll.zero_tallies();

        // A name that could never have been written has no rows to look up
        if !is_valid_poll_name(poll_name) {
            return Ok(tallies);
        }

        // Stored counts override the zeroes; legacy options show up too
        tallies.extend(self.database.get_tallies(poll_name).await?);
        Ok(tallies)
    }

    pub async fn cast_vote(&self, request: VoteRequest) -> Result<Tallies, PollError> {
        let (poll_name, option) = match (request.poll, request.option) {
            (Some(poll), Some(option)) if !poll.is_empty() && !option.is_empty() => (poll, option),
            _ => {
                return Err(PollError::InvalidRequest(
                    "Missing poll or option".to_string(),
                ));
            }
        };

        // Validate before touching storage so a rejected vote changes nothing
        check_poll_name(&poll_name)?;
        if !self.poll.has_option(&option) {
            return Err(PollError::InvalidOption(option));
        }

        // Make sure every option has a row, then add the vote atomically
        self.ensure_poll_initialized(&poll_name, &self.poll.option_ids())
            .await?;
        self.database.increment(&poll_name, &option).await?;
        info!("Recorded vote for '{}' in poll '{}'", option, poll_name);

        // Return the fresh counts, which may include other voters' concurrent votes
        self.get_tallies(&poll_name).await
    }
}

fn check_poll_name(poll_name: &str) -> Result<(), PollError> {
    if is_valid_poll_name(poll_name) {
        Ok(())
    } else {
        Err(PollError::InvalidRequest("Invalid poll name".to_string()))
    }
}
