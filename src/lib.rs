//! Poll voting for the Robot Wranglers site.
//!
//! The server side is [`voting::TallyService`] over the `poll_votes` table in
//! [`db`], exposed by [`handlers::router`] at `/poll-api`. The browser side is
//! modelled in [`client`], with the periodic refresh in [`tasks`].

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod tasks;
pub mod voting;
