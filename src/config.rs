use log::{info, warn};
use std::{env, fmt::Display, str::FromStr};

use crate::error::ConfigError;
use crate::models::{DEFAULT_POLL_NAME, PollDefinition, is_valid_poll_name};

const DEFAULT_OPTIONS: &str = "charley:Charley,garry:Garry";

pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_connections: u32,
    pub poll: PollDefinition,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let poll_name: String = try_load("POLL_NAME", DEFAULT_POLL_NAME)?;
        if !is_valid_poll_name(&poll_name) {
            return Err(ConfigError::Invalid {
                key: "POLL_NAME".to_string(),
                message: format!("'{}' is not a valid poll name", poll_name),
            });
        }

        let options_spec: String = try_load("POLL_OPTIONS", DEFAULT_OPTIONS)?;
        let options =
            PollDefinition::parse_options(&options_spec).map_err(|message| ConfigError::Invalid {
                key: "POLL_OPTIONS".to_string(),
                message,
            })?;

        Ok(Self {
            host: try_load("POLL_HOST", "0.0.0.0")?,
            port: try_load("PORT", "8080")?,
            database_url: try_load("DATABASE_URL", "sqlite:robot_poll.db")?,
            max_connections: try_load("DATABASE_MAX_CONNECTIONS", "5")?,
            poll: PollDefinition::new(poll_name, options),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");
        ConfigError::Invalid {
            key: key.to_string(),
            message: e.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_failures_name_the_key() {
        // SAFETY: only this test touches this variable.
        unsafe { env::set_var("ROBOT_POLL_TEST_PORT", "eighty") };
        let err = try_load::<u16>("ROBOT_POLL_TEST_PORT", "8080").unwrap_err();
        assert!(err.to_string().contains("ROBOT_POLL_TEST_PORT"));
        unsafe { env::remove_var("ROBOT_POLL_TEST_PORT") };
    }

    #[test]
    fn missing_keys_use_default() {
        let port: u16 = try_load("ROBOT_POLL_TEST_UNSET_PORT", "9090").unwrap();
        assert_eq!(port, 9090);
    }
}
