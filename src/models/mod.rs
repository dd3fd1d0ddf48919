use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_POLL_NAME: &str = "charley-vs-garry";

lazy_static! {
    // Widths match the poll_name / option_name columns of the original table.
    static ref POLL_NAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]{1,100}$").unwrap();
    static ref OPTION_NAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]{1,50}$").unwrap();
}

/// Option name -> vote count. Ordered so JSON bodies are stable.
pub type Tallies = BTreeMap<String, u64>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollDefinition {
    pub name: String,
    pub options: Vec<PollOption>,
}

impl PollDefinition {
    pub fn new(name: impl Into<String>, options: Vec<PollOption>) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }

    /// Parses `id[:Label]` entries separated by commas, e.g. `charley:Charley,garry`.
    /// Entries without a label get the id with its first letter upper-cased.
    pub fn parse_options(spec: &str) -> Result<Vec<PollOption>, String> {
        let mut options: Vec<PollOption> = Vec::new();

        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (id, label) = match entry.split_once(':') {
                Some((id, label)) => (id.trim(), label.trim().to_string()),
                None => (entry, capitalize(entry)),
            };

            if !is_valid_option_name(id) {
                return Err(format!("invalid option name '{}'", id));
            }
            if options.iter().any(|o| o.id == id) {
                return Err(format!("duplicate option '{}'", id));
            }

            options.push(PollOption {
                id: id.to_string(),
                label: if label.is_empty() { capitalize(id) } else { label },
            });
        }

        if options.is_empty() {
            return Err("at least one option is required".to_string());
        }

        Ok(options)
    }

    pub fn option_ids(&self) -> Vec<String> {
        self.options.iter().map(|o| o.id.clone()).collect()
    }

    pub fn has_option(&self, option_id: &str) -> bool {
        self.options.iter().any(|o| o.id == option_id)
    }

    pub fn label_for(&self, option_id: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.id == option_id)
            .map(|o| o.label.as_str())
    }

    /// Every configured option with a zero count.
    pub fn zero_tallies(&self) -> Tallies {
        self.options.iter().map(|o| (o.id.clone(), 0)).collect()
    }
}

impl Default for PollDefinition {
    fn default() -> Self {
        Self::new(
            DEFAULT_POLL_NAME,
            vec![
                PollOption {
                    id: "charley".to_string(),
                    label: "Charley".to_string(),
                },
                PollOption {
                    id: "garry".to_string(),
                    label: "Garry".to_string(),
                },
            ],
        )
    }
}

pub fn is_valid_poll_name(name: &str) -> bool {
    POLL_NAME_RE.is_match(name)
}

pub fn is_valid_option_name(name: &str) -> bool {
    OPTION_NAME_RE.is_match(name)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// Wire types for /poll-api

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TallyQuery {
    pub poll: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoteRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option: Option<String>,
}

impl VoteRequest {
    pub fn new(poll: impl Into<String>, option: impl Into<String>) -> Self {
        Self {
            poll: Some(poll.into()),
            option: Some(option.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub votes: Tallies,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Device-local record that a vote was cast. Resettable by the device, so it
/// only gates the voting UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalMarker {
    pub option: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voted_at: Option<DateTime<Utc>>,
}

impl LocalMarker {
    pub fn now(option: impl Into<String>) -> Self {
        Self {
            option: option.into(),
            voted_at: Some(Utc::now()),
        }
    }

    /// Accepts the JSON form and the bare option id older pages stored.
    pub fn parse(raw: &str) -> Option<Self> {
        if let Ok(marker) = serde_json::from_str::<LocalMarker>(raw) {
            return Some(marker);
        }
        let option = raw.trim();
        if is_valid_option_name(option) {
            Some(Self {
                option: option.to_string(),
                voted_at: None,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_options_with_and_without_labels() {
        let options = PollDefinition::parse_options("charley:Charley, garry").unwrap();
        assert_eq!(
            options,
            vec![
                PollOption {
                    id: "charley".to_string(),
                    label: "Charley".to_string()
                },
                PollOption {
                    id: "garry".to_string(),
                    label: "Garry".to_string()
                },
            ]
        );
    }

    #[test]
    fn rejects_duplicate_and_empty_option_lists() {
        assert!(PollDefinition::parse_options("a,a").is_err());
        assert!(PollDefinition::parse_options(" , ").is_err());
        assert!(PollDefinition::parse_options("bad option").is_err());
    }

    #[test]
    fn poll_names_are_bounded() {
        assert!(is_valid_poll_name("charley-vs-garry"));
        assert!(!is_valid_poll_name(""));
        assert!(!is_valid_poll_name("drop table;"));
        assert!(!is_valid_poll_name(&"p".repeat(101)));
    }

    #[test]
    fn vote_request_tolerates_missing_fields() {
        let req: VoteRequest = serde_json::from_str(r#"{"poll":"charley-vs-garry"}"#).unwrap();
        assert_eq!(req.poll.as_deref(), Some("charley-vs-garry"));
        assert!(req.option.is_none());
    }

    #[test]
    fn markers_accept_bare_option_ids() {
        let legacy = LocalMarker::parse("garry").unwrap();
        assert_eq!(legacy.option, "garry");
        assert!(legacy.voted_at.is_none());

        let stored = serde_json::to_string(&LocalMarker::now("charley")).unwrap();
        let parsed = LocalMarker::parse(&stored).unwrap();
        assert_eq!(parsed.option, "charley");
        assert!(parsed.voted_at.is_some());

        assert!(LocalMarker::parse("{broken").is_none());
    }

    #[test]
    fn default_poll_zero_tallies() {
        let poll = PollDefinition::default();
        let zeros = poll.zero_tallies();
        assert_eq!(zeros.get("charley"), Some(&0));
        assert_eq!(zeros.get("garry"), Some(&0));
        assert_eq!(poll.label_for("garry"), Some("Garry"));
    }
}
