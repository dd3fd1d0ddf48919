use crate::models::{PollDefinition, Tallies};

// One bar in the poll display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionShare {
    pub option_id: String,
    pub label: String,
    pub count: u64,
    pub percent: u32,
}

/// Shares for every configured option, in configuration order. The total only
/// counts configured options, so stray rows never skew the bars.
pub fn calculate_shares(poll: &PollDefinition, tallies: &Tallies) -> Vec<OptionShare> {
    let total: u64 = poll
        .options
        .iter()
        .map(|o| tallies.get(&o.id).copied().unwrap_or(0))
        .sum();

    poll.options
        .iter()
        .map(|option| {
            let count = tallies.get(&option.id).copied().unwrap_or(0);
            OptionShare {
                option_id: option.id.clone(),
                label: option.label.clone(),
                count,
                percent: percentage(count, total),
            }
        })
        .collect()
}

pub fn percentage(count: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    ((count as f64 / total as f64) * 100.0).round() as u32
}

pub fn votes_label(count: u64) -> String {
    if count == 1 {
        "1 vote".to_string()
    } else {
        format!("{} votes", count)
    }
}
