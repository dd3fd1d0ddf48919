use crate::client::widget::PollWidget;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

/// Re-fetches tallies every `period`, whether or not this device has voted,
/// so the bars follow other voters. The first fetch happens immediately.
pub async fn refresh_tallies_task(widget: Arc<PollWidget>, period: Duration) {
    info!(
        "Refreshing '{}' tallies every {:?}",
        widget.poll().name,
        period
    );
    let mut interval = interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        if let Err(e) = widget.refresh().await {
            // Keep the old numbers on screen and try again next tick.
            warn!("Tally refresh failed: {}", e);
        }
    }
}

pub fn spawn_refresh_task(widget: Arc<PollWidget>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(refresh_tallies_task(widget, period))
}
