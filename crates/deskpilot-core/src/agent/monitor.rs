//! Background context refresh

use std::sync::Weak;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::AgentInner;
use crate::event::AgentEvent;

/// Capture a snapshot every `period` until `stop` fires or the agent is gone
pub(super) async fn run(agent: Weak<AgentInner>, stop: CancellationToken, period: Duration) {
    debug!("Context monitor started ({}ms)", period.as_millis());
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(inner) = agent.upgrade() else {
            break;
        };
        if !inner.is_active() {
            break;
        }

        match inner.snapshotter.capture().await {
            Ok(snapshot) if !stop.is_cancelled() => {
                inner.snapshotter.record(snapshot.clone());
                inner.emit(AgentEvent::ContextUpdate(Box::new(snapshot)));
            }
            Ok(_) => break,
            Err(e) => warn!("Context monitor capture failed: {}", e),
        }
    }
    debug!("Context monitor stopped");
}
