//! Timed replay of recorded actions

use std::time::Duration;

use tracing::{debug, info, warn};

use super::{Action, Automation};
use crate::error::{Error, Result};

/// Progress report emitted after each replayed action
#[derive(Debug, Clone, Copy)]
pub struct PlaybackProgress<'a> {
    /// 1-based position of the action just played
    pub current: usize,
    pub total: usize,
    pub action: &'a Action,
}

/// Non-positive or non-finite speeds play at normal speed
pub fn normalize_speed(speed: f64) -> f64 {
    if speed.is_finite() && speed > 0.0 { speed } else { 1.0 }
}

/// Pause before `next`, given the recorded gap after `prev` and a speed
/// multiplier. Out-of-order timestamps yield no pause.
pub fn scaled_gap(prev: &Action, next: &Action, speed: f64) -> Duration {
    let gap = (next.timestamp - prev.timestamp)
        .to_std()
        .unwrap_or(Duration::ZERO);
    Duration::try_from_secs_f64(gap.as_secs_f64() / normalize_speed(speed))
        .unwrap_or(Duration::MAX)
}

impl Automation {
    /// Replay `actions`, preserving their relative timing scaled by `speed`
    ///
    /// The first action dispatches immediately. Replayed actions are not
    /// recorded. The first dispatch failure stops playback and is reported as
    /// [`Error::Playback`] with the failing index; earlier actions stay applied.
    pub async fn playback<F>(&self, actions: &[Action], speed: f64, mut on_progress: F) -> Result<()>
    where
        F: FnMut(PlaybackProgress<'_>),
    {
        let speed = normalize_speed(speed);
        let total = actions.len();
        info!("Starting playback of {} actions at {}x speed", total, speed);

        for (index, action) in actions.iter().enumerate() {
            if index > 0 {
                let pause = scaled_gap(&actions[index - 1], action, speed);
                if !pause.is_zero() {
                    tokio::time::sleep(pause).await;
                }
            }

            if let Err(e) = self.dispatch(&action.action).await {
                warn!("Playback stopped at action {}: {}", index, e);
                return Err(Error::Playback {
                    index,
                    source: Box::new(e),
                });
            }

            debug!("Played back action {}/{}: {}", index + 1, total, action.description);
            on_progress(PlaybackProgress {
                current: index + 1,
                total,
                action,
            });
        }

        info!("Playback completed");
        Ok(())
    }
}
