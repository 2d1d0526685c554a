//! Attack timing model.
//!
//! Pure calculation: given the current instant and an actor's scheduled
//! next swing, work out how charged the attack is and whether a timed
//! reaction submitted right now would parry, block, or miss. Evaluated
//! fresh on every tick and every action validation; no cached window
//! state, so results are fully determined by `now`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::actor::Rarity;

/// Which reaction window the current instant falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReactionWindow {
    None,
    Block,
    Parry,
}

/// Timing classification for one actor at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttackTiming {
    /// How charged the next attack is, 0-100. Drives client progress
    /// bars only; never gates action acceptance.
    pub progress_percent: f32,
    /// Signed time until the next swing. Negative when the swing is due.
    pub time_until_attack_ms: i64,
    pub window: ReactionWindow,
}

/// Classify `now` against an actor's scheduled swing.
///
/// The parry window is a strict subset of the block window, both sized by
/// rarity (narrower for tougher foes). A swing already due (`<= 0` ms
/// remaining) is outside both windows.
pub fn classify(
    now: DateTime<Utc>,
    next_attack_at: DateTime<Utc>,
    attack_interval_ms: i64,
    rarity: Rarity,
) -> AttackTiming {
    let remaining = (next_attack_at - now).num_milliseconds();

    let window = if remaining > 0 && remaining <= rarity.parry_window_ms() {
        ReactionWindow::Parry
    } else if remaining > 0 && remaining <= rarity.block_window_ms() {
        ReactionWindow::Block
    } else {
        ReactionWindow::None
    };

    let progress = if attack_interval_ms <= 0 {
        100.0
    } else {
        let elapsed = attack_interval_ms - remaining;
        (elapsed as f32 / attack_interval_ms as f32 * 100.0).clamp(0.0, 100.0)
    };

    AttackTiming {
        progress_percent: progress,
        time_until_attack_ms: remaining,
        window,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    fn classify_remaining(remaining_ms: i64, rarity: Rarity) -> AttackTiming {
        classify(at(0), at(remaining_ms), 4000, rarity)
    }

    #[test]
    fn boundary_values_for_elite_windows() {
        // Elite: parry 300 ms, block 1000 ms
        assert_eq!(classify_remaining(300, Rarity::Elite).window, ReactionWindow::Parry);
        assert_eq!(classify_remaining(301, Rarity::Elite).window, ReactionWindow::Block);
        assert_eq!(classify_remaining(1000, Rarity::Elite).window, ReactionWindow::Block);
        assert_eq!(classify_remaining(1001, Rarity::Elite).window, ReactionWindow::None);
    }

    #[test]
    fn due_or_overdue_attack_is_no_window() {
        assert_eq!(classify_remaining(0, Rarity::Common).window, ReactionWindow::None);
        assert_eq!(classify_remaining(-500, Rarity::Common).window, ReactionWindow::None);
    }

    #[test]
    fn boss_windows_are_narrowest() {
        assert_eq!(classify_remaining(200, Rarity::Boss).window, ReactionWindow::Parry);
        assert_eq!(classify_remaining(201, Rarity::Boss).window, ReactionWindow::Block);
        assert_eq!(classify_remaining(801, Rarity::Boss).window, ReactionWindow::None);
        // The same instant blocks against a common foe
        assert_eq!(classify_remaining(801, Rarity::Common).window, ReactionWindow::Block);
    }

    #[test]
    fn progress_charges_toward_the_swing() {
        let t = classify_remaining(3000, Rarity::Common);
        assert!((t.progress_percent - 25.0).abs() < f32::EPSILON);
        let t = classify_remaining(1000, Rarity::Common);
        assert!((t.progress_percent - 75.0).abs() < f32::EPSILON);
    }

    #[test]
    fn progress_clamps_to_bounds() {
        // Overdue swing: fully charged
        assert!((classify_remaining(-200, Rarity::Common).progress_percent - 100.0).abs() < f32::EPSILON);
        // Remaining longer than the interval (just staggered): not charged
        assert!(classify_remaining(5000, Rarity::Common).progress_percent.abs() < f32::EPSILON);
    }
}
