//! Player action submissions against an active event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ActorId, CharacterId};

/// What a player submitted, interpreted by the event's kind.
///
/// Closed variant set; unknown kinds are rejected at the boundary before
/// any state mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Swing at a specific actor; damage lands immediately on submission.
    Attack { target: ActorId },
    /// Timed mitigation against an actor's next swing (half on success).
    Block { target: ActorId },
    /// Timed mitigation against an actor's next swing (full on success).
    Parry { target: ActorId },
    /// Abandon the fight; counts as a submission for resolution checks.
    Flee,
    /// Pick an option on a CHOICE or PUZZLE event.
    ChooseOption { index: u32 },
    /// Open a TREASURE event.
    Collect,
    /// React to a TRAP event; the submitting member avoids its damage.
    Dodge,
    /// Take a breather on a REST event.
    Rest,
}

/// How well a timed input landed, judged at submission time.
///
/// Mistimed inputs are never rejected; they are kept for audit and
/// simply mitigate nothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TimingGrade {
    /// Not a timed action, or no grading applies.
    Untimed,
    /// Landed inside the required window; carries the mitigation factor.
    InWindow { mitigation: f32 },
    /// Landed outside the window; recorded, no mitigation.
    Missed,
}

/// One player's recorded submission for one event.
///
/// At most one exists per (event, character); the second submission is
/// rejected, never overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerAction {
    pub character_id: CharacterId,
    pub kind: ActionKind,
    pub grade: TimingGrade,
    pub submitted_at: DateTime<Utc>,
}
