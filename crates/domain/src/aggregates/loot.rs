//! DungeonLoot aggregate - one item drop pending distribution.
//!
//! # Rustic DDD Design
//!
//! - **Private fields**: all state is encapsulated
//! - **Guarded transitions**: PENDING -> ROLLING -> ASSIGNED; once ASSIGNED
//!   the record is immutable
//! - **At-most-once input**: one roll per character per drop

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{CharacterId, ItemId, LootId, SessionId};

/// Distribution status of a drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LootStatus {
    Pending,
    Rolling,
    Assigned,
}

/// Declared intent on a need/greed roll. Need always outranks greed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollKind {
    Need,
    Greed,
}

impl RollKind {
    fn rank(self) -> u8 {
        match self {
            Self::Need => 1,
            Self::Greed => 0,
        }
    }
}

/// One character's roll on one drop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LootRoll {
    pub character_id: CharacterId,
    pub kind: RollKind,
    /// Uniform in 1..=100, drawn at submission.
    pub value: u32,
    pub submitted_at: DateTime<Utc>,
}

/// An item drop awaiting distribution to a party member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DungeonLoot {
    id: LootId,
    session_id: SessionId,
    item_id: ItemId,
    quantity: u32,
    status: LootStatus,
    assigned_to: Option<CharacterId>,
    rolls: Vec<LootRoll>,
    /// Members eligible to roll (living party at distribution time).
    expected_rollers: Vec<CharacterId>,
    /// Best-available roll wins once this passes.
    roll_deadline: Option<DateTime<Utc>>,
}

impl DungeonLoot {
    pub fn new(session_id: SessionId, item_id: ItemId, quantity: u32) -> Self {
        Self {
            id: LootId::new(),
            session_id,
            item_id,
            quantity,
            status: LootStatus::Pending,
            assigned_to: None,
            rolls: Vec::new(),
            expected_rollers: Vec::new(),
            roll_deadline: None,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[inline]
    pub fn id(&self) -> LootId {
        self.id
    }

    #[inline]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[inline]
    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    #[inline]
    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    #[inline]
    pub fn status(&self) -> LootStatus {
        self.status
    }

    #[inline]
    pub fn assigned_to(&self) -> Option<CharacterId> {
        self.assigned_to
    }

    #[inline]
    pub fn rolls(&self) -> &[LootRoll] {
        &self.rolls
    }

    #[inline]
    pub fn expected_rollers(&self) -> &[CharacterId] {
        &self.expected_rollers
    }

    #[inline]
    pub fn roll_deadline(&self) -> Option<DateTime<Utc>> {
        self.roll_deadline
    }

    // =========================================================================
    // Rolling
    // =========================================================================

    /// PENDING -> ROLLING: open the drop for rolls from `expected` with a
    /// collapse deadline.
    pub fn open_rolls(
        &mut self,
        expected: Vec<CharacterId>,
        deadline: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.status != LootStatus::Pending {
            return Err(DomainError::invalid_state(format!(
                "loot {} cannot open rolls from {:?}",
                self.id, self.status
            )));
        }
        self.status = LootStatus::Rolling;
        self.expected_rollers = expected;
        self.roll_deadline = Some(deadline);
        Ok(())
    }

    /// Record one character's roll. One per character; rejected once the
    /// drop is assigned or the caller is not an expected roller.
    pub fn submit_roll(&mut self, roll: LootRoll) -> Result<(), DomainError> {
        if self.status != LootStatus::Rolling {
            return Err(DomainError::invalid_state(format!(
                "loot {} is not rolling ({:?})",
                self.id, self.status
            )));
        }
        if !self.expected_rollers.contains(&roll.character_id) {
            return Err(DomainError::validation(format!(
                "character {} is not eligible to roll on loot {}",
                roll.character_id, self.id
            )));
        }
        if self.rolls.iter().any(|r| r.character_id == roll.character_id) {
            return Err(DomainError::DuplicateRoll {
                loot_id: self.id.to_string(),
                character_id: roll.character_id.to_string(),
            });
        }
        self.rolls.push(roll);
        Ok(())
    }

    /// True when every expected roller has responded.
    pub fn all_rolled(&self) -> bool {
        self.expected_rollers
            .iter()
            .all(|c| self.rolls.iter().any(|r| r.character_id == *c))
    }

    /// True when the drop is ROLLING past its deadline.
    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        self.status == LootStatus::Rolling
            && self.roll_deadline.is_some_and(|d| now > d)
    }

    /// Highest-ranked roll: need beats greed, then higher value; a value
    /// tie goes to the earlier submission.
    pub fn best_roll(&self) -> Option<&LootRoll> {
        self.rolls
            .iter()
            .enumerate()
            .max_by_key(|(i, r)| (r.kind.rank(), r.value, std::cmp::Reverse(*i)))
            .map(|(_, r)| r)
    }

    // =========================================================================
    // Assignment (exactly once)
    // =========================================================================

    /// Assign the drop to a character. Repeated attempts after ASSIGNED
    /// fail with `AlreadyAssigned`.
    pub fn assign(&mut self, character_id: CharacterId) -> Result<(), DomainError> {
        if self.status == LootStatus::Assigned {
            return Err(DomainError::AlreadyAssigned(self.id.to_string()));
        }
        self.status = LootStatus::Assigned;
        self.assigned_to = Some(character_id);
        Ok(())
    }

    /// Close a drop that was duplicated to the whole party (AUTO mode):
    /// ASSIGNED with no single assignee.
    pub fn assign_shared(&mut self) -> Result<(), DomainError> {
        if self.status == LootStatus::Assigned {
            return Err(DomainError::AlreadyAssigned(self.id.to_string()));
        }
        self.status = LootStatus::Assigned;
        self.assigned_to = None;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
