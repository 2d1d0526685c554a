//! Monster roster generation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use delve_domain::{ActorId, ActorSnapshot, Rarity, SpawnRules};

use crate::infrastructure::ports::{RandomPort, SpawnError, SpawnerPort};

/// Base swing interval before the attack speed multiplier.
const BASE_ATTACK_INTERVAL_MS: f32 = 4000.0;

/// Rolls combat rosters from spawn rules.
///
/// Each spawned actor's first swing is pushed out by a random stagger so a
/// fresh pack does not attack in lockstep.
pub struct RosterSpawner {
    random: Arc<dyn RandomPort>,
    stagger_max_ms: u64,
}

impl RosterSpawner {
    pub fn new(random: Arc<dyn RandomPort>, stagger_max_ms: u64) -> Self {
        Self {
            random,
            stagger_max_ms,
        }
    }

    fn roll_rarity(&self, rules: &SpawnRules) -> Rarity {
        let roll = self.random.gen_range(1, 100);
        if roll <= u64::from(rules.rare_chance) {
            Rarity::Rare
        } else if roll <= u64::from(rules.rare_chance + rules.elite_chance) {
            Rarity::Elite
        } else {
            Rarity::Common
        }
    }
}

#[async_trait]
impl SpawnerPort for RosterSpawner {
    async fn generate(
        &self,
        rules: &SpawnRules,
        boss: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<ActorSnapshot>, SpawnError> {
        if rules.monsters.is_empty() {
            return Err(SpawnError::Generation("spawn rules list no monsters".into()));
        }
        if rules.min_count == 0 || rules.min_count > rules.max_count {
            return Err(SpawnError::Generation(format!(
                "bad spawn count range {}..={}",
                rules.min_count, rules.max_count
            )));
        }

        let count = self
            .random
            .gen_range(u64::from(rules.min_count), u64::from(rules.max_count));

        let mut roster = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let pick = self.random.gen_range(0, rules.monsters.len() as u64 - 1) as usize;
            let template = &rules.monsters[pick];
            let rarity = if boss {
                Rarity::Boss
            } else {
                self.roll_rarity(rules)
            };
            let scale = rarity.stat_multiplier();

            let health = ((template.health as f32) * scale).round() as u32;
            let interval_ms = if template.attack_speed > 0.0 {
                (BASE_ATTACK_INTERVAL_MS / template.attack_speed).round() as i64
            } else {
                BASE_ATTACK_INTERVAL_MS as i64
            };
            let stagger = self.random.gen_range(0, self.stagger_max_ms) as i64;

            roster.push(ActorSnapshot {
                id: ActorId::new(),
                template_id: template.id,
                name: template.name.clone(),
                current_health: health.max(1),
                max_health: health.max(1),
                attack: ((template.attack as f32) * scale).round() as u32,
                defense: ((template.defense as f32) * scale).round() as u32,
                rarity,
                attack_interval_ms: interval_ms,
                next_attack_at: now + chrono::Duration::milliseconds(interval_ms + stagger),
            });
        }
        Ok(roster)
    }
}
