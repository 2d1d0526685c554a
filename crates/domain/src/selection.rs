//! Weighted event template selection.
//!
//! Randomness is injected as a draw closure so callers (and tests) control
//! the source; the domain crate never touches an RNG directly.

use std::collections::HashSet;

use crate::entities::mission::MissionTemplate;
use crate::error::DomainError;
use crate::ids::EventTemplateId;

/// Pick the next event template for a session.
///
/// `excluded` holds template ids exhausted for this session (e.g. a boss
/// template after its first use). `draw` receives the total weight of the
/// eligible pool and must return a uniform value in `[0, total)`.
///
/// Fails with `Configuration` when no template is eligible; callers treat
/// that as "no further events, proceed to completion".
pub fn select_next(
    mission: &MissionTemplate,
    excluded: &HashSet<EventTemplateId>,
    draw: impl FnOnce(u64) -> u64,
) -> Result<EventTemplateId, DomainError> {
    let eligible: Vec<_> = mission
        .events()
        .iter()
        .filter(|e| !excluded.contains(&e.template_id))
        .collect();

    let total: u64 = eligible.iter().map(|e| u64::from(e.weight)).sum();
    if total == 0 {
        return Err(DomainError::configuration(format!(
            "mission {} has no eligible event templates",
            mission.id()
        )));
    }

    let mut roll = draw(total).min(total - 1);
    for entry in &eligible {
        let weight = u64::from(entry.weight);
        if roll < weight {
            return Ok(entry.template_id);
        }
        roll -= weight;
    }

    // Unreachable with a well-behaved draw; keep the last bucket as a
    // defensive fallback rather than panicking.
    Ok(eligible[eligible.len() - 1].template_id)
}
