//! Character leveling curve.
//!
//! Stat point spending happens outside the engine; this module only maps
//! accumulated experience to a level.

/// Hard level cap.
pub const MAX_LEVEL: u32 = 20;

/// Total experience required to reach `level`.
///
/// `xp_for_level(1) == 0`; beyond that the curve is
/// `(L-1)^2 * 100 + (L-1) * 50`.
pub fn xp_for_level(level: u32) -> u64 {
    if level <= 1 {
        return 0;
    }
    let n = u64::from(level - 1);
    n * n * 100 + n * 50
}

/// Current level for a character with `xp` accumulated experience,
/// capped at [`MAX_LEVEL`].
pub fn level_for_xp(xp: u64) -> u32 {
    let mut level = 1;
    while level < MAX_LEVEL && xp >= xp_for_level(level + 1) {
        level += 1;
    }
    level
}
