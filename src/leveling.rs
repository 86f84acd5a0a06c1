//! Leveling curve.
//!
//! Completing level `L` takes `50 * L^2` cumulative XP, so level `L` starts at
//! `50 * (L - 1)^2`. Level ranges are closed-open: XP exactly at a level's
//! start belongs to that level.

const XP_CURVE_FACTOR: u64 = 50;

/// Cumulative XP at which level `level` is complete.
pub fn xp_to_complete(level: u32) -> u64 {
  curve(level as u64)
}

/// First XP total that belongs to `level` (level 1 starts at 0).
pub fn min_xp_for_level(level: u32) -> u64 {
  xp_to_complete(level.saturating_sub(1))
}

/// Maps total XP to `(level, xp_to_next_level)`. Pure and total. Past the
/// last level whose start fits in a `u64`, `xp_to_next_level` is 0.
pub fn level_for_xp(total_xp: u64) -> (u32, u64) {
  // Float sqrt only seeds the search; integer steps make it exact.
  let mut completed = ((total_xp / XP_CURVE_FACTOR) as f64).sqrt() as u64;
  while completed > 0 && curve(completed) > total_xp {
    completed -= 1;
  }
  // A saturated curve value is unreachable, not a level start.
  while curve(completed + 1) != u64::MAX && curve(completed + 1) <= total_xp {
    completed += 1;
  }

  let level = (completed + 1).min(u32::MAX as u64) as u32;
  let to_next = min_xp_for_level(level.saturating_add(1)).saturating_sub(total_xp);
  (level, to_next)
}

/// `50 * n^2`, saturating at `u64::MAX`. 50·n² is even, so `u64::MAX` is
/// never an exact value.
fn curve(n: u64) -> u64 {
  n.checked_mul(n)
    .and_then(|sq| sq.checked_mul(XP_CURVE_FACTOR))
    .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn zero_xp_is_level_one() {
    assert_eq!(level_for_xp(0), (1, 50));
  }

  #[test]
  fn boundary_belongs_to_the_new_level() {
    assert_eq!(level_for_xp(49), (1, 1));
    assert_eq!(level_for_xp(50), (2, 150));
    assert_eq!(level_for_xp(199), (2, 1));
    assert_eq!(level_for_xp(200), (3, 250));
    for level in 1..200u32 {
      let start = min_xp_for_level(level);
      assert_eq!(level_for_xp(start).0, level, "start of level {}", level);
      if start > 0 {
        assert_eq!(level_for_xp(start - 1).0, level - 1);
      }
    }
  }

  #[test]
  fn level_is_monotonic_and_brackets_total() {
    let mut prev = 1;
    for xp in 0..20_000u64 {
      let (level, to_next) = level_for_xp(xp);
      assert!(level >= prev);
      assert!(min_xp_for_level(level) <= xp);
      assert!(xp < min_xp_for_level(level + 1));
      assert_eq!(to_next, min_xp_for_level(level + 1) - xp);
      prev = level;
    }
  }

  #[test]
  fn large_totals_do_not_overflow() {
    let (level, to_next) = level_for_xp(50 * 1_000_000 * 1_000_000);
    assert_eq!(level, 1_000_001);
    assert_eq!(to_next, xp_to_complete(level) - 50 * 1_000_000 * 1_000_000);
  }

  #[test]
  fn saturated_totals_terminate() {
    // floor(sqrt(u64::MAX / 50)) = 607_400_099 levels fully completed.
    assert_eq!(level_for_xp(u64::MAX), (607_400_100, 0));
    let (level, _) = level_for_xp(u64::MAX - 1);
    assert_eq!(level, 607_400_100);
    let (level, to_next) = level_for_xp(i64::MAX as u64);
    assert!(min_xp_for_level(level) <= i64::MAX as u64);
    assert!(to_next > 0);
  }
}
