//! Daily streak state machine. Days are UTC calendar days everywhere.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{LearnerRecord, XpSourceType};
use crate::errors::CoreResult;
use crate::ledger::{award, AwardOutcome, AwardRequest};

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct StreakPolicy {
  #[serde(default = "default_bonus_per_day")] pub bonus_per_day: u32,
  #[serde(default = "default_bonus_cap")] pub bonus_cap: u32,
}

fn default_bonus_per_day() -> u32 { 5 }
fn default_bonus_cap() -> u32 { 50 }

impl Default for StreakPolicy {
  fn default() -> Self {
    Self { bonus_per_day: default_bonus_per_day(), bonus_cap: default_bonus_cap() }
  }
}

impl StreakPolicy {
  /// Bonus for reaching `streak` consecutive days.
  pub fn bonus_for(&self, streak: u32) -> u32 {
    streak.saturating_mul(self.bonus_per_day).min(self.bonus_cap)
  }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct StreakOutcome {
  pub success: bool,
  pub current_streak: u32,
  pub longest_streak: u32,
  pub streak_continued: bool,
  pub streak_broken: bool,
  pub bonus_xp: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub bonus_award: Option<AwardOutcome>,
}

/// UTC calendar day of an instant.
pub fn utc_day(now: DateTime<Utc>) -> NaiveDate {
  now.date_naive()
}

/// Records one qualifying activity on `now`'s UTC day. Applying it again on
/// the same day changes nothing.
pub fn record_activity(rec: &mut LearnerRecord, now: DateTime<Utc>, policy: &StreakPolicy) -> CoreResult<StreakOutcome> {
  let today = utc_day(now);
  let previous = rec.progress.current_streak;

  let mut continued = false;
  let mut broken = false;
  match rec.progress.last_activity_date {
    // Later than today only happens with clock skew; treat as already counted.
    Some(last) if last >= today => {
      return Ok(StreakOutcome {
        success: true,
        current_streak: previous,
        longest_streak: rec.progress.longest_streak,
        streak_continued: false,
        streak_broken: false,
        bonus_xp: 0,
        bonus_award: None,
      });
    }
    Some(last) if last + Duration::days(1) == today => {
      rec.progress.current_streak = previous.saturating_add(1);
      continued = true;
    }
    _ => {
      rec.progress.current_streak = 1;
      broken = previous > 0;
    }
  }

  rec.progress.last_activity_date = Some(today);
  rec.progress.longest_streak = rec.progress.longest_streak.max(rec.progress.current_streak);

  let mut bonus_xp = 0;
  let mut bonus_award = None;
  if continued {
    bonus_xp = policy.bonus_for(rec.progress.current_streak);
    if bonus_xp > 0 {
      let req = AwardRequest::new(bonus_xp as i64, XpSourceType::StreakBonus)
        .source_id(today.to_string())
        .description(format!("Chuỗi {} ngày", rec.progress.current_streak));
      bonus_award = Some(award(rec, req, now)?);
    }
  }

  info!(
    target: "progress",
    learner = %rec.learner_id,
    streak = rec.progress.current_streak,
    continued,
    broken,
    bonus_xp,
    "Streak updated"
  );

  Ok(StreakOutcome {
    success: true,
    current_streak: rec.progress.current_streak,
    longest_streak: rec.progress.longest_streak,
    streak_continued: continued,
    streak_broken: broken,
    bonus_xp,
    bonus_award,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
  }

  fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  #[test]
  fn first_activity_starts_streak_without_break() {
    let mut rec = LearnerRecord::new("u", at(2026, 3, 1, 8));
    let out = record_activity(&mut rec, at(2026, 3, 1, 8), &StreakPolicy::default()).unwrap();
    assert_eq!(out.current_streak, 1);
    assert!(!out.streak_broken);
    assert!(!out.streak_continued);
    assert_eq!(rec.progress.last_activity_date, Some(day(2026, 3, 1)));
  }

  #[test]
  fn same_day_is_idempotent() {
    let mut rec = LearnerRecord::new("u", at(2026, 3, 1, 8));
    let policy = StreakPolicy::default();
    record_activity(&mut rec, at(2026, 3, 1, 8), &policy).unwrap();
    record_activity(&mut rec, at(2026, 3, 2, 1), &policy).unwrap();
    let xp = rec.progress.total_xp;
    let again = record_activity(&mut rec, at(2026, 3, 2, 23), &policy).unwrap();
    assert_eq!(again.current_streak, 2);
    assert!(!again.streak_continued && !again.streak_broken);
    assert_eq!(rec.progress.total_xp, xp);
  }

  #[test]
  fn consecutive_day_continues_and_awards_bonus() {
    let mut rec = LearnerRecord::new("u", at(2026, 3, 1, 8));
    rec.progress.current_streak = 4;
    rec.progress.longest_streak = 4;
    rec.progress.last_activity_date = Some(day(2026, 3, 1));
    let out = record_activity(&mut rec, at(2026, 3, 2, 9), &StreakPolicy::default()).unwrap();
    assert!(out.streak_continued);
    assert_eq!(out.current_streak, 5);
    assert_eq!(out.longest_streak, 5);
    assert_eq!(out.bonus_xp, 25);
    assert_eq!(rec.progress.total_xp, 25);
    assert_eq!(rec.transactions[0].source_type, XpSourceType::StreakBonus);
  }

  #[test]
  fn gap_breaks_streak_but_keeps_longest() {
    let mut rec = LearnerRecord::new("u", at(2026, 3, 1, 8));
    rec.progress.current_streak = 10;
    rec.progress.longest_streak = 10;
    rec.progress.last_activity_date = Some(day(2026, 3, 7));
    let out = record_activity(&mut rec, at(2026, 3, 10, 12), &StreakPolicy::default()).unwrap();
    assert_eq!(out.current_streak, 1);
    assert!(out.streak_broken);
    assert_eq!(out.longest_streak, 10);
    assert!(rec.transactions.is_empty());
  }

  #[test]
  fn bonus_is_capped() {
    let policy = StreakPolicy::default();
    assert_eq!(policy.bonus_for(2), 10);
    assert_eq!(policy.bonus_for(10), 50);
    assert_eq!(policy.bonus_for(365), 50);
  }

  #[test]
  fn zero_bonus_policy_skips_award() {
    let mut rec = LearnerRecord::new("u", at(2026, 3, 1, 8));
    rec.progress.current_streak = 1;
    rec.progress.last_activity_date = Some(day(2026, 3, 1));
    let policy = StreakPolicy { bonus_per_day: 0, bonus_cap: 0 };
    let out = record_activity(&mut rec, at(2026, 3, 2, 8), &policy).unwrap();
    assert!(out.streak_continued);
    assert!(out.bonus_award.is_none());
    assert!(rec.transactions.is_empty());
  }
}
