//! XP ledger: append-only transaction log plus the derived running total.
//!
//! The log is the source of truth. `total_xp` is a cache that `replay_total`
//! can always rebuild, because the transaction row and the stat update are
//! applied to the same record inside one unit of work.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{LearnerRecord, XpSourceType, XpTransaction};
use crate::errors::{CoreError, CoreResult};
use crate::leveling::level_for_xp;

const MAX_TOTAL_XP: u64 = i64::MAX as u64;

#[derive(Clone, Debug)]
pub struct AwardRequest {
  pub amount: i64,
  pub source_type: XpSourceType,
  pub source_id: Option<String>,
  pub description: Option<String>,
  pub idempotency_key: Option<String>,
}

impl AwardRequest {
  pub fn new(amount: i64, source_type: XpSourceType) -> Self {
    Self { amount, source_type, source_id: None, description: None, idempotency_key: None }
  }

  pub fn source_id(mut self, id: impl Into<String>) -> Self {
    self.source_id = Some(id.into());
    self
  }

  pub fn description(mut self, text: impl Into<String>) -> Self {
    self.description = Some(text.into());
    self
  }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct AwardOutcome {
  pub success: bool,
  pub xp_awarded: i64,
  pub total_xp: u64,
  pub old_level: u32,
  pub new_level: u32,
  pub leveled_up: bool,
  /// Set when an idempotency key matched an earlier award and nothing was applied.
  #[serde(skip_serializing_if = "std::ops::Not::not")]
  pub deduplicated: bool,
}

/// Applies one signed delta with the floor at zero.
fn apply_delta(total: u64, amount: i64) -> u64 {
  let next = total as i128 + amount as i128;
  next.clamp(0, MAX_TOTAL_XP as i128) as u64
}

/// Appends a transaction and updates total/level in the same record.
pub fn award(rec: &mut LearnerRecord, req: AwardRequest, now: DateTime<Utc>) -> CoreResult<AwardOutcome> {
  if req.amount == 0 {
    return Err(CoreError::Validation("XP amount must be non-zero".into()));
  }
  if req.amount < 0 && req.source_type != XpSourceType::AdminAdjustment {
    return Err(CoreError::Validation(format!(
      "negative XP is only allowed for admin_adjustment, got {}",
      req.source_type.as_str()
    )));
  }

  let level = rec.progress.current_level;
  if let Some(key) = req.idempotency_key.as_deref() {
    if let Some(prev) = rec.transactions.iter().find(|t| t.idempotency_key.as_deref() == Some(key)) {
      debug!(target: "progress", learner = %rec.learner_id, %key, "Duplicate XP award ignored");
      return Ok(AwardOutcome {
        success: true,
        xp_awarded: prev.amount,
        total_xp: rec.progress.total_xp,
        old_level: level,
        new_level: level,
        leveled_up: false,
        deduplicated: true,
      });
    }
  }

  rec.transactions.push(XpTransaction {
    id: Uuid::new_v4().to_string(),
    amount: req.amount,
    source_type: req.source_type,
    source_id: req.source_id,
    description: req.description,
    idempotency_key: req.idempotency_key,
    created_at: now,
  });

  let total = apply_delta(rec.progress.total_xp, req.amount);
  let (new_level, to_next) = level_for_xp(total);
  rec.progress.total_xp = total;
  rec.progress.current_level = new_level;
  rec.progress.xp_to_next_level = to_next;

  debug!(
    target: "progress",
    learner = %rec.learner_id,
    amount = req.amount,
    source = req.source_type.as_str(),
    total,
    old_level = level,
    new_level,
    "XP applied"
  );

  Ok(AwardOutcome {
    success: true,
    xp_awarded: req.amount,
    total_xp: total,
    old_level: level,
    new_level,
    leveled_up: new_level > level,
    deduplicated: false,
  })
}

/// Rebuilds the running total from the log, in order, with the same floor rule.
pub fn replay_total(transactions: &[XpTransaction]) -> u64 {
  transactions.iter().fold(0, |total, tx| apply_delta(total, tx.amount))
}

#[derive(Clone, Debug, Serialize)]
pub struct Reconciliation {
  pub learner_id: String,
  pub transaction_count: usize,
  pub stored_total_xp: u64,
  pub replayed_total_xp: u64,
  pub drift: i64,
  pub consistent: bool,
}

pub fn reconcile(rec: &LearnerRecord) -> Reconciliation {
  let replayed = replay_total(&rec.transactions);
  let stored = rec.progress.total_xp;
  Reconciliation {
    learner_id: rec.learner_id.clone(),
    transaction_count: rec.transactions.len(),
    stored_total_xp: stored,
    replayed_total_xp: replayed,
    drift: stored as i64 - replayed as i64,
    consistent: stored == replayed,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn learner() -> LearnerRecord {
    LearnerRecord::new("hs-01", Utc::now())
  }

  #[test]
  fn award_updates_total_and_level() {
    let mut rec = learner();
    let out = award(&mut rec, AwardRequest::new(60, XpSourceType::LessonComplete), Utc::now()).unwrap();
    assert_eq!(out.total_xp, 60);
    assert_eq!(out.old_level, 1);
    assert_eq!(out.new_level, 2);
    assert!(out.leveled_up);
    assert_eq!(rec.progress.xp_to_next_level, 140);
    assert_eq!(rec.transactions.len(), 1);
  }

  #[test]
  fn negative_adjustment_floors_at_zero() {
    let mut rec = learner();
    award(&mut rec, AwardRequest::new(50, XpSourceType::Manual), Utc::now()).unwrap();
    let out = award(&mut rec, AwardRequest::new(-1000, XpSourceType::AdminAdjustment), Utc::now()).unwrap();
    assert_eq!(out.total_xp, 0);
    assert_eq!(out.new_level, 1);
    assert!(!out.leveled_up);
    assert_eq!(replay_total(&rec.transactions), 0);
  }

  #[test]
  fn award_then_matching_correction_restores_total() {
    let mut rec = learner();
    award(&mut rec, AwardRequest::new(120, XpSourceType::Manual), Utc::now()).unwrap();
    award(&mut rec, AwardRequest::new(30, XpSourceType::Manual), Utc::now()).unwrap();
    award(&mut rec, AwardRequest::new(-30, XpSourceType::AdminAdjustment), Utc::now()).unwrap();
    assert_eq!(rec.progress.total_xp, 120);
  }

  #[test]
  fn rejects_zero_and_negative_grants() {
    let mut rec = learner();
    assert!(matches!(
      award(&mut rec, AwardRequest::new(0, XpSourceType::Manual), Utc::now()),
      Err(CoreError::Validation(_))
    ));
    assert!(matches!(
      award(&mut rec, AwardRequest::new(-5, XpSourceType::QuizComplete), Utc::now()),
      Err(CoreError::Validation(_))
    ));
    assert!(rec.transactions.is_empty());
  }

  #[test]
  fn idempotency_key_applies_once() {
    let mut rec = learner();
    let mut req = AwardRequest::new(40, XpSourceType::Manual);
    req.idempotency_key = Some("bonus-2026-10".into());
    let first = award(&mut rec, req.clone(), Utc::now()).unwrap();
    let second = award(&mut rec, req, Utc::now()).unwrap();
    assert!(!first.deduplicated);
    assert!(second.deduplicated);
    assert_eq!(second.total_xp, 40);
    assert_eq!(rec.transactions.len(), 1);
  }

  #[test]
  fn reconcile_detects_drift() {
    let mut rec = learner();
    award(&mut rec, AwardRequest::new(75, XpSourceType::Manual), Utc::now()).unwrap();
    assert!(reconcile(&rec).consistent);

    rec.progress.total_xp = 90;
    let r = reconcile(&rec);
    assert!(!r.consistent);
    assert_eq!(r.replayed_total_xp, 75);
    assert_eq!(r.drift, 15);
  }
}
