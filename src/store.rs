//! Per-learner record store.
//!
//! Each learner has one async mutex. An operation runs against a clone of the
//! record; only if every step succeeds and the optional JSON snapshot is
//! written does the clone replace the live record. Different learners never
//! contend.

use std::{
  collections::HashMap,
  fs,
  path::{Path, PathBuf},
  sync::Arc,
};

use chrono::{DateTime, Utc};
use tokio::fs as async_fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::domain::LearnerRecord;
use crate::errors::{CoreError, CoreResult};

type Slot = Arc<Mutex<Option<LearnerRecord>>>;

#[derive(Clone, Default)]
pub struct Store {
  slots: Arc<RwLock<HashMap<String, Slot>>>,
  /// attempt id -> learner id
  attempt_owner: Arc<RwLock<HashMap<String, String>>>,
  data_dir: Option<PathBuf>,
}

/// Learner ids double as file names.
pub fn is_safe_id(id: &str) -> bool {
  !id.is_empty() && id.len() <= 128 && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl Store {
  pub fn in_memory() -> Self {
    Self::default()
  }

  /// Opens a directory of `<learner>.json` snapshots, creating it if needed.
  #[instrument(level = "info", fields(dir = %dir.display()))]
  pub fn open(dir: &Path) -> CoreResult<Self> {
    fs::create_dir_all(dir).map_err(|e| CoreError::Persistence(format!("create {}: {}", dir.display(), e)))?;

    let mut slots = HashMap::new();
    let mut owners = HashMap::new();
    let entries = fs::read_dir(dir).map_err(|e| CoreError::Persistence(format!("read {}: {}", dir.display(), e)))?;
    for entry in entries.flatten() {
      let path = entry.path();
      if path.extension().and_then(|e| e.to_str()) != Some("json") {
        continue;
      }
      let rec = match fs::read_to_string(&path).map_err(|e| e.to_string()).and_then(|s| {
        serde_json::from_str::<LearnerRecord>(&s).map_err(|e| e.to_string())
      }) {
        Ok(r) => r,
        Err(e) => {
          error!(target: "lophoc_backend", path = %path.display(), error = %e, "Skipping unreadable learner snapshot");
          continue;
        }
      };
      for a in &rec.attempts {
        owners.insert(a.id.clone(), rec.learner_id.clone());
      }
      slots.insert(rec.learner_id.clone(), Arc::new(Mutex::new(Some(rec))));
    }
    info!(target: "lophoc_backend", learners = slots.len(), "Learner store loaded");

    Ok(Self {
      slots: Arc::new(RwLock::new(slots)),
      attempt_owner: Arc::new(RwLock::new(owners)),
      data_dir: Some(dir.to_path_buf()),
    })
  }

  async fn slot(&self, learner_id: &str) -> Slot {
    if let Some(s) = self.slots.read().await.get(learner_id) {
      return s.clone();
    }
    self.slots.write().await.entry(learner_id.to_string()).or_default().clone()
  }

  /// Snapshot of a learner's record, if the learner has ever been active.
  pub async fn get(&self, learner_id: &str) -> Option<LearnerRecord> {
    let slot = { self.slots.read().await.get(learner_id).cloned() }?;
    let guard = slot.lock().await;
    guard.clone()
  }

  pub async fn owner_of_attempt(&self, attempt_id: &str) -> Option<String> {
    self.attempt_owner.read().await.get(attempt_id).cloned()
  }

  pub async fn learner_ids(&self) -> Vec<String> {
    self.slots.read().await.keys().cloned().collect()
  }

  /// Runs `f` as one unit of work on the learner's record. The record is
  /// created on first use; creation is only kept if `f` commits.
  pub async fn transact<T, F>(&self, learner_id: &str, now: DateTime<Utc>, f: F) -> CoreResult<T>
  where
    F: FnOnce(&mut LearnerRecord) -> CoreResult<T>,
  {
    if !is_safe_id(learner_id) {
      return Err(CoreError::Validation(format!("invalid learner id {:?}", learner_id)));
    }
    let slot = self.slot(learner_id).await;
    let mut guard = slot.lock().await;

    let mut draft = guard.clone().unwrap_or_else(|| LearnerRecord::new(learner_id, now));
    let known_attempts = draft.attempts.len();
    let committed = match f(&mut draft) {
      Ok(out) => self.persist(&draft).await.map(|_| out),
      Err(e) => Err(e),
    };
    let out = match committed {
      Ok(out) => out,
      Err(e) => {
        if guard.is_none() {
          self.forget_slot(learner_id, &slot).await;
        }
        return Err(e);
      }
    };

    let new_attempts: Vec<String> = draft.attempts[known_attempts..].iter().map(|a| a.id.clone()).collect();
    *guard = Some(draft);
    drop(guard);

    if !new_attempts.is_empty() {
      let mut owners = self.attempt_owner.write().await;
      for id in new_attempts {
        owners.insert(id, learner_id.to_string());
      }
    }
    Ok(out)
  }

  /// Removes a slot that never held a committed record. Callers that already
  /// cloned the slot may still commit into it, so it is kept while shared.
  async fn forget_slot(&self, learner_id: &str, slot: &Slot) {
    let mut slots = self.slots.write().await;
    let ours = slots.get(learner_id).is_some_and(|s| Arc::ptr_eq(s, slot));
    // One reference in the map, one held by the caller.
    if ours && Arc::strong_count(slot) == 2 {
      slots.remove(learner_id);
    }
  }

  async fn persist(&self, rec: &LearnerRecord) -> CoreResult<()> {
    let Some(dir) = &self.data_dir else { return Ok(()) };
    let path = dir.join(format!("{}.json", rec.learner_id));
    let tmp = dir.join(format!("{}.json.tmp", rec.learner_id));
    let body = serde_json::to_vec_pretty(rec).map_err(|e| CoreError::Persistence(e.to_string()))?;

    let written = match async_fs::write(&tmp, body).await {
      Ok(()) => async_fs::rename(&tmp, &path).await,
      Err(e) => Err(e),
    };
    if let Err(e) = written {
      warn!(target: "lophoc_backend", path = %path.display(), error = %e, "Snapshot write failed");
      let _ = async_fs::remove_file(&tmp).await;
      return Err(CoreError::Persistence(format!("write {}: {}", path.display(), e)));
    }
    debug!(target: "lophoc_backend", learner = %rec.learner_id, "Snapshot written");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::XpSourceType;
  use crate::ledger::{award, AwardRequest};

  #[tokio::test]
  async fn failed_step_leaves_no_trace() {
    let store = Store::in_memory();
    let res: CoreResult<()> = store
      .transact("hs-02", Utc::now(), |rec| {
        award(rec, AwardRequest::new(30, XpSourceType::Manual), Utc::now())?;
        Err(CoreError::Validation("later step failed".into()))
      })
      .await;
    assert!(res.is_err());
    assert!(store.get("hs-02").await.is_none());
    assert!(store.learner_ids().await.is_empty());
  }

  #[tokio::test]
  async fn failed_first_write_leaves_no_slot() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    fs::create_dir(dir.path().join("hs-06.json.tmp")).unwrap();
    let res = store
      .transact("hs-06", Utc::now(), |rec| award(rec, AwardRequest::new(20, XpSourceType::Manual), Utc::now()))
      .await;
    assert!(matches!(res, Err(CoreError::Persistence(_))));
    assert!(store.learner_ids().await.is_empty());
    assert!(!dir.path().join("hs-06.json").exists());

    // Once the path is clear the learner commits normally.
    fs::remove_dir(dir.path().join("hs-06.json.tmp")).unwrap();
    store
      .transact("hs-06", Utc::now(), |rec| award(rec, AwardRequest::new(20, XpSourceType::Manual), Utc::now()))
      .await
      .unwrap();
    assert_eq!(store.learner_ids().await, vec!["hs-06".to_string()]);
    assert!(dir.path().join("hs-06.json").exists());
    assert!(!dir.path().join("hs-06.json.tmp").exists());
  }

  #[tokio::test]
  async fn committed_learner_keeps_slot_after_later_failure() {
    let store = Store::in_memory();
    store.transact("hs-07", Utc::now(), |_| Ok(())).await.unwrap();
    let res: CoreResult<()> = store
      .transact("hs-07", Utc::now(), |_| Err(CoreError::Validation("nope".into())))
      .await;
    assert!(res.is_err());
    assert!(store.get("hs-07").await.is_some());
  }

  #[tokio::test]
  async fn concurrent_awards_are_serialized() {
    let store = Store::in_memory();
    let mut handles = Vec::new();
    for _ in 0..50 {
      let s = store.clone();
      handles.push(tokio::spawn(async move {
        s.transact("hs-03", Utc::now(), |rec| award(rec, AwardRequest::new(10, XpSourceType::Manual), Utc::now()))
          .await
          .unwrap();
      }));
    }
    for h in handles {
      h.await.unwrap();
    }
    let rec = store.get("hs-03").await.unwrap();
    assert_eq!(rec.progress.total_xp, 500);
    assert_eq!(rec.transactions.len(), 50);
  }

  #[tokio::test]
  async fn snapshots_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
      let store = Store::open(dir.path()).unwrap();
      store
        .transact("hs-04", Utc::now(), |rec| award(rec, AwardRequest::new(70, XpSourceType::Manual), Utc::now()))
        .await
        .unwrap();
    }
    let reopened = Store::open(dir.path()).unwrap();
    let rec = reopened.get("hs-04").await.unwrap();
    assert_eq!(rec.progress.total_xp, 70);
    assert_eq!(rec.progress.current_level, 2);
  }

  #[tokio::test]
  async fn write_failure_discards_the_unit_of_work() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    store
      .transact("hs-05", Utc::now(), |rec| award(rec, AwardRequest::new(20, XpSourceType::Manual), Utc::now()))
      .await
      .unwrap();

    // A directory squatting on the temp file name makes the next write fail.
    fs::create_dir(dir.path().join("hs-05.json.tmp")).unwrap();
    let res = store
      .transact("hs-05", Utc::now(), |rec| award(rec, AwardRequest::new(500, XpSourceType::Manual), Utc::now()))
      .await;
    assert!(matches!(res, Err(CoreError::Persistence(_))));

    let rec = store.get("hs-05").await.unwrap();
    assert_eq!(rec.progress.total_xp, 20);
    assert_eq!(rec.transactions.len(), 1);
  }

  #[tokio::test]
  async fn rejects_unsafe_ids() {
    let store = Store::in_memory();
    let res = store.transact("../etc", Utc::now(), |_| Ok(())).await;
    assert!(matches!(res, Err(CoreError::Validation(_))));
  }
}
