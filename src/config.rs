//! Loading service configuration (policy, auth, storage, notifications and
//! extra catalog content) from TOML, with a few env overrides.
//!
//! See `AppConfig` for the expected schema. Configuration is a plain value
//! handed to `AppState`; nothing here is process-global.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::domain::{Achievement, Quiz};
use crate::streak::StreakPolicy;

pub const DEFAULT_JWT_SECRET: &str = "CHANGE_THIS_SECRET_IN_PRODUCTION";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub policy: PolicyCfg,
  #[serde(default)]
  pub auth: AuthCfg,
  #[serde(default)]
  pub storage: StorageCfg,
  #[serde(default)]
  pub notifications: NotificationCfg,
  /// Added to (or replacing, by code) the built-in achievement catalog.
  #[serde(default)]
  pub achievements: Vec<Achievement>,
  /// Added to (or replacing, by id) the built-in quiz bank.
  #[serde(default)]
  pub quizzes: Vec<Quiz>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PolicyCfg {
  #[serde(default = "default_lesson_xp")]
  pub lesson_xp: u32,
  #[serde(default)]
  pub streak: StreakPolicy,
}

fn default_lesson_xp() -> u32 { 10 }

impl Default for PolicyCfg {
  fn default() -> Self {
    Self { lesson_xp: default_lesson_xp(), streak: StreakPolicy::default() }
  }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AuthCfg {
  #[serde(default = "default_secret")]
  pub jwt_secret: String,
  #[serde(default = "default_issuer")]
  pub issuer: String,
  #[serde(default = "default_audience")]
  pub audience: String,
}

fn default_secret() -> String { DEFAULT_JWT_SECRET.into() }
fn default_issuer() -> String { "lophoc".into() }
fn default_audience() -> String { "lophoc-web".into() }

impl Default for AuthCfg {
  fn default() -> Self {
    Self { jwt_secret: default_secret(), issuer: default_issuer(), audience: default_audience() }
  }
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct StorageCfg {
  /// Directory of per-learner JSON snapshots. In-memory only when unset.
  #[serde(default)]
  pub data_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NotificationCfg {
  #[serde(default)]
  pub webhook_url: Option<String>,
  #[serde(default = "default_pending_template")]
  pub pending_grade_template: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_pending_template() -> String {
  "Bài làm {attempt_id} của học viên {learner_id} (đề \"{quiz_title}\") có {essay_count} câu tự luận cần chấm.".into()
}
fn default_timeout_secs() -> u64 { 10 }

impl Default for NotificationCfg {
  fn default() -> Self {
    Self {
      webhook_url: None,
      pending_grade_template: default_pending_template(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

pub fn parse_config(s: &str) -> Result<AppConfig, toml::de::Error> {
  toml::from_str::<AppConfig>(s)
}

/// Attempt to load `AppConfig` from LOPHOC_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_from_env() -> Option<AppConfig> {
  let path = std::env::var("LOPHOC_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_config(&s) {
      Ok(cfg) => {
        info!(target: "lophoc_backend", %path, "Loaded config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "lophoc_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "lophoc_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

/// JWT_SECRET, DATA_DIR and ADMIN_WEBHOOK_URL win over the file.
pub fn apply_env_overrides(mut cfg: AppConfig) -> AppConfig {
  if let Ok(secret) = std::env::var("JWT_SECRET") {
    cfg.auth.jwt_secret = secret;
  }
  if let Ok(dir) = std::env::var("DATA_DIR") {
    cfg.storage.data_dir = Some(PathBuf::from(dir));
  }
  if let Ok(url) = std::env::var("ADMIN_WEBHOOK_URL") {
    cfg.notifications.webhook_url = Some(url);
  }
  if cfg.auth.jwt_secret == DEFAULT_JWT_SECRET {
    warn!(target: "lophoc_backend", "JWT secret is the built-in default; set JWT_SECRET in production");
  }
  cfg
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_file_yields_defaults() {
    let cfg = parse_config("").unwrap();
    assert_eq!(cfg.policy.lesson_xp, 10);
    assert_eq!(cfg.policy.streak, StreakPolicy::default());
    assert_eq!(cfg.auth.issuer, "lophoc");
    assert!(cfg.storage.data_dir.is_none());
    assert!(cfg.notifications.pending_grade_template.contains("{attempt_id}"));
  }

  #[test]
  fn parses_policy_and_catalog_sections() {
    let cfg = parse_config(
      r#"
        [policy]
        lesson_xp = 20
        [policy.streak]
        bonus_per_day = 3
        bonus_cap = 30

        [storage]
        data_dir = "/var/lib/lophoc"

        [[achievements]]
        code = "quiz_10"
        name = "Chăm chỉ"
        xp_reward = 40
        rule = { kind = "quizzes_completed", at_least = 10 }

        [[quizzes]]
        id = "vatly-1"
        title = "Chuyển động thẳng đều"
        [[quizzes.questions]]
        id = "c1"
        prompt = "Vận tốc có đơn vị là?"
        kind = "multiple_choice"
        options = ["m/s", "kg", "N"]
        correct_option = 0
      "#,
    )
    .unwrap();
    assert_eq!(cfg.policy.lesson_xp, 20);
    assert_eq!(cfg.policy.streak.bonus_cap, 30);
    assert_eq!(cfg.storage.data_dir, Some(PathBuf::from("/var/lib/lophoc")));
    assert_eq!(cfg.achievements[0].xp_reward, 40);
    assert_eq!(cfg.quizzes[0].questions[0].correct_option, Some(0));
  }
}
