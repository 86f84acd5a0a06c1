//! Admin notifications for attempts waiting on essay grading.
//!
//! Every notice is logged. When a webhook is configured the notice is also
//! POSTed there as JSON. Failures are returned as `Err(String)` for the caller
//! to log; they never undo a committed attempt.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::NotificationCfg;
use crate::util::{fill_template, trunc_for_log};

#[derive(Clone, Debug, Serialize)]
pub struct PendingGradeNotice {
  pub attempt_id: String,
  pub learner_id: String,
  pub quiz_id: String,
  pub quiz_title: String,
  pub essay_count: usize,
  pub submitted_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
  event: &'static str,
  text: &'a str,
  notice: &'a PendingGradeNotice,
}

#[derive(Clone)]
struct Webhook {
  client: reqwest::Client,
  url: String,
}

#[derive(Clone)]
pub struct AdminNotifier {
  webhook: Option<Webhook>,
  template: String,
}

impl AdminNotifier {
  pub fn from_config(cfg: &NotificationCfg) -> Self {
    let webhook = cfg.webhook_url.as_ref().and_then(|url| {
      match reqwest::Client::builder().timeout(Duration::from_secs(cfg.timeout_secs)).build() {
        Ok(client) => Some(Webhook { client, url: url.clone() }),
        Err(e) => {
          error!(target: "lophoc_backend", error = %e, "Could not build webhook client; notices will only be logged");
          None
        }
      }
    });
    Self { webhook, template: cfg.pending_grade_template.clone() }
  }

  pub fn has_webhook(&self) -> bool {
    self.webhook.is_some()
  }

  pub fn render(&self, notice: &PendingGradeNotice) -> String {
    let essay_count = notice.essay_count.to_string();
    fill_template(
      &self.template,
      &[
        ("attempt_id", notice.attempt_id.as_str()),
        ("learner_id", notice.learner_id.as_str()),
        ("quiz_id", notice.quiz_id.as_str()),
        ("quiz_title", notice.quiz_title.as_str()),
        ("essay_count", essay_count.as_str()),
      ],
    )
  }

  #[instrument(level = "info", skip(self, notice), fields(attempt = %notice.attempt_id))]
  pub async fn pending_grade(&self, notice: &PendingGradeNotice) -> Result<(), String> {
    let text = self.render(notice);
    info!(target: "quiz", learner = %notice.learner_id, essays = notice.essay_count, message = %text, "Essay grading requested");

    let Some(hook) = &self.webhook else { return Ok(()) };
    let start = std::time::Instant::now();
    let res = hook
      .client
      .post(&hook.url)
      .header(USER_AGENT, "lophoc-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .json(&WebhookPayload { event: "quiz.pending_grade", text: &text, notice })
      .send()
      .await
      .map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_webhook_error(&body).unwrap_or_else(|| trunc_for_log(&body, 200));
      return Err(format!("webhook HTTP {}: {}", status, msg));
    }
    info!(target: "quiz", elapsed = ?start.elapsed(), "Admin webhook delivered");
    Ok(())
  }
}

/// Chat-style webhooks answer `{"error": "..."}` or `{"message": "..."}`.
fn extract_webhook_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EBody {
    #[serde(default)] error: Option<String>,
    #[serde(default)] message: Option<String>,
  }
  let b = serde_json::from_str::<EBody>(body).ok()?;
  b.error.or(b.message)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn notice() -> PendingGradeNotice {
    PendingGradeNotice {
      attempt_id: "a-1".into(),
      learner_id: "hs-01".into(),
      quiz_id: "vatly-10-luc".into(),
      quiz_title: "Định luật Newton".into(),
      essay_count: 1,
      submitted_at: Utc::now(),
    }
  }

  #[test]
  fn renders_default_template() {
    let n = AdminNotifier::from_config(&NotificationCfg::default());
    let text = n.render(&notice());
    assert!(text.contains("a-1"));
    assert!(text.contains("hs-01"));
    assert!(text.contains("Định luật Newton"));
    assert!(!n.has_webhook());
  }

  #[tokio::test]
  async fn log_only_notifier_succeeds() {
    let n = AdminNotifier::from_config(&NotificationCfg::default());
    assert!(n.pending_grade(&notice()).await.is_ok());
  }

  #[tokio::test]
  async fn unreachable_webhook_reports_error() {
    let cfg = NotificationCfg {
      webhook_url: Some("http://127.0.0.1:9/hooks/grading".into()),
      timeout_secs: 2,
      ..NotificationCfg::default()
    };
    let n = AdminNotifier::from_config(&cfg);
    assert!(n.has_webhook());
    assert!(n.pending_grade(&notice()).await.is_err());
  }

  #[test]
  fn extracts_error_messages() {
    assert_eq!(extract_webhook_error(r#"{"error":"bad token"}"#).as_deref(), Some("bad token"));
    assert_eq!(extract_webhook_error(r#"{"message":"nope"}"#).as_deref(), Some("nope"));
    assert_eq!(extract_webhook_error("<html>"), None);
  }
}
