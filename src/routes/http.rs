//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler resolves the caller from the bearer token first; errors map
//! to JSON bodies through `CoreError`'s `IntoResponse`.

use std::sync::Arc;

use axum::{
  extract::{Path, State},
  http::HeaderMap,
  response::IntoResponse,
  Json,
};
use chrono::Utc;
use tracing::{info, instrument};

use crate::achievements::UnlockOutcome;
use crate::balancer::BalanceReport;
use crate::errors::CoreResult;
use crate::ledger::{AwardOutcome, Reconciliation};
use crate::logic;
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { ok: true })
}

#[instrument(level = "info", skip_all)]
pub async fn http_get_progress(State(state): State<Arc<AppState>>, headers: HeaderMap) -> CoreResult<Json<ProgressOut>> {
  let who = state.verifier.identify(&headers)?;
  Ok(Json(logic::get_progress(&state, &who).await))
}

#[instrument(level = "info", skip_all)]
pub async fn http_post_streak(State(state): State<Arc<AppState>>, headers: HeaderMap) -> CoreResult<Json<StreakOut>> {
  let who = state.verifier.identify(&headers)?;
  let out = logic::update_streak(&state, &who, Utc::now()).await?;
  info!(target: "progress", learner = %who.learner_id, streak = out.streak.current_streak, "HTTP streak updated");
  Ok(Json(out))
}

#[instrument(level = "info", skip_all)]
pub async fn http_post_check_achievements(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
) -> CoreResult<Json<UnlockOutcome>> {
  let who = state.verifier.identify(&headers)?;
  Ok(Json(logic::check_achievements(&state, &who, Utc::now()).await?))
}

#[instrument(level = "info", skip_all)]
pub async fn http_get_achievements(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
) -> CoreResult<Json<Vec<AchievementOut>>> {
  let who = state.verifier.identify(&headers)?;
  Ok(Json(logic::list_achievements(&state, &who).await))
}

#[instrument(level = "info", skip(state, headers, body), fields(lesson = %body.lesson_id))]
pub async fn http_post_lesson_complete(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(body): Json<LessonCompleteIn>,
) -> CoreResult<Json<LessonCompleteOut>> {
  let who = state.verifier.identify(&headers)?;
  Ok(Json(logic::complete_lesson(&state, &who, &body.lesson_id, Utc::now()).await?))
}

#[instrument(level = "info", skip(state, headers))]
pub async fn http_get_quiz(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Path(quiz_id): Path<String>,
) -> CoreResult<Json<QuizOut>> {
  state.verifier.identify(&headers)?;
  Ok(Json(logic::get_quiz(&state, &quiz_id)?))
}

#[instrument(level = "info", skip(state, headers, body), fields(quiz = %body.quiz_id))]
pub async fn http_post_quiz_submit(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(body): Json<QuizSubmitIn>,
) -> CoreResult<Json<QuizSubmitOut>> {
  let who = state.verifier.identify(&headers)?;
  Ok(Json(logic::submit_quiz(&state, &who, body, Utc::now()).await?))
}

#[instrument(level = "info", skip(state, headers))]
pub async fn http_get_attempt(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Path(attempt_id): Path<String>,
) -> CoreResult<Json<AttemptOut>> {
  let who = state.verifier.identify(&headers)?;
  Ok(Json(logic::get_attempt(&state, &who, &attempt_id).await?))
}

#[instrument(level = "info", skip(state, headers, body), fields(learner = %body.learner_id, amount = body.amount))]
pub async fn http_post_admin_xp(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(body): Json<AdminXpIn>,
) -> CoreResult<Json<AwardOutcome>> {
  let who = state.verifier.identify(&headers)?;
  Ok(Json(logic::admin_award_xp(&state, &who, body, Utc::now()).await?))
}

#[instrument(level = "info", skip_all)]
pub async fn http_get_pending_attempts(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
) -> CoreResult<Json<Vec<AttemptOut>>> {
  let who = state.verifier.identify(&headers)?;
  Ok(Json(logic::pending_attempts(&state, &who).await?))
}

#[instrument(level = "info", skip(state, headers, body), fields(grades = body.grades.len()))]
pub async fn http_post_grade_attempt(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Path(attempt_id): Path<String>,
  Json(body): Json<GradeIn>,
) -> CoreResult<Json<AttemptOut>> {
  let who = state.verifier.identify(&headers)?;
  let grades = body.grades.into_iter().map(Into::into).collect();
  Ok(Json(logic::grade_attempt(&state, &who, &attempt_id, grades, Utc::now()).await?))
}

#[instrument(level = "info", skip(state, headers))]
pub async fn http_get_reconcile(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Path(learner_id): Path<String>,
) -> CoreResult<Json<Reconciliation>> {
  let who = state.verifier.identify(&headers)?;
  Ok(Json(logic::reconcile_learner(&state, &who, &learner_id).await?))
}

#[instrument(level = "info", skip(body), fields(equation = %body.equation))]
pub async fn http_post_balance(Json(body): Json<BalanceIn>) -> CoreResult<Json<BalanceReport>> {
  let report = logic::balance(&body)?;
  info!(target: "lophoc_backend", balanced = report.balanced, "HTTP balance checked");
  Ok(Json(report))
}
