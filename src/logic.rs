//! Business operations behind the HTTP handlers.
//!
//! A learning action runs XP award, leveling, streak and achievements inside
//! one `Store::transact` call, so either all of it commits or none of it does.
//! Admin notices are sent after commit.

use chrono::{DateTime, Duration, Utc};
use tracing::{error, info, instrument, warn};

use crate::achievements::{self, UnlockOutcome};
use crate::auth::Identity;
use crate::balancer::{check_balance, BalanceReport};
use crate::domain::{AttemptStatus, EssayGrade, QuestionKind, QuizAttempt, XpSourceType};
use crate::errors::{CoreError, CoreResult};
use crate::ledger::{self, AwardOutcome, AwardRequest, Reconciliation};
use crate::notify::PendingGradeNotice;
use crate::protocol::*;
use crate::quiz::{self, AttemptDraft};
use crate::state::AppState;
use crate::streak;

/// Tolerated client clock drift for `startTime`.
const START_TIME_SKEW: i64 = 5;

fn check_ref(kind: &str, id: &str) -> CoreResult<()> {
  if id.trim().is_empty() || id.len() > 128 {
    return Err(CoreError::Validation(format!("{} must be 1..=128 characters", kind)));
  }
  Ok(())
}

#[instrument(level = "info", skip(state), fields(learner = %who.learner_id))]
pub async fn get_progress(state: &AppState, who: &Identity) -> ProgressOut {
  match state.store.get(&who.learner_id).await {
    Some(rec) => ProgressOut::from_record(&rec),
    // Not created until the first activity.
    None => ProgressOut::from_record(&crate::domain::LearnerRecord::new(&who.learner_id, Utc::now())),
  }
}

#[instrument(level = "info", skip(state), fields(learner = %who.learner_id))]
pub async fn update_streak(state: &AppState, who: &Identity, now: DateTime<Utc>) -> CoreResult<StreakOut> {
  state
    .store
    .transact(&who.learner_id, now, |rec| {
      let streak = streak::record_activity(rec, now, &state.policy.streak)?;
      let achievements = achievements::evaluate(rec, &state.catalog, now)?;
      Ok(StreakOut { streak, achievements })
    })
    .await
}

#[instrument(level = "info", skip(state), fields(learner = %who.learner_id))]
pub async fn check_achievements(state: &AppState, who: &Identity, now: DateTime<Utc>) -> CoreResult<UnlockOutcome> {
  state
    .store
    .transact(&who.learner_id, now, |rec| achievements::evaluate(rec, &state.catalog, now))
    .await
}

pub async fn list_achievements(state: &AppState, who: &Identity) -> Vec<AchievementOut> {
  let rec = state.store.get(&who.learner_id).await;
  achievements_out(&state.catalog, rec.as_ref())
}

#[instrument(level = "info", skip(state), fields(learner = %who.learner_id, %lesson_id))]
pub async fn complete_lesson(
  state: &AppState,
  who: &Identity,
  lesson_id: &str,
  now: DateTime<Utc>,
) -> CoreResult<LessonCompleteOut> {
  check_ref("lessonId", lesson_id)?;
  let lesson_xp = state.policy.lesson_xp;

  state
    .store
    .transact(&who.learner_id, now, |rec| {
      let already_completed = !rec.completed_lessons.insert(lesson_id.to_string());
      let mut xp = None;
      if !already_completed {
        rec.stats.lessons_completed += 1;
        if lesson_xp > 0 {
          let req = AwardRequest::new(lesson_xp as i64, XpSourceType::LessonComplete).source_id(lesson_id);
          xp = Some(ledger::award(rec, req, now)?);
        }
      }
      let streak = streak::record_activity(rec, now, &state.policy.streak)?;
      let achievements = achievements::evaluate(rec, &state.catalog, now)?;
      info!(target: "progress", learner = %rec.learner_id, %lesson_id, already_completed, "Lesson completion recorded");
      Ok(LessonCompleteOut {
        lesson_id: lesson_id.to_string(),
        already_completed,
        xp,
        streak,
        achievements,
        progress: ProgressOut::from_record(rec),
      })
    })
    .await
}

pub fn get_quiz(state: &AppState, quiz_id: &str) -> CoreResult<QuizOut> {
  Ok(quiz_out(state.quiz(quiz_id)?))
}

enum Submitted {
  Duplicate(QuizAttempt),
  New {
    attempt: QuizAttempt,
    xp: Option<AwardOutcome>,
    streak: streak::StreakOutcome,
    achievements: UnlockOutcome,
  },
}

#[instrument(level = "info", skip(state, body), fields(learner = %who.learner_id, quiz = %body.quiz_id, answers = body.answers.len()))]
pub async fn submit_quiz(state: &AppState, who: &Identity, body: QuizSubmitIn, now: DateTime<Utc>) -> CoreResult<QuizSubmitOut> {
  let quiz = state.quiz(&body.quiz_id)?;
  if body.start_time > now + Duration::seconds(START_TIME_SKEW) {
    return Err(CoreError::Validation("startTime is in the future".into()));
  }
  if let Some(sid) = &body.submission_id {
    check_ref("submissionId", sid)?;
  }
  let essay_answers = body.essay_answers.unwrap_or_default();
  let grading = quiz::grade(quiz, &body.answers, &essay_answers)?;
  let essay_count = quiz.questions.iter().filter(|q| q.kind == QuestionKind::Essay).count();

  let submission_id = body.submission_id;
  let answers = body.answers;
  let submitted = state
    .store
    .transact(&who.learner_id, now, |rec| {
      if let Some(sid) = submission_id.as_deref() {
        if let Some(prev) = rec.attempts.iter().find(|a| a.submission_id.as_deref() == Some(sid)) {
          return Ok(Submitted::Duplicate(prev.clone()));
        }
      }

      let reward = grading.xp_reward();
      let perfect = grading.is_perfect();
      let draft = AttemptDraft {
        quiz,
        learner_id: &rec.learner_id,
        submission_id: submission_id.clone(),
        answers: &answers,
        essay_answers,
        started_at: body.start_time,
        xp_awarded: reward as i64,
      };
      let attempt = quiz::build_attempt(draft, grading, now);

      let xp = if reward > 0 {
        let req = AwardRequest::new(reward as i64, XpSourceType::QuizComplete)
          .source_id(attempt.id.clone())
          .description(quiz.title.clone());
        Some(ledger::award(rec, req, now)?)
      } else {
        None
      };
      rec.stats.quizzes_completed += 1;
      if perfect {
        rec.stats.perfect_quizzes += 1;
      }
      rec.attempts.push(attempt.clone());

      let streak = streak::record_activity(rec, now, &state.policy.streak)?;
      let achievements = achievements::evaluate(rec, &state.catalog, now)?;
      Ok(Submitted::New { attempt, xp, streak, achievements })
    })
    .await?;

  let out = match submitted {
    Submitted::Duplicate(prev) => {
      info!(target: "quiz", attempt = %prev.id, "Duplicate submission; returning stored attempt");
      QuizSubmitOut {
        score: prev.score,
        total_questions: prev.total_questions,
        results: results_out(&prev, Some(quiz), who.is_admin),
        attempt_id: prev.id.clone(),
        status: prev.status,
        xp_reward: prev.xp_awarded,
        duplicate: true,
        xp: None,
        streak: None,
        achievements: None,
        admin_notified: None,
      }
    }
    Submitted::New { attempt, xp, streak, achievements } => {
      let admin_notified = if attempt.status == AttemptStatus::PendingGrade {
        let notice = PendingGradeNotice {
          attempt_id: attempt.id.clone(),
          learner_id: attempt.learner_id.clone(),
          quiz_id: quiz.id.clone(),
          quiz_title: quiz.title.clone(),
          essay_count,
          submitted_at: attempt.completed_at,
        };
        match state.notifier.pending_grade(&notice).await {
          Ok(()) => Some(true),
          Err(e) => {
            error!(target: "quiz", attempt = %attempt.id, error = %e, "Admin notification failed; attempt stays pending");
            Some(false)
          }
        }
      } else {
        None
      };
      info!(
        target: "quiz",
        attempt = %attempt.id,
        score = attempt.score,
        total = attempt.total_questions,
        xp = attempt.xp_awarded,
        status = ?attempt.status,
        "Quiz submission stored"
      );
      QuizSubmitOut {
        score: attempt.score,
        total_questions: attempt.total_questions,
        results: results_out(&attempt, Some(quiz), who.is_admin),
        attempt_id: attempt.id.clone(),
        status: attempt.status,
        xp_reward: attempt.xp_awarded,
        duplicate: false,
        xp,
        streak: Some(streak),
        achievements: Some(achievements),
        admin_notified,
      }
    }
  };
  Ok(out)
}

/// Learners see their own attempts; admins see any. Other learners' attempts
/// are reported as not found.
#[instrument(level = "info", skip(state), fields(learner = %who.learner_id, %attempt_id))]
pub async fn get_attempt(state: &AppState, who: &Identity, attempt_id: &str) -> CoreResult<AttemptOut> {
  let not_found = || CoreError::NotFound(format!("attempt {}", attempt_id));
  let owner = state.store.owner_of_attempt(attempt_id).await.ok_or_else(not_found)?;
  if owner != who.learner_id && !who.is_admin {
    return Err(not_found());
  }
  let rec = state.store.get(&owner).await.ok_or_else(not_found)?;
  let attempt = rec.attempt(attempt_id).ok_or_else(not_found)?;
  let quiz = state.quiz(&attempt.quiz_id).ok();
  Ok(attempt_out(attempt, quiz, who.is_admin))
}

#[instrument(level = "info", skip(state, body), fields(admin = %who.learner_id, learner = %body.learner_id, amount = body.amount))]
pub async fn admin_award_xp(state: &AppState, who: &Identity, body: AdminXpIn, now: DateTime<Utc>) -> CoreResult<AwardOutcome> {
  who.require_admin()?;
  let source_type = body.source_type.unwrap_or(XpSourceType::AdminAdjustment);
  if !matches!(source_type, XpSourceType::Manual | XpSourceType::AdminAdjustment) {
    return Err(CoreError::Validation(format!(
      "admins may only use manual or admin_adjustment, got {}",
      source_type.as_str()
    )));
  }
  if state.store.get(&body.learner_id).await.is_none() {
    return Err(CoreError::NotFound(format!("learner {}", body.learner_id)));
  }

  let description = body.description.unwrap_or_else(|| format!("Điều chỉnh bởi {}", who.learner_id));
  let mut req = AwardRequest::new(body.amount, source_type).description(description);
  req.source_id = body.source_id;
  req.idempotency_key = body.idempotency_key;

  let out = state
    .store
    .transact(&body.learner_id, now, |rec| ledger::award(rec, req, now))
    .await?;
  warn!(
    target: "progress",
    admin = %who.learner_id,
    learner = %body.learner_id,
    amount = out.xp_awarded,
    total = out.total_xp,
    deduplicated = out.deduplicated,
    "Admin XP change applied"
  );
  Ok(out)
}

#[instrument(level = "info", skip(state, grades), fields(admin = %who.learner_id, %attempt_id, grades = grades.len()))]
pub async fn grade_attempt(
  state: &AppState,
  who: &Identity,
  attempt_id: &str,
  grades: Vec<EssayGrade>,
  now: DateTime<Utc>,
) -> CoreResult<AttemptOut> {
  who.require_admin()?;
  let owner = state
    .store
    .owner_of_attempt(attempt_id)
    .await
    .ok_or_else(|| CoreError::NotFound(format!("attempt {}", attempt_id)))?;

  state
    .store
    .transact(&owner, now, |rec| {
      let attempt = rec
        .attempts
        .iter_mut()
        .find(|a| a.id == attempt_id)
        .ok_or_else(|| CoreError::NotFound(format!("attempt {}", attempt_id)))?;
      let quiz = state.quiz(&attempt.quiz_id)?;
      quiz::apply_essay_grades(attempt, quiz, grades, now)?;
      info!(target: "quiz", attempt = %attempt.id, score = attempt.score, "Essays graded");
      Ok(attempt_out(attempt, Some(quiz), true))
    })
    .await
}

#[instrument(level = "info", skip(state), fields(admin = %who.learner_id))]
pub async fn pending_attempts(state: &AppState, who: &Identity) -> CoreResult<Vec<AttemptOut>> {
  who.require_admin()?;
  let mut pending: Vec<QuizAttempt> = Vec::new();
  for id in state.store.learner_ids().await {
    if let Some(rec) = state.store.get(&id).await {
      pending.extend(rec.attempts.into_iter().filter(|a| a.status == AttemptStatus::PendingGrade));
    }
  }
  pending.sort_by_key(|a| a.completed_at);
  Ok(pending
    .iter()
    .map(|a| attempt_out(a, state.quiz(&a.quiz_id).ok(), true))
    .collect())
}

#[instrument(level = "info", skip(state), fields(admin = %who.learner_id, %learner_id))]
pub async fn reconcile_learner(state: &AppState, who: &Identity, learner_id: &str) -> CoreResult<Reconciliation> {
  who.require_admin()?;
  let rec = state
    .store
    .get(learner_id)
    .await
    .ok_or_else(|| CoreError::NotFound(format!("learner {}", learner_id)))?;
  let r = ledger::reconcile(&rec);
  if !r.consistent {
    error!(target: "progress", %learner_id, drift = r.drift, "Stored XP total disagrees with ledger");
  }
  Ok(r)
}

pub fn balance(body: &BalanceIn) -> CoreResult<BalanceReport> {
  check_balance(&body.equation, &body.coefficients)
}
