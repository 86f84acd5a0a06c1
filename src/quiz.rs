//! Server-side quiz grading against the held answer key.
//!
//! Learners only ever send selected option indexes; scores and rewards are
//! computed here and nowhere else.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{AttemptStatus, EssayGrade, Question, QuestionKind, QuestionResult, Quiz, QuizAttempt};
use crate::errors::{CoreError, CoreResult};

const XP_PERFECT: u32 = 50;
const XP_AT_80: u32 = 30;
const XP_AT_60: u32 = 15;

/// Tiered completion reward on the gradable percentage.
pub fn quiz_xp_reward(correct: u32, gradable: u32) -> u32 {
  if gradable == 0 {
    return 0;
  }
  let pct = correct as u64 * 100;
  let g = gradable as u64;
  if correct >= gradable {
    XP_PERFECT
  } else if pct >= 80 * g {
    XP_AT_80
  } else if pct >= 60 * g {
    XP_AT_60
  } else {
    0
  }
}

/// Checks a quiz definition is gradable at all. Used when loading banks.
pub fn validate_quiz(quiz: &Quiz) -> Result<(), String> {
  let mut seen = BTreeSet::new();
  for q in &quiz.questions {
    if !seen.insert(q.id.as_str()) {
      return Err(format!("duplicate question id {}", q.id));
    }
    if q.kind.is_gradable() {
      match q.correct_option {
        Some(i) if (i as usize) < q.options.len() => {}
        _ => return Err(format!("question {} has no valid correct_option", q.id)),
      }
    } else if q.max_score == 0 {
      return Err(format!("essay {} needs max_score > 0", q.id));
    }
  }
  Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grading {
  pub score: u32,
  pub gradable: u32,
  pub total_questions: u32,
  pub results: Vec<QuestionResult>,
  pub has_essays: bool,
}

impl Grading {
  pub fn is_perfect(&self) -> bool {
    self.gradable > 0 && self.score == self.gradable
  }

  pub fn xp_reward(&self) -> u32 {
    quiz_xp_reward(self.score, self.gradable)
  }
}

fn grade_one(q: &Question, selected: Option<u32>) -> CoreResult<QuestionResult> {
  if let Some(i) = selected {
    if !q.kind.is_gradable() {
      return Err(CoreError::Validation(format!("essay {} takes essayAnswers, not an option", q.id)));
    }
    if i as usize >= q.options.len() {
      return Err(CoreError::Validation(format!("option {} out of range for question {}", i, q.id)));
    }
  }
  let is_correct = if q.kind.is_gradable() {
    Some(selected.is_some() && selected == q.correct_option)
  } else {
    None
  };
  Ok(QuestionResult {
    question_id: q.id.clone(),
    kind: q.kind,
    selected,
    is_correct,
    essay_score: None,
    feedback: None,
  })
}

/// Grades an answer vector aligned with the quiz's question order.
pub fn grade(quiz: &Quiz, answers: &[Option<u32>], essay_answers: &BTreeMap<String, String>) -> CoreResult<Grading> {
  if quiz.questions.is_empty() {
    return Err(CoreError::Validation(format!("quiz {} has no questions", quiz.id)));
  }
  if answers.len() != quiz.questions.len() {
    return Err(CoreError::Validation(format!(
      "expected {} answers, got {}",
      quiz.questions.len(),
      answers.len()
    )));
  }
  for qid in essay_answers.keys() {
    let is_essay = quiz.questions.iter().any(|q| &q.id == qid && q.kind == QuestionKind::Essay);
    if !is_essay {
      return Err(CoreError::Validation(format!("essay answer for unknown essay {}", qid)));
    }
  }

  let results = quiz
    .questions
    .iter()
    .zip(answers)
    .map(|(q, a)| grade_one(q, *a))
    .collect::<CoreResult<Vec<_>>>()?;

  let gradable = quiz.questions.iter().filter(|q| q.kind.is_gradable()).count() as u32;
  let score = results.iter().filter(|r| r.is_correct == Some(true)).count() as u32;
  let has_essays = gradable < quiz.questions.len() as u32;

  debug!(target: "quiz", quiz = %quiz.id, score, gradable, has_essays, "Quiz graded");
  Ok(Grading { score, gradable, total_questions: quiz.questions.len() as u32, results, has_essays })
}

pub struct AttemptDraft<'a> {
  pub quiz: &'a Quiz,
  pub learner_id: &'a str,
  pub submission_id: Option<String>,
  pub answers: &'a [Option<u32>],
  pub essay_answers: BTreeMap<String, String>,
  pub started_at: DateTime<Utc>,
  pub xp_awarded: i64,
}

pub fn build_attempt(draft: AttemptDraft<'_>, grading: Grading, now: DateTime<Utc>) -> QuizAttempt {
  let user_answers = draft
    .quiz
    .questions
    .iter()
    .zip(draft.answers)
    .map(|(q, a)| (q.id.clone(), *a))
    .collect();
  QuizAttempt {
    id: Uuid::new_v4().to_string(),
    quiz_id: draft.quiz.id.clone(),
    learner_id: draft.learner_id.to_string(),
    submission_id: draft.submission_id,
    score: grading.score,
    mc_score: grading.score,
    total_questions: grading.total_questions,
    gradable_questions: grading.gradable,
    user_answers,
    essay_answers: draft.essay_answers,
    results: grading.results,
    status: if grading.has_essays { AttemptStatus::PendingGrade } else { AttemptStatus::Completed },
    essay_grades: None,
    started_at: draft.started_at,
    completed_at: now,
    graded_at: None,
    xp_awarded: draft.xp_awarded,
  }
}

/// One-time `pending_grade -> completed` transition. Every essay must be
/// graded in the same call.
pub fn apply_essay_grades(attempt: &mut QuizAttempt, quiz: &Quiz, grades: Vec<EssayGrade>, now: DateTime<Utc>) -> CoreResult<()> {
  if attempt.status != AttemptStatus::PendingGrade || attempt.essay_grades.is_some() {
    return Err(CoreError::Validation(format!("attempt {} is already graded", attempt.id)));
  }

  let essays: BTreeMap<&str, &Question> = quiz
    .questions
    .iter()
    .filter(|q| q.kind == QuestionKind::Essay)
    .map(|q| (q.id.as_str(), q))
    .collect();

  let mut graded = BTreeSet::new();
  for g in &grades {
    let q = essays
      .get(g.question_id.as_str())
      .ok_or_else(|| CoreError::Validation(format!("{} is not an essay question of this quiz", g.question_id)))?;
    if g.score > q.max_score {
      return Err(CoreError::Validation(format!(
        "score {} exceeds max {} for {}",
        g.score, q.max_score, g.question_id
      )));
    }
    if !graded.insert(g.question_id.as_str()) {
      return Err(CoreError::Validation(format!("{} graded twice", g.question_id)));
    }
  }
  if graded.len() != essays.len() {
    return Err(CoreError::Validation(format!("expected {} essay grades, got {}", essays.len(), graded.len())));
  }

  let essay_total: u32 = grades.iter().map(|g| g.score).sum();
  for r in attempt.results.iter_mut() {
    if let Some(g) = grades.iter().find(|g| g.question_id == r.question_id) {
      r.essay_score = Some(g.score);
      r.feedback = g.feedback.clone();
    }
  }
  attempt.score = attempt.mc_score + essay_total;
  attempt.essay_grades = Some(grades);
  attempt.graded_at = Some(now);
  attempt.status = AttemptStatus::Completed;
  Ok(())
}
