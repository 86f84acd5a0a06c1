//! Domain models: learner progress, the XP log, achievements, quizzes and attempts.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::leveling::level_for_xp;

/// Why XP moved.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum XpSourceType {
  LessonComplete,
  QuizComplete,
  Manual,
  AdminAdjustment,
  StreakBonus,
  AchievementReward,
}

impl XpSourceType {
  pub fn as_str(&self) -> &'static str {
    match self {
      XpSourceType::LessonComplete => "lesson_complete",
      XpSourceType::QuizComplete => "quiz_complete",
      XpSourceType::Manual => "manual",
      XpSourceType::AdminAdjustment => "admin_adjustment",
      XpSourceType::StreakBonus => "streak_bonus",
      XpSourceType::AchievementReward => "achievement_reward",
    }
  }
}

/// One append-only ledger row.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct XpTransaction {
  pub id: String,
  pub amount: i64,
  pub source_type: XpSourceType,
  #[serde(default)] pub source_id: Option<String>,
  #[serde(default)] pub description: Option<String>,
  #[serde(default)] pub idempotency_key: Option<String>,
  pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LearnerProgress {
  pub total_xp: u64,
  pub current_level: u32,
  pub xp_to_next_level: u64,
  pub current_streak: u32,
  pub longest_streak: u32,
  pub last_activity_date: Option<NaiveDate>,
}

impl Default for LearnerProgress {
  fn default() -> Self {
    let (level, to_next) = level_for_xp(0);
    Self {
      total_xp: 0,
      current_level: level,
      xp_to_next_level: to_next,
      current_streak: 0,
      longest_streak: 0,
      last_activity_date: None,
    }
  }
}

/// Activity counters read by achievement rules.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LearnerStats {
  pub lessons_completed: u32,
  pub quizzes_completed: u32,
  pub perfect_quizzes: u32,
}

/// Predicate over a learner's statistics. Every rule is "value >= at_least".
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AchievementRule {
  TotalXp { at_least: u64 },
  Level { at_least: u32 },
  CurrentStreak { at_least: u32 },
  LongestStreak { at_least: u32 },
  LessonsCompleted { at_least: u32 },
  QuizzesCompleted { at_least: u32 },
  PerfectQuizzes { at_least: u32 },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Achievement {
  pub code: String,
  pub name: String,
  #[serde(default)] pub description: String,
  pub rule: AchievementRule,
  #[serde(default)] pub xp_reward: u32,
  #[serde(default = "default_true")] pub active: bool,
}

fn default_true() -> bool { true }

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StudentAchievement {
  pub achievement_code: String,
  pub unlocked_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
  MultipleChoice,
  TrueFalse,
  Essay,
}

impl QuestionKind {
  /// Scorable without a human grader.
  pub fn is_gradable(&self) -> bool {
    !matches!(self, QuestionKind::Essay)
  }
}

/// Question with its answer key. Never serialized to learners directly;
/// see `protocol::QuizOut` for the public shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Question {
  pub id: String,
  pub prompt: String,
  pub kind: QuestionKind,
  #[serde(default)] pub options: Vec<String>,
  #[serde(default)] pub correct_option: Option<u32>,
  #[serde(default)] pub max_score: u32,
  #[serde(default)] pub reference_answer: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Quiz {
  pub id: String,
  pub title: String,
  #[serde(default)] pub subject: String,
  #[serde(default)] pub questions: Vec<Question>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
  Completed,
  PendingGrade,
}

/// Per-question outcome stored with the attempt.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionResult {
  pub question_id: String,
  pub kind: QuestionKind,
  #[serde(default)] pub selected: Option<u32>,
  /// `None` for essays until (and after) human grading.
  #[serde(default)] pub is_correct: Option<bool>,
  #[serde(default)] pub essay_score: Option<u32>,
  #[serde(default)] pub feedback: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EssayGrade {
  pub question_id: String,
  pub score: u32,
  #[serde(default)] pub feedback: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizAttempt {
  pub id: String,
  pub quiz_id: String,
  pub learner_id: String,
  #[serde(default)] pub submission_id: Option<String>,
  pub score: u32,
  /// Score from gradable questions only; kept so essay grading can rebuild `score`.
  pub mc_score: u32,
  pub total_questions: u32,
  pub gradable_questions: u32,
  pub user_answers: BTreeMap<String, Option<u32>>,
  #[serde(default)] pub essay_answers: BTreeMap<String, String>,
  pub results: Vec<QuestionResult>,
  pub status: AttemptStatus,
  #[serde(default)] pub essay_grades: Option<Vec<EssayGrade>>,
  pub started_at: DateTime<Utc>,
  pub completed_at: DateTime<Utc>,
  #[serde(default)] pub graded_at: Option<DateTime<Utc>>,
  pub xp_awarded: i64,
}

/// Everything owned by one learner. The store swaps whole records, which is
/// what makes each operation all-or-nothing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LearnerRecord {
  pub learner_id: String,
  pub created_at: DateTime<Utc>,
  pub progress: LearnerProgress,
  #[serde(default)] pub stats: LearnerStats,
  #[serde(default)] pub transactions: Vec<XpTransaction>,
  #[serde(default)] pub achievements: Vec<StudentAchievement>,
  #[serde(default)] pub attempts: Vec<QuizAttempt>,
  #[serde(default)] pub completed_lessons: BTreeSet<String>,
}

impl LearnerRecord {
  pub fn new(learner_id: &str, now: DateTime<Utc>) -> Self {
    Self {
      learner_id: learner_id.to_string(),
      created_at: now,
      progress: LearnerProgress::default(),
      stats: LearnerStats::default(),
      transactions: Vec::new(),
      achievements: Vec::new(),
      attempts: Vec::new(),
      completed_lessons: BTreeSet::new(),
    }
  }

  pub fn has_achievement(&self, code: &str) -> bool {
    self.achievements.iter().any(|a| a.achievement_code == code)
  }

  pub fn attempt(&self, attempt_id: &str) -> Option<&QuizAttempt> {
    self.attempts.iter().find(|a| a.id == attempt_id)
  }
}
