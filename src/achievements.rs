//! Achievement evaluation over a learner statistics snapshot.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::domain::{Achievement, AchievementRule, LearnerRecord, StudentAchievement, XpSourceType};
use crate::errors::CoreResult;
use crate::ledger::{award, AwardRequest};

/// Frozen view of the values rules are evaluated against.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
  pub total_xp: u64,
  pub level: u32,
  pub current_streak: u32,
  pub longest_streak: u32,
  pub lessons_completed: u32,
  pub quizzes_completed: u32,
  pub perfect_quizzes: u32,
}

impl StatsSnapshot {
  pub fn of(rec: &LearnerRecord) -> Self {
    Self {
      total_xp: rec.progress.total_xp,
      level: rec.progress.current_level,
      current_streak: rec.progress.current_streak,
      longest_streak: rec.progress.longest_streak,
      lessons_completed: rec.stats.lessons_completed,
      quizzes_completed: rec.stats.quizzes_completed,
      perfect_quizzes: rec.stats.perfect_quizzes,
    }
  }
}

impl AchievementRule {
  pub fn is_met(&self, s: &StatsSnapshot) -> bool {
    match *self {
      AchievementRule::TotalXp { at_least } => s.total_xp >= at_least,
      AchievementRule::Level { at_least } => s.level >= at_least,
      AchievementRule::CurrentStreak { at_least } => s.current_streak >= at_least,
      AchievementRule::LongestStreak { at_least } => s.longest_streak >= at_least,
      AchievementRule::LessonsCompleted { at_least } => s.lessons_completed >= at_least,
      AchievementRule::QuizzesCompleted { at_least } => s.quizzes_completed >= at_least,
      AchievementRule::PerfectQuizzes { at_least } => s.perfect_quizzes >= at_least,
    }
  }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct UnlockedAchievement {
  pub code: String,
  pub name: String,
  pub description: String,
  pub xp_reward: u32,
  pub unlocked_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct UnlockOutcome {
  pub success: bool,
  pub unlocked_count: usize,
  pub achievements: Vec<UnlockedAchievement>,
}

/// Unlocks every active achievement whose rule holds for the snapshot taken
/// on entry and which the learner does not own yet. Reward XP is applied but
/// does not feed back into this pass.
pub fn evaluate(rec: &mut LearnerRecord, catalog: &[Achievement], now: DateTime<Utc>) -> CoreResult<UnlockOutcome> {
  let snapshot = StatsSnapshot::of(rec);
  let mut unlocked = Vec::new();

  for a in catalog.iter().filter(|a| a.active) {
    if rec.has_achievement(&a.code) || !a.rule.is_met(&snapshot) {
      continue;
    }
    rec.achievements.push(StudentAchievement { achievement_code: a.code.clone(), unlocked_at: now });
    if a.xp_reward > 0 {
      let req = AwardRequest::new(a.xp_reward as i64, XpSourceType::AchievementReward)
        .source_id(a.code.clone())
        .description(a.name.clone());
      award(rec, req, now)?;
    }
    info!(target: "progress", learner = %rec.learner_id, code = %a.code, xp = a.xp_reward, "Achievement unlocked");
    unlocked.push(UnlockedAchievement {
      code: a.code.clone(),
      name: a.name.clone(),
      description: a.description.clone(),
      xp_reward: a.xp_reward,
      unlocked_at: now,
    });
  }

  Ok(UnlockOutcome { success: true, unlocked_count: unlocked.len(), achievements: unlocked })
}
