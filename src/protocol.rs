//! Public protocol structs for the HTTP endpoints (serde ready).
//! Progression results keep the snake_case shapes the web app already reads;
//! quiz endpoints use camelCase.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::achievements::UnlockOutcome;
use crate::domain::{
    Achievement, AttemptStatus, EssayGrade, LearnerRecord, QuestionKind, Quiz, QuizAttempt,
    XpSourceType,
};
use crate::ledger::AwardOutcome;
use crate::streak::StreakOutcome;

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

//
// Progress
//

#[derive(Debug, Serialize)]
pub struct ProgressOut {
    pub learner_id: String,
    pub total_xp: u64,
    pub current_level: u32,
    pub xp_to_next_level: u64,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_activity_date: Option<NaiveDate>,
    pub lessons_completed: u32,
    pub quizzes_completed: u32,
    pub perfect_quizzes: u32,
    pub achievements_unlocked: usize,
}

impl ProgressOut {
    pub fn from_record(rec: &LearnerRecord) -> Self {
        let p = &rec.progress;
        Self {
            learner_id: rec.learner_id.clone(),
            total_xp: p.total_xp,
            current_level: p.current_level,
            xp_to_next_level: p.xp_to_next_level,
            current_streak: p.current_streak,
            longest_streak: p.longest_streak,
            last_activity_date: p.last_activity_date,
            lessons_completed: rec.stats.lessons_completed,
            quizzes_completed: rec.stats.quizzes_completed,
            perfect_quizzes: rec.stats.perfect_quizzes,
            achievements_unlocked: rec.achievements.len(),
        }
    }
}

#[derive(Deserialize)]
pub struct LessonCompleteIn {
    #[serde(rename = "lessonId")]
    pub lesson_id: String,
}

#[derive(Debug, Serialize)]
pub struct LessonCompleteOut {
    pub lesson_id: String,
    pub already_completed: bool,
    pub xp: Option<AwardOutcome>,
    pub streak: StreakOutcome,
    pub achievements: UnlockOutcome,
    pub progress: ProgressOut,
}

#[derive(Debug, Serialize)]
pub struct StreakOut {
    #[serde(flatten)]
    pub streak: StreakOutcome,
    pub achievements: UnlockOutcome,
}

#[derive(Debug, Serialize)]
pub struct AchievementOut {
    pub code: String,
    pub name: String,
    pub description: String,
    pub xp_reward: u32,
    pub unlocked: bool,
    pub unlocked_at: Option<DateTime<Utc>>,
}

pub fn achievements_out(catalog: &[Achievement], rec: Option<&LearnerRecord>) -> Vec<AchievementOut> {
    catalog
        .iter()
        .filter(|a| a.active)
        .map(|a| {
            let owned = rec.and_then(|r| r.achievements.iter().find(|s| s.achievement_code == a.code));
            AchievementOut {
                code: a.code.clone(),
                name: a.name.clone(),
                description: a.description.clone(),
                xp_reward: a.xp_reward,
                unlocked: owned.is_some(),
                unlocked_at: owned.map(|s| s.unlocked_at),
            }
        })
        .collect()
}

//
// Admin XP
//

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminXpIn {
    pub learner_id: String,
    pub amount: i64,
    #[serde(default)]
    pub source_type: Option<XpSourceType>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

//
// Quizzes
//

/// Question without its answer key.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOut {
    pub id: String,
    pub prompt: String,
    pub kind: QuestionKind,
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_score: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizOut {
    pub id: String,
    pub title: String,
    pub subject: String,
    pub questions: Vec<QuestionOut>,
}

pub fn quiz_out(q: &Quiz) -> QuizOut {
    QuizOut {
        id: q.id.clone(),
        title: q.title.clone(),
        subject: q.subject.clone(),
        questions: q
            .questions
            .iter()
            .map(|x| QuestionOut {
                id: x.id.clone(),
                prompt: x.prompt.clone(),
                kind: x.kind,
                options: x.options.clone(),
                max_score: (!x.kind.is_gradable()).then_some(x.max_score),
            })
            .collect(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSubmitIn {
    pub quiz_id: String,
    pub answers: Vec<Option<u32>>,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub essay_answers: Option<BTreeMap<String, String>>,
    /// Client-generated id making re-submission safe to retry.
    #[serde(default)]
    pub submission_id: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResultOut {
    pub question_id: String,
    pub kind: QuestionKind,
    pub selected: Option<u32>,
    pub is_correct: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_option: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub essay_score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_answer: Option<String>,
}

/// Correct options are only revealed for graded (non-essay) items; essay
/// reference answers only to admins.
pub fn results_out(attempt: &QuizAttempt, quiz: Option<&Quiz>, is_admin: bool) -> Vec<QuestionResultOut> {
    attempt
        .results
        .iter()
        .map(|r| {
            let q = quiz.and_then(|qz| qz.questions.iter().find(|q| q.id == r.question_id));
            QuestionResultOut {
                question_id: r.question_id.clone(),
                kind: r.kind,
                selected: r.selected,
                is_correct: r.is_correct,
                correct_option: if r.kind.is_gradable() { q.and_then(|q| q.correct_option) } else { None },
                essay_score: r.essay_score,
                feedback: r.feedback.clone(),
                reference_answer: if is_admin { q.and_then(|q| q.reference_answer.clone()) } else { None },
            }
        })
        .collect()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSubmitOut {
    pub score: u32,
    pub total_questions: u32,
    pub results: Vec<QuestionResultOut>,
    pub attempt_id: String,
    pub status: AttemptStatus,
    pub xp_reward: i64,
    /// True when `submissionId` matched an earlier attempt and nothing new was applied.
    pub duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xp: Option<AwardOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streak: Option<StreakOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub achievements: Option<UnlockOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_notified: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptOut {
    pub attempt_id: String,
    pub quiz_id: String,
    pub learner_id: String,
    pub score: u32,
    pub mc_score: u32,
    pub total_questions: u32,
    pub status: AttemptStatus,
    pub results: Vec<QuestionResultOut>,
    pub essay_answers: BTreeMap<String, String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub graded_at: Option<DateTime<Utc>>,
    pub xp_awarded: i64,
}

pub fn attempt_out(a: &QuizAttempt, quiz: Option<&Quiz>, is_admin: bool) -> AttemptOut {
    AttemptOut {
        attempt_id: a.id.clone(),
        quiz_id: a.quiz_id.clone(),
        learner_id: a.learner_id.clone(),
        score: a.score,
        mc_score: a.mc_score,
        total_questions: a.total_questions,
        status: a.status,
        results: results_out(a, quiz, is_admin),
        essay_answers: a.essay_answers.clone(),
        started_at: a.started_at,
        completed_at: a.completed_at,
        graded_at: a.graded_at,
        xp_awarded: a.xp_awarded,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EssayGradeIn {
    pub question_id: String,
    pub score: u32,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GradeIn {
    pub grades: Vec<EssayGradeIn>,
}

impl From<EssayGradeIn> for EssayGrade {
    fn from(g: EssayGradeIn) -> Self {
        EssayGrade { question_id: g.question_id, score: g.score, feedback: g.feedback }
    }
}

//
// Chemistry helper
//

#[derive(Deserialize)]
pub struct BalanceIn {
    pub equation: String,
    pub coefficients: Vec<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Question, QuestionResult};

    fn quiz() -> Quiz {
        Quiz {
            id: "qz".into(),
            title: "T".into(),
            subject: "hoa_hoc".into(),
            questions: vec![
                Question {
                    id: "q1".into(),
                    prompt: "?".into(),
                    kind: QuestionKind::MultipleChoice,
                    options: vec!["a".into(), "b".into()],
                    correct_option: Some(1),
                    max_score: 0,
                    reference_answer: None,
                },
                Question {
                    id: "e1".into(),
                    prompt: "?".into(),
                    kind: QuestionKind::Essay,
                    options: vec![],
                    correct_option: None,
                    max_score: 4,
                    reference_answer: Some("mẫu".into()),
                },
            ],
        }
    }

    #[test]
    fn quiz_out_hides_answer_key() {
        let json = serde_json::to_string(&quiz_out(&quiz())).unwrap();
        assert!(!json.contains("correct"));
        assert!(!json.contains("mẫu"));
        assert!(json.contains("\"maxScore\":4"));
    }

    #[test]
    fn essay_reference_only_for_admins() {
        let attempt = QuizAttempt {
            id: "a".into(),
            quiz_id: "qz".into(),
            learner_id: "u".into(),
            submission_id: None,
            score: 1,
            mc_score: 1,
            total_questions: 2,
            gradable_questions: 1,
            user_answers: BTreeMap::new(),
            essay_answers: BTreeMap::new(),
            results: vec![
                QuestionResult {
                    question_id: "q1".into(),
                    kind: QuestionKind::MultipleChoice,
                    selected: Some(1),
                    is_correct: Some(true),
                    essay_score: None,
                    feedback: None,
                },
                QuestionResult {
                    question_id: "e1".into(),
                    kind: QuestionKind::Essay,
                    selected: None,
                    is_correct: None,
                    essay_score: None,
                    feedback: None,
                },
            ],
            status: AttemptStatus::PendingGrade,
            essay_grades: None,
            started_at: Utc::now(),
            completed_at: Utc::now(),
            graded_at: None,
            xp_awarded: 50,
        };
        let q = quiz();
        let learner = results_out(&attempt, Some(&q), false);
        assert_eq!(learner[0].correct_option, Some(1));
        assert_eq!(learner[1].correct_option, None);
        assert_eq!(learner[1].reference_answer, None);

        let admin = results_out(&attempt, Some(&q), true);
        assert_eq!(admin[1].reference_answer.as_deref(), Some("mẫu"));
    }

    #[test]
    fn submit_in_accepts_camel_case() {
        let s: QuizSubmitIn = serde_json::from_str(
            r#"{"quizId":"qz","answers":[1,null],"startTime":"2026-10-18T08:00:00Z","essayAnswers":{"e1":"vì..."}}"#,
        )
        .unwrap();
        assert_eq!(s.answers, vec![Some(1), None]);
        assert!(s.submission_id.is_none());
        assert_eq!(s.essay_answers.unwrap().len(), 1);
    }
}
