//! Application state: learner store, achievement catalog, quiz bank, policy,
//! token verifier and admin notifier.
//!
//! Catalog content comes from built-in seeds, then the TOML config (entries
//! with the same code/id replace the seeded ones). Only the learner store is
//! mutable after startup.

use std::{collections::HashMap, sync::Arc};

use tracing::{error, info, instrument};

use crate::auth::TokenVerifier;
use crate::config::{apply_env_overrides, load_config_from_env, AppConfig, PolicyCfg};
use crate::domain::{Achievement, Quiz, QuestionKind};
use crate::errors::{CoreError, CoreResult};
use crate::notify::AdminNotifier;
use crate::quiz::validate_quiz;
use crate::seeds::{seed_achievements, seed_quizzes};
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub catalog: Arc<Vec<Achievement>>,
    pub quizzes: Arc<HashMap<String, Quiz>>,
    pub policy: PolicyCfg,
    pub verifier: TokenVerifier,
    pub notifier: AdminNotifier,
}

impl AppState {
    /// Build state from env: load config, open the store, merge catalogs.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> CoreResult<Self> {
        let cfg = apply_env_overrides(load_config_from_env().unwrap_or_default());
        Self::from_config(cfg)
    }

    pub fn from_config(cfg: AppConfig) -> CoreResult<Self> {
        let store = match &cfg.storage.data_dir {
            Some(dir) => Store::open(dir)?,
            None => {
                info!(target: "lophoc_backend", "No data_dir configured; learner records are in-memory only");
                Store::in_memory()
            }
        };

        // Achievements: seeds first, config entries replace by code.
        let mut catalog = seed_achievements();
        for a in cfg.achievements {
            match catalog.iter_mut().find(|c| c.code == a.code) {
                Some(slot) => *slot = a,
                None => catalog.push(a),
            }
        }

        let mut quizzes = HashMap::<String, Quiz>::new();
        for q in seed_quizzes().into_iter().chain(cfg.quizzes) {
            if let Err(e) = validate_quiz(&q) {
                error!(target: "quiz", id = %q.id, error = %e, "Skipping quiz: invalid definition.");
                continue;
            }
            quizzes.insert(q.id.clone(), q);
        }

        // Inventory summary by subject: (quizzes, gradable questions, essays).
        let mut by_subject: HashMap<String, (usize, usize, usize)> = HashMap::new();
        for q in quizzes.values() {
            let entry = by_subject.entry(q.subject.clone()).or_insert((0, 0, 0));
            entry.0 += 1;
            for question in &q.questions {
                match question.kind {
                    QuestionKind::Essay => entry.2 += 1,
                    _ => entry.1 += 1,
                }
            }
        }
        for (subject, (count, gradable, essays)) in by_subject {
            info!(target: "quiz", %subject, quizzes = count, gradable, essays, "Startup quiz inventory");
        }
        info!(
            target: "progress",
            achievements = catalog.len(),
            lesson_xp = cfg.policy.lesson_xp,
            streak_bonus_per_day = cfg.policy.streak.bonus_per_day,
            streak_bonus_cap = cfg.policy.streak.bonus_cap,
            "Progression policy loaded"
        );

        let notifier = AdminNotifier::from_config(&cfg.notifications);
        if notifier.has_webhook() {
            info!(target: "lophoc_backend", "Admin webhook enabled.");
        } else {
            info!(target: "lophoc_backend", "Admin webhook disabled. Grading notices are only logged.");
        }

        Ok(Self {
            store,
            catalog: Arc::new(catalog),
            quizzes: Arc::new(quizzes),
            policy: cfg.policy,
            verifier: TokenVerifier::new(&cfg.auth),
            notifier,
        })
    }

    /// Answer-key-bearing quiz by id.
    pub fn quiz(&self, id: &str) -> CoreResult<&Quiz> {
        self.quizzes
            .get(id)
            .ok_or_else(|| CoreError::NotFound(format!("quiz {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    #[test]
    fn config_entries_override_seeds_and_bad_quizzes_are_dropped() {
        let cfg = parse_config(
            r#"
            [[achievements]]
            code = "first_lesson"
            name = "Khởi đầu"
            xp_reward = 99
            rule = { kind = "lessons_completed", at_least = 1 }

            [[quizzes]]
            id = "hong"
            title = "Thiếu đáp án"
            [[quizzes.questions]]
            id = "c1"
            prompt = "?"
            kind = "multiple_choice"
            options = ["a"]
            "#,
        )
        .unwrap();
        let state = AppState::from_config(cfg).unwrap();
        let first = state.catalog.iter().find(|a| a.code == "first_lesson").unwrap();
        assert_eq!(first.xp_reward, 99);
        assert_eq!(state.catalog.iter().filter(|a| a.code == "first_lesson").count(), 1);
        assert!(matches!(state.quiz("hong"), Err(CoreError::NotFound(_))));
        assert!(state.quiz("hoa-10-nguyen-tu").is_ok());
    }
}
