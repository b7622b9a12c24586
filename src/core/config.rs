/// Course gamification config: the closed catalogs of variables and
/// achievements every dialog is validated against.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Computed sum of all test scores. Always readable, never writable.
pub const TESTS_SCORE_VAR: &str = "tests_score";

const CONFIG_FILE: &str = "gaming-config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("'variables' is missing from the gamification config")]
    MissingVariables,
    #[error("'achievements' is missing from the gamification config")]
    MissingAchievements,
    #[error("variable '{0}' is declared twice")]
    DuplicateVariable(String),
    #[error("achievement '{0}' is declared twice")]
    DuplicateAchievement(String),
    #[error("image '{image}' for achievement '{name}' was not found")]
    MissingAchievementImage { name: String, image: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Achievement {
    pub name: String,
    pub description: String,
    pub image: String,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    variables: Option<Vec<String>>,
    achievements: Option<Vec<Achievement>>,
}

/// The course's declared variables and achievements, from
/// `gaming-config.json` at the course root.
#[derive(Debug, Clone)]
pub struct GamingConfig {
    variables: Vec<String>,
    variable_set: FxHashSet<String>,
    achievements: Vec<Achievement>,
    achievement_set: FxHashSet<String>,
}

impl GamingConfig {
    /// Loads and checks the config; achievement images must exist under the
    /// course root.
    pub fn load(course_root: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(course_root.join(CONFIG_FILE))?;
        Self::from_json_str(&raw, course_root)
    }

    pub fn from_json_str(raw: &str, image_root: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(raw)?;
        let variables = raw.variables.ok_or(ConfigError::MissingVariables)?;
        let achievements = raw.achievements.ok_or(ConfigError::MissingAchievements)?;

        for achievement in &achievements {
            if !image_root.join(&achievement.image).is_file() {
                return Err(ConfigError::MissingAchievementImage {
                    name: achievement.name.clone(),
                    image: achievement.image.clone(),
                });
            }
        }
        Self::from_parts(variables, achievements)
    }

    /// Builds a config from already-checked catalogs (no image lookup).
    pub fn from_parts(
        variables: Vec<String>,
        achievements: Vec<Achievement>,
    ) -> Result<Self, ConfigError> {
        let mut variable_set = FxHashSet::default();
        for name in &variables {
            if !variable_set.insert(name.clone()) {
                return Err(ConfigError::DuplicateVariable(name.clone()));
            }
        }
        let mut achievement_set = FxHashSet::default();
        for achievement in &achievements {
            if !achievement_set.insert(achievement.name.clone()) {
                return Err(ConfigError::DuplicateAchievement(achievement.name.clone()));
            }
        }
        Ok(Self {
            variables,
            variable_set,
            achievements,
            achievement_set,
        })
    }

    /// Declared variables plus the computed `tests_score`.
    pub fn has_variable(&self, name: &str) -> bool {
        name == TESTS_SCORE_VAR || self.variable_set.contains(name)
    }

    /// Variables `givePoints`/`setPoints` may touch; excludes `tests_score`.
    pub fn is_writable_variable(&self, name: &str) -> bool {
        name != TESTS_SCORE_VAR && self.variable_set.contains(name)
    }

    pub fn has_achievement(&self, name: &str) -> bool {
        self.achievement_set.contains(name)
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn achievements(&self) -> &[Achievement] {
        &self.achievements
    }
}
