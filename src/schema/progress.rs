/// Per-user per-course progress records, the partial-update shape, and the
/// store boundary the session talks to.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("progress for '{user}' in course '{course}' could not be read: {reason}")]
    Unavailable {
        user: String,
        course: String,
        reason: String,
    },
    #[error("progress write failed: {0}")]
    WriteFailed(String),
}

/// `"{module}-{lesson}"`, the key format shared by the lesson and task maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LessonKey {
    pub module: u32,
    pub lesson: u32,
}

impl LessonKey {
    pub fn new(module: u32, lesson: u32) -> Self {
        Self { module, lesson }
    }

    /// Numeric parse of an `"m-l"` key. Substring matching on the module part
    /// would confuse module 1 with module 11, so keys are always parsed.
    pub fn parse(raw: &str) -> Option<LessonKey> {
        let (module, lesson) = raw.split_once('-')?;
        Some(LessonKey {
            module: module.parse().ok()?,
            lesson: lesson.parse().ok()?,
        })
    }
}

impl fmt::Display for LessonKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.module, self.lesson)
    }
}

/// Gamification extras riding along with the core progress maps. The wire
/// name is `meta_fields`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressMeta {
    #[serde(default)]
    pub achievements: Vec<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, i64>,
}

impl ProgressMeta {
    pub fn is_empty(&self) -> bool {
        self.achievements.is_empty() && self.variables.is_empty()
    }
}

/// One user's progress through one course. `lessons` flags theory completion,
/// `tasks` holds test scores (0 = not taken).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    #[serde(default)]
    pub lessons: BTreeMap<String, bool>,
    #[serde(default)]
    pub tasks: BTreeMap<String, i64>,
    #[serde(rename = "meta_fields", default)]
    pub meta: ProgressMeta,
}

impl ProgressRecord {
    /// A fresh record: every lesson unread, every listed test unscored.
    pub fn fresh(
        lessons: impl IntoIterator<Item = LessonKey>,
        tested: impl IntoIterator<Item = LessonKey>,
    ) -> Self {
        let mut record = Self::default();
        for key in lessons {
            record.lessons.insert(key.to_string(), false);
        }
        for key in tested {
            record.tasks.insert(key.to_string(), 0);
        }
        record
    }

    /// Sum of all test scores; backs the `tests_score` pseudo-variable.
    pub fn tests_score(&self) -> i64 {
        self.tasks.values().sum()
    }

    fn lesson_done(&self, key: &str) -> bool {
        self.lessons.get(key).copied().unwrap_or(false)
    }

    fn task_score(&self, key: &str) -> Option<i64> {
        self.tasks.get(key).copied()
    }

    /// Any theory read or test scored within the module.
    pub fn module_started(&self, module: u32) -> bool {
        self.scoped_keys(Some(module))
            .any(|key| self.lesson_done(&key) || self.task_score(&key).unwrap_or(0) > 0)
    }

    /// Every theory read and every present test scored within the module.
    pub fn module_completed(&self, module: u32) -> bool {
        self.scoped_keys(Some(module))
            .all(|key| self.lesson_done(&key) && self.task_score(&key).map_or(true, |s| s > 0))
    }

    pub fn course_started(&self) -> bool {
        self.scoped_keys(None)
            .any(|key| self.lesson_done(&key) || self.task_score(&key).unwrap_or(0) > 0)
    }

    pub fn course_completed(&self) -> bool {
        self.scoped_keys(None)
            .all(|key| self.lesson_done(&key) && self.task_score(&key).map_or(true, |s| s > 0))
    }

    fn scoped_keys(&self, module: Option<u32>) -> impl Iterator<Item = String> + '_ {
        self.lessons
            .keys()
            .filter(move |raw| match (LessonKey::parse(raw), module) {
                (Some(key), Some(m)) => key.module == m,
                (Some(_), None) => true,
                (None, _) => false,
            })
            .cloned()
    }

    /// Merges a partial update into this record.
    pub fn apply(&mut self, patch: &ProgressPatch) {
        for (key, done) in &patch.lessons {
            self.lessons.insert(key.clone(), *done);
        }
        for (key, score) in &patch.tasks {
            self.tasks.insert(key.clone(), *score);
        }
        for name in &patch.meta.achievements {
            if !self.meta.achievements.contains(name) {
                self.meta.achievements.push(name.clone());
            }
        }
        for (name, value) in &patch.meta.variables {
            self.meta.variables.insert(name.clone(), *value);
        }
    }
}

/// Partial update accepted by [`ProgressStore::patch`]. Absent maps leave the
/// stored record untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressPatch {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub lessons: BTreeMap<String, bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tasks: BTreeMap<String, i64>,
    #[serde(rename = "meta_fields", default, skip_serializing_if = "ProgressMeta::is_empty")]
    pub meta: ProgressMeta,
}

impl ProgressPatch {
    pub fn lesson(key: LessonKey) -> Self {
        let mut patch = Self::default();
        patch.lessons.insert(key.to_string(), true);
        patch
    }

    pub fn task(key: LessonKey, score: i64) -> Self {
        let mut patch = Self::default();
        patch.tasks.insert(key.to_string(), score);
        patch
    }

    pub fn variable(name: &str, value: i64) -> Self {
        let mut patch = Self::default();
        patch.meta.variables.insert(name.to_string(), value);
        patch
    }

    pub fn achievement(name: &str) -> Self {
        let mut patch = Self::default();
        patch.meta.achievements.push(name.to_string());
        patch
    }
}

/// Where progress records live. Implementations decide persistence; the
/// session treats `patch` as fire-and-forget.
pub trait ProgressStore {
    /// Fetches the record, creating the course's default record on first
    /// access.
    fn get(&mut self, user: &str, course: &str) -> Result<ProgressRecord, StoreError>;

    /// Merges a partial update into the stored record.
    fn patch(&mut self, user: &str, course: &str, patch: &ProgressPatch)
        -> Result<(), StoreError>;
}

/// In-memory store for tests and embedders: one template record per course,
/// cloned for each user on first access.
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    templates: FxHashMap<String, ProgressRecord>,
    records: FxHashMap<(String, String), ProgressRecord>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_course_template(&mut self, course: &str, template: ProgressRecord) {
        self.templates.insert(course.to_string(), template);
    }

    pub fn record(&self, user: &str, course: &str) -> Option<&ProgressRecord> {
        self.records
            .get(&(user.to_string(), course.to_string()))
    }
}

impl ProgressStore for MemoryProgressStore {
    fn get(&mut self, user: &str, course: &str) -> Result<ProgressRecord, StoreError> {
        let slot = (user.to_string(), course.to_string());
        if let Some(record) = self.records.get(&slot) {
            return Ok(record.clone());
        }
        let template = self.templates.get(course).cloned().unwrap_or_default();
        self.records.insert(slot, template.clone());
        Ok(template)
    }

    fn patch(
        &mut self,
        user: &str,
        course: &str,
        patch: &ProgressPatch,
    ) -> Result<(), StoreError> {
        let slot = (user.to_string(), course.to_string());
        self.records.entry(slot).or_default().apply(patch);
        Ok(())
    }
}
