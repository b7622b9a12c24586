/// Scoped hero phrases: small one-off actions (`hero-phrases.json`) any
/// course, module, or lesson directory may carry. Lookups fall back from the
/// lesson to its module to the course.

use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::core::compiler::CourseTree;
use crate::core::hero::{HeroError, HeroRegistry};

const PHRASES_FILE: &str = "hero-phrases.json";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HeroPhrase {
    pub phrase: String,
    pub emotion: String,
    #[serde(rename = "onTime", default)]
    pub on_time: Option<f64>,
}

/// A phrase ready to show, emotion resolved to its asset path.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedHeroPhrase {
    pub phrase: String,
    pub emotion_file_path: String,
    pub on_time: Option<f64>,
}

type PhraseMap = FxHashMap<String, HeroPhrase>;

#[derive(Debug, Clone, Default)]
struct ModulePhrases {
    module: PhraseMap,
    lessons: BTreeMap<u32, PhraseMap>,
}

/// All `hero-phrases.json` content of one course, keyed by scope.
#[derive(Debug, Clone, Default)]
pub struct ScopedPhrases {
    course: PhraseMap,
    modules: BTreeMap<u32, ModulePhrases>,
}

impl ScopedPhrases {
    /// Walks the course tree. A missing or empty file at any scope simply
    /// contributes nothing; a malformed one is an authoring error.
    pub fn collect(tree: &CourseTree) -> Result<Self, HeroError> {
        let mut scoped = Self {
            course: read_phrases(&tree.course_dir)?,
            modules: BTreeMap::new(),
        };
        for (module_num, module) in &tree.modules {
            let mut entry = ModulePhrases {
                module: read_phrases(&module.module_dir)?,
                lessons: BTreeMap::new(),
            };
            for (lesson_num, lesson_dir) in &module.lessons {
                entry
                    .lessons
                    .insert(*lesson_num, read_phrases(lesson_dir)?);
            }
            scoped.modules.insert(*module_num, entry);
        }
        Ok(scoped)
    }

    /// Finds the named action for a lesson, falling back to the module and
    /// then the course scope. `Ok(None)` when no scope declares it.
    pub fn action_for_lesson(
        &self,
        name: &str,
        module: u32,
        lesson: u32,
        heroes: &HeroRegistry,
    ) -> Result<Option<ResolvedHeroPhrase>, HeroError> {
        let module_entry = self.modules.get(&module);
        let candidates = [
            module_entry.and_then(|m| m.lessons.get(&lesson)),
            module_entry.map(|m| &m.module),
            Some(&self.course),
        ];
        for map in candidates.into_iter().flatten() {
            if let Some(phrase) = map.get(name) {
                return Ok(Some(ResolvedHeroPhrase {
                    phrase: phrase.phrase.clone(),
                    emotion_file_path: heroes.resolve(None, &phrase.emotion)?,
                    on_time: phrase.on_time,
                }));
            }
        }
        Ok(None)
    }
}

fn read_phrases(dir: &Path) -> Result<PhraseMap, HeroError> {
    let raw = match fs::read_to_string(dir.join(PHRASES_FILE)) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(PhraseMap::default()),
        Err(err) => return Err(err.into()),
    };
    if raw.trim().is_empty() {
        return Ok(PhraseMap::default());
    }
    Ok(serde_json::from_str(&raw)?)
}
