/// Course gamification compiler: scans a course tree for dialog files,
/// validates and resolves each one, and emits the static documents plus the
/// `gaming.json` manifest the client boots from.

use log::debug;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::config::{Achievement, GamingConfig};
use crate::core::hero::HeroRegistry;
use crate::core::parser::{self, DialogError};
use crate::schema::dialog::{response_document, ResolvedNode};
use crate::schema::event::{Arity, EventKey, EventName};

#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Dialog(#[from] DialogError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("'{file}': event '{event}' is malformed or not supported")]
    BadEvent { file: String, event: String },
    #[error("'{file}': event '{event}' needs a module scope, but the file is outside any module")]
    EventOutsideModule { file: String, event: String },
    #[error("'{file}': event '{event}' needs a lesson scope, but the file is outside any lesson")]
    EventOutsideLesson { file: String, event: String },
    #[error("'{file}': event '{event}' reads variable '{variable}', which is not part of this course")]
    EventVariableUnknown {
        file: String,
        event: String,
        variable: String,
    },
}

/// Directory layout of one course, supplied by whatever indexes the course
/// content. Module and lesson numbers key the maps so scan order is stable.
#[derive(Debug, Clone, Default)]
pub struct CourseTree {
    /// Directory holding course-level gamification files.
    pub course_dir: PathBuf,
    pub modules: BTreeMap<u32, ModuleTree>,
}

#[derive(Debug, Clone, Default)]
pub struct ModuleTree {
    pub module_dir: PathBuf,
    pub lessons: BTreeMap<u32, PathBuf>,
}

/// What to do when an event fires. Dialogs are the only kind today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActionKind {
    #[serde(rename = "dialog")]
    Dialog,
}

#[derive(Debug, Clone, Serialize)]
pub struct Action {
    pub event: EventKey,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub path: String,
}

/// The compiled course: everything a session needs to run its gamification.
/// Serialized (without the resolved trees) as `gaming.json`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Manifest {
    pub actions: Vec<Action>,
    pub variables: Vec<String>,
    pub achievements: Vec<Achievement>,
    /// Resolved dialog bodies keyed by action path, so a session never has
    /// to re-read the static files.
    #[serde(skip)]
    pub dialogs: FxHashMap<String, Vec<ResolvedNode>>,
}

impl Manifest {
    pub fn dialog(&self, path: &str) -> Option<&[ResolvedNode]> {
        self.dialogs.get(path).map(Vec::as_slice)
    }
}

pub struct CourseCompiler<'a> {
    config: &'a GamingConfig,
    heroes: &'a HeroRegistry,
}

impl<'a> CourseCompiler<'a> {
    pub fn new(config: &'a GamingConfig, heroes: &'a HeroRegistry) -> Self {
        Self { config, heroes }
    }

    /// Validates the whole course without writing anything. The returned
    /// manifest carries the resolved dialogs; any authoring error aborts the
    /// compilation, so a broken dialog never reaches a manifest.
    pub fn check(&self, tree: &CourseTree) -> Result<Manifest, CompileError> {
        let mut manifest = Manifest {
            actions: Vec::new(),
            variables: self.config.variables().to_vec(),
            achievements: self.config.achievements().to_vec(),
            dialogs: FxHashMap::default(),
        };
        let mut counter = 0usize;

        self.scan_dir(&tree.course_dir, None, None, &mut manifest, &mut counter)?;
        for (module_num, module) in &tree.modules {
            self.scan_dir(
                &module.module_dir,
                Some(*module_num),
                None,
                &mut manifest,
                &mut counter,
            )?;
            for (lesson_num, lesson_dir) in &module.lessons {
                self.scan_dir(
                    lesson_dir,
                    Some(*module_num),
                    Some(*lesson_num),
                    &mut manifest,
                    &mut counter,
                )?;
            }
        }
        Ok(manifest)
    }

    /// Compiles the course and writes one `dialog-N.json` per accepted
    /// dialog plus `gaming.json` into `static_dir`. Identifiers come from a
    /// per-compilation counter, so recompiling is idempotent.
    pub fn compile(&self, tree: &CourseTree, static_dir: &Path) -> Result<Manifest, CompileError> {
        let manifest = self.check(tree)?;

        fs::create_dir_all(static_dir)?;
        for action in &manifest.actions {
            let body = &manifest.dialogs[&action.path];
            let doc = serde_json::to_string(&response_document(body))?;
            fs::write(static_dir.join(&action.path), doc)?;
        }
        fs::write(
            static_dir.join("gaming.json"),
            serde_json::to_string(&manifest)?,
        )?;
        Ok(manifest)
    }

    fn scan_dir(
        &self,
        dir: &Path,
        module: Option<u32>,
        lesson: Option<u32>,
        manifest: &mut Manifest,
        counter: &mut usize,
    ) -> Result<(), CompileError> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        files.sort();

        for path in files {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let name = name.to_lowercase();
            // dialogs are the only gamification documents picked up by name;
            // everything else in the directory belongs to other workers
            if !name.ends_with(".json") || !name.contains("dialog") {
                continue;
            }

            let script = parser::parse_dialog_file(&path)?;
            let origin = path.display().to_string();
            let event = self.event_key(&origin, &script.event, module, lesson)?;
            let body = parser::resolve(&script, self.config, self.heroes, &origin)?;

            let id = format!("dialog-{}.json", *counter);
            *counter += 1;
            debug!("compiled '{}' as {} on {}", origin, id, event);
            manifest.dialogs.insert(id.clone(), body);
            manifest.actions.push(Action {
                event,
                kind: ActionKind::Dialog,
                path: id,
            });
        }
        Ok(())
    }

    /// Binds an authored event string to the scope the file sits in. Scope
    /// parameters come from the directory, never from the author.
    fn event_key(
        &self,
        file: &str,
        event: &str,
        module: Option<u32>,
        lesson: Option<u32>,
    ) -> Result<EventKey, CompileError> {
        if let Some(name) = EventName::parse(event) {
            return match name.arity() {
                Arity::Zero => Ok(EventKey::Course(name)),
                Arity::One => module.map(|m| EventKey::Module(name, m)).ok_or_else(|| {
                    CompileError::EventOutsideModule {
                        file: file.to_string(),
                        event: event.to_string(),
                    }
                }),
                Arity::Two if name != EventName::PointsRetrieve => match (module, lesson) {
                    (Some(m), Some(l)) => Ok(EventKey::Lesson(name, m, l)),
                    (None, _) => Err(CompileError::EventOutsideModule {
                        file: file.to_string(),
                        event: event.to_string(),
                    }),
                    _ => Err(CompileError::EventOutsideLesson {
                        file: file.to_string(),
                        event: event.to_string(),
                    }),
                },
                // bare "onPointsRetrieve" without its variable and threshold
                _ => Err(CompileError::BadEvent {
                    file: file.to_string(),
                    event: event.to_string(),
                }),
            };
        }

        if event.starts_with("onPointsRetrieve") {
            let key: EventKey = event.parse().map_err(|_| CompileError::BadEvent {
                file: file.to_string(),
                event: event.to_string(),
            })?;
            if let EventKey::Points { variable, .. } = &key {
                if !self.config.has_variable(variable) {
                    return Err(CompileError::EventVariableUnknown {
                        file: file.to_string(),
                        event: event.to_string(),
                        variable: variable.clone(),
                    });
                }
            }
            return Ok(key);
        }

        Err(CompileError::BadEvent {
            file: file.to_string(),
            event: event.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiler_parts() -> (GamingConfig, HeroRegistry) {
        let config = GamingConfig::from_parts(vec!["score".to_string()], vec![]).unwrap();
        let heroes = HeroRegistry::from_json_str(
            r#"{"hero": "robo", "emotions": {"happy": "happy.png"}}"#,
        )
        .unwrap();
        (config, heroes)
    }

    #[test]
    fn event_scope_binding() {
        let (config, heroes) = compiler_parts();
        let compiler = CourseCompiler::new(&config, &heroes);

        let key = compiler
            .event_key("f", "onCourseStart", Some(3), Some(1))
            .unwrap();
        assert_eq!(key, EventKey::Course(EventName::CourseStart));

        let key = compiler
            .event_key("f", "onModuleEnd", Some(3), None)
            .unwrap();
        assert_eq!(key, EventKey::Module(EventName::ModuleEnd, 3));

        let key = compiler
            .event_key("f", "onTestStart", Some(2), Some(5))
            .unwrap();
        assert_eq!(key, EventKey::Lesson(EventName::TestStart, 2, 5));
    }

    #[test]
    fn scope_mismatches_are_fatal() {
        let (config, heroes) = compiler_parts();
        let compiler = CourseCompiler::new(&config, &heroes);

        assert!(matches!(
            compiler.event_key("f", "onModuleStart", None, None),
            Err(CompileError::EventOutsideModule { .. })
        ));
        assert!(matches!(
            compiler.event_key("f", "onLessonStart", Some(1), None),
            Err(CompileError::EventOutsideLesson { .. })
        ));
        assert!(matches!(
            compiler.event_key("f", "onLessonStart", None, None),
            Err(CompileError::EventOutsideModule { .. })
        ));
    }

    #[test]
    fn points_events_check_the_variable() {
        let (config, heroes) = compiler_parts();
        let compiler = CourseCompiler::new(&config, &heroes);

        let key = compiler
            .event_key("f", "onPointsRetrieve(score, 10)", None, None)
            .unwrap();
        assert_eq!(
            key,
            EventKey::Points {
                variable: "score".to_string(),
                threshold: 10,
            }
        );
        let key = compiler
            .event_key("f", "onPointsRetrieve(tests_score, 3)", None, None)
            .unwrap();
        assert!(matches!(key, EventKey::Points { .. }));

        assert!(matches!(
            compiler.event_key("f", "onPointsRetrieve(banana, 10)", None, None),
            Err(CompileError::EventVariableUnknown { .. })
        ));
        assert!(matches!(
            compiler.event_key("f", "onPointsRetrieve", None, None),
            Err(CompileError::BadEvent { .. })
        ));
    }

    #[test]
    fn unknown_events_are_fatal() {
        let (config, heroes) = compiler_parts();
        let compiler = CourseCompiler::new(&config, &heroes);
        assert!(matches!(
            compiler.event_key("f", "onBanana", Some(1), Some(1)),
            Err(CompileError::BadEvent { .. })
        ));
    }
}
