/// Game session: one user working through one course. Owns the event bus,
/// the live variable and achievement state, the dialog queue, and the
/// lesson/test lifecycle entry points the platform calls into.

use log::warn;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use thiserror::Error;

use crate::core::bus::{EventBus, EventHandler, SubscriptionId};
use crate::core::compiler::{ActionKind, Manifest};
use crate::core::config::TESTS_SCORE_VAR;
use crate::core::walker::DialogPlayback;
use crate::schema::dialog::ResolvedPhrase;
use crate::schema::event::{EventArgs, EventName};
use crate::schema::progress::{
    LessonKey, ProgressPatch, ProgressRecord, ProgressStore, StoreError,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{event} was emitted with mismatched parameters")]
    EventArity { event: EventName },
    #[error("variable '{0}' is not part of this course")]
    UnknownVariable(String),
    #[error("variable '{0}' is read-only")]
    ReadOnlyVariable(String),
    #[error("achievement '{0}' is not part of this course")]
    UnknownAchievement(String),
    #[error("fork on '{variable}' matched no branch")]
    DeadFork { variable: String },
    #[error("no dialog is being played")]
    NoActiveDialog,
    #[error("dialog '{0}' is not in the compiled manifest")]
    UnknownDialog(String),
}

/// The mutable per-session data event handlers can reach.
#[derive(Debug)]
pub struct SessionState {
    pub user: String,
    pub course: String,
    pub progress: ProgressRecord,
    pub variables: FxHashMap<String, i64>,
    pub claimed: FxHashSet<String>,
    pub pending_dialogs: VecDeque<String>,
}

impl SessionState {
    pub fn new(user: &str, course: &str, progress: ProgressRecord) -> Self {
        Self {
            user: user.to_string(),
            course: course.to_string(),
            progress,
            variables: FxHashMap::default(),
            claimed: FxHashSet::default(),
            pending_dialogs: VecDeque::new(),
        }
    }

    /// Live value of a variable; `tests_score` is computed from the task
    /// scores instead of stored.
    pub fn variable_value(&self, name: &str) -> Option<i64> {
        if name == TESTS_SCORE_VAR {
            return Some(self.progress.tests_score());
        }
        self.variables.get(name).copied()
    }
}

pub struct GameSession {
    manifest: Manifest,
    bus: EventBus,
    state: SessionState,
    store: Box<dyn ProgressStore>,
    active: Option<DialogPlayback>,
}

impl GameSession {
    /// Builds a session from a compiled manifest. The initial progress read
    /// is the only store call allowed to fail the session; every manifest
    /// action gets a bus subscription that enqueues its dialog once.
    pub fn new(
        user: &str,
        course: &str,
        manifest: Manifest,
        mut store: Box<dyn ProgressStore>,
    ) -> Result<Self, SessionError> {
        let progress = store.get(user, course)?;

        let mut variables: FxHashMap<String, i64> = manifest
            .variables
            .iter()
            .map(|name| (name.clone(), 0))
            .collect();
        for (name, value) in &progress.meta.variables {
            if variables.contains_key(name) {
                variables.insert(name.clone(), *value);
            }
        }
        let mut state = SessionState::new(user, course, progress);
        state.variables = variables;
        state.claimed = state.progress.meta.achievements.iter().cloned().collect();

        let mut session = Self {
            manifest,
            bus: EventBus::new(),
            state,
            store,
            active: None,
        };
        session.install_actions();
        Ok(session)
    }

    /// Each compiled action fires at most once per session: the handler
    /// enqueues the dialog and drops itself.
    fn install_actions(&mut self) {
        for action in &self.manifest.actions {
            match action.kind {
                ActionKind::Dialog => {
                    let key = action.event.clone();
                    let path = action.path.clone();
                    self.bus.subscribe(
                        key.name(),
                        Box::new(move |args, _bus, state| {
                            if key.matches(args) {
                                state.pending_dialogs.push_back(path.clone());
                                return Ok(true);
                            }
                            Ok(false)
                        }),
                    );
                }
            }
        }
    }

    pub fn emit(&mut self, event: EventName, args: EventArgs) -> Result<(), SessionError> {
        self.bus.emit(event, args, &mut self.state)
    }

    pub fn subscribe(&mut self, event: EventName, handler: EventHandler) -> SubscriptionId {
        self.bus.subscribe(event, handler)
    }

    pub fn unsubscribe(&mut self, event: EventName, id: SubscriptionId) {
        self.bus.unsubscribe(event, id);
    }

    /// Session teardown boundary: all subscriptions, queued dialogs, and any
    /// active playback are dropped.
    pub fn reset(&mut self) {
        self.bus.reset();
        self.state.pending_dialogs.clear();
        self.active = None;
    }

    // --- lifecycle entry points -------------------------------------------

    /// Called when the user opens a lesson's theory. Already-read lessons
    /// are silent. Events cascade narrowest first: the lesson, then the
    /// module if nothing in it was touched before, then the course likewise.
    pub fn start_lesson(&mut self, module: u32, lesson: u32) -> Result<(), SessionError> {
        let key = LessonKey::new(module, lesson).to_string();
        if self.state.progress.lessons.get(&key).copied().unwrap_or(false) {
            return Ok(());
        }
        self.emit(EventName::LessonStart, EventArgs::Lesson(module, lesson))?;
        if !self.state.progress.module_started(module) {
            self.emit(EventName::ModuleStart, EventArgs::Module(module))?;
        }
        if !self.state.progress.course_started() {
            self.emit(EventName::CourseStart, EventArgs::None)?;
        }
        Ok(())
    }

    /// Called when the user opens a lesson's test. Silent unless the test
    /// exists and is still unscored.
    pub fn start_test(&mut self, module: u32, lesson: u32) -> Result<(), SessionError> {
        let key = LessonKey::new(module, lesson).to_string();
        if self.state.progress.tasks.get(&key).copied() != Some(0) {
            return Ok(());
        }
        self.emit(EventName::TestStart, EventArgs::Lesson(module, lesson))?;
        if !self.state.progress.module_started(module) {
            self.emit(EventName::ModuleStart, EventArgs::Module(module))?;
        }
        if !self.state.progress.course_started() {
            self.emit(EventName::CourseStart, EventArgs::None)?;
        }
        Ok(())
    }

    /// Marks the theory read. Idempotent; the completion cascade widens from
    /// the lesson to the module to the course as each fills up.
    pub fn end_lesson(&mut self, module: u32, lesson: u32) -> Result<(), SessionError> {
        let key = LessonKey::new(module, lesson);
        let raw = key.to_string();
        if self.state.progress.lessons.get(&raw).copied().unwrap_or(false) {
            return Ok(());
        }
        self.state.progress.lessons.insert(raw, true);
        self.push_patch(ProgressPatch::lesson(key));

        self.emit(EventName::LessonEnd, EventArgs::Lesson(module, lesson))?;
        if self.state.progress.module_completed(module) {
            self.emit(EventName::ModuleEnd, EventArgs::Module(module))?;
        }
        if self.state.progress.course_completed() {
            self.emit(EventName::CourseEnd, EventArgs::None)?;
        }
        Ok(())
    }

    /// Records a test score. A test that already has a positive score keeps
    /// it; re-takes are silent.
    pub fn end_test(&mut self, module: u32, lesson: u32, score: i64) -> Result<(), SessionError> {
        let key = LessonKey::new(module, lesson);
        let raw = key.to_string();
        if self.state.progress.tasks.get(&raw).copied().unwrap_or(0) > 0 {
            return Ok(());
        }
        self.state.progress.tasks.insert(raw, score);
        self.push_patch(ProgressPatch::task(key, score));

        self.emit(EventName::TestEnd, EventArgs::Lesson(module, lesson))?;
        if self.state.progress.module_completed(module) {
            self.emit(EventName::ModuleEnd, EventArgs::Module(module))?;
        }
        if self.state.progress.course_completed() {
            self.emit(EventName::CourseEnd, EventArgs::None)?;
        }
        Ok(())
    }

    pub fn start_practice(&mut self, module: u32, lesson: u32) -> Result<(), SessionError> {
        self.emit(EventName::PracticeStart, EventArgs::Lesson(module, lesson))
    }

    pub fn end_practice(&mut self, module: u32, lesson: u32) -> Result<(), SessionError> {
        self.emit(EventName::PracticeEnd, EventArgs::Lesson(module, lesson))
    }

    // --- variables and achievements ---------------------------------------

    pub fn variable_value(&self, name: &str) -> Option<i64> {
        self.state.variable_value(name)
    }

    /// Sets a variable and announces the new value on the bus.
    pub fn set_points(&mut self, name: &str, value: i64) -> Result<i64, SessionError> {
        if name == TESTS_SCORE_VAR {
            return Err(SessionError::ReadOnlyVariable(name.to_string()));
        }
        if !self.state.variables.contains_key(name) {
            return Err(SessionError::UnknownVariable(name.to_string()));
        }
        self.state.variables.insert(name.to_string(), value);
        self.state
            .progress
            .meta
            .variables
            .insert(name.to_string(), value);
        self.push_patch(ProgressPatch::variable(name, value));
        self.emit(
            EventName::PointsRetrieve,
            EventArgs::Points {
                variable: name.to_string(),
                value,
            },
        )?;
        Ok(value)
    }

    pub fn add_points(&mut self, name: &str, delta: i64) -> Result<i64, SessionError> {
        let current = self
            .variable_value(name)
            .ok_or_else(|| SessionError::UnknownVariable(name.to_string()))?;
        self.set_points(name, current + delta)
    }

    /// Grants an achievement. Returns `false` when it was already claimed.
    pub fn claim_achievement(&mut self, name: &str) -> Result<bool, SessionError> {
        if !self.manifest.achievements.iter().any(|a| a.name == name) {
            return Err(SessionError::UnknownAchievement(name.to_string()));
        }
        if self.state.claimed.contains(name) {
            return Ok(false);
        }
        self.state.claimed.insert(name.to_string());
        self.state.progress.meta.achievements.push(name.to_string());
        self.push_patch(ProgressPatch::achievement(name));
        Ok(true)
    }

    pub fn is_claimed(&self, name: &str) -> bool {
        self.state.claimed.contains(name)
    }

    // --- dialog playback ---------------------------------------------------

    pub fn has_pending_dialog(&self) -> bool {
        !self.state.pending_dialogs.is_empty()
    }

    pub fn dialog_active(&self) -> bool {
        self.active.is_some()
    }

    /// Starts the dialog at the front of the queue. Returns `false` when one
    /// is already playing or the queue is empty; a triggered dialog waits in
    /// the queue rather than clobbering the active one.
    pub fn begin_next_dialog(&mut self) -> Result<bool, SessionError> {
        if self.active.is_some() {
            return Ok(false);
        }
        let Some(path) = self.state.pending_dialogs.pop_front() else {
            return Ok(false);
        };
        let playback = {
            let body = self
                .manifest
                .dialog(&path)
                .ok_or(SessionError::UnknownDialog(path.clone()))?;
            DialogPlayback::new(body)
        };
        self.active = Some(playback);
        Ok(true)
    }

    /// Advances the active playback to its next phrase, applying any side
    /// effects on the way. `None` means the dialog finished and the slot is
    /// free again.
    pub fn next_phrase(&mut self) -> Result<Option<ResolvedPhrase>, SessionError> {
        let Some(mut playback) = self.active.take() else {
            return Err(SessionError::NoActiveDialog);
        };
        let phrase = playback.advance(self)?;
        if phrase.is_some() {
            self.active = Some(playback);
        }
        Ok(phrase)
    }

    // --- accessors ---------------------------------------------------------

    pub fn progress(&self) -> &ProgressRecord {
        &self.state.progress
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Progress writes are fire-and-forget: the in-memory record stays
    /// authoritative for the session and a failed write only warns.
    fn push_patch(&mut self, patch: ProgressPatch) {
        if let Err(err) = self
            .store
            .patch(&self.state.user, &self.state.course, &patch)
        {
            warn!(
                "progress write for '{}' in '{}' failed: {}",
                self.state.user, self.state.course, err
            );
        }
    }
}
