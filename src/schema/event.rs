/// Lifecycle event taxonomy — the fixed set of course/module/lesson/test
/// signals, their arities, and the canonical `name(params)` string form.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventParseError {
    #[error("unknown event name '{0}'")]
    UnknownName(String),
    #[error("malformed event key '{0}'")]
    Malformed(String),
}

/// Number of entries in the taxonomy; sizes the bus dispatch table.
pub const EVENT_COUNT: usize = 11;

/// The fixed taxonomy of lifecycle event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventName {
    CourseStart,
    CourseEnd,
    ModuleStart,
    ModuleEnd,
    LessonStart,
    LessonEnd,
    PracticeStart,
    PracticeEnd,
    TestStart,
    TestEnd,
    PointsRetrieve,
}

/// Parameter count an event name is emitted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Zero,
    One,
    Two,
}

pub const ALL_EVENTS: [EventName; EVENT_COUNT] = [
    EventName::CourseStart,
    EventName::CourseEnd,
    EventName::ModuleStart,
    EventName::ModuleEnd,
    EventName::LessonStart,
    EventName::LessonEnd,
    EventName::PracticeStart,
    EventName::PracticeEnd,
    EventName::TestStart,
    EventName::TestEnd,
    EventName::PointsRetrieve,
];

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CourseStart => "onCourseStart",
            Self::CourseEnd => "onCourseEnd",
            Self::ModuleStart => "onModuleStart",
            Self::ModuleEnd => "onModuleEnd",
            Self::LessonStart => "onLessonStart",
            Self::LessonEnd => "onLessonEnd",
            Self::PracticeStart => "onPracticeStart",
            Self::PracticeEnd => "onPracticeEnd",
            Self::TestStart => "onTestStart",
            Self::TestEnd => "onTestEnd",
            Self::PointsRetrieve => "onPointsRetrieve",
        }
    }

    pub fn parse(name: &str) -> Option<EventName> {
        ALL_EVENTS.iter().copied().find(|e| e.as_str() == name)
    }

    pub fn arity(&self) -> Arity {
        match self {
            Self::CourseStart | Self::CourseEnd => Arity::Zero,
            Self::ModuleStart | Self::ModuleEnd => Arity::One,
            _ => Arity::Two,
        }
    }

    /// Slot in the bus dispatch table.
    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime parameters an event is emitted with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventArgs {
    None,
    Module(u32),
    Lesson(u32, u32),
    Points { variable: String, value: i64 },
}

impl EventArgs {
    /// Whether these parameters fit the event's declared arity. Emitting with
    /// mismatched parameters is a caller bug, not an authoring error.
    pub fn fits(&self, name: EventName) -> bool {
        match self {
            Self::None => name.arity() == Arity::Zero,
            Self::Module(_) => name.arity() == Arity::One,
            Self::Lesson(..) => name.arity() == Arity::Two && name != EventName::PointsRetrieve,
            Self::Points { .. } => name == EventName::PointsRetrieve,
        }
    }
}

impl fmt::Display for EventArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "()"),
            Self::Module(m) => write!(f, "({})", m),
            Self::Lesson(m, l) => write!(f, "({}, {})", m, l),
            Self::Points { variable, value } => write!(f, "({}, {})", variable, value),
        }
    }
}

/// A compiled event binding: a taxonomy entry plus concrete parameter values,
/// or a variable/threshold pair for `onPointsRetrieve`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKey {
    Course(EventName),
    Module(EventName, u32),
    Lesson(EventName, u32, u32),
    Points { variable: String, threshold: i64 },
}

impl EventKey {
    pub fn name(&self) -> EventName {
        match self {
            Self::Course(name) | Self::Module(name, _) | Self::Lesson(name, ..) => *name,
            Self::Points { .. } => EventName::PointsRetrieve,
        }
    }

    /// Whether an emission with `args` satisfies this binding. Thresholds for
    /// `onPointsRetrieve` fire on any value at or above the declared minimum.
    pub fn matches(&self, args: &EventArgs) -> bool {
        match (self, args) {
            (Self::Course(_), EventArgs::None) => true,
            (Self::Module(_, m), EventArgs::Module(am)) => m == am,
            (Self::Lesson(_, m, l), EventArgs::Lesson(am, al)) => m == am && l == al,
            (Self::Points { variable, threshold }, EventArgs::Points { variable: av, value }) => {
                variable == av && value >= threshold
            }
            _ => false,
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Course(name) => write!(f, "{}()", name),
            Self::Module(name, m) => write!(f, "{}({})", name, m),
            Self::Lesson(name, m, l) => write!(f, "{}({}, {})", name, m, l),
            Self::Points { variable, threshold } => {
                write!(f, "onPointsRetrieve({}, {})", variable, threshold)
            }
        }
    }
}

impl FromStr for EventKey {
    type Err = EventParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let malformed = || EventParseError::Malformed(input.to_string());

        let open = input.find('(').ok_or_else(malformed)?;
        let close = input.rfind(')').ok_or_else(malformed)?;
        if close != input.len() - 1 || close < open {
            return Err(malformed());
        }

        let name_part = &input[..open];
        let inner = input[open + 1..close].trim();
        let name = EventName::parse(name_part)
            .ok_or_else(|| EventParseError::UnknownName(name_part.to_string()))?;

        match name {
            EventName::PointsRetrieve => {
                let (variable, threshold) = inner.split_once(',').ok_or_else(malformed)?;
                let variable = variable.trim();
                if variable.is_empty() {
                    return Err(malformed());
                }
                let threshold: i64 = threshold.trim().parse().map_err(|_| malformed())?;
                Ok(Self::Points {
                    variable: variable.to_string(),
                    threshold,
                })
            }
            _ => match name.arity() {
                Arity::Zero => {
                    if !inner.is_empty() {
                        return Err(malformed());
                    }
                    Ok(Self::Course(name))
                }
                Arity::One => {
                    let module: u32 = inner.parse().map_err(|_| malformed())?;
                    Ok(Self::Module(name, module))
                }
                Arity::Two => {
                    let (m, l) = inner.split_once(',').ok_or_else(malformed)?;
                    let module: u32 = m.trim().parse().map_err(|_| malformed())?;
                    let lesson: u32 = l.trim().parse().map_err(|_| malformed())?;
                    Ok(Self::Lesson(name, module, lesson))
                }
            },
        }
    }
}

// On the wire an event key is its canonical string, e.g. "onLessonStart(1, 2)".

impl Serialize for EventKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EventKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}
