/// Hero registry: the course's characters, their emotion images, and the
/// canned reactions shown while a user works through a test.

use rand::Rng;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Public URL prefix the client loads hero images from.
pub const HERO_ASSET_ROOT: &str = "/hero";

const HERO_CONFIG_FILE: &str = "hero/config.json";
const TEST_REACTIONS_FILE: &str = "hero/test-reactions.json";

#[derive(Debug, Error)]
pub enum HeroError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("hero config declares no default hero")]
    NoDefaultHero,
    #[error("hero config declares more than one default hero ('{0}' and '{1}')")]
    MultipleDefaultHeroes(String, String),
    #[error("hero '{0}' is declared twice")]
    DuplicateHero(String),
    #[error("hero '{0}' is not part of this course")]
    UnknownHero(String),
    #[error("hero '{hero}' has no emotion '{emotion}'")]
    UnknownEmotion { hero: String, emotion: String },
    #[error("'{0}' is not a valid attempt range")]
    BadAttemptRange(String),
    #[error("'{kind}' reactions leave attempt {attempt} without a reaction")]
    AttemptGap { kind: String, attempt: usize },
    #[error("'{kind}' reactions declare no attempts")]
    NoAttempts { kind: String },
}

#[derive(Debug, Clone, Deserialize)]
struct HeroEntry {
    name: String,
    folder: String,
    #[serde(default)]
    default: bool,
    emotions: FxHashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HeroConfigFile {
    Multi { heroes: Vec<HeroEntry> },
    Single {
        hero: String,
        emotions: FxHashMap<String, String>,
    },
}

#[derive(Debug, Clone)]
struct Hero {
    folder: String,
    emotions: FxHashMap<String, String>,
}

/// The course's characters, loaded from `hero/config.json`. Exactly one hero
/// is the default, used wherever a phrase names no character.
#[derive(Debug, Clone)]
pub struct HeroRegistry {
    heroes: FxHashMap<String, Hero>,
    default_hero: String,
}

impl HeroRegistry {
    pub fn load(course_root: &Path) -> Result<Self, HeroError> {
        let raw = fs::read_to_string(course_root.join(HERO_CONFIG_FILE))?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, HeroError> {
        let entries = match serde_json::from_str::<HeroConfigFile>(raw)? {
            HeroConfigFile::Multi { heroes } => heroes,
            // legacy single-hero shape: the folder doubles as the name
            HeroConfigFile::Single { hero, emotions } => vec![HeroEntry {
                name: hero.clone(),
                folder: hero,
                default: true,
                emotions,
            }],
        };

        let mut heroes = FxHashMap::default();
        let mut default_hero: Option<String> = None;
        for entry in entries {
            if entry.default {
                match &default_hero {
                    None => default_hero = Some(entry.name.clone()),
                    Some(first) => {
                        return Err(HeroError::MultipleDefaultHeroes(
                            first.clone(),
                            entry.name,
                        ))
                    }
                }
            }
            let hero = Hero {
                folder: entry.folder,
                emotions: entry.emotions,
            };
            if heroes.insert(entry.name.clone(), hero).is_some() {
                return Err(HeroError::DuplicateHero(entry.name));
            }
        }

        let default_hero = default_hero.ok_or(HeroError::NoDefaultHero)?;
        Ok(Self {
            heroes,
            default_hero,
        })
    }

    pub fn default_hero(&self) -> &str {
        &self.default_hero
    }

    pub fn has_hero(&self, name: &str) -> bool {
        self.heroes.contains_key(name)
    }

    /// Resolves an emotion to its asset path, `/hero/{folder}/{image}`.
    /// `None` picks the default hero.
    pub fn resolve(&self, hero: Option<&str>, emotion: &str) -> Result<String, HeroError> {
        let name = hero.unwrap_or(&self.default_hero);
        let entry = self
            .heroes
            .get(name)
            .ok_or_else(|| HeroError::UnknownHero(name.to_string()))?;
        let image = entry
            .emotions
            .get(emotion)
            .ok_or_else(|| HeroError::UnknownEmotion {
                hero: name.to_string(),
                emotion: emotion.to_string(),
            })?;
        Ok(format!("{}/{}/{}", HERO_ASSET_ROOT, entry.folder, image))
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ReactionSpec {
    emotion: String,
    phrases: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ReactionKindFile {
    attempts: FxHashMap<String, ReactionSpec>,
}

#[derive(Debug, Deserialize)]
struct ReactionsFile {
    #[serde(rename = "onSuccess")]
    on_success: ReactionKindFile,
    #[serde(rename = "onError")]
    on_error: ReactionKindFile,
    #[serde(rename = "onIdle")]
    on_idle: ReactionKindFile,
}

/// One reaction kind ready to show: resolved emotion plus a picked phrase.
#[derive(Debug, Clone, PartialEq)]
pub struct Reaction {
    pub emotion_file_path: String,
    pub phrase: String,
}

/// The three reactions for one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct TestReactionSet {
    pub on_success: Reaction,
    pub on_error: Reaction,
    pub on_idle: Reaction,
}

/// Per-attempt reactions from `hero/test-reactions.json`. Attempt ranges are
/// 1-based: `"N"`, `"N-M"`, or `"N+"` (N and later). Attempts past the last
/// bound slot reuse it.
#[derive(Debug, Clone)]
pub struct TestReactions {
    on_success: Vec<ReactionSpec>,
    on_error: Vec<ReactionSpec>,
    on_idle: Vec<ReactionSpec>,
}

impl TestReactions {
    pub fn load(course_root: &Path) -> Result<Self, HeroError> {
        let raw = fs::read_to_string(course_root.join(TEST_REACTIONS_FILE))?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, HeroError> {
        let file: ReactionsFile = serde_json::from_str(raw)?;
        Ok(Self {
            on_success: expand_attempts("onSuccess", file.on_success)?,
            on_error: expand_attempts("onError", file.on_error)?,
            on_idle: expand_attempts("onIdle", file.on_idle)?,
        })
    }

    /// Reactions for a 1-based attempt number, phrases picked uniformly.
    /// Emotions resolve against the registry's default hero.
    pub fn reactions_for<R: Rng>(
        &self,
        attempt: usize,
        registry: &HeroRegistry,
        rng: &mut R,
    ) -> Result<TestReactionSet, HeroError> {
        Ok(TestReactionSet {
            on_success: pick(&self.on_success, attempt, registry, rng)?,
            on_error: pick(&self.on_error, attempt, registry, rng)?,
            on_idle: pick(&self.on_idle, attempt, registry, rng)?,
        })
    }
}

fn pick<R: Rng>(
    slots: &[ReactionSpec],
    attempt: usize,
    registry: &HeroRegistry,
    rng: &mut R,
) -> Result<Reaction, HeroError> {
    let index = attempt.saturating_sub(1).min(slots.len() - 1);
    let spec = &slots[index];
    let phrase = spec.phrases[rng.gen_range(0..spec.phrases.len())].clone();
    Ok(Reaction {
        emotion_file_path: registry.resolve(None, &spec.emotion)?,
        phrase,
    })
}

/// Expands range keys into a dense attempt-indexed list. Gaps and empty
/// phrase lists are authoring errors.
fn expand_attempts(
    kind: &str,
    file: ReactionKindFile,
) -> Result<Vec<ReactionSpec>, HeroError> {
    let mut slots: Vec<Option<ReactionSpec>> = Vec::new();
    for (range, spec) in file.attempts {
        if spec.phrases.is_empty() {
            return Err(HeroError::BadAttemptRange(range));
        }
        for index in parse_attempt_range(&range)? {
            if slots.len() <= index {
                slots.resize(index + 1, None);
            }
            slots[index] = Some(spec.clone());
        }
    }
    if slots.is_empty() {
        return Err(HeroError::NoAttempts {
            kind: kind.to_string(),
        });
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| HeroError::AttemptGap {
                kind: kind.to_string(),
                attempt: index + 1,
            })
        })
        .collect()
}

/// `"3"` → [2], `"2-4"` → [1, 2, 3], `"5+"` → [4]. 0-based output.
fn parse_attempt_range(range: &str) -> Result<Vec<usize>, HeroError> {
    let bad = || HeroError::BadAttemptRange(range.to_string());
    let parse_num = |s: &str| -> Result<usize, HeroError> {
        let n: usize = s.parse().map_err(|_| bad())?;
        if n == 0 {
            return Err(bad());
        }
        Ok(n)
    };

    if let Some(start) = range.strip_suffix('+') {
        return Ok(vec![parse_num(start)? - 1]);
    }
    if let Some((from, to)) = range.split_once('-') {
        let from = parse_num(from)?;
        let to = parse_num(to)?;
        if to < from {
            return Err(bad());
        }
        return Ok((from - 1..to).collect());
    }
    Ok(vec![parse_num(range)? - 1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const MULTI: &str = r#"{
        "heroes": [
            {"name": "robo", "folder": "robo", "default": true,
             "emotions": {"happy": "happy.png", "sad": "sad.png"}},
            {"name": "prof", "folder": "professor",
             "emotions": {"stern": "stern.png"}}
        ]
    }"#;

    #[test]
    fn resolves_default_and_named_heroes() {
        let registry = HeroRegistry::from_json_str(MULTI).unwrap();
        assert_eq!(registry.default_hero(), "robo");
        assert_eq!(
            registry.resolve(None, "happy").unwrap(),
            "/hero/robo/happy.png"
        );
        assert_eq!(
            registry.resolve(Some("prof"), "stern").unwrap(),
            "/hero/professor/stern.png"
        );
    }

    #[test]
    fn unknown_hero_and_emotion() {
        let registry = HeroRegistry::from_json_str(MULTI).unwrap();
        assert!(matches!(
            registry.resolve(Some("ghost"), "happy"),
            Err(HeroError::UnknownHero(_))
        ));
        assert!(matches!(
            registry.resolve(None, "furious"),
            Err(HeroError::UnknownEmotion { .. })
        ));
    }

    #[test]
    fn legacy_single_hero_shape() {
        let raw = r#"{"hero": "robo", "emotions": {"happy": "happy.png"}}"#;
        let registry = HeroRegistry::from_json_str(raw).unwrap();
        assert_eq!(registry.default_hero(), "robo");
        assert_eq!(
            registry.resolve(None, "happy").unwrap(),
            "/hero/robo/happy.png"
        );
    }

    #[test]
    fn default_hero_must_be_unique() {
        let none = r#"{"heroes": [{"name": "a", "folder": "a", "emotions": {}}]}"#;
        assert!(matches!(
            HeroRegistry::from_json_str(none),
            Err(HeroError::NoDefaultHero)
        ));

        let two = r#"{"heroes": [
            {"name": "a", "folder": "a", "default": true, "emotions": {}},
            {"name": "b", "folder": "b", "default": true, "emotions": {}}
        ]}"#;
        assert!(matches!(
            HeroRegistry::from_json_str(two),
            Err(HeroError::MultipleDefaultHeroes(..))
        ));
    }

    #[test]
    fn attempt_ranges() {
        assert_eq!(parse_attempt_range("1").unwrap(), vec![0]);
        assert_eq!(parse_attempt_range("2-4").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_attempt_range("3+").unwrap(), vec![2]);
        assert!(parse_attempt_range("0").is_err());
        assert!(parse_attempt_range("4-2").is_err());
        assert!(parse_attempt_range("x").is_err());
        assert!(parse_attempt_range("").is_err());
    }

    const REACTIONS: &str = r#"{
        "onSuccess": {"attempts": {
            "1": {"emotion": "happy", "phrases": ["Great!", "Well done!"]},
            "2+": {"emotion": "happy", "phrases": ["Good."]}
        }},
        "onError": {"attempts": {
            "1-2": {"emotion": "sad", "phrases": ["Try again."]}
        }},
        "onIdle": {"attempts": {
            "1": {"emotion": "happy", "phrases": ["Take your time."]}
        }}
    }"#;

    #[test]
    fn reactions_fall_back_to_last_slot() {
        let registry = HeroRegistry::from_json_str(MULTI).unwrap();
        let reactions = TestReactions::from_json_str(REACTIONS).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        let first = reactions.reactions_for(1, &registry, &mut rng).unwrap();
        assert!(["Great!", "Well done!"].contains(&first.on_success.phrase.as_str()));
        assert_eq!(first.on_error.phrase, "Try again.");
        assert_eq!(first.on_error.emotion_file_path, "/hero/robo/sad.png");

        // attempt 9 is past every bound slot
        let late = reactions.reactions_for(9, &registry, &mut rng).unwrap();
        assert_eq!(late.on_success.phrase, "Good.");
        assert_eq!(late.on_error.phrase, "Try again.");
        assert_eq!(late.on_idle.phrase, "Take your time.");
    }

    #[test]
    fn attempt_gap_is_fatal() {
        let raw = r#"{
            "onSuccess": {"attempts": {"1": {"emotion": "happy", "phrases": ["a"]},
                                        "3": {"emotion": "happy", "phrases": ["b"]}}},
            "onError": {"attempts": {"1": {"emotion": "sad", "phrases": ["c"]}}},
            "onIdle": {"attempts": {"1": {"emotion": "happy", "phrases": ["d"]}}}
        }"#;
        assert!(matches!(
            TestReactions::from_json_str(raw),
            Err(HeroError::AttemptGap { attempt: 2, .. })
        ));
    }
}
