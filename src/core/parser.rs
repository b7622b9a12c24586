/// Dialog script parsing, static validation, and emotion resolution. Every
/// authoring error carries the offending file so course authors get pointed
/// at the exact document.

use serde_json::Value;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::core::config::GamingConfig;
use crate::core::hero::{HeroError, HeroRegistry};
use crate::schema::dialog::{
    Condition, ConditionError, DialogNode, DialogScript, Fork, ForkBranch, Phrase, PointGrant,
    ResolvedNode, ResolvedPhrase,
};

#[derive(Debug, Error)]
pub enum DialogError {
    #[error("'{file}': IO error: {source}")]
    Io {
        file: String,
        source: std::io::Error,
    },
    #[error("'{file}': JSON error: {source}")]
    Json {
        file: String,
        source: serde_json::Error,
    },
    #[error("'{file}': 'event' is missing or empty")]
    MissingEvent { file: String },
    #[error("'{file}': 'dialog' is missing or not an array")]
    MissingBody { file: String },
    #[error("'{file}': {snippet} is not a valid dialog node")]
    UnknownNode { file: String, snippet: String },
    #[error("'{file}': {source}")]
    Condition {
        file: String,
        source: ConditionError,
    },
    #[error("'{file}': variable '{variable}' is not part of this course")]
    UnknownVariable { file: String, variable: String },
    #[error("'{file}': variable '{variable}' is read-only")]
    ReadOnlyVariable { file: String, variable: String },
    #[error("'{file}': achievement '{achievement}' is not part of this course")]
    UnknownAchievement { file: String, achievement: String },
    #[error("'{file}': {source}")]
    Hero { file: String, source: HeroError },
    #[error("'{file}': fork on '{variable}' has no 'else' and does not cover every value")]
    NonExhaustiveFork { file: String, variable: String },
}

pub fn parse_dialog_file(path: &Path) -> Result<DialogScript, DialogError> {
    let origin = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|source| DialogError::Io {
        file: origin.clone(),
        source,
    })?;
    parse_dialog_str(&raw, &origin)
}

/// Parses `{"event": ..., "dialog": [...]}` into a typed script. Node kinds
/// are told apart by their distinguishing key: `hero` for phrases,
/// `type: "fork"` for forks, `givePoints` / `giveAchievements` for grants.
pub fn parse_dialog_str(raw: &str, origin: &str) -> Result<DialogScript, DialogError> {
    let root: Value = serde_json::from_str(raw).map_err(|source| DialogError::Json {
        file: origin.to_string(),
        source,
    })?;

    let event = root
        .get("event")
        .and_then(Value::as_str)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| DialogError::MissingEvent {
            file: origin.to_string(),
        })?
        .to_string();

    let items = root
        .get("dialog")
        .and_then(Value::as_array)
        .ok_or_else(|| DialogError::MissingBody {
            file: origin.to_string(),
        })?;

    Ok(DialogScript {
        event,
        body: parse_body(items, origin)?,
    })
}

fn parse_body(items: &[Value], origin: &str) -> Result<Vec<DialogNode>, DialogError> {
    items.iter().map(|item| parse_node(item, origin)).collect()
}

fn parse_node(item: &Value, origin: &str) -> Result<DialogNode, DialogError> {
    let unknown = || DialogError::UnknownNode {
        file: origin.to_string(),
        snippet: item.to_string(),
    };
    let obj = item.as_object().ok_or_else(unknown)?;

    if obj.contains_key("hero") {
        let phrase: Phrase =
            serde_json::from_value(item.clone()).map_err(|source| DialogError::Json {
                file: origin.to_string(),
                source,
            })?;
        return Ok(DialogNode::Phrase(phrase));
    }

    if obj.get("type").and_then(Value::as_str) == Some("fork") {
        let condition = obj.get("condition").ok_or_else(unknown)?;
        let variable = condition
            .get("variable")
            .and_then(Value::as_str)
            .ok_or_else(unknown)?
            .to_string();
        let on = condition
            .get("on")
            .and_then(Value::as_object)
            .ok_or_else(unknown)?;

        let mut branches = Vec::with_capacity(on.len());
        for (key, body) in on {
            let condition =
                Condition::parse(key).map_err(|source| DialogError::Condition {
                    file: origin.to_string(),
                    source,
                })?;
            let body = body.as_array().ok_or_else(unknown)?;
            branches.push(ForkBranch {
                condition,
                body: parse_body(body, origin)?,
            });
        }
        return Ok(DialogNode::Fork(Fork { variable, branches }));
    }

    if let Some(grants) = obj.get("givePoints") {
        let grants: Vec<PointGrant> =
            serde_json::from_value(grants.clone()).map_err(|source| DialogError::Json {
                file: origin.to_string(),
                source,
            })?;
        return Ok(DialogNode::GivePoints(grants));
    }

    if let Some(names) = obj.get("giveAchievements") {
        let names: Vec<String> =
            serde_json::from_value(names.clone()).map_err(|source| DialogError::Json {
                file: origin.to_string(),
                source,
            })?;
        return Ok(DialogNode::GiveAchievements(names));
    }

    Err(unknown())
}

/// Checks every reference in the script against the course catalogs: fork
/// variables, point grants (writable variables only), achievements, and hero
/// emotions. Fails on the first offence, in document order.
pub fn validate(
    script: &DialogScript,
    config: &GamingConfig,
    heroes: &HeroRegistry,
    origin: &str,
) -> Result<(), DialogError> {
    validate_body(&script.body, config, heroes, origin)
}

fn validate_body(
    body: &[DialogNode],
    config: &GamingConfig,
    heroes: &HeroRegistry,
    origin: &str,
) -> Result<(), DialogError> {
    for node in body {
        match node {
            DialogNode::Phrase(phrase) => {
                heroes
                    .resolve(Some(&phrase.hero), &phrase.emotion)
                    .map_err(|source| DialogError::Hero {
                        file: origin.to_string(),
                        source,
                    })?;
            }
            DialogNode::Fork(fork) => {
                if !config.has_variable(&fork.variable) {
                    return Err(DialogError::UnknownVariable {
                        file: origin.to_string(),
                        variable: fork.variable.clone(),
                    });
                }
                let conditions: Vec<Condition> =
                    fork.branches.iter().map(|b| b.condition.clone()).collect();
                if !covers_all_values(&conditions) {
                    return Err(DialogError::NonExhaustiveFork {
                        file: origin.to_string(),
                        variable: fork.variable.clone(),
                    });
                }
                for branch in &fork.branches {
                    validate_body(&branch.body, config, heroes, origin)?;
                }
            }
            DialogNode::GivePoints(grants) => {
                for grant in grants {
                    if !config.is_writable_variable(&grant.variable) {
                        return Err(if config.has_variable(&grant.variable) {
                            DialogError::ReadOnlyVariable {
                                file: origin.to_string(),
                                variable: grant.variable.clone(),
                            }
                        } else {
                            DialogError::UnknownVariable {
                                file: origin.to_string(),
                                variable: grant.variable.clone(),
                            }
                        });
                    }
                }
            }
            DialogNode::GiveAchievements(names) => {
                for name in names {
                    if !config.has_achievement(name) {
                        return Err(DialogError::UnknownAchievement {
                            file: origin.to_string(),
                            achievement: name.clone(),
                        });
                    }
                }
            }
        }
    }
    Ok(())
}

/// Whether the union of the conditions' comparator intervals covers all of
/// `i64`. A fork missing a value would dead-end playback at runtime, so
/// non-coverage without an `else` is rejected statically.
fn covers_all_values(conditions: &[Condition]) -> bool {
    let mut intervals: Vec<(i64, i64)> = Vec::new();
    for condition in conditions {
        let (cmp, operand) = match condition {
            Condition::Else => return true,
            Condition::Cmp(cmp, operand) => (*cmp, *operand),
        };
        use crate::schema::dialog::Comparator::*;
        match cmp {
            Gt => {
                if operand < i64::MAX {
                    intervals.push((operand + 1, i64::MAX));
                }
            }
            Ge => intervals.push((operand, i64::MAX)),
            Lt => {
                if operand > i64::MIN {
                    intervals.push((i64::MIN, operand - 1));
                }
            }
            Le => intervals.push((i64::MIN, operand)),
            Eq => intervals.push((operand, operand)),
            Ne => {
                if operand > i64::MIN {
                    intervals.push((i64::MIN, operand - 1));
                }
                if operand < i64::MAX {
                    intervals.push((operand + 1, i64::MAX));
                }
            }
        }
    }

    intervals.sort_unstable();
    let mut covered_to: Option<i64> = None;
    for (lo, hi) in intervals {
        match covered_to {
            None => {
                if lo > i64::MIN {
                    return false;
                }
                covered_to = Some(hi);
            }
            Some(edge) => {
                if edge == i64::MAX {
                    return true;
                }
                if lo > edge + 1 {
                    return false;
                }
                if hi > edge {
                    covered_to = Some(hi);
                }
            }
        }
    }
    covered_to == Some(i64::MAX)
}

/// Validates the script and resolves every phrase's emotion to its asset
/// path. The returned body is what the compiler writes out and the session
/// plays back.
pub fn resolve(
    script: &DialogScript,
    config: &GamingConfig,
    heroes: &HeroRegistry,
    origin: &str,
) -> Result<Vec<ResolvedNode>, DialogError> {
    validate(script, config, heroes, origin)?;
    resolve_body(&script.body, heroes, origin)
}

fn resolve_body(
    body: &[DialogNode],
    heroes: &HeroRegistry,
    origin: &str,
) -> Result<Vec<ResolvedNode>, DialogError> {
    body.iter()
        .map(|node| {
            Ok(match node {
                DialogNode::Phrase(phrase) => ResolvedNode::Phrase(ResolvedPhrase {
                    hero: phrase.hero.clone(),
                    emotion_file_path: heroes
                        .resolve(Some(&phrase.hero), &phrase.emotion)
                        .map_err(|source| DialogError::Hero {
                            file: origin.to_string(),
                            source,
                        })?,
                    text: phrase.text.clone(),
                    on_time: phrase.on_time,
                }),
                DialogNode::Fork(fork) => {
                    let mut branches = Vec::with_capacity(fork.branches.len());
                    for branch in &fork.branches {
                        branches.push(ForkBranch {
                            condition: branch.condition.clone(),
                            body: resolve_body(&branch.body, heroes, origin)?,
                        });
                    }
                    ResolvedNode::Fork(Fork {
                        variable: fork.variable.clone(),
                        branches,
                    })
                }
                DialogNode::GivePoints(grants) => ResolvedNode::GivePoints(grants.clone()),
                DialogNode::GiveAchievements(names) => {
                    ResolvedNode::GiveAchievements(names.clone())
                }
            })
        })
        .collect()
}
