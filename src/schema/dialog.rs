/// Dialog node trees: the authored form (emotion names) and the compiled
/// form (emotion asset paths), plus the fork condition grammar.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("'{0}' is not a valid branch condition")]
    Malformed(String),
    #[error("'{0}' is not a valid comparison operand")]
    BadOperand(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl Comparator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }

    pub fn parse(sign: &str) -> Option<Comparator> {
        match sign {
            ">" => Some(Self::Gt),
            "<" => Some(Self::Lt),
            ">=" => Some(Self::Ge),
            "<=" => Some(Self::Le),
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            _ => None,
        }
    }

    pub fn eval(&self, lhs: i64, rhs: i64) -> bool {
        match self {
            Self::Gt => lhs > rhs,
            Self::Lt => lhs < rhs,
            Self::Ge => lhs >= rhs,
            Self::Le => lhs <= rhs,
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
        }
    }
}

/// A fork branch condition: a comparison against the fork variable, or the
/// `else` fallback. `else` always matches and is consulted last regardless of
/// where it sits in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Else,
    Cmp(Comparator, i64),
}

impl Condition {
    /// Parses a branch key: `"else"`, or `"{sign} {integer}"`.
    pub fn parse(input: &str) -> Result<Condition, ConditionError> {
        let mut tokens = input.split_whitespace();
        let sign = tokens
            .next()
            .ok_or_else(|| ConditionError::Malformed(input.to_string()))?;

        if sign == "else" {
            return match tokens.next() {
                None => Ok(Condition::Else),
                Some(_) => Err(ConditionError::Malformed(input.to_string())),
            };
        }

        let cmp = Comparator::parse(sign)
            .ok_or_else(|| ConditionError::Malformed(input.to_string()))?;
        let operand = tokens
            .next()
            .ok_or_else(|| ConditionError::Malformed(input.to_string()))?;
        if tokens.next().is_some() {
            return Err(ConditionError::Malformed(input.to_string()));
        }
        let operand: i64 = operand
            .parse()
            .map_err(|_| ConditionError::BadOperand(operand.to_string()))?;
        Ok(Condition::Cmp(cmp, operand))
    }

    pub fn matches(&self, value: i64) -> bool {
        match self {
            Self::Else => true,
            Self::Cmp(cmp, operand) => cmp.eval(value, *operand),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Else => f.write_str("else"),
            Self::Cmp(cmp, operand) => write!(f, "{} {}", cmp.as_str(), operand),
        }
    }
}

/// An authored phrase, before emotion resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phrase {
    pub hero: String,
    pub emotion: String,
    pub text: String,
    #[serde(rename = "onTime", default, skip_serializing_if = "Option::is_none")]
    pub on_time: Option<f64>,
}

/// One `givePoints` entry: a delta applied to a declared variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointGrant {
    pub variable: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForkBranch<N> {
    pub condition: Condition,
    pub body: Vec<N>,
}

/// A branching point over a variable's live value. Branch order is document
/// order; the first matching comparator wins.
#[derive(Debug, Clone, PartialEq)]
pub struct Fork<N> {
    pub variable: String,
    pub branches: Vec<ForkBranch<N>>,
}

/// A parsed dialog body node, emotions not yet resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum DialogNode {
    Phrase(Phrase),
    Fork(Fork<DialogNode>),
    GivePoints(Vec<PointGrant>),
    GiveAchievements(Vec<String>),
}

/// A parsed dialog script: the trigger event string plus the body.
#[derive(Debug, Clone, PartialEq)]
pub struct DialogScript {
    pub event: String,
    pub body: Vec<DialogNode>,
}

/// A phrase with its emotion resolved to an asset path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPhrase {
    pub hero: String,
    #[serde(rename = "emotionFilePath")]
    pub emotion_file_path: String,
    pub text: String,
    #[serde(rename = "onTime", default, skip_serializing_if = "Option::is_none")]
    pub on_time: Option<f64>,
}

/// A compiled dialog body node, ready to serve to a client.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedNode {
    Phrase(ResolvedPhrase),
    Fork(Fork<ResolvedNode>),
    GivePoints(Vec<PointGrant>),
    GiveAchievements(Vec<String>),
}

impl ResolvedNode {
    pub fn to_value(&self) -> Value {
        match self {
            Self::Phrase(phrase) => {
                let mut obj = Map::new();
                obj.insert("hero".to_string(), Value::String(phrase.hero.clone()));
                obj.insert(
                    "emotionFilePath".to_string(),
                    Value::String(phrase.emotion_file_path.clone()),
                );
                obj.insert("text".to_string(), Value::String(phrase.text.clone()));
                if let Some(on_time) = phrase.on_time {
                    obj.insert("onTime".to_string(), json!(on_time));
                }
                Value::Object(obj)
            }
            Self::Fork(fork) => {
                let mut on = Map::new();
                for branch in &fork.branches {
                    let body: Vec<Value> = branch.body.iter().map(|n| n.to_value()).collect();
                    on.insert(branch.condition.to_string(), Value::Array(body));
                }
                json!({
                    "type": "fork",
                    "condition": { "variable": fork.variable, "on": on },
                })
            }
            Self::GivePoints(grants) => {
                let grants: Vec<Value> = grants
                    .iter()
                    .map(|g| json!({ "variable": g.variable, "value": g.value }))
                    .collect();
                json!({ "givePoints": grants })
            }
            Self::GiveAchievements(names) => json!({ "giveAchievements": names }),
        }
    }
}

impl Serialize for ResolvedNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// The response document served for one compiled dialog.
pub fn response_document(body: &[ResolvedNode]) -> Value {
    let nodes: Vec<Value> = body.iter().map(|n| n.to_value()).collect();
    json!({ "dialog": nodes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_parse() {
        assert_eq!(Condition::parse("else").unwrap(), Condition::Else);
        assert_eq!(
            Condition::parse("> 10").unwrap(),
            Condition::Cmp(Comparator::Gt, 10)
        );
        assert_eq!(
            Condition::parse("  <=   -3 ").unwrap(),
            Condition::Cmp(Comparator::Le, -3)
        );
        assert_eq!(
            Condition::parse("!= 0").unwrap(),
            Condition::Cmp(Comparator::Ne, 0)
        );
    }

    #[test]
    fn condition_parse_rejects_garbage() {
        assert!(Condition::parse("").is_err());
        assert!(Condition::parse(">=").is_err());
        assert!(Condition::parse("> ten").is_err());
        assert!(Condition::parse("else 5").is_err());
        assert!(Condition::parse("~ 5").is_err());
        assert!(Condition::parse("> 5 6").is_err());
    }

    #[test]
    fn condition_display_round_trip() {
        for raw in ["else", "> 10", "< -1", ">= 0", "<= 7", "== 3", "!= 3"] {
            assert_eq!(Condition::parse(raw).unwrap().to_string(), raw);
        }
    }

    #[test]
    fn comparator_eval() {
        assert!(Comparator::Gt.eval(6, 5));
        assert!(!Comparator::Gt.eval(5, 5));
        assert!(Comparator::Ge.eval(5, 5));
        assert!(Comparator::Lt.eval(4, 5));
        assert!(Comparator::Le.eval(5, 5));
        assert!(Comparator::Eq.eval(5, 5));
        assert!(Comparator::Ne.eval(4, 5));
    }

    #[test]
    fn else_matches_everything() {
        for value in [i64::MIN, -1, 0, 1, i64::MAX] {
            assert!(Condition::Else.matches(value));
        }
    }

    #[test]
    fn resolved_phrase_wire_shape() {
        let node = ResolvedNode::Phrase(ResolvedPhrase {
            hero: "robo".to_string(),
            emotion_file_path: "/hero/robo/happy.png".to_string(),
            text: "Hi!".to_string(),
            on_time: None,
        });
        assert_eq!(
            node.to_value(),
            json!({
                "hero": "robo",
                "emotionFilePath": "/hero/robo/happy.png",
                "text": "Hi!",
            })
        );
    }

    #[test]
    fn resolved_fork_wire_shape_keeps_branch_order() {
        let node = ResolvedNode::Fork(Fork {
            variable: "score".to_string(),
            branches: vec![
                ForkBranch {
                    condition: Condition::Cmp(Comparator::Gt, 10),
                    body: vec![ResolvedNode::GiveAchievements(vec!["ace".to_string()])],
                },
                ForkBranch {
                    condition: Condition::Else,
                    body: vec![],
                },
            ],
        });
        let value = node.to_value();
        assert_eq!(value["type"], "fork");
        assert_eq!(value["condition"]["variable"], "score");
        let on = value["condition"]["on"].as_object().unwrap();
        let keys: Vec<&str> = on.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, ["> 10", "else"]);
        assert_eq!(on["> 10"], json!([{ "giveAchievements": ["ace"] }]));
    }

    #[test]
    fn response_document_shape() {
        let body = vec![ResolvedNode::GivePoints(vec![PointGrant {
            variable: "score".to_string(),
            value: 5,
        }])];
        assert_eq!(
            response_document(&body),
            json!({ "dialog": [{ "givePoints": [{ "variable": "score", "value": 5 }] }] })
        );
    }
}
