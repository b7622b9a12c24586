/// Dialog playback: a cursor over a flattening node list. Forks are resolved
/// lazily against the live variable value and the chosen branch is spliced
/// in at the cursor, so a branch can itself fork again.

use crate::core::session::{GameSession, SessionError};
use crate::schema::dialog::{Condition, Fork, ResolvedNode, ResolvedPhrase};

#[derive(Debug, Clone)]
pub struct DialogPlayback {
    nodes: Vec<ResolvedNode>,
    cursor: usize,
}

impl DialogPlayback {
    /// A fresh playback over a compiled body. The body itself is never
    /// mutated; every playback works on its own copy.
    pub fn new(body: &[ResolvedNode]) -> Self {
        Self {
            nodes: body.to_vec(),
            cursor: 0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.nodes.len()
    }

    /// Runs side-effect nodes until the next phrase, which is returned, or
    /// the end of the dialog (`None`). Point grants re-enter the session's
    /// bus, so a dialog can trigger further dialogs mid-playback.
    pub fn advance(
        &mut self,
        session: &mut GameSession,
    ) -> Result<Option<ResolvedPhrase>, SessionError> {
        while self.cursor < self.nodes.len() {
            let node = self.nodes[self.cursor].clone();
            self.cursor += 1;
            match node {
                ResolvedNode::Phrase(phrase) => return Ok(Some(phrase)),
                ResolvedNode::GivePoints(grants) => {
                    for grant in &grants {
                        session.add_points(&grant.variable, grant.value)?;
                    }
                }
                ResolvedNode::GiveAchievements(names) => {
                    for name in &names {
                        session.claim_achievement(name)?;
                    }
                }
                ResolvedNode::Fork(fork) => {
                    let value = session
                        .variable_value(&fork.variable)
                        .ok_or_else(|| SessionError::UnknownVariable(fork.variable.clone()))?;
                    let branch = select_branch(&fork, value)?;
                    self.nodes
                        .splice(self.cursor..self.cursor, branch.iter().cloned());
                }
            }
        }
        Ok(None)
    }
}

/// First matching comparator in document order wins; `else` is consulted
/// last wherever it sits.
fn select_branch(fork: &Fork<ResolvedNode>, value: i64) -> Result<&[ResolvedNode], SessionError> {
    let mut fallback = None;
    for branch in &fork.branches {
        match &branch.condition {
            Condition::Else => fallback = Some(branch.body.as_slice()),
            Condition::Cmp(cmp, operand) => {
                if cmp.eval(value, *operand) {
                    return Ok(branch.body.as_slice());
                }
            }
        }
    }
    fallback.ok_or_else(|| SessionError::DeadFork {
        variable: fork.variable.clone(),
    })
}
