//! Event to interaction resolution.

use crate::evaluator::{evaluate, evaluate_traced};
use crate::event::EventName;
use crate::facts::FactSnapshot;
use crate::rules::{InteractionDefinition, RuleSet};

/// Resolves an event to at most one interaction.
///
/// Walks the target list for the event's canonical key in stored order and
/// returns the definition of the first target whose criteria match. Returns
/// `None` if the key has no targets, nothing matches, or the matching
/// target names an interaction the rule set does not define.
pub fn resolve<'r>(
    rules: &'r RuleSet,
    event: &EventName,
    facts: &FactSnapshot,
) -> Option<&'r InteractionDefinition> {
    resolve_key(rules, &event.canonical(), facts)
}

/// Like [`resolve`] for an already canonical key.
pub fn resolve_key<'r>(
    rules: &'r RuleSet,
    key: &str,
    facts: &FactSnapshot,
) -> Option<&'r InteractionDefinition> {
    let target = rules
        .targets_for(key)?
        .iter()
        .find(|target| evaluate(&target.criteria, facts))?;
    rules.interaction(&target.interaction_id)
}

/// Outcome of one target during a traced resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetTrace {
    /// Interaction the target points at.
    pub interaction_id: String,
    /// Whether the criteria matched.
    pub matched: bool,
    /// Malformed criteria nodes that were reached.
    pub malformed: Vec<String>,
}

/// Step-by-step account of a resolution, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionTrace {
    /// Canonical key looked up.
    pub key: String,
    /// Targets evaluated, in order, up to and including the first match.
    pub targets: Vec<TargetTrace>,
    /// Interaction selected, if its definition exists.
    pub selected: Option<String>,
}

/// Resolves like [`resolve_key`] and records every evaluated target.
pub fn resolve_traced(rules: &RuleSet, key: &str, facts: &FactSnapshot) -> ResolutionTrace {
    let mut trace = ResolutionTrace {
        key: key.to_string(),
        targets: Vec::new(),
        selected: None,
    };

    for target in rules.targets_for(key).unwrap_or_default() {
        let evaluation = evaluate_traced(&target.criteria, facts);
        trace.targets.push(TargetTrace {
            interaction_id: target.interaction_id.clone(),
            matched: evaluation.matched,
            malformed: evaluation.malformed,
        });
        if evaluation.matched {
            trace.selected = rules
                .interaction(&target.interaction_id)
                .map(|d| d.id.clone());
            break;
        }
    }
    trace
}
