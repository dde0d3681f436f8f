//! Rule sets: interaction definitions plus per-event target lists.

use crate::criteria::Criterion;
use crate::error::{RuleParseError, RuleParseResult};
use engage_codec::{from_json_value, Value};
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// Kind of a displayable interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InteractionKind {
    /// Upgrade / release notes message.
    UpgradeMessage,
    /// "Do you love this app?" prompt.
    EnjoymentDialog,
    /// Rating prompt.
    RatingDialog,
    /// Opens the store listing.
    AppStoreRating,
    /// Survey.
    Survey,
    /// Message center.
    MessageCenter,
    /// Generic modal with buttons.
    TextModal,
    /// Opens a URL.
    NavigateToLink,
}

impl InteractionKind {
    /// Parses the wire type tag. Unknown tags yield `None`.
    pub fn from_wire(tag: &str) -> Option<Self> {
        Some(match tag {
            "UpgradeMessage" => Self::UpgradeMessage,
            "EnjoymentDialog" => Self::EnjoymentDialog,
            "RatingDialog" => Self::RatingDialog,
            "AppStoreRating" => Self::AppStoreRating,
            "Survey" => Self::Survey,
            "MessageCenter" => Self::MessageCenter,
            "TextModal" => Self::TextModal,
            "NavigateToLink" => Self::NavigateToLink,
            _ => return None,
        })
    }

    /// The wire type tag.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::UpgradeMessage => "UpgradeMessage",
            Self::EnjoymentDialog => "EnjoymentDialog",
            Self::RatingDialog => "RatingDialog",
            Self::AppStoreRating => "AppStoreRating",
            Self::Survey => "Survey",
            Self::MessageCenter => "MessageCenter",
            Self::TextModal => "TextModal",
            Self::NavigateToLink => "NavigateToLink",
        }
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// A displayable interaction.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionDefinition {
    /// Server-assigned id.
    pub id: String,
    /// Type tag.
    pub kind: InteractionKind,
    /// Opaque configuration handed to the presentation layer.
    pub configuration: Value,
}

/// One entry of a target list.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRule {
    /// Interaction shown when `criteria` match.
    pub interaction_id: String,
    /// Gate for this rule.
    pub criteria: Criterion,
}

/// A complete, parsed rule payload.
///
/// Target lists keep their wire order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    interactions: BTreeMap<String, InteractionDefinition>,
    targets: BTreeMap<String, Vec<TargetRule>>,
}

/// Fragments dropped while parsing a payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseReport {
    /// Interaction entries skipped (missing fields or unknown type).
    pub skipped_interactions: usize,
    /// Target entries skipped.
    pub skipped_targets: usize,
    /// Criteria nodes that will never match.
    pub malformed_criteria: usize,
}

impl ParseReport {
    /// True if nothing was dropped.
    pub fn is_clean(&self) -> bool {
        self.skipped_interactions == 0 && self.skipped_targets == 0 && self.malformed_criteria == 0
    }
}

impl RuleSet {
    /// An empty rule set (nothing ever resolves).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a rule set directly.
    pub fn new(
        interactions: impl IntoIterator<Item = InteractionDefinition>,
        targets: BTreeMap<String, Vec<TargetRule>>,
    ) -> Self {
        Self {
            interactions: interactions.into_iter().map(|d| (d.id.clone(), d)).collect(),
            targets,
        }
    }

    /// Parses a wire payload.
    ///
    /// # Errors
    ///
    /// Fails if the bytes are not JSON, or if `interactions` (array) or
    /// `targets` (object) is missing. Individual bad entries are dropped.
    pub fn from_json(bytes: &[u8]) -> RuleParseResult<Self> {
        Self::from_json_with_report(bytes).map(|(rules, _)| rules)
    }

    /// Like [`RuleSet::from_json`], also returning what was dropped.
    ///
    /// # Errors
    ///
    /// See [`RuleSet::from_json`].
    pub fn from_json_with_report(bytes: &[u8]) -> RuleParseResult<(Self, ParseReport)> {
        let root: Json = serde_json::from_slice(bytes)
            .map_err(|e| RuleParseError::invalid_json(e.to_string()))?;

        let Some(interactions) = root.get("interactions").and_then(Json::as_array) else {
            return Err(RuleParseError::MissingSection {
                section: "interactions",
            });
        };
        let Some(targets) = root.get("targets").and_then(Json::as_object) else {
            return Err(RuleParseError::MissingSection { section: "targets" });
        };

        let mut report = ParseReport::default();
        let mut rules = RuleSet::default();

        for entry in interactions {
            match parse_interaction(entry) {
                Ok(definition) => {
                    rules.interactions.insert(definition.id.clone(), definition);
                }
                Err(reason) => {
                    warn!(reason = %reason, "discarding interaction definition");
                    report.skipped_interactions += 1;
                }
            }
        }

        for (key, list) in targets {
            let Some(list) = list.as_array() else {
                warn!(key = %key, "discarding target list: not an array");
                report.skipped_targets += 1;
                continue;
            };
            let mut parsed = Vec::with_capacity(list.len());
            for entry in list {
                match parse_target(entry) {
                    Ok(rule) => {
                        let bad = rule.criteria.malformed_reasons();
                        if !bad.is_empty() {
                            warn!(
                                key = %key,
                                interaction = %rule.interaction_id,
                                reasons = ?bad,
                                "target criteria contain malformed nodes"
                            );
                            report.malformed_criteria += bad.len();
                        }
                        parsed.push(rule);
                    }
                    Err(reason) => {
                        warn!(key = %key, reason = %reason, "discarding target");
                        report.skipped_targets += 1;
                    }
                }
            }
            rules.targets.insert(key.clone(), parsed);
        }

        debug!(
            interactions = rules.interactions.len(),
            targets = rules.targets.len(),
            "parsed rule set"
        );
        Ok((rules, report))
    }

    /// Looks up an interaction by id.
    pub fn interaction(&self, id: &str) -> Option<&InteractionDefinition> {
        self.interactions.get(id)
    }

    /// The ordered target list for an event key.
    pub fn targets_for(&self, key: &str) -> Option<&[TargetRule]> {
        self.targets.get(key).map(Vec::as_slice)
    }

    /// All interaction definitions, by id.
    pub fn interactions(&self) -> impl Iterator<Item = &InteractionDefinition> {
        self.interactions.values()
    }

    /// All event keys that have targets.
    pub fn target_keys(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    /// Number of interaction definitions.
    pub fn interaction_count(&self) -> usize {
        self.interactions.len()
    }

    /// Number of event keys with targets.
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// True if there is nothing to resolve.
    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty() && self.targets.is_empty()
    }
}

fn parse_interaction(entry: &Json) -> Result<InteractionDefinition, String> {
    let id = entry
        .get("id")
        .and_then(Json::as_str)
        .ok_or_else(|| "missing id".to_string())?;
    let tag = entry
        .get("type")
        .and_then(Json::as_str)
        .ok_or_else(|| format!("{id}: missing type"))?;
    let kind =
        InteractionKind::from_wire(tag).ok_or_else(|| format!("{id}: unknown type {tag}"))?;
    let configuration = entry
        .get("configuration")
        .cloned()
        .map(from_json_value)
        .unwrap_or_default();
    Ok(InteractionDefinition {
        id: id.to_string(),
        kind,
        configuration,
    })
}

fn parse_target(entry: &Json) -> Result<TargetRule, String> {
    let interaction_id = entry
        .get("interaction_id")
        .and_then(Json::as_str)
        .ok_or_else(|| "missing interaction_id".to_string())?;
    let criteria = match entry.get("criteria") {
        Some(json) => Criterion::from_json(json),
        None => Criterion::always(),
    };
    Ok(TargetRule {
        interaction_id: interaction_id.to_string(),
        criteria,
    })
}
