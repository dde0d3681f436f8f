//! Resolution properties over generated rule sets.

use engage_codec::Value;
use engage_targeting::{
    resolve_key, Criterion, FactSnapshot, InteractionDefinition, InteractionKind, Operator,
    RuleSet, TargetRule,
};
use proptest::prelude::*;
use std::collections::BTreeMap;

const KEY: &str = "local#app#launch";
const COUNT_PATH: &str = "code_point/local#app#launch/invokes/total";

fn rule_set(thresholds: &[i64]) -> RuleSet {
    let definitions = (0..thresholds.len()).map(|i| InteractionDefinition {
        id: format!("i{i}"),
        kind: InteractionKind::TextModal,
        configuration: Value::from(i as i64),
    });
    let targets = thresholds
        .iter()
        .enumerate()
        .map(|(i, &threshold)| TargetRule {
            interaction_id: format!("i{i}"),
            criteria: Criterion::compare(COUNT_PATH, Operator::Gte, threshold),
        })
        .collect();
    RuleSet::new(definitions, BTreeMap::from([(KEY.to_string(), targets)]))
}

proptest! {
    #[test]
    fn nothing_matches_resolves_to_none(
        thresholds in prop::collection::vec(11i64..100, 0..8),
        count in 0u64..=10,
    ) {
        let rules = rule_set(&thresholds);
        let facts = FactSnapshot::builder(0).invocations(KEY, count).build();
        prop_assert!(resolve_key(&rules, KEY, &facts).is_none());
    }

    #[test]
    fn first_matching_target_wins(
        thresholds in prop::collection::vec(0i64..20, 1..8),
        count in 0u64..20,
    ) {
        let rules = rule_set(&thresholds);
        let facts = FactSnapshot::builder(0).invocations(KEY, count).build();

        let expected = thresholds
            .iter()
            .position(|&t| count as i64 >= t)
            .map(|i| format!("i{i}"));
        let actual = resolve_key(&rules, KEY, &facts).map(|d| d.id.clone());
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn resolution_is_deterministic(
        thresholds in prop::collection::vec(0i64..20, 0..8),
        count in 0u64..20,
    ) {
        let rules = rule_set(&thresholds);
        let facts = FactSnapshot::builder(0).invocations(KEY, count).build();
        let first = resolve_key(&rules, KEY, &facts).map(|d| d.id.clone());
        let second = resolve_key(&rules, KEY, &facts).map(|d| d.id.clone());
        prop_assert_eq!(first, second);
    }
}
