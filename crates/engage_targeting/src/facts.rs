//! Fact snapshots and fact paths.

use engage_codec::{Map, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Invocation counters for one event key or one interaction id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationStats {
    /// Invocations ever recorded.
    pub total: u64,
    /// Invocations since the current app version was first seen.
    pub version: u64,
    /// Invocations since the current app build was first seen.
    pub build: u64,
    /// Time of the latest invocation, in milliseconds since the Unix epoch.
    pub last_invoked_at: Option<u64>,
    /// Recent invocation times (milliseconds, oldest first), bounded by the recorder.
    #[serde(default)]
    pub recent: Vec<u64>,
}

impl InvocationStats {
    /// Number of recorded invocations no older than `window_secs` at `now_ms`.
    pub fn invoked_within(&self, now_ms: u64, window_secs: f64) -> u64 {
        if !window_secs.is_finite() || window_secs < 0.0 {
            return 0;
        }
        let window_ms = (window_secs * 1000.0) as u64;
        let cutoff = now_ms.saturating_sub(window_ms);
        self.recent.iter().filter(|&&at| at >= cutoff && at <= now_ms).count() as u64
    }

    /// Seconds elapsed since the latest invocation, if any.
    pub fn seconds_since_last(&self, now_ms: u64) -> Option<f64> {
        self.last_invoked_at
            .map(|at| now_ms.saturating_sub(at) as f64 / 1000.0)
    }
}

/// A parsed fact path such as `code_point/local#app#launch/invokes/total`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FactPath {
    raw: String,
    segments: Vec<String>,
}

impl FactPath {
    /// Parses a path.
    ///
    /// Paths containing `/` are split on `/`; otherwise they are split on `.`.
    /// Event keys routinely contain dots, so rule authors use the slash form
    /// whenever a segment does.
    pub fn parse(raw: &str) -> Self {
        let separator = if raw.contains('/') { '/' } else { '.' };
        Self {
            raw: raw.to_string(),
            segments: raw.split(separator).map(str::to_string).collect(),
        }
    }

    /// The path as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The split segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for FactPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Immutable point-in-time view of everything criteria can reference.
///
/// Build one per resolution call with [`FactSnapshot::builder`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactSnapshot {
    now_ms: u64,
    installed_at_ms: Option<u64>,
    code_points: BTreeMap<String, InvocationStats>,
    interactions: BTreeMap<String, InvocationStats>,
    device: Map,
    person: Map,
    custom_data: Map,
}

impl FactSnapshot {
    /// Starts a snapshot taken at `now_ms`.
    pub fn builder(now_ms: u64) -> FactSnapshotBuilder {
        FactSnapshotBuilder {
            snapshot: FactSnapshot {
                now_ms,
                ..FactSnapshot::default()
            },
        }
    }

    /// Time the snapshot was taken (milliseconds since the Unix epoch).
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Counters for an event key.
    pub fn code_point(&self, key: &str) -> Option<&InvocationStats> {
        self.code_points.get(key)
    }

    /// Counters for an interaction id.
    pub fn interaction(&self, id: &str) -> Option<&InvocationStats> {
        self.interactions.get(id)
    }

    /// Device attributes.
    pub fn device(&self) -> &Map {
        &self.device
    }

    /// Person attributes.
    pub fn person(&self) -> &Map {
        &self.person
    }

    /// App-level custom data.
    pub fn custom_data(&self) -> &Map {
        &self.custom_data
    }

    /// Resolves a fact path to a value.
    ///
    /// Counters of an event that was never recorded read as zero; every other
    /// unknown path resolves to `None`.
    pub fn lookup(&self, path: &FactPath) -> Option<Value> {
        let segments = path.segments();
        let (root, rest) = segments.split_first()?;
        match root.as_str() {
            "code_point" => self.counter_lookup(&self.code_points, rest),
            "interactions" => self.counter_lookup(&self.interactions, rest),
            "time_since_install" => match rest {
                [total] if total == "total" => {
                    let installed = self.installed_at_ms?;
                    Some(Value::Float(
                        self.now_ms.saturating_sub(installed) as f64 / 1000.0,
                    ))
                }
                _ => None,
            },
            "device" => map_lookup(&self.device, rest),
            "person" => map_lookup(&self.person, rest),
            "custom_data" => map_lookup(&self.custom_data, rest),
            _ => None,
        }
    }

    fn counter_lookup(
        &self,
        table: &BTreeMap<String, InvocationStats>,
        rest: &[String],
    ) -> Option<Value> {
        let (key, rest) = rest.split_first()?;
        let empty = InvocationStats::default();
        let stats = table.get(key).unwrap_or(&empty);
        let rest: Vec<&str> = rest.iter().map(String::as_str).collect();
        match rest.as_slice() {
            ["invokes", "total"] => Some(Value::from(stats.total)),
            ["invokes", "version"] => Some(Value::from(stats.version)),
            ["invokes", "build"] => Some(Value::from(stats.build)),
            ["invokes", "within", secs] => {
                let secs: f64 = secs.parse().ok()?;
                Some(Value::from(stats.invoked_within(self.now_ms, secs)))
            }
            ["last_invoked_at", "total"] => stats.seconds_since_last(self.now_ms).map(Value::Float),
            _ => None,
        }
    }
}

fn map_lookup(map: &Map, rest: &[String]) -> Option<Value> {
    let (field, rest) = rest.split_first()?;
    let value = map.get(field)?.get_path(rest)?;
    if value.is_null() {
        None
    } else {
        Some(value.clone())
    }
}

/// Builder for [`FactSnapshot`].
#[derive(Debug, Clone)]
pub struct FactSnapshotBuilder {
    snapshot: FactSnapshot,
}

impl FactSnapshotBuilder {
    /// Sets the install time.
    #[must_use]
    pub fn installed_at(mut self, installed_at_ms: u64) -> Self {
        self.snapshot.installed_at_ms = Some(installed_at_ms);
        self
    }

    /// Adds counters for an event key.
    #[must_use]
    pub fn code_point(mut self, key: impl Into<String>, stats: InvocationStats) -> Self {
        self.snapshot.code_points.insert(key.into(), stats);
        self
    }

    /// Adds a plain total count for an event key.
    #[must_use]
    pub fn invocations(self, key: impl Into<String>, total: u64) -> Self {
        self.code_point(
            key,
            InvocationStats {
                total,
                version: total,
                build: total,
                ..InvocationStats::default()
            },
        )
    }

    /// Replaces all event key counters.
    #[must_use]
    pub fn code_points(mut self, code_points: BTreeMap<String, InvocationStats>) -> Self {
        self.snapshot.code_points = code_points;
        self
    }

    /// Adds counters for an interaction id.
    #[must_use]
    pub fn interaction(mut self, id: impl Into<String>, stats: InvocationStats) -> Self {
        self.snapshot.interactions.insert(id.into(), stats);
        self
    }

    /// Replaces all interaction counters.
    #[must_use]
    pub fn interactions(mut self, interactions: BTreeMap<String, InvocationStats>) -> Self {
        self.snapshot.interactions = interactions;
        self
    }

    /// Sets the device attributes.
    #[must_use]
    pub fn device(mut self, device: Map) -> Self {
        self.snapshot.device = device;
        self
    }

    /// Sets the person attributes.
    #[must_use]
    pub fn person(mut self, person: Map) -> Self {
        self.snapshot.person = person;
        self
    }

    /// Sets app-level custom data.
    #[must_use]
    pub fn custom_data(mut self, custom_data: Map) -> Self {
        self.snapshot.custom_data = custom_data;
        self
    }

    /// Sets one app-level custom data entry.
    #[must_use]
    pub fn custom(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.snapshot.custom_data.insert(key.into(), value.into());
        self
    }

    /// Finishes the snapshot.
    pub fn build(self) -> FactSnapshot {
        self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_separator_selection() {
        assert_eq!(
            FactPath::parse("code_point/local#app#com.acme/invokes/total").segments(),
            ["code_point", "local#app#com.acme", "invokes", "total"]
        );
        assert_eq!(
            FactPath::parse("person.custom_data.tier").segments(),
            ["person", "custom_data", "tier"]
        );
    }

    #[test]
    fn unseen_code_point_counts_zero() {
        let facts = FactSnapshot::builder(1_000).build();
        let path = FactPath::parse("code_point/local#app#launch/invokes/total");
        assert_eq!(facts.lookup(&path), Some(Value::Integer(0)));

        let since = FactPath::parse("code_point/local#app#launch/last_invoked_at/total");
        assert_eq!(facts.lookup(&since), None);
    }

    #[test]
    fn counters_and_windows() {
        let stats = InvocationStats {
            total: 5,
            version: 2,
            build: 1,
            last_invoked_at: Some(95_000),
            recent: vec![10_000, 50_000, 80_000, 95_000],
        };
        let facts = FactSnapshot::builder(100_000)
            .installed_at(40_000)
            .code_point("a#b", stats)
            .build();

        let get = |p: &str| facts.lookup(&FactPath::parse(p));
        assert_eq!(get("code_point/a#b/invokes/version"), Some(Value::Integer(2)));
        assert_eq!(get("code_point/a#b/invokes/within/30"), Some(Value::Integer(2)));
        assert_eq!(get("code_point/a#b/invokes/within/x"), None);
        assert_eq!(get("code_point/a#b/last_invoked_at/total"), Some(Value::Float(5.0)));
        assert_eq!(get("time_since_install/total"), Some(Value::Float(60.0)));
        assert_eq!(get("code_point/a#b/unknown"), None);
    }

    #[test]
    fn attribute_maps() {
        let person = Map::from([
            ("name".to_string(), Value::from("Alice")),
            ("email".to_string(), Value::Null),
            (
                "custom_data".to_string(),
                Value::map_from([("tier", Value::from("gold"))]),
            ),
        ]);
        let facts = FactSnapshot::builder(0)
            .person(person)
            .custom("beta", true)
            .build();

        let get = |p: &str| facts.lookup(&FactPath::parse(p));
        assert_eq!(get("person.name"), Some(Value::from("Alice")));
        assert_eq!(get("person.email"), None);
        assert_eq!(get("person/custom_data/tier"), Some(Value::from("gold")));
        assert_eq!(get("custom_data.beta"), Some(Value::Bool(true)));
        assert_eq!(get("device.os"), None);
        assert_eq!(get("nothing"), None);
    }
}
