//! Time-of-day activation gate.
//!
//! Automatic activation is only permitted during a configured set of UTC
//! hours. [`decide`] is a pure function of the clock reading and the policy;
//! it never touches the network.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// First hour (inclusive) of the default daytime window.
pub const DEFAULT_WINDOW_START: u8 = 8;
/// Last hour (inclusive) of the default daytime window.
pub const DEFAULT_WINDOW_END: u8 = 22;

/// Set of UTC hours-of-day during which automatic activation is allowed.
///
/// Serialized as a plain hour array. Deserialization goes through
/// [`TimeWindowPolicy::from_hours`], so an empty or out-of-range list is
/// rejected rather than producing a window that never opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct TimeWindowPolicy {
    allowed_hours: BTreeSet<u8>,
}

impl Default for TimeWindowPolicy {
    fn default() -> Self {
        Self {
            allowed_hours: (DEFAULT_WINDOW_START..=DEFAULT_WINDOW_END).collect(),
        }
    }
}

impl TimeWindowPolicy {
    /// Build a policy from explicit hours. Returns `None` if the list is
    /// empty or contains an hour outside `0..=23`.
    pub fn from_hours<I>(hours: I) -> Option<Self>
    where
        I: IntoIterator<Item = u8>,
    {
        let allowed_hours: BTreeSet<u8> = hours.into_iter().collect();
        if allowed_hours.is_empty() || allowed_hours.iter().any(|h| *h > 23) {
            return None;
        }
        Some(Self { allowed_hours })
    }

    /// Parse a JSON array of hours (e.g. `[8, 9, 10]`).
    ///
    /// Absent input yields the default window silently. Malformed input
    /// (not an array, non-integer or out-of-range elements, empty array)
    /// yields the default window and logs the fallback.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Self::default();
        };

        match Self::parse_strict(raw) {
            Ok(policy) => policy,
            Err(reason) => {
                let fallback = Self::default();
                warn!(
                    input = %raw,
                    reason = %reason,
                    fallback = %fallback,
                    "Invalid allowed-hours policy, using default window"
                );
                fallback
            }
        }
    }

    fn parse_strict(raw: &str) -> Result<Self, String> {
        let values: Vec<serde_json::Value> =
            serde_json::from_str(raw).map_err(|e| format!("not a JSON array: {e}"))?;

        let hours = values
            .iter()
            .map(|v| {
                v.as_u64()
                    .filter(|h| *h <= 23)
                    .map(|h| h as u8)
                    .ok_or_else(|| format!("{v} is not an hour in 0..=23"))
            })
            .collect::<Result<Vec<u8>, String>>()?;

        Self::from_hours(hours).ok_or_else(|| "hour list is empty".to_string())
    }

    pub fn allows_hour(&self, hour: u32) -> bool {
        u8::try_from(hour).is_ok_and(|h| self.allowed_hours.contains(&h))
    }

    pub fn allowed_hours(&self) -> impl Iterator<Item = u8> + '_ {
        self.allowed_hours.iter().copied()
    }
}

impl TryFrom<Vec<u8>> for TimeWindowPolicy {
    type Error = String;

    fn try_from(hours: Vec<u8>) -> Result<Self, Self::Error> {
        Self::from_hours(hours)
            .ok_or_else(|| "allowed hours must be a non-empty list of hours in 0..=23".to_string())
    }
}

impl From<TimeWindowPolicy> for Vec<u8> {
    fn from(policy: TimeWindowPolicy) -> Self {
        policy.allowed_hours.into_iter().collect()
    }
}

impl fmt::Display for TimeWindowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours: Vec<String> = self.allowed_hours.iter().map(u8::to_string).collect();
        write!(f, "[{}]", hours.join(","))
    }
}

/// Result of evaluating the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateDecision {
    pub allow: bool,
    pub reason: String,
}

/// Decide whether automatic activation is permitted at `now`.
pub fn decide(now: DateTime<Utc>, policy: &TimeWindowPolicy) -> GateDecision {
    let hour = now.hour();
    if policy.allows_hour(hour) {
        GateDecision {
            allow: true,
            reason: format!("hour {hour:02} UTC is inside allowed window {policy}"),
        }
    } else {
        GateDecision {
            allow: false,
            reason: format!("hour {hour:02} UTC is outside allowed window {policy}"),
        }
    }
}
