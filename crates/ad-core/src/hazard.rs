//! Hazard kinds, severity levels, and the accumulated hazard set.
//!
//! Hazards are flag sets so a single entry can describe several kinds at
//! once (`Hazard::OBSTACLE` covers pedestrians, cars and static obstacles).
//! The [`HazardSet`] carried by the per-tick context maps each recorded
//! hazard flag to its severity; adding an existing hazard merges severities
//! and nothing is removed except through [`HazardSet::discard`].

use std::collections::BTreeMap;
use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use crate::{CoreError, CoreResult};

// ── Hazard ────────────────────────────────────────────────────────────────────

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Hazard(u16);

impl Hazard {
    pub const NONE: Hazard = Hazard(0);
    pub const TRAFFIC_LIGHT_RED: Hazard = Hazard(1 << 0);
    pub const TRAFFIC_LIGHT_YELLOW: Hazard = Hazard(1 << 1);
    pub const PEDESTRIAN: Hazard = Hazard(1 << 2);
    pub const CAR: Hazard = Hazard(1 << 3);
    pub const STATIC_OBSTACLE: Hazard = Hazard(1 << 4);
    pub const OTHER: Hazard = Hazard(1 << 5);
    pub const JUNCTION: Hazard = Hazard(1 << 6);
    pub const COLLISION: Hazard = Hazard(1 << 7);

    pub const TRAFFIC_LIGHT: Hazard = Hazard::TRAFFIC_LIGHT_RED.union(Hazard::TRAFFIC_LIGHT_YELLOW);
    pub const OBSTACLE: Hazard = Hazard::PEDESTRIAN.union(Hazard::CAR).union(Hazard::STATIC_OBSTACLE);

    const NAMES: [(Hazard, &'static str); 8] = [
        (Hazard::TRAFFIC_LIGHT_RED, "TRAFFIC_LIGHT_RED"),
        (Hazard::TRAFFIC_LIGHT_YELLOW, "TRAFFIC_LIGHT_YELLOW"),
        (Hazard::PEDESTRIAN, "PEDESTRIAN"),
        (Hazard::CAR, "CAR"),
        (Hazard::STATIC_OBSTACLE, "STATIC_OBSTACLE"),
        (Hazard::OTHER, "OTHER"),
        (Hazard::JUNCTION, "JUNCTION"),
        (Hazard::COLLISION, "COLLISION"),
    ];

    #[inline]
    pub const fn union(self, other: Hazard) -> Hazard {
        Hazard(self.0 | other.0)
    }

    #[inline]
    pub const fn contains(self, other: Hazard) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn intersects(self, other: Hazard) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Hazard {
    type Output = Hazard;
    fn bitor(self, rhs: Hazard) -> Hazard {
        self.union(rhs)
    }
}

impl fmt::Display for Hazard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        let parts: Vec<&str> = Hazard::NAMES
            .iter()
            .filter(|(h, _)| self.contains(*h))
            .map(|&(_, n)| n)
            .collect();
        f.write_str(&parts.join("|"))
    }
}

impl fmt::Debug for Hazard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hazard({self})")
    }
}

impl FromStr for Hazard {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Hazard> {
        s.split('|').try_fold(Hazard::NONE, |acc, raw| {
            let name = raw.trim();
            let flag = match name {
                "TRAFFIC_LIGHT" => Hazard::TRAFFIC_LIGHT,
                "OBSTACLE" => Hazard::OBSTACLE,
                _ => Hazard::NAMES
                    .iter()
                    .find(|(_, n)| *n == name)
                    .map(|&(h, _)| h)
                    .ok_or_else(|| CoreError::UnknownHazard(s.to_string()))?,
            };
            Ok(acc | flag)
        })
    }
}

// ── Severity ──────────────────────────────────────────────────────────────────

/// Severity flags.  The cumulative levels include every lower level, so
/// `Severity::EMERGENCY.contains(Severity::WARNING)` holds.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Severity(u8);

impl Severity {
    pub const NONE: Severity = Severity(0);
    pub const WARNING: Severity = Severity(1 << 0);
    pub const CRITICAL_ONLY: Severity = Severity(1 << 1);
    pub const EMERGENCY_ONLY: Severity = Severity(1 << 2);
    pub const COLLISION_ONLY: Severity = Severity(1 << 3);

    pub const CRITICAL: Severity = Severity(Severity::WARNING.0 | Severity::CRITICAL_ONLY.0);
    pub const EMERGENCY: Severity = Severity(Severity::CRITICAL.0 | Severity::EMERGENCY_ONLY.0);
    pub const COLLISION: Severity = Severity(Severity::EMERGENCY.0 | Severity::COLLISION_ONLY.0);

    #[inline]
    pub const fn merge(self, other: Severity) -> Severity {
        Severity(self.0 | other.0)
    }

    #[inline]
    pub const fn contains(self, other: Severity) -> bool {
        self.0 & other.0 == other.0
    }

    /// `true` if this severity demands an emergency reaction.
    #[inline]
    pub const fn is_emergency(self) -> bool {
        self.0 & (Severity::EMERGENCY_ONLY.0 | Severity::COLLISION_ONLY.0) != 0
    }
}

// ── HazardSet ─────────────────────────────────────────────────────────────────

/// How a query flag is compared against recorded hazards.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum MatchMode {
    /// The recorded flag equals the query.
    Exact,
    /// The query is contained in the recorded flag:
    /// `Hazard::CAR` matches a recorded `Hazard::OBSTACLE`.
    Subset,
    /// Query and recorded flag share at least one bit.
    Intersection,
}

impl MatchMode {
    #[inline]
    fn matches(self, recorded: Hazard, query: Hazard) -> bool {
        match self {
            MatchMode::Exact => recorded == query,
            MatchMode::Subset => recorded.contains(query),
            MatchMode::Intersection => recorded.intersects(query),
        }
    }
}

/// Recorded hazards with their severity.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HazardSet {
    entries: BTreeMap<Hazard, Severity>,
}

impl HazardSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `hazard`.  If it is already present the severities are merged.
    pub fn add(&mut self, hazard: Hazard, severity: Severity) {
        let slot = self.entries.entry(hazard).or_default();
        *slot = slot.merge(severity);
    }

    /// Remove every recorded hazard matching `hazard` under `mode`.
    /// Returns the number of entries removed.
    pub fn discard(&mut self, hazard: Hazard, mode: MatchMode) -> usize {
        let before = self.entries.len();
        self.entries.retain(|&h, _| !mode.matches(h, hazard));
        before - self.entries.len()
    }

    pub fn has(&self, hazard: Hazard, mode: MatchMode) -> bool {
        self.entries.keys().any(|&h| mode.matches(h, hazard))
    }

    pub fn severity(&self, hazard: Hazard) -> Option<Severity> {
        self.entries.get(&hazard).copied()
    }

    /// Union of all recorded severities.
    pub fn combined_severity(&self) -> Severity {
        self.entries.values().fold(Severity::NONE, |acc, &s| acc.merge(s))
    }

    /// Union of all recorded hazard flags.
    pub fn kinds(&self) -> Hazard {
        self.entries.keys().fold(Hazard::NONE, |acc, &h| acc | h)
    }

    /// Merge every entry of `other` into `self`.
    pub fn merge(&mut self, other: &HazardSet) {
        for (&h, &s) in &other.entries {
            self.add(h, s);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Hazard, Severity)> + '_ {
        self.entries.iter().map(|(&h, &s)| (h, s))
    }
}

impl fmt::Display for HazardSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (h, s)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{h}:{s:?}")?;
        }
        f.write_str("}")
    }
}

impl FromIterator<(Hazard, Severity)> for HazardSet {
    fn from_iter<I: IntoIterator<Item = (Hazard, Severity)>>(iter: I) -> Self {
        let mut set = HazardSet::new();
        for (h, s) in iter {
            set.add(h, s);
        }
        set
    }
}
