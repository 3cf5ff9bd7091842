//! Pipeline phase bit-flags and the transition function.
//!
//! A concrete phase is one *stage* flag combined with exactly one of
//! [`Phase::BEGIN`] / [`Phase::END`].  The normal cycle of stages is
//!
//! ```text
//! UPDATE_INFORMATION → PLAN_PATH → DETECT_TRAFFIC_LIGHTS → DETECT_PEDESTRIANS
//!   → DETECT_CARS → TAKE_NORMAL_STEP → RSS_EVALUATION → EXECUTION → (repeat)
//! ```
//!
//! Exception stages (hazard reaction, car detected, junction turn, done)
//! end in `RSS_EVALUATION|BEGIN`, skipping whatever normal stages remain.
//! Alias groups such as [`Phase::EXCEPTIONS`] are unions of stage flags used
//! for membership tests only; they are never a valid current phase.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::str::FromStr;

use crate::{CoreError, CoreResult};

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct Phase(u32);

impl Phase {
    pub const NONE: Phase = Phase(0);
    pub const BEGIN: Phase = Phase(1 << 0);
    pub const END: Phase = Phase(1 << 1);

    pub const UPDATE_INFORMATION: Phase = Phase(1 << 2);
    pub const PLAN_PATH: Phase = Phase(1 << 3);
    pub const DETECT_TRAFFIC_LIGHTS: Phase = Phase(1 << 4);
    pub const DETECT_PEDESTRIANS: Phase = Phase(1 << 5);
    pub const DETECT_CARS: Phase = Phase(1 << 6);
    pub const TAKE_NORMAL_STEP: Phase = Phase(1 << 7);
    pub const RSS_EVALUATION: Phase = Phase(1 << 8);
    pub const EXECUTION: Phase = Phase(1 << 9);

    pub const CAR_DETECTED: Phase = Phase(1 << 10);
    pub const TURNING_AT_JUNCTION: Phase = Phase(1 << 11);
    pub const HAZARD: Phase = Phase(1 << 12);
    pub const EMERGENCY: Phase = Phase(1 << 13);
    pub const COLLISION: Phase = Phase(1 << 14);
    pub const DONE: Phase = Phase(1 << 15);
    pub const TERMINATING: Phase = Phase(1 << 16);
    pub const CUSTOM_CYCLE: Phase = Phase(1 << 17);

    // ── Alias groups ──────────────────────────────────────────────────────

    pub const DETECT_NON_CARS: Phase = Phase::DETECT_TRAFFIC_LIGHTS.union(Phase::DETECT_PEDESTRIANS);
    pub const DETECTION_PHASE: Phase = Phase::DETECT_NON_CARS.union(Phase::DETECT_CARS);
    pub const EXCEPTIONS: Phase = Phase::HAZARD
        .union(Phase::EMERGENCY)
        .union(Phase::COLLISION)
        .union(Phase::TURNING_AT_JUNCTION)
        .union(Phase::CAR_DETECTED)
        .union(Phase::DONE)
        .union(Phase::TERMINATING);
    pub const USER_CONTROLLED: Phase = Phase::EXECUTION
        .union(Phase::TERMINATING)
        .union(Phase::CUSTOM_CYCLE);
    pub const NORMAL_LOOP: Phase = Phase::UPDATE_INFORMATION
        .union(Phase::PLAN_PATH)
        .union(Phase::DETECTION_PHASE)
        .union(Phase::TAKE_NORMAL_STEP);
    pub const IN_LOOP: Phase = Phase::NORMAL_LOOP.union(Phase::EMERGENCY).union(Phase::COLLISION);

    const HALVES: Phase = Phase::BEGIN.union(Phase::END);

    /// The fixed order of normal stages.
    pub const CYCLE: [Phase; 8] = [
        Phase::UPDATE_INFORMATION,
        Phase::PLAN_PATH,
        Phase::DETECT_TRAFFIC_LIGHTS,
        Phase::DETECT_PEDESTRIANS,
        Phase::DETECT_CARS,
        Phase::TAKE_NORMAL_STEP,
        Phase::RSS_EVALUATION,
        Phase::EXECUTION,
    ];

    const NAMES: [(Phase, &'static str); 20] = [
        (Phase::BEGIN, "BEGIN"),
        (Phase::END, "END"),
        (Phase::UPDATE_INFORMATION, "UPDATE_INFORMATION"),
        (Phase::PLAN_PATH, "PLAN_PATH"),
        (Phase::DETECT_TRAFFIC_LIGHTS, "DETECT_TRAFFIC_LIGHTS"),
        (Phase::DETECT_PEDESTRIANS, "DETECT_PEDESTRIANS"),
        (Phase::DETECT_CARS, "DETECT_CARS"),
        (Phase::TAKE_NORMAL_STEP, "TAKE_NORMAL_STEP"),
        (Phase::RSS_EVALUATION, "RSS_EVALUATION"),
        (Phase::EXECUTION, "EXECUTION"),
        (Phase::CAR_DETECTED, "CAR_DETECTED"),
        (Phase::TURNING_AT_JUNCTION, "TURNING_AT_JUNCTION"),
        (Phase::HAZARD, "HAZARD"),
        (Phase::EMERGENCY, "EMERGENCY"),
        (Phase::COLLISION, "COLLISION"),
        (Phase::DONE, "DONE"),
        (Phase::TERMINATING, "TERMINATING"),
        (Phase::CUSTOM_CYCLE, "CUSTOM_CYCLE"),
        (Phase::NONE, "NONE"),
        // Alias accepted by the parser only.
        (Phase::EXCEPTIONS, "EXCEPTIONS"),
    ];

    // ── Bit helpers ───────────────────────────────────────────────────────

    #[inline]
    pub const fn union(self, other: Phase) -> Phase {
        Phase(self.0 | other.0)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// `true` if every bit of `other` is set in `self`.
    #[inline]
    pub const fn contains(self, other: Phase) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn intersects(self, other: Phase) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub const fn is_begin(self) -> bool {
        self.0 & Phase::BEGIN.0 != 0
    }

    #[inline]
    pub const fn is_end(self) -> bool {
        self.0 & Phase::END.0 != 0
    }

    /// The stage part with BEGIN/END stripped.
    #[inline]
    pub const fn stage(self) -> Phase {
        Phase(self.0 & !Phase::HALVES.0)
    }

    /// `true` for exactly one stage flag plus exactly one of BEGIN/END.
    pub const fn is_concrete(self) -> bool {
        self.stage().0.count_ones() == 1 && (self.is_begin() != self.is_end())
    }

    /// `stage | BEGIN`
    #[inline]
    pub const fn begin(stage: Phase) -> Phase {
        stage.union(Phase::BEGIN)
    }

    /// `stage | END`
    #[inline]
    pub const fn end(stage: Phase) -> Phase {
        stage.union(Phase::END)
    }

    // ── Transitions ───────────────────────────────────────────────────────

    /// The phase that normally follows `self`.
    ///
    /// Returns [`CoreError::NoTransition`] for alias groups, combinations of
    /// several stages, and values missing a BEGIN/END half.
    pub fn next_phase(self) -> CoreResult<Phase> {
        if self == Phase::NONE {
            return Ok(Phase::begin(Phase::UPDATE_INFORMATION));
        }
        if !self.is_concrete() {
            return Err(CoreError::NoTransition(self));
        }
        let stage = self.stage();
        if self.is_begin() {
            return Ok(Phase::end(stage));
        }
        if stage == Phase::TERMINATING {
            return Ok(Phase::NONE);
        }
        if Phase::EXCEPTIONS.contains(stage) {
            return Ok(Phase::begin(Phase::RSS_EVALUATION));
        }
        if stage == Phase::CUSTOM_CYCLE {
            return Ok(Phase::begin(Phase::UPDATE_INFORMATION));
        }
        match Phase::CYCLE.iter().position(|&s| s == stage) {
            Some(i) => Ok(Phase::begin(Phase::CYCLE[(i + 1) % Phase::CYCLE.len()])),
            None => Err(CoreError::NoTransition(self)),
        }
    }

    /// Strict validation: `requested` must be the computed successor of
    /// `self`, or belong to an exception or user-controlled stage.
    pub fn check_transition(self, requested: Phase) -> CoreResult<()> {
        let expected = self.next_phase()?;
        if requested == expected {
            return Ok(());
        }
        if requested.is_concrete()
            && requested.stage().intersects(Phase::EXCEPTIONS.union(Phase::USER_CONTROLLED))
        {
            return Ok(());
        }
        Err(CoreError::PhaseViolation { current: self, requested, expected })
    }

    // ── Enumeration ───────────────────────────────────────────────────────

    /// The stages visited by an uninterrupted tick, in order.
    pub fn main_stages() -> &'static [Phase] {
        &Phase::CYCLE
    }

    /// Stages that divert a tick away from the normal cycle.
    pub fn exception_stages() -> [Phase; 7] {
        [
            Phase::HAZARD,
            Phase::EMERGENCY,
            Phase::COLLISION,
            Phase::TURNING_AT_JUNCTION,
            Phase::CAR_DETECTED,
            Phase::DONE,
            Phase::TERMINATING,
        ]
    }

    /// Every stage flag.
    pub fn stages() -> impl Iterator<Item = Phase> {
        Phase::NAMES
            .iter()
            .map(|&(p, _)| p)
            .filter(|p| p.0.count_ones() == 1 && !p.intersects(Phase::HALVES))
    }

    /// Every concrete phase: each stage paired with BEGIN and with END.
    pub fn all_phases() -> impl Iterator<Item = Phase> {
        Phase::stages().flat_map(|s| [Phase::begin(s), Phase::end(s)])
    }
}

impl BitOr for Phase {
    type Output = Phase;
    #[inline]
    fn bitor(self, rhs: Phase) -> Phase {
        self.union(rhs)
    }
}

impl BitOrAssign for Phase {
    #[inline]
    fn bitor_assign(&mut self, rhs: Phase) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Phase {
    type Output = Phase;
    #[inline]
    fn bitand(self, rhs: Phase) -> Phase {
        Phase(self.0 & rhs.0)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("NONE");
        }
        // Stage names first, then the half, matching how phases are written in rule files.
        let mut parts: Vec<&str> = Phase::NAMES
            .iter()
            .filter(|(p, _)| p.0.count_ones() == 1 && !p.intersects(Phase::HALVES) && self.contains(*p))
            .map(|&(_, n)| n)
            .collect();
        if self.is_begin() {
            parts.push("BEGIN");
        }
        if self.is_end() {
            parts.push("END");
        }
        f.write_str(&parts.join("|"))
    }
}

impl fmt::Debug for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Phase({self})")
    }
}

impl FromStr for Phase {
    type Err = CoreError;

    /// Parse `"DETECT_CARS|END"`; a `Phase.` prefix on each part is accepted.
    fn from_str(s: &str) -> CoreResult<Phase> {
        let mut out = Phase::NONE;
        for raw in s.split('|') {
            let name = raw.trim();
            let name = name.strip_prefix("Phase.").unwrap_or(name);
            let flag = Phase::NAMES
                .iter()
                .find(|(_, n)| n.eq_ignore_ascii_case(name))
                .map(|&(p, _)| p)
                .ok_or_else(|| CoreError::UnknownPhase(s.to_string()))?;
            out |= flag;
        }
        Ok(out)
    }
}

impl TryFrom<String> for Phase {
    type Error = CoreError;
    fn try_from(s: String) -> CoreResult<Phase> {
        s.parse()
    }
}

impl From<Phase> for String {
    fn from(p: Phase) -> String {
        p.to_string()
    }
}
