//! Cooldown counters, per rule or shared by a named group.

use std::collections::HashMap;

use ad_core::Tick;

use crate::rule::RuleId;

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum CooldownKey {
    Rule(RuleId),
    Group(String),
}

#[derive(Copy, Clone, Debug, Default)]
struct Counter {
    remaining: u32,
    /// Tick of the last decrement or reset.
    touched: Option<Tick>,
}

/// Every counter of one agent.
///
/// A counter is decremented by the first attempt in a tick only, so rules
/// sharing a group, or a rule listed under several phases, cool down at one
/// step per tick.
#[derive(Clone, Debug, Default)]
pub struct CooldownTable {
    counters: HashMap<CooldownKey, Counter>,
}

impl CooldownTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one attempt at `tick` and report whether the counter is at zero.
    pub fn attempt(&mut self, key: &CooldownKey, tick: Tick) -> bool {
        let c = self.counters.entry(key.clone()).or_default();
        if c.touched != Some(tick) {
            c.remaining = c.remaining.saturating_sub(1);
            c.touched = Some(tick);
        }
        c.remaining == 0
    }

    /// Restart the counter after a rule fired at `tick`.
    pub fn reset(&mut self, key: &CooldownKey, value: u32, tick: Tick) {
        self.counters.insert(key.clone(), Counter { remaining: value, touched: Some(tick) });
    }

    /// Set an initial value before the first tick.  Does not lower an
    /// existing counter.
    pub fn prime(&mut self, key: &CooldownKey, value: u32) {
        let c = self.counters.entry(key.clone()).or_default();
        c.remaining = c.remaining.max(value);
    }

    pub fn remaining(&self, key: &CooldownKey) -> u32 {
        self.counters.get(key).map_or(0, |c| c.remaining)
    }
}
