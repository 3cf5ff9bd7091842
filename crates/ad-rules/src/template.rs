//! Immutable rule-set prototypes materialised per agent.

use ad_core::AgentRng;

use crate::error::RuleResult;
use crate::rule::Rule;
use crate::spec::{RuleRegistry, RuleSpec};
use crate::table::RuleTable;

/// A shareable list of rule prototypes.
///
/// Rules carry no mutable state, so one template can serve any number of
/// agents; each [`materialize`](Self::materialize) call yields a table with
/// its own cooldown counters and RNG.
#[derive(Clone, Debug, Default)]
pub struct RuleSetTemplate {
    rules: Vec<Rule>,
}

impl RuleSetTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Build prototypes from declarative specs.
    pub fn from_specs(specs: &[RuleSpec], registry: &RuleRegistry) -> RuleResult<Self> {
        let rules = specs.iter().map(|s| registry.build(s)).collect::<RuleResult<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn extend(&mut self, other: &RuleSetTemplate) {
        self.rules.extend(other.rules.iter().cloned());
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// A fresh table owning copies of every prototype.
    pub fn materialize(&self, rng: AgentRng) -> RuleResult<RuleTable> {
        let mut table = RuleTable::new(rng);
        table.add_all(self.rules.iter().cloned())?;
        Ok(table)
    }
}
