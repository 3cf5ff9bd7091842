//! Declarative rule descriptions and the registry that resolves them.
//!
//! Rule files name their conditions and actions; the code registers the
//! matching closures in a [`RuleRegistry`] once at startup.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use ad_core::Phase;

use crate::builder::{RuleBuilder, DEFAULT_BLOCKING_BUDGET};
use crate::context::Context;
use crate::error::{RuleError, RuleResult};
use crate::rule::{Action, Condition, Rule, RulePriority};
use crate::signal::Flow;
use crate::value::{RuleValue, Verdict};

/// Priority as written in a rule file: a level name or a number.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum PriorityValue {
    Level(i32),
    Named(String),
}

impl PriorityValue {
    pub fn resolve(&self) -> RuleResult<RulePriority> {
        match self {
            PriorityValue::Level(n) => Ok(RulePriority(*n)),
            PriorityValue::Named(s) => s.parse(),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SpecKind {
    #[default]
    Simple,
    Multi,
    Random,
    Blocking,
}

/// One `[[rules]]` entry.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RuleSpec {
    pub name: String,
    pub description: String,
    pub kind: SpecKind,
    /// e.g. `"DETECT_CARS|END"`.
    pub phases: Vec<String>,
    pub priority: Option<PriorityValue>,
    pub cooldown: u32,
    pub start_cooldown: u32,
    pub group: Option<String>,
    pub enabled: bool,
    /// Registered condition name; omitted means always true.
    pub condition: Option<String>,
    /// Shorthand for an action bound to `true`.
    pub action: Option<String>,
    /// Verdict key (`"true"`, `"3"`, `"overtake"`) to action name.
    pub actions: BTreeMap<String, String>,
    pub truthy: bool,
    pub children: Vec<RuleSpec>,
    pub execute_all: Option<bool>,
    pub sort_children: bool,
    pub weights: Option<Vec<f64>>,
    pub picks: Option<usize>,
    pub repeat_if_not_applicable: bool,
    pub budget: Option<u32>,
    pub on_budget_exhausted: Option<String>,
}

impl Default for RuleSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            kind: SpecKind::Simple,
            phases: Vec::new(),
            priority: None,
            cooldown: 0,
            start_cooldown: 0,
            group: None,
            enabled: true,
            condition: None,
            action: None,
            actions: BTreeMap::new(),
            truthy: false,
            children: Vec::new(),
            execute_all: None,
            sort_children: false,
            weights: None,
            picks: None,
            repeat_if_not_applicable: false,
            budget: None,
            on_budget_exhausted: None,
        }
    }
}

/// Named conditions and actions available to rule specs.
#[derive(Clone)]
pub struct RuleRegistry {
    conditions: HashMap<String, Condition>,
    actions: HashMap<String, Action>,
    default_budget: u32,
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleRegistry {
    /// A registry holding the built-ins `always`, `never` and `noop`.
    pub fn new() -> Self {
        let mut reg = Self { conditions: HashMap::new(), actions: HashMap::new(), default_budget: DEFAULT_BLOCKING_BUDGET };
        reg.register_condition("always", |_| true);
        reg.register_condition("never", |_| false);
        reg.register_action("noop", |_| Ok(RuleValue::Unit));
        reg
    }

    /// Budget for blocking specs that do not set one.
    pub fn with_default_budget(mut self, ticks: u32) -> Self {
        self.default_budget = ticks;
        self
    }

    pub fn register_condition<F, V>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&Context) -> V + Send + Sync + 'static,
        V: Into<Verdict>,
    {
        self.conditions.insert(name.into(), Arc::new(move |ctx: &Context| f(ctx).into()));
        self
    }

    pub fn register_action<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&mut Context) -> Flow<RuleValue> + Send + Sync + 'static,
    {
        self.actions.insert(name.into(), Arc::new(f));
        self
    }

    fn condition(&self, name: &str) -> RuleResult<Condition> {
        self.conditions.get(name).cloned().ok_or_else(|| RuleError::UnknownCondition(name.to_owned()))
    }

    fn action(&self, name: &str) -> RuleResult<Action> {
        self.actions.get(name).cloned().ok_or_else(|| RuleError::UnknownAction(name.to_owned()))
    }

    /// Resolve `spec` into a rule.
    pub fn build(&self, spec: &RuleSpec) -> RuleResult<Rule> {
        let children = spec.children.iter().map(|c| self.build(c)).collect::<RuleResult<Vec<_>>>()?;

        let mut b: RuleBuilder = match spec.kind {
            SpecKind::Simple => Rule::builder(&spec.name),
            SpecKind::Multi => Rule::multi(&spec.name, children),
            SpecKind::Random => Rule::random(&spec.name, children),
            SpecKind::Blocking => Rule::blocking(&spec.name).budget(spec.budget.unwrap_or(self.default_budget)),
        };

        for p in &spec.phases {
            b = b.phase(p.parse::<Phase>()?);
        }
        if let Some(p) = &spec.priority {
            b = b.priority(p.resolve()?);
        }
        b = b
            .describe(&spec.description)
            .cooldown(spec.cooldown)
            .start_cooldown(spec.start_cooldown)
            .enabled(spec.enabled);
        if let Some(g) = &spec.group {
            b = b.group(g);
        }
        if let Some(c) = &spec.condition {
            b = b.condition_arc(self.condition(c)?);
        }
        if let Some(a) = &spec.action {
            b = b.action_arc(Verdict::TRUE, self.action(a)?);
        }
        for (key, a) in &spec.actions {
            b = b.action_arc(Verdict::parse(key), self.action(a)?);
        }
        if spec.truthy {
            b = b.truthy();
        }
        if let Some(all) = spec.execute_all {
            b = b.execute_all(all);
        }
        if spec.sort_children {
            b = b.sort_children();
        }
        if let Some(w) = &spec.weights {
            b = b.weights(w.clone());
        }
        if let Some(n) = spec.picks {
            b = b.picks(n);
        }
        if spec.repeat_if_not_applicable {
            b = b.repeat_if_not_applicable();
        }
        if let Some(a) = &spec.on_budget_exhausted {
            b = b.on_budget_exhausted_arc(self.action(a)?);
        }
        b.build()
    }
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut conditions: Vec<&String> = self.conditions.keys().collect();
        let mut actions: Vec<&String> = self.actions.keys().collect();
        conditions.sort();
        actions.sort();
        f.debug_struct("RuleRegistry")
            .field("conditions", &conditions)
            .field("actions", &actions)
            .field("default_budget", &self.default_budget)
            .finish()
    }
}
