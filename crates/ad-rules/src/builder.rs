//! Fluent construction of [`Rule`]s.

use std::collections::HashMap;
use std::sync::Arc;

use ad_core::Phase;

use crate::context::Context;
use crate::error::{RuleError, RuleResult};
use crate::rule::{Action, Condition, Rule, RuleId, RuleKind, RulePriority};
use crate::signal::Flow;
use crate::value::{RuleValue, Verdict};

/// Tick budget of a blocking rule unless set otherwise.
pub const DEFAULT_BLOCKING_BUDGET: u32 = 5_000;

enum Draft {
    Simple,
    Multi { children: Vec<Rule>, execute_all: bool, sort: bool },
    Random { children: Vec<Rule>, weights: Option<Vec<f64>>, picks: usize, repeat: bool },
    Blocking { budget: u32, on_exhausted: Option<Action> },
}

/// Builder returned by [`Rule::builder`] and friends.
///
/// ```
/// use ad_core::Phase;
/// use ad_rules::{Rule, RulePriority, RuleValue};
///
/// let rule = Rule::builder("slow_down_in_rain")
///     .phase(Phase::TAKE_NORMAL_STEP | Phase::END)
///     .priority(RulePriority::HIGH)
///     .cooldown(20)
///     .condition(|ctx| ctx.live.speed_kmh > 30.0)
///     .on_true(|ctx| {
///         let mut c = ctx.get_or_calculate_control();
///         c.throttle *= 0.5;
///         ctx.control = Some(c);
///         Ok(RuleValue::Control(c))
///     })
///     .build()
///     .unwrap();
/// assert_eq!(rule.priority(), RulePriority::HIGH);
/// ```
pub struct RuleBuilder {
    name: String,
    description: String,
    phases: Vec<Phase>,
    priority: RulePriority,
    condition: Option<Condition>,
    actions: HashMap<Verdict, Action>,
    truthy: bool,
    cooldown: u32,
    start_cooldown: u32,
    group: Option<String>,
    enabled: bool,
    draft: Draft,
}

impl Rule {
    pub fn builder(name: impl Into<String>) -> RuleBuilder {
        RuleBuilder::new(name.into(), Draft::Simple)
    }

    /// A rule that runs `children` in order whenever its own condition holds.
    /// Children are not phase-gated.
    pub fn multi(name: impl Into<String>, children: Vec<Rule>) -> RuleBuilder {
        RuleBuilder::new(name.into(), Draft::Multi { children, execute_all: true, sort: false })
    }

    /// A rule that runs weighted random picks from `children`.
    pub fn random(name: impl Into<String>, children: Vec<Rule>) -> RuleBuilder {
        RuleBuilder::new(name.into(), Draft::Random { children, weights: None, picks: 1, repeat: false })
    }

    /// A rule that takes over the agent for several ticks while its
    /// condition keeps selecting an action.
    pub fn blocking(name: impl Into<String>) -> RuleBuilder {
        RuleBuilder::new(name.into(), Draft::Blocking { budget: DEFAULT_BLOCKING_BUDGET, on_exhausted: None })
    }
}

impl RuleBuilder {
    fn new(name: String, draft: Draft) -> Self {
        Self {
            name,
            description: String::new(),
            phases: Vec::new(),
            priority: RulePriority::NORMAL,
            condition: None,
            actions: HashMap::new(),
            truthy: false,
            cooldown: 0,
            start_cooldown: 0,
            group: None,
            enabled: true,
            draft,
        }
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = text.into();
        self
    }

    pub fn phase(mut self, phase: Phase) -> Self {
        if !self.phases.contains(&phase) {
            self.phases.push(phase);
        }
        self
    }

    pub fn phases(self, phases: impl IntoIterator<Item = Phase>) -> Self {
        phases.into_iter().fold(self, RuleBuilder::phase)
    }

    pub fn priority(mut self, priority: RulePriority) -> Self {
        self.priority = priority;
        self
    }

    /// Ticks to wait after firing.  `0` disables the cooldown.
    pub fn cooldown(mut self, ticks: u32) -> Self {
        self.cooldown = ticks;
        self
    }

    /// Cooldown in force before the first firing.
    pub fn start_cooldown(mut self, ticks: u32) -> Self {
        self.start_cooldown = ticks;
        self
    }

    /// Share one cooldown counter with every rule of the same group.
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn condition<F, V>(mut self, f: F) -> Self
    where
        F: Fn(&Context) -> V + Send + Sync + 'static,
        V: Into<Verdict>,
    {
        self.condition = Some(Arc::new(move |ctx: &Context| f(ctx).into()));
        self
    }

    pub(crate) fn condition_arc(mut self, c: Condition) -> Self {
        self.condition = Some(c);
        self
    }

    pub fn action<F>(mut self, verdict: impl Into<Verdict>, f: F) -> Self
    where
        F: Fn(&mut Context) -> Flow<RuleValue> + Send + Sync + 'static,
    {
        self.actions.insert(verdict.into(), Arc::new(f));
        self
    }

    pub(crate) fn action_arc(mut self, verdict: Verdict, a: Action) -> Self {
        self.actions.insert(verdict, a);
        self
    }

    pub fn on_true<F>(self, f: F) -> Self
    where
        F: Fn(&mut Context) -> Flow<RuleValue> + Send + Sync + 'static,
    {
        self.action(true, f)
    }

    pub fn on_false<F>(self, f: F) -> Self
    where
        F: Fn(&mut Context) -> Flow<RuleValue> + Send + Sync + 'static,
    {
        self.action(false, f)
    }

    /// Look actions up by the verdict's truthiness instead of its exact value.
    pub fn truthy(mut self) -> Self {
        self.truthy = true;
        self
    }

    /// Multi-rule: `false` stops after the first child that fires.
    pub fn execute_all(mut self, all: bool) -> Self {
        if let Draft::Multi { execute_all, .. } = &mut self.draft {
            *execute_all = all;
        }
        self
    }

    /// Multi-rule: order children by priority, highest first.
    pub fn sort_children(mut self) -> Self {
        if let Draft::Multi { sort, .. } = &mut self.draft {
            *sort = true;
        }
        self
    }

    /// Random-rule: explicit weights, one per child.  Without them the
    /// children's priorities are used.
    pub fn weights(mut self, w: impl Into<Vec<f64>>) -> Self {
        if let Draft::Random { weights, .. } = &mut self.draft {
            *weights = Some(w.into());
        }
        self
    }

    /// Random-rule: how many draws per firing.
    pub fn picks(mut self, n: usize) -> Self {
        if let Draft::Random { picks, .. } = &mut self.draft {
            *picks = n;
        }
        self
    }

    /// Random-rule: redraw without a child that did not fire.
    pub fn repeat_if_not_applicable(mut self) -> Self {
        if let Draft::Random { repeat, .. } = &mut self.draft {
            *repeat = true;
        }
        self
    }

    /// Blocking-rule: maximum number of ticks to hold the agent.
    pub fn budget(mut self, ticks: u32) -> Self {
        if let Draft::Blocking { budget, .. } = &mut self.draft {
            *budget = ticks;
        }
        self
    }

    /// Blocking-rule: runs when the budget is used up.
    pub fn on_budget_exhausted<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Context) -> Flow<RuleValue> + Send + Sync + 'static,
    {
        if let Draft::Blocking { on_exhausted, .. } = &mut self.draft {
            *on_exhausted = Some(Arc::new(f));
        }
        self
    }

    pub(crate) fn on_budget_exhausted_arc(mut self, a: Action) -> Self {
        if let Draft::Blocking { on_exhausted, .. } = &mut self.draft {
            *on_exhausted = Some(a);
        }
        self
    }

    pub fn build(self) -> RuleResult<Rule> {
        let name = self.name;
        if name.is_empty() {
            return Err(RuleError::malformed("<unnamed>", "empty name"));
        }
        if let Some(p) = self.phases.iter().find(|p| !p.is_concrete()) {
            return Err(RuleError::malformed(&name, format!("`{p}` is not a concrete phase")));
        }

        let kind = match self.draft {
            Draft::Simple => {
                if self.actions.is_empty() {
                    return Err(RuleError::malformed(&name, "no actions"));
                }
                RuleKind::Simple
            }
            Draft::Multi { mut children, execute_all, sort } => {
                if children.is_empty() {
                    return Err(RuleError::malformed(&name, "multi-rule without children"));
                }
                if sort {
                    children.sort_by_key(|c| std::cmp::Reverse(c.priority));
                }
                RuleKind::Multi { children, execute_all }
            }
            Draft::Random { children, weights, picks, repeat } => {
                if children.is_empty() {
                    return Err(RuleError::malformed(&name, "random rule without children"));
                }
                let weights = weights
                    .unwrap_or_else(|| children.iter().map(|c| f64::from(c.priority.0)).collect());
                if weights.len() != children.len() {
                    return Err(RuleError::malformed(
                        &name,
                        format!("{} weights for {} children", weights.len(), children.len()),
                    ));
                }
                if weights.iter().any(|w| !w.is_finite() || *w < 0.0) || weights.iter().sum::<f64>() <= 0.0 {
                    return Err(RuleError::malformed(&name, "weights must be non-negative with a positive sum"));
                }
                if picks == 0 {
                    return Err(RuleError::malformed(&name, "picks must be at least one"));
                }
                RuleKind::Random { children, weights, picks, repeat_if_not_applicable: repeat }
            }
            Draft::Blocking { budget, on_exhausted } => {
                if self.actions.is_empty() {
                    return Err(RuleError::malformed(&name, "no actions"));
                }
                if budget == 0 {
                    return Err(RuleError::malformed(&name, "blocking budget of zero ticks"));
                }
                RuleKind::Blocking { budget, on_exhausted }
            }
        };

        Ok(Rule {
            id: RuleId::fresh(),
            name,
            description: self.description,
            phases: self.phases,
            priority: self.priority,
            condition: self.condition.unwrap_or_else(|| Arc::new(|_: &Context| Verdict::TRUE)),
            actions: self.actions,
            truthy: self.truthy,
            cooldown: self.cooldown,
            start_cooldown: self.start_cooldown,
            group: self.group,
            enabled: self.enabled,
            kind,
        })
    }
}
