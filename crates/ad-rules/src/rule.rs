//! `Rule` and its invocation contract.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use ad_core::{Phase, VehicleControl};

use crate::context::Context;
use crate::cooldown::{CooldownKey, CooldownTable};
use crate::error::RuleError;
use crate::signal::{Flow, Signal};
use crate::table::RuleTable;
use crate::value::{RuleValue, Verdict};

/// Maps the context to a verdict selecting an action.
pub type Condition = Arc<dyn Fn(&Context) -> Verdict + Send + Sync>;

/// Runs when its verdict is produced.  `Err` carries a control-flow signal.
pub type Action = Arc<dyn Fn(&mut Context) -> Flow<RuleValue> + Send + Sync>;

static NEXT_RULE_ID: AtomicU32 = AtomicU32::new(0);

/// Process-unique rule identity; shared by clones of the same prototype.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct RuleId(u32);

impl RuleId {
    pub(crate) fn fresh() -> Self {
        RuleId(NEXT_RULE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rule({})", self.0)
    }
}

// ── Priority ──────────────────────────────────────────────────────────────────

/// Higher runs first.  Any integer is allowed; the named levels are the
/// usual choices.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RulePriority(pub i32);

impl RulePriority {
    pub const NULL: RulePriority = RulePriority(0);
    pub const LOWEST: RulePriority = RulePriority(1);
    pub const LOW: RulePriority = RulePriority(2);
    pub const NORMAL: RulePriority = RulePriority(4);
    pub const HIGH: RulePriority = RulePriority(8);
    pub const HIGHEST: RulePriority = RulePriority(16);
}

impl FromStr for RulePriority {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(n) = s.trim().parse::<i32>() {
            return Ok(RulePriority(n));
        }
        let name = s.trim().trim_start_matches("RulePriority.").to_ascii_uppercase();
        Ok(match name.as_str() {
            "NULL" => RulePriority::NULL,
            "LOWEST" => RulePriority::LOWEST,
            "LOW" => RulePriority::LOW,
            "NORMAL" => RulePriority::NORMAL,
            "HIGH" => RulePriority::HIGH,
            "HIGHEST" => RulePriority::HIGHEST,
            _ => return Err(RuleError::UnknownPriority(s.to_owned())),
        })
    }
}

// ── Gate ──────────────────────────────────────────────────────────────────────

/// Per-invocation overrides of the readiness checks.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct Gate {
    pub ignore_phase: bool,
    pub ignore_cooldown: bool,
}

impl Gate {
    pub const NORMAL: Gate = Gate { ignore_phase: false, ignore_cooldown: false };
    pub const FORCE: Gate = Gate { ignore_phase: true, ignore_cooldown: true };
}

// ── Host ──────────────────────────────────────────────────────────────────────

/// What a rule needs from whoever runs it.
pub trait RuleHost {
    /// The table owning the cooldowns and RNG.  A rule being invoked has
    /// been taken out of it for the duration.
    fn table(&mut self) -> &mut RuleTable;

    /// Apply `control`, advance the world one tick and refresh the context.
    /// Called once per iteration of a blocking rule.
    fn advance(&mut self, ctx: &mut Context, control: VehicleControl) -> Flow<()>;
}

// ── Rule ──────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub(crate) enum RuleKind {
    Simple,
    Multi {
        children: Vec<Rule>,
        execute_all: bool,
    },
    Random {
        children: Vec<Rule>,
        weights: Vec<f64>,
        picks: usize,
        repeat_if_not_applicable: bool,
    },
    Blocking {
        budget: u32,
        on_exhausted: Option<Action>,
    },
}

/// A condition bound to actions, gated by phase, cooldown and priority.
///
/// Build with [`Rule::builder`], [`Rule::multi`], [`Rule::random`] or
/// [`Rule::blocking`].  Rules are immutable; their cooldown state lives in
/// the owning [`RuleTable`].
#[derive(Clone)]
pub struct Rule {
    pub(crate) id: RuleId,
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) phases: Vec<Phase>,
    pub(crate) priority: RulePriority,
    pub(crate) condition: Condition,
    pub(crate) actions: HashMap<Verdict, Action>,
    pub(crate) truthy: bool,
    pub(crate) cooldown: u32,
    pub(crate) start_cooldown: u32,
    pub(crate) group: Option<String>,
    pub(crate) enabled: bool,
    pub(crate) kind: RuleKind,
}

impl Rule {
    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn priority(&self) -> RulePriority {
        self.priority
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn applies_to(&self, phase: Phase) -> bool {
        self.phases.contains(&phase)
    }

    pub fn cooldown_key(&self) -> CooldownKey {
        match &self.group {
            Some(g) => CooldownKey::Group(g.clone()),
            None => CooldownKey::Rule(self.id),
        }
    }

    pub(crate) fn start_cooldown(&self) -> u32 {
        self.start_cooldown
    }

    /// `true` if the rule would be considered for `ctx` right now: enabled,
    /// in phase and off cooldown.  Counts as an attempt.
    fn ready(&self, ctx: &Context, cooldowns: &mut CooldownTable, gate: Gate) -> bool {
        if !self.enabled || (!gate.ignore_phase && !self.applies_to(ctx.phase)) {
            return false;
        }
        let off_cooldown = cooldowns.attempt(&self.cooldown_key(), ctx.tick);
        off_cooldown || gate.ignore_cooldown
    }

    fn lookup(&self, verdict: &Verdict) -> Option<&Action> {
        if self.truthy {
            self.actions.get(&Verdict::Bool(verdict.is_truthy()))
        } else {
            self.actions.get(verdict)
        }
    }

    fn evaluate(&self, ctx: &mut Context) -> Verdict {
        let verdict = (self.condition)(ctx);
        ctx.evaluation_results.insert(ctx.phase, verdict.clone());
        verdict
    }

    /// Whether `verdict` selects this rule's behaviour.
    fn matches(&self, verdict: &Verdict) -> bool {
        match self.kind {
            RuleKind::Multi { .. } | RuleKind::Random { .. } if self.actions.is_empty() => verdict.is_truthy(),
            _ => self.lookup(verdict).is_some(),
        }
    }

    /// Attempt the rule.
    ///
    /// `Ok(None)` if it was not ready or its verdict had no action;
    /// `Ok(Some(v))` if it fired.  A signal raised by an action is returned
    /// as `Err` after the rule's cooldown has been reset.
    pub fn invoke<H: RuleHost + ?Sized>(&self, ctx: &mut Context, host: &mut H, gate: Gate) -> Flow<Option<RuleValue>> {
        if ctx.active_blocking.contains(&self.id) {
            return Ok(None);
        }
        if !self.ready(ctx, host.table().cooldowns_mut(), gate) {
            return Ok(None);
        }
        let verdict = self.evaluate(ctx);
        if !self.matches(&verdict) {
            return Ok(None);
        }

        host.table().cooldowns_mut().reset(&self.cooldown_key(), self.cooldown, ctx.tick);
        ctx.fired.push(self.name.clone());
        debug!(rule = %self.name, phase = %ctx.phase, %verdict, "rule fired");

        let phase = ctx.phase;
        let value = match &self.kind {
            RuleKind::Simple => self.run_action(&verdict, ctx)?,
            RuleKind::Multi { children, execute_all } => self.run_multi(&verdict, children, *execute_all, ctx, host, gate)?,
            RuleKind::Random { children, weights, picks, repeat_if_not_applicable } => {
                self.run_random(children, weights, *picks, *repeat_if_not_applicable, ctx, host, gate)?
            }
            RuleKind::Blocking { budget, on_exhausted } => {
                return self.run_blocking(verdict, *budget, on_exhausted.as_ref(), ctx, host);
            }
        };
        ctx.action_results.insert(phase, value.clone());
        Ok(Some(value))
    }

    fn run_action(&self, verdict: &Verdict, ctx: &mut Context) -> Flow<RuleValue> {
        match self.lookup(verdict) {
            Some(action) => action(ctx),
            None => Ok(RuleValue::Unit),
        }
    }

    fn run_multi<H: RuleHost + ?Sized>(
        &self,
        verdict: &Verdict,
        children: &[Rule],
        execute_all: bool,
        ctx: &mut Context,
        host: &mut H,
        gate: Gate,
    ) -> Flow<RuleValue> {
        let mut results = Vec::new();
        match self.run_action(verdict, ctx) {
            Ok(RuleValue::Unit) => {}
            Ok(v) => results.push(v),
            Err(Signal::SkipChildren) => return Ok(RuleValue::List(results)),
            Err(s) => return Err(s),
        }
        let child_gate = Gate { ignore_phase: true, ..gate };
        for child in children {
            match child.invoke(ctx, host, child_gate) {
                Ok(Some(v)) => {
                    results.push(v);
                    if !execute_all {
                        break;
                    }
                }
                Ok(None) => {}
                Err(Signal::SkipChildren) => break,
                Err(s) => return Err(s),
            }
        }
        Ok(RuleValue::List(results))
    }

    #[allow(clippy::too_many_arguments)]
    fn run_random<H: RuleHost + ?Sized>(
        &self,
        children: &[Rule],
        weights: &[f64],
        picks: usize,
        repeat: bool,
        ctx: &mut Context,
        host: &mut H,
        gate: Gate,
    ) -> Flow<RuleValue> {
        let child_gate = Gate { ignore_phase: true, ..gate };
        let mut results = Vec::new();
        for _ in 0..picks {
            let mut pool = weights.to_vec();
            loop {
                let cum = ad_core::cumulative(pool.iter().copied());
                let Some(i) = host.table().rng_mut().pick_cumulative(&cum) else { break };
                match children[i].invoke(ctx, host, child_gate)? {
                    Some(v) => {
                        results.push(v);
                        break;
                    }
                    None if repeat => pool[i] = 0.0,
                    None => break,
                }
            }
        }
        Ok(RuleValue::List(results))
    }

    fn run_blocking<H: RuleHost + ?Sized>(
        &self,
        verdict: Verdict,
        budget: u32,
        on_exhausted: Option<&Action>,
        ctx: &mut Context,
        host: &mut H,
    ) -> Flow<Option<RuleValue>> {
        let phase = ctx.phase;
        ctx.active_blocking.push(self.id);
        let outcome = self.blocking_loop(verdict, budget, on_exhausted, ctx, host);
        ctx.active_blocking.retain(|id| *id != self.id);
        ctx.phase = phase;

        let value = outcome?;
        ctx.action_results.insert(phase, value);
        Err(Signal::SkipInnerLoop { control: ctx.get_or_calculate_control() })
    }

    fn blocking_loop<H: RuleHost + ?Sized>(
        &self,
        mut verdict: Verdict,
        budget: u32,
        on_exhausted: Option<&Action>,
        ctx: &mut Context,
        host: &mut H,
    ) -> Flow<RuleValue> {
        let mut last = RuleValue::Unit;
        let mut ticks = 0;
        loop {
            if ticks >= budget {
                warn!(rule = %self.name, budget, "blocking rule ran out of ticks");
                if let Some(f) = on_exhausted {
                    last = f(ctx)?;
                }
                return Ok(last);
            }
            last = match self.run_action(&verdict, ctx) {
                Ok(v) => v,
                Err(Signal::Unblock(v)) => return Ok(v),
                Err(s) => return Err(s),
            };
            let control = ctx.get_or_calculate_control();
            host.advance(ctx, control)?;
            ticks += 1;

            verdict = (self.condition)(ctx);
            if self.lookup(&verdict).is_none() {
                debug!(rule = %self.name, ticks, "blocking rule released");
                return Ok(last);
            }
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("phases", &self.phases)
            .field("priority", &self.priority)
            .field("cooldown", &self.cooldown)
            .field("group", &self.group)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}
