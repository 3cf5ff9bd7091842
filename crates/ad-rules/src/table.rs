//! Per-agent rule storage, phase dispatch and the standalone host.

use std::collections::HashMap;
use std::cmp::Reverse;

use tracing::trace;

use ad_core::{AgentRng, Phase, VehicleControl};

use crate::context::Context;
use crate::cooldown::CooldownTable;
use crate::error::{RuleError, RuleResult};
use crate::rule::{Gate, Rule, RuleHost, RulePriority};
use crate::signal::{Flow, Signal};
use crate::value::RuleValue;

/// Rules of one agent, indexed by phase in priority order.
///
/// A rule can be [taken](RuleTable::take) out of its slot while it runs so
/// the rest of the table stays usable from inside it; its slot reads as
/// empty until [restored](RuleTable::restore).
pub struct RuleTable {
    slots: Vec<Option<Rule>>,
    priorities: Vec<RulePriority>,
    by_phase: HashMap<Phase, Vec<usize>>,
    cooldowns: CooldownTable,
    rng: AgentRng,
}

impl RuleTable {
    pub fn new(rng: AgentRng) -> Self {
        Self {
            slots: Vec::new(),
            priorities: Vec::new(),
            by_phase: HashMap::new(),
            cooldowns: CooldownTable::new(),
            rng,
        }
    }

    fn push_slot(&mut self, rule: Rule) -> RuleResult<usize> {
        if rule.phases().is_empty() {
            return Err(RuleError::malformed(rule.name(), "no phases"));
        }
        if rule.start_cooldown() > 0 {
            self.cooldowns.prime(&rule.cooldown_key(), rule.start_cooldown());
        }
        self.priorities.push(rule.priority());
        self.slots.push(Some(rule));
        Ok(self.slots.len() - 1)
    }

    /// Add one rule, keeping each phase list sorted by descending priority.
    /// Ties keep insertion order.
    pub fn add(&mut self, rule: Rule) -> RuleResult<()> {
        let phases = rule.phases().to_vec();
        let idx = self.push_slot(rule)?;
        let prio = self.priorities[idx];
        for phase in phases {
            let list = self.by_phase.entry(phase).or_default();
            let pos = list.partition_point(|&i| self.priorities[i] >= prio);
            list.insert(pos, idx);
        }
        Ok(())
    }

    /// Add many rules and sort once.
    pub fn add_all(&mut self, rules: impl IntoIterator<Item = Rule>) -> RuleResult<()> {
        for rule in rules {
            let phases = rule.phases().to_vec();
            let idx = self.push_slot(rule)?;
            for phase in phases {
                self.by_phase.entry(phase).or_default().push(idx);
            }
        }
        let priorities = &self.priorities;
        for list in self.by_phase.values_mut() {
            list.sort_by_key(|&i| Reverse(priorities[i]));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot indices for `phase`, highest priority first.
    pub fn order_for(&self, phase: Phase) -> Vec<usize> {
        self.by_phase.get(&phase).cloned().unwrap_or_default()
    }

    /// Rules for `phase` in execution order, skipping any currently taken.
    pub fn rules_for(&self, phase: Phase) -> impl Iterator<Item = &Rule> + '_ {
        self.by_phase
            .get(&phase)
            .into_iter()
            .flatten()
            .filter_map(|&i| self.slots[i].as_ref())
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.slots.iter().flatten().find(|r| r.name() == name)
    }

    /// Enable or disable every rule called `name`.  Returns how many changed.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> usize {
        let mut changed = 0;
        for rule in self.slots.iter_mut().flatten().filter(|r| r.name() == name) {
            rule.set_enabled(enabled);
            changed += 1;
        }
        changed
    }

    pub fn take(&mut self, idx: usize) -> Option<Rule> {
        self.slots.get_mut(idx).and_then(Option::take)
    }

    pub fn restore(&mut self, idx: usize, rule: Rule) {
        if let Some(slot) = self.slots.get_mut(idx) {
            *slot = Some(rule);
        }
    }

    pub fn cooldowns(&self) -> &CooldownTable {
        &self.cooldowns
    }

    pub fn cooldowns_mut(&mut self) -> &mut CooldownTable {
        &mut self.cooldowns
    }

    pub fn rng_mut(&mut self) -> &mut AgentRng {
        &mut self.rng
    }
}

impl std::fmt::Debug for RuleTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleTable")
            .field("rules", &self.slots.len())
            .field("phases", &self.by_phase.len())
            .finish_non_exhaustive()
    }
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

/// Invoke every rule registered for `ctx.phase`, in priority order.
///
/// Returns the result of the last rule that fired.  A
/// [`Signal::NoFurtherRules`] ends the phase early and its value becomes the
/// result; any other signal is returned to the caller.
pub fn run_phase<H: RuleHost + ?Sized>(host: &mut H, ctx: &mut Context, gate: Gate) -> Flow<Option<RuleValue>> {
    let order = host.table().order_for(ctx.phase);
    let mut last = None;
    for idx in order {
        // Empty while the rule itself is running a blocking loop.
        let Some(rule) = host.table().take(idx) else { continue };
        let res = rule.invoke(ctx, host, gate);
        host.table().restore(idx, rule);
        match res {
            Ok(Some(v)) => last = Some(v),
            Ok(None) => {}
            Err(Signal::NoFurtherRules(v)) => {
                trace!(phase = %ctx.phase, "remaining rules skipped");
                return Ok(Some(v));
            }
            Err(s) => return Err(s),
        }
    }
    Ok(last)
}

/// Run the `UPDATE_INFORMATION` phase pair with phase and cooldown checks
/// disabled.  The only rule logic allowed inside a blocking rule's loop.
pub fn information_pass<H: RuleHost + ?Sized>(host: &mut H, ctx: &mut Context) -> Flow<()> {
    for half in [Phase::BEGIN, Phase::END] {
        ctx.begin_phase(Phase::UPDATE_INFORMATION | half, None);
        run_phase(host, ctx, Gate::FORCE)?;
        ctx.end_phase();
    }
    Ok(())
}

// ── Standalone host ───────────────────────────────────────────────────────────

type AdvanceHook<'a> = Box<dyn FnMut(&mut Context, VehicleControl) + 'a>;

/// Runs rules without a world: advancing only moves the context's tick.
///
/// Useful for tests and for evaluating rule sets offline.
pub struct StandaloneHost<'a> {
    table: &'a mut RuleTable,
    hook: Option<AdvanceHook<'a>>,
    advanced: u32,
}

impl<'a> StandaloneHost<'a> {
    pub fn new(table: &'a mut RuleTable) -> Self {
        Self { table, hook: None, advanced: 0 }
    }

    /// Called with the applied control before each tick advance.
    pub fn on_advance(mut self, f: impl FnMut(&mut Context, VehicleControl) + 'a) -> Self {
        self.hook = Some(Box::new(f));
        self
    }

    /// Ticks advanced through this host so far.
    pub fn advanced(&self) -> u32 {
        self.advanced
    }

    /// Run one phase against `ctx`.
    pub fn execute(&mut self, ctx: &mut Context, phase: Phase, prior: Option<RuleValue>) -> Flow<Option<RuleValue>> {
        ctx.begin_phase(phase, prior);
        let out = run_phase(self, ctx, Gate::NORMAL);
        ctx.end_phase();
        out
    }
}

impl RuleHost for StandaloneHost<'_> {
    fn table(&mut self) -> &mut RuleTable {
        &mut *self.table
    }

    fn advance(&mut self, ctx: &mut Context, control: VehicleControl) -> Flow<()> {
        if let Some(hook) = self.hook.as_mut() {
            hook(ctx, control);
        }
        self.advanced += 1;
        ctx.enter_tick(ctx.tick.next());
        information_pass(self, ctx)
    }
}
