//! `ad-rules`: phase-gated condition/action rules.
//!
//! A [`Rule`] binds a condition to actions keyed by the condition's
//! [`Verdict`].  The agent asks its [`RuleTable`] for the rules of the
//! current [`Phase`](ad_core::Phase), highest priority first, and invokes
//! each against the tick's [`Context`].  Actions redirect the tick by
//! returning a [`Signal`].
//!
//! # Crate layout
//!
//! | Module        | Contents                                                    |
//! |---------------|-------------------------------------------------------------|
//! | [`context`]   | `Context`, `LiveInfo`, `ControlInputs`                      |
//! | [`value`]     | `Verdict`, `RuleValue`, detection results                   |
//! | [`signal`]    | `Signal`, `Flow<T>`                                         |
//! | [`rule`]      | `Rule`, `RulePriority`, `Gate`, `RuleHost`                  |
//! | [`builder`]   | `RuleBuilder` for simple, multi, random and blocking rules  |
//! | [`cooldown`]  | `CooldownTable`, per-rule and per-group counters            |
//! | [`table`]     | `RuleTable`, `run_phase`, `StandaloneHost`                  |
//! | [`template`]  | `RuleSetTemplate` prototypes                                |
//! | [`spec`]      | `RuleSpec`, `RuleRegistry`                                  |
//! | [`error`]     | `RuleError`, `RuleResult<T>`                                |
//!
//! # Feature flags
//!
//! | Feature | Effect                                              |
//! |---------|-----------------------------------------------------|
//! | `serde` | `RuleSpec` and `RulePriority` become deserialisable. |

pub mod builder;
pub mod context;
pub mod cooldown;
pub mod error;
pub mod rule;
pub mod signal;
pub mod spec;
pub mod table;
pub mod template;
pub mod value;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use builder::{RuleBuilder, DEFAULT_BLOCKING_BUDGET};
pub use context::{Context, ControlInputs, LiveInfo};
pub use cooldown::{CooldownKey, CooldownTable};
pub use error::{RuleError, RuleResult};
pub use rule::{Action, Condition, Gate, Rule, RuleHost, RuleId, RulePriority};
pub use signal::{Flow, Signal};
pub use spec::{PriorityValue, RuleRegistry, RuleSpec, SpecKind};
pub use table::{information_pass, run_phase, RuleTable, StandaloneHost};
pub use template::RuleSetTemplate;
pub use value::{ObstacleDetection, RuleValue, TrafficLightDetection, Verdict};
