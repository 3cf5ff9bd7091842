//! Rule configuration errors.

use thiserror::Error;

use ad_core::CoreError;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule `{rule}` is malformed: {reason}")]
    Malformed { rule: String, reason: String },

    #[error("no condition registered as `{0}`")]
    UnknownCondition(String),

    #[error("no action registered as `{0}`")]
    UnknownAction(String),

    #[error("unknown rule priority `{0}`")]
    UnknownPriority(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl RuleError {
    pub(crate) fn malformed(rule: &str, reason: impl Into<String>) -> Self {
        RuleError::Malformed { rule: rule.to_owned(), reason: reason.into() }
    }
}

pub type RuleResult<T> = Result<T, RuleError>;
