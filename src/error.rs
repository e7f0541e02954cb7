// Errors of the machinery itself. Failures of pan code are values and never show up here.

use failure_derive::Fail;

#[derive(Debug, Fail, Clone, PartialEq, Eq)]
pub enum LoopError {
    #[fail(display = "the event loop is already running on this thread")]
    Reentrant,
    #[fail(display = "exceeded the event loop budget of {} jobs", budget)]
    BudgetExhausted { budget: usize },
    #[fail(display = "the future is still pending but the event loop ran out of work")]
    Stalled,
    #[fail(display = "could not spawn task: {}", _0)]
    Spawn(String),
}

#[derive(Debug, Fail, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[fail(display = "{} is not valid unicode", var)]
    NotUnicode { var: &'static str },
    #[fail(display = "invalid job budget {:?}, expected a number or `none`", value)]
    InvalidBudget { value: String },
}
