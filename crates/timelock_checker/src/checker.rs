use {
    std::fmt::{self, Display, Formatter},
    thiserror::Error,
    timelock_core::{ingest::IngestError, Event, EventHistory, Value},
};

/// A history event, or a pair of events, demonstrating a violation.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(untagged)]
pub enum Evidence {
    Event(Event),
    Pair(Event, Event),
}

impl Display for Evidence {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Evidence::Event(event) => Display::fmt(event, f),
            Evidence::Pair(first, second) => write!(f, "{first} → {second}"),
        }
    }
}

/// The verdict of one or more checkers. Serializes as `{"valid?": bool, "errors": [...]}`.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CheckResult {
    #[serde(rename = "valid?")]
    pub valid: bool,
    pub errors: Vec<Evidence>,
}

impl CheckResult {
    pub fn from_errors(errors: Vec<Evidence>) -> Self {
        CheckResult {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Appends `other`'s evidence after this result's evidence.
    pub fn merge(&mut self, other: CheckResult) {
        self.valid &= other.valid;
        self.errors.extend(other.errors);
    }
}

impl Default for CheckResult {
    fn default() -> Self {
        CheckResult::from_errors(Vec::new())
    }
}

/// Reasons a checker could not reach a verdict.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("{checker} cannot interpret value {value} of event {index}")]
    MalformedValue {
        checker: String,
        index: usize,
        value: Value,
    },
    #[error("completion at event {index} has no invocation")]
    MissingInvocation { index: usize },
    #[error(transparent)]
    Ingest(#[from] IngestError),
}

/// A side-effect-free reducer from a history to a verdict.
pub trait Checker: Send + Sync {
    fn name(&self) -> &str;

    fn check(&self, history: &EventHistory) -> Result<CheckResult, CheckError>;
}

impl<F> Checker for F
where
    F: Fn(&EventHistory) -> Result<CheckResult, CheckError> + Send + Sync,
{
    fn name(&self) -> &str {
        std::any::type_name::<F>()
    }

    fn check(&self, history: &EventHistory) -> Result<CheckResult, CheckError> {
        self(history)
    }
}
