use {
    crate::StateMachine,
    std::sync::{Mutex, PoisonError},
    thiserror::Error,
    tracing::trace,
};

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ConsensusError {
    #[error(
        "no quorum after {attempts} attempt(s): {reachable} replica(s) reachable, {required} required"
    )]
    NoQuorum {
        reachable: usize,
        required: usize,
        attempts: usize,
    },
    #[error("replica {0} is unreachable")]
    Unreachable(usize),
}

/// A replicated log that totally orders the commands applied to a [`StateMachine`].
///
/// A successful `propose` means the command was committed (agreed on by a quorum) and applied,
/// and the returned response is the one computed from the committed state. A failed `propose`
/// means the command was not committed anywhere, so callers may retry without risking a
/// duplicate effect.
pub trait Consensus<S: StateMachine>: Send + Sync {
    fn propose(&self, command: S::Command) -> Result<S::Response, ConsensusError>;
}

/// A single replica log that is trivially its own quorum.
#[derive(Debug, Default)]
pub struct LocalLog<S> {
    inner: Mutex<(S, u64)>,
}

impl<S> LocalLog<S> {
    pub fn new(state: S) -> Self {
        LocalLog {
            inner: Mutex::new((state, 0)),
        }
    }

    /// Number of commands committed so far.
    pub fn committed(&self) -> u64 {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).1
    }
}

impl<S> Consensus<S> for LocalLog<S>
where
    S: StateMachine + Send,
{
    fn propose(&self, command: S::Command) -> Result<S::Response, ConsensusError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let (state, committed) = &mut *inner;
        let response = state.apply(&command);
        *committed += 1;
        trace!(index = *committed, "Committed locally.");
        Ok(response)
    }
}
