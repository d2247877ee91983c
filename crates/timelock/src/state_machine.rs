use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
};

/// A deterministic state machine whose commands are ordered by a [`Consensus`] log.
///
/// Every replica applies the same committed commands in the same order, so `apply` must depend
/// on nothing but the current state and the command. Anything time dependent, such as lease
/// expiry, travels inside the command.
///
/// [`Consensus`]: crate::Consensus
pub trait StateMachine {
    /// The type of commands. Often an enum.
    type Command;

    /// The type of values returned by applying a command.
    type Response;

    /// Applies a committed command.
    fn apply(&mut self, command: &Self::Command) -> Self::Response;
}

/// Opaque proof of ownership of a lock, invalidated on release or expiry.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct LeaseToken(u64);

impl Display for LeaseToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "lease#{}", self.0)
    }
}

impl From<LeaseToken> for u64 {
    fn from(token: LeaseToken) -> Self {
        token.0
    }
}

impl From<u64> for LeaseToken {
    fn from(n: u64) -> Self {
        LeaseToken(n)
    }
}

/// An inclusive range of freshly issued timestamps. Only the state machine grants ranges, and a
/// grant always holds at least one timestamp.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TimestampRange {
    lower: u64,
    upper: u64,
}

impl TimestampRange {
    pub(crate) fn inclusive(lower: u64, upper: u64) -> Self {
        debug_assert!(lower <= upper, "empty range {lower}..={upper}");
        TimestampRange { lower, upper }
    }

    pub fn lower(&self) -> u64 {
        self.lower
    }

    pub fn upper(&self) -> u64 {
        self.upper
    }

    pub fn len(&self) -> u64 {
        self.upper - self.lower + 1
    }

    /// Always `false`: zero-sized grants are refused before a range is built.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, timestamp: u64) -> bool {
        self.lower <= timestamp && timestamp <= self.upper
    }

    pub fn overlaps(&self, other: &TimestampRange) -> bool {
        self.lower <= other.upper && other.lower <= self.upper
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> {
        self.lower..=self.upper
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Lease {
    pub holder: u64,
    pub token: LeaseToken,
    pub expiry: u64,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    Allocate { count: u64 },
    FastForward { minimum: u64 },
    ReadFloor,
    Acquire {
        lock: String,
        process: u64,
        now: u64,
        duration: u64,
    },
    Refresh {
        token: LeaseToken,
        now: u64,
        duration: u64,
    },
    Release { token: LeaseToken },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Response {
    Allocated(TimestampRange),
    Exhausted,
    Floor(u64),
    Granted(Lease),
    Held { holder: u64 },
    Refreshed { expiry: u64 },
    InvalidLease,
    Released { was_held: bool },
}

/// The replicated state behind the oracle: the issued-timestamp floor and the lock table.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TimeLockState {
    floor: u64,
    locks: BTreeMap<String, Lease>,
    last_token: u64,
}

impl TimeLockState {
    pub fn floor(&self) -> u64 {
        self.floor
    }

    pub fn lease(&self, lock: &str) -> Option<&Lease> {
        self.locks.get(lock)
    }

    fn lease_mut(&mut self, token: LeaseToken) -> Option<(&String, &mut Lease)> {
        self.locks.iter_mut().find(|(_, lease)| lease.token == token)
    }
}

impl StateMachine for TimeLockState {
    type Command = Command;
    type Response = Response;

    fn apply(&mut self, command: &Command) -> Response {
        match command {
            Command::Allocate { count } => match self.floor.checked_add(*count) {
                Some(upper) if *count > 0 => {
                    let range = TimestampRange::inclusive(self.floor + 1, upper);
                    self.floor = upper;
                    Response::Allocated(range)
                }
                _ => Response::Exhausted,
            },
            Command::FastForward { minimum } => {
                self.floor = self.floor.max(*minimum);
                Response::Floor(self.floor)
            }
            Command::ReadFloor => Response::Floor(self.floor),
            Command::Acquire {
                lock,
                process,
                now,
                duration,
            } => {
                if let Some(lease) = self.locks.get(lock) {
                    if lease.expiry > *now {
                        return Response::Held {
                            holder: lease.holder,
                        };
                    }
                }
                self.last_token += 1;
                let lease = Lease {
                    holder: *process,
                    token: LeaseToken(self.last_token),
                    expiry: now.saturating_add(*duration),
                };
                self.locks.insert(lock.clone(), lease.clone());
                Response::Granted(lease)
            }
            Command::Refresh {
                token,
                now,
                duration,
            } => match self.lease_mut(*token) {
                Some((_, lease)) if lease.expiry > *now => {
                    lease.expiry = now.saturating_add(*duration);
                    Response::Refreshed {
                        expiry: lease.expiry,
                    }
                }
                _ => Response::InvalidLease,
            },
            Command::Release { token } => {
                let lock = self.lease_mut(*token).map(|(lock, _)| lock.clone());
                Response::Released {
                    was_held: lock.and_then(|lock| self.locks.remove(&lock)).is_some(),
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn acquire(lock: &str, process: u64, now: u64) -> Command {
        Command::Acquire {
            lock: lock.into(),
            process,
            now,
            duration: 10,
        }
    }

    #[test]
    fn allocates_contiguous_ranges_above_the_floor() {
        let mut state = TimeLockState::default();
        assert_eq!(
            state.apply(&Command::Allocate { count: 3 }),
            Response::Allocated(TimestampRange::inclusive(1, 3))
        );
        assert_eq!(
            state.apply(&Command::Allocate { count: 1 }),
            Response::Allocated(TimestampRange::inclusive(4, 4))
        );
        assert_eq!(state.floor(), 4);
    }

    #[test]
    fn zero_sized_grants_are_refused() {
        let mut state = TimeLockState::default();
        assert_eq!(state.apply(&Command::Allocate { count: 0 }), Response::Exhausted);
        assert_eq!(state.floor(), 0);
        let Response::Allocated(range) = state.apply(&Command::Allocate { count: 2 }) else {
            panic!("expected a grant");
        };
        assert_eq!((range.len(), range.is_empty()), (2, false));
    }

    #[test]
    fn refuses_to_wrap_around() {
        let mut state = TimeLockState::default();
        state.apply(&Command::FastForward { minimum: u64::MAX });
        assert_eq!(state.apply(&Command::Allocate { count: 1 }), Response::Exhausted);
        assert_eq!(state.floor(), u64::MAX);
    }

    #[test]
    fn fast_forward_never_lowers_the_floor() {
        let mut state = TimeLockState::default();
        assert_eq!(
            state.apply(&Command::FastForward { minimum: 100 }),
            Response::Floor(100)
        );
        assert_eq!(
            state.apply(&Command::FastForward { minimum: 50 }),
            Response::Floor(100)
        );
    }

    #[test]
    fn grants_locks_exclusively_until_expiry() {
        let mut state = TimeLockState::default();
        let first = match state.apply(&acquire("alpha", 1, 0)) {
            Response::Granted(lease) => lease,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(first.expiry, 10);
        assert_eq!(
            state.apply(&acquire("alpha", 2, 9)),
            Response::Held { holder: 1 }
        );
        match state.apply(&acquire("alpha", 2, 10)) {
            Response::Granted(lease) => {
                assert_eq!(lease.holder, 2);
                assert_ne!(lease.token, first.token);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            state.apply(&Command::Refresh {
                token: first.token,
                now: 11,
                duration: 10
            }),
            Response::InvalidLease
        );
    }

    #[test]
    fn refresh_extends_only_live_leases() {
        let mut state = TimeLockState::default();
        let lease = match state.apply(&acquire("alpha", 1, 0)) {
            Response::Granted(lease) => lease,
            other => panic!("unexpected {other:?}"),
        };
        let refresh = |now| Command::Refresh {
            token: lease.token,
            now,
            duration: 10,
        };
        assert_eq!(state.apply(&refresh(5)), Response::Refreshed { expiry: 15 });
        assert_eq!(state.apply(&refresh(15)), Response::InvalidLease);
    }

    #[test]
    fn release_frees_the_lock_once() {
        let mut state = TimeLockState::default();
        let lease = match state.apply(&acquire("alpha", 1, 0)) {
            Response::Granted(lease) => lease,
            other => panic!("unexpected {other:?}"),
        };
        let release = Command::Release { token: lease.token };
        assert_eq!(state.apply(&release), Response::Released { was_held: true });
        assert_eq!(state.apply(&release), Response::Released { was_held: false });
        assert!(state.lease("alpha").is_none());
        assert!(matches!(
            state.apply(&acquire("alpha", 2, 1)),
            Response::Granted(_)
        ));
    }
}
