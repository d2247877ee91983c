use {
    crate::{
        Clock, Command, Consensus, ConsensusError, LeaseToken, Response, SystemClock,
        TimeLockState, TimestampRange,
    },
    std::{sync::Arc, time::Duration},
    thiserror::Error,
    tracing::{debug, warn},
};

/// The largest range a single `get_fresh_timestamps` call may request by default.
pub const MAX_GRANT_SIZE: u64 = 10_000;

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum OracleError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("lock {lock:?} is held by process {holder}")]
    LockHeld { lock: String, holder: u64 },
    #[error("{0} is not the live lease of any lock")]
    InvalidLease(LeaseToken),
    #[error("timestamp space exhausted")]
    Exhausted,
    #[error("oracle unavailable: {0}")]
    Unavailable(#[from] ConsensusError),
}

#[derive(Clone, Debug)]
pub struct OracleConfig {
    max_grant_size: u64,
    lease_duration: Duration,
    clock: Arc<dyn Clock>,
}

impl OracleConfig {
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn lease_duration(mut self, lease_duration: Duration) -> Self {
        self.lease_duration = lease_duration;
        self
    }

    pub fn max_grant_size(mut self, max_grant_size: u64) -> Self {
        self.max_grant_size = max_grant_size;
        self
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        OracleConfig {
            max_grant_size: MAX_GRANT_SIZE,
            lease_duration: Duration::from_secs(10),
            clock: Arc::new(SystemClock),
        }
    }
}

/// Hands out strictly increasing timestamps and exclusive lock leases.
///
/// Every operation, reads included, is a command committed through the consensus log `L`, so
/// the log's commit order is the single total order in which allocations, fast-forwards and
/// lock transitions take effect. The oracle itself holds no state and can be shared freely
/// between threads.
pub struct TimestampLockOracle<L> {
    config: OracleConfig,
    log: L,
}

impl<L> TimestampLockOracle<L>
where
    L: Consensus<TimeLockState>,
{
    pub fn new(log: L, config: OracleConfig) -> Self {
        TimestampLockOracle { config, log }
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    fn commit(&self, command: Command) -> Result<Response, OracleError> {
        self.log.propose(command).map_err(|err| {
            warn!(%err, "Oracle command not committed.");
            OracleError::from(err)
        })
    }

    /// Returns a timestamp greater than every timestamp returned before it.
    pub fn get_fresh_timestamp(&self) -> Result<u64, OracleError> {
        self.get_fresh_timestamps(1).map(|range| range.lower())
    }

    /// Returns `count` contiguous timestamps greater than every timestamp returned before.
    pub fn get_fresh_timestamps(&self, count: i64) -> Result<TimestampRange, OracleError> {
        if count <= 0 {
            return Err(OracleError::InvalidArgument(format!(
                "must request a positive number of timestamps, not {count}"
            )));
        }
        let count = count as u64;
        if count > self.config.max_grant_size {
            return Err(OracleError::InvalidArgument(format!(
                "cannot grant {count} timestamps at once; the maximum is {}",
                self.config.max_grant_size
            )));
        }
        match self.commit(Command::Allocate { count })? {
            Response::Allocated(range) => {
                debug!(lower = range.lower(), upper = range.upper(), "Timestamps issued.");
                Ok(range)
            }
            Response::Exhausted => Err(OracleError::Exhausted),
            response => unreachable!("{response:?} does not answer an allocation"),
        }
    }

    /// Ensures no timestamp at or below `minimum` is issued from now on.
    pub fn fast_forward_timestamp(&self, minimum: u64) -> Result<(), OracleError> {
        match self.commit(Command::FastForward { minimum })? {
            Response::Floor(floor) => {
                debug!(minimum, floor, "Fast-forwarded.");
                Ok(())
            }
            response => unreachable!("{response:?} does not answer a fast-forward"),
        }
    }

    /// The last timestamp issued or fast-forwarded to.
    pub fn current_floor(&self) -> Result<u64, OracleError> {
        match self.commit(Command::ReadFloor)? {
            Response::Floor(floor) => Ok(floor),
            response => unreachable!("{response:?} does not answer a floor read"),
        }
    }

    /// Grants `lock_id` to `process` unless another live lease holds it. Never waits.
    pub fn acquire_lock(&self, lock_id: &str, process: u64) -> Result<LeaseToken, OracleError> {
        let command = Command::Acquire {
            lock: lock_id.to_string(),
            process,
            now: self.config.clock.now_millis(),
            duration: self.lease_millis(),
        };
        match self.commit(command)? {
            Response::Granted(lease) => {
                debug!(lock_id, process, token = %lease.token, expiry = lease.expiry, "Lock granted.");
                Ok(lease.token)
            }
            Response::Held { holder } => Err(OracleError::LockHeld {
                lock: lock_id.to_string(),
                holder,
            }),
            response => unreachable!("{response:?} does not answer an acquire"),
        }
    }

    /// Extends a live lease, returning its new expiry in clock milliseconds.
    pub fn refresh_lock(&self, token: LeaseToken) -> Result<u64, OracleError> {
        let command = Command::Refresh {
            token,
            now: self.config.clock.now_millis(),
            duration: self.lease_millis(),
        };
        match self.commit(command)? {
            Response::Refreshed { expiry } => Ok(expiry),
            Response::InvalidLease => Err(OracleError::InvalidLease(token)),
            response => unreachable!("{response:?} does not answer a refresh"),
        }
    }

    /// Releases the lock `token` holds. Releasing a stale token does nothing.
    pub fn release_lock(&self, token: LeaseToken) -> Result<(), OracleError> {
        match self.commit(Command::Release { token })? {
            Response::Released { was_held } => {
                debug!(%token, was_held, "Lock released.");
                Ok(())
            }
            response => unreachable!("{response:?} does not answer a release"),
        }
    }

    fn lease_millis(&self) -> u64 {
        u64::try_from(self.config.lease_duration.as_millis()).unwrap_or(u64::MAX)
    }
}
