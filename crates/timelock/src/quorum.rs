//! An in-process replicated log that commits a command only once a majority of replicas can
//! apply it. Replicas can be partitioned away and healed to exercise the oracle's behaviour
//! under faults without a network.

use {
    crate::{Consensus, ConsensusError, StateMachine},
    std::{
        sync::{Mutex, MutexGuard, PoisonError},
        thread,
        time::Duration,
    },
    tracing::{debug, info, warn},
};

struct Replica<S> {
    reachable: bool,
    state: S,
    /// Count of committed log entries applied to `state`.
    applied: usize,
}

struct Log<S: StateMachine> {
    /// Log index of `entries[0]`. Earlier entries were compacted away.
    offset: usize,
    entries: Vec<S::Command>,
    replicas: Vec<Replica<S>>,
}

impl<S: StateMachine> Log<S> {
    fn committed(&self) -> usize {
        self.offset + self.entries.len()
    }

    fn reachable(&self) -> usize {
        self.replicas.iter().filter(|r| r.reachable).count()
    }

    /// Applies every committed entry the replica has not seen yet, returning the response to
    /// the last one applied.
    fn catch_up(&mut self, index: usize) -> Option<S::Response> {
        let replica = &mut self.replicas[index];
        let mut response = None;
        while replica.applied < self.offset + self.entries.len() {
            let entry = &self.entries[replica.applied - self.offset];
            response = Some(replica.state.apply(entry));
            replica.applied += 1;
        }
        response
    }
}

pub struct QuorumLog<S: StateMachine> {
    log: Mutex<Log<S>>,
    max_attempts: usize,
    retry_backoff: Duration,
}

impl<S> QuorumLog<S>
where
    S: StateMachine + Clone,
{
    /// Creates a log with `replicas` copies of `initial`, all reachable.
    pub fn new(replicas: usize, initial: S) -> Self {
        assert!(replicas > 0, "a log needs at least one replica");
        QuorumLog {
            log: Mutex::new(Log {
                offset: 0,
                entries: Vec::new(),
                replicas: (0..replicas)
                    .map(|_| Replica {
                        reachable: true,
                        state: initial.clone(),
                        applied: 0,
                    })
                    .collect(),
            }),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(50),
        }
    }

    /// How many times `propose` looks for a quorum before giving up.
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Pause between attempts to find a quorum.
    pub fn retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }
}

impl<S: StateMachine> QuorumLog<S> {
    fn lock(&self) -> MutexGuard<'_, Log<S>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn replica_count(&self) -> usize {
        self.lock().replicas.len()
    }

    pub fn quorum(&self) -> usize {
        self.replica_count() / 2 + 1
    }

    /// Number of commands committed over the log's lifetime, including compacted ones.
    pub fn committed(&self) -> usize {
        self.lock().committed()
    }

    /// Cuts `replica` off from the rest of the cluster.
    pub fn partition(&self, replica: usize) {
        self.lock().replicas[replica].reachable = false;
        info!(replica, "Replica partitioned.");
    }

    /// Reconnects `replica`. It catches up lazily on the next commit or
    /// [`sync_replica`](Self::sync_replica).
    pub fn heal(&self, replica: usize) {
        self.lock().replicas[replica].reachable = true;
        info!(replica, "Replica healed.");
    }

    /// Brings a reachable replica up to date with the committed log.
    pub fn sync_replica(&self, replica: usize) -> Result<usize, ConsensusError> {
        let mut log = self.lock();
        if !log.replicas[replica].reachable {
            return Err(ConsensusError::Unreachable(replica));
        }
        let before = log.replicas[replica].applied;
        log.catch_up(replica);
        let applied = log.replicas[replica].applied - before;
        debug!(replica, applied, "Replica synced.");
        Ok(applied)
    }

    /// Drops log entries that every replica has applied. Returns how many were dropped.
    pub fn compact(&self) -> usize {
        let mut log = self.lock();
        let applied_everywhere = log
            .replicas
            .iter()
            .map(|r| r.applied)
            .min()
            .unwrap_or(log.offset);
        let dropped = applied_everywhere - log.offset;
        let retained = log.entries.split_off(dropped);
        log.entries = retained;
        log.offset = applied_everywhere;
        debug!(dropped, offset = log.offset, "Log compacted.");
        dropped
    }

    /// Runs `f` against the state of `replica` as of its last applied entry.
    pub fn inspect<R>(&self, replica: usize, f: impl FnOnce(&S) -> R) -> R {
        f(&self.lock().replicas[replica].state)
    }
}

impl<S> Consensus<S> for QuorumLog<S>
where
    S: StateMachine + Send,
    S::Command: Send,
{
    fn propose(&self, command: S::Command) -> Result<S::Response, ConsensusError> {
        let mut command = Some(command);
        let mut reachable = 0;
        let mut required = 0;
        for attempt in 1..=self.max_attempts {
            {
                let mut log = self.lock();
                reachable = log.reachable();
                required = log.replicas.len() / 2 + 1;
                if reachable >= required {
                    if let Some(command) = command.take() {
                        log.entries.push(command);
                    }
                    let mut committed = None;
                    for index in 0..log.replicas.len() {
                        if log.replicas[index].reachable {
                            let response = log.catch_up(index);
                            committed = committed.or(response);
                        }
                    }
                    debug!(index = log.committed(), reachable, "Committed.");
                    if let Some(response) = committed {
                        return Ok(response);
                    }
                }
            }
            warn!(attempt, reachable, required, "No quorum reachable.");
            if attempt < self.max_attempts {
                thread::sleep(self.retry_backoff);
            }
        }
        Err(ConsensusError::NoQuorum {
            reachable,
            required,
            attempts: self.max_attempts,
        })
    }
}
