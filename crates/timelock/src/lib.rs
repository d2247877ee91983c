//! Timelock is a timestamp and lock oracle for a distributed transactional database.
//!
//! The [`TimestampLockOracle`] hands out strictly increasing timestamps (singly or in
//! contiguous ranges), lets callers fast-forward the issued floor, and grants exclusive lock
//! leases. It keeps no state of its own: every operation is a [`Command`] proposed to a
//! [`Consensus`] log and applied to a replicated [`TimeLockState`]. Only committed commands
//! take effect, so an allocation that cannot reach a quorum is never returned to anyone and the
//! issued ranges stay disjoint even while replicas are partitioned away.
//!
//! # Example
//!
//! ```rust
//! use timelock::*;
//!
//! let log = QuorumLog::new(3, TimeLockState::default());
//! let oracle = TimestampLockOracle::new(log, OracleConfig::default());
//!
//! let first = oracle.get_fresh_timestamp().unwrap();
//! let range = oracle.get_fresh_timestamps(10).unwrap();
//! assert!(first < range.lower());
//!
//! // A minority partition does not stop progress...
//! oracle.log().partition(0);
//! assert!(oracle.get_fresh_timestamp().unwrap() > range.upper());
//!
//! // ...but losing the majority does.
//! let oracle = TimestampLockOracle::new(
//!     QuorumLog::new(1, TimeLockState::default()).max_attempts(1),
//!     OracleConfig::default(),
//! );
//! oracle.log().partition(0);
//! assert!(matches!(oracle.get_fresh_timestamp(), Err(OracleError::Unavailable(_))));
//! ```
//!
//! # Features
//!
//! - `rt`: Include [`ClusterTaskRunner`], which fans maintenance work out to every cluster
//!   member under a collective timeout.

#![cfg_attr(all(doc, CHANNEL_NIGHTLY), feature(doc_auto_cfg))]
#![deny(unused_must_use)]
#![warn(rust_2018_idioms, unreachable_pub)]

mod clock;
mod consensus;
#[cfg(feature = "rt")]
mod maintenance;
mod oracle;
mod quorum;
mod state_machine;

pub use clock::{Clock, ManualClock, SystemClock};
pub use consensus::{Consensus, ConsensusError, LocalLog};
#[cfg(feature = "rt")]
pub use maintenance::{ClusterTaskRunner, MaintenanceError};
pub use oracle::{OracleConfig, OracleError, TimestampLockOracle, MAX_GRANT_SIZE};
pub use quorum::QuorumLog;
pub use state_machine::{
    Command, Lease, LeaseToken, Response, StateMachine, TimeLockState, TimestampRange,
};
