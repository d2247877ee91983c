//! Timelock Checker audits the recorded history of a Timelock test run: the timestamp half for
//! ordering, uniqueness and liveness under faults, and the lock half for mutual exclusion,
//! isolated-process behaviour and lease refresh.
//!
//! # Example
//!
//! ```rust
//! use timelock_checker::*;
//! use timelock_core::{Event, EventHistory, Function};
//!
//! let history = EventHistory::new(vec![
//!     Event::invoke(0, Function::GetTimestamp, (), 1),
//!     Event::ok(0, Function::GetTimestamp, 7, 2),
//!     Event::invoke(1, Function::GetTimestamp, (), 3),
//!     Event::ok(1, Function::GetTimestamp, 5, 4),
//! ])
//! .unwrap();
//!
//! let result = CheckerSet::timestamp(&CheckerConfig::default())
//!     .check(&history)
//!     .unwrap();
//! assert!(!result.valid);
//! assert_evidence![
//!     result.errors,
//!     ":0 ok get-timestamp 7@2 → :1 ok get-timestamp 5@4",
//! ];
//! ```
//!
//! Set the `TIMELOCK_DEBUG` environment variable to print the evidence of every failing run.

#![deny(unused_must_use)]
#![warn(rust_2018_idioms, unreachable_pub)]

mod checker;
mod checker_set;
mod isolation;
mod locks;
mod mutual_exclusion;
mod refresh;
mod timestamp;

/// Asserts that checker evidence renders to exactly the given lines, in order.
///
/// On a mismatch the rendered evidence is printed as string literals that can be pasted back
/// into the assertion.
#[macro_export]
macro_rules! assert_evidence {
    [$evidence:expr $(, $line:expr)* $(,)?] => {{
        let actual: Vec<String> = $evidence.iter().map(|e| e.to_string()).collect();
        let expected: Vec<&str> = vec![$($line),*];
        if actual != expected {
            println!("Evidence found:");
            for line in &actual {
                println!("{line:?},");
            }
            panic!(
                "evidence mismatch: expected {} lines, found {}",
                expected.len(),
                actual.len()
            );
        }
    }};
}

pub use checker::{CheckError, CheckResult, Checker, Evidence};

pub use checker_set::{CheckerConfig, CheckerSet};

pub use isolation::IsolatedProcessChecker;

pub use mutual_exclusion::MutualExclusionChecker;

pub use refresh::RefreshChecker;

pub use timestamp::TimestampChecker;
