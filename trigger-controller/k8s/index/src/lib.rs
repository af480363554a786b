//! Gateway Trigger Index
//!
//! Decides which watch events may change the configuration emitted for the
//! controller's gateways, so that the generator only reruns when it has to.
//!
//! - The [`store::Store`] holds the last observed projection of every watched
//!   object.
//! - The [`reference`] index records which objects the last generation
//!   referred to, attributed to the owner (gateway, route, policy, filter)
//!   that pulled each one in. It is written only by the scheduler.
//! - The [`oracle`] answers effectiveness questions from one index snapshot
//!   and the store.
//! - [`dispatch`] runs each event through the rule its kind is registered
//!   with and marks the scheduler dirty on a `true` verdict.
//!
//! ```text
//! [ watch ] -> [ Dispatch ] -> [ Store ]
//!                  |  ^
//!          dirty   |  | oracle
//!                  v  |
//!            [ Scheduler ] -> commit -> [ reference index ]
//! ```

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod dispatch;
pub mod metrics;
pub mod oracle;
pub mod reference;
pub mod store;

pub use self::{
    dispatch::{verdict, DirtySignal, Dispatch, Event},
    metrics::DispatchMetrics,
    oracle::{EffectivenessOracle, Oracle, OracleConfig, View},
    reference::{
        pair, Delta, IndexCommitter, IndexUnderflow, Reader, References, Snapshot, Writer,
    },
    store::{Objects, Store},
};
