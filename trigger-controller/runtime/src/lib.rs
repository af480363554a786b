#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use gateway_trigger_core as core;
pub use gateway_trigger_generator as generator;
pub use gateway_trigger_k8s_api as k8s;
pub use gateway_trigger_k8s_index as index;
pub use gateway_trigger_scheduler as scheduler;

mod args;
mod sink;
mod watch;

pub use self::args::Args;

/// The dispatch table shared by every watch task.
type SharedDispatch = std::sync::Arc<parking_lot::RwLock<index::Dispatch<scheduler::Handle>>>;
