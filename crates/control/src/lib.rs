//! The control loop: per-operative scheduling, the single-step algorithm,
//! and tool dispatch for the seven tools exposed to an operative's model.

pub mod cancel;
pub mod delegate;
pub mod dispatch;
pub mod scheduler;
pub mod step;
pub mod tools;

pub use cancel::{CancelMap, CancelToken};
pub use delegate::ControlDelegate;
pub use dispatch::Dispatcher;
pub use scheduler::Scheduler;
pub use step::{run_step, ControlContext};
