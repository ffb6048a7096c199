//! Sandbox lifecycle manager: one Docker container per operative, reconciled
//! against the operative store, reachable over a newline-delimited JSON wire
//! protocol for cell execution.

pub mod delegate;
pub mod manager;
pub mod state;
pub mod wire;

pub use delegate::RunCellDelegate;
pub use manager::SandboxManager;
pub use state::{ContainerCache, ContainerInfo, SandboxState};
pub use wire::{CellOutcome, HostMessage, SandboxMessage};
