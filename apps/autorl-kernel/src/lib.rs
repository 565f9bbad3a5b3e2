// [[AUTORL]]/apps/autorl-kernel/src/lib.rs
// Purpose: Crate root. Demo sequencer plus the kernel service hosting it.
// Architecture: Library
// Dependencies: -

pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod fleet;
pub mod models;
pub mod observability;
pub mod runtime;
pub mod screens;
pub mod security;
pub mod sequencer;
pub mod server;

pub use config::KernelConfig;
pub use error::KernelError;
pub use runtime::AutoRLRuntime;
pub use sequencer::{DemoSequencer, EventSink, Pacing};
