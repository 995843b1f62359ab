//! Child processes launched from the console.

mod registry;
mod runner;

pub use registry::{ChildId, Foreground, KillSignal, ProcessRegistry};
pub use runner::{ProcessRunner, SPAWN_FAILED};
