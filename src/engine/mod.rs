mod context;
mod events;
mod gate;
mod launcher;
mod runner;

pub use events::spawn_event_logger;
pub use gate::{AutoGate, SharedGate, StdinGate};
pub use launcher::launcher_for;
pub use runner::{SequenceRunner, SharedExecutor};

#[cfg(test)]
pub(crate) use runner::Executor;
