//! Step definitions for the behavioural test suites.

pub mod cli_steps;
pub mod dispatch_steps;
pub mod listener_steps;

pub use cli_steps::CliWorld;
pub use dispatch_steps::DispatchWorld;
pub use listener_steps::ListenerWorld;
