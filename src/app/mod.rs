//! App layer - central state management and command processing
//!
//! The App actor receives app events and network responses,
//! updates state, and emits network commands and view state.

pub mod state;
pub mod actor;
pub mod commands;

pub use state::{AppState, EndpointView};
pub use actor::AppActor;
