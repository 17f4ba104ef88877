//! Target side: HTTP responder with a tunable termination protocol

pub mod conn;
pub mod responder;
pub mod state;

pub use responder::{Responder, TargetError};
pub use state::{InFlightGuard, Phase, ShutdownState};
