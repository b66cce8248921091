//! Pulse loop, its status reporting, and OS signal wiring.

pub mod pulse_loop;
#[cfg(feature = "daemon")]
pub mod signals;
pub mod status;
