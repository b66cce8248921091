//! Heartbeat file I/O.

pub mod writer;
