//! Optional JSONL activity log fed from a dedicated logger thread.

pub mod activity;
pub mod jsonl;
