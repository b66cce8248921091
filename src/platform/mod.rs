//! Platform capabilities behind traits, one implementation per host chosen by
//! the `detect_*` functions.

pub mod flush;
pub mod opener;
pub mod sleep_guard;
pub mod volume;
