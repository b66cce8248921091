#![deny(unsafe_code)]

//! WakeTheDrive (`wtd`): keeps an external or network drive from spinning down
//! or unmounting by rewriting a small heartbeat file on it at a fixed interval.
//!
//! Every pulse overwrites the file and forces it to the device with the
//! strongest flush the platform offers. While pulsing, the tool also asks the
//! OS not to idle-sleep. On stop the heartbeat file is deleted and the sleep
//! request released.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use wake_the_drive::prelude::*;
//!
//! let config = LoopConfig::new(5, "/mnt/backup/WakeTheDrive.heartbeat.txt")?;
//! let handle = PulseLoop::new(config).start()?;
//! // ...
//! let summary = handle.stop_and_join()?;
//! println!("{}", summary.status_line());
//! # Ok::<(), WtdError>(())
//! ```

pub mod prelude;

pub mod core;
pub mod daemon;
pub mod heartbeat;
pub mod logger;
pub mod platform;
