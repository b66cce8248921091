//! Route termination signals onto a loop's stop flag.
//!
//! SIGINT and SIGTERM (plus SIGHUP on Unix, sent when the controlling terminal
//! goes away) set the flag. The pulse loop polls it every tick and runs its
//! normal cleanup, so the heartbeat file is removed before the process exits.

#![allow(missing_docs)]

use signal_hook::SigId;
use signal_hook::consts::{SIGINT, SIGTERM};

use crate::daemon::pulse_loop::StopSignal;

/// Registered signal hooks. Dropping this leaves them installed; call
/// [`SignalRegistration::unregister`] to remove them.
#[derive(Debug, Default)]
pub struct SignalRegistration {
    ids: Vec<(&'static str, SigId)>,
}

impl SignalRegistration {
    /// Names of the signals that were hooked.
    pub fn signals(&self) -> Vec<&'static str> {
        self.ids.iter().map(|(name, _)| *name).collect()
    }

    pub fn unregister(self) {
        for (_, id) in self.ids {
            signal_hook::low_level::unregister(id);
        }
    }
}

/// Hook termination signals to `stop`. Best-effort: failures are logged.
pub fn install(stop: &StopSignal) -> SignalRegistration {
    let mut registration = SignalRegistration::default();
    let mut hook = |name: &'static str, signal: i32| {
        match signal_hook::flag::register(signal, stop.flag()) {
            Ok(id) => registration.ids.push((name, id)),
            Err(e) => eprintln!("[WTD-SIGNAL] failed to register {name}: {e}"),
        }
    };

    hook("SIGINT", SIGINT);
    hook("SIGTERM", SIGTERM);
    #[cfg(unix)]
    {
        hook("SIGHUP", signal_hook::consts::SIGHUP);
    }

    registration
}
