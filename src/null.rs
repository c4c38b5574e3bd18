//! A backend that watches nothing and never produces events.
//!
//! Grounded on `notify::null::NullWatcher`: a stand-in for platforms with
//! no working backend, and a deterministic choice for tests that only care
//! about [`crate::observer::Observer`] bookkeeping rather than real
//! filesystem activity.

use crate::bus::Bus;
use crate::config::Config;
use crate::emitter::{Emitter, StopFlag};
use crate::error::Result;
use crate::watch::Watch;

/// An emitter that starts successfully and never publishes anything.
pub struct NullEmitter {
    stop: StopFlag,
}

impl Emitter for NullEmitter {
    fn start(_watch: Watch, _bus: Bus, _config: Config) -> Result<Self> {
        Ok(NullEmitter {
            stop: StopFlag::new(),
        })
    }

    fn stop(&mut self) {
        self.stop.signal();
    }
}
