// crates/cip-rs/src/connection/watchdog.rs
//! Inactivity watchdog and production timers of a single connection.
//!
//! All times are microseconds. Timers only count down; the watchdog is
//! reloaded exclusively by [`CipConnection::reset_watchdog`].

use super::conn::CipConnection;
use super::params::ProductionTrigger;

impl CipConnection {
    /// Reloads the inactivity watchdog after valid traffic.
    pub fn reset_watchdog(&mut self) {
        self.watchdog_remaining_us = self.inactivity_timeout_us;
    }

    /// Advances the watchdog by `elapsed_us`. Returns true once it has expired.
    pub fn advance_watchdog(&mut self, elapsed_us: u64) -> bool {
        self.watchdog_remaining_us = self.watchdog_remaining_us.saturating_sub(elapsed_us);
        self.watchdog_remaining_us == 0
    }

    /// Advances the production timers and reports whether a T->O packet is
    /// due. Explicit connections never produce on their own.
    pub fn advance_production(&mut self, elapsed_us: u64) -> bool {
        if !self.kind.is_io() {
            return false;
        }
        self.inhibit_remaining_us = self.inhibit_remaining_us.saturating_sub(elapsed_us);
        self.production_remaining_us = self.production_remaining_us.saturating_sub(elapsed_us);

        let heartbeat_due = match self.transport.trigger {
            ProductionTrigger::Cyclic | ProductionTrigger::ChangeOfState => {
                self.production_remaining_us == 0
            }
            _ => false,
        };
        let triggered = self.production_pending && self.inhibit_remaining_us == 0;
        heartbeat_due || triggered
    }

    /// Marks the connection's produced data as changed. Returns true if the
    /// production inhibit time allows sending immediately.
    pub fn request_production(&mut self) -> bool {
        if !self.kind.is_io() || self.transport.trigger == ProductionTrigger::Cyclic {
            return false;
        }
        self.production_pending = true;
        self.inhibit_remaining_us == 0
    }

    /// Reloads the production timers after a packet was produced.
    pub fn mark_produced(&mut self) {
        self.production_pending = false;
        self.production_remaining_us = self.t_to_o_rpi_us;
        self.inhibit_remaining_us = self.inhibit_time_us;
    }
}
