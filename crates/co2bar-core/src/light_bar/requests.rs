//! Mode requests for the light bar
//!
//! Pulses and final modes travel in separate slots. A pulse is only worth
//! showing if it is still fresh, so the newest one wins. A final mode must
//! never be lost: a pending request is only replaced by one of equal or higher
//! rank (`SelfTest < Error < Off`), and a pulse can never displace it.

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::latest::LatestValue;

use super::{ModeRequest, PulseKind};

pub struct ModeRequests {
    pulse: LatestValue<PulseKind>,
    pending: Mutex<CriticalSectionRawMutex, Cell<Option<ModeRequest>>>,
}

impl ModeRequests {
    pub const fn new() -> Self {
        Self {
            pulse: LatestValue::new(),
            pending: Mutex::new(Cell::new(None)),
        }
    }

    pub fn publish(&self, request: ModeRequest) {
        match request {
            ModeRequest::Pulse(kind) => self.pulse.publish(kind),
            _ => self.pending.lock(|slot| {
                let keep = slot.get().is_some_and(|pending| pending.rank() > request.rank());
                if !keep {
                    slot.set(Some(request));
                }
            }),
        }
    }

    pub fn take_pulse(&self) -> Option<PulseKind> {
        self.pulse.take()
    }

    /// Take the pending `SelfTest`, `Error` or `Off` request.
    pub fn take_final(&self) -> Option<ModeRequest> {
        self.pending.lock(|slot| slot.take())
    }

    /// Take the most important pending request: a final mode before a pulse.
    pub fn take(&self) -> Option<ModeRequest> {
        self.take_final().or_else(|| self.take_pulse().map(ModeRequest::Pulse))
    }
}

impl Default for ModeRequests {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pulse_does_not_replace_pending_off() {
        let requests = ModeRequests::new();
        requests.publish(ModeRequest::Off);
        requests.publish(ModeRequest::Pulse(PulseKind::ClientConnected));

        assert_eq!(requests.take_final(), Some(ModeRequest::Off));
        assert_eq!(requests.take_pulse(), Some(PulseKind::ClientConnected));
    }

    #[test]
    fn test_lower_rank_does_not_replace_pending_request() {
        let requests = ModeRequests::new();
        requests.publish(ModeRequest::Error);
        requests.publish(ModeRequest::SelfTest);
        assert_eq!(requests.take_final(), Some(ModeRequest::Error));

        requests.publish(ModeRequest::SelfTest);
        requests.publish(ModeRequest::Off);
        assert_eq!(requests.take_final(), Some(ModeRequest::Off));
        assert_eq!(requests.take_final(), None);
    }

    #[test]
    fn test_newest_pulse_wins() {
        let requests = ModeRequests::new();
        requests.publish(ModeRequest::Pulse(PulseKind::ClientConnected));
        requests.publish(ModeRequest::Pulse(PulseKind::TimeSynced));
        assert_eq!(requests.take(), Some(ModeRequest::Pulse(PulseKind::TimeSynced)));
        assert_eq!(requests.take(), None);
    }
}
