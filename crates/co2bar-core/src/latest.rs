//! Single-slot "latest value" channel
//!
//! Unlike a FIFO [`Channel`](embassy_sync::channel::Channel), publishing into a
//! [`LatestValue`] replaces whatever is still waiting in the slot. Readers only
//! ever observe the most recent value, and a value that is overwritten before
//! it is read is dropped. This is the contract the LED renderer relies on: a
//! live display only cares about the newest physical reading.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

pub struct LatestValue<T> {
    slot: Signal<CriticalSectionRawMutex, T>,
}

impl<T: Send> LatestValue<T> {
    pub const fn new() -> Self {
        Self {
            slot: Signal::new(),
        }
    }

    /// Store `value`, overwriting any value not yet taken.
    pub fn publish(&self, value: T) {
        self.slot.signal(value);
    }

    /// Take the pending value without waiting, leaving the slot empty.
    pub fn take(&self) -> Option<T> {
        self.slot.try_take()
    }

    /// Wait until a value is published and take it.
    pub async fn wait(&self) -> T {
        self.slot.wait().await
    }

    /// Whether a value is waiting to be taken.
    pub fn is_pending(&self) -> bool {
        self.slot.signaled()
    }
}

impl<T: Send> Default for LatestValue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_on_empty_slot_returns_none() {
        let slot: LatestValue<u16> = LatestValue::new();
        assert!(!slot.is_pending());
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn test_publish_overwrites_unread_value() {
        let slot = LatestValue::new();
        slot.publish(100u16);
        slot.publish(250u16);
        assert!(slot.is_pending());
        assert_eq!(slot.take(), Some(250));
    }

    #[test]
    fn test_take_empties_slot() {
        let slot = LatestValue::new();
        slot.publish(7u8);
        assert_eq!(slot.take(), Some(7));
        assert_eq!(slot.take(), None);
        assert!(!slot.is_pending());
    }

    #[test]
    fn test_wait_returns_published_value() {
        let slot = LatestValue::new();
        slot.publish(42u32);
        let value = embassy_futures::block_on(slot.wait());
        assert_eq!(value, 42);
        assert_eq!(slot.take(), None);
    }
}
