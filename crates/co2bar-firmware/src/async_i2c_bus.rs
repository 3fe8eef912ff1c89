//! Shared async I2C bus
//!
//! The SCD41, SHT40 and BH1750 sit on one I2C bus. Each driver gets its own
//! [`AsyncI2cDevice`] handle; a transaction holds the bus mutex across its
//! await points so transfers from different tasks never interleave.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_async::i2c::{ErrorType, I2c, Operation, SevenBitAddress};

pub type I2cBus<T> = Mutex<CriticalSectionRawMutex, T>;

pub struct AsyncI2cDevice<'a, T> {
    bus: &'a I2cBus<T>,
}

impl<'a, T> AsyncI2cDevice<'a, T> {
    pub const fn new(bus: &'a I2cBus<T>) -> Self {
        Self { bus }
    }
}

impl<T: ErrorType> ErrorType for AsyncI2cDevice<'_, T> {
    type Error = T::Error;
}

// read/write/write_read use the trait's defaults, which go through
// `transaction`, so a single lock covers every operation.
impl<T: I2c> I2c<SevenBitAddress> for AsyncI2cDevice<'_, T> {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.bus.lock().await.transaction(address, operations).await
    }
}
