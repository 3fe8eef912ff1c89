//! Sensor traits and the sensor reader
//!
//! Concrete drivers (SCD41, SHT40, BH1750 on the device, synthetic sources in
//! the simulator) implement [`Co2Sensor`] and [`LightSensor`]. The
//! [`SensorReader`] wraps them with the data-ready polling policy so the
//! sensor manager only sees "a reading or an error".

mod plausibility;

pub use plausibility::*;

use core::future::Future;

use embassy_time::{Duration, Timer};
use log::{debug, warn};
use thiserror_no_std::Error;

use crate::config::{DATA_READY_MAX_ATTEMPTS, DATA_READY_POLL_INTERVAL};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: data not ready after {attempts} attempts")]
    NotReady {
        sensor: &'static str,
        attempts: u32,
    },
    #[error("{sensor}: bus fault during {operation}")]
    BusFault {
        sensor: &'static str,
        operation: &'static str,
    },
    #[error("{sensor}: initialization failed: {details}")]
    InitializationFailed {
        sensor: &'static str,
        details: &'static str,
    },
}

/// One CO2/temperature/humidity measurement as delivered by the sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Co2Readings {
    pub co2_ppm: f32,
    pub temperature_c: f32,
    pub humidity_pct: f32,
}

/// Sensor with an internal data-ready flag (SCD4x style).
pub trait Co2Sensor {
    /// Check the sensor's data-ready flag.
    fn data_ready(&mut self) -> impl Future<Output = Result<bool, SensorError>>;

    /// Read the measurement that the data-ready flag announced.
    fn read_measurement(&mut self) -> impl Future<Output = Result<Co2Readings, SensorError>>;
}

pub trait LightSensor {
    /// Take a single illuminance measurement in lux.
    fn read_lux(&mut self) -> impl Future<Output = Result<f32, SensorError>>;
}

/// Bounded retry loop used while waiting for the data-ready flag.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DATA_READY_POLL_INTERVAL,
            max_attempts: DATA_READY_MAX_ATTEMPTS,
        }
    }
}

pub struct SensorReader<C, L> {
    co2: C,
    light: L,
    policy: PollPolicy,
}

impl<C: Co2Sensor, L: LightSensor> SensorReader<C, L> {
    pub fn new(co2: C, light: L) -> Self {
        Self::with_policy(co2, light, PollPolicy::default())
    }

    pub fn with_policy(co2: C, light: L, policy: PollPolicy) -> Self {
        Self { co2, light, policy }
    }

    /// Wait for the next CO2 measurement.
    ///
    /// Polls the data-ready flag every `policy.interval` until it is set or
    /// `policy.max_attempts` checks have failed. A bus error on any check ends
    /// the wait immediately.
    pub async fn poll_co2(&mut self) -> Result<Co2Readings, SensorError> {
        for attempt in 0..self.policy.max_attempts {
            if self.co2.data_ready().await? {
                debug!("CO2 data ready after {} checks", attempt + 1);
                return self.co2.read_measurement().await;
            }
            Timer::after(self.policy.interval).await;
        }

        warn!(
            "CO2 data not ready after {} checks",
            self.policy.max_attempts
        );
        Err(SensorError::NotReady {
            sensor: "CO2",
            attempts: self.policy.max_attempts,
        })
    }

    pub async fn read_illuminance(&mut self) -> Result<f32, SensorError> {
        self.light.read_lux().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    struct ScriptedCo2 {
        not_ready_checks: u32,
        fail_probe: bool,
        checks: u32,
    }

    impl Co2Sensor for ScriptedCo2 {
        async fn data_ready(&mut self) -> Result<bool, SensorError> {
            self.checks += 1;
            if self.fail_probe {
                return Err(SensorError::BusFault {
                    sensor: "test",
                    operation: "data_ready",
                });
            }
            Ok(self.checks > self.not_ready_checks)
        }

        async fn read_measurement(&mut self) -> Result<Co2Readings, SensorError> {
            Ok(Co2Readings {
                co2_ppm: 612.0,
                temperature_c: 21.5,
                humidity_pct: 44.0,
            })
        }
    }

    struct FixedLux(f32);

    impl LightSensor for FixedLux {
        async fn read_lux(&mut self) -> Result<f32, SensorError> {
            Ok(self.0)
        }
    }

    fn fast_policy(max_attempts: u32) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(1),
            max_attempts,
        }
    }

    #[test]
    fn test_poll_co2_waits_for_data_ready() {
        let co2 = ScriptedCo2 {
            not_ready_checks: 3,
            fail_probe: false,
            checks: 0,
        };
        let mut reader = SensorReader::with_policy(co2, FixedLux(10.0), fast_policy(10));

        let readings = block_on(reader.poll_co2()).unwrap();
        assert_eq!(readings.co2_ppm, 612.0);
        assert_eq!(reader.co2.checks, 4);
    }

    #[test]
    fn test_poll_co2_gives_up_after_budget() {
        let co2 = ScriptedCo2 {
            not_ready_checks: u32::MAX,
            fail_probe: false,
            checks: 0,
        };
        let mut reader = SensorReader::with_policy(co2, FixedLux(10.0), fast_policy(5));

        let err = block_on(reader.poll_co2()).unwrap_err();
        assert_eq!(
            err,
            SensorError::NotReady {
                sensor: "CO2",
                attempts: 5
            }
        );
        assert_eq!(reader.co2.checks, 5);
    }

    #[test]
    fn test_poll_co2_stops_on_bus_fault() {
        let co2 = ScriptedCo2 {
            not_ready_checks: 0,
            fail_probe: true,
            checks: 0,
        };
        let mut reader = SensorReader::with_policy(co2, FixedLux(10.0), fast_policy(5));

        let err = block_on(reader.poll_co2()).unwrap_err();
        assert!(matches!(err, SensorError::BusFault { .. }));
        assert_eq!(reader.co2.checks, 1);
    }

    #[test]
    fn test_read_illuminance_passes_through() {
        let co2 = ScriptedCo2 {
            not_ready_checks: 0,
            fail_probe: false,
            checks: 0,
        };
        let mut reader = SensorReader::new(co2, FixedLux(321.0));
        assert_eq!(block_on(reader.read_illuminance()).unwrap(), 321.0);
    }
}
