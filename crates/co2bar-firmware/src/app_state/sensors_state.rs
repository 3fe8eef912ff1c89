//! Concrete sensor adapters for the co2bar board
//!
//! The SCD41 paces the acquisition loop through its data-ready flag and
//! supplies CO2. Temperature and humidity come from the SHT40, which sits away
//! from the SCD41's heater and reads truer than the SCD41's own values. The
//! BH1750 provides ambient light for the bar brightness.

use embedded_hal_async::i2c::I2c;
use log::{error, info};

use co2bar_core::sensors::{Co2Readings, Co2Sensor, LightSensor, SensorError};

#[cfg(feature = "sensor-bh1750")]
use bh1750_embedded::{Address, Resolution, r#async::Bh1750Async};
#[cfg(feature = "sensor-scd41")]
use scd41_embedded::r#async::Scd41Async;
#[cfg(feature = "sensor-sht40")]
use sht4x::Sht4xAsync;

#[cfg(feature = "sensor-scd41")]
pub struct Scd41<I> {
    sensor: Scd41Async<I, embassy_time::Delay>,
    started: bool,
}

#[cfg(feature = "sensor-scd41")]
impl<I: I2c> Scd41<I> {
    pub fn new(i2c: I) -> Self {
        Self {
            sensor: Scd41Async::<I, embassy_time::Delay>::new(i2c, embassy_time::Delay),
            started: false,
        }
    }

    /// Enable self-calibration and start periodic (5 s) measurement.
    async fn start(&mut self) -> Result<(), SensorError> {
        // Fails harmlessly when no measurement is running.
        let _ = self.sensor.stop_periodic_measurement().await;

        self.sensor
            .set_automatic_self_calibration(true)
            .await
            .map_err(|e| {
                error!("SCD41 set_automatic_self_calibration failed: {:?}", e);
                SensorError::InitializationFailed {
                    sensor: "SCD41",
                    details: "could not enable automatic self-calibration",
                }
            })?;

        self.sensor.start_periodic_measurement().await.map_err(|e| {
            error!("SCD41 start_periodic_measurement failed: {:?}", e);
            SensorError::InitializationFailed {
                sensor: "SCD41",
                details: "could not start periodic measurement",
            }
        })?;

        self.started = true;
        info!("SCD41: periodic measurement started");
        Ok(())
    }

    async fn data_ready(&mut self) -> Result<bool, SensorError> {
        if !self.started {
            self.start().await?;
        }
        self.sensor.data_ready().await.map_err(|e| {
            error!("SCD41 data_ready failed: {:?}", e);
            SensorError::BusFault {
                sensor: "SCD41",
                operation: "data_ready",
            }
        })
    }

    async fn co2_ppm(&mut self) -> Result<f32, SensorError> {
        let measurement = self.sensor.measurement().await.map_err(|e| {
            error!("SCD41 measurement failed: {:?}", e);
            SensorError::BusFault {
                sensor: "SCD41",
                operation: "measurement",
            }
        })?;
        Ok(measurement.co2_ppm as f32)
    }
}

#[cfg(feature = "sensor-sht40")]
pub struct Sht40<I> {
    sensor: Sht4xAsync<I, embassy_time::Delay>,
}

#[cfg(feature = "sensor-sht40")]
impl<I: I2c> Sht40<I> {
    pub fn new(i2c: I) -> Self {
        Self {
            sensor: Sht4xAsync::<I, embassy_time::Delay>::new(i2c),
        }
    }

    /// Temperature in °C and relative humidity in %.
    async fn measure(&mut self) -> Result<(f32, f32), SensorError> {
        let measurement = self
            .sensor
            .measure(sht4x::Precision::High, &mut embassy_time::Delay)
            .await
            .map_err(|e| {
                error!("SHT40 measurement failed: {:?}", e);
                SensorError::BusFault {
                    sensor: "SHT40",
                    operation: "measure temperature/humidity",
                }
            })?;

        Ok((
            measurement.temperature_celsius().to_num::<f32>(),
            measurement.humidity_percent().to_num::<f32>(),
        ))
    }
}

/// SCD41 CO2 paired with SHT40 temperature/humidity
#[cfg(all(feature = "sensor-scd41", feature = "sensor-sht40"))]
pub struct AirSensor<I> {
    scd41: Scd41<I>,
    sht40: Sht40<I>,
}

#[cfg(all(feature = "sensor-scd41", feature = "sensor-sht40"))]
impl<I: I2c> AirSensor<I> {
    pub fn new(scd41: I, sht40: I) -> Self {
        Self {
            scd41: Scd41::new(scd41),
            sht40: Sht40::new(sht40),
        }
    }
}

#[cfg(all(feature = "sensor-scd41", feature = "sensor-sht40"))]
impl<I: I2c> Co2Sensor for AirSensor<I> {
    async fn data_ready(&mut self) -> Result<bool, SensorError> {
        self.scd41.data_ready().await
    }

    async fn read_measurement(&mut self) -> Result<Co2Readings, SensorError> {
        let co2_ppm = self.scd41.co2_ppm().await?;
        let (temperature_c, humidity_pct) = self.sht40.measure().await?;
        Ok(Co2Readings {
            co2_ppm,
            temperature_c,
            humidity_pct,
        })
    }
}

#[cfg(feature = "sensor-bh1750")]
pub struct AmbientLight<I> {
    sensor: Bh1750Async<I, embassy_time::Delay>,
}

#[cfg(feature = "sensor-bh1750")]
impl<I: I2c> AmbientLight<I> {
    pub fn new(i2c: I) -> Self {
        Self {
            sensor: Bh1750Async::<I, embassy_time::Delay>::new(
                i2c,
                embassy_time::Delay,
                Address::Low,
            ),
        }
    }
}

#[cfg(feature = "sensor-bh1750")]
impl<I: I2c> LightSensor for AmbientLight<I> {
    async fn read_lux(&mut self) -> Result<f32, SensorError> {
        self.sensor
            .one_time_measurement(Resolution::High)
            .await
            .map_err(|e| {
                error!("BH1750 one_time_measurement failed: {:?}", e);
                SensorError::BusFault {
                    sensor: "BH1750",
                    operation: "one_time_measurement",
                }
            })
    }
}

/// Stand-in when the BH1750 is compiled out: the bar keeps its default
/// brightness.
#[cfg(not(feature = "sensor-bh1750"))]
pub struct AmbientLight<I> {
    _i2c: I,
}

#[cfg(not(feature = "sensor-bh1750"))]
impl<I> AmbientLight<I> {
    pub fn new(i2c: I) -> Self {
        Self { _i2c: i2c }
    }
}

#[cfg(not(feature = "sensor-bh1750"))]
impl<I> LightSensor for AmbientLight<I> {
    async fn read_lux(&mut self) -> Result<f32, SensorError> {
        Err(SensorError::InitializationFailed {
            sensor: "BH1750",
            details: "disabled at build time",
        })
    }
}
