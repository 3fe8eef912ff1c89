//! Sensor manager: the acquisition loop that feeds every consumer
//!
//! One cycle per SCD41 measurement (~5 s):
//!
//! 1. wait for data-ready and read CO2, temperature and humidity
//! 2. reject physically implausible readings without touching any state
//! 3. update the CO2 trend and publish the light bar target (latest wins)
//! 4. smooth temperature/humidity and queue the time-series update
//! 5. queue a CSV line if the record interval has elapsed
//!
//! The first network time to arrive is copied into the backup clock once and
//! acknowledged with a green pulse.

use embassy_time::{Timer, with_timeout};
use log::{debug, info, warn};
use thiserror_no_std::Error;

use crate::clock::Clock;
use crate::config::{
    BRIGHTNESS_ALPHA, CLIMATE_ALPHA, CSV_RECORD_INTERVAL_SECONDS, DEFAULT_BRIGHTNESS,
    ERROR_BACKOFF, QUEUE_SEND_TIMEOUT,
};
use crate::latest::LatestValue;
use crate::light_bar::{LightTarget, ModeRequest, ModeRequests, PulseKind};
use crate::pipeline::{self, CsvLineQueue, SeriesQueue};
use crate::scale::{map_co2_to_position, map_lux_to_brightness};
use crate::sensors::{
    Co2Readings, Co2Sensor, Implausible, LightSensor, SensorError, SensorReader, check_plausible,
};
use crate::smoothing::{SmoothedState, TrendFilter, smooth_exponential};
use crate::storage::{CsvRecord, SeriesUpdate, enqueue_line};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    pub co2_ppm: f32,
    pub temperature_c: f32,
    pub humidity_pct: f32,
    /// Epoch seconds (seconds since boot until the clock is set)
    pub timestamp: u64,
    pub valid: bool,
}

impl SensorSample {
    pub fn new(readings: Co2Readings, timestamp: u64) -> Self {
        Self {
            co2_ppm: readings.co2_ppm,
            temperature_c: readings.temperature_c,
            humidity_pct: readings.humidity_pct,
            timestamp,
            valid: check_plausible(&readings).is_ok(),
        }
    }

    pub fn readings(&self) -> Co2Readings {
        Co2Readings {
            co2_ppm: self.co2_ppm,
            temperature_c: self.temperature_c,
            humidity_pct: self.humidity_pct,
        }
    }
}

/// Everything one accepted sample produces for the consumers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleOutput {
    pub target: LightTarget,
    pub series: SeriesUpdate,
    pub csv: Option<CsvRecord>,
    pub smoothed: SmoothedState,
}

/// Filter and scheduling state owned by the sensor manager
pub struct ManagerState {
    trend: TrendFilter,
    smoothed: Option<SmoothedState>,
    brightness: f32,
    last_csv_record: Option<u64>,
    time_set: bool,
}

impl Default for ManagerState {
    fn default() -> Self {
        Self::new()
    }
}

impl ManagerState {
    pub fn new() -> Self {
        Self {
            trend: TrendFilter::default(),
            smoothed: None,
            brightness: DEFAULT_BRIGHTNESS as f32,
            last_csv_record: None,
            time_set: false,
        }
    }

    pub fn smoothed(&self) -> Option<SmoothedState> {
        self.smoothed
    }

    pub fn brightness(&self) -> u8 {
        libm::roundf(self.brightness) as u8
    }

    pub fn time_set(&self) -> bool {
        self.time_set
    }

    /// Fold one sample into the filters.
    ///
    /// `lux` is `None` when the light sensor failed; the previous brightness
    /// is kept in that case. Implausible samples leave every field untouched.
    pub fn accept(
        &mut self,
        sample: &SensorSample,
        lux: Option<f32>,
    ) -> Result<CycleOutput, Implausible> {
        check_plausible(&sample.readings())?;

        let estimate = self.trend.update(sample.co2_ppm);

        if let Some(lux) = lux {
            let target = map_lux_to_brightness(lux) as f32;
            self.brightness = smooth_exponential(self.brightness, target, BRIGHTNESS_ALPHA);
        }

        let (temperature, humidity) = match self.smoothed {
            Some(prev) => (
                smooth_exponential(prev.smoothed_temperature, sample.temperature_c, CLIMATE_ALPHA),
                smooth_exponential(prev.smoothed_humidity, sample.humidity_pct, CLIMATE_ALPHA),
            ),
            None => (sample.temperature_c, sample.humidity_pct),
        };
        let smoothed = SmoothedState {
            predicted_co2: estimate.predicted,
            trend_co2: estimate.trend,
            smoothed_temperature: temperature,
            smoothed_humidity: humidity,
        };
        self.smoothed = Some(smoothed);

        let csv = self.csv_due(sample.timestamp).then(|| {
            self.last_csv_record = Some(sample.timestamp);
            CsvRecord {
                timestamp: sample.timestamp,
                co2_ppm: Some(sample.co2_ppm),
                humidity_pct: Some(humidity),
                temperature_c: Some(temperature),
            }
        });

        Ok(CycleOutput {
            target: LightTarget {
                position: map_co2_to_position(estimate.predicted),
                brightness: self.brightness(),
            },
            series: SeriesUpdate {
                timestamp: sample.timestamp,
                co2: Some(sample.co2_ppm),
                humidity: Some(humidity),
                temperature: Some(temperature),
            },
            csv,
            smoothed,
        })
    }

    fn csv_due(&self, timestamp: u64) -> bool {
        match self.last_csv_record {
            None => true,
            // A clock set backwards restarts the interval.
            Some(last) if timestamp < last => true,
            Some(last) => timestamp - last >= CSV_RECORD_INTERVAL_SECONDS,
        }
    }

    /// Copy the first available network time into the backup clock.
    ///
    /// Returns `true` exactly once, when the clock gets set.
    pub fn observe_time<K: Clock>(&mut self, clock: &mut K) -> bool {
        if self.time_set {
            return false;
        }
        match clock.network_time() {
            Some(epoch) => {
                clock.set_backup_clock(epoch);
                self.time_set = true;
                info!("Clock set to {}", epoch);
                true
            }
            None => false,
        }
    }
}

/// Outbound channels of the sensor manager
#[derive(Clone, Copy)]
pub struct Pipeline<'a> {
    pub light_target: &'a LatestValue<LightTarget>,
    pub light_mode: &'a ModeRequests,
    pub series: &'a SeriesQueue,
    pub csv: &'a CsvLineQueue,
}

impl Pipeline<'static> {
    /// The firmware-wide channels in [`pipeline`].
    pub fn global() -> Self {
        Self {
            light_target: &pipeline::LIGHT_TARGET,
            light_mode: &pipeline::LIGHT_MODE,
            series: &pipeline::SERIES_QUEUE,
            csv: &pipeline::CSV_QUEUE,
        }
    }
}

#[derive(Error, Debug)]
pub enum CycleError {
    #[error("sensor: {0}")]
    Sensor(SensorError),
    #[error("{0}")]
    Implausible(Implausible),
}

impl From<SensorError> for CycleError {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

impl From<Implausible> for CycleError {
    fn from(e: Implausible) -> Self {
        Self::Implausible(e)
    }
}

pub struct SensorManager<'a, C, L, K> {
    reader: SensorReader<C, L>,
    clock: K,
    state: ManagerState,
    pipeline: Pipeline<'a>,
}

impl<'a, C, L, K> SensorManager<'a, C, L, K>
where
    C: Co2Sensor,
    L: LightSensor,
    K: Clock,
{
    pub fn new(reader: SensorReader<C, L>, clock: K, pipeline: Pipeline<'a>) -> Self {
        Self {
            reader,
            clock,
            state: ManagerState::new(),
            pipeline,
        }
    }

    pub fn state(&self) -> &ManagerState {
        &self.state
    }

    /// Run one acquisition cycle.
    pub async fn run_cycle(&mut self) -> Result<CycleOutput, CycleError> {
        let readings = self.reader.poll_co2().await?;
        let lux = match self.reader.read_illuminance().await {
            Ok(lux) => Some(lux),
            Err(e) => {
                warn!("Light sensor read failed: {}", e);
                None
            }
        };

        let sample = SensorSample::new(readings, self.clock.now_epoch_secs());
        let output = self.state.accept(&sample, lux)?;
        debug!(
            "CO2 {} ppm, predicted {}, trend {}",
            sample.co2_ppm, output.smoothed.predicted_co2, output.smoothed.trend_co2
        );

        self.pipeline.light_target.publish(output.target);

        if with_timeout(QUEUE_SEND_TIMEOUT, self.pipeline.series.send(output.series))
            .await
            .is_err()
        {
            warn!("Series queue full, dropping update");
        }

        if let Some(record) = output.csv {
            match record.to_line() {
                Ok(line) => {
                    enqueue_line(self.pipeline.csv, line).await;
                }
                Err(_) => warn!("CSV line too long for record at {}", record.timestamp),
            }
        }

        Ok(output)
    }

    /// Publish a green pulse the first time the clock gets set.
    pub fn sync_time(&mut self) {
        if self.state.observe_time(&mut self.clock) {
            self.pipeline
                .light_mode
                .publish(ModeRequest::Pulse(PulseKind::TimeSynced));
        }
    }

    /// Run the sensor manager task forever.
    pub async fn run(mut self) -> ! {
        info!("Sensor manager task started");
        loop {
            match self.run_cycle().await {
                Ok(_) => {}
                Err(CycleError::Sensor(e)) => {
                    warn!("Sensor cycle failed: {}", e);
                    Timer::after(ERROR_BACKOFF).await;
                }
                Err(CycleError::Implausible(e)) => warn!("Skipping sample: {}", e),
            }
            self.sync_time();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light_bar::{LightBarMode, LightBarRenderer};
    use crate::scale::ScalePosition;
    use crate::sensors::PollPolicy;
    use alloc::vec::Vec;
    use embassy_futures::block_on;
    use embassy_sync::channel::Channel;
    use embassy_time::Duration;

    fn sample(co2_ppm: f32, timestamp: u64) -> SensorSample {
        SensorSample::new(
            Co2Readings {
                co2_ppm,
                temperature_c: 21.0,
                humidity_pct: 45.0,
            },
            timestamp,
        )
    }

    #[test]
    fn test_co2_sequence_drives_expected_bar_modes() {
        let mut state = ManagerState::new();
        let mut renderer: LightBarRenderer<9> = LightBarRenderer::default();

        let modes: Vec<LightBarMode> = [450.0, 450.0, 2100.0, 450.0]
            .into_iter()
            .enumerate()
            .map(|(i, co2)| {
                let output = state.accept(&sample(co2, i as u64 * 5), None).unwrap();
                renderer.apply_target(output.target);
                renderer.mode()
            })
            .collect();

        assert_eq!(
            modes,
            [
                LightBarMode::ScaleDisplay,
                LightBarMode::ScaleDisplay,
                LightBarMode::FlashWarning,
                LightBarMode::ScaleDisplay,
            ]
        );
    }

    #[test]
    fn test_steady_co2_has_no_trend() {
        let mut state = ManagerState::new();
        for i in 0..10 {
            let output = state.accept(&sample(800.0, i * 5), None).unwrap();
            assert_eq!(output.smoothed.trend_co2, 0.0);
            assert_eq!(output.smoothed.predicted_co2, 800.0);
        }
    }

    #[test]
    fn test_implausible_sample_leaves_state_untouched() {
        let mut state = ManagerState::new();
        state.accept(&sample(700.0, 0), Some(100.0)).unwrap();
        let before = state.smoothed();
        let brightness = state.brightness();

        let bad = sample(0.0, 5);
        assert!(!bad.valid);
        assert!(state.accept(&bad, Some(10_000.0)).is_err());
        assert_eq!(state.smoothed(), before);
        assert_eq!(state.brightness(), brightness);

        // The next good sample continues from the pre-glitch trend.
        let output = state.accept(&sample(700.0, 10), None).unwrap();
        assert_eq!(output.smoothed.trend_co2, 0.0);
    }

    #[test]
    fn test_climate_values_are_smoothed() {
        let mut state = ManagerState::new();
        state.accept(&sample(600.0, 0), None).unwrap();
        let mut warmer = sample(600.0, 5);
        warmer.temperature_c = 31.0;
        let output = state.accept(&warmer, None).unwrap();
        assert_eq!(output.smoothed.smoothed_temperature, 23.0);
        assert_eq!(output.series.temperature, Some(23.0));
    }

    #[test]
    fn test_brightness_keeps_previous_without_lux() {
        let mut state = ManagerState::new();
        state.accept(&sample(600.0, 0), Some(10_000.0)).unwrap();
        let bright = state.brightness();
        assert!(bright > DEFAULT_BRIGHTNESS);
        state.accept(&sample(600.0, 5), None).unwrap();
        assert_eq!(state.brightness(), bright);
    }

    #[test]
    fn test_csv_record_interval() {
        let mut state = ManagerState::new();
        let due: Vec<bool> = [0, 30, 60, 61, 130, 10]
            .into_iter()
            .map(|ts| state.accept(&sample(600.0, ts), None).unwrap().csv.is_some())
            .collect();
        assert_eq!(due, [true, false, true, false, true, true]);
    }

    struct FakeClock {
        now: u64,
        pending: Option<u64>,
        backup: Option<u64>,
    }

    impl Clock for FakeClock {
        fn now_epoch_secs(&self) -> u64 {
            self.backup.unwrap_or(self.now)
        }

        fn network_time(&mut self) -> Option<u64> {
            self.pending.take()
        }

        fn set_backup_clock(&mut self, epoch_secs: u64) {
            self.backup = Some(epoch_secs);
        }
    }

    #[test]
    fn test_time_sync_is_one_shot() {
        let mut state = ManagerState::new();
        let mut clock = FakeClock {
            now: 12,
            pending: None,
            backup: None,
        };
        assert!(!state.observe_time(&mut clock));

        clock.pending = Some(1_700_000_000);
        assert!(state.observe_time(&mut clock));
        assert_eq!(clock.backup, Some(1_700_000_000));

        clock.pending = Some(1_800_000_000);
        assert!(!state.observe_time(&mut clock));
        assert_eq!(clock.backup, Some(1_700_000_000));
        assert!(state.time_set());
    }

    struct ReadyCo2(f32);

    impl Co2Sensor for ReadyCo2 {
        async fn data_ready(&mut self) -> Result<bool, SensorError> {
            Ok(true)
        }

        async fn read_measurement(&mut self) -> Result<Co2Readings, SensorError> {
            Ok(Co2Readings {
                co2_ppm: self.0,
                temperature_c: 22.0,
                humidity_pct: 40.0,
            })
        }
    }

    struct BrokenLux;

    impl LightSensor for BrokenLux {
        async fn read_lux(&mut self) -> Result<f32, SensorError> {
            Err(SensorError::BusFault {
                sensor: "BH1750",
                operation: "read",
            })
        }
    }

    #[test]
    fn test_run_cycle_fans_out_to_all_consumers() {
        let light_target = LatestValue::new();
        let light_mode = ModeRequests::new();
        let series: SeriesQueue = Channel::new();
        let csv: CsvLineQueue = Channel::new();
        let pipeline = Pipeline {
            light_target: &light_target,
            light_mode: &light_mode,
            series: &series,
            csv: &csv,
        };

        let policy = PollPolicy {
            interval: Duration::from_millis(1),
            max_attempts: 3,
        };
        let reader = SensorReader::with_policy(ReadyCo2(1225.0), BrokenLux, policy);
        let clock = FakeClock {
            now: 100,
            pending: Some(1_700_000_000),
            backup: None,
        };
        let mut manager = SensorManager::new(reader, clock, pipeline);

        block_on(manager.run_cycle()).unwrap();

        let target = light_target.take().unwrap();
        assert!(matches!(target.position, ScalePosition::InRange(_)));
        assert_eq!(target.brightness, DEFAULT_BRIGHTNESS);

        let update = series.try_receive().unwrap();
        assert_eq!(update.timestamp, 100);
        assert_eq!(update.co2, Some(1225.0));

        let line = csv.try_receive().unwrap();
        assert_eq!(line.as_str(), "100,1225,40.0,22.0\n");

        manager.sync_time();
        assert_eq!(
            light_mode.take(),
            Some(ModeRequest::Pulse(PulseKind::TimeSynced))
        );
        manager.sync_time();
        assert_eq!(light_mode.take(), None);
    }
}
