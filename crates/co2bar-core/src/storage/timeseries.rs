//! Rolling in-memory time series served as `/data.json`
//!
//! Each channel is a fixed-capacity ring of `(timestamp, value)` points. A
//! point is only appended when its value, rounded to the channel's display
//! precision, differs from the last recorded one, so a steady reading does not
//! push older history out of the window.
//!
//! The JSON layout matches what the chart on the index page expects:
//!
//! ```json
//! [{"name":"CO2","color":"#4caf50","y_title":"ppm","data":[[1700000000000,612.0]]}, ...]
//! ```

use alloc::vec::Vec;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::with_timeout;
use log::{debug, warn};
use serde::ser::{Serialize, SerializeSeq, SerializeStruct, Serializer};
use thiserror_no_std::Error;

use crate::config::LOCK_TIMEOUT;
use crate::pipeline::SeriesQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesChannel {
    Co2,
    Humidity,
    Temperature,
}

impl SeriesChannel {
    pub const ALL: [SeriesChannel; 3] = [Self::Co2, Self::Humidity, Self::Temperature];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Co2 => "CO2",
            Self::Humidity => "Humidity",
            Self::Temperature => "Temperature",
        }
    }

    pub const fn color(self) -> &'static str {
        match self {
            Self::Co2 => "#4caf50",
            Self::Humidity => "#2196f3",
            Self::Temperature => "#f44336",
        }
    }

    pub const fn y_title(self) -> &'static str {
        match self {
            Self::Co2 => "ppm",
            Self::Humidity => "%RH",
            Self::Temperature => "°C",
        }
    }

    /// Digits after the decimal point used for de-duplication and output
    pub const fn decimal_places(self) -> u32 {
        match self {
            Self::Co2 => 0,
            Self::Humidity | Self::Temperature => 1,
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Co2 => 0,
            Self::Humidity => 1,
            Self::Temperature => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    /// Epoch milliseconds
    pub timestamp_ms: i64,
    /// `None` when the reading was unavailable
    pub value: Option<f32>,
}

impl SeriesPoint {
    const EMPTY: Self = Self {
        timestamp_ms: 0,
        value: None,
    };
}

/// Last recorded value of a channel, at display precision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastValue {
    /// Nothing recorded since start or reset
    Unset,
    Null,
    Rounded(i32),
}

fn scale_for(decimal_places: u32) -> f32 {
    libm::powf(10.0, decimal_places as f32)
}

/// One cycle's worth of readings for the series consumer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesUpdate {
    /// Epoch seconds
    pub timestamp: u64,
    pub co2: Option<f32>,
    pub humidity: Option<f32>,
    pub temperature: Option<f32>,
}

pub struct SeriesBuffer<const N: usize> {
    channel: SeriesChannel,
    points: [SeriesPoint; N],
    write_index: usize,
    len: usize,
    last: LastValue,
}

impl<const N: usize> SeriesBuffer<N> {
    pub const fn new(channel: SeriesChannel) -> Self {
        Self {
            channel,
            points: [SeriesPoint::EMPTY; N],
            write_index: 0,
            len: 0,
            last: LastValue::Unset,
        }
    }

    pub fn channel(&self) -> SeriesChannel {
        self.channel
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn last_value(&self) -> LastValue {
        self.last
    }

    /// Append a point unless it rounds to the previous value.
    ///
    /// Non-finite values are stored as null. Returns whether a point was
    /// written.
    pub fn record(&mut self, timestamp_ms: i64, value: Option<f32>) -> bool {
        let scale = scale_for(self.channel.decimal_places());
        let rounded = value
            .filter(|v| v.is_finite())
            .map(|v| libm::roundf(v * scale) as i32);

        let key = match rounded {
            Some(r) => LastValue::Rounded(r),
            None => LastValue::Null,
        };
        if key == self.last || N == 0 {
            return false;
        }

        self.points[self.write_index] = SeriesPoint {
            timestamp_ms,
            value: rounded.map(|r| r as f32 / scale),
        };
        self.write_index = (self.write_index + 1) % N;
        self.len = (self.len + 1).min(N);
        self.last = key;
        true
    }

    pub fn reset(&mut self) {
        self.points = [SeriesPoint::EMPTY; N];
        self.write_index = 0;
        self.len = 0;
        self.last = LastValue::Unset;
    }

    /// Points from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &SeriesPoint> {
        let start = if self.len < N { 0 } else { self.write_index };
        (0..self.len).map(move |i| &self.points[(start + i) % N])
    }
}

struct PointsView<'a, const N: usize>(&'a SeriesBuffer<N>);

impl<const N: usize> Serialize for PointsView<'_, N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for point in self.0.iter() {
            seq.serialize_element(&(point.timestamp_ms, point.value))?;
        }
        seq.end()
    }
}

impl<const N: usize> Serialize for SeriesBuffer<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut series = serializer.serialize_struct("Series", 4)?;
        series.serialize_field("name", self.channel.name())?;
        series.serialize_field("color", self.channel.color())?;
        series.serialize_field("y_title", self.channel.y_title())?;
        series.serialize_field("data", &PointsView(self))?;
        series.end()
    }
}

/// The three channels shown on the web UI.
pub struct TimeSeriesStore<const N: usize> {
    channels: [SeriesBuffer<N>; 3],
}

impl<const N: usize> Default for TimeSeriesStore<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> TimeSeriesStore<N> {
    pub const fn new() -> Self {
        Self {
            channels: [
                SeriesBuffer::new(SeriesChannel::Co2),
                SeriesBuffer::new(SeriesChannel::Humidity),
                SeriesBuffer::new(SeriesChannel::Temperature),
            ],
        }
    }

    pub fn channel(&self, channel: SeriesChannel) -> &SeriesBuffer<N> {
        &self.channels[channel.index()]
    }

    pub fn record(&mut self, channel: SeriesChannel, timestamp_ms: i64, value: Option<f32>) -> bool {
        self.channels[channel.index()].record(timestamp_ms, value)
    }

    /// Fold one cycle's readings into all channels.
    pub fn record_update(&mut self, update: &SeriesUpdate) {
        let timestamp_ms = update.timestamp as i64 * 1000;
        self.record(SeriesChannel::Co2, timestamp_ms, update.co2);
        self.record(SeriesChannel::Humidity, timestamp_ms, update.humidity);
        self.record(SeriesChannel::Temperature, timestamp_ms, update.temperature);
    }

    pub fn reset(&mut self) {
        self.channels.iter_mut().for_each(SeriesBuffer::reset);
    }

    pub fn snapshot_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl<const N: usize> Serialize for TimeSeriesStore<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.channels.len()))?;
        for channel in &self.channels {
            seq.serialize_element(channel)?;
        }
        seq.end()
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("time series lock timed out")]
    LockTimeout,
    #[error("time series serialization failed")]
    Serialize,
}

/// Time series store shared between the series consumer and HTTP handlers
pub struct SharedTimeSeries<const N: usize> {
    inner: Mutex<CriticalSectionRawMutex, TimeSeriesStore<N>>,
}

impl<const N: usize> Default for SharedTimeSeries<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> SharedTimeSeries<N> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(TimeSeriesStore::new()),
        }
    }

    pub async fn record_update(&self, update: &SeriesUpdate) -> Result<(), StoreError> {
        let mut store = with_timeout(LOCK_TIMEOUT, self.inner.lock())
            .await
            .map_err(|_| StoreError::LockTimeout)?;
        store.record_update(update);
        Ok(())
    }

    pub async fn reset(&self) -> Result<(), StoreError> {
        let mut store = with_timeout(LOCK_TIMEOUT, self.inner.lock())
            .await
            .map_err(|_| StoreError::LockTimeout)?;
        store.reset();
        Ok(())
    }

    /// Serialize the whole store; the lock is held only while serializing.
    pub async fn snapshot(&self) -> Result<Vec<u8>, StoreError> {
        let store = with_timeout(LOCK_TIMEOUT, self.inner.lock())
            .await
            .map_err(|_| StoreError::LockTimeout)?;
        store.snapshot_json().map_err(|_| StoreError::Serialize)
    }

    /// Non-blocking variant of [`Self::record_update`] for synchronous callers.
    pub fn try_record_update(&self, update: &SeriesUpdate) -> Result<(), StoreError> {
        let mut store = self.inner.try_lock().map_err(|_| StoreError::LockTimeout)?;
        store.record_update(update);
        Ok(())
    }

    pub fn try_snapshot(&self) -> Result<Vec<u8>, StoreError> {
        let store = self.inner.try_lock().map_err(|_| StoreError::LockTimeout)?;
        store.snapshot_json().map_err(|_| StoreError::Serialize)
    }
}

/// Series consumer task: folds queued updates into the shared store.
pub async fn run_series_task<const N: usize>(queue: &SeriesQueue, store: &SharedTimeSeries<N>) -> ! {
    loop {
        let update = queue.receive().await;
        match store.record_update(&update).await {
            Ok(()) => debug!("Series updated at {}", update.timestamp),
            Err(e) => warn!("Dropping series update: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    #[test]
    fn test_integer_rounding_deduplicates() {
        let mut store: TimeSeriesStore<8> = TimeSeriesStore::new();
        for (i, co2) in [400.0, 400.0, 405.0].into_iter().enumerate() {
            store.record(SeriesChannel::Co2, i as i64 * 1000, Some(co2));
        }
        assert_eq!(store.channel(SeriesChannel::Co2).len(), 2);
    }

    #[test]
    fn test_record_is_idempotent_for_same_rounded_value() {
        let mut buffer: SeriesBuffer<8> = SeriesBuffer::new(SeriesChannel::Temperature);
        assert!(buffer.record(0, Some(21.44)));
        assert!(!buffer.record(1, Some(21.41)));
        assert!(buffer.record(2, Some(21.46)));
        assert_eq!(buffer.last_value(), LastValue::Rounded(215));
    }

    #[test]
    fn test_nulls_deduplicate_too() {
        let mut buffer: SeriesBuffer<8> = SeriesBuffer::new(SeriesChannel::Humidity);
        assert!(buffer.record(0, None));
        assert!(!buffer.record(1, None));
        assert!(!buffer.record(2, Some(f32::NAN)));
        assert!(buffer.record(3, Some(40.0)));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_wraparound_evicts_oldest_first() {
        let mut buffer: SeriesBuffer<4> = SeriesBuffer::new(SeriesChannel::Co2);
        for i in 0..6 {
            buffer.record(i, Some(500.0 + i as f32));
        }
        assert_eq!(buffer.len(), 4);
        let timestamps: Vec<i64> = buffer.iter().map(|p| p.timestamp_ms).collect();
        assert_eq!(timestamps, [2, 3, 4, 5]);
    }

    #[test]
    fn test_reset_clears_points_and_tracker() {
        let mut store: TimeSeriesStore<4> = TimeSeriesStore::new();
        store.record(SeriesChannel::Co2, 0, Some(700.0));
        store.reset();
        let co2 = store.channel(SeriesChannel::Co2);
        assert!(co2.is_empty());
        assert_eq!(co2.last_value(), LastValue::Unset);
        assert_eq!(co2.channel().name(), "CO2");

        // Same value is accepted again after a reset.
        assert!(store.record(SeriesChannel::Co2, 1, Some(700.0)));
    }

    #[test]
    fn test_snapshot_json_layout() {
        let mut store: TimeSeriesStore<4> = TimeSeriesStore::new();
        store.record_update(&SeriesUpdate {
            timestamp: 1_700_000_000,
            co2: Some(612.4),
            humidity: None,
            temperature: Some(21.5),
        });

        let json = store.snapshot_json().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        let series = value.as_array().unwrap();
        assert_eq!(series.len(), 3);

        assert_eq!(series[0]["name"], "CO2");
        assert_eq!(series[0]["y_title"], "ppm");
        assert_eq!(series[0]["data"][0][0], 1_700_000_000_000i64);
        assert_eq!(series[0]["data"][0][1], 612.0);

        assert!(series[1]["data"][0][1].is_null());
        assert_eq!(series[2]["data"][0][1], 21.5);
    }

    #[test]
    fn test_shared_store_round_trip_under_lock() {
        let shared: SharedTimeSeries<4> = SharedTimeSeries::new();
        let update = SeriesUpdate {
            timestamp: 10,
            co2: Some(800.0),
            humidity: Some(50.0),
            temperature: Some(20.0),
        };
        block_on(shared.record_update(&update)).unwrap();
        let json = block_on(shared.snapshot()).unwrap();
        assert!(json.starts_with(b"[{\"name\":\"CO2\""));

        block_on(shared.reset()).unwrap();
        let json = shared.try_snapshot().unwrap();
        assert!(core::str::from_utf8(&json).unwrap().contains("\"data\":[]"));
    }

    #[test]
    fn test_series_task_folds_queued_updates() {
        use embassy_futures::select::{Either, select};
        use embassy_time::Timer;

        let queue = SeriesQueue::new();
        let store: SharedTimeSeries<8> = SharedTimeSeries::new();

        let driver = async {
            for (timestamp, co2) in [(1, 700.0), (2, 700.2), (3, 950.0), (4, 1010.0)] {
                queue
                    .send(SeriesUpdate {
                        timestamp,
                        co2: Some(co2),
                        humidity: Some(45.0),
                        temperature: None,
                    })
                    .await;
            }
            Timer::after_millis(20).await;
        };
        match block_on(select(run_series_task(&queue, &store), driver)) {
            Either::First(never) => never,
            Either::Second(()) => {}
        }

        assert!(queue.is_empty());
        let inner = block_on(store.inner.lock());
        // 700.2 rounds onto the previous point, humidity never changes.
        assert_eq!(inner.channel(SeriesChannel::Co2).len(), 3);
        assert_eq!(inner.channel(SeriesChannel::Humidity).len(), 1);
        assert_eq!(inner.channel(SeriesChannel::Temperature).len(), 1);
    }
}
