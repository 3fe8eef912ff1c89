//! Channels connecting the sensor manager to its consumers
//!
//! Components take references to these so tests can use local instances; the
//! firmware wires everything to the statics below.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::config::{CSV_QUEUE_CAPACITY, SERIES_CAPACITY, SERIES_QUEUE_CAPACITY};
use crate::latest::LatestValue;
use crate::light_bar::{LightTarget, ModeRequests};
use crate::storage::{CsvLine, SeriesUpdate, SharedTimeSeries};

pub type CsvLineQueue = Channel<CriticalSectionRawMutex, CsvLine, CSV_QUEUE_CAPACITY>;
pub type SeriesQueue = Channel<CriticalSectionRawMutex, SeriesUpdate, SERIES_QUEUE_CAPACITY>;
pub type TimeSeries = SharedTimeSeries<SERIES_CAPACITY>;

/// Latest bar target from the sensor manager
pub static LIGHT_TARGET: LatestValue<LightTarget> = LatestValue::new();

/// Mode requests for the light bar (pulses, self-test, error, off)
pub static LIGHT_MODE: ModeRequests = ModeRequests::new();

pub static SERIES_QUEUE: SeriesQueue = Channel::new();

pub static CSV_QUEUE: CsvLineQueue = Channel::new();

/// Set by the web server to request a CSV clear
pub static CSV_CLEAR: LatestValue<()> = LatestValue::new();

/// Epoch seconds reported by a client, consumed once by the sensor manager
pub static NETWORK_TIME: LatestValue<u64> = LatestValue::new();

pub static TIME_SERIES: TimeSeries = SharedTimeSeries::new();
