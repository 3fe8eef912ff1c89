//! Device configuration and compile-time tuning constants
//!
//! Runtime-adjustable settings are limited to the access point credentials
//! (injected at build time by the firmware). Everything else is a tuning
//! constant: the filters and the LED animation are calibrated against the
//! SCD41's 5 second measurement cadence and the 30 ms frame period.

use embassy_time::Duration;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(bound(deserialize = "'de: 'a"))]
pub struct Config<'a> {
    pub access_point: AccessPointConfig<'a>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct AccessPointConfig<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}

// ---------------------------------------------------------------------------
// LED bar
// ---------------------------------------------------------------------------

/// Number of pixels on the light bar
pub const PIXEL_COUNT: usize = 9;

/// Sub-pixel resolution of one pixel in bar positions
pub const POSITION_PER_PIXEL: u16 = 255;

/// Largest valid bar position (`PIXEL_COUNT * 255`)
pub const MAX_POSITION: u16 = PIXEL_COUNT as u16 * POSITION_PER_PIXEL;

/// Renderer frame period (~33 fps)
pub const FRAME_PERIOD: Duration = Duration::from_millis(30);

/// Divisor of the remaining distance used as the per-frame position step
pub const POSITION_STEP_DIVISOR: u16 = 32;

/// Full period of the over-range red/black flash
pub const FLASH_PERIOD_MS: u64 = 1000;

/// Duration of an event pulse (new client, time sync)
pub const PULSE_DURATION_MS: u64 = 1500;

/// Time each pixel stays lit during the self-test chase
pub const SELF_TEST_STEP_MS: u64 = 150;

/// Brightness used for the error bar, independent of ambient light
pub const ERROR_BRIGHTNESS: u8 = 64;

/// Lowest brightness the over-range flash is shown at, so it stays visible in the dark
pub const FLASH_MIN_BRIGHTNESS: u8 = 48;

// ---------------------------------------------------------------------------
// CO2 scale
// ---------------------------------------------------------------------------

/// CO2 concentration mapped to an empty bar
pub const CO2_MIN_PPM: f32 = 450.0;

/// CO2 concentration at and above which the bar flashes a warning
pub const CO2_MAX_PPM: f32 = 2000.0;

/// Hue (smart-leds 0..=255 wheel) used for CO2_MIN
pub const HUE_GREEN: u8 = 85;

/// Hue used just below CO2_MAX
pub const HUE_RED: u8 = 0;

// ---------------------------------------------------------------------------
// Smoothing
// ---------------------------------------------------------------------------

/// Weight of the newest CO2 delta in the trend estimate
pub const TREND_ALPHA: f32 = 0.5;

/// Exponential smoothing factor for temperature and humidity
pub const CLIMATE_ALPHA: f32 = 0.2;

/// Exponential smoothing factor for the ambient-light brightness target
pub const BRIGHTNESS_ALPHA: f32 = 0.3;

/// Illuminance at or below which the bar runs at MIN_BRIGHTNESS
pub const LUX_DARK: f32 = 1.0;

/// Illuminance at or above which the bar runs at MAX_BRIGHTNESS
pub const LUX_BRIGHT: f32 = 500.0;

pub const MIN_BRIGHTNESS: u8 = 8;
pub const MAX_BRIGHTNESS: u8 = 255;

/// Brightness used until the first illuminance reading arrives
pub const DEFAULT_BRIGHTNESS: u8 = 64;

// ---------------------------------------------------------------------------
// Sensor polling
// ---------------------------------------------------------------------------

/// Backoff between data-ready checks
pub const DATA_READY_POLL_INTERVAL: Duration = Duration::from_millis(30);

/// Data-ready checks before giving up; 200 × 30 ms covers one 5 s SCD41
/// measurement interval plus margin.
pub const DATA_READY_MAX_ATTEMPTS: u32 = 200;

/// Pause after a failed cycle before the next poll
pub const ERROR_BACKOFF: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Storage and pipeline
// ---------------------------------------------------------------------------

/// Points kept per time-series channel
pub const SERIES_CAPACITY: usize = 64;

/// Capacity of the sensor manager → series consumer queue
pub const SERIES_QUEUE_CAPACITY: usize = 3;

/// Capacity of the sensor manager → CSV sink queue
pub const CSV_QUEUE_CAPACITY: usize = 3;

/// Longest a producer waits on a full queue before dropping the cycle's data
pub const QUEUE_SEND_TIMEOUT: Duration = Duration::from_millis(100);

/// Longest any task waits for a shared-resource mutex
pub const LOCK_TIMEOUT: Duration = Duration::from_millis(100);

/// Minimum time between two CSV records
pub const CSV_RECORD_INTERVAL_SECONDS: u64 = 60;

/// File name of the CSV log (also the download path)
pub const CSV_FILE_NAME: &str = "Air_Quality_Data.csv";

/// Header row written once when the log is created
pub const CSV_HEADER: &str = "TimeStamp,CO2(PPM),Humidity(%RH),Temperature(DegC)\n";

/// Size at which the log stops accepting lines until cleared
pub const MAX_CSV_SIZE_BYTES: u32 = 1_000_000;

/// Unflushed bytes that trigger a write to storage
pub const FLUSH_THRESHOLD_BYTES: usize = 512;

/// While the file is smaller than this, every line is flushed immediately
pub const EAGER_FLUSH_BELOW_BYTES: u32 = 4096;

/// Open attempts before the log is declared unusable
pub const CSV_INIT_RETRIES: u32 = 3;

/// Delay between open attempts
pub const CSV_INIT_BACKOFF: Duration = Duration::from_millis(500);

/// Capacity of one formatted CSV line
pub const CSV_LINE_CAPACITY: usize = 64;
