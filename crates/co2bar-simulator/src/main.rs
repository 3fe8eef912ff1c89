//! Desktop simulator for the co2bar CO2 light-bar monitor.
//!
//! Runs the real co2bar-core tasks (sensor manager, light bar, series
//! consumer, CSV sink) on the host against synthetic sensors. The LED bar is
//! drawn on the current terminal line with 24-bit colour blocks, the CSV log is
//! written to the system temp directory and a scripted client exercises the
//! web routes the way a phone on the access point would.
//!
//! | Time  | Client request                      |
//! |-------|-------------------------------------|
//! | 2 s   | `GET /` (purple pulse)              |
//! | 4 s   | `GET /settime?epoch=<now>` (green)  |
//! | 8 s   | `GET /selftest`                     |
//! | 30 s  | `GET /data.json`, repeated          |
//! | 120 s | `GET /Air_Quality_Data.csv`, repeated |
//!
//! Ctrl-C quits.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use embassy_futures::block_on;
use embassy_futures::join::join5;
use embassy_time::{Duration, Instant, Timer};
use log::{info, warn};
use smart_leds::{RGB8, SmartLedsWrite};

use co2bar_core::clock::{Clock, OffsetClock};
use co2bar_core::config::{CSV_FILE_NAME, PIXEL_COUNT};
use co2bar_core::latest::LatestValue;
use co2bar_core::light_bar::{BarStyle, LightBarManager, blackout};
use co2bar_core::pipeline;
use co2bar_core::sensor_manager::{Pipeline, SensorManager};
use co2bar_core::sensors::{Co2Readings, Co2Sensor, LightSensor, SensorError, SensorReader};
use co2bar_core::storage::{
    CsvLog, LogStorage, SharedCsvLog, read_shared_chunk, run_csv_sink, run_series_task,
    shared_size,
};
use co2bar_core::web::{Reply, Route, WebContext};

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

/// Measurement interval of the simulated SCD41
const MEASUREMENT_INTERVAL: Duration = Duration::from_secs(5);

/// Length of one simulated occupancy cycle (room fills up, then is aired)
const OCCUPANCY_CYCLE_SECS: f64 = 900.0;

/// Length of one simulated day/night cycle for the light sensor
const DAYLIGHT_CYCLE_SECS: f64 = 600.0;

const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(30);
const DOWNLOAD_INTERVAL: Duration = Duration::from_secs(120);

// ---------------------------------------------------------------------------
// Mock sensors
// ---------------------------------------------------------------------------

/// Synthetic SCD41 + SHT40: CO2 climbs while the room is occupied and drops
/// quickly once it is aired, briefly crossing the warning threshold.
struct MockAirSensor {
    started: Instant,
    last_measurement: Option<Instant>,
}

impl MockAirSensor {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            last_measurement: None,
        }
    }

    fn readings_at(t: f64) -> Co2Readings {
        let phase = (t % OCCUPANCY_CYCLE_SECS) / OCCUPANCY_CYCLE_SECS;
        let base = if phase < 0.8 {
            // Occupied: roughly linear rise from 450 to 2150 ppm
            450.0 + 1700.0 * (phase / 0.8)
        } else {
            // Window open: exponential decay back to outdoor level
            450.0 + 1700.0 * (-(phase - 0.8) * 25.0).exp()
        };
        let co2_ppm = base + 15.0 * (t / 7.0).sin();

        Co2Readings {
            co2_ppm: co2_ppm as f32,
            temperature_c: (22.0 + 1.5 * (t / 240.0).sin() + 0.2 * (t / 17.0).cos()) as f32,
            humidity_pct: (45.0 + 8.0 * (t / 300.0).sin() + 1.0 * (t / 29.0).cos()) as f32,
        }
    }
}

impl Co2Sensor for MockAirSensor {
    async fn data_ready(&mut self) -> Result<bool, SensorError> {
        Ok(self
            .last_measurement
            .is_none_or(|last| last.elapsed() >= MEASUREMENT_INTERVAL))
    }

    async fn read_measurement(&mut self) -> Result<Co2Readings, SensorError> {
        self.last_measurement = Some(Instant::now());
        let t = self.started.elapsed().as_millis() as f64 / 1000.0;
        Ok(Self::readings_at(t))
    }
}

/// Synthetic BH1750 following a day/night sine.
struct MockLightSensor {
    started: Instant,
}

impl LightSensor for MockLightSensor {
    async fn read_lux(&mut self) -> Result<f32, SensorError> {
        let t = self.started.elapsed().as_millis() as f64 / 1000.0;
        let daylight = (2.0 * std::f64::consts::PI * t / DAYLIGHT_CYCLE_SECS).sin();
        Ok((250.0 + 260.0 * daylight).max(0.0) as f32)
    }
}

/// Uptime clock that a client can anchor to wall time via `/settime`.
struct SimClock {
    clock: OffsetClock,
    network: &'static LatestValue<u64>,
}

impl Clock for SimClock {
    fn now_epoch_secs(&self) -> u64 {
        self.clock.now(Instant::now().as_secs())
    }

    fn network_time(&mut self) -> Option<u64> {
        self.network.take()
    }

    fn set_backup_clock(&mut self, epoch_secs: u64) {
        self.clock.set(epoch_secs, Instant::now().as_secs());
    }
}

// ---------------------------------------------------------------------------
// Terminal LED strip
// ---------------------------------------------------------------------------

/// Draws each frame as a row of coloured blocks on the current line.
struct TerminalStrip;

impl SmartLedsWrite for TerminalStrip {
    type Error = io::Error;
    type Color = RGB8;

    fn write<T, I>(&mut self, iterator: T) -> Result<(), Self::Error>
    where
        T: IntoIterator<Item = I>,
        I: Into<Self::Color>,
    {
        let mut line = String::from("\r");
        for pixel in iterator {
            let RGB8 { r, g, b } = pixel.into();
            line.push_str(&format!("\x1b[48;2;{r};{g};{b}m   "));
        }
        line.push_str("\x1b[0m ");

        let mut stdout = io::stdout().lock();
        stdout.write_all(line.as_bytes())?;
        stdout.flush()
    }
}

// ---------------------------------------------------------------------------
// File-backed CSV storage
// ---------------------------------------------------------------------------

struct FileStorage {
    path: PathBuf,
    pending: Vec<u8>,
}

impl FileStorage {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            pending: Vec::new(),
        }
    }
}

impl LogStorage for FileStorage {
    type Error = io::Error;

    fn open_or_create(&mut self) -> Result<u32, Self::Error> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        Ok(file.metadata()?.len() as u32 + self.pending.len() as u32)
    }

    fn append(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.pending.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&self.pending)?;
        self.pending.clear();
        Ok(())
    }

    fn remove(&mut self) -> Result<(), Self::Error> {
        self.pending.clear();
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    fn read_at(&mut self, offset: u32, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset as u64))?;
        file.read(buf)
    }
}

// ---------------------------------------------------------------------------
// Scripted web client
// ---------------------------------------------------------------------------

async fn request(context: &WebContext<'_>, request_line: &str) -> Reply {
    let route = Route::parse(request_line.as_bytes());
    context.handle(route).await
}

fn summarize_snapshot(json: &[u8]) {
    let Ok(serde_json::Value::Array(channels)) = serde_json::from_slice(json) else {
        warn!("Snapshot is not a JSON array");
        return;
    };
    for channel in channels {
        let name = channel["name"].as_str().unwrap_or("?");
        let points = channel["data"].as_array().map(Vec::len).unwrap_or(0);
        let last = channel["data"]
            .as_array()
            .and_then(|data| data.last())
            .map(|point| point[1].to_string())
            .unwrap_or_else(|| "-".to_string());
        info!("  {name}: {points} points, last {last}");
    }
}

async fn download_csv<S: LogStorage>(log: &SharedCsvLog<S>) {
    let Some(size) = shared_size(log).await else {
        warn!("GET /{CSV_FILE_NAME} -> 503");
        return;
    };

    let mut body = Vec::with_capacity(size as usize);
    let mut chunk = [0u8; 512];
    while (body.len() as u32) < size {
        match read_shared_chunk(log, body.len() as u32, &mut chunk).await {
            Some(0) | None => break,
            Some(n) => body.extend_from_slice(&chunk[..n]),
        }
    }

    let rows = body.iter().filter(|&&b| b == b'\n').count().saturating_sub(1);
    info!("GET /{CSV_FILE_NAME} -> {} bytes, {rows} rows", body.len());
}

async fn run_client<S: LogStorage>(log: &SharedCsvLog<S>) {
    let context = WebContext::global();

    Timer::after_secs(2).await;
    info!("Client connected");
    request(&context, "GET / HTTP/1.1").await;

    Timer::after_secs(2).await;
    let epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    request(&context, &format!("GET /settime?epoch={epoch} HTTP/1.1")).await;

    Timer::after_secs(4).await;
    request(&context, "GET /selftest HTTP/1.1").await;

    let mut last_download = Instant::now();
    loop {
        Timer::after(SNAPSHOT_INTERVAL).await;
        match request(&context, "GET /data.json HTTP/1.1").await {
            Reply::Json(json) => {
                info!("GET /data.json -> {} bytes", json.len());
                summarize_snapshot(&json);
            }
            other => warn!("GET /data.json -> {:?}", other),
        }

        if last_download.elapsed() >= DOWNLOAD_INTERVAL {
            download_csv(log).await;
            last_download = Instant::now();
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();
    info!("Starting co2bar simulator ({} pixels)", PIXEL_COUNT);

    let csv_path = std::env::temp_dir().join(CSV_FILE_NAME);
    info!("CSV log: {}", csv_path.display());
    let csv_log: SharedCsvLog<FileStorage> =
        SharedCsvLog::new(CsvLog::new(FileStorage::new(csv_path)));

    let started = Instant::now();
    let reader = SensorReader::new(MockAirSensor::new(), MockLightSensor { started });
    let clock = SimClock {
        clock: OffsetClock::new(),
        network: &pipeline::NETWORK_TIME,
    };
    let manager = SensorManager::new(reader, clock, Pipeline::global());

    let light_bar = async {
        let bar = LightBarManager::<_, PIXEL_COUNT>::new(
            TerminalStrip,
            BarStyle::default(),
            &pipeline::LIGHT_TARGET,
            &pipeline::LIGHT_MODE,
        );
        let mut strip = bar.run().await;
        let _ = blackout::<_, PIXEL_COUNT>(&mut strip);
        println!();
        info!("Light bar off");
    };

    block_on(join5(
        manager.run(),
        light_bar,
        run_series_task(&pipeline::SERIES_QUEUE, &pipeline::TIME_SERIES),
        run_csv_sink(
            &csv_log,
            &pipeline::CSV_QUEUE,
            &pipeline::CSV_CLEAR,
            &pipeline::LIGHT_MODE,
        ),
        run_client(&csv_log),
    ));
}
