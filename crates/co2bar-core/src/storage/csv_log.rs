//! Append-only CSV log
//!
//! The CSV file is the only durable state on the device. Lines arrive from the
//! sensor manager through a bounded queue and are appended by a single sink
//! task; the web server reads the same file in chunks for download. Once the
//! file reaches [`MAX_CSV_SIZE_BYTES`] further lines are dropped until the log
//! is cleared.

use core::fmt::{self, Debug, Write};

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Timer, with_timeout};
use log::{debug, error, info, warn};
use thiserror_no_std::Error;

use crate::config::{
    CSV_HEADER, CSV_INIT_BACKOFF, CSV_INIT_RETRIES, CSV_LINE_CAPACITY, EAGER_FLUSH_BELOW_BYTES,
    FLUSH_THRESHOLD_BYTES, LOCK_TIMEOUT, MAX_CSV_SIZE_BYTES, QUEUE_SEND_TIMEOUT,
};
use crate::latest::LatestValue;
use crate::light_bar::{ModeRequest, ModeRequests};
use crate::pipeline::CsvLineQueue;

pub type CsvLine = heapless::String<CSV_LINE_CAPACITY>;

/// One row of the log. `None` fields are written blank.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CsvRecord {
    /// Epoch seconds
    pub timestamp: u64,
    pub co2_ppm: Option<f32>,
    pub humidity_pct: Option<f32>,
    pub temperature_c: Option<f32>,
}

impl CsvRecord {
    /// Format as `timestamp,co2,humidity,temperature\n`.
    pub fn to_line(&self) -> Result<CsvLine, fmt::Error> {
        let mut line = CsvLine::new();
        write!(line, "{},", self.timestamp)?;
        if let Some(co2) = self.co2_ppm {
            write!(line, "{:.0}", co2)?;
        }
        line.push(',').map_err(|_| fmt::Error)?;
        if let Some(humidity) = self.humidity_pct {
            write!(line, "{:.1}", humidity)?;
        }
        line.push(',').map_err(|_| fmt::Error)?;
        if let Some(temperature) = self.temperature_c {
            write!(line, "{:.1}", temperature)?;
        }
        line.push('\n').map_err(|_| fmt::Error)?;
        Ok(line)
    }
}

/// Backing file of the CSV log
pub trait LogStorage {
    type Error: Debug;

    /// Open the log file, creating it when missing. Returns its size in bytes.
    fn open_or_create(&mut self) -> Result<u32, Self::Error>;

    fn append(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Make appended data durable.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Delete the log file. Removing a missing file is not an error.
    fn remove(&mut self) -> Result<(), Self::Error>;

    /// Read up to `buf.len()` bytes starting at `offset`. Returns 0 at the end.
    fn read_at(&mut self, offset: u32, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

#[derive(Error, Debug)]
pub enum CsvError<E: Debug> {
    #[error("log storage error: {0:?}")]
    Storage(E),
    #[error("log not initialized")]
    NotInitialized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Written, waiting for the next flush
    Buffered,
    Flushed,
    /// Log is full
    Dropped,
}

pub struct CsvLog<S: LogStorage> {
    storage: S,
    size: u32,
    unflushed: usize,
    ready: bool,
    cap_logged: bool,
}

impl<S: LogStorage> CsvLog<S> {
    pub const fn new(storage: S) -> Self {
        Self {
            storage,
            size: 0,
            unflushed: 0,
            ready: false,
            cap_logged: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Bytes in the log, including data not yet flushed
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Open the log and write the header if the file is new or empty.
    pub fn try_initialize(&mut self) -> Result<(), CsvError<S::Error>> {
        self.size = self.storage.open_or_create().map_err(CsvError::Storage)?;
        if self.size == 0 {
            self.write_header()?;
        }
        self.unflushed = 0;
        self.ready = true;
        info!("CSV log ready, {} bytes", self.size);
        Ok(())
    }

    fn write_header(&mut self) -> Result<(), CsvError<S::Error>> {
        self.storage
            .append(CSV_HEADER.as_bytes())
            .map_err(CsvError::Storage)?;
        self.storage.flush().map_err(CsvError::Storage)?;
        self.size = CSV_HEADER.len() as u32;
        Ok(())
    }

    pub fn append_line(&mut self, line: &str) -> Result<AppendOutcome, CsvError<S::Error>> {
        if !self.ready {
            return Err(CsvError::NotInitialized);
        }

        let len = line.len() as u32;
        if self.size.saturating_add(len) > MAX_CSV_SIZE_BYTES {
            if !self.cap_logged {
                warn!(
                    "CSV log full at {} bytes, dropping lines until cleared",
                    self.size
                );
                self.cap_logged = true;
            }
            return Ok(AppendOutcome::Dropped);
        }

        self.storage
            .append(line.as_bytes())
            .map_err(CsvError::Storage)?;
        self.size += len;
        self.unflushed += line.len();

        if self.unflushed > FLUSH_THRESHOLD_BYTES || self.size < EAGER_FLUSH_BELOW_BYTES {
            self.flush()?;
            return Ok(AppendOutcome::Flushed);
        }
        Ok(AppendOutcome::Buffered)
    }

    pub fn flush(&mut self) -> Result<(), CsvError<S::Error>> {
        self.storage.flush().map_err(CsvError::Storage)?;
        self.unflushed = 0;
        Ok(())
    }

    /// Delete the log and start over with just the header row.
    pub fn clear(&mut self) -> Result<(), CsvError<S::Error>> {
        self.storage.remove().map_err(CsvError::Storage)?;
        self.ready = false;
        self.size = self.storage.open_or_create().map_err(CsvError::Storage)?;
        self.write_header()?;
        self.unflushed = 0;
        self.cap_logged = false;
        self.ready = true;
        info!("CSV log cleared");
        Ok(())
    }

    /// Read part of the log for download. Pending data is flushed first.
    pub fn read_chunk(&mut self, offset: u32, buf: &mut [u8]) -> Result<usize, CsvError<S::Error>> {
        if !self.ready {
            return Err(CsvError::NotInitialized);
        }
        if self.unflushed > 0 {
            self.flush()?;
        }
        self.storage.read_at(offset, buf).map_err(CsvError::Storage)
    }
}

/// CSV log shared between the sink task and the download handler
pub type SharedCsvLog<S> = Mutex<CriticalSectionRawMutex, CsvLog<S>>;

/// Try to open the log a bounded number of times.
pub async fn initialize_with_retries<S: LogStorage>(log: &SharedCsvLog<S>) -> bool {
    initialize_with_policy(log, CSV_INIT_RETRIES, CSV_INIT_BACKOFF).await
}

async fn initialize_with_policy<S: LogStorage>(
    log: &SharedCsvLog<S>,
    attempts: u32,
    backoff: Duration,
) -> bool {
    for attempt in 1..=attempts {
        match log.lock().await.try_initialize() {
            Ok(()) => return true,
            Err(e) => warn!("CSV log open attempt {}/{} failed: {}", attempt, attempts, e),
        }
        if attempt < attempts {
            Timer::after(backoff).await;
        }
    }
    false
}

/// Queue a line for the sink, dropping it if the queue stays full.
pub async fn enqueue_line(queue: &CsvLineQueue, line: CsvLine) -> bool {
    match with_timeout(QUEUE_SEND_TIMEOUT, queue.send(line)).await {
        Ok(()) => true,
        Err(_) => {
            warn!("CSV queue full, dropping line");
            false
        }
    }
}

/// Current log size for a download's `Content-Length`.
pub async fn shared_size<S: LogStorage>(log: &SharedCsvLog<S>) -> Option<u32> {
    match with_timeout(LOCK_TIMEOUT, log.lock()).await {
        Ok(log) if log.is_ready() => Some(log.size()),
        Ok(_) => None,
        Err(_) => {
            warn!("CSV log busy, size unavailable");
            None
        }
    }
}

/// Read one download chunk, holding the lock for this chunk only.
pub async fn read_shared_chunk<S: LogStorage>(
    log: &SharedCsvLog<S>,
    offset: u32,
    buf: &mut [u8],
) -> Option<usize> {
    match with_timeout(LOCK_TIMEOUT, log.lock()).await {
        Ok(mut log) => match log.read_chunk(offset, buf) {
            Ok(n) => Some(n),
            Err(e) => {
                error!("CSV read at {} failed: {}", offset, e);
                None
            }
        },
        Err(_) => {
            warn!("CSV log busy, download aborted at {}", offset);
            None
        }
    }
}

/// Clear the log, reopening it if the clear left it closed.
///
/// Returns `false` if the log could not be reopened.
async fn handle_clear<S: LogStorage>(log: &SharedCsvLog<S>) -> bool {
    clear_with_policy(log, CSV_INIT_RETRIES, CSV_INIT_BACKOFF).await
}

async fn clear_with_policy<S: LogStorage>(
    log: &SharedCsvLog<S>,
    attempts: u32,
    backoff: Duration,
) -> bool {
    let ready = match with_timeout(LOCK_TIMEOUT, log.lock()).await {
        Ok(mut log) => {
            if let Err(e) = log.clear() {
                error!("CSV clear failed: {}", e);
            }
            log.is_ready()
        }
        Err(_) => {
            warn!("CSV log busy, clear skipped");
            return true;
        }
    };
    if ready {
        return true;
    }
    warn!("CSV log closed by failed clear, reopening");
    initialize_with_policy(log, attempts, backoff).await
}

async fn handle_line<S: LogStorage>(log: &SharedCsvLog<S>, line: &str) {
    match with_timeout(LOCK_TIMEOUT, log.lock()).await {
        Ok(mut log) => match log.append_line(line) {
            Ok(outcome) => debug!("CSV line {:?}", outcome),
            Err(e) => error!("CSV append failed: {}", e),
        },
        Err(_) => warn!("CSV log busy, line dropped"),
    }
}

/// CSV sink task.
///
/// Opens the log (signalling the LED `Error` mode and parking if that fails),
/// then serves clear requests and queued lines forever. A clear that leaves
/// the log closed is retried like the first open.
pub async fn run_csv_sink<S: LogStorage>(
    log: &SharedCsvLog<S>,
    lines: &CsvLineQueue,
    clear: &LatestValue<()>,
    modes: &ModeRequests,
) -> ! {
    if !initialize_with_retries(log).await {
        error!("CSV log unavailable, sink parked");
        park(modes).await
    }

    loop {
        match select(clear.wait(), lines.receive()).await {
            Either::First(()) => {
                if !handle_clear(log).await {
                    error!("CSV log lost after clear, sink parked");
                    park(modes).await
                }
            }
            Either::Second(line) => handle_line(log, &line).await,
        }
    }
}

async fn park(modes: &ModeRequests) -> ! {
    modes.publish(ModeRequest::Error);
    loop {
        Timer::after(Duration::from_secs(3600)).await;
    }
}

/// Size of the CSV download, `None` when there is no usable log.
pub async fn download_size<S: LogStorage>(log: Option<&SharedCsvLog<S>>) -> Option<u32> {
    match log {
        Some(log) => shared_size(log).await,
        None => None,
    }
}
