//! Data sinks fed by the sensor manager
//!
//! - [`timeseries`]: bounded in-memory history for the live chart
//! - [`csv_log`]: append-only CSV file for download

pub mod csv_log;
pub mod timeseries;

pub use csv_log::{
    AppendOutcome, CsvError, CsvLine, CsvLog, CsvRecord, LogStorage, SharedCsvLog, download_size,
    enqueue_line, initialize_with_retries, read_shared_chunk, run_csv_sink, shared_size,
};
pub use timeseries::{
    SeriesChannel, SeriesUpdate, SharedTimeSeries, StoreError, TimeSeriesStore, run_series_task,
};
