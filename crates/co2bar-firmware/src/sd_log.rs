//! CSV log backend on the SD card (FAT, root directory)
//!
//! embedded-sdmmc is blocking. Every operation opens the volume, the root
//! directory and the file, does its work and closes them again, so no handle
//! outlives a single call and a card pulled between calls only fails that
//! call. Appends are collected in RAM and written in one go on `flush`.

use embedded_sdmmc::{
    Error as SdError, Mode, SdCard, SdCardError, TimeSource, Timestamp, VolumeIdx, VolumeManager,
};
use log::{debug, warn};

use co2bar_core::config::{CSV_FILE_NAME, CSV_LINE_CAPACITY, FLUSH_THRESHOLD_BYTES};
use co2bar_core::storage::LogStorage;

/// Room for a full flush batch plus the line that pushes it over the threshold
const PENDING_CAPACITY: usize = FLUSH_THRESHOLD_BYTES + 2 * CSV_LINE_CAPACITY;

/// FAT timestamps for the log file.
///
/// Files are stamped with a fixed date; the CSV rows carry the real time.
pub struct FixedTimeSource;

impl TimeSource for FixedTimeSource {
    fn get_timestamp(&self) -> Timestamp {
        Timestamp {
            year_since_1970: 54,
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }
}

pub struct SdLogStorage<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    volume_mgr: VolumeManager<SdCard<S, D>, T, 4, 4, 1>,
    pending: heapless::Vec<u8, PENDING_CAPACITY>,
}

impl<S, D, T> SdLogStorage<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    pub fn new(sd_card: SdCard<S, D>, ts: T) -> Self {
        Self {
            volume_mgr: VolumeManager::new(sd_card, ts),
            pending: heapless::Vec::new(),
        }
    }

    fn write_pending(&mut self) -> Result<(), SdError<SdCardError>> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let volume = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume.open_root_dir()?;
        let file = root_dir.open_file_in_dir(CSV_FILE_NAME, Mode::ReadWriteCreateOrAppend)?;
        file.write(&self.pending)?;
        file.close()?;
        root_dir.close()?;
        volume.close()?;

        debug!("SD: wrote {} bytes", self.pending.len());
        self.pending.clear();
        Ok(())
    }
}

impl<S, D, T> LogStorage for SdLogStorage<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    type Error = SdError<SdCardError>;

    fn open_or_create(&mut self) -> Result<u32, Self::Error> {
        let volume = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume.open_root_dir()?;
        let file = root_dir.open_file_in_dir(CSV_FILE_NAME, Mode::ReadWriteCreateOrAppend)?;
        let length = file.length();
        file.close()?;
        root_dir.close()?;
        volume.close()?;
        Ok(length + self.pending.len() as u32)
    }

    fn append(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        if self.pending.len() + data.len() > PENDING_CAPACITY {
            self.write_pending()?;
        }
        if self.pending.extend_from_slice(data).is_err() {
            // Larger than the whole buffer: write straight through.
            self.pending.clear();
            let volume = self.volume_mgr.open_volume(VolumeIdx(0))?;
            let root_dir = volume.open_root_dir()?;
            let file =
                root_dir.open_file_in_dir(CSV_FILE_NAME, Mode::ReadWriteCreateOrAppend)?;
            file.write(data)?;
            file.close()?;
            root_dir.close()?;
            volume.close()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.write_pending()
    }

    fn remove(&mut self) -> Result<(), Self::Error> {
        self.pending.clear();
        let volume = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume.open_root_dir()?;
        match root_dir.delete_file_in_dir(CSV_FILE_NAME) {
            Ok(()) | Err(SdError::NotFound) => {}
            Err(e) => {
                warn!("SD: delete {} failed: {:?}", CSV_FILE_NAME, e);
                return Err(e);
            }
        }
        root_dir.close()?;
        volume.close()?;
        Ok(())
    }

    fn read_at(&mut self, offset: u32, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let volume = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume.open_root_dir()?;
        let file = root_dir.open_file_in_dir(CSV_FILE_NAME, Mode::ReadOnly)?;

        let read = if offset >= file.length() {
            0
        } else {
            file.seek_from_start(offset)?;
            file.read(buf)?
        };

        file.close()?;
        root_dir.close()?;
        volume.close()?;
        Ok(read)
    }
}
