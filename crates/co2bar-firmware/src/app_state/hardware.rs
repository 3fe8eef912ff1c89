//! Hardware initialization for the co2bar board
//!
//! Pin map (ESP32-S3):
//!
//! | Function        | Pins                          |
//! |-----------------|-------------------------------|
//! | Sensor I2C      | SDA GPIO8, SCL GPIO9          |
//! | LED strip data  | SPI2 MOSI GPIO10 (WS2812)     |
//! | SD card         | SPI3 SCK GPIO12, MOSI GPIO11, MISO GPIO13, CS GPIO14 |

use embassy_time::Delay;
use embedded_hal_bus::spi::{ExclusiveDevice, NoDelay};
use esp_hal::Blocking;
use esp_hal::dma::{DmaRxBuf, DmaTxBuf};
use esp_hal::dma_buffers;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::peripherals;
use esp_hal::spi::Mode;
use esp_hal::spi::master::{Config as SpiConfig, Spi, SpiDmaBus};
use esp_hal::time::Rate;
use log::info;
use static_cell::StaticCell;
use ws2812_spi::prerendered::Ws2812;

use co2bar_core::app_state::AppError;
use co2bar_core::config::PIXEL_COUNT;

use crate::async_i2c_bus::{AsyncI2cDevice, I2cBus};

pub type SensorI2c = I2c<'static, esp_hal::Async>;
pub type SensorI2cDevice = AsyncI2cDevice<'static, SensorI2c>;

/// ws2812-spi needs 12 SPI bytes per LED
const LED_SPI_BUF_LEN: usize = PIXEL_COUNT * 12;

pub type LedStrip = Ws2812<'static, SpiDmaBus<'static, Blocking>>;

pub type SdSpiDevice = ExclusiveDevice<Spi<'static, Blocking>, Output<'static>, NoDelay>;
pub type SdCardDevice = embedded_sdmmc::SdCard<SdSpiDevice, Delay>;

/// One bus handle per sensor
pub struct SensorDevices {
    pub scd41: SensorI2cDevice,
    pub sht40: SensorI2cDevice,
    pub bh1750: SensorI2cDevice,
}

pub fn create_i2c_bus(
    i2c0: peripherals::I2C0<'static>,
    sda: peripherals::GPIO8<'static>,
    scl: peripherals::GPIO9<'static>,
) -> Result<SensorI2c, AppError> {
    let i2c = I2c::new(i2c0, I2cConfig::default().with_frequency(Rate::from_khz(100)))
        .map_err(|_| AppError::Sensor(AppError::message("I2C bus configuration rejected")))?;
    Ok(i2c.with_sda(sda).with_scl(scl).into_async())
}

/// Put the sensor bus behind a static async mutex and hand out device handles.
pub fn init_i2c_sensors(i2c: SensorI2c) -> SensorDevices {
    static SENSOR_BUS: StaticCell<I2cBus<SensorI2c>> = StaticCell::new();
    let bus = SENSOR_BUS.init(I2cBus::new(i2c));

    info!("Sensor I2C bus ready");
    SensorDevices {
        scd41: AsyncI2cDevice::new(bus),
        sht40: AsyncI2cDevice::new(bus),
        bh1750: AsyncI2cDevice::new(bus),
    }
}

/// WS2812 strip driven by SPI2 + DMA at 3.2 MHz.
pub fn create_led_strip(
    spi2: peripherals::SPI2<'static>,
    mosi: peripherals::GPIO10<'static>,
    dma: peripherals::DMA_CH0<'static>,
) -> Result<LedStrip, AppError> {
    let strip_error = |details: &str| AppError::LightStrip(AppError::message(details));

    let (rx_buf, rx_desc, tx_buf, tx_desc) = dma_buffers!(LED_SPI_BUF_LEN);
    let dma_rx = DmaRxBuf::new(rx_desc, rx_buf).map_err(|_| strip_error("DMA RX buffer"))?;
    let dma_tx = DmaTxBuf::new(tx_desc, tx_buf).map_err(|_| strip_error("DMA TX buffer"))?;

    let config = SpiConfig::default()
        .with_frequency(Rate::from_khz(3200))
        .with_mode(Mode::_0);
    let spi = Spi::new(spi2, config)
        .map_err(|_| strip_error("SPI2 configuration rejected"))?
        .with_mosi(mosi)
        .with_dma(dma)
        .with_buffers(dma_rx, dma_tx);

    static LED_BUF: StaticCell<[u8; LED_SPI_BUF_LEN]> = StaticCell::new();
    let buf = LED_BUF.init([0u8; LED_SPI_BUF_LEN]);

    info!("LED strip ready ({} pixels)", PIXEL_COUNT);
    Ok(Ws2812::new(spi, buf))
}

pub struct SdCardPins {
    pub sck: peripherals::GPIO12<'static>,
    pub mosi: peripherals::GPIO11<'static>,
    pub miso: peripherals::GPIO13<'static>,
    pub cs: peripherals::GPIO14<'static>,
}

/// SD card on SPI3 at 400 kHz (the SD init clock).
pub fn create_sd_card(
    spi3: peripherals::SPI3<'static>,
    pins: SdCardPins,
) -> Result<SdCardDevice, AppError> {
    let spi = Spi::new(spi3, SpiConfig::default().with_frequency(Rate::from_khz(400)))
        .map_err(|_| AppError::Storage(AppError::message("SPI3 configuration rejected")))?
        .with_sck(pins.sck)
        .with_mosi(pins.mosi)
        .with_miso(pins.miso);
    let cs = Output::new(pins.cs, Level::High, OutputConfig::default());
    let device = ExclusiveDevice::new_no_delay(spi, cs)
        .map_err(|_| AppError::Storage(AppError::message("SD chip select")))?;

    Ok(embedded_sdmmc::SdCard::new(device, Delay))
}
