//! ESP32-S3 firmware-specific modules for co2bar
//!
//! This crate contains the hardware-specific code that cannot compile on
//! desktop targets: peripheral bring-up, the concrete SCD41/SHT40/BH1750
//! sensor adapters, the SD card log backend, the RTC-backed clock, the
//! access point's DHCP server and the TCP server for the web UI.

#![no_std]

extern crate alloc;

pub mod app_state;
pub mod async_i2c_bus;
pub mod clock;
pub mod dhcp;
pub mod sd_log;
pub mod web_server;
pub mod wifi_secrets;
