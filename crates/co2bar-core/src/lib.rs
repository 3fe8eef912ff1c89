//! Hardware-independent core library for co2bar
//!
//! This crate contains all platform-agnostic logic for the co2bar CO2 monitor:
//! sensor traits, the smoothing and mapping engine, the LED bar renderer, the
//! rolling time-series store, the CSV log and the sensor manager that drives
//! them, plus HTTP route handling for the web UI.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32-S3) and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

pub mod app_state;
pub mod clock;
pub mod config;
pub mod latest;
pub mod light_bar;
pub mod pipeline;
pub mod scale;
pub mod sensor_manager;
pub mod sensors;
pub mod smoothing;
pub mod storage;
pub mod web;
