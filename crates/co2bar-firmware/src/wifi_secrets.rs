//! Access point credentials baked in by `build.rs`

use co2bar_core::config::{AccessPointConfig, Config};

pub const AP_SSID: &str = env!("AP_SSID");
pub const AP_PASSWORD: &str = env!("AP_PASSWORD");

pub fn config() -> Config<'static> {
    Config {
        access_point: AccessPointConfig {
            ssid: AP_SSID,
            password: AP_PASSWORD,
        },
    }
}
