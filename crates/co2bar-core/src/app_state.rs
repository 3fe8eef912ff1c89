//! Application-wide run state and error types for co2bar

use thiserror_no_std::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppRunState {
    Uninitialized,
    AccessPointStarting,
    AccessPointUp,
    SensorsRunning,
    TimeKnown,
    Error,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Access point failed: {0}")]
    AccessPoint(heapless::String<64>),
    #[error("Storage error: {0}")]
    Storage(heapless::String<64>),
    #[error("Sensor error: {0}")]
    Sensor(heapless::String<64>),
    #[error("LED strip error: {0}")]
    LightStrip(heapless::String<64>),
    #[error("Unknown error")]
    Unknown,
}

impl AppError {
    /// Build an error message, truncating anything that does not fit.
    pub fn message(text: &str) -> heapless::String<64> {
        let mut message = heapless::String::new();
        for ch in text.chars() {
            if message.push(ch).is_err() {
                break;
            }
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_truncates_long_text() {
        let long = "x".repeat(100);
        let message = AppError::message(&long);
        assert_eq!(message.len(), 64);
    }

    #[test]
    fn test_message_keeps_short_text() {
        let message = AppError::message("sd card missing");
        assert_eq!(message.as_str(), "sd card missing");
    }
}
