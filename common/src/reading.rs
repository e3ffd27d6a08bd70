use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Celsius value the DS18B20 driver reports when the device is disconnected.
pub const DEVICE_DISCONNECTED_C: f32 = -127.0;

/// Integer part of the Fahrenheit value reported for a disconnected device.
pub const DEVICE_DISCONNECTED_F_TRUNC: i32 = -196;

/// Shown wherever a reading is unavailable.
pub const MISSING_VALUE: &str = "--";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("temperature sensor returned no valid reading")]
pub struct SensorFault;

/// One sample. `None` marks a sensor fault and is never coerced to a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub temperature_c: Option<f32>,
    pub temperature_f: Option<f32>,
    pub timestamp: String,
}

impl Reading {
    pub fn new(temperature_c: Option<f32>, temperature_f: Option<f32>, timestamp: String) -> Self {
        Self {
            temperature_c,
            temperature_f,
            timestamp,
        }
    }

    pub fn fault(timestamp: String) -> Self {
        Self::new(None, None, timestamp)
    }

    pub fn is_fault(&self) -> bool {
        self.temperature_c.is_none()
    }

    pub fn celsius_text(&self) -> String {
        format_temperature(self.temperature_c)
    }

    pub fn fahrenheit_text(&self) -> String {
        format_temperature(self.temperature_f)
    }
}

/// Two decimals, or the missing marker.
pub fn format_temperature(value: Option<f32>) -> String {
    match value {
        Some(value) => format!("{value:.2}"),
        None => MISSING_VALUE.to_string(),
    }
}

pub fn celsius_to_fahrenheit(temp_c: f32) -> f32 {
    temp_c * 9.0 / 5.0 + 32.0
}

/// Black-box access to a single temperature probe on the bus.
///
/// Implementations return the raw value the hardware produced, including the
/// reserved disconnect sentinels; [`SensorReader`] is responsible for turning
/// those into [`SensorFault`].
pub trait TemperatureDriver {
    /// Starts a fresh conversion. May block for the conversion time.
    fn request_temperatures(&mut self);

    fn raw_celsius(&mut self) -> f32;

    fn raw_fahrenheit(&mut self) -> f32 {
        celsius_to_fahrenheit(self.raw_celsius())
    }
}

#[derive(Debug)]
pub struct SensorReader<D> {
    driver: D,
}

impl<D: TemperatureDriver> SensorReader<D> {
    pub fn new(driver: D) -> Self {
        Self { driver }
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn read_celsius(&mut self) -> Result<f32, SensorFault> {
        self.driver.request_temperatures();
        let temp_c = self.driver.raw_celsius();
        if !temp_c.is_finite() || temp_c == DEVICE_DISCONNECTED_C {
            return Err(SensorFault);
        }
        Ok(temp_c)
    }

    pub fn read_fahrenheit(&mut self) -> Result<f32, SensorFault> {
        self.driver.request_temperatures();
        let temp_f = self.driver.raw_fahrenheit();
        if !temp_f.is_finite() || temp_f as i32 == DEVICE_DISCONNECTED_F_TRUNC {
            return Err(SensorFault);
        }
        Ok(temp_f)
    }

    pub fn sample(&mut self, timestamp: String) -> Reading {
        Reading::new(
            self.read_celsius().ok(),
            self.read_fahrenheit().ok(),
            timestamp,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct FixedDriver {
        celsius: f32,
        conversions: u32,
    }

    impl TemperatureDriver for FixedDriver {
        fn request_temperatures(&mut self) {
            self.conversions += 1;
        }

        fn raw_celsius(&mut self) -> f32 {
            self.celsius
        }
    }

    fn reader(celsius: f32) -> SensorReader<FixedDriver> {
        SensorReader::new(FixedDriver {
            celsius,
            conversions: 0,
        })
    }

    #[test]
    fn disconnected_sentinel_is_a_fault_in_both_scales() {
        let mut reader = reader(DEVICE_DISCONNECTED_C);
        assert_eq!(reader.read_celsius(), Err(SensorFault));
        assert_eq!(reader.read_fahrenheit(), Err(SensorFault));
    }

    #[test]
    fn zero_celsius_is_a_real_reading() {
        let mut reader = reader(0.0);
        assert_eq!(reader.read_celsius(), Ok(0.0));
        assert_eq!(reader.read_fahrenheit(), Ok(32.0));
    }

    #[test]
    fn nan_is_a_fault() {
        let mut reader = reader(f32::NAN);
        assert_eq!(reader.read_celsius(), Err(SensorFault));
    }

    #[test]
    fn every_read_requests_a_new_conversion() {
        let mut reader = reader(21.5);
        let _ = reader.read_celsius();
        let _ = reader.read_fahrenheit();
        let _ = reader.sample("t".to_string());
        assert_eq!(reader.driver_mut().conversions, 4);
    }

    #[test]
    fn faulted_sample_keeps_timestamp_and_drops_values() {
        let mut reader = reader(DEVICE_DISCONNECTED_C);
        let reading = reader.sample("12:00:00".to_string());
        assert!(reading.is_fault());
        assert_eq!(reading.temperature_f, None);
        assert_eq!(reading.timestamp, "12:00:00");
        assert_eq!(reading.celsius_text(), MISSING_VALUE);
    }

    #[test]
    fn temperatures_render_with_two_decimals() {
        assert_eq!(format_temperature(Some(23.4375)), "23.44");
        assert_eq!(format_temperature(Some(-0.5)), "-0.50");
    }
}
