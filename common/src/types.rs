use serde::Serialize;

use crate::{
    alert::AlertState,
    reading::{format_temperature, Reading},
    settings::Settings,
};

/// One row of the `/data` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataRow {
    #[serde(rename = "temperatureC")]
    pub temperature_c: String,
    #[serde(rename = "temperatureF")]
    pub temperature_f: String,
    #[serde(rename = "currentTime")]
    pub current_time: String,
}

/// The single element of the `/info` array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusInfo {
    #[serde(rename = "SSID")]
    pub ssid: String,
    #[serde(rename = "IP")]
    pub ip: String,
    #[serde(rename = "UpTime")]
    pub uptime_secs: u64,
    #[serde(rename = "MinTemp")]
    pub min_temp: f32,
    #[serde(rename = "MaxTemp")]
    pub max_temp: f32,
    #[serde(rename = "timerDelay")]
    pub timer_delay: String,
    #[serde(rename = "Alert")]
    pub alert: &'static str,
}

/// Host network facts supplied by whichever transport is running.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkInfo {
    pub ssid: String,
    pub ip: String,
}

/// Faulted readings stay in history but are never rendered as rows.
pub fn data_table<'a, I>(readings: I) -> Vec<DataRow>
where
    I: IntoIterator<Item = &'a Reading>,
{
    readings
        .into_iter()
        .filter(|reading| !reading.is_fault())
        .map(|reading| DataRow {
            temperature_c: format_temperature(reading.temperature_c),
            temperature_f: format_temperature(reading.temperature_f),
            current_time: reading.timestamp.clone(),
        })
        .collect()
}

pub fn status_info(
    settings: &Settings,
    network: &NetworkInfo,
    uptime_secs: u64,
    alert: AlertState,
) -> [StatusInfo; 1] {
    [StatusInfo {
        ssid: network.ssid.clone(),
        ip: network.ip.clone(),
        uptime_secs,
        min_temp: settings.min_threshold_c,
        max_temp: settings.max_threshold_c,
        timer_delay: settings.poll_interval.to_string(),
        alert: alert.as_str(),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::PollInterval;
    use pretty_assertions::assert_eq;

    #[test]
    fn table_skips_faulted_rows() {
        let readings = [
            Reading::new(Some(21.0), Some(69.8), "t1".to_string()),
            Reading::fault("t2".to_string()),
            Reading::new(Some(22.25), None, "t3".to_string()),
        ];

        let rows = data_table(&readings);

        assert_eq!(
            rows,
            vec![
                DataRow {
                    temperature_c: "21.00".to_string(),
                    temperature_f: "69.80".to_string(),
                    current_time: "t1".to_string(),
                },
                DataRow {
                    temperature_c: "22.25".to_string(),
                    temperature_f: "--".to_string(),
                    current_time: "t3".to_string(),
                },
            ]
        );
    }

    #[test]
    fn rows_serialize_with_client_field_names() {
        let rows = data_table(&[Reading::new(Some(20.5), Some(68.9), "t".to_string())]);
        let json = serde_json::to_value(&rows).unwrap();

        assert_eq!(
            json,
            serde_json::json!([
                { "temperatureC": "20.50", "temperatureF": "68.90", "currentTime": "t" }
            ])
        );
    }

    #[test]
    fn status_is_a_single_element_array() {
        let settings = Settings {
            min_threshold_c: 19.5,
            max_threshold_c: 24.0,
            poll_interval: PollInterval::Min90,
        };
        let network = NetworkInfo {
            ssid: "lab".to_string(),
            ip: "192.168.1.40".to_string(),
        };

        let json =
            serde_json::to_value(status_info(&settings, &network, 3_725, AlertState::Normal))
                .unwrap();

        assert_eq!(
            json,
            serde_json::json!([{
                "SSID": "lab",
                "IP": "192.168.1.40",
                "UpTime": 3725,
                "MinTemp": 19.5,
                "MaxTemp": 24.0,
                "timerDelay": "90",
                "Alert": "NORMAL"
            }])
        );
    }
}
