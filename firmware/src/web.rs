use std::collections::HashMap;

use tempmon_common::{render_template, NetworkConfig, Settings, TemperatureMonitor};

/// Login and status page. Rendered through the `%NAME%` placeholder processor.
pub const INDEX_HTML: &str = include_str!("../web/index.html");

/// Dashboard polling `/data` and `/info`. Served as-is.
pub const DASHBOARD_HTML: &str = include_str!("../web/dashboard.html");

pub const CONTENT_TYPE_HTML: &str = "text/html; charset=utf-8";
pub const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";
pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";

pub fn render_index(monitor: &TemperatureMonitor) -> String {
    render_template(INDEX_HTML, |placeholder| monitor.placeholder(placeholder))
}

pub fn settings_ack(settings: &Settings) -> String {
    format!(
        "Settings updated: min {:.2} C, max {:.2} C, timer delay {} min",
        settings.min_threshold_c, settings.max_threshold_c, settings.poll_interval
    )
}

pub fn provisioning_ack(network: &NetworkConfig) -> String {
    format!(
        "Credentials saved for '{}' ({}). The device will restart and join the network.",
        network.ssid,
        network.security.as_str()
    )
}

/// Splits the query part of a request URI into decoded key/value pairs.
/// Later duplicates win.
#[cfg_attr(not(feature = "esp32"), allow(dead_code))]
pub fn parse_query(uri: &str) -> HashMap<String, String> {
    let Some((_, query)) = uri.split_once('?') else {
        return HashMap::new();
    };
    let query = query.split('#').next().unwrap_or_default();

    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (percent_decode(key), percent_decode(value))
        })
        .collect()
}

#[cfg_attr(not(feature = "esp32"), allow(dead_code))]
fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                decoded.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(high), Some(low)) => {
                        decoded.push((high << 4) | low);
                        i += 3;
                    }
                    _ => {
                        decoded.push(b'%');
                        i += 1;
                    }
                }
            }
            byte => {
                decoded.push(byte);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&decoded).into_owned()
}

#[cfg_attr(not(feature = "esp32"), allow(dead_code))]
fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempmon_common::{MonitorConfig, Reading};

    #[test]
    fn index_page_substitutes_latest_reading() {
        let mut monitor =
            TemperatureMonitor::new(&MonitorConfig::default(), Settings::default()).unwrap();
        monitor.record(Reading::new(
            Some(21.5),
            Some(70.7),
            "2024-01-18 09:30:00".to_string(),
        ));

        let page = render_index(&monitor);

        assert!(page.contains("<span id=\"temperaturec\">21.50</span>"));
        assert!(page.contains("<span id=\"temperaturef\">70.70</span>"));
        assert!(page.contains("2024-01-18 09:30:00"));
        assert!(page.contains("width: 100%;"));
        assert!(!page.contains("%TEMPERATUREC%"));
    }

    #[test]
    fn index_page_without_readings_shows_missing_marker() {
        let monitor =
            TemperatureMonitor::new(&MonitorConfig::default(), Settings::default()).unwrap();
        assert!(render_index(&monitor).contains("<span id=\"temperaturec\">--</span>"));
    }

    #[test]
    fn parses_and_decodes_query_strings() {
        let params = parse_query("/get?SSID=My+Home%20Net&Password=p%26ss&Security=WPA2-Personal");

        assert_eq!(params.get("SSID").map(String::as_str), Some("My Home Net"));
        assert_eq!(params.get("Password").map(String::as_str), Some("p&ss"));
        assert_eq!(
            params.get("Security").map(String::as_str),
            Some("WPA2-Personal")
        );
    }

    #[test]
    fn query_parsing_tolerates_odd_input() {
        assert!(parse_query("/data").is_empty());

        let params = parse_query("/updateSettings?timerDelay=60&flag&bad=%zz&tail=%4");
        assert_eq!(params.get("timerDelay").map(String::as_str), Some("60"));
        assert_eq!(params.get("flag").map(String::as_str), Some(""));
        assert_eq!(params.get("bad").map(String::as_str), Some("%zz"));
        assert_eq!(params.get("tail").map(String::as_str), Some("%4"));
    }
}
