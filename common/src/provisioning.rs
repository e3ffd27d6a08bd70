use std::collections::HashMap;

use thiserror::Error;

use crate::config::{NetworkConfig, WifiSecurity};

/// Longest SSID the 802.11 station config accepts.
pub const MAX_SSID_LEN: usize = 32;
/// Longest WPA2 passphrase the station config accepts.
pub const MAX_PASSWORD_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisioningError {
    #[error("SSID is required")]
    MissingSsid,
    #[error("SSID is longer than {MAX_SSID_LEN} bytes")]
    SsidTooLong,
    #[error("password is longer than {MAX_PASSWORD_LEN} bytes")]
    PasswordTooLong,
    #[error("unknown security type '{0}'")]
    UnknownSecurity(String),
    #[error("WPA2-Enterprise requires a username")]
    MissingUsername,
}

/// Credentials submitted by the login form on `/get`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningRequest {
    pub network: NetworkConfig,
}

impl ProvisioningRequest {
    pub fn from_query(params: &HashMap<String, String>) -> Result<Self, ProvisioningError> {
        let field = |name: &str| params.get(name).cloned().unwrap_or_default();

        let ssid = field("SSID").trim().to_string();
        if ssid.is_empty() {
            return Err(ProvisioningError::MissingSsid);
        }
        if ssid.len() > MAX_SSID_LEN {
            return Err(ProvisioningError::SsidTooLong);
        }

        let password = field("Password");
        if password.len() > MAX_PASSWORD_LEN {
            return Err(ProvisioningError::PasswordTooLong);
        }

        let security = match field("Security").trim() {
            "" | "WPA2-Personal" => WifiSecurity::Wpa2Personal,
            "WPA2-Enterprise" => WifiSecurity::Wpa2Enterprise,
            other => return Err(ProvisioningError::UnknownSecurity(other.to_string())),
        };

        let username = field("Username").trim().to_string();
        if security == WifiSecurity::Wpa2Enterprise && username.is_empty() {
            return Err(ProvisioningError::MissingUsername);
        }

        Ok(Self {
            network: NetworkConfig {
                ssid,
                password,
                security,
                username,
                passcode: field("Passcode"),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_personal_network() {
        let request = ProvisioningRequest::from_query(&query(&[
            ("SSID", " greenhouse "),
            ("Password", "hunter22"),
            ("Security", "WPA2-Personal"),
        ]))
        .unwrap();

        assert_eq!(
            request.network,
            NetworkConfig {
                ssid: "greenhouse".to_string(),
                password: "hunter22".to_string(),
                security: WifiSecurity::Wpa2Personal,
                username: String::new(),
                passcode: String::new(),
            }
        );
    }

    #[test]
    fn enterprise_needs_username() {
        let err = ProvisioningRequest::from_query(&query(&[
            ("SSID", "campus"),
            ("Security", "WPA2-Enterprise"),
        ]))
        .unwrap_err();

        assert_eq!(err, ProvisioningError::MissingUsername);
    }

    #[test]
    fn rejects_missing_ssid_and_unknown_security() {
        assert_eq!(
            ProvisioningRequest::from_query(&query(&[("Password", "x")])),
            Err(ProvisioningError::MissingSsid)
        );
        assert_eq!(
            ProvisioningRequest::from_query(&query(&[("SSID", "lab"), ("Security", "WEP")])),
            Err(ProvisioningError::UnknownSecurity("WEP".to_string()))
        );
    }
}
