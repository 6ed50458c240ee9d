use std::collections::HashMap;
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::nmea::NmeaSentenceKind;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("missing required key {0}")]
    MissingKey(&'static str),

    #[error("key {key} has invalid value {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Typed view of the `setup`-produced key=value file.
#[derive(Debug, Clone)]
pub struct Config {
    pub serial_port: String,
    pub serial_baud: u32,
    pub serial_delay: f64,
    pub serial_error: f64,
    pub nmea_type: NmeaSentenceKind,
    pub ntp_address: String,
    pub ntp_poll: i8,
}

impl Config {
    /// Platform default config path, used when no path is given on the
    /// command line.
    pub fn default_path() -> &'static str {
        #[cfg(target_os = "linux")]
        {
            "/etc/gps-ntp/config.env"
        }
        #[cfg(not(target_os = "linux"))]
        {
            "config.env"
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let content = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_ref.display().to_string(),
            source,
        })?;
        Self::from_str(&content)
    }

    fn from_str(content: &str) -> Result<Self, ConfigError> {
        let mut values: HashMap<&str, &str> = HashMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                values.insert(key.trim(), value.trim());
            }
        }

        let required = |key: &'static str| -> Result<&str, ConfigError> {
            values.get(key).copied().ok_or(ConfigError::MissingKey(key))
        };

        let parse = |key: &'static str, value: &str| -> Result<f64, ConfigError> {
            value.parse().map_err(|_| ConfigError::InvalidValue {
                key,
                value: value.to_string(),
            })
        };

        let serial_port = required("SERIAL_PORT")?.to_string();

        let serial_baud_raw = required("SERIAL_BAUD")?;
        let serial_baud: u32 = serial_baud_raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                key: "SERIAL_BAUD",
                value: serial_baud_raw.to_string(),
            })?;

        let serial_delay = parse("SERIAL_DELAY", required("SERIAL_DELAY")?)?;
        let serial_error = parse("SERIAL_ERROR", required("SERIAL_ERROR")?)?;

        let nmea_type_raw = required("NMEA_TYPE")?;
        let nmea_type =
            NmeaSentenceKind::from_config_str(nmea_type_raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "NMEA_TYPE",
                value: nmea_type_raw.to_string(),
            })?;

        let ntp_address = required("NTP_ADDRESS")?.to_string();

        let ntp_poll_raw = required("NTP_POLL")?;
        let ntp_poll: i8 = ntp_poll_raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                key: "NTP_POLL",
                value: ntp_poll_raw.to_string(),
            })?;

        Ok(Config {
            serial_port,
            serial_baud,
            serial_delay,
            serial_error,
            nmea_type,
            ntp_address,
            ntp_poll,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "\
# comment line is ignored
SERIAL_PORT=/dev/ttyUSB0
SERIAL_BAUD=9600
SERIAL_DELAY=0.012
SERIAL_ERROR=0.004

NMEA_TYPE=$GPRMC
NTP_ADDRESS=0.0.0.0
NTP_POLL=6
";

    #[test]
    fn parses_valid_config() {
        let config = Config::from_str(VALID).unwrap();
        assert_eq!(config.serial_port, "/dev/ttyUSB0");
        assert_eq!(config.serial_baud, 9600);
        assert_eq!(config.serial_delay, 0.012);
        assert_eq!(config.serial_error, 0.004);
        assert_eq!(config.nmea_type, NmeaSentenceKind::Gprmc);
        assert_eq!(config.ntp_address, "0.0.0.0");
        assert_eq!(config.ntp_poll, 6);
    }

    #[test]
    fn missing_key_is_fatal() {
        let without_poll = VALID.replace("NTP_POLL=6\n", "");
        let err = Config::from_str(&without_poll).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey("NTP_POLL")));
    }

    #[test]
    fn invalid_nmea_type_is_rejected() {
        let bad = VALID.replace("$GPRMC", "$GPGGA");
        let err = Config::from_str(&bad).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key: "NMEA_TYPE", .. }
        ));
    }

    #[test]
    fn invalid_numeric_field_is_rejected() {
        let bad = VALID.replace("SERIAL_BAUD=9600", "SERIAL_BAUD=fast");
        let err = Config::from_str(&bad).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key: "SERIAL_BAUD", .. }
        ));
    }
}
