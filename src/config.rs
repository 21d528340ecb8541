use fnv::FnvHashSet;
use serde_derive::{Deserialize, Serialize};

use crate::{BookingError, Result, StationLine, CANCELLATION_FEE_FRACTION, DEFAULT_STATIONS, TOTAL_SEATS};

/// Settings for one train run.
///
/// Every field has a default, so an empty TOML document is a valid
/// configuration:
///
/// ```toml
/// capacity = 120
/// stations = ["A", "B", "C", "D", "E"]
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    #[serde(default = "default_capacity")]
    pub capacity: u32,

    #[serde(default = "default_cancellation_fee_fraction")]
    pub cancellation_fee_fraction: f64,

    #[serde(default = "default_stations")]
    pub stations: Vec<String>,

    /// Rate used when a caller does not name one
    #[serde(default = "default_fare_per_section")]
    pub default_fare_per_section: f64,
}

fn default_capacity() -> u32 { TOTAL_SEATS }
fn default_cancellation_fee_fraction() -> f64 { CANCELLATION_FEE_FRACTION }
fn default_stations() -> Vec<String> { DEFAULT_STATIONS.iter().map(|s| s.to_string()).collect() }
fn default_fare_per_section() -> f64 { 5.0 }

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            cancellation_fee_fraction: default_cancellation_fee_fraction(),
            stations: default_stations(),
            default_fare_per_section: default_fare_per_section(),
        }
    }
}

impl TrainConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: TrainConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(BookingError::InvalidConfig("capacity must be positive".into()));
        }

        if !(0.0..=1.0).contains(&self.cancellation_fee_fraction) {
            return Err(BookingError::InvalidConfig(format!(
                "cancellation fee fraction {} is outside [0, 1]",
                self.cancellation_fee_fraction
            )));
        }

        if self.stations.len() < 2 {
            return Err(BookingError::InvalidConfig(
                "a line needs at least two stations".into(),
            ));
        }

        let mut seen = FnvHashSet::default();
        for station in &self.stations {
            // Route codes are two characters, one per station
            if station.chars().count() != 1 {
                return Err(BookingError::InvalidConfig(format!(
                    "station code '{}' must be a single character",
                    station
                )));
            }
            if !seen.insert(station.as_str()) {
                return Err(BookingError::InvalidConfig(format!(
                    "station '{}' listed twice",
                    station
                )));
            }
        }

        if !(self.default_fare_per_section > 0.0) {
            return Err(BookingError::InvalidConfig(format!(
                "default fare per section {} must be positive",
                self.default_fare_per_section
            )));
        }

        Ok(())
    }

    pub fn station_line(&self) -> StationLine {
        StationLine::new(self.stations.iter().cloned())
    }
}

#[cfg(test)]
#[test]
fn test_defaults() {
    let config = TrainConfig::from_toml_str("").unwrap();
    assert_eq!(config, TrainConfig::default());
    assert_eq!(config.capacity, 100);
    assert_eq!(config.cancellation_fee_fraction, 0.20);
    assert_eq!(config.station_line(), StationLine::default());
}

#[cfg(test)]
#[test]
fn test_from_toml() {
    let config = TrainConfig::from_toml_str(
        r#"
        capacity = 120
        cancellation_fee_fraction = 0.1
        stations = ["P", "Q", "R", "S", "T"]
        "#,
    )
    .unwrap();

    assert_eq!(config.capacity, 120);
    assert_eq!(config.cancellation_fee_fraction, 0.1);
    assert_eq!(config.station_line().len(), 5);
    assert_eq!(config.default_fare_per_section, 5.0);
}

#[cfg(test)]
#[test]
fn test_invalid_configs() {
    for text in [
        "capacity = 0",
        "cancellation_fee_fraction = 1.5",
        "stations = [\"A\"]",
        "stations = [\"A\", \"B\", \"A\"]",
        "stations = [\"AB\", \"C\"]",
        "default_fare_per_section = 0.0",
    ] {
        assert!(
            matches!(TrainConfig::from_toml_str(text), Err(BookingError::InvalidConfig(_))),
            "{} should be rejected",
            text
        );
    }

    assert!(matches!(
        TrainConfig::from_toml_str("capacity = \"lots\""),
        Err(BookingError::ConfigParse(_))
    ));
}

#[cfg(test)]
#[test]
fn test_serialize_to_json() {
    let config = TrainConfig::default();
    let json = serde_json::to_string(&config).unwrap();
    assert!(json.contains("\"capacity\":100"));
}
