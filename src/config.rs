use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{MFloat, Mtime};

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// Folder with `classes.csv`, `distributions.csv`, `mapping.csv` and
    /// `start_distributions.csv`. Constant distributions are used when unset.
    pub distributions_path: Option<String>,
    pub timetable_path: String,
    pub realtime_path: Option<String>,
    pub dump_path: Option<String>,
    /// Day that minute 0 of the timetable refers to.
    pub schedule_begin: NaiveDate,
    pub significance_threshold: MFloat,
    pub max_standing_time: Mtime,
    pub feeder_lookback: Mtime,
    pub max_expected_travel_time: Mtime,
    pub max_expected_departure_delay: Mtime,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            distributions_path: None,
            timetable_path: "timetable.json".to_owned(),
            realtime_path: None,
            dump_path: None,
            schedule_begin: NaiveDate::default(),
            significance_threshold: 0.001,
            max_standing_time: 2,
            feeder_lookback: 30,
            max_expected_travel_time: 500,
            max_expected_departure_delay: 120,
        }
    }
}

impl Config {
    /// Unix timestamp of minute 0.
    pub fn reference_timestamp(&self) -> i64 {
        self.schedule_begin
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc().timestamp())
            .unwrap_or(0)
    }
}

pub fn load_config(path: &str) -> Result<Config> {
    let buf = std::fs::read(path).map_err(|source| Error::Io {
        path: path.to_owned(),
        source,
    })?;
    Ok(serde_json::from_slice(&buf)?)
}
