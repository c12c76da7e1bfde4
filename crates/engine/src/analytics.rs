use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::json;

use crate::types::{AccessMode, Row};
use crate::{DataError, DataManager, DataResult};

/// Table populated by the weather pipeline.
pub const WEATHER_TABLE: &str = "weather_data.london_weather";

const RECENT_WEATHER_SQL: &str = "SELECT
        latitude,
        longitude,
        current__time,
        current__temperature_2m,
        current_units__time,
        current_units__temperature_2m
    FROM weather_data.london_weather
    ORDER BY _loaded_at DESC
    LIMIT ?";

const SUMMARY_SQL: &str = "SELECT
        COUNT(*) AS total_records,
        MIN(current__time) AS earliest_record,
        MAX(current__time) AS latest_record,
        AVG(CAST(current__temperature_2m AS FLOAT)) AS avg_temperature,
        MIN(CAST(current__temperature_2m AS FLOAT)) AS min_temperature,
        MAX(CAST(current__temperature_2m AS FLOAT)) AS max_temperature
    FROM weather_data.london_weather
    WHERE current__temperature_2m IS NOT NULL";

const TRENDS_SQL: &str = "SELECT
        CAST(current__time AS DATE) AS date,
        AVG(CAST(current__temperature_2m AS FLOAT)) AS avg_temp,
        MIN(CAST(current__temperature_2m AS FLOAT)) AS min_temp,
        MAX(CAST(current__temperature_2m AS FLOAT)) AS max_temp
    FROM weather_data.london_weather
    WHERE current__temperature_2m IS NOT NULL
    GROUP BY CAST(current__time AS DATE)
    ORDER BY date DESC
    LIMIT 7";

const CONDITIONS_SQL: &str = "SELECT
        CASE
            WHEN CAST(current__temperature_2m AS FLOAT) < 10 THEN 'Cold'
            WHEN CAST(current__temperature_2m AS FLOAT) < 20 THEN 'Mild'
            ELSE 'Warm'
        END AS condition_category,
        COUNT(*) AS frequency,
        AVG(CAST(current__temperature_2m AS FLOAT)) AS avg_temp_in_category
    FROM weather_data.london_weather
    WHERE current__temperature_2m IS NOT NULL
    GROUP BY condition_category
    ORDER BY frequency DESC";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    Summary,
    Trends,
    Conditions,
}

impl AnalysisType {
    pub const ALL: [AnalysisType; 3] = [Self::Summary, Self::Trends, Self::Conditions];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Trends => "trends",
            Self::Conditions => "conditions",
        }
    }

    fn sql(self) -> &'static str {
        match self {
            Self::Summary => SUMMARY_SQL,
            Self::Trends => TRENDS_SQL,
            Self::Conditions => CONDITIONS_SQL,
        }
    }
}

impl FromStr for AnalysisType {
    type Err = DataError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| DataError::UnknownAnalysis(value.to_string()))
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn run_analysis(data: &DataManager, kind: AnalysisType) -> DataResult<Vec<Row>> {
    data.execute(kind.sql(), &[], AccessMode::ReadOnly)
}

/// Most recently loaded weather records.
pub fn recent_weather(data: &DataManager, limit: u64) -> DataResult<Vec<Row>> {
    data.execute(RECENT_WEATHER_SQL, &[json!(limit)], AccessMode::ReadOnly)
}
