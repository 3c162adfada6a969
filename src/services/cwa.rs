//! Central Weather Administration township forecast (dataset F-D0047-093).
//!
//! The gateway only needs the "天氣預報綜合描述" element: a list of time ranges with a
//! free-text description. [`summarize`] turns a slice of those entries into one line.

use super::{http_client, ForecastSource};
use crate::config::WeatherConfig;
use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use chrono::DateTime;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

pub const FORECAST_URL: &str = "https://opendata.cwa.gov.tw/api/v1/rest/datastore/F-D0047-093";
/// Element carrying the combined forecast description.
pub const DESCRIPTION_ELEMENT: &str = "天氣預報綜合描述";
/// Summaries longer than this many characters are cut and end with "...".
pub const SUMMARY_MAX_CHARS: usize = 100;

const NO_ELEMENT: &str = "找不到相關的天氣描述資料。";
const NO_ENTRIES: &str = "找不到天氣描述資料。";

const LOCATION_IDS: [(&str, &str); 22] = [
    ("宜蘭縣", "F-D0047-001"),
    ("桃園市", "F-D0047-005"),
    ("新竹縣", "F-D0047-009"),
    ("苗栗縣", "F-D0047-013"),
    ("彰化縣", "F-D0047-017"),
    ("南投縣", "F-D0047-021"),
    ("雲林縣", "F-D0047-025"),
    ("嘉義縣", "F-D0047-029"),
    ("屏東縣", "F-D0047-033"),
    ("臺東縣", "F-D0047-037"),
    ("花蓮縣", "F-D0047-041"),
    ("澎湖縣", "F-D0047-045"),
    ("基隆市", "F-D0047-049"),
    ("新竹市", "F-D0047-053"),
    ("嘉義市", "F-D0047-057"),
    ("臺北市", "F-D0047-061"),
    ("高雄市", "F-D0047-065"),
    ("新北市", "F-D0047-069"),
    ("臺中市", "F-D0047-073"),
    ("臺南市", "F-D0047-077"),
    ("連江縣", "F-D0047-081"),
    ("金門縣", "F-D0047-085"),
];

/// Dataset id of a city or county; unknown names are a lookup failure.
pub fn location_id_for(city: &str) -> GatewayResult<&'static str> {
    LOCATION_IDS
        .iter()
        .find(|(name, _)| *name == city)
        .map(|(_, id)| *id)
        .ok_or_else(|| GatewayError::Lookup(format!("no forecast dataset for {}", city)))
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    records: Option<ForecastRecords>,
}

#[derive(Debug, Deserialize)]
struct ForecastRecords {
    #[serde(rename = "Locations", default)]
    locations: Vec<LocationGroup>,
}

#[derive(Debug, Deserialize)]
struct LocationGroup {
    #[serde(rename = "Location", default)]
    location: Vec<LocationForecast>,
}

/// Forecast of a single township.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LocationForecast {
    #[serde(default)]
    pub location_name: String,
    #[serde(default)]
    pub weather_element: Vec<WeatherElement>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WeatherElement {
    pub element_name: String,
    #[serde(default)]
    pub time: Vec<ForecastPeriod>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ForecastPeriod {
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub element_value: Vec<ElementValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ElementValue {
    #[serde(default)]
    pub weather_description: String,
}

impl ForecastPeriod {
    /// `MM/DD HH時至HH時：description`; unparseable times are shown as received.
    pub fn describe(&self) -> String {
        let start = DateTime::parse_from_rfc3339(&self.start_time)
            .map(|t| t.format("%m/%d %H").to_string())
            .unwrap_or_else(|_| self.start_time.clone());
        let end = DateTime::parse_from_rfc3339(&self.end_time)
            .map(|t| t.format("%H").to_string())
            .unwrap_or_else(|_| self.end_time.clone());
        let desc = self
            .element_value
            .first()
            .map(|v| v.weather_description.as_str())
            .unwrap_or_default();
        format!("{}時至{}時：{}", start, end, desc)
    }
}

/// Describe `limit` forecast periods starting at `offset`, joined by "；".
pub fn summarize(forecast: &LocationForecast, limit: usize, offset: usize) -> String {
    let Some(element) = forecast
        .weather_element
        .iter()
        .find(|e| e.element_name == DESCRIPTION_ELEMENT)
    else {
        return NO_ELEMENT.to_string();
    };

    let parts: Vec<String> = element
        .time
        .iter()
        .skip(offset)
        .take(limit)
        .map(ForecastPeriod::describe)
        .collect();
    if parts.is_empty() {
        return NO_ENTRIES.to_string();
    }

    let message = parts.join("；");
    if message.chars().count() > SUMMARY_MAX_CHARS {
        let mut cut: String = message.chars().take(SUMMARY_MAX_CHARS).collect();
        cut.push_str("...");
        cut
    } else {
        message
    }
}

pub struct CwaClient {
    api_key: String,
    client: reqwest::Client,
}

impl CwaClient {
    pub fn new(config: &WeatherConfig) -> GatewayResult<Self> {
        if config.api_key.trim().is_empty() {
            warn!("Weather is enabled but weather.api_key is empty; lookups will fail");
        }
        Ok(Self {
            api_key: config.api_key.clone(),
            client: http_client(config.timeout_seconds)?,
        })
    }

    fn request_url(&self, location_id: &str, district: &str) -> String {
        format!(
            "{}?Authorization={}&limit=1&locationId={}&LocationName={}&ElementName={}",
            FORECAST_URL,
            urlencoding::encode(&self.api_key),
            location_id,
            urlencoding::encode(district),
            urlencoding::encode(DESCRIPTION_ELEMENT)
        )
    }
}

#[async_trait]
impl ForecastSource for CwaClient {
    async fn forecast(&self, city: &str, district: &str) -> GatewayResult<LocationForecast> {
        if self.api_key.trim().is_empty() {
            return Err(GatewayError::Lookup("weather API key is not configured".into()));
        }
        let location_id = location_id_for(city)?;
        debug!("Fetching forecast for {}{} ({})", city, district, location_id);

        let response = self
            .client
            .get(self.request_url(location_id, district))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GatewayError::Lookup(format!(
                "forecast request returned HTTP {}",
                response.status()
            )));
        }
        let body: ForecastResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Lookup(format!("forecast response is malformed: {}", e)))?;

        body.records
            .and_then(|r| r.locations.into_iter().next())
            .and_then(|g| g.location.into_iter().next())
            .ok_or_else(|| {
                GatewayError::Lookup(format!(
                    "no forecast for {}({}) {}",
                    city, location_id, district
                ))
            })
    }
}
