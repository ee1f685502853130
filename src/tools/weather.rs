//! `get_current_weather`: forecast lookup against the Open-Meteo API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::errors::ToolError;
use super::registry::Tool;

const NAME: &str = "get_current_weather";

/// HTTP timeout for the forecast request; the registry bound still applies.
const HTTP_TIMEOUT: Duration = Duration::from_secs(25);

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeatherArgs {
    pub latitude: f64,
    pub longitude: f64,
}

pub struct CurrentWeather {
    http: reqwest::Client,
    base_url: String,
}

impl CurrentWeather {
    /// `base_url` is the API root, e.g. `https://api.open-meteo.com/v1`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ToolError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| ToolError::ExecutionFailed {
                tool: NAME.to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn failed(reason: String) -> ToolError {
        ToolError::ExecutionFailed {
            tool: NAME.to_string(),
            reason,
        }
    }
}

#[async_trait]
impl Tool for CurrentWeather {
    type Args = WeatherArgs;

    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Get the current weather at a location"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "latitude": {
                    "type": "number",
                    "description": "The latitude of the location",
                },
                "longitude": {
                    "type": "number",
                    "description": "The longitude of the location",
                },
            },
            "required": ["latitude", "longitude"],
        })
    }

    async fn call(&self, args: WeatherArgs) -> Result<Value, ToolError> {
        if !(-90.0..=90.0).contains(&args.latitude) || !(-180.0..=180.0).contains(&args.longitude)
        {
            return Err(ToolError::ArgsInvalid {
                tool: NAME.to_string(),
                reason: format!(
                    "coordinates out of range: latitude {}, longitude {}",
                    args.latitude, args.longitude
                ),
            });
        }

        let url = format!("{}/forecast", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("latitude", args.latitude.to_string()),
                ("longitude", args.longitude.to_string()),
                ("current", "temperature_2m".to_string()),
                ("hourly", "temperature_2m".to_string()),
                ("daily", "sunrise,sunset".to_string()),
                ("timezone", "auto".to_string()),
            ])
            .send()
            .await
            .map_err(|e| Self::failed(format!("weather request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::failed(format!("weather API returned HTTP {status}: {body}")));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| Self::failed(format!("invalid weather response: {e}")))
    }
}
