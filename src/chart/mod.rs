pub mod client;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::models::Attachment;

pub use client::{request_chart, ChartEndpoint};

/// Chart configuration returned by the chart endpoint.
///
/// The schema belongs to the charting library on the UI side; it is passed
/// through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChartOptions(Value);

impl ChartOptions {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct ChartRequest {
    pub prompt: String,
    pub generate_chart: bool,
    pub attachment: Option<Attachment>,
}

/// Body of a chart endpoint response, before interpretation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawChartResponse {
    #[serde(default)]
    pub visualization_code: Option<Value>,
    #[serde(default)]
    pub visualization_explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartReply {
    pub explanation: Option<String>,
    pub chart: Option<ChartOptions>,
}

impl ChartReply {
    /// Text for the bot message, falling back to a default per reply kind.
    pub fn text(&self) -> String {
        match (&self.explanation, &self.chart) {
            (Some(text), _) if !text.trim().is_empty() => text.clone(),
            (_, Some(_)) => "Here is your chart.".to_string(),
            (_, None) => "Here is the response.".to_string(),
        }
    }
}

/// Turn a raw response into a reply.
///
/// `visualization_code` may be a JSON-encoded string or an already decoded
/// value. Only a non-empty JSON object counts as a chart; anything else
/// degrades to a text reply. A string that is not valid JSON is an error.
pub fn interpret(raw: RawChartResponse) -> Result<ChartReply, ChartError> {
    let decoded = match raw.visualization_code {
        Some(Value::String(code)) if !code.trim().is_empty() => Some(
            serde_json::from_str::<Value>(&code)
                .map_err(|e| ChartError::Parse(format!("invalid visualization_code: {}", e)))?,
        ),
        Some(Value::String(_)) | Some(Value::Null) | None => None,
        Some(other) => Some(other),
    };

    let chart = decoded
        .filter(|value| matches!(value, Value::Object(map) if !map.is_empty()))
        .map(ChartOptions);

    Ok(ChartReply {
        explanation: raw.visualization_explanation,
        chart,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("chart request failed with status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Encode error: {0}")]
    Encode(String),
}

impl Serialize for ChartError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
