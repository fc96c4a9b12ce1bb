use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;

use super::{interpret, ChartError, ChartReply, ChartRequest, RawChartResponse};
use crate::config::{Config, UploadFormat};
use crate::store::models::Attachment;

#[derive(Debug, Clone)]
pub struct ChartEndpoint {
    pub url: String,
    pub upload_format: UploadFormat,
    pub timeout: Option<Duration>,
}

impl From<&Config> for ChartEndpoint {
    fn from(config: &Config) -> Self {
        Self {
            url: config.chart_endpoint.clone(),
            upload_format: config.upload_format,
            timeout: config.request_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// POST a prompt (and optional table) to the chart endpoint.
pub async fn request_chart(
    endpoint: &ChartEndpoint,
    request: &ChartRequest,
) -> Result<ChartReply, ChartError> {
    let mut builder = Client::builder();
    if let Some(timeout) = endpoint.timeout {
        builder = builder.timeout(timeout);
    }
    let client = builder.build()?;

    let mut form = Form::new().text("prompt", request.prompt.clone());
    if request.generate_chart {
        form = form.text("generateChart", "true");
    }
    if let Some(attachment) = &request.attachment {
        form = form.part("file", file_part(attachment, endpoint.upload_format)?);
    }

    log::info!("Requesting chart from {}", endpoint.url);
    let resp = client.post(&endpoint.url).multipart(form).send().await?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        log::warn!("Chart endpoint returned {}", status);
        return Err(ChartError::Api {
            status,
            message: text,
        });
    }

    let body = resp.text().await?;
    let raw: RawChartResponse = serde_json::from_str(&body)
        .map_err(|e| ChartError::Parse(format!("invalid response body: {}", e)))?;

    interpret(raw)
}

/// Encode the attachment table as the `file` part.
fn file_part(attachment: &Attachment, format: UploadFormat) -> Result<Part, ChartError> {
    let (bytes, mime) = encode_table(attachment.content(), format)?;
    let stem = Path::new(attachment.name())
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("attachment");
    let file_name = format!("{}.{}", stem, format);

    Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(mime)
        .map_err(ChartError::from)
}

pub(crate) fn encode_table(
    rows: &[Vec<String>],
    format: UploadFormat,
) -> Result<(Vec<u8>, &'static str), ChartError> {
    match format {
        UploadFormat::Json => {
            let bytes = serde_json::to_vec(rows).map_err(|e| ChartError::Encode(e.to_string()))?;
            Ok((bytes, "application/json"))
        }
        UploadFormat::Csv => {
            let mut writer = csv::WriterBuilder::new()
                .flexible(true)
                .from_writer(Vec::new());
            for row in rows {
                writer
                    .write_record(row)
                    .map_err(|e| ChartError::Encode(e.to_string()))?;
            }
            let bytes = writer
                .into_inner()
                .map_err(|e| ChartError::Encode(e.to_string()))?;
            Ok((bytes, "text/csv"))
        }
    }
}
