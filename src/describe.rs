//! Description service client
//!
//! The generator treats description generation as a black box behind the
//! `DescriptionService` trait. The production implementation POSTs a fully
//! qualified table reference plus an options bundle to an HTTP endpoint and
//! expects a JSON payload carrying the table description.

use crate::config::DescriberConfig;
use crate::error::AppError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Options bundle forwarded with every describe request
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DescribeOptions {
    /// Ask the service to cover columns in the description
    pub describe_columns: bool,
    /// Allow the service to sample row data
    pub sample_data: bool,
}

/// Request body for the describe endpoint
#[derive(Debug, Serialize)]
struct DescribeRequest<'a> {
    table: &'a str,
    #[serde(flatten)]
    options: DescribeOptions,
}

/// Response payload from the describe endpoint
#[derive(Debug, Deserialize)]
pub struct DescribeResponse {
    #[serde(alias = "table_description")]
    pub description: Option<String>,
}

/// External capability that turns a table reference into a description
#[async_trait]
pub trait DescriptionService: Send + Sync {
    /// Generate a description for the given fully qualified table reference
    async fn describe_table(
        &self,
        table_ref: &str,
        options: DescribeOptions,
    ) -> Result<String, AppError>;
}

/// HTTP implementation of the description service
pub struct HttpDescriptionService {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpDescriptionService {
    pub fn new(config: &DescriberConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl DescriptionService for HttpDescriptionService {
    async fn describe_table(
        &self,
        table_ref: &str,
        options: DescribeOptions,
    ) -> Result<String, AppError> {
        debug!(table = table_ref, "requesting description");

        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&DescribeRequest { table: table_ref, options });

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?.error_for_status()?;

        // Decode in two steps so a schema mismatch surfaces as a payload
        // error rather than a transport error.
        let body: serde_json::Value = response.json().await?;
        let payload: DescribeResponse = serde_json::from_value(body)
            .map_err(|e| AppError::MalformedResponse(e.to_string()))?;

        match payload.description {
            Some(description) if !description.trim().is_empty() => Ok(description),
            _ => Err(AppError::MalformedResponse(format!(
                "no description returned for {}",
                table_ref
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_request_body_shape() {
        let request = DescribeRequest {
            table: "SALES.\"public\".\"orders\"",
            options: DescribeOptions {
                describe_columns: true,
                sample_data: false,
            },
        };

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "table": "SALES.\"public\".\"orders\"",
                "describe_columns": true,
                "sample_data": false,
            })
        );
    }

    #[test]
    fn test_response_with_description_field() {
        let payload: DescribeResponse =
            serde_json::from_str(r#"{"description": "Customer orders."}"#).unwrap();
        assert_eq!(payload.description.as_deref(), Some("Customer orders."));
    }

    #[test]
    fn test_response_with_legacy_field_name() {
        let payload: DescribeResponse =
            serde_json::from_str(r#"{"table_description": "Customer orders."}"#).unwrap();
        assert_eq!(payload.description.as_deref(), Some("Customer orders."));
    }

    #[test]
    fn test_response_without_description() {
        let payload: DescribeResponse = serde_json::from_str(r#"{"model": "v2"}"#).unwrap();
        assert!(payload.description.is_none());
    }
}
