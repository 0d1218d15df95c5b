//! Weather tool definition.
//!
//! Answers with a fixed forecast for any city. There is no weather backend;
//! the tool exists to exercise the protocol end to end.

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::input_schema;
use crate::domains::tools::{ToolDescriptor, ToolError, ToolHandler, ToolResult};

// ============================================================================
// Tool Parameters
// ============================================================================

/// Parameters for the weather tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetWeatherParams {
    /// City name, for example "Paris", "Tokyo" or "Beijing".
    pub city: String,
}

// ============================================================================
// Tool Definition
// ============================================================================

/// Weather tool - reports the weather for a city.
pub struct GetWeatherTool;

impl GetWeatherTool {
    /// Tool name as registered.
    pub const NAME: &'static str = "get_weather";

    /// Tool description shown to clients.
    pub const DESCRIPTION: &'static str = "Get the current weather for a city.";

    /// Descriptor advertised by `list_tools`.
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(Self::NAME, Self::DESCRIPTION, input_schema::<GetWeatherParams>())
    }

    /// Execute the tool logic.
    #[instrument(skip_all, fields(city = %params.city))]
    pub fn execute(params: &GetWeatherParams) -> ToolResult {
        let city = params.city.trim();
        if city.is_empty() {
            warn!("Weather requested without a city name");
            return ToolResult::error_text("Please provide a valid city name");
        }

        info!("Weather requested for {}", city);
        ToolResult::text(format!("{}: sunny", city))
    }
}

#[async_trait::async_trait]
impl ToolHandler for GetWeatherTool {
    async fn call(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let params: GetWeatherParams = serde_json::from_value(arguments)
            .map_err(|e| ToolError::invalid_arguments(e.to_string()))?;
        Ok(Self::execute(&params))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::tools::schema::{Schema, ValidationOptions};
    use serde_json::json;

    #[test]
    fn test_descriptor_schema() {
        let descriptor = GetWeatherTool::descriptor();
        assert_eq!(descriptor.name, "get_weather");
        assert_eq!(descriptor.input_schema["type"], "object");
        assert_eq!(descriptor.input_schema["properties"]["city"]["type"], "string");
        assert_eq!(descriptor.input_schema["required"], json!(["city"]));
        assert!(descriptor.input_schema.get("$schema").is_none());
        assert!(
            descriptor.input_schema["properties"]["city"]["description"]
                .as_str()
                .unwrap()
                .contains("City name")
        );
    }

    #[test]
    fn test_descriptor_schema_is_enforceable() {
        let schema = Schema::from_value(&GetWeatherTool::descriptor().input_schema).unwrap();
        assert!(
            schema
                .validate(&json!({ "city": "Paris" }), ValidationOptions::default())
                .is_ok()
        );
        assert!(
            schema
                .validate(&json!({}), ValidationOptions::default())
                .is_err()
        );
    }

    #[test]
    fn test_execute() {
        let params = GetWeatherParams {
            city: "Paris".to_string(),
        };
        let result = GetWeatherTool::execute(&params);
        assert!(!result.is_error);
        assert_eq!(result.first_text(), Some("Paris: sunny"));
    }

    #[test]
    fn test_execute_blank_city() {
        let params = GetWeatherParams {
            city: "   ".to_string(),
        };
        let result = GetWeatherTool::execute(&params);
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn test_handler_rejects_undecodable_arguments() {
        let err = GetWeatherTool.call(json!({ "city": 12 })).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_handler_call() {
        let result = GetWeatherTool
            .call(json!({ "city": "Tokyo" }))
            .await
            .unwrap();
        assert_eq!(result.first_text(), Some("Tokyo: sunny"));
    }
}
