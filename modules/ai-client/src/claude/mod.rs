mod client;
pub(crate) mod types;

use tracing::warn;

use crate::error::{AiError, Result};
use crate::schema::StructuredOutput;

use client::ClaudeClient;
use types::*;

const STRUCTURED_TOOL: &str = "structured_response";

// =============================================================================
// Claude Agent
// =============================================================================

#[derive(Clone)]
pub struct Claude {
    model: String,
    client: ClaudeClient,
}

impl Claude {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AiError::Config("Anthropic API key is empty".to_string()));
        }
        Ok(Self {
            model: model.into(),
            client: ClaudeClient::new(&api_key)?,
        })
    }

    pub fn with_base_url(mut self, url: impl AsRef<str>) -> Self {
        self.client = self.client.with_base_url(url.as_ref());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    // =========================================================================
    // Structured output
    // =========================================================================

    /// Force a single tool call described by `schema` and return its raw input.
    ///
    /// Use this when the caller wants to validate the payload piece by piece
    /// instead of failing the whole call on one malformed field.
    pub async fn extract_value(
        &self,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        schema: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let request = ChatRequest::new(&self.model)
            .system(system_prompt)
            .message(WireMessage::user(user_prompt))
            .temperature(0.0)
            .forced_tool(ToolDefinitionWire {
                name: STRUCTURED_TOOL.to_string(),
                description: "Return the requested data as structured JSON.".to_string(),
                input_schema: schema,
            });

        let response = self.client.chat(&request).await?;

        match response.tool_input(STRUCTURED_TOOL) {
            Some(input) => Ok(input.clone()),
            None => {
                warn!(
                    model = %self.model,
                    stop_reason = response.stop_reason.as_deref().unwrap_or("unknown"),
                    text = response.text().as_deref().unwrap_or(""),
                    "Claude response had no tool call"
                );
                Err(AiError::NoOutput)
            }
        }
    }

    /// Strictly typed variant of [`Claude::extract_value`].
    pub async fn extract<T: StructuredOutput>(
        &self,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> Result<T> {
        let value = self
            .extract_value(system_prompt, user_prompt, T::tool_schema())
            .await?;
        serde_json::from_value(value).map_err(|e| {
            AiError::Parse(format!("failed to deserialize {}: {e}", T::type_name()))
        })
    }
}
