//! Tools hosted as HTTP services.
//!
//! The argument object is POSTed as the JSON body. A `{"result": ...}` reply
//! is unwrapped, a `{"error": ...}` reply is a tool failure, and any other
//! body is returned as-is.

use crate::tools::registry::{Tool, ToolError};
use crate::types::{AppError, Result};
use crate::utils::toml_config::ToolConfig;
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct RemoteTool {
    name: String,
    description: String,
    parameters: Value,
    url: String,
    http: reqwest::Client,
}

impl RemoteTool {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            description: format!("Remote tool '{}'", name),
            name,
            parameters: json!({"type": "object", "additionalProperties": true}),
            url: url.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn from_config(name: &str, config: &ToolConfig) -> Result<Self> {
        let url = config.url.clone().ok_or_else(|| {
            AppError::Configuration(format!("Remote tool '{}' has no url", name))
        })?;

        let mut tool = Self::new(name, url);
        if let Some(ref description) = config.description {
            tool.description = description.clone();
        }
        if let Some(ref parameters) = config.parameters {
            tool.parameters = parameters.clone();
        }
        Ok(tool)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Tool for RemoteTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters.clone()
    }

    async fn execute(&self, args: Value) -> std::result::Result<Value, ToolError> {
        let response = self
            .http
            .post(&self.url)
            .json(&args)
            .send()
            .await
            .map_err(|e| ToolError::failed(&self.name, format!("request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::failed(&self.name, format!("unreadable response: {}", e)))?;

        if !status.is_success() {
            return Err(ToolError::failed(
                &self.name,
                format!("service returned {}: {}", status, body),
            ));
        }

        match serde_json::from_str::<Value>(&body) {
            Ok(Value::Object(mut map)) => {
                if let Some(error) = map.remove("error") {
                    let message = match error {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    return Err(ToolError::failed(&self.name, message));
                }
                Ok(map.remove("result").unwrap_or(Value::Object(map)))
            }
            Ok(other) => Ok(other),
            Err(_) => Ok(Value::String(body)),
        }
    }
}
