//! Tool descriptors and tool-choice values sent with a chat request.

use serde::{Deserialize, Serialize};

use crate::errors::{ZhinaoError, ZhinaoResult};

/// Tool type. Zhinao only supports functions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolType {
    /// Function tool.
    #[default]
    Function,
}

/// Descriptor of a callable tool sent with the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionTool {
    /// Tool type.
    #[serde(rename = "type")]
    pub type_: ToolType,

    /// Name, description and parameter schema.
    pub function: FunctionDefinition,
}

impl FunctionTool {
    /// Wraps a function definition.
    pub fn new(function: FunctionDefinition) -> Self {
        Self {
            type_: ToolType::Function,
            function,
        }
    }

    /// Name of the described function.
    pub fn name(&self) -> &str {
        &self.function.name
    }
}

/// Callable function as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// What the function does, for the model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Function name.
    pub name: String,

    /// JSON Schema of the parameters. A function without parameters uses
    /// `{"type": "object", "properties": {}}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

impl FunctionDefinition {
    /// Creates a definition from an already parsed schema.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            description: Some(description.into()),
            name: name.into(),
            parameters: Some(parameters),
        }
    }

    /// Creates a definition from a JSON Schema string.
    pub fn from_json_schema(
        name: impl Into<String>,
        description: impl Into<String>,
        json_schema: &str,
    ) -> ZhinaoResult<Self> {
        let parameters: serde_json::Value = serde_json::from_str(json_schema).map_err(|e| {
            ZhinaoError::invalid_param(format!("Invalid parameters schema: {e}"), "parameters")
        })?;
        if !parameters.is_object() {
            return Err(ZhinaoError::invalid_param(
                "Parameters schema must be a JSON object",
                "parameters",
            ));
        }
        Ok(Self::new(name, description, parameters))
    }
}

/// Whether, and which, tool the model must call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    /// `auto` or `none`.
    Mode(ToolChoiceMode),

    /// Force a specific function.
    Function {
        /// Always `function`.
        #[serde(rename = "type")]
        type_: ToolType,
        /// Function to call.
        function: ToolChoiceFunction,
    },
}

impl ToolChoice {
    /// Let the model decide.
    pub fn auto() -> Self {
        Self::Mode(ToolChoiceMode::Auto)
    }

    /// Never call tools.
    pub fn none() -> Self {
        Self::Mode(ToolChoiceMode::None)
    }

    /// Force a call to the named function.
    pub fn function(name: impl Into<String>) -> Self {
        Self::Function {
            type_: ToolType::Function,
            function: ToolChoiceFunction { name: name.into() },
        }
    }
}

/// Non-forcing tool choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoiceMode {
    /// The model decides.
    Auto,
    /// The model answers without tools.
    None,
}

/// Function named by a forced tool choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolChoiceFunction {
    /// Function name.
    pub name: String,
}
