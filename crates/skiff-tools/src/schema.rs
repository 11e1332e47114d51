use schemars::JsonSchema;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSchema {
    pub properties: serde_json::Map<String, Value>,
    pub required: Vec<String>,
    #[serde(rename = "type")]
    pub schema_type: String,
}

impl From<schemars::Schema> for InputSchema {
    fn from(schema: schemars::Schema) -> Self {
        let value = serde_json::to_value(&schema).unwrap_or(Value::Null);
        let obj = value.as_object();
        Self {
            properties: obj
                .and_then(|o| o.get("properties"))
                .and_then(|v| v.as_object())
                .cloned()
                .unwrap_or_default(),
            required: obj
                .and_then(|o| o.get("required"))
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default(),
            schema_type: obj
                .and_then(|o| o.get("type"))
                .and_then(|v| v.as_str())
                .unwrap_or("object")
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub parameters: Value,
    pub id: String,
}

impl ToolCall {
    /// Deserialize this call's parameters into a typed params struct.
    pub fn parse_params<P: DeserializeOwned + JsonSchema>(
        &self,
    ) -> Result<P, crate::error::ToolError> {
        serde_json::from_value(self.parameters.clone())
            .map_err(|e| crate::error::ToolError::invalid_params(&self.name, e.to_string()))
    }
}
