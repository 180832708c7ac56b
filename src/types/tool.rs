//! Tool declarations offered to the model for function calling.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A function the model may invoke.
///
/// `parameters` is a JSON Schema object describing the arguments. Backends
/// that require a schema receive an empty object schema when it is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl ToolDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach a hand-written JSON Schema for the arguments.
    pub fn parameters(mut self, schema: Value) -> Self {
        self.parameters = Some(schema);
        self
    }

    /// Derive the argument schema from a Rust type.
    pub fn parameters_for<T: schemars::JsonSchema>(mut self) -> Self {
        let root = schemars::gen::SchemaGenerator::default().into_root_schema_for::<T>();
        self.parameters = serde_json::to_value(root.schema).ok();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_optional_fields_omitted() {
        let decl = ToolDeclaration::new("noop");
        let value = serde_json::to_value(&decl).unwrap();
        assert_eq!(value, json!({"name": "noop"}));
    }

    #[test]
    fn test_builder_chain() {
        let decl = ToolDeclaration::new("get_weather")
            .description("Current weather for a city")
            .parameters(json!({
                "type": "object",
                "properties": {"city": {"type": "string"}},
                "required": ["city"]
            }));
        assert_eq!(decl.description.as_deref(), Some("Current weather for a city"));
        assert_eq!(decl.parameters.unwrap()["required"][0], "city");
    }

    #[test]
    fn test_parameters_from_rust_type() {
        #[derive(schemars::JsonSchema)]
        #[allow(dead_code)]
        struct WeatherArgs {
            city: String,
            celsius: Option<bool>,
        }

        let decl = ToolDeclaration::new("get_weather").parameters_for::<WeatherArgs>();
        let schema = decl.parameters.unwrap();
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"]["city"].is_object());
    }
}
