// JSON Schema rendering for declared parameters

use waypost_core::{ParamType, ParameterSpec};

/// Build the `inputSchema` object advertised for a capability
pub fn input_schema(parameters: &[ParameterSpec]) -> serde_json::Value {
    let properties: serde_json::Map<String, serde_json::Value> = parameters
        .iter()
        .map(|p| (p.name.clone(), json_schema_property(p.param_type, &p.description)))
        .collect();
    let required: Vec<&str> = parameters
        .iter()
        .filter(|p| p.required)
        .map(|p| p.name.as_str())
        .collect();

    json_schema_object(serde_json::Value::Object(properties), required)
}

pub fn json_schema_object(properties: serde_json::Value, required: Vec<&str>) -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

pub fn json_schema_property(param_type: ParamType, description: &str) -> serde_json::Value {
    if description.is_empty() {
        serde_json::json!({ "type": param_type.as_str() })
    } else {
        serde_json::json!({
            "type": param_type.as_str(),
            "description": description
        })
    }
}
