//! Generic HTTP tool execution

use std::time::Duration;

use serde_json::{json, Map, Value};

use voicebridge_core::CustomToolConfig;

/// Substitute `{name}` path parameters with URL-encoded argument values.
pub fn build_url(config: &CustomToolConfig, args: &Value) -> String {
    let mut url = config.url.clone();
    for param in &config.path_params {
        let value = arg_as_string(args, &param.name).unwrap_or_default();
        url = url.replace(
            &format!("{{{}}}", param.name),
            &urlencoding::encode(&value),
        );
    }
    url
}

/// Collect query parameters: configured constants win, the rest come from
/// the model's arguments. Params the model did not supply are omitted.
pub fn build_query(config: &CustomToolConfig, args: &Value) -> Vec<(String, String)> {
    let mut query = Vec::new();
    for param in &config.query_params {
        let value = match &param.value {
            Some(constant) => Some(constant.clone()),
            None => arg_as_string(args, &param.name),
        };
        if let Some(value) = value {
            query.push((param.name.clone(), value));
        }
    }
    query
}

fn arg_as_string(args: &Value, name: &str) -> Option<String> {
    match args.get(name)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Walk a dot-notation path through a JSON value. Numeric segments index
/// arrays.
pub fn extract_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Render an extracted value as a variable string.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Execute a custom tool request. HTTP-level failures come back as a
/// `{success:false}` payload for the model; they are not retried and never
/// terminate the call.
pub async fn execute(
    http: &reqwest::Client,
    config: &CustomToolConfig,
    args: &Value,
) -> (Value, Vec<(String, String)>) {
    let url = build_url(config, args);
    let query = build_query(config, args);

    let method = match config.method.to_uppercase().as_str() {
        "POST" => reqwest::Method::POST,
        "PUT" => reqwest::Method::PUT,
        "PATCH" => reqwest::Method::PATCH,
        "DELETE" => reqwest::Method::DELETE,
        _ => reqwest::Method::GET,
    };

    let mut request = http
        .request(method, &url)
        .timeout(Duration::from_secs(config.timeout_seconds))
        .query(&query);
    for (name, value) in &config.headers {
        request = request.header(name, value);
    }

    let response = match request.send().await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(tool = %config.name, "Custom tool request failed: {e}");
            return (
                json!({ "success": false, "status": 0, "error": e.to_string() }),
                Vec::new(),
            );
        }
    };

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let data: Value = serde_json::from_str(&body).unwrap_or(Value::String(body));

    if !(200..300).contains(&status) {
        return (
            json!({ "success": false, "status": status, "error": data }),
            Vec::new(),
        );
    }

    // Pull configured response fields into per-call variables.
    let mut extracted_vars = Vec::new();
    let mut extracted = Map::new();
    for assignment in &config.response_variables {
        if let Some(value) = extract_path(&data, &assignment.json_path) {
            let rendered = value_to_string(value);
            extracted.insert(assignment.variable_name.clone(), json!(rendered));
            extracted_vars.push((assignment.variable_name.clone(), rendered));
        }
    }

    let mut reply = json!({ "success": true, "status": status, "data": data });
    if !extracted.is_empty() {
        reply["extracted"] = Value::Object(extracted);
    }
    (reply, extracted_vars)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(json_str: &str) -> CustomToolConfig {
        serde_json::from_str(json_str).unwrap()
    }

    #[test]
    fn test_path_param_substitution_encodes() {
        let config = tool(
            r#"{
                "name": "lookup",
                "url": "https://api.example.com/stores/{city}/info",
                "path_params": [{"name": "city"}]
            }"#,
        );
        let url = build_url(&config, &json!({ "city": "new york" }));
        assert_eq!(url, "https://api.example.com/stores/new%20york/info");
    }

    #[test]
    fn test_query_constants_override_model_args() {
        let config = tool(
            r#"{
                "name": "lookup",
                "url": "https://api.example.com/x",
                "query_params": [
                    {"name": "format", "value": "short"},
                    {"name": "day"},
                    {"name": "missing"}
                ]
            }"#,
        );
        let query = build_query(&config, &json!({ "format": "long", "day": "friday" }));
        assert_eq!(
            query,
            vec![
                ("format".to_string(), "short".to_string()),
                ("day".to_string(), "friday".to_string()),
            ]
        );
    }

    #[test]
    fn test_extract_path_objects_and_arrays() {
        let data = json!({
            "data": { "items": [ { "name": "first" }, { "name": "second" } ] },
            "count": 2
        });
        assert_eq!(
            extract_path(&data, "data.items.1.name").unwrap(),
            &json!("second")
        );
        assert_eq!(extract_path(&data, "count").unwrap(), &json!(2));
        assert!(extract_path(&data, "data.items.9.name").is_none());
        assert!(extract_path(&data, "data.nope").is_none());
    }

    #[test]
    fn test_numeric_arg_renders_without_quotes() {
        assert_eq!(value_to_string(&json!(42)), "42");
        assert_eq!(value_to_string(&json!("plain")), "plain");
        assert_eq!(value_to_string(&json!(true)), "true");
    }
}
