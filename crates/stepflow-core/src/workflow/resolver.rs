//! Placeholder resolution for tool step parameters.
//!
//! A parameter value is replaced only when it is a string consisting solely
//! of `{{name}}`, where `name` is a plain identifier. Partial templates
//! (`"Hello {{name}}"`), dotted paths (`{{a.b}}`) and non-string values pass
//! through unchanged. Unknown names are left as the literal string.

use std::collections::HashMap;

use serde_json::Value;

/// Resolves whole-value `{{name}}` placeholders against a run's variable bag.
pub struct VariableResolver;

impl VariableResolver {
    /// Resolve every parameter value against `variables`.
    pub fn resolve(
        params: &HashMap<String, Value>,
        variables: &HashMap<String, Value>,
    ) -> HashMap<String, Value> {
        params
            .iter()
            .map(|(key, value)| (key.clone(), Self::resolve_value(value, variables)))
            .collect()
    }

    /// Resolve a single value.
    pub fn resolve_value(value: &Value, variables: &HashMap<String, Value>) -> Value {
        match value {
            Value::String(s) => match placeholder_name(s).and_then(|name| variables.get(name)) {
                Some(resolved) => resolved.clone(),
                None => value.clone(),
            },
            _ => value.clone(),
        }
    }
}

/// Extract `name` from a string that is exactly `{{name}}`.
///
/// `name` must be non-empty and made of ASCII letters, digits, and `_`.
pub fn placeholder_name(s: &str) -> Option<&str> {
    let name = s.strip_prefix("{{")?.strip_suffix("}}")?;
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Some(name)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn variables() -> HashMap<String, Value> {
        HashMap::from([
            ("endpoint".to_string(), json!("https://api.example.com")),
            ("step_fetch".to_string(), json!({ "foo": "bar" })),
            ("limit".to_string(), json!(25)),
        ])
    }

    #[test]
    fn test_placeholder_name() {
        assert_eq!(placeholder_name("{{endpoint}}"), Some("endpoint"));
        assert_eq!(placeholder_name("{{step_fetch}}"), Some("step_fetch"));
        assert_eq!(placeholder_name("{{ endpoint }}"), None);
        assert_eq!(placeholder_name("{{a.b}}"), None);
        assert_eq!(placeholder_name("{{}}"), None);
        assert_eq!(placeholder_name("x{{endpoint}}"), None);
        assert_eq!(placeholder_name("{{endpoint}}/v1"), None);
    }

    #[test]
    fn test_resolves_whole_value_placeholders() {
        let params = HashMap::from([
            ("url".to_string(), json!("{{endpoint}}")),
            ("payload".to_string(), json!("{{step_fetch}}")),
            ("count".to_string(), json!("{{limit}}")),
        ]);
        let resolved = VariableResolver::resolve(&params, &variables());

        assert_eq!(resolved["url"], json!("https://api.example.com"));
        assert_eq!(resolved["payload"]["foo"], json!("bar"));
        assert_eq!(resolved["count"], json!(25));
    }

    #[test]
    fn test_unknown_placeholder_left_as_is() {
        let params = HashMap::from([("token".to_string(), json!("{{missing}}"))]);
        let resolved = VariableResolver::resolve(&params, &variables());
        assert_eq!(resolved["token"], json!("{{missing}}"));
    }

    #[test]
    fn test_partial_templates_and_non_strings_pass_through() {
        let params = HashMap::from([
            ("greeting".to_string(), json!("Hello {{endpoint}}")),
            ("path".to_string(), json!("{{step_fetch.foo}}")),
            ("retries".to_string(), json!(3)),
            ("nested".to_string(), json!({ "url": "{{endpoint}}" })),
        ]);
        let resolved = VariableResolver::resolve(&params, &variables());

        assert_eq!(resolved["greeting"], json!("Hello {{endpoint}}"));
        assert_eq!(resolved["path"], json!("{{step_fetch.foo}}"));
        assert_eq!(resolved["retries"], json!(3));
        assert_eq!(resolved["nested"], json!({ "url": "{{endpoint}}" }));
    }
}
