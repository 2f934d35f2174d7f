use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("invalid selector: {0}")]
    Invalid(String),
    #[error("unsupported selector operator: {0}")]
    Unsupported(String),
}

/// Equality selector over the fields of JSON documents.
///
/// Accepts the Mango-style query subset used by the ledger contract:
///
/// ```json
/// {"selector": {"docType": "cidRecord", "owner": {"$eq": "user1"}}}
/// ```
///
/// Nested objects without operators address sub-fields and are flattened
/// to dotted paths, so `{"a": {"b": 1}}` is the same as `{"a.b": 1}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    fields: BTreeMap<String, Value>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field` to equal `value`
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn parse(query: &str) -> Result<Self, SelectorError> {
        let query: Value =
            serde_json::from_str(query).map_err(|e| SelectorError::Invalid(e.to_string()))?;
        let Value::Object(mut query) = query else {
            return Err(SelectorError::Invalid("query must be a JSON object".into()));
        };
        let selector = query
            .remove("selector")
            .ok_or_else(|| SelectorError::Invalid("missing `selector`".into()))?;
        if let Some(key) = query.keys().next() {
            return Err(SelectorError::Unsupported(key.clone()));
        }
        let Value::Object(selector) = selector else {
            return Err(SelectorError::Invalid("`selector` must be an object".into()));
        };

        let mut fields = BTreeMap::new();
        flatten(None, selector, &mut fields)?;
        Ok(Self { fields })
    }

    pub fn to_query_string(&self) -> String {
        let selector: Map<String, Value> = self
            .fields
            .iter()
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();
        serde_json::json!({ "selector": selector }).to_string()
    }

    /// Dotted field paths and the values they must equal
    pub fn conditions(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(field, value)| (field.as_str(), value))
    }

    pub fn matches(&self, document: &Value) -> bool {
        self.fields
            .iter()
            .all(|(path, expected)| lookup(document, path) == Some(expected))
    }

    /// Values that are not JSON never match
    pub fn matches_bytes(&self, bytes: &[u8]) -> bool {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(document) => self.matches(&document),
            Err(_) => false,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_query_string())
    }
}

fn flatten(
    prefix: Option<&str>,
    object: Map<String, Value>,
    fields: &mut BTreeMap<String, Value>,
) -> Result<(), SelectorError> {
    for (key, value) in object {
        if key.starts_with('$') {
            return Err(SelectorError::Unsupported(key));
        }
        let path = match prefix {
            Some(prefix) => format!("{}.{}", prefix, key),
            None => key,
        };
        match value {
            Value::Object(mut inner) if inner.keys().any(|k| k.starts_with('$')) => {
                if inner.len() != 1 {
                    return Err(SelectorError::Invalid(format!(
                        "operator object for `{}` must have exactly one key",
                        path
                    )));
                }
                match inner.remove("$eq") {
                    Some(expected) => {
                        fields.insert(path, expected);
                    }
                    None => {
                        let op = inner.keys().next().cloned().unwrap_or_default();
                        return Err(SelectorError::Unsupported(op));
                    }
                }
            }
            Value::Object(inner) => flatten(Some(&path), inner, fields)?,
            value => {
                fields.insert(path, value);
            }
        }
    }
    Ok(())
}

fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(document, |current, segment| current.get(segment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_equality_and_eq_operator() {
        let selector =
            Selector::parse(r#"{"selector":{"docType":"cidRecord","owner":{"$eq":"user1"}}}"#)
                .unwrap();
        assert_eq!(
            selector,
            Selector::new()
                .where_eq("docType", "cidRecord")
                .where_eq("owner", "user1")
        );
    }

    #[test]
    fn test_nested_fields_flatten() {
        let selector = Selector::parse(r#"{"selector":{"meta":{"size":{"$eq":3}}}}"#).unwrap();
        assert!(selector.matches(&json!({"meta": {"size": 3}})));
        assert!(!selector.matches(&json!({"meta": {"size": 4}})));
        assert!(!selector.matches(&json!({"meta": 3})));
    }

    #[test]
    fn test_rejects_unsupported_queries() {
        assert!(matches!(
            Selector::parse(r#"{"selector":{"n":{"$gt":1}}}"#),
            Err(SelectorError::Unsupported(op)) if op == "$gt"
        ));
        assert!(matches!(
            Selector::parse(r#"{"selector":{"$or":[]}}"#),
            Err(SelectorError::Unsupported(_))
        ));
        assert!(matches!(
            Selector::parse(r#"{"selector":{},"sort":["owner"]}"#),
            Err(SelectorError::Unsupported(_))
        ));
        assert!(matches!(
            Selector::parse(r#"{"owner":"user1"}"#),
            Err(SelectorError::Invalid(_))
        ));
        assert!(matches!(
            Selector::parse("not json"),
            Err(SelectorError::Invalid(_))
        ));
    }

    #[test]
    fn test_matches_requires_every_field() {
        let selector = Selector::new()
            .where_eq("docType", "cidRecord")
            .where_eq("owner", "user1");
        assert!(selector.matches(&json!({"docType": "cidRecord", "owner": "user1", "cid": "Qm1"})));
        assert!(!selector.matches(&json!({"docType": "cidRecord", "owner": "user2"})));
        assert!(!selector.matches(&json!({"owner": "user1"})));
        assert!(!selector.matches_bytes(b"{not json"));
        assert!(Selector::new().matches(&json!({})));
    }

    #[test]
    fn test_query_string_round_trips() {
        let selector = Selector::new()
            .where_eq("docType", "cidRecord")
            .where_eq("owner", "user1");
        assert_eq!(Selector::parse(&selector.to_query_string()).unwrap(), selector);
    }
}
