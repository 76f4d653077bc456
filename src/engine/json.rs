/*!
 * JSON Object Model
 * TDLib JSON interface conventions: every object carries its type in `@type`
 */

use super::{Query, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// Field holding the object type
pub const TYPE_FIELD: &str = "@type";
/// Field carrying the correlation id through the engine
pub const EXTRA_FIELD: &str = "@extra";

/// A query encoded as a JSON object
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonQuery(Value);

impl JsonQuery {
    /// Query with only a type, e.g. `getMe`
    pub fn new(type_name: &str) -> Self {
        JsonQuery(json!({ TYPE_FIELD: type_name }))
    }

    pub fn from_value(value: Value) -> Self {
        JsonQuery(value)
    }

    /// Add or replace a field
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        if let Value::Object(map) = &mut self.0 {
            map.insert(field.to_string(), value.into());
        }
        self
    }

    pub fn type_name(&self) -> Option<&str> {
        self.0.get(TYPE_FIELD).and_then(Value::as_str)
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl fmt::Debug for JsonQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Query for JsonQuery {
    fn close_request() -> Self {
        JsonQuery::new("close")
    }
}

/// A result or update encoded as a JSON object
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonObject(Value);

impl JsonObject {
    pub fn new(type_name: &str) -> Self {
        JsonObject(json!({ TYPE_FIELD: type_name }))
    }

    pub fn from_value(value: Value) -> Self {
        JsonObject(value)
    }

    /// `{"@type":"ok"}`
    pub fn ok() -> Self {
        Self::new("ok")
    }

    /// `updateAuthorizationState` carrying the given state type
    pub fn authorization_state(state: &str) -> Self {
        JsonObject(json!({
            TYPE_FIELD: "updateAuthorizationState",
            "authorization_state": { TYPE_FIELD: state },
        }))
    }

    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        if let Value::Object(map) = &mut self.0 {
            map.insert(field.to_string(), value.into());
        }
        self
    }

    pub fn type_name(&self) -> Option<&str> {
        self.0.get(TYPE_FIELD).and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Remove and return a field, used to strip `@extra` on receipt
    pub fn take(&mut self, field: &str) -> Option<Value> {
        self.0.as_object_mut().and_then(|map: &mut Map<String, Value>| map.remove(field))
    }
}

impl fmt::Debug for JsonObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Response for JsonObject {
    fn error(code: i32, message: &str) -> Self {
        JsonObject(json!({
            TYPE_FIELD: "error",
            "code": code,
            "message": message,
        }))
    }

    fn as_error(&self) -> Option<(i32, &str)> {
        if self.type_name() != Some("error") {
            return None;
        }
        let code = self.0.get("code").and_then(Value::as_i64).unwrap_or_default();
        let message = self.0.get("message").and_then(Value::as_str).unwrap_or_default();
        Some((i32::try_from(code).unwrap_or(i32::MAX), message))
    }

    fn is_closed_update(&self) -> bool {
        self.type_name() == Some("updateAuthorizationState")
            && self
                .0
                .get("authorization_state")
                .and_then(|state| state.get(TYPE_FIELD))
                .and_then(Value::as_str)
                == Some("authorizationStateClosed")
    }
}
