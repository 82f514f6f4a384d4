//! Per-request runtime context.
//!
//! A string-keyed map of opaque identity tokens threaded through every agent
//! and scheduler call. The runtime itself only reads the reserved keys
//! `user_id`, `project_id`, and `trace_id`; everything else passes through to
//! tools untouched.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::RuntimeError;

pub const KEY_USER_ID: &str = "user_id";
pub const KEY_PROJECT_ID: &str = "project_id";
pub const KEY_TRACE_ID: &str = "trace_id";

/// Opaque identity tokens for one run.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    values: HashMap<String, String>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context pre-filled with the three reserved keys.
    pub fn with_identity(
        user_id: impl Into<String>,
        project_id: impl Into<String>,
        trace_id: impl Into<String>,
    ) -> Self {
        let mut ctx = Self::new();
        ctx.insert(KEY_USER_ID, user_id);
        ctx.insert(KEY_PROJECT_ID, project_id);
        ctx.insert(KEY_TRACE_ID, trace_id);
        ctx
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// A reserved key, or `MissingContextKey` when absent.
    pub fn require(&self, key: &'static str) -> Result<&str, RuntimeError> {
        self.get(key).ok_or(RuntimeError::MissingContextKey(key))
    }

    /// The human-in-the-loop rendezvous key, `"user_id:trace_id"`.
    pub fn rendezvous_key(&self) -> Result<String, RuntimeError> {
        let user = self.require(KEY_USER_ID)?;
        let trace = self.require(KEY_TRACE_ID)?;
        Ok(format!("{user}:{trace}"))
    }

    /// The context as a JSON object, the shape injected into external tool
    /// calls under the `context` argument.
    pub fn to_json(&self) -> Map<String, Value> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: rendezvous_key joins user and trace ids with a colon.
    #[test]
    fn rendezvous_key_joins_user_and_trace() {
        let ctx = RunContext::with_identity("u1", "p1", "t1");
        assert_eq!(ctx.rendezvous_key().expect("keys present"), "u1:t1");
    }

    /// **Scenario**: require on a missing key reports which key is absent.
    #[test]
    fn require_missing_key_errors() {
        let ctx = RunContext::new();
        let err = ctx.require(KEY_TRACE_ID).unwrap_err();
        assert!(err.to_string().contains("trace_id"), "{}", err);
    }
}
