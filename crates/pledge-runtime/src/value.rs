//! Dynamic payloads carried across the embedding boundary.
//!
//! The embedding passes untyped values, so runtime-level promises carry
//! [`serde_json::Value`] for both fulfillment values and rejection reasons.

use pledge_core::{Promise, RejectFn, ResolveFn};

use crate::error::RuntimeError;

/// Dynamic value
pub type Value = serde_json::Value;

/// Promise over dynamic values
pub type DynPromise = Promise<Value, Value>;

/// Resolve capability over dynamic values
pub type DynResolve = ResolveFn<Value>;

/// Reject capability over dynamic values
pub type DynReject = RejectFn<Value>;

/// Render a runtime error as a rejection reason
pub fn error_reason(err: &RuntimeError) -> Value {
    Value::String(err.to_string())
}
