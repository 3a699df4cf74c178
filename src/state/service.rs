// SPDX-License-Identifier: MIT

//! Get/set operations over the state store

use log::info;
use serde_json::Value;

use super::record::{count_in_range, is_hex_color, StateRecord, LED_MAX, LED_MIN};
use super::store::StateStore;
use crate::error::StateError;

/// A proposed update as received from a client, before validation.
///
/// Fields hold raw JSON so that type mismatches are reported as validation
/// failures instead of deserialization errors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProposedUpdate {
    pub color: Option<Value>,
    pub count: Option<Value>,
}

impl ProposedUpdate {
    pub fn new(color: impl Into<String>, count: i64) -> Self {
        Self {
            color: Some(Value::String(color.into())),
            count: Some(Value::from(count)),
        }
    }

    /// Read an update from a request body. Anything that is not a JSON
    /// object counts as an empty update.
    pub fn from_body(body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(obj)) => Self {
                color: obj.get("color").filter(|v| !v.is_null()).cloned(),
                count: obj.get("count").filter(|v| !v.is_null()).cloned(),
            },
            _ => Self::default(),
        }
    }
}

/// Interpret a JSON value as an integer without rounding.
///
/// Integers, floats with no fractional part and strings holding a decimal
/// integer qualify; booleans and everything else do not.
fn integer_like(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Check an update. Color is checked before count; the first failure is
/// the one reported.
pub fn validate(update: &ProposedUpdate) -> Result<(String, i64), StateError> {
    let color = match &update.color {
        Some(Value::String(s)) if is_hex_color(s) => s.clone(),
        _ => return Err(StateError::invalid_input("invalid color, use format #RRGGBB")),
    };

    let count = match update.count.as_ref().and_then(integer_like) {
        Some(n) if count_in_range(n) => n,
        _ => {
            return Err(StateError::invalid_input(format!(
                "invalid count, must be between {} and {}",
                LED_MIN, LED_MAX
            )))
        }
    };

    Ok((color, count))
}

/// Reads and updates the shared record. Holds no cached state; every call
/// goes back to the store.
///
/// Updates are last-write-wins: two concurrent `set_state` calls can load
/// the same revision and both write its successor.
#[derive(Debug, Clone)]
pub struct StateService {
    store: StateStore,
}

impl StateService {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Current record, creating or repairing it if needed
    pub fn get_state(&self) -> StateRecord {
        self.store.load().into_record()
    }

    /// Validate `update` and, if it passes, persist it as the next revision
    pub fn set_state(&self, update: &ProposedUpdate) -> Result<StateRecord, StateError> {
        let (color, count) = validate(update)?;

        let current = self.store.load().into_record();
        let next = current
            .next(color, count, self.store.clock().now())
            .ok_or(StateError::RevisionExhausted(current.rev))?;
        self.store.atomic_write(&next)?;

        info!(
            "State updated to rev {} (color {}, count {})",
            next.rev, next.color, next.count
        );
        Ok(next)
    }
}
