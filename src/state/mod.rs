// SPDX-License-Identifier: MIT

//! The shared LED state
//!
//! This module provides:
//! - `StateRecord` - the persisted color/count/revision record
//! - `StateStore` - durable, atomically replaced on-disk storage
//! - `StateService` - validated get/set over the store

mod record;
mod service;
mod store;

pub use record::{
    count_in_range, is_hex_color, timestamp, Clock, StateRecord, SystemClock, DEFAULT_COLOR,
    DEFAULT_COUNT, INITIAL_REV, LED_MAX, LED_MIN,
};
pub use service::{validate, ProposedUpdate, StateService};
pub use store::{LoadOutcome, StateStore};
