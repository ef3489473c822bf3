//! `cuebridge-core` -- plan model, task resolution, and runtime records.
//!
//! Pure domain types shared by the one-shot runner and the worker pool
//! service. Nothing in this crate spawns processes or touches the
//! network; filesystem access is limited to plan loading and runtime
//! record persistence.

pub mod error;
pub mod plan;
pub mod progress;
pub mod record;

pub use error::CoreError;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
