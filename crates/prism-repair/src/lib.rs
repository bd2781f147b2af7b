//! Layered extraction and repair of JSON from model output.
//!
//! Language models wrap structured answers in markdown fences, prose,
//! smart quotes, and broken escaping. This crate recovers the JSON with
//! an ordered set of strategies, each more aggressive than the last, and
//! reports which one succeeded.

pub mod clean;
pub mod extract;
pub mod pipeline;
pub mod schema;
pub mod syntax;

pub use clean::{clean, contains_fence};
pub use extract::extract_balanced;
pub use pipeline::{validate, ParseStrategy, ValidateOptions, ValidationResult};
pub use schema::{normalize, ExpectedField, FieldKind};
pub use syntax::repair;
