pub mod locators;
pub mod types;
pub mod yaml;

pub use locators::{LocatorCatalog, LocatorDefinition, Strategy};
pub use types::{Action, Assertion, AssertionKind, Step, SwipeConfig, TestCase};
pub use yaml::Suite;

use serde_yaml::Value;

/// Render a YAML scalar as a string; booleans and numbers are coerced
pub(crate) fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
