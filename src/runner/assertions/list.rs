use super::{locator, AssertionEngine, AssertionOutcome};
use crate::error::{Error, Result};
use crate::parser::types::Assertion;
use serde_json::Value;

impl AssertionEngine {
    /// Exact count, or strictly more than `expected` when `greater` is set
    pub(super) async fn assert_count(&self, assertion: &Assertion, greater: bool) -> Result<AssertionOutcome> {
        let key = locator(assertion)?;
        let expected = expected_count(assertion)?;
        let actual = self
            .resolver
            .resolve_all_with_wait(key, assertion.timeout)
            .await?
            .len();

        if greater && actual > expected {
            Ok(AssertionOutcome::passed(format!(
                "Found {} elements matching '{}' (> {})",
                actual, key, expected
            )))
        } else if !greater && actual == expected {
            Ok(AssertionOutcome::passed(format!(
                "Found {} elements matching '{}'",
                actual, key
            )))
        } else if greater {
            Err(Error::AssertionFailed(format!(
                "Element count for '{}' is {}, expected > {}",
                key, actual, expected
            )))
        } else {
            Err(Error::AssertionFailed(format!(
                "Element count mismatch for '{}'. Expected: {}, Actual: {}",
                key, expected, actual
            )))
        }
    }

    /// Every expected text must equal the text of some matching element
    pub(super) async fn assert_list_contains_text(&self, assertion: &Assertion) -> Result<AssertionOutcome> {
        let key = locator(assertion)?;
        let wanted: Vec<String> = match &assertion.expected {
            Value::Array(items) => items.iter().map(plain).collect(),
            Value::Null => Vec::new(),
            other => vec![plain(other)],
        };

        let elements = self
            .resolver
            .resolve_all_with_wait(key, assertion.timeout)
            .await?;
        let mut actual = Vec::with_capacity(elements.len());
        for element in &elements {
            actual.push(element.text().await?);
        }

        let missing: Vec<&String> = wanted.iter().filter(|w| !actual.contains(w)).collect();
        if missing.is_empty() {
            Ok(AssertionOutcome::passed(format!(
                "All expected texts found in list '{}'",
                key
            )))
        } else {
            Err(Error::AssertionFailed(format!(
                "Missing texts in list '{}': {:?}. Actual texts: {:?}",
                key, missing, actual
            )))
        }
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn expected_count(assertion: &Assertion) -> Result<usize> {
    let count = match &assertion.expected {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    count.map(|n| n as usize).ok_or_else(|| {
        Error::AssertionFailed(format!(
            "{} expects a non-negative count, got {}",
            assertion.type_name, assertion.expected
        ))
    })
}
