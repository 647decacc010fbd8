use super::{target_name, AssertionEngine, AssertionOutcome};
use crate::error::{Error, Result};
use crate::parser::types::Assertion;
use serde_json::Value;

impl AssertionEngine {
    /// Top-left corner against `expected: {x, y}` within `tolerance` pixels
    pub(super) async fn assert_position(&self, assertion: &Assertion, swipes: &mut u32) -> Result<AssertionOutcome> {
        let (x, y) = expected_pair(assertion, "x", "y")?;
        let element = self.require(assertion, swipes).await?;
        let bounds = element.bounds().await?;
        let key = target_name(assertion);

        if within(bounds.left, x, assertion.tolerance) && within(bounds.top, y, assertion.tolerance) {
            Ok(AssertionOutcome::passed(format!(
                "Element '{}' position ({}, {}) within tolerance",
                key, bounds.left, bounds.top
            ))
            .with_swipes(*swipes))
        } else {
            Err(Error::AssertionFailed(format!(
                "Element '{}' position mismatch. Expected: ({}, {}), Actual: ({}, {})",
                key, x, y, bounds.left, bounds.top
            )))
        }
    }

    pub(super) async fn assert_size(&self, assertion: &Assertion, swipes: &mut u32) -> Result<AssertionOutcome> {
        let (width, height) = expected_pair(assertion, "width", "height")?;
        let element = self.require(assertion, swipes).await?;
        let bounds = element.bounds().await?;
        let key = target_name(assertion);

        if within(bounds.width(), width, assertion.tolerance)
            && within(bounds.height(), height, assertion.tolerance)
        {
            Ok(AssertionOutcome::passed(format!(
                "Element '{}' size ({}x{}) within tolerance",
                key,
                bounds.width(),
                bounds.height()
            ))
            .with_swipes(*swipes))
        } else {
            Err(Error::AssertionFailed(format!(
                "Element '{}' size mismatch. Expected: {}x{}, Actual: {}x{}",
                key,
                width,
                height,
                bounds.width(),
                bounds.height()
            )))
        }
    }
}

fn within(actual: i32, expected: i32, tolerance: i32) -> bool {
    (actual - expected).abs() <= tolerance
}

fn expected_pair(assertion: &Assertion, first: &str, second: &str) -> Result<(i32, i32)> {
    let field = |name: &str| -> Option<i32> {
        match assertion.expected.get(name)? {
            Value::Number(n) => n.as_f64().map(|v| v.round() as i32),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    };
    match (field(first), field(second)) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(Error::AssertionFailed(format!(
            "{} expects {{{}, {}}}, got {}",
            assertion.type_name, first, second, assertion.expected
        ))),
    }
}
