use super::{target_name, AssertionEngine, AssertionOutcome};
use crate::error::{Error, Result};
use crate::parser::types::Assertion;

impl AssertionEngine {
    pub(super) async fn assert_enabled(
        &self,
        assertion: &Assertion,
        expected: bool,
        swipes: &mut u32,
    ) -> Result<AssertionOutcome> {
        let element = self.require(assertion, swipes).await?;
        let actual = element.is_enabled().await?;
        state_outcome(assertion, "enabled", "disabled", expected, actual, *swipes)
    }

    pub(super) async fn assert_selected(
        &self,
        assertion: &Assertion,
        expected: bool,
        swipes: &mut u32,
    ) -> Result<AssertionOutcome> {
        let element = self.require(assertion, swipes).await?;
        let actual = element.is_selected().await?;
        state_outcome(assertion, "selected", "not selected", expected, actual, *swipes)
    }
}

fn state_outcome(
    assertion: &Assertion,
    on: &str,
    off: &str,
    expected: bool,
    actual: bool,
    swipes: u32,
) -> Result<AssertionOutcome> {
    let describe = |state: bool| if state { on } else { off };
    let key = target_name(assertion);
    if actual == expected {
        Ok(AssertionOutcome::passed(format!("Element '{}' is {}", key, describe(actual))).with_swipes(swipes))
    } else {
        Err(Error::AssertionFailed(format!(
            "Element '{}' expected {} but was {}",
            key,
            describe(expected),
            describe(actual)
        )))
    }
}
