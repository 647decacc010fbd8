use super::{budget, locator, AssertionEngine, AssertionOutcome};
use crate::error::{Error, Result};
use crate::parser::types::Assertion;
use tokio::time::Instant;

impl AssertionEngine {
    pub(super) async fn assert_visible(&self, assertion: &Assertion, swipes: &mut u32) -> Result<AssertionOutcome> {
        let key = locator(assertion)?;
        let located = self.locate(assertion, true).await?;
        *swipes = located.swipes;
        match located.element {
            Some(_) if located.swipes > 0 => Ok(AssertionOutcome::passed(format!(
                "Element '{}' is visible after {} swipe(s)",
                key, located.swipes
            ))
            .with_swipes(located.swipes)),
            Some(_) => Ok(AssertionOutcome::passed(format!("Element '{}' is visible", key))),
            None => Err(Error::AssertionFailed(format!(
                "Element '{}' is not visible{}",
                key,
                budget(assertion, located.swipes)
            ))),
        }
    }

    /// Passes once the element is gone or hidden. With swipe configured the
    /// scan swipes until the element leaves the screen.
    pub(super) async fn assert_not_visible(&self, assertion: &Assertion, swipes: &mut u32) -> Result<AssertionOutcome> {
        let key = locator(assertion)?;

        if let Some(swipe) = &assertion.swipe {
            let outcome = self.gestures.swipe_until_not_visible(key, swipe).await?;
            *swipes = outcome.swipes;
            if outcome.reached {
                return Ok(AssertionOutcome::passed(format!("Element '{}' is not visible", key))
                    .with_swipes(outcome.swipes));
            }
        }

        let start = Instant::now();
        loop {
            if !self.resolver.is_visible(key).await? {
                return Ok(AssertionOutcome::passed(format!("Element '{}' is not visible", key))
                    .with_swipes(*swipes));
            }
            if start.elapsed() >= assertion.timeout {
                break;
            }
            tokio::time::sleep(assertion.check_interval).await;
        }
        Err(Error::AssertionFailed(format!(
            "Element '{}' is still visible{}",
            key,
            budget(assertion, *swipes)
        )))
    }

    pub(super) async fn assert_exists(&self, assertion: &Assertion, swipes: &mut u32) -> Result<AssertionOutcome> {
        let key = locator(assertion)?;
        let located = self.locate(assertion, false).await?;
        *swipes = located.swipes;
        if located.element.is_some() {
            Ok(AssertionOutcome::passed(format!("Element '{}' exists", key)).with_swipes(located.swipes))
        } else {
            Err(Error::AssertionFailed(format!(
                "Element '{}' does not exist{}",
                key,
                budget(assertion, located.swipes)
            )))
        }
    }

    /// With swipe configured, scanning that brings the element into view is
    /// a failure; otherwise waits for it to disappear
    pub(super) async fn assert_not_exists(&self, assertion: &Assertion, swipes: &mut u32) -> Result<AssertionOutcome> {
        let key = locator(assertion)?;

        if let Some(swipe) = &assertion.swipe {
            let outcome = self.gestures.swipe_until_visible(key, swipe).await?;
            *swipes = outcome.swipes;
            if outcome.reached {
                return Err(Error::AssertionFailed(format!(
                    "Element '{}' still exists after {} swipe(s)",
                    key, outcome.swipes
                )));
            }
        }

        let start = Instant::now();
        loop {
            match self.resolver.resolve(key).await {
                Err(e) if e.is_not_found() => {
                    return Ok(AssertionOutcome::passed(format!("Element '{}' does not exist", key))
                        .with_swipes(*swipes))
                }
                Err(e) => return Err(e),
                Ok(_) => {}
            }
            if start.elapsed() >= assertion.timeout {
                break;
            }
            tokio::time::sleep(assertion.check_interval).await;
        }
        Err(Error::AssertionFailed(format!(
            "Element '{}' still exists after {:.1}s",
            key,
            assertion.timeout.as_secs_f64()
        )))
    }
}
