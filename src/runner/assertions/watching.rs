use super::{locator, AssertionEngine, AssertionOutcome};
use crate::error::{Error, Result};
use crate::parser::types::Assertion;
use tokio::time::Instant;

impl AssertionEngine {
    /// Watch for the element every `check_interval` until `timeout`
    pub(super) async fn assert_element_appears(&self, assertion: &Assertion) -> Result<AssertionOutcome> {
        let key = locator(assertion)?;
        let start = Instant::now();
        let mut checks = 0u32;

        loop {
            checks += 1;
            if self.resolver.is_visible(key).await? {
                return Ok(AssertionOutcome::passed(format!(
                    "Element '{}' appeared after {:.1}s ({} check(s))",
                    key,
                    start.elapsed().as_secs_f64(),
                    checks
                )));
            }
            if start.elapsed() >= assertion.timeout {
                break;
            }
            tokio::time::sleep(assertion.check_interval).await;
        }

        Err(Error::AssertionFailed(format!(
            "Element '{}' did not appear within {:.1}s (checked {} times)",
            key,
            assertion.timeout.as_secs_f64(),
            checks
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use crate::driver::testing::{MockDriver, MockElement};
    use crate::driver::traits::Backend;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_appears_after_a_few_checks() {
        let driver = Arc::new(MockDriver::new(Backend::Uiautomator2));
        driver.add(MockElement::new("id", "login").available_after_finds(4));
        let start = Instant::now();
        let outcome = engine(&driver, None)
            .evaluate(&assertion("{ type: element_appears, expected: login_button }"), 0.0)
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
        assert!(outcome.message.ends_with("(4 check(s))"), "{}", outcome.message);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_appears() {
        let driver = Arc::new(MockDriver::new(Backend::Uiautomator2));
        let failure = engine(&driver, None)
            .evaluate(
                &assertion("{ type: element_appears, expected: login_button, timeout: 2, check_interval: 1 }"),
                0.0,
            )
            .await
            .unwrap_err();
        assert_eq!(
            failure_message(failure),
            "Element 'login_button' did not appear within 2.0s (checked 3 times)"
        );
    }
}
