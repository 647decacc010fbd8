use super::{locator, AssertionEngine, AssertionOutcome};
use crate::driver::traits::Orientation;
use crate::error::{Error, Result};
use crate::parser::types::Assertion;

impl AssertionEngine {
    /// Foreground package check. With `ignore_interference`, a mismatch still
    /// passes when the package is among the recent tasks.
    pub(super) async fn assert_current_app(&self, assertion: &Assertion) -> Result<AssertionOutcome> {
        let expected = assertion.expected_text();
        if expected.is_empty() {
            return Err(Error::AssertionFailed(format!(
                "{} requires the expected package",
                assertion.type_name
            )));
        }
        let driver = self.resolver.driver();
        let current = driver.current_package().await?;
        if current == expected {
            return Ok(AssertionOutcome::passed(format!("Current app is '{}'", expected)));
        }

        if assertion.ignore_interference {
            log::debug!(
                "Foreground is '{}', looking for '{}' in recent tasks",
                current,
                expected
            );
            match driver.recent_packages().await {
                Ok(recent) if recent.iter().any(|p| *p == expected) => {
                    log::warn!(
                        "'{}' is in recent tasks while '{}' has the foreground",
                        expected,
                        current
                    );
                    return Ok(AssertionOutcome::passed(format!(
                        "App '{}' is running (foreground interrupted by '{}')",
                        expected, current
                    )));
                }
                Ok(_) => {}
                Err(e) => log::warn!("Could not read recent tasks: {:#}", e),
            }
        }

        Err(Error::AssertionFailed(format!(
            "Current app mismatch. Expected: '{}', Actual: '{}'",
            expected, current
        )))
    }

    pub(super) async fn assert_orientation(&self, assertion: &Assertion) -> Result<AssertionOutcome> {
        let expected: Orientation = assertion.expected_text().parse()?;
        let actual = self.resolver.driver().orientation().await?;
        if actual == expected {
            Ok(AssertionOutcome::passed(format!("Screen orientation is {}", actual)))
        } else {
            Err(Error::AssertionFailed(format!(
                "Screen orientation mismatch. Expected: {}, Actual: {}",
                expected, actual
            )))
        }
    }

    /// Colors cannot be read from the hierarchy; the element must exist and
    /// the check is recorded as skipped
    pub(super) async fn assert_color(&self, assertion: &Assertion) -> Result<AssertionOutcome> {
        let key = locator(assertion)?;
        let mut swipes = 0;
        self.require(assertion, &mut swipes).await?;
        log::warn!(
            "{} on '{}' needs visual verification, skipping",
            assertion.type_name,
            key
        );
        Ok(AssertionOutcome::skipped(format!(
            "{} on '{}' not verified",
            assertion.type_name, key
        ))
        .with_swipes(swipes))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::super::AssertionStatus;
    use crate::driver::testing::{MockDriver, MockElement};
    use crate::driver::traits::{Backend, Orientation};
    use crate::error::Error;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_current_app_direct_match() {
        let driver = Arc::new(MockDriver::new(Backend::Uiautomator2));
        driver.set_current_package("com.example.app");
        let engine = engine(&driver, None);

        assert!(engine
            .evaluate(&assertion("{ type: current_app, expected: com.example.app }"), 0.0)
            .await
            .is_ok());
        let failure = engine
            .evaluate(&assertion("{ type: current_app, expected: com.other }"), 0.0)
            .await
            .unwrap_err();
        assert_eq!(
            failure_message(failure),
            "Current app mismatch. Expected: 'com.other', Actual: 'com.example.app'"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_interference_falls_back_to_recents() {
        let driver = Arc::new(MockDriver::new(Backend::Uiautomator2));
        driver.set_current_package("com.google.android.permissioncontroller");
        driver.set_recent(&["com.google.android.permissioncontroller", "com.example.app"]);
        let engine = engine(&driver, None);

        assert!(engine
            .evaluate(&assertion("{ type: app_launched, expected: com.example.app }"), 0.0)
            .await
            .is_ok());
        assert!(engine
            .evaluate(&assertion("{ type: current_app, expected: com.example.app }"), 0.0)
            .await
            .is_err());
        assert!(engine
            .evaluate(
                &assertion("{ type: current_app, expected: com.missing, ignore_interference: true }"),
                0.0
            )
            .await
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_orientation() {
        let driver = Arc::new(MockDriver::new(Backend::Appium));
        driver.set_orientation(Orientation::Landscape);
        let engine = engine(&driver, None);

        assert!(engine
            .evaluate(&assertion("{ type: screen_orientation, expected: LANDSCAPE }"), 0.0)
            .await
            .is_ok());
        assert!(engine
            .evaluate(&assertion("{ type: screen_orientation, expected: portrait }"), 0.0)
            .await
            .is_err());
        let failure = engine
            .evaluate(&assertion("{ type: screen_orientation, expected: diagonal }"), 0.0)
            .await
            .unwrap_err();
        assert!(matches!(failure.error, Error::AssertionFailed(ref m) if m.contains("diagonal")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_color_checks_are_skipped() {
        let driver = Arc::new(MockDriver::new(Backend::Uiautomator2));
        driver.add(MockElement::new("id", "login"));
        let engine = engine(&driver, None);

        let outcome = engine
            .evaluate(
                &assertion("{ type: background_color, locator: login_button, expected: '#FF0000' }"),
                0.0,
            )
            .await
            .unwrap();
        assert_eq!(outcome.status, AssertionStatus::Skipped);

        assert!(engine
            .evaluate(
                &assertion("{ type: text_color, locator: remember_me, expected: '#000000', timeout: 1 }"),
                0.0
            )
            .await
            .is_err());
    }
}
