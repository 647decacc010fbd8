use super::{target_name, AssertionEngine, AssertionOutcome};
use crate::error::{Error, Result};
use crate::parser::types::{Assertion, AttributeMatch, TextMatch};

impl TextMatch {
    fn verb(self) -> &'static str {
        match self {
            TextMatch::Equals => "equal",
            TextMatch::Contains => "contain",
            TextMatch::NotContains => "not contain",
            TextMatch::StartsWith => "start with",
            TextMatch::EndsWith => "end with",
        }
    }

    /// Case-sensitive comparison of `actual` against `expected`
    pub fn matches(self, actual: &str, expected: &str) -> bool {
        match self {
            TextMatch::Equals => actual == expected,
            TextMatch::Contains => actual.contains(expected),
            TextMatch::NotContains => !actual.contains(expected),
            TextMatch::StartsWith => actual.starts_with(expected),
            TextMatch::EndsWith => actual.ends_with(expected),
        }
    }
}

impl AssertionEngine {
    pub(super) async fn assert_text(
        &self,
        assertion: &Assertion,
        mode: TextMatch,
        swipes: &mut u32,
    ) -> Result<AssertionOutcome> {
        let element = self.require(assertion, swipes).await?;
        let actual = element.text().await?;
        let expected = assertion.expected_text();
        let key = target_name(assertion);

        if mode.matches(&actual, &expected) {
            Ok(AssertionOutcome::passed(format!(
                "Element '{}' text does {} '{}'",
                key,
                mode.verb(),
                expected
            ))
            .with_swipes(*swipes))
        } else {
            Err(Error::AssertionFailed(format!(
                "Element '{}' text does not {} '{}'. Actual: '{}'",
                key,
                mode.verb(),
                expected,
                actual
            )))
        }
    }

    pub(super) async fn assert_attribute(
        &self,
        assertion: &Assertion,
        mode: AttributeMatch,
        swipes: &mut u32,
    ) -> Result<AssertionOutcome> {
        let name = assertion.attribute.as_deref().ok_or_else(|| {
            Error::AssertionFailed(format!("{} requires an 'attribute' name", assertion.type_name))
        })?;
        let element = self.require(assertion, swipes).await?;
        let key = target_name(assertion);
        let expected = assertion.expected_text();

        let Some(actual) = element.attribute(name).await? else {
            return Err(Error::AssertionFailed(format!(
                "Element '{}' has no attribute '{}'",
                key, name
            )));
        };
        let matched = match mode {
            AttributeMatch::Equals => actual == expected,
            AttributeMatch::Contains => actual.contains(&expected),
        };
        let verb = match mode {
            AttributeMatch::Equals => "equals",
            AttributeMatch::Contains => "contains",
        };

        if matched {
            Ok(AssertionOutcome::passed(format!(
                "Element '{}' attribute '{}' {} '{}'",
                key, name, verb, expected
            ))
            .with_swipes(*swipes))
        } else {
            Err(Error::AssertionFailed(format!(
                "Element '{}' attribute '{}' mismatch. Expected it {} '{}', actual: '{}'",
                key, name, verb, expected, actual
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::driver::testing::{MockDriver, MockElement};
    use crate::driver::traits::Backend;
    use std::sync::Arc;

    #[test]
    fn test_text_modes() {
        assert!(TextMatch::Equals.matches("Welcome", "Welcome"));
        assert!(!TextMatch::Equals.matches("Welcome", "welcome"));
        assert!(TextMatch::Contains.matches("Welcome back", "back"));
        assert!(TextMatch::NotContains.matches("Welcome back", "bye"));
        assert!(TextMatch::StartsWith.matches("Welcome back", "Wel"));
        assert!(TextMatch::EndsWith.matches("Welcome back", "back"));
        assert!(!TextMatch::EndsWith.matches("Welcome back", "Wel"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_assertions_against_element() {
        let driver = Arc::new(MockDriver::new(Backend::Uiautomator2));
        driver.add(MockElement::new("text", "Welcome").text("Welcome back, Ana"));
        let engine = engine(&driver, None);

        assert!(engine
            .evaluate(
                &assertion("{ type: text_starts_with, locator: welcome_banner, expected: Welcome }"),
                0.0
            )
            .await
            .is_ok());
        let failure = engine
            .evaluate(
                &assertion("{ type: text_equals, locator: welcome_banner, expected: Welcome }"),
                0.0,
            )
            .await
            .unwrap_err();
        assert_eq!(
            failure_message(failure),
            "Element 'welcome_banner' text does not equal 'Welcome'. Actual: 'Welcome back, Ana'"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_attribute_assertions() {
        let driver = Arc::new(MockDriver::new(Backend::Appium));
        driver.add(MockElement::new("id", "login").attr("content-desc", "Log in button"));
        let engine = engine(&driver, None);

        assert!(engine
            .evaluate(
                &assertion(
                    "{ type: attribute_contains, locator: login_button, attribute: content-desc, expected: Log in }"
                ),
                0.0
            )
            .await
            .is_ok());
        assert!(engine
            .evaluate(
                &assertion("{ type: attribute_equals, locator: login_button, attribute: enabled, expected: true }"),
                0.0
            )
            .await
            .is_ok());

        let failure = engine
            .evaluate(
                &assertion("{ type: attribute_equals, locator: login_button, attribute: checked, expected: true }"),
                0.0,
            )
            .await
            .unwrap_err();
        assert_eq!(
            failure_message(failure),
            "Element 'login_button' has no attribute 'checked'"
        );

        let failure = engine
            .evaluate(&assertion("{ type: attribute_equals, locator: login_button, expected: x }"), 0.0)
            .await
            .unwrap_err();
        assert!(failure_message(failure).contains("requires an 'attribute'"));
    }
}
