//! Assertion engine.
//!
//! Every check resolves its element through the locator resolver and, when
//! `swipe` is configured, scrolls with the gesture engine before retrying.
//! A failing check returns [`Error::AssertionFailed`] with an expected-vs-actual
//! diagnostic; a caller-supplied `message` replaces that diagnostic.

mod app_state;
mod element_state;
mod event;
mod layout;
mod list;
mod text;
mod visibility;
mod watching;

pub use event::{extract_json, matches_expected, timestamp_in_window};

use super::gestures::Gestures;
use super::resolver::Resolver;
use crate::driver::traits::Element;
use crate::error::{Error, Result};
use crate::parser::types::{Assertion, AssertionKind};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssertionStatus {
    Passed,
    /// Recognised but not verifiable on this runner
    Skipped,
}

/// Successful evaluation of one assertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionOutcome {
    pub status: AssertionStatus,
    pub message: String,
    /// Swipes issued while bringing the element into view
    pub swipes: u32,
}

impl AssertionOutcome {
    pub(crate) fn passed(message: impl Into<String>) -> Self {
        Self {
            status: AssertionStatus::Passed,
            message: message.into(),
            swipes: 0,
        }
    }

    pub(crate) fn skipped(message: impl Into<String>) -> Self {
        Self {
            status: AssertionStatus::Skipped,
            message: message.into(),
            swipes: 0,
        }
    }

    pub(crate) fn with_swipes(mut self, swipes: u32) -> Self {
        self.swipes = swipes;
        self
    }
}

/// Failure of one assertion, with the swipes spent before giving up
#[derive(Debug)]
pub struct AssertionFailure {
    pub error: Error,
    pub swipes: u32,
}

/// Element lookup result with the swipes spent finding it
pub(crate) struct Located {
    pub element: Option<Element>,
    pub swipes: u32,
}

#[derive(Clone)]
pub struct AssertionEngine {
    resolver: Resolver,
    gestures: Gestures,
    /// Device log captured for the running test
    device_log: Option<PathBuf>,
}

impl AssertionEngine {
    pub fn new(resolver: Resolver, gestures: Gestures, device_log: Option<PathBuf>) -> Self {
        Self {
            resolver,
            gestures,
            device_log,
        }
    }

    /// Evaluate one assertion. `step_started` (epoch seconds) is the default
    /// start of the event window.
    pub async fn evaluate(
        &self,
        assertion: &Assertion,
        step_started: f64,
    ) -> std::result::Result<AssertionOutcome, AssertionFailure> {
        let mut swipes = 0;
        let result = self.dispatch(assertion, step_started, &mut swipes).await;
        match result {
            Ok(outcome) => {
                log::info!("✅ PASS: {}", outcome.message);
                Ok(outcome)
            }
            Err(error) => {
                let error = match error {
                    Error::AssertionFailed(diagnostic) => {
                        Error::AssertionFailed(assertion.message.clone().unwrap_or(diagnostic))
                    }
                    e @ Error::UnknownAssertion(_) => e,
                    other => Error::AssertionFailed(assertion.message.clone().unwrap_or_else(|| {
                        format!("{} on '{}': {}", assertion.type_name, target_name(assertion), other)
                    })),
                };
                log::error!("❌ FAIL: {}", error);
                Err(AssertionFailure { error, swipes })
            }
        }
    }

    async fn dispatch(
        &self,
        assertion: &Assertion,
        step_started: f64,
        swipes: &mut u32,
    ) -> Result<AssertionOutcome> {
        match &assertion.kind {
            AssertionKind::Visible => self.assert_visible(assertion, swipes).await,
            AssertionKind::NotVisible => self.assert_not_visible(assertion, swipes).await,
            AssertionKind::Exists => self.assert_exists(assertion, swipes).await,
            AssertionKind::NotExists => self.assert_not_exists(assertion, swipes).await,
            AssertionKind::Enabled => self.assert_enabled(assertion, true, swipes).await,
            AssertionKind::Disabled => self.assert_enabled(assertion, false, swipes).await,
            AssertionKind::Selected => self.assert_selected(assertion, true, swipes).await,
            AssertionKind::NotSelected => self.assert_selected(assertion, false, swipes).await,
            AssertionKind::Text(mode) => self.assert_text(assertion, *mode, swipes).await,
            AssertionKind::Attribute(mode) => self.assert_attribute(assertion, *mode, swipes).await,
            AssertionKind::ElementCount => self.assert_count(assertion, false).await,
            AssertionKind::CountGreaterThan => self.assert_count(assertion, true).await,
            AssertionKind::ListContainsText => self.assert_list_contains_text(assertion).await,
            AssertionKind::ElementPosition => self.assert_position(assertion, swipes).await,
            AssertionKind::ElementSize => self.assert_size(assertion, swipes).await,
            AssertionKind::CurrentApp => self.assert_current_app(assertion).await,
            AssertionKind::ScreenOrientation => self.assert_orientation(assertion).await,
            AssertionKind::EventTriggered => self.assert_event_triggered(assertion, step_started).await,
            AssertionKind::ElementAppears => self.assert_element_appears(assertion).await,
            AssertionKind::BackgroundColor | AssertionKind::TextColor => {
                self.assert_color(assertion).await
            }
            AssertionKind::Unknown(name) => Err(Error::UnknownAssertion(name.clone())),
        }
    }

    /// Resolve within `timeout`; `None` when nothing matched
    pub(crate) async fn find(&self, key: &str, timeout: Duration) -> Result<Option<Element>> {
        match self.resolver.resolve_with_wait(key, timeout).await {
            Ok(element) => Ok(Some(element)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Direct lookup with half the timeout; when that misses and swipe is
    /// configured, scroll until visible and look again with the other half
    pub(crate) async fn locate(&self, assertion: &Assertion, require_visible: bool) -> Result<Located> {
        let key = locator(assertion)?;
        let half = assertion.timeout / 2;

        if let Some(element) = self.find(key, half).await? {
            if !require_visible || super::resolver::element_visible(&element).await {
                return Ok(Located {
                    element: Some(element),
                    swipes: 0,
                });
            }
        }
        log::debug!("'{}' not found on first attempt", key);

        let Some(swipe) = &assertion.swipe else {
            return Ok(Located {
                element: None,
                swipes: 0,
            });
        };
        let outcome = self.gestures.swipe_until_visible(key, swipe).await?;
        if outcome.reached {
            if let Some(element) = self.find(key, assertion.timeout - half).await? {
                if !require_visible || super::resolver::element_visible(&element).await {
                    return Ok(Located {
                        element: Some(element),
                        swipes: outcome.swipes,
                    });
                }
            }
        }
        Ok(Located {
            element: None,
            swipes: outcome.swipes,
        })
    }

    /// Like [`Self::locate`] without the visibility requirement, failing
    /// when the element cannot be found
    pub(crate) async fn require(&self, assertion: &Assertion, swipes: &mut u32) -> Result<Element> {
        let located = self.locate(assertion, false).await?;
        *swipes = located.swipes;
        located.element.ok_or_else(|| {
            Error::AssertionFailed(format!(
                "Element '{}' not found{}",
                target_name(assertion),
                budget(assertion, located.swipes)
            ))
        })
    }
}

pub(crate) fn locator(assertion: &Assertion) -> Result<&str> {
    assertion.locator.as_deref().ok_or_else(|| {
        Error::InvalidDefinition(format!("assertion '{}' has no locator", assertion.type_name))
    })
}

pub(crate) fn target_name(assertion: &Assertion) -> String {
    assertion
        .locator
        .clone()
        .unwrap_or_else(|| assertion.expected_text())
}

/// Diagnostic suffix naming the timeout and, with swipes, the swipe budget
pub(crate) fn budget(assertion: &Assertion, swipes: u32) -> String {
    let mut text = format!(" within {:.1}s", assertion.timeout.as_secs_f64());
    if let Some(swipe) = &assertion.swipe {
        text.push_str(&format!(
            " after {} swipe(s) {} (max_swipe {})",
            swipes, swipe.direction, swipe.max_swipes
        ));
        if let Some(fallback) = swipe.fallback_direction {
            text.push_str(&format!(", fallback {}", fallback));
        }
    }
    text
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::driver::finder::UnifiedFinder;
    use crate::driver::selector::SelectorTransformer;
    use crate::driver::testing::MockDriver;
    use crate::parser::locators::LocatorCatalog;
    use crate::parser::yaml::compile_assertion;
    use std::sync::Arc;

    pub const CATALOG: &str = r#"
welcome_banner:
  primary: { type: id, value: "com.example.app:id/welcome" }
  fallback_1: { type: text, value: Welcome }
login_button:
  primary: { type: id, value: login }
remember_me:
  primary: { type: id, value: remember }
rows:
  primary: { type: class, value: android.widget.TextView }
avatar:
  primary: { type: accessibility_id, value: avatar }
"#;

    pub fn engine(driver: &Arc<MockDriver>, device_log: Option<PathBuf>) -> AssertionEngine {
        let finder = UnifiedFinder::new(driver.clone(), Arc::new(SelectorTransformer::new()));
        let catalog = LocatorCatalog::from_yaml_str(CATALOG, "test_locators.yaml").unwrap();
        let resolver = Resolver::new(finder, Arc::new(catalog), Duration::from_millis(500));
        AssertionEngine::new(resolver.clone(), Gestures::new(resolver), device_log)
    }

    pub fn assertion(yaml: &str) -> Assertion {
        compile_assertion(&serde_yaml::from_str(yaml).unwrap()).unwrap()
    }

    pub fn failure_message(failure: AssertionFailure) -> String {
        match failure.error {
            Error::AssertionFailed(message) => message,
            other => panic!("expected AssertionFailed, got {other}"),
        }
    }
}
