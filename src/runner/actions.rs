use super::gestures::{Gestures, SwipeOutcome};
use super::resolver::Resolver;
use crate::error::{Error, Result};
use crate::parser::types::Action;
use std::time::Duration;

const CLICK_SETTLE: Duration = Duration::from_secs(1);
const LAUNCH_SETTLE: Duration = Duration::from_secs(2);

/// What an action did, for the step record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    pub swipes: u32,
    /// Identity keys from `swipe_and_collect_children`
    pub collected: Vec<String>,
}

impl ActionOutcome {
    fn swiped(swipes: u32) -> Self {
        Self {
            swipes,
            ..Self::default()
        }
    }
}

/// Atomic device actions
#[derive(Clone)]
pub struct Actions {
    resolver: Resolver,
    gestures: Gestures,
}

impl Actions {
    pub fn new(resolver: Resolver, gestures: Gestures) -> Self {
        Self { resolver, gestures }
    }

    /// Optionally force-stop and clear data, then start the package
    pub async fn launch_app(&self, package: &str, force_stop: bool, clear_data: bool) -> Result<()> {
        let driver = self.resolver.driver();
        if force_stop {
            log::debug!("Force stopping {}", package);
            driver.stop_app(package).await?;
        }
        if clear_data {
            log::debug!("Clearing data for {}", package);
            driver.clear_app_data(package).await?;
        }
        log::debug!("Launching {}", package);
        driver.launch_app(package).await?;
        tokio::time::sleep(LAUNCH_SETTLE).await;
        Ok(())
    }

    /// Resolve `locator` and click it. With `ignore`, a missing element is a
    /// no-op and `Ok(false)` is returned.
    pub async fn click(&self, locator: &str, ignore: bool) -> Result<bool> {
        let element = match self.resolver.resolve(locator).await {
            Ok(element) => element,
            Err(e) if ignore && e.is_not_found() => {
                log::warn!("Ignoring missing element: {}", e);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        tokio::time::sleep(CLICK_SETTLE).await;
        element.click().await?;
        log::debug!("Clicked '{}'", locator);
        Ok(true)
    }

    pub async fn execute(&self, action: &Action) -> Result<ActionOutcome> {
        match action {
            Action::LaunchApp {
                package,
                force_stop,
                clear_data,
            } => {
                self.launch_app(package, *force_stop, *clear_data).await?;
                Ok(ActionOutcome::default())
            }
            Action::Click { locator, ignore } => {
                self.click(locator, *ignore).await?;
                Ok(ActionOutcome::default())
            }
            Action::Swipe { swipe, count } => {
                let swipes = self.gestures.swipe(swipe, *count).await?;
                Ok(ActionOutcome::swiped(swipes))
            }
            Action::SwipeUntilVisible { target, swipe } => {
                let outcome = self.gestures.swipe_until_visible(target, swipe).await?;
                reached(target, outcome)
            }
            Action::SwipeUntilNotVisible { target, swipe } => {
                let outcome = self.gestures.swipe_until_not_visible(target, swipe).await?;
                reached(target, outcome)
            }
            Action::SwipeToElement { target, swipe } => {
                let outcome = self.gestures.swipe_to_element(target, swipe).await?;
                reached(target, outcome)
            }
            Action::SwipeRefresh { selector } => {
                self.gestures.swipe_refresh(selector.as_deref()).await?;
                Ok(ActionOutcome::swiped(1))
            }
            Action::SwipeAndCollectChildren {
                parent,
                child,
                swipe,
            } => {
                let collected = self
                    .gestures
                    .swipe_and_collect_children(parent, child, swipe)
                    .await?;
                Ok(ActionOutcome {
                    swipes: collected.swipes,
                    collected: collected.identities,
                })
            }
            Action::Wait { duration } => {
                log::debug!("Waiting {:.1}s", duration.as_secs_f64());
                tokio::time::sleep(*duration).await;
                Ok(ActionOutcome::default())
            }
        }
    }
}

fn reached(target: &str, outcome: SwipeOutcome) -> Result<ActionOutcome> {
    if outcome.reached {
        Ok(ActionOutcome::swiped(outcome.swipes))
    } else {
        Err(Error::SwipeExhausted {
            key: target.to_string(),
            swipes: outcome.swipes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::finder::UnifiedFinder;
    use crate::driver::selector::SelectorTransformer;
    use crate::driver::testing::{MockDriver, MockElement};
    use crate::driver::traits::{Backend, SwipeDirection};
    use crate::parser::locators::LocatorCatalog;
    use crate::parser::types::SwipeConfig;
    use std::sync::Arc;
    use tokio::time::Instant;

    const CATALOG: &str = r#"
login_button:
  primary: { type: id, value: "com.example.app:id/login" }
  fallback_1: { type: text, value: Login }
consent_popup:
  primary: { type: id, value: consent }
footer:
  primary: { type: text, value: Footer }
"#;

    fn actions(driver: &Arc<MockDriver>) -> Actions {
        let finder = UnifiedFinder::new(driver.clone(), Arc::new(SelectorTransformer::new()));
        let catalog = LocatorCatalog::from_yaml_str(CATALOG, "test_locators.yaml").unwrap();
        let resolver = Resolver::new(finder, Arc::new(catalog), Duration::from_millis(500));
        Actions::new(resolver.clone(), Gestures::new(resolver))
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_app_order() {
        let driver = Arc::new(MockDriver::new(Backend::Uiautomator2));
        actions(&driver)
            .launch_app("com.example.app", true, true)
            .await
            .unwrap();
        assert_eq!(driver.stopped(), vec!["com.example.app"]);
        assert_eq!(driver.cleared(), vec!["com.example.app"]);
        assert_eq!(driver.launched(), vec!["com.example.app"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_data_failure_is_hard() {
        let driver = Arc::new(MockDriver::new(Backend::Uiautomator2));
        driver.fail_clear_data("Timed out clearing data for com.example.app");
        let err = actions(&driver)
            .launch_app("com.example.app", false, true)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Timed out"));
        assert!(driver.launched().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_falls_back_and_settles() {
        let driver = Arc::new(MockDriver::new(Backend::Appium));
        driver.add(MockElement::new("text", "Login"));
        let start = Instant::now();
        assert!(actions(&driver).click("login_button", false).await.unwrap());
        assert!(start.elapsed() >= CLICK_SETTLE);
        assert_eq!(driver.clicks("Login"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_missing_element() {
        let driver = Arc::new(MockDriver::new(Backend::Uiautomator2));
        let actions = actions(&driver);
        assert!(!actions.click("consent_popup", true).await.unwrap());
        let err = actions.click("consent_popup", false).await.unwrap_err();
        assert!(matches!(err, Error::ElementNotFound { ref key, .. } if key == "consent_popup"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreached_swipe_action_fails() {
        let driver = Arc::new(MockDriver::new(Backend::Uiautomator2));
        let actions = actions(&driver);
        let swipe = SwipeConfig {
            max_swipes: 2,
            ..SwipeConfig::default()
        };

        let err = actions
            .execute(&Action::SwipeUntilVisible {
                target: "footer".into(),
                swipe: swipe.clone(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SwipeExhausted { swipes: 2, .. }));

        driver.add(MockElement::new("text", "Footer").revealed_after(Some(SwipeDirection::Up), 3));
        let outcome = actions
            .execute(&Action::SwipeUntilVisible {
                target: "footer".into(),
                swipe,
            })
            .await
            .unwrap();
        assert_eq!(outcome.swipes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_swipe_and_wait() {
        let driver = Arc::new(MockDriver::new(Backend::Uiautomator2));
        let actions = actions(&driver);
        let outcome = actions
            .execute(&Action::Swipe {
                swipe: SwipeConfig::default(),
                count: 3,
            })
            .await
            .unwrap();
        assert_eq!(outcome.swipes, 3);
        assert_eq!(driver.swipe_count_in(SwipeDirection::Up), 3);

        let start = Instant::now();
        actions
            .execute(&Action::Wait {
                duration: Duration::from_secs(3),
            })
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }
}
