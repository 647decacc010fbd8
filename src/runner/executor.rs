//! Step interpreter: runs a compiled test case step by step on one device.

use super::actions::Actions;
use super::artifacts::capture_screenshot;
use super::assertions::{AssertionEngine, AssertionStatus};
use super::context::TestContext;
use super::events::{EventEmitter, TestEvent};
use super::gestures::Gestures;
use super::resolver::Resolver;
use super::state::{StepState, TestState};
use crate::driver::finder::UnifiedFinder;
use crate::driver::selector::SelectorTransformer;
use crate::driver::traits::DeviceDriver;
use crate::parser::locators::LocatorCatalog;
use crate::parser::types::Step;
use crate::report::types::{AssertionRecord, Status};
use crate::utils::config::{FrameworkConfig, ScreenshotConfig};
use std::sync::Arc;
use std::time::Duration;

/// Execution policy shared by every step of a run
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Extra attempts for a failing action, unless the step overrides it
    pub retry_count: u32,
    pub retry_backoff: Duration,
    pub poll_interval: Duration,
    pub screenshots: ScreenshotConfig,
}

impl ExecutorOptions {
    pub fn from_config(config: &FrameworkConfig) -> Self {
        Self {
            retry_count: config.core.retry_count,
            retry_backoff: config.retry_backoff(),
            poll_interval: config.poll_interval(),
            screenshots: config.artifacts.screenshots.clone(),
        }
    }
}

fn epoch_seconds() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

pub struct TestExecutor {
    driver: Arc<dyn DeviceDriver>,
    actions: Actions,
    assertions: AssertionEngine,
    context: TestContext,
    emitter: EventEmitter,
    options: ExecutorOptions,
}

impl TestExecutor {
    pub fn new(
        driver: Arc<dyn DeviceDriver>,
        catalog: Arc<LocatorCatalog>,
        context: TestContext,
        emitter: EventEmitter,
        options: ExecutorOptions,
    ) -> Self {
        let finder = UnifiedFinder::new(driver.clone(), Arc::new(SelectorTransformer::new()));
        let resolver = Resolver::new(finder, catalog, options.poll_interval);
        let gestures = Gestures::new(resolver.clone());
        Self {
            actions: Actions::new(resolver.clone(), gestures.clone()),
            assertions: AssertionEngine::new(resolver, gestures, Some(context.log_file.clone())),
            driver,
            context,
            emitter,
            options,
        }
    }

    /// Run `steps` in order, stopping at the first failed step
    pub async fn run(&self, state: &mut TestState, steps: &[Step]) {
        state.start();
        self.emitter.emit(TestEvent::TestStarted {
            test_id: state.test_id.clone(),
            device_id: state.device_id.clone(),
            name: state.name.clone(),
            step_count: steps.len(),
        });

        for (index, step) in steps.iter().enumerate() {
            if !state.is_running() {
                break;
            }
            let step_state = self.run_step(index, step).await;
            let failure = step_state.error().map(str::to_string);
            state.steps.push(step_state);

            if let Some(error) = failure {
                log::error!("Test {} aborted at step {}: {}", state.test_id, step.id, error);
                state.abort(&step.id, &error);
            }
        }

        state.finish();
        self.emitter.emit(TestEvent::TestFinished {
            test_id: state.test_id.clone(),
            device_id: state.device_id.clone(),
            status: state.status.clone(),
            duration_ms: state.duration.as_millis() as u64,
        });
    }

    async fn run_step(&self, index: usize, step: &Step) -> StepState {
        let mut state = StepState::new(index, step);
        let max_attempts = step.retries.unwrap_or(self.options.retry_count) + 1;
        let step_started = epoch_seconds();
        state.start();
        self.emitter.emit(TestEvent::StepStarted {
            test_id: self.context.test_id.clone(),
            device_id: self.context.device_id.clone(),
            index,
            step_id: step.id.clone(),
            name: step.name.clone(),
        });
        log::info!("▶ Step {} ({})", step.id, step.action.name());

        let mut last_error = None;
        for attempt in 1..=max_attempts {
            state.begin_attempt(attempt);
            if let Some(wait) = step.pre_wait {
                log::debug!("Waiting {:.1}s before {}", wait.as_secs_f64(), step.id);
                tokio::time::sleep(wait).await;
            }

            match self.actions.execute(&step.action).await {
                Ok(outcome) => {
                    state.swipes += outcome.swipes;
                    state.collected = outcome.collected;
                    last_error = None;
                    break;
                }
                Err(e) => {
                    log::warn!(
                        "Step {} attempt {}/{} failed: {}",
                        step.id,
                        attempt,
                        max_attempts,
                        e
                    );
                    if self.options.screenshots.on_failure {
                        self.screenshot(&mut state, true).await;
                    }
                    last_error = Some(e.to_string());
                    if e.is_configuration() {
                        break;
                    }
                    if attempt < max_attempts {
                        state.retry(attempt, max_attempts);
                        self.emitter.emit(TestEvent::StepRetrying {
                            test_id: self.context.test_id.clone(),
                            device_id: self.context.device_id.clone(),
                            index,
                            attempt: attempt + 1,
                            max_attempts,
                        });
                        tokio::time::sleep(self.options.retry_backoff).await;
                    }
                }
            }
        }

        if let Some(error) = last_error {
            state.fail(error.clone());
            self.emit_step_failed(index, &state, error);
            return state;
        }

        if step.screenshot.unwrap_or(self.options.screenshots.enabled) {
            self.screenshot(&mut state, false).await;
        }

        for assertion in &step.assertions {
            match self.assertions.evaluate(assertion, step_started).await {
                Ok(outcome) => {
                    state.swipes += outcome.swipes;
                    self.emit_assertion(&assertion.type_name, true, &outcome.message);
                    state.assertions.push(AssertionRecord {
                        assertion_type: assertion.type_name.clone(),
                        expected: assertion.expected.clone(),
                        status: match outcome.status {
                            AssertionStatus::Passed => Status::Passed,
                            AssertionStatus::Skipped => Status::Skipped,
                        },
                        message: outcome.message,
                        swipes: outcome.swipes,
                    });
                }
                Err(failure) => {
                    let message = failure.error.to_string();
                    state.swipes += failure.swipes;
                    self.emit_assertion(&assertion.type_name, false, &message);
                    state.assertions.push(AssertionRecord {
                        assertion_type: assertion.type_name.clone(),
                        expected: assertion.expected.clone(),
                        status: Status::Failed,
                        message: message.clone(),
                        swipes: failure.swipes,
                    });
                    if self.options.screenshots.on_failure {
                        self.screenshot(&mut state, true).await;
                    }
                    state.fail(message.clone());
                    self.emit_step_failed(index, &state, message);
                    return state;
                }
            }
        }

        state.succeed();
        self.emitter.emit(TestEvent::StepPassed {
            test_id: self.context.test_id.clone(),
            device_id: self.context.device_id.clone(),
            index,
            duration_ms: state.duration.as_millis() as u64,
            swipes: state.swipes,
        });
        state
    }

    async fn screenshot(&self, state: &mut StepState, failed: bool) {
        let path = self.context.screenshot_path(&state.step_id, failed);
        if let Some(saved) = capture_screenshot(self.driver.as_ref(), &path).await {
            state.screenshot = Some(saved);
        }
    }

    fn emit_assertion(&self, assertion: &str, passed: bool, message: &str) {
        self.emitter.emit(TestEvent::AssertionChecked {
            test_id: self.context.test_id.clone(),
            device_id: self.context.device_id.clone(),
            assertion: assertion.to_string(),
            passed,
            message: message.to_string(),
        });
    }

    fn emit_step_failed(&self, index: usize, state: &StepState, error: String) {
        self.emitter.emit(TestEvent::StepFailed {
            test_id: self.context.test_id.clone(),
            device_id: self.context.device_id.clone(),
            index,
            error,
            duration_ms: state.duration.as_millis() as u64,
        });
    }
}
