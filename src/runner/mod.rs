pub mod actions;
pub mod artifacts;
pub mod assertions;
pub mod context;
pub mod events;
pub mod executor;
pub mod gestures;
pub mod resolver;
pub mod state;

use crate::driver::{self, DeviceTarget};
use crate::parser::yaml::Suite;
use crate::report::{self, store, types::Summary, types::TestRecord};
use crate::utils::config::FrameworkConfig;
use anyhow::Result;
use artifacts::{LogCapture, ScreenRecording};
use colored::Colorize;
use context::TestContext;
use executor::{ExecutorOptions, TestExecutor};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;

pub use events::*;
pub use state::*;

/// What to run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Suite directory holding `locators/`, `steps/` and `test_cases/`
    pub suite: PathBuf,
    /// A test id, a comma separated list of ids, or `all`
    pub test_case: String,
    /// Tag a test must carry to run; untagged tests run everywhere
    pub env: String,
}

/// Test ids selected by `selector` whose tags match `env`. Tests that fail to
/// load are kept so the load error ends up in the results.
fn select_tests(suite: &Suite, selector: &str, env: &str) -> Result<Vec<String>> {
    let ids = if selector.eq_ignore_ascii_case("all") {
        suite.test_ids()?
    } else {
        selector
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    };

    Ok(ids
        .into_iter()
        .filter(|id| match suite.load_test(id) {
            Ok(test) if !test.matches_env(env) => {
                log::debug!("Skipping {}: not tagged '{}'", id, env);
                false
            }
            _ => true,
        })
        .collect())
}

/// Run the selected tests on every eligible device. Returns `true` when every
/// test passed.
pub async fn run_tests(config: FrameworkConfig, options: RunOptions) -> Result<bool> {
    let devices = driver::eligible_devices(&config).await?;
    if devices.is_empty() {
        anyhow::bail!("No eligible connected devices found.");
    }

    let suite = Suite::load(&options.suite)?;
    let tests = select_tests(&suite, &options.test_case, &options.env)?;
    if tests.is_empty() {
        println!(
            "{} No test cases match '{}' for env '{}'",
            "ℹ".blue(),
            options.test_case,
            options.env
        );
        return Ok(true);
    }

    let (emitter, receiver) = EventEmitter::new();
    let listener = tokio::spawn(ConsoleEventListener::listen(receiver));
    emitter.emit(TestEvent::SessionStarted {
        session_id: uuid::Uuid::new_v4().to_string(),
        tests: tests.len(),
        devices: devices.len(),
    });

    // One worker per device; a device never runs two tests at once
    let permits = if config.core.parallel_execution {
        config.core.max_workers.clamp(1, devices.len())
    } else {
        1
    };
    log::info!(
        "Running {} test(s) on {} device(s), {} at a time",
        tests.len(),
        devices.len(),
        permits
    );

    let semaphore = Arc::new(Semaphore::new(permits));
    let config = Arc::new(config);
    let suite = Arc::new(suite);
    let tests = Arc::new(tests);

    let mut handles = Vec::with_capacity(devices.len());
    for target in devices {
        let semaphore = semaphore.clone();
        let config = config.clone();
        let suite = suite.clone();
        let tests = tests.clone();
        let emitter = emitter.clone();

        handles.push(tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return Vec::new(),
            };
            let mut records = Vec::with_capacity(tests.len());
            for test_id in tests.iter() {
                records.push(run_test(&suite, &config, &target, test_id, &emitter).await);
            }
            records
        }));
    }

    let mut records: Vec<TestRecord> = Vec::new();
    for joined in futures::future::join_all(handles).await {
        match joined {
            Ok(worker_records) => records.extend(worker_records),
            Err(e) => log::error!("Device worker crashed: {}", e),
        }
    }

    let results_dir = config.results_dir();
    match store::aggregate(&results_dir) {
        Ok(all) => {
            if let Err(e) = report::html::generate(&all, &results_dir.join("report.html")) {
                log::warn!("Could not render HTML report: {:#}", e);
            }
        }
        Err(e) => log::error!("Could not aggregate results: {:#}", e),
    }

    let summary = Summary::from_records(&records);
    let all_passed = summary.failed == 0;
    emitter.emit(TestEvent::SessionFinished { summary });
    let _ = listener.await;

    Ok(all_passed)
}

/// Close a test that never reached its first step
fn fail_before_start(mut state: TestState, error: String, emitter: &EventEmitter) -> TestState {
    log::error!("{} on {}: {}", state.test_id, state.device_id, error);
    state.fail(error);
    emitter.emit(TestEvent::TestFinished {
        test_id: state.test_id.clone(),
        device_id: state.device_id.clone(),
        status: state.status.clone(),
        duration_ms: 0,
    });
    state
}

/// Run one test case on one device and persist its result shard
async fn run_test(
    suite: &Suite,
    config: &FrameworkConfig,
    target: &DeviceTarget,
    test_id: &str,
    emitter: &EventEmitter,
) -> TestRecord {
    let state = TestState::new(test_id, &target.id, &target.backend.to_string());
    let state = execute_test(suite, config, target, state, emitter).await;

    let record = state.to_record();
    if let Err(e) = store::write_shard(&config.results_dir(), &record) {
        log::error!("Could not write result for {} on {}: {:#}", test_id, target.id, e);
    }
    record
}

async fn execute_test(
    suite: &Suite,
    config: &FrameworkConfig,
    target: &DeviceTarget,
    mut state: TestState,
    emitter: &EventEmitter,
) -> TestState {
    let test_id = state.test_id.clone();

    let context = match TestContext::new(&config.core.artifacts_root, &test_id, &target.id) {
        Ok(context) => context,
        Err(e) => return fail_before_start(state, format!("{:#}", e), emitter),
    };
    state.artifacts = context.artifacts();

    let test_case = match suite.load_test(&test_id) {
        Ok(test_case) => test_case,
        Err(e) => return fail_before_start(state, e.to_string(), emitter),
    };
    state.describe(&test_case);
    let steps = match suite.compile(&test_case) {
        Ok(steps) => steps,
        Err(e) => return fail_before_start(state, e.to_string(), emitter),
    };

    let device = match target.connect().await {
        Ok(device) => device,
        Err(e) => {
            let error = format!("Failed to connect to {}: {:#}", target.id, e);
            return fail_before_start(state, error, emitter);
        }
    };

    let device_logs = &config.artifacts.device_logs;
    let log_capture = if device_logs.enabled {
        match LogCapture::start(&target.id, device_logs, &context.log_file).await {
            Ok(capture) => Some(capture),
            Err(e) => {
                log::warn!("Device log capture unavailable: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    let videos = &config.artifacts.videos;
    let recording = if videos.enabled {
        match ScreenRecording::start(&target.id, &context.video_path()) {
            Ok(recording) => Some(recording),
            Err(e) => {
                log::warn!("Screen recording unavailable: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    let executor = TestExecutor::new(
        device.clone(),
        suite.locators.clone(),
        context.clone(),
        emitter.clone(),
        ExecutorOptions::from_config(config),
    );
    executor.run(&mut state, &steps).await;

    if let Some(capture) = log_capture {
        let path = capture.stop().await;
        log::debug!("Device log saved: {}", path.display());
    }

    let mut video = None;
    if let Some(recording) = recording {
        let keep = if state.passed() {
            videos.save_on_pass
        } else {
            videos.save_on_failure
        };
        match recording.stop(keep).await {
            Ok(saved) => video = saved.map(|p| p.display().to_string()),
            Err(e) => log::warn!("Could not save screen recording: {:#}", e),
        }
    }

    if let Err(e) = device.close().await {
        log::debug!("Closing session on {} failed: {:#}", target.id, e);
    }

    state.artifacts = context.artifacts();
    state.artifacts.video = video;
    state
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suite_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for sub in ["locators", "steps", "test_cases"] {
            std::fs::create_dir_all(root.join(sub)).unwrap();
        }
        std::fs::write(
            root.join("locators/app_locators.yaml"),
            "login_button:\n  primary: { type: id, value: login }\n",
        )
        .unwrap();
        std::fs::write(
            root.join("steps/base_steps.yaml"),
            "LOGIN:\n  action: click\n  parameters: { locator_id: login_button }\n",
        )
        .unwrap();
        let cases = [
            ("TC001", "test_metadata: { tags: [stage] }\ntest_steps: [ { step_id: LOGIN } ]\n"),
            ("TC002", "test_metadata: { tags: [prod] }\ntest_steps: [ { step_id: LOGIN } ]\n"),
            ("TC003", "test_steps: [ { step_id: LOGIN } ]\n"),
            ("TC004", "test_steps: [oops\n"),
        ];
        for (id, body) in cases {
            std::fs::write(root.join(format!("test_cases/{}.yaml", id)), body).unwrap();
        }
        dir
    }

    #[test]
    fn test_select_tests_by_env() {
        let dir = suite_dir();
        let suite = Suite::load(dir.path()).unwrap();

        assert_eq!(
            select_tests(&suite, "all", "stage").unwrap(),
            vec!["TC001", "TC003", "TC004"]
        );
        assert_eq!(
            select_tests(&suite, "all", "PROD").unwrap(),
            vec!["TC002", "TC003", "TC004"]
        );
        assert_eq!(
            select_tests(&suite, "TC001, TC002", "stage").unwrap(),
            vec!["TC001"]
        );
    }

    #[tokio::test]
    async fn test_load_error_is_recorded_as_failed() {
        let dir = suite_dir();
        let suite = Suite::load(dir.path()).unwrap();
        let mut config = FrameworkConfig::default();
        config.core.artifacts_root = dir.path().join("artifacts");

        let record = run_test(
            &suite,
            &config,
            &DeviceTarget::uiautomator2("emulator-5554"),
            "TC004",
            &EventEmitter::default(),
        )
        .await;

        assert_eq!(record.status, report::types::Status::Failed);
        assert!(record.steps.is_empty());
        assert!(record.error.unwrap().contains("TC004.yaml"));

        let shards = store::aggregate(&config.results_dir()).unwrap();
        assert_eq!(shards.len(), 1);
    }
}
