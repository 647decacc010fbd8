use super::state::TestStatus;
use crate::report::types::Summary;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::time::Duration as StdDuration;
use tokio::sync::broadcast;

/// Test execution events for real-time updates
#[derive(Debug, Clone)]
pub enum TestEvent {
    // Session events
    SessionStarted {
        session_id: String,
        tests: usize,
        devices: usize,
    },
    SessionFinished {
        summary: Summary,
    },

    // Test events
    TestStarted {
        test_id: String,
        device_id: String,
        name: String,
        step_count: usize,
    },
    TestFinished {
        test_id: String,
        device_id: String,
        status: TestStatus,
        duration_ms: u64,
    },

    // Step events
    StepStarted {
        test_id: String,
        device_id: String,
        index: usize,
        step_id: String,
        name: String,
    },
    StepPassed {
        test_id: String,
        device_id: String,
        index: usize,
        duration_ms: u64,
        swipes: u32,
    },
    StepFailed {
        test_id: String,
        device_id: String,
        index: usize,
        error: String,
        duration_ms: u64,
    },
    StepRetrying {
        test_id: String,
        device_id: String,
        index: usize,
        attempt: u32,
        max_attempts: u32,
    },
    AssertionChecked {
        test_id: String,
        device_id: String,
        assertion: String,
        passed: bool,
        message: String,
    },

    // Log event for coordinated output
    Log {
        message: String,
    },
}

/// Event emitter for broadcasting test events
#[derive(Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<TestEvent>,
}

impl EventEmitter {
    pub fn new() -> (Self, broadcast::Receiver<TestEvent>) {
        let (sender, receiver) = broadcast::channel(256);
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: TestEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TestEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }
}

fn worker_key(test_id: &str, device_id: &str) -> String {
    format!("{}@{}", test_id, device_id)
}

/// Console event listener for printing real-time updates
pub struct ConsoleEventListener;

impl ConsoleEventListener {
    pub async fn listen(mut receiver: broadcast::Receiver<TestEvent>) {
        use colored::Colorize;
        use indicatif::ProgressDrawTarget;
        use std::io::IsTerminal;

        // Hidden target when piped, to keep escape codes out of logs
        let multi = if std::io::stdout().is_terminal() {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };

        // One spinner per running (test, device) pair
        let mut spinners: HashMap<String, ProgressBar> = HashMap::new();
        let mut step_texts: HashMap<String, String> = HashMap::new();

        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::debug!("Console listener skipped {} events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match event {
                TestEvent::SessionStarted {
                    session_id,
                    tests,
                    devices,
                } => {
                    multi
                        .println(format!(
                            "\n{} Session {}: {} test(s) on {} device(s)",
                            "▶".green().bold(),
                            session_id.cyan(),
                            tests,
                            devices
                        ))
                        .ok();
                }

                TestEvent::SessionFinished { summary } => {
                    for (_, pb) in spinners.drain() {
                        pb.finish();
                    }
                    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

                    println!("\n{} Session finished", "■".blue().bold());
                    println!("  Tests: {} on {} device(s)", summary.total, summary.devices);
                    println!(
                        "  {} passed, {} failed ({}%)",
                        summary.passed.to_string().green(),
                        summary.failed.to_string().red(),
                        summary.pass_rate()
                    );
                    println!("  Duration: {:.1}s", summary.duration_sec);
                    break;
                }

                TestEvent::TestStarted {
                    test_id,
                    device_id,
                    name,
                    step_count,
                } => {
                    multi
                        .println(format!(
                            "\n  {} {} {} on {} ({} steps)",
                            "→".blue(),
                            test_id.white().bold(),
                            name.dimmed(),
                            device_id.cyan(),
                            step_count
                        ))
                        .ok();
                }

                TestEvent::TestFinished {
                    test_id,
                    device_id,
                    status,
                    duration_ms,
                } => {
                    if let Some(pb) = spinners.remove(&worker_key(&test_id, &device_id)) {
                        pb.finish();
                    }
                    let status_str = match &status {
                        TestStatus::Passed => "PASSED".green().bold(),
                        TestStatus::Aborted { step_id, .. } => {
                            format!("FAILED at {}", step_id).red().bold()
                        }
                        TestStatus::Failed { .. } => "FAILED".red().bold(),
                        _ => "UNKNOWN".white().bold(),
                    };
                    multi
                        .println(format!(
                            "  {} {} on {} [{}] {}ms",
                            "←".blue(),
                            test_id,
                            device_id,
                            status_str,
                            duration_ms
                        ))
                        .ok();
                    if let TestStatus::Failed { error } = &status {
                        multi.println(format!("      {}", error.red())).ok();
                    }
                }

                TestEvent::StepStarted {
                    test_id,
                    device_id,
                    index,
                    step_id,
                    name,
                } => {
                    let key = worker_key(&test_id, &device_id);
                    let pb = multi.add(ProgressBar::new_spinner());
                    if let Ok(style) = ProgressStyle::default_spinner()
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                        .template("    {spinner} {msg}")
                    {
                        pb.set_style(style);
                    }
                    let body = format!("[{}] {} {}... ", index + 1, step_id, name.dimmed());
                    pb.set_message(body.clone());
                    pb.enable_steady_tick(StdDuration::from_millis(100));

                    if let Some(previous) = spinners.insert(key.clone(), pb) {
                        previous.finish_and_clear();
                    }
                    step_texts.insert(key, body);
                }

                TestEvent::StepPassed {
                    test_id,
                    device_id,
                    duration_ms,
                    swipes,
                    ..
                } => {
                    let key = worker_key(&test_id, &device_id);
                    let text = step_texts.remove(&key).unwrap_or_default();
                    let swipe_note = if swipes > 0 {
                        format!(", {} swipe(s)", swipes)
                    } else {
                        String::new()
                    };
                    let done_msg = format!("    {} {}({}ms{})", "✓".green(), text, duration_ms, swipe_note);
                    if let Some(pb) = spinners.remove(&key) {
                        pb.finish_and_clear();
                    }
                    multi.println(done_msg).ok();
                }

                TestEvent::StepFailed {
                    test_id,
                    device_id,
                    error,
                    duration_ms,
                    ..
                } => {
                    let key = worker_key(&test_id, &device_id);
                    let text = step_texts.remove(&key).unwrap_or_default();
                    if let Some(pb) = spinners.remove(&key) {
                        pb.finish_and_clear();
                    }
                    multi
                        .println(format!("    {} {}({}ms)", "✗".red(), text, duration_ms))
                        .ok();
                    multi.println(format!("        {}", error.red())).ok();
                }

                TestEvent::StepRetrying {
                    test_id,
                    device_id,
                    attempt,
                    max_attempts,
                    ..
                } => {
                    let key = worker_key(&test_id, &device_id);
                    if let (Some(pb), Some(text)) = (spinners.get(&key), step_texts.get(&key)) {
                        pb.set_message(format!(
                            "{} {}",
                            text,
                            format!("↻ retry {}/{}", attempt, max_attempts).yellow()
                        ));
                    }
                }

                TestEvent::AssertionChecked {
                    assertion,
                    passed,
                    message,
                    ..
                } => {
                    let icon = if passed { "✓".green() } else { "✗".red() };
                    multi
                        .println(format!("        {} {}: {}", icon, assertion.dimmed(), message))
                        .ok();
                }

                TestEvent::Log { message } => {
                    multi.println(format!("      {}", message)).ok();
                }
            }
        }
    }
}
