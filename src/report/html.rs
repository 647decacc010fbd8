use super::types::{Status, StepRecord, Summary, TestRecord};
use anyhow::{Context, Result};
use std::path::Path;

/// Render `records` to an HTML file at `output`
pub fn generate(records: &[TestRecord], output: &Path) -> Result<()> {
    let html = generate_html(records, &chrono::Local::now().to_rfc3339());
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(output, html).with_context(|| format!("Failed to write {}", output.display()))?;
    log::info!("HTML report saved to: {}", output.display());
    Ok(())
}

fn status_class(status: Status) -> (&'static str, &'static str) {
    match status {
        Status::Passed => ("✓", "passed"),
        Status::Failed => ("✗", "failed"),
        Status::Skipped => ("○", "skipped"),
    }
}

fn step_html(step: &StepRecord) -> String {
    let (icon, class) = status_class(step.status);

    let screenshot_html = step
        .artifacts
        .screenshot
        .as_ref()
        .map(|path| {
            format!(
                r##"<a href="#" class="screenshot-link" onclick="showScreenshot('{}')">📸 Screenshot</a>"##,
                html_escape(path)
            )
        })
        .unwrap_or_default();

    let swipes_html = if step.swipes > 0 {
        format!("<span class=\"duration\">{} swipe(s)</span>", step.swipes)
    } else {
        String::new()
    };
    let attempts_html = if step.attempts > 1 {
        format!("<span class=\"duration\">{} attempts</span>", step.attempts)
    } else {
        String::new()
    };

    let mut assertions_html = String::new();
    for assertion in &step.assertions {
        let (a_icon, a_class) = status_class(assertion.status);
        assertions_html.push_str(&format!(
            r#"<div class="assertion {a_class}"><span>{a_icon}</span> <code>{}</code> {}</div>"#,
            html_escape(&assertion.assertion_type),
            html_escape(&assertion.message),
        ));
    }

    let collected_html = if step.collected.is_empty() {
        String::new()
    } else {
        format!(
            r#"<details class="collected"><summary>{} collected item(s)</summary><pre>{}</pre></details>"#,
            step.collected.len(),
            html_escape(&step.collected.join("\n"))
        )
    };

    let error_html = step
        .error
        .as_ref()
        .map(|e| format!(r#"<div class="error-message">{}</div>"#, html_escape(e)))
        .unwrap_or_default();

    format!(
        r#"
                <div class="step {class}">
                    <div class="step-icon">{icon}</div>
                    <div class="step-content">
                        <div class="step-name">{} <span class="action">{}</span></div>
                        <div class="step-meta">
                            <span class="duration">{}</span>
                            {attempts_html}
                            {swipes_html}
                            {screenshot_html}
                        </div>
                        {assertions_html}
                        {collected_html}
                        {error_html}
                    </div>
                </div>"#,
        html_escape(&step.step_id),
        html_escape(&step.action),
        format_duration(step.duration_sec),
    )
}

fn test_html(record: &TestRecord) -> String {
    let (_, class) = status_class(record.status);
    let steps_html: String = record.steps.iter().map(step_html).collect();

    let video_html = record
        .artifacts
        .video
        .as_ref()
        .map(|path| {
            format!(
                r#"
                <div class="video-details">
                    <details>
                        <summary>🎥 Screen recording</summary>
                        <video controls preload="metadata"><source src="{}" type="video/mp4"></video>
                    </details>
                </div>"#,
                html_escape(path)
            )
        })
        .unwrap_or_default();

    let log_html = record
        .artifacts
        .log_file
        .as_ref()
        .map(|path| format!(r#"<a class="screenshot-link" href="{0}">📄 {0}</a>"#, html_escape(path)))
        .unwrap_or_default();

    let error_html = match (&record.error, record.steps.is_empty()) {
        // Load and connection errors have no step to carry them
        (Some(error), true) => format!(r#"<div class="error-message">{}</div>"#, html_escape(error)),
        _ => String::new(),
    };

    format!(
        r#"
            <div class="test {class}">
                <div class="test-header">
                    <h3>{} <span class="test-name">{}</span> <span class="status-badge">{}</span></h3>
                    <div class="test-meta">
                        <span>{}</span>
                        <span>{}</span>
                        <span class="duration">{}</span>
                    </div>
                </div>
                <div class="steps">{steps_html}{error_html}</div>
                <div class="test-footer">{log_html}</div>
                {video_html}
            </div>"#,
        html_escape(&record.test_id),
        html_escape(&record.name),
        record.status.as_str(),
        html_escape(&record.device_id),
        html_escape(&record.driver),
        format_duration(record.duration_sec),
    )
}

fn generate_html(records: &[TestRecord], generated_at: &str) -> String {
    let summary = Summary::from_records(records);
    let pass_rate = summary.pass_rate();
    let tests_html: String = records.iter().map(test_html).collect();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Mobile Test Report</title>
    <style>
        :root {{
            --bg-primary: #0a0f1d;
            --bg-secondary: #141b2d;
            --bg-tertiary: #1f2937;
            --border: #374151;
            --text-primary: #f9fafb;
            --text-secondary: #9ca3af;
            --green: #10b981;
            --red: #ef4444;
            --yellow: #f59e0b;
            --blue: #3b82f6;
        }}
        * {{ margin: 0; padding: 0; box-sizing: border-box; }}
        body {{
            font-family: system-ui, -apple-system, sans-serif;
            background: var(--bg-primary);
            color: var(--text-primary);
            line-height: 1.5;
            padding: 3rem 1rem;
        }}
        .container {{ max-width: 1100px; margin: 0 auto; }}
        header {{ margin-bottom: 2rem; display: flex; justify-content: space-between; align-items: flex-end; }}
        h1 {{ font-size: 2rem; font-weight: 800; }}
        .summary {{
            display: grid;
            grid-template-columns: repeat(auto-fit, minmax(180px, 1fr));
            gap: 1.5rem;
            margin-bottom: 2rem;
        }}
        .stat {{ background: var(--bg-secondary); border: 1px solid var(--border); padding: 1.5rem; border-radius: 1rem; }}
        .stat-value {{ font-size: 2.25rem; font-weight: 800; }}
        .stat-label {{ color: var(--text-secondary); font-size: 0.8rem; text-transform: uppercase; letter-spacing: 0.05em; }}
        .stat.passed .stat-value {{ color: var(--green); }}
        .stat.failed .stat-value {{ color: var(--red); }}
        .progress-bar {{ background: var(--bg-secondary); height: 12px; border-radius: 6px; overflow: hidden; border: 1px solid var(--border); margin-bottom: 3rem; }}
        .progress-fill {{ height: 100%; background: linear-gradient(90deg, var(--green), #34d399); }}
        .test {{ background: var(--bg-secondary); border: 1px solid var(--border); border-radius: 1.25rem; margin-bottom: 2rem; overflow: hidden; }}
        .test-header {{ padding: 1.25rem 1.5rem; display: flex; justify-content: space-between; align-items: center; border-bottom: 1px solid var(--border); }}
        .test-header h3 {{ font-size: 1.15rem; display: flex; gap: 0.75rem; align-items: center; }}
        .test-name {{ color: var(--text-secondary); font-weight: 500; }}
        .test-meta {{ display: flex; gap: 1rem; color: var(--text-secondary); font-size: 0.8rem; }}
        .status-badge {{ padding: 0.2rem 0.7rem; border-radius: 9999px; font-size: 0.7rem; text-transform: uppercase; }}
        .test.passed .status-badge {{ background: rgba(16, 185, 129, 0.1); color: var(--green); }}
        .test.failed .status-badge {{ background: rgba(239, 68, 68, 0.1); color: var(--red); }}
        .steps {{ padding: 1rem 1.5rem; }}
        .step {{ padding: 0.9rem; border-radius: 0.75rem; display: flex; gap: 1rem; margin-bottom: 0.5rem; }}
        .step:hover {{ background: var(--bg-tertiary); }}
        .step-icon {{ width: 2rem; height: 2rem; display: flex; align-items: center; justify-content: center; border-radius: 0.5rem; flex-shrink: 0; }}
        .step.passed .step-icon {{ background: rgba(16, 185, 129, 0.1); color: var(--green); }}
        .step.failed .step-icon {{ background: rgba(239, 68, 68, 0.1); color: var(--red); }}
        .step-content {{ flex: 1; }}
        .step-name {{ font-family: monospace; font-size: 0.95rem; }}
        .action {{ color: var(--text-secondary); margin-left: 0.5rem; }}
        .step-meta {{ display: flex; gap: 1rem; margin-top: 0.25rem; }}
        .duration {{ color: var(--text-secondary); font-size: 0.75rem; }}
        .assertion {{ font-size: 0.8rem; margin-top: 0.35rem; }}
        .assertion.passed span {{ color: var(--green); }}
        .assertion.failed span {{ color: var(--red); }}
        .assertion.skipped span {{ color: var(--yellow); }}
        .collected {{ margin-top: 0.5rem; font-size: 0.8rem; color: var(--text-secondary); }}
        .screenshot-link {{ color: var(--blue); font-size: 0.75rem; text-decoration: none; }}
        .error-message {{
            background: rgba(239, 68, 68, 0.1);
            border-radius: 0.5rem;
            padding: 0.75rem;
            margin-top: 0.75rem;
            color: #fca5a5;
            font-size: 0.8rem;
            font-family: monospace;
            border: 1px solid rgba(239, 68, 68, 0.2);
        }}
        .test-footer {{ padding: 0 1.5rem 1rem; }}
        .video-details {{ margin: 0 1.5rem 1rem; }}
        .video-details video {{ margin-top: 1rem; width: 100%; max-width: 800px; background: #000; }}
        .meta {{ margin-top: 3rem; color: var(--text-secondary); font-size: 0.85rem; text-align: center; }}
        #modal {{ display: none; position: fixed; inset: 0; background: rgba(0, 0, 0, 0.9); padding: 2rem; align-items: center; justify-content: center; }}
        #modal img {{ max-width: 100%; max-height: 100%; }}
        #modal.active {{ display: flex; }}
    </style>
</head>
<body>
    <div class="container">
        <header>
            <h1>Mobile Test Report</h1>
            <div style="text-align: right;">
                <div style="font-size: 0.85rem; color: var(--text-secondary);">Total Duration</div>
                <div style="font-size: 1.25rem; font-weight: 700;">{}</div>
            </div>
        </header>

        <div class="summary">
            <div class="stat"><div class="stat-value">{}</div><div class="stat-label">Tests</div></div>
            <div class="stat"><div class="stat-value">{}</div><div class="stat-label">Devices</div></div>
            <div class="stat passed"><div class="stat-value">{}</div><div class="stat-label">Passed</div></div>
            <div class="stat failed"><div class="stat-value">{}</div><div class="stat-label">Failed</div></div>
        </div>

        <div style="display: flex; justify-content: space-between; margin-bottom: 0.75rem;">
            <span>Success Rate</span><span style="color: var(--green);">{pass_rate}%</span>
        </div>
        <div class="progress-bar"><div class="progress-fill" style="width: {pass_rate}%"></div></div>

        {tests_html}

        <div class="meta">Generated: {}</div>
    </div>

    <div id="modal" onclick="this.classList.remove('active')"><img id="modal-img" src="" alt="Screenshot"></div>

    <script>
        function showScreenshot(path) {{
            document.getElementById('modal-img').src = path;
            document.getElementById('modal').classList.add('active');
            event.preventDefault();
        }}
    </script>
</body>
</html>"#,
        format_duration(summary.duration_sec),
        summary.total,
        summary.devices,
        summary.passed,
        summary.failed,
        html_escape(generated_at),
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn format_duration(secs: f64) -> String {
    let ms = (secs * 1000.0).round() as u64;
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let minutes = ms / 60000;
        let seconds = (ms % 60000) as f64 / 1000.0;
        format!("{}m {:.0}s", minutes, seconds)
    }
}
