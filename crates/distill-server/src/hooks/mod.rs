// crates/distill-server/src/hooks/mod.rs
// Claude Code hook handlers
//
// Each handler reads one JSON object from stdin and prints one JSON
// object to stdout. Errors are swallowed: a broken hook must degrade to
// `{}` with exit 0, never take the host down.

pub mod post_tool;
pub mod session_start;
pub mod stop;
pub mod user_prompt;

use anyhow::Result;
use std::time::Instant;

use crate::config::{DistillConfig, paths};

/// Read hook input from stdin (the host passes JSON)
pub fn read_hook_input() -> Result<serde_json::Value> {
    let mut input = String::new();
    std::io::Read::read_to_string(&mut std::io::stdin(), &mut input)?;
    let json: serde_json::Value = serde_json::from_str(&input)?;
    Ok(json)
}

/// Write hook output to stdout
pub fn write_hook_output(output: &serde_json::Value) {
    println!("{}", serde_json::to_string(output).unwrap_or_default());
}

/// The universal fail-safe response.
pub fn write_empty_output() {
    write_hook_output(&serde_json::json!({}));
}

/// Extract a string field from hook input, empty when absent.
pub fn input_str(input: &serde_json::Value, key: &str) -> String {
    input
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

/// Check the enable gate: project-local markers override the global flag.
pub fn distill_enabled(input: &serde_json::Value, config: &DistillConfig) -> bool {
    let cwd = input.get("cwd").and_then(|v| v.as_str());
    paths::project_enabled(cwd, config.enabled)
}

/// Run a hook body, converting any error into the `{}` fail-safe.
/// Hooks have host-imposed timeouts; the contract is stderr + `{}` + exit 0.
pub async fn run_guarded<F>(name: &str, body: F)
where
    F: std::future::Future<Output = Result<()>>,
{
    if let Err(e) = body.await {
        eprintln!("[distill] {name} hook error: {e:#}");
        write_empty_output();
    }
}

/// Logs elapsed hook time on drop; the hook path has a latency budget
/// and regressions should be visible in stderr traces.
pub struct HookTimer {
    name: &'static str,
    start: Instant,
}

impl HookTimer {
    pub fn start(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
        }
    }
}

impl Drop for HookTimer {
    fn drop(&mut self) {
        tracing::debug!(
            hook = self.name,
            elapsed_ms = self.start.elapsed().as_millis() as u64,
            "hook finished"
        );
    }
}
