//! Scenario runner that drives the coordinator against scripted application behavior

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use campaign_common::{InMemoryBus, InMemoryDom};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::config::SyncConfig;
use crate::coordinator::{SatisfiedBy, WaitResult};
use crate::error::{E2eError, E2eResult, TimeoutDiagnostics};
use crate::scenario::{Expectation, ScenarioSpec, Stimulus, TriggerMode};
use crate::session::SyncSession;

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub satisfied_by: Option<SatisfiedBy>,
    pub elapsed_ms: Option<u64>,
    pub error: Option<String>,
    pub diagnostics: Option<TimeoutDiagnostics>,
}

impl ScenarioResult {
    /// Turn a failed result into [`E2eError::ScenarioFailed`]
    pub fn ensure_passed(&self) -> E2eResult<()> {
        if self.success {
            return Ok(());
        }
        Err(E2eError::ScenarioFailed {
            name: self.name.clone(),
            reason: self.error.clone().unwrap_or_else(|| "unknown error".to_string()),
        })
    }
}

/// Result of running all scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

/// Configuration for the scenario runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub sync: SyncConfig,
    pub scenarios_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            scenarios_dir: PathBuf::from("tests/scenarios"),
            output_dir: PathBuf::from("test-results"),
        }
    }
}

/// Runs scenarios, each against a fresh bus and page
pub struct ScenarioRunner {
    config: RunnerConfig,
}

impl ScenarioRunner {
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    pub fn with_config(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Run every scenario in the scenarios directory
    pub async fn run_all(&self) -> E2eResult<SuiteResult> {
        let specs = ScenarioSpec::load_all(&self.config.scenarios_dir)?;
        Ok(self.run_specs(&specs).await)
    }

    /// Run scenarios carrying `tag`
    pub async fn run_tagged(&self, tag: &str) -> E2eResult<SuiteResult> {
        let specs = ScenarioSpec::load_all(&self.config.scenarios_dir)?;
        let filtered: Vec<ScenarioSpec> = ScenarioSpec::filter_by_tag(&specs, tag)
            .into_iter()
            .cloned()
            .collect();
        Ok(self.run_specs(&filtered).await)
    }

    /// Run a single scenario by name
    pub async fn run_named(&self, name: &str) -> E2eResult<ScenarioResult> {
        let specs = ScenarioSpec::load_all(&self.config.scenarios_dir)?;
        let spec = specs
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::ScenarioParse(format!("Scenario not found: {}", name)))?;
        Ok(self.run_scenario(&spec).await)
    }

    pub async fn run_specs(&self, specs: &[ScenarioSpec]) -> SuiteResult {
        let start = Instant::now();
        let mut results = Vec::new();
        let mut passed = 0;
        let mut failed = 0;

        info!("Running {} scenario(s)...", specs.len());

        for spec in specs {
            let result = self.run_scenario(spec).await;
            if result.success {
                passed += 1;
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                failed += 1;
                error!("✗ {} - {}", result.name, result.error.as_deref().unwrap_or("unknown error"));
            }
            results.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!("Scenario results: {} passed, {} failed ({} ms)", passed, failed, duration_ms);

        SuiteResult {
            total: specs.len(),
            passed,
            failed,
            skipped: 0,
            duration_ms,
            results,
        }
    }

    /// Run one scenario; failures are reported in the result, not as `Err`
    pub async fn run_scenario(&self, spec: &ScenarioSpec) -> ScenarioResult {
        let start = Instant::now();
        debug!("Running scenario: {}", spec.name);

        let bus = InMemoryBus::new();
        let dom = InMemoryDom::with_elements(spec.initial_dom.iter().cloned());
        for notification in &spec.history {
            bus.publish(notification.clone());
        }

        let session = SyncSession::new(Arc::new(bus.clone()), Arc::new(dom.clone()), &self.config.sync);

        let wait_started = Instant::now();
        let outcome = match spec.wait.to_wait_spec(session.catalog()) {
            Ok(wait) => match spec.trigger {
                TriggerMode::Await => {
                    let handles = schedule(&spec.stimuli, &bus, &dom);
                    let outcome = session.coordinator().await_transition(wait).await;
                    abort_all(handles);
                    outcome
                }
                TriggerMode::Pending => {
                    let mut handles = Vec::new();
                    let outcome = session
                        .coordinator()
                        .with_pending_transition(wait, || {
                            handles = schedule(&spec.stimuli, &bus, &dom);
                            async { Ok(()) }
                        })
                        .await;
                    abort_all(handles);
                    outcome
                }
            },
            Err(e) => Err(e),
        };

        let waited_ms = wait_started.elapsed().as_millis() as u64;
        let verdict = evaluate(&spec.expect, &outcome, waited_ms);
        let duration_ms = start.elapsed().as_millis() as u64;

        let (satisfied_by, elapsed_ms, diagnostics) = match &outcome {
            Ok(result) => (Some(result.channel), Some(result.elapsed_ms()), None),
            Err(e) => (None, Some(waited_ms), e.diagnostics().cloned()),
        };

        ScenarioResult {
            name: spec.name.clone(),
            success: verdict.is_ok(),
            duration_ms,
            satisfied_by,
            elapsed_ms,
            error: verdict.err(),
            diagnostics,
        }
    }

    /// Write results to JSON
    pub fn write_results(&self, results: &SuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("scenario-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

impl Default for ScenarioRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn schedule(stimuli: &[Stimulus], bus: &InMemoryBus, dom: &InMemoryDom) -> Vec<JoinHandle<()>> {
    stimuli
        .iter()
        .cloned()
        .map(|stimulus| {
            let bus = bus.clone();
            let dom = dom.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(stimulus.at_ms)).await;
                stimulus.action.apply(&bus, &dom);
            })
        })
        .collect()
}

fn abort_all(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        handle.abort();
    }
}

fn check_elapsed(elapsed_ms: u64, min: Option<u64>, max: Option<u64>) -> Result<(), String> {
    if let Some(min) = min {
        if elapsed_ms < min {
            return Err(format!("elapsed {} ms is below the expected minimum {} ms", elapsed_ms, min));
        }
    }
    if let Some(max) = max {
        if elapsed_ms > max {
            return Err(format!("elapsed {} ms exceeds the expected maximum {} ms", elapsed_ms, max));
        }
    }
    Ok(())
}

/// Judge an outcome; `waited_ms` is the wall time the wait actually took
fn evaluate(expect: &Expectation, outcome: &E2eResult<WaitResult>, waited_ms: u64) -> Result<(), String> {
    match (expect, outcome) {
        (
            Expectation::Satisfied {
                channel,
                min_elapsed_ms,
                max_elapsed_ms,
            },
            Ok(result),
        ) => {
            if let Some(expected) = channel {
                if *expected != result.channel {
                    return Err(format!("satisfied by {} but expected {}", result.channel, expected));
                }
            }
            check_elapsed(result.elapsed_ms(), *min_elapsed_ms, *max_elapsed_ms)
        }
        (Expectation::Satisfied { .. }, Err(e)) => Err(format!("expected success, got: {}", e)),
        (
            Expectation::Timeout {
                min_elapsed_ms,
                max_elapsed_ms,
                names,
            },
            Err(e @ E2eError::Timeout(_)),
        ) => {
            let message = e.to_string();
            if let Some(needle) = names {
                if !message.contains(needle.as_str()) {
                    return Err(format!("timeout error does not name {:?}: {}", needle, message));
                }
            }
            check_elapsed(waited_ms, *min_elapsed_ms, *max_elapsed_ms)
        }
        (Expectation::Timeout { .. }, Err(e)) => Err(format!("expected a timeout, got: {}", e)),
        (Expectation::Timeout { .. }, Ok(result)) => Err(format!(
            "expected a timeout, but the wait was satisfied by {} after {} ms",
            result.channel,
            result.elapsed_ms()
        )),
    }
}
