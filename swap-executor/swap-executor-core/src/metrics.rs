//! Metric recording helpers
//!
//! Counters go through the `metrics` facade and are dropped until a recorder
//! is installed. The process embedding the executor installs one (a StatsD or
//! Prometheus exporter) before starting plans; the dry-run planner runs no
//! steps and installs none.

use swap_executor_api::steps::StepType;

// -------------
// | Constants |
// -------------

/// The name of the metric counting steps that started running
const STEPS_STARTED_METRIC_NAME: &str = "swap_steps_started";
/// The name of the metric counting steps that completed
const STEPS_SUCCEEDED_METRIC_NAME: &str = "swap_steps_succeeded";
/// The name of the metric counting steps that failed
const STEPS_FAILED_METRIC_NAME: &str = "swap_steps_failed";
/// The name of the metric counting fallbacks to manual confirmation
const FALLBACKS_METRIC_NAME: &str = "swap_fallbacks_triggered";
/// The name of the metric counting fee estimations
const GAS_ESTIMATIONS_METRIC_NAME: &str = "swap_gas_estimations";
/// The name of the metric counting history records
const HISTORY_RECORDS_METRIC_NAME: &str = "swap_history_records";

/// The tag for the step type
const STEP_TYPE_TAG: &str = "step_type";
/// The tag for the estimation mode
const MODE_TAG: &str = "mode";
/// The tag for the network
const NETWORK_TAG: &str = "network";

/// Build the tags for a step metric
fn step_tags(step_type: StepType) -> Vec<(String, String)> {
    vec![(STEP_TYPE_TAG.to_string(), step_type.as_str().to_string())]
}

/// Increment the metric counting started steps
pub fn record_step_started(step_type: StepType) {
    metrics::counter!(STEPS_STARTED_METRIC_NAME, &step_tags(step_type)).increment(1);
}

/// Increment the metric counting completed steps
pub fn record_step_succeeded(step_type: StepType) {
    metrics::counter!(STEPS_SUCCEEDED_METRIC_NAME, &step_tags(step_type)).increment(1);
}

/// Increment the metric counting failed steps
pub fn record_step_failed(step_type: StepType) {
    metrics::counter!(STEPS_FAILED_METRIC_NAME, &step_tags(step_type)).increment(1);
}

/// Increment the metric counting fallbacks
pub fn record_fallback(network_id: &str) {
    let tags = vec![(NETWORK_TAG.to_string(), network_id.to_string())];
    metrics::counter!(FALLBACKS_METRIC_NAME, &tags).increment(1);
}

/// Increment the metric counting fee estimations made in the given mode
pub fn record_gas_estimation(mode: &str) {
    let tags = vec![(MODE_TAG.to_string(), mode.to_string())];
    metrics::counter!(GAS_ESTIMATIONS_METRIC_NAME, &tags).increment(1);
}

/// Increment the metric counting history records
pub fn record_history() {
    metrics::counter!(HISTORY_RECORDS_METRIC_NAME).increment(1);
}
