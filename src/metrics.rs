// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the data-access layer.
//!
//! Uses the `metrics` crate for backend-agnostic collection.
//! The host process is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `admin_bootstrap_` prefix for all metrics
//! - `_total` suffix for counters
//!
//! # Labels
//! - `dialect`: mysql, postgres, memory
//! - `step`: find_by_username, insert_account, update_password
//! - `strategy`: orm, raw
//! - `outcome`: created, updated, existing, degraded

use metrics::{counter, gauge};
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════
// CONNECTIVITY
// ═══════════════════════════════════════════════════════════════════════════

/// Record a health check result and mirror it into the availability gauge
pub fn record_health_check(dialect: &str, healthy: bool) {
    counter!(
        "admin_bootstrap_health_checks_total",
        "dialect" => dialect.to_string(),
        "status" => if healthy { "up" } else { "down" }
    )
    .increment(1);
    gauge!(
        "admin_bootstrap_backend_available",
        "dialect" => dialect.to_string()
    )
    .set(if healthy { 1.0 } else { 0.0 });
}

/// Record a failed attempt inside the retry executor
pub fn record_retry_attempt(operation: &str) {
    counter!(
        "admin_bootstrap_retry_attempts_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record that a retried operation gave up
pub fn record_retry_exhausted(operation: &str, waited: Duration) {
    counter!(
        "admin_bootstrap_retry_exhausted_total",
        "operation" => operation.to_string()
    )
    .increment(1);
    gauge!(
        "admin_bootstrap_retry_waited_seconds",
        "operation" => operation.to_string()
    )
    .set(waited.as_secs_f64());
}

/// Record a switch to the in-memory backend
pub fn record_memory_fallback(from: &str) {
    counter!(
        "admin_bootstrap_memory_fallbacks_total",
        "from" => from.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// SCHEMA / STRATEGIES
// ═══════════════════════════════════════════════════════════════════════════

/// Record a schema probe result: found, missing, assumed
pub fn record_schema_probe(dialect: &str, result: &str) {
    counter!(
        "admin_bootstrap_schema_probes_total",
        "dialect" => dialect.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
}

/// Record that the primary strategy failed and the fallback was invoked
pub fn record_strategy_fallback(step: &str, primary: &str) {
    counter!(
        "admin_bootstrap_strategy_fallbacks_total",
        "step" => step.to_string(),
        "strategy" => primary.to_string()
    )
    .increment(1);
}

/// Record that both strategies of a chain failed
pub fn record_chain_failure(step: &str) {
    counter!(
        "admin_bootstrap_chain_failures_total",
        "step" => step.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// BOOTSTRAP / DIAGNOSTICS
// ═══════════════════════════════════════════════════════════════════════════

/// Record the terminal outcome of a bootstrap run
pub fn record_bootstrap_outcome(outcome: &str) {
    counter!(
        "admin_bootstrap_runs_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a soft failure that did not stop the bootstrap run
pub fn record_soft_failure(step: &str) {
    counter!(
        "admin_bootstrap_soft_failures_total",
        "step" => step.to_string()
    )
    .increment(1);
}

/// Record a step failure that degraded the bootstrap run
pub fn record_hard_failure(step: &str) {
    counter!(
        "admin_bootstrap_hard_failures_total",
        "step" => step.to_string()
    )
    .increment(1);
}

/// Record that the diagnostic log could not be written
pub fn record_persistence_fault() {
    counter!("admin_bootstrap_diagnostic_write_failures_total").increment(1);
}
