// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Admin bootstrap example.
//!
//! Demonstrates:
//! 1. Resolving the backend from env vars / `.env` / `host.config.json`
//! 2. Connecting, with in-memory fallback when the server is down
//! 3. Listing the tables the probe can see
//! 4. Running the bootstrap and printing the JSON report
//! 5. Displaying the captured metrics
//!
//! # Run
//!
//! ```bash
//! # In-memory backend, no server needed
//! DB_TYPE=memory cargo run --example ensure_admin
//!
//! # Against a local MySQL
//! DB_TYPE=mysql DB_USER=root DB_PASSWORD=secret cargo run --example ensure_admin
//! ```
//!
//! Logging honours `RUST_LOG` (default `info`).

use admin_bootstrap::{BackendConfig, BootstrapService, ConnectionManager, DiagnosticSink, SchemaProbe};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Resolve configuration and connect
    // ─────────────────────────────────────────────────────────────────────────
    let config = BackendConfig::from_env("host.config.json")?;
    println!("📦 Backend: {:?}", config);

    let manager = Arc::new(ConnectionManager::connect_with_fallback(config).await?);
    println!("   └─ Active dialect: {} (available: {})", manager.dialect(), manager.is_available());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Inspect the schema
    // ─────────────────────────────────────────────────────────────────────────
    let sink = Arc::new(DiagnosticSink::in_dir("."));
    let probe = SchemaProbe::new(sink.clone());
    match probe.list_tables(&manager).await {
        Ok(tables) => println!("\n🗂  Tables: {}", tables.join(", ")),
        Err(e) => println!("\n🗂  Could not list tables: {}", e),
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Ensure the admin account
    // ─────────────────────────────────────────────────────────────────────────
    let service = BootstrapService::new(manager.clone(), sink.clone());
    println!("\n🔌 Connection check: {}", service.check_database_connection().await);

    let report = service.run().await;
    println!("\n👤 Bootstrap outcome: {}", report.outcome.label());
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.outcome.is_degraded() {
        println!("   └─ Details in {}", sink.path().display());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Metrics:");
    dump_metrics(&snapshotter);

    manager.close().await;
    Ok(())
}

fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines: Vec<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, value)| {
            let (_, key) = composite_key.into_parts();
            let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
            let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };
            let rendered = match value {
                DebugValue::Counter(v) => v.to_string(),
                DebugValue::Gauge(v) => format!("{:.2}", v.into_inner()),
                DebugValue::Histogram(samples) => format!("{} samples", samples.len()),
            };
            format!("{}{} = {}", key.name(), label_str, rendered)
        })
        .collect();
    lines.sort();
    for line in lines {
        println!("   └─ {}", line);
    }
}
