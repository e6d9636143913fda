//! Inference Stub Demo
//!
//! Serves the tracker wire protocol with a scripted pose that sweeps the arm
//! through repeated curls, so the tracker can be exercised without a model.
//!
//! ```text
//! FORMSENSE_BIND=0.0.0.0:8000 cargo run --example inference_stub
//! ```

use anyhow::Context;
use formsense::{CurlSweepEstimator, DebugLogger, InferenceServer};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_BIND: &str = "127.0.0.1:8000";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    DebugLogger::init_logging().context("failed to initialise logging")?;

    println!("🧪 FormSense Inference Stub");
    println!("===========================");

    let bind = std::env::var("FORMSENSE_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let server = InferenceServer::bind(bind.as_str(), Arc::new(CurlSweepEstimator::default()))
        .await
        .with_context(|| format!("failed to bind {}", bind))?
        .spawn()?;

    println!("✅ Listening on {}", server.url());
    println!("   Press Ctrl+C to stop\n");

    let mut status = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = status.tick() => {
                println!(
                    "📈 {} client(s), {} frame(s) answered",
                    server.client_count(),
                    server.frames_processed()
                );
            }
        }
    }

    println!("\n🛑 Shutting down...");
    server.shutdown().await;
    println!("✅ Stopped");
    Ok(())
}
