//! Tracker Demo
//!
//! Runs one tracking session against an inference service and prints the
//! readout as results arrive. Point it at the reference stub with:
//!
//! ```text
//! cargo run --example inference_stub
//! FORMSENSE_ENDPOINT=ws://127.0.0.1:8000/ws cargo run --example tracker
//! ```
//!
//! Without the `camera` feature a synthetic test pattern stands in for the
//! webcam. Press Ctrl+C to stop.

use anyhow::Context;
use formsense::{CameraStatus, DebugLogger, Session, SessionConfig, SessionEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    DebugLogger::init_logging().context("failed to initialise logging")?;

    println!("🎯 FormSense Tracker Demo");
    println!("=========================");

    let config = SessionConfig::from_env();
    println!("📡 Inference service: {}", config.endpoint);

    let mut session = Session::builder()
        .endpoint(&config.endpoint)
        .capture_interval(config.capture_interval)
        .build()
        .context("invalid session configuration")?;

    let mut events = session.subscribe();
    session.start().context("failed to start session")?;
    println!("✅ Session {} started", session.id());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(SessionEvent::ConnectionChanged { state }) => {
                    println!("🔌 Link {}", state);
                }
                Ok(SessionEvent::CameraReady { label }) => {
                    println!("📷 Camera ready: {}", label);
                }
                Ok(SessionEvent::CameraUnavailable { reason }) => {
                    println!("⚠️  Camera unavailable: {}", reason);
                }
                Ok(SessionEvent::DisplayUpdated { display }) => {
                    if display.results_applied > 0 {
                        println!(
                            "💪 {:>5} {:<8} {}",
                            display.angle_label(),
                            format!("{:?}", display.phase),
                            display.feedback
                        );
                    } else if display.camera == CameraStatus::Pending {
                        println!("⏳ {}", display.feedback);
                    }
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    println!("⏩ Skipped {} events", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    println!("\n🛑 Stopping session...");
    let report = session.stop().await;
    let metrics = session.metrics();

    println!("📊 Elapsed {}", metrics.elapsed);
    println!("   Frames sent:     {}", metrics.frames_sent);
    println!("   Frames dropped:  {}", metrics.frames_dropped);
    println!("   Results applied: {}", metrics.results_applied);
    println!("   Send rate:       {:.1} fps", metrics.send_rate);

    if report.is_clean() {
        println!("✅ Camera and connection released");
    } else {
        println!("❌ Teardown incomplete: {:?}", report.errors);
    }

    Ok(())
}
