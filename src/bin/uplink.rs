//! Audio Uplink Application
//!
//! Records fixed-window microphone clips and delivers them to an ESP32
//! voice device discovered on the local subnet.

use anyhow::Result;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use esp_audio_uplink::{
    audio::AudioCapture,
    config::AppConfig,
    constants::CHUNK_CHANNEL_CAPACITY,
    delivery::{DeliveryJob, DeliveryOutcome, DeliveryPipeline},
    net::{self, DeviceEndpoint, HealthClient, SharedEndpoint},
    session::{RecordingSession, SessionEvent, SessionState, StopReason},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with a reloadable filter for the debug toggle
    let (filter, filter_handle) = tracing_subscriber::reload::Layer::new(EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    ));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ESP Audio Uplink");

    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load(Path::new(&path))?,
        None => AppConfig::default(),
    };
    config.ensure_dirs()?;

    print_banner();

    let health = HealthClient::new(&config.network)?;
    let address = resolve_device_address(&config, &health).await?;
    let endpoint = SharedEndpoint::new(DeviceEndpoint::new(address));

    // Startup confirmation is the one fatal path: a device that never
    // answers leaves nothing to do.
    let check = health.check(address).await;
    if !check.reachable {
        anyhow::bail!("device at {} is not reachable", address);
    }
    println!("Connected to device at {}\n", address);

    let (session_events_tx, mut session_events_rx) = mpsc::channel(16);
    let session = RecordingSession::new(
        config.recording.clone(),
        config.audio.clone(),
        config.storage.temp_dir.clone(),
        session_events_tx,
    );
    let capture = Arc::new(AudioCapture::new(&config.audio));
    let pipeline = DeliveryPipeline::new(&config.network, &config.storage, endpoint.clone(), health.clone())?;

    // Serialized delivery loop: one job at a time, in completion order
    tokio::spawn(async move {
        while let Some(event) = session_events_rx.recv().await {
            let job = match event {
                SessionEvent::Completed(capture) => pipeline.deliver(capture).await,
                SessionEvent::Rejected { duration, .. } => DeliveryJob::skipped_too_short(duration),
            };
            report_job(&job);
        }
    });

    // Ctrl+C during an active session runs the normal stop path; the
    // in-flight buffer still goes through stop/validate, never past it.
    {
        let session = session.clone();
        let capture = capture.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("\nInterrupted, shutting down...");
                session.stop(StopReason::Interrupt).await;
                capture.stop();
                std::process::exit(0);
            }
        });
    }

    print_controls();

    let mut debug_mode = false;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "r" | "record" => trigger_record(&session, &capture),
            "s" | "stop" => {
                session.stop(StopReason::Manual).await;
            }
            "i" | "status" => show_status(&health, &endpoint).await,
            "t" | "test" => test_connection(&health, &endpoint).await,
            "d" | "debug" => {
                debug_mode = !debug_mode;
                let level = if debug_mode { "debug" } else { "info" };
                if filter_handle.reload(EnvFilter::new(level)).is_ok() {
                    println!("Debug logging {}", if debug_mode { "ON" } else { "OFF" });
                }
            }
            "q" | "quit" => break,
            "" => {}
            other => println!("Unknown command: {} (try r/s/i/t/d/q)", other),
        }
    }

    session.stop(StopReason::Interrupt).await;
    capture.stop();
    println!("Goodbye!");
    Ok(())
}

/// Manual address from config, else subnet discovery, else prompt
async fn resolve_device_address(config: &AppConfig, health: &HealthClient) -> Result<Ipv4Addr> {
    if let Some(address) = config.network.device_address {
        tracing::info!(%address, "Using configured device address");
        return Ok(address);
    }

    let local = match config.network.local_address {
        Some(address) => address,
        None => net::local_ipv4()?,
    };

    println!("Searching for device on the local subnet...");
    let found = net::discover(
        local,
        health,
        config.network.probe_concurrency,
        Duration::from_secs(30),
    )
    .await?;

    match found {
        Some(endpoint) => {
            println!("Found device at {}", endpoint.address);
            Ok(endpoint.address)
        }
        None => {
            println!("Auto-discovery found nothing.");
            prompt_for_address().await
        }
    }
}

async fn prompt_for_address() -> Result<Ipv4Addr> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        println!("Enter device IP address:");
        match lines.next_line().await? {
            Some(line) => match line.trim().parse::<Ipv4Addr>() {
                Ok(address) => return Ok(address),
                Err(_) => println!("Not a valid IPv4 address"),
            },
            None => anyhow::bail!("no device address provided"),
        }
    }
}

fn trigger_record(session: &RecordingSession, capture: &Arc<AudioCapture>) {
    if session.state() == SessionState::Active {
        println!("Already recording, please wait...");
        return;
    }

    let (chunks_tx, chunks_rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
    if let Err(e) = capture.start(chunks_tx) {
        println!("Could not start capture: {}", e);
        return;
    }

    let capture_for_stop = capture.clone();
    match session.start(chunks_rx, Box::new(move || capture_for_stop.stop())) {
        Ok(session_id) => {
            println!("Recording... (session {})", session_id);

            // Live level readout while the session is active
            let session = session.clone();
            tokio::spawn(async move {
                while session.state() == SessionState::Active {
                    tracing::debug!(level = format!("{:.2}", session.level()), "mic level");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            });
        }
        Err(e) => {
            capture.stop();
            println!("Could not start recording: {}", e);
        }
    }
}

async fn show_status(health: &HealthClient, endpoint: &SharedEndpoint) {
    let address = endpoint.address();
    println!("Fetching device status...");

    let check = health.check(address).await;
    endpoint.mark(check.reachable);

    let Some(status) = check.status else {
        println!("Failed to get status from {}", address);
        return;
    };

    println!("DEVICE STATUS");
    println!("  WiFi:          {}", if status.wifi_connected { "connected" } else { "disconnected" });
    println!("  SD card:       {}", if status.sd_initialized { "ready" } else { "error" });
    println!("  Recording:     {}", if status.recording_active { "active" } else { "idle" });
    println!("  IP address:    {}", status.ip_address);
    println!("  Free heap:     {} bytes", status.free_heap);
    println!("  Uptime:        {:.1} s", status.uptime as f64 / 1000.0);
    println!("  Conversations: {}", status.conversation_history_count);
}

async fn test_connection(health: &HealthClient, endpoint: &SharedEndpoint) {
    let address = endpoint.address();
    println!("Testing connection to {}...", address);

    let check = health.check(address).await;
    endpoint.mark(check.reachable);

    if check.reachable {
        println!("Connection OK");
    } else {
        println!("Connection failed; check the device power and WiFi");
    }
}

fn report_job(job: &DeliveryJob) {
    match job.outcome {
        DeliveryOutcome::Uploaded => {
            println!(
                "Uploaded {} ({} bytes, {:.1}s). Ready for the next recording.",
                job.source_file.display(),
                job.size_bytes,
                job.duration_ms as f64 / 1000.0
            );
        }
        DeliveryOutcome::SkippedTooSmall => {
            println!("Recording file too small ({} bytes), upload skipped", job.size_bytes);
        }
        DeliveryOutcome::SkippedTooShort => {
            println!("Recording too short ({}ms), nothing to deliver", job.duration_ms);
        }
        DeliveryOutcome::Failed => {
            println!("Delivery failed; trigger a new recording to retry");
        }
        DeliveryOutcome::Pending => {}
    }
}

fn print_banner() {
    println!("==============================================");
    println!("  ESP Audio Uplink");
    println!("  Microphone -> ESP32 voice device over HTTP");
    println!("==============================================\n");
}

fn print_controls() {
    println!("COMMANDS:");
    println!("  r | record   Record a fixed 5-second clip");
    println!("  s | stop     Stop the current recording early");
    println!("  i | status   Show device status");
    println!("  t | test     Test device connection");
    println!("  d | debug    Toggle debug logging");
    println!("  q | quit     Exit\n");
    println!("Ready to record.\n");
}
