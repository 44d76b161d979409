use anyhow::{Context, Result};
use llm_switchboard::cli::{Args, ConfigDiscovery, ExecutionMode};
use llm_switchboard::env::DEFAULT_LOG_FILTER;
use llm_switchboard::{
    HealthCheckResult, HealthState, RegistryEvent, Switchboard, SwitchboardConfig,
};
use std::path::Path;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "llm_switchboard=debug"
    } else {
        DEFAULT_LOG_FILTER
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let mode = match args.mode() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    match mode {
        ExecutionMode::ShowConfig => {
            ConfigDiscovery::show_discovery_info();
            Ok(())
        }
        ExecutionMode::Classify(message) => run_classify(args.config.as_deref(), &message),
        ExecutionMode::Status { json } => run_status(args.config.as_deref(), json).await,
        ExecutionMode::Probe(provider) => run_probe(args.config.as_deref(), &provider).await,
        ExecutionMode::Watch => run_watch(args.config.as_deref()).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<SwitchboardConfig> {
    ConfigDiscovery::load(path).context("Failed to load configuration")
}

async fn run_status(config_path: Option<&Path>, json: bool) -> Result<()> {
    let switchboard = Switchboard::new(load_config(config_path)?)?;
    info!("Running one health check pass");
    switchboard.monitor().run_probe_pass().await;
    if let Some(best) = switchboard.select_best() {
        switchboard.set_current(&best)?;
    }

    let status = switchboard.status();
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("📊 Provider Status:");
    for provider in &status.providers {
        let latency = if provider.response_time.is_zero() {
            "-".to_string()
        } else {
            format!("{} ms", provider.response_time.as_millis())
        };
        println!(
            "  {} {:<12} {:<9} {:>9}  {}",
            state_icon(provider.state),
            provider.name,
            provider.state,
            latency,
            provider.error.as_deref().unwrap_or("")
        );
    }
    println!();
    println!(
        "  Healthy: {}  Degraded: {}  Down: {}  Unknown: {}",
        status.counts.healthy, status.counts.degraded, status.counts.down, status.counts.unknown
    );
    match &status.current {
        Some(current) => println!("  Current: {}", current),
        None => println!("  Current: none (no healthy provider)"),
    }
    if !status.fallback_order.is_empty() {
        println!("  Fallback: {}", status.fallback_order.join(" → "));
    }
    Ok(())
}

async fn run_probe(config_path: Option<&Path>, provider: &str) -> Result<()> {
    let switchboard = Switchboard::new(load_config(config_path)?)?;
    let result = switchboard
        .monitor()
        .force_check(provider)
        .await
        .with_context(|| format!("Failed to probe {}", provider))?;
    print_check(&result);
    Ok(())
}

fn print_check(result: &HealthCheckResult) {
    println!(
        "{} {}: {} ({} ms)",
        state_icon(result.state),
        result.provider,
        result.state,
        result.response_time.as_millis()
    );
    if let Some(endpoint) = &result.details.endpoint {
        println!("  Endpoint: {}", endpoint);
    }
    if let Some(code) = result.details.status_code {
        println!("  HTTP status: {}", code);
    }
    if let Some(error) = &result.error {
        println!("  Error: {}", error);
    }
    if let Some(category) = result.details.error_category {
        println!("  Category: {}", category);
        println!("  {}", category.user_friendly_message());
    }
}

fn run_classify(config_path: Option<&Path>, message: &str) -> Result<()> {
    let switchboard = Switchboard::new(load_config(config_path)?)?;
    let (category, strategy) = switchboard.recovery().classify(message);

    println!("Category:   {}", category);
    println!("Retryable:  {}", category.is_retryable());
    println!("Action:     {:?}", strategy.action);
    if let Some(delay) = strategy.delay {
        println!("Delay:      {:?}", delay);
    }
    if let Some(retries) = strategy.max_retries {
        println!("Retries:    {}", retries);
    }
    println!("Message:    {}", strategy.message);
    println!("Suggestion: {}", strategy.suggestion);
    println!();
    println!("💡 {}", category.user_friendly_message());
    for suggestion in category.suggestions() {
        println!("  - {}", suggestion);
    }
    Ok(())
}

async fn run_watch(config_path: Option<&Path>) -> Result<()> {
    let switchboard = Switchboard::new(load_config(config_path)?)?;
    let mut events = switchboard.registry().subscribe();
    switchboard.start();
    println!("👀 Watching providers, press Ctrl-C to stop");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            event = events.recv() => match event {
                Ok(event) => {
                    print_event(&event);
                    if let RegistryEvent::StatusUpdated { .. } = event
                        && switchboard.current_provider().is_none()
                        && let Some(best) = switchboard.select_best()
                    {
                        switchboard.set_current(&best)?;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event stream lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    switchboard.shutdown().await;
    println!("Goodbye!");
    Ok(())
}

fn print_event(event: &RegistryEvent) {
    let timestamp = chrono::Utc::now().format("%H:%M:%S");
    match event {
        RegistryEvent::StatusUpdated { status } => println!(
            "[{}] {} {} is {} ({} ms){}",
            timestamp,
            state_icon(status.state),
            status.name,
            status.state,
            status.response_time.as_millis(),
            status
                .error
                .as_deref()
                .map(|e| format!(": {}", e))
                .unwrap_or_default()
        ),
        RegistryEvent::CurrentChanged { name } => {
            println!("[{}] 🔀 current provider is now {}", timestamp, name)
        }
        other => match serde_json::to_string(other) {
            Ok(json) => println!("[{}] {}", timestamp, json),
            Err(_) => println!("[{}] {:?}", timestamp, other),
        },
    }
}

fn state_icon(state: HealthState) -> &'static str {
    match state {
        HealthState::Healthy => "✅",
        HealthState::Degraded => "⚠️",
        HealthState::Down => "❌",
        HealthState::Unknown => "❔",
    }
}
