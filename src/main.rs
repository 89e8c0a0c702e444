//! # trail
//!
//! Command-line driver: runs an instrumented order update so the effect of
//! each creation policy can be inspected, and prints effective settings.

#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{warn, Level};
use trail_core::{AuditProvider, CreationPolicy, MemoryProvider, ProviderCall};
use trail_engine::{config, ActionType, AuditScope, ScopeOptions, TargetSource};
use trail_settings::TrailSettings;
use trail_telemetry::{TelemetryConfig, TelemetryGuard, TracingProvider, AUDIT_TARGET};

/// Scoped audit trail driver.
#[derive(Parser, Debug)]
#[command(name = "trail", version, about = "Scoped audit trail driver")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Audit a sample order update and print what reached the provider.
    Demo(DemoArgs),
    /// Print the effective settings.
    Settings,
}

#[derive(clap::Args, Debug)]
struct DemoArgs {
    /// Creation policy (defaults to the configured one).
    #[arg(long)]
    policy: Option<CreationPolicy>,

    /// Discard the scope inside the tracked block.
    #[arg(long)]
    discard: bool,

    /// Fail the tracked block so the exception is recorded.
    #[arg(long)]
    fail: bool,

    /// Where records go.
    #[arg(long, value_enum, default_value_t = ProviderKind::Memory)]
    provider: ProviderKind,

    /// Order number used for the sample target.
    #[arg(long, default_value_t = 1001)]
    order_id: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ProviderKind {
    /// Keep records in memory and print them as JSON.
    Memory,
    /// Emit records as log lines on stderr.
    Tracing,
}

#[derive(Clone, Copy, Debug, Serialize)]
enum OrderStatus {
    Open,
    Closed,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Order {
    id: u32,
    status: OrderStatus,
    lines: Vec<OrderLine>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct OrderLine {
    sku: String,
    quantity: u32,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = trail_settings::get_settings();
    let telemetry = init_logging(settings);

    match cli.command {
        Command::Demo(args) => run_demo(&args, settings, &telemetry),
        Command::Settings => print_settings(settings),
    }
}

fn init_logging(settings: &TrailSettings) -> TelemetryGuard {
    let log_level = settings.logging.level.parse().unwrap_or(Level::WARN);
    trail_telemetry::init_telemetry(TelemetryConfig {
        log_level,
        module_levels: Vec::new(),
        json: settings.logging.json,
    })
}

fn run_demo(args: &DemoArgs, settings: &TrailSettings, telemetry: &TelemetryGuard) -> Result<()> {
    let memory = Arc::new(MemoryProvider::new());
    let provider: Arc<dyn AuditProvider> = match args.provider {
        ProviderKind::Memory => memory.clone(),
        ProviderKind::Tracing => {
            telemetry.set_module_level(AUDIT_TARGET, Level::INFO);
            Arc::new(TracingProvider::new())
        }
    };

    config::configure(|setup| {
        let setup = setup
            .with_settings(settings)
            .use_shared_provider(provider)
            .add_custom_action(ActionType::OnScopeCreated, |scope| {
                let user = scope.event().environment().user_name.clone();
                scope.set_custom_field("RequestedBy", &user)?;
                Ok(())
            });
        match args.policy {
            Some(policy) => setup.with_creation_policy(policy),
            None => setup,
        }
    });

    let order = Arc::new(RwLock::new(Order {
        id: args.order_id,
        status: OrderStatus::Open,
        lines: vec![OrderLine {
            sku: "SKU-1".to_string(),
            quantity: 2,
        }],
    }));

    let options = ScopeOptions::new("Order:Update")
        .target(TargetSource::shared(&order))
        .extra_field("Channel", "cli");

    let outcome = AuditScope::track(options, |scope| -> Result<()> {
        scope.comment("closing order from the command line");
        order.write().status = OrderStatus::Closed;
        if args.discard {
            scope.discard();
        }
        if args.fail {
            anyhow::bail!("payment gateway rejected order {}", args.order_id);
        }
        if scope.creation_policy() == CreationPolicy::Manual {
            scope.save()?;
        }
        Ok(())
    });
    if let Err(e) = outcome {
        warn!(error = %e, "tracked block failed");
    }

    if args.provider == ProviderKind::Memory {
        let calls: Vec<Value> = memory.calls().iter().map(describe_call).collect();
        let rendered = serde_json::to_string_pretty(&calls).context("rendering records")?;
        println!("{rendered}");
    }
    Ok(())
}

fn describe_call(call: &ProviderCall) -> Value {
    let kind = if call.is_insert() { "insert" } else { "update" };
    json!({
        "Call": kind,
        "Id": call.id(),
        "Event": call.event(),
    })
}

fn print_settings(settings: &TrailSettings) -> Result<()> {
    let rendered = serde_json::to_string_pretty(&json!({
        "path": trail_settings::settings_path(),
        "settings": settings,
    }))
    .context("rendering settings")?;
    println!("{rendered}");
    Ok(())
}
