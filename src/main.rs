mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use cf_adapters::{Adapters, ToolRegistry};
use cf_bundle::{DeliveryPolicy, DirectorySink};
use cf_core::config::Config;
use cf_queue::{Scheduler, SchedulerConfig};
use clap::Parser;
use cli::{Cli, Commands};
use convertforge::batch::{self, BatchRequest};
use convertforge::config;

async fn convert(
    config: Config,
    request: BatchRequest,
    policy: Option<&str>,
    jobs: Option<usize>,
    output_dir: Option<&str>,
) -> Result<()> {
    let mut scheduler_config = SchedulerConfig::from_config(&config)?;
    if let Some(policy) = policy {
        scheduler_config.policy = policy.parse::<DeliveryPolicy>()?;
    }
    if let Some(jobs) = jobs {
        scheduler_config.max_concurrent = jobs.max(1);
    }

    let output_dir = match output_dir {
        Some(dir) => PathBuf::from(shellexpand::tilde(dir).as_ref()),
        None => config.delivery.output_dir.clone(),
    };

    tracing::info!(
        policy = %scheduler_config.policy,
        max_concurrent = scheduler_config.max_concurrent,
        output_dir = %output_dir.display(),
        "starting conversion"
    );

    let backend = Arc::new(Adapters::new(config.tools.clone()));
    let sink = Arc::new(DirectorySink::new(&output_dir));
    let scheduler = Scheduler::new(scheduler_config, backend, sink);

    let summary = batch::run_batch(&scheduler, request).await?;

    println!("Completed: {}", summary.completed);
    for (file, error) in &summary.failed {
        println!("Failed: {file}: {error}");
    }
    for location in &summary.deliveries {
        println!("Delivered: {location}");
    }

    if summary.completed == 0 && !summary.failed.is_empty() {
        anyhow::bail!("all {} conversions failed", summary.failed.len());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults from the verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "convertforge=trace,cf_queue=trace,cf_adapters=trace,cf_bundle=trace".to_string()
        } else {
            "convertforge=info,cf_queue=info,cf_adapters=warn,cf_bundle=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Convert {
            files,
            kind,
            options,
            policy,
            jobs,
            output_dir,
        } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let request = BatchRequest {
                files,
                adapter: kind,
                options: batch::parse_options(options.as_deref())?,
            };
            let rt = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            rt.block_on(convert(
                config,
                request,
                policy.as_deref(),
                jobs,
                output_dir.as_deref(),
            ))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("convertforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    println!("Checking external tools...\n");

    let registry = ToolRegistry::discover(&config.tools);
    let tools = registry.check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All external tools are available!");
    } else {
        println!("Some tools are missing. Image conversion works without them; other kinds need them.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            config::load_config(p)?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("✓ Configuration is valid");
    } else {
        for warning in &warnings {
            println!("! {warning}");
        }
    }
    println!("  Max concurrent: {}", config.queue.effective_max_concurrent());
    println!("  Default priority: {}", config.queue.effective_default_priority());
    println!("  Delivery policy: {}", config.delivery.policy);
    println!("  Output dir: {}", config.delivery.output_dir.display());
    Ok(())
}
