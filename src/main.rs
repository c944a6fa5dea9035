use clap::{Parser, Subcommand};
use ctlplane::config::{self, ResolvedConfig};
use ctlplane::dataplane::Network;
use ctlplane::telemetry::init_logging;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "ctlplane")]
#[command(about = "RIP, access lists and policy routing for simulated router nodes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Print the access lists, route maps and tables of one node
    Show {
        /// Path to the node file
        #[arg(short, long, default_value = "nodes.toml")]
        config: PathBuf,

        /// Node to show
        #[arg(short, long)]
        node: u32,
    },
    /// Simulate the configured nodes
    Run {
        /// Path to the node file
        #[arg(short, long, default_value = "nodes.toml")]
        config: PathBuf,

        /// Simulated seconds to run
        #[arg(short, long, default_value_t = 300)]
        duration: u64,

        /// Simulated seconds per wall-clock second, 0 runs unpaced
        #[arg(short, long, default_value_t = 0)]
        speed: u64,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate the node file
    Validate {
        /// Path to the node file
        #[arg(short, long, default_value = "nodes.toml")]
        config: PathBuf,
    },
    /// Write the node file with every default filled in
    Resolve {
        /// Path to the node file
        #[arg(short, long, default_value = "nodes.toml")]
        config: PathBuf,

        /// Output path, stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Validate { config } => {
                init_logging(None);
                cmd_config_validate(&config)
            }
            ConfigAction::Resolve { config, output } => {
                init_logging(None);
                cmd_config_resolve(&config, output.as_deref())
            }
        },
        Commands::Show { config, node } => cmd_show(&config, node),
        Commands::Run {
            config,
            duration,
            speed,
        } => cmd_run(&config, Duration::from_secs(duration), speed),
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

fn cmd_config_validate(config_path: &Path) -> Result<(), String> {
    println!("[INFO] Validating {}...", config_path.display());

    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        Err("Validation failed".to_string())
    } else {
        println!("[INFO] Configuration is valid");
        Ok(())
    }
}

fn cmd_config_resolve(config_path: &Path, output_path: Option<&Path>) -> Result<(), String> {
    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();
    if validation.has_errors() {
        return Err("Validation failed with errors".to_string());
    }

    let resolved = config::resolve(&cfg).map_err(|e| e.to_string())?;
    let body = toml::to_string_pretty(&resolved)
        .map_err(|e| format!("Failed to serialize resolved config: {}", e))?;
    let output = format!(
        "# Generated by ctlplane - DO NOT EDIT\n# Source: {}\n\n{}",
        config_path.display(),
        body
    );

    match output_path {
        Some(path) => {
            std::fs::write(path, output)
                .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
            println!("[INFO] Generated {}", path.display());
        }
        None => print!("{}", output),
    }
    Ok(())
}

/// Load, resolve and build; logging is initialized from the `[log]` table
fn load_network(config_path: &Path) -> Result<(ResolvedConfig, Network), String> {
    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;
    init_logging(cfg.log.as_ref());

    let resolved = config::resolve(&cfg).map_err(|e| e.to_string())?;
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let network = config::build_network(&resolved, base_dir).map_err(|e| e.to_string())?;
    Ok((resolved, network))
}

fn cmd_show(config_path: &Path, node_id: u32) -> Result<(), String> {
    let (_, network) = load_network(config_path)?;
    let node = network
        .node(node_id)
        .ok_or_else(|| format!("node {} is not configured", node_id))?;
    print!("{}", node.show());
    Ok(())
}

fn cmd_run(config_path: &Path, duration: Duration, speed: u64) -> Result<(), String> {
    use tokio::runtime::Runtime;

    let (resolved, mut network) = load_network(config_path)?;
    let rt = Runtime::new().map_err(|e| format!("Failed to create runtime: {}", e))?;

    rt.block_on(async {
        network.start();
        info!(duration = duration.as_secs(), speed, "simulation running");

        let tick = Duration::from_secs(1);
        let mut pace = (speed > 0).then(|| tokio::time::interval(tick / speed.min(1_000_000) as u32));
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        while network.now() < duration {
            let until = (network.now() + tick).min(duration);
            network.run_until(until);

            match pace.as_mut() {
                Some(interval) => {
                    tokio::select! {
                        _ = interval.tick() => {}
                        _ = &mut ctrl_c => {
                            warn!(at = ?network.now(), "interrupted");
                            break;
                        }
                    }
                }
                None => {
                    // Unpaced runs still notice Ctrl-C between ticks
                    tokio::select! {
                        biased;
                        _ = &mut ctrl_c => {
                            warn!(at = ?network.now(), "interrupted");
                            break;
                        }
                        _ = tokio::task::yield_now() => {}
                    }
                }
            }
        }
    });

    info!(
        at = ?network.now(),
        events = network.events_processed(),
        datagrams = network.datagrams_delivered(),
        "simulation finished"
    );
    print_report(&resolved, &network);
    Ok(())
}

fn print_report(resolved: &ResolvedConfig, network: &Network) {
    for settings in &resolved.nodes {
        let Some(node) = network.node(settings.id) else {
            continue;
        };
        println!("== node {} ==", node.id());

        let mut stats = Vec::new();
        if settings.access_list_statistics {
            stats.extend(node.policy().acl.stats.export());
        }
        if settings.policy_routing_statistics {
            stats.extend(node.policy().pbr.stats.export());
        }
        if let Some(rip) = node.rip() {
            print!("{}", rip.show());
            stats.extend(rip.stats.export());
        }
        for (name, value) in stats {
            println!("  {:<40} {}", name, value);
        }
    }
}
