// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! portbus gateway daemon CLI
//!
//! # Usage
//!
//! ```bash
//! # Channel 2 gateway talking to the application backbone
//! portbus-gateway --id 1.2.1 --bind 0.0.0.0:7602 --peer 1.0.1=10.0.0.1:7601
//!
//! # Bounded single-lock queues
//! portbus-gateway --id 1.2.1 --peer 1.0.1=10.0.0.1:7601 --queue single --queue-capacity 512
//!
//! # Using configuration file
//! portbus-gateway --config gateway.toml
//! ```

use clap::{Parser, Subcommand};
use portbus::{GatewayStats, PortId, QueueConfig, QueueKind};
use portbus_gateway::{ConfigError, Daemon, DaemonConfig, DaemonError};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// portbus gateway daemon
#[derive(Parser, Debug)]
#[command(name = "portbus-gateway")]
#[command(about = "portbus gateway daemon - relays port frames between processes over UDP")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Gateway id (x.y.1 or a backbone route)
    #[arg(long, conflicts_with = "config")]
    id: Option<PortId>,

    /// UDP bind address
    #[arg(long, default_value = "0.0.0.0:7600", conflicts_with = "config")]
    bind: SocketAddr,

    /// Peer gateway (format: "id=addr", can repeat)
    #[arg(short, long, conflicts_with = "config")]
    peer: Vec<String>,

    /// Queue design (single, double)
    #[arg(long, default_value = "double", conflicts_with = "config")]
    queue: QueueKind,

    /// Queue bound (unbounded when omitted)
    #[arg(long, conflicts_with = "config")]
    queue_capacity: Option<usize>,

    /// Worker SCHED_RR priority (0 = inherit)
    #[arg(long, default_value_t = portbus::sched::DEFAULT_RT_PRIORITY, conflicts_with = "config")]
    priority: u8,

    /// Statistics reporting interval (seconds, 0 to disable)
    #[arg(long)]
    stats_interval: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "gateway.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Subcommands log at the default level
    if let Some(cmd) = args.command {
        init_logging("info");
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
        };
    }

    let mut config = build_config(&args)?;
    if let Some(level) = &args.log_level {
        config.gateway.log_level = level.clone();
    }
    if let Some(interval) = args.stats_interval {
        config.gateway.stats_interval_secs = interval;
    }
    init_logging(&config.gateway.log_level);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let mut daemon = Daemon::new(&config)?;

    println!("portbus gateway v{}", env!("CARGO_PKG_VERSION"));
    println!("=====================================");
    println!();
    println!("Gateway: {} on {}", daemon.id(), daemon.local_addr());
    for peer in &config.udp.peers {
        println!("Peer:    {} at {}", peer.id, peer.addr);
    }
    println!(
        "Queue:   {} ({})",
        config.queue.kind,
        config
            .queue
            .capacity
            .map_or_else(|| "unbounded".to_string(), |c| format!("capacity {}", c))
    );
    println!();
    println!("Press Ctrl+C to stop...");
    println!();

    daemon.start()?;

    let stats = daemon.stats();
    let stats_interval = Duration::from_secs(config.gateway.stats_interval_secs);
    let mut last_report = Instant::now();
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
        if !stats_interval.is_zero() && last_report.elapsed() >= stats_interval {
            print_stats(&stats);
            last_report = Instant::now();
        }
    }

    println!("\nShutting down...");
    daemon.stop()?;

    println!("\nFinal Statistics:");
    print_stats(&stats);

    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn build_config(args: &Args) -> Result<DaemonConfig, DaemonError> {
    // Load from file if specified
    if let Some(ref config_path) = args.config {
        return Ok(DaemonConfig::from_file(config_path)?);
    }

    let id = args.id.ok_or_else(|| {
        ConfigError::Invalid("Missing --id (or use --config)".into())
    })?;

    let mut config = DaemonConfig::new(id);
    config.gateway.priority = args.priority;
    config.udp.bind = args.bind;
    config.queue = match args.queue_capacity {
        Some(capacity) => QueueConfig::bounded(args.queue, capacity),
        None => QueueConfig::unbounded(args.queue),
    };

    for entry in &args.peer {
        let (peer_id, addr) = parse_peer(entry).map_err(ConfigError::Invalid)?;
        config.add_peer(peer_id, addr);
    }

    config.validate()?;
    Ok(config)
}

fn parse_peer(entry: &str) -> Result<(PortId, SocketAddr), String> {
    let (id, addr) = entry
        .split_once('=')
        .ok_or_else(|| format!("Invalid peer format: {} (expected id=addr)", entry))?;
    let id: PortId = id.parse()?;
    let addr: SocketAddr = addr
        .trim()
        .parse()
        .map_err(|e| format!("Invalid peer address '{}': {}", addr, e))?;
    Ok((id, addr))
}

fn cmd_gen_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = DaemonConfig::new(PortId::APP_ROUTE);
    config.udp.bind = "0.0.0.0:7601".parse()?;
    config.add_peer(PortId::CHIP_ROUTE, "10.0.0.1:7600".parse()?);
    config.add_peer(PortId::new(1, 2, 1), "10.0.0.2:7602".parse()?);
    config.add_peer(PortId::new(1, 3, 1), "10.0.0.3:7603".parse()?);

    let toml_str = config.to_toml()?;

    // Add comments
    let content = format!(
        r#"# portbus gateway configuration
# Generated by portbus-gateway gen-config
#
# [queue] capacity = <n> bounds every port queue and the ingress queue.

{}
"#,
        toml_str
    );

    std::fs::write(&output, content)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match DaemonConfig::from_file(&config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Gateway: {}", config.gateway.id);
            println!("Bind:    {}", config.udp.bind);
            println!("Peers:   {}", config.udp.peers.len());
            for (i, peer) in config.udp.peers.iter().enumerate() {
                println!("  [{}] {} at {}", i, peer.id, peer.addr);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_stats(stats: &GatewayStats) {
    let snap = stats.snapshot();
    println!("{}", stats.format_summary());
    println!(
        "Traffic:  {} up, {} down, {} dropped",
        format_bytes(snap.uplink_bytes),
        format_bytes(snap.downlink_bytes),
        snap.dropped()
    );
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_peer() {
        let (id, addr) = parse_peer("1.0.1=127.0.0.1:7601").unwrap();
        assert_eq!(id, PortId::APP_ROUTE);
        assert_eq!(addr.port(), 7601);

        assert!(parse_peer("1.0.1").is_err());
        assert!(parse_peer("1.0.1=nowhere").is_err());
        assert!(parse_peer("7.0.1=127.0.0.1:1").is_err());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_print_stats_uses_summary() {
        let stats = GatewayStats::new();
        stats.record_relayed();
        assert!(stats.format_summary().contains("relayed=1"));
        print_stats(&stats);
    }

    #[test]
    fn test_args_conflict_with_config() {
        assert!(Args::try_parse_from(["portbus-gateway", "--config", "g.toml", "--id", "1.2.1"])
            .is_err());
        let args = Args::try_parse_from([
            "portbus-gateway",
            "--id",
            "1.2.1",
            "--peer",
            "1.0.1=127.0.0.1:7601",
            "--queue",
            "single",
            "--queue-capacity",
            "8",
        ])
        .unwrap();
        let config = build_config(&args).unwrap();
        assert_eq!(config.queue, QueueConfig::bounded(QueueKind::Single, 8));
        assert_eq!(config.udp.peers.len(), 1);
    }
}
