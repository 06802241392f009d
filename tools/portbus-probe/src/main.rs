// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! portbus-probe - poke at a portbus network from the command line
//!
//! Runs one gateway and one event session in this process. The session
//! listens, sends, broadcasts, or measures round-trip latency against a
//! `pong` probe elsewhere on the network.

use clap::{Parser, Subcommand};
use colored::*;
use portbus::transport::{UdpConfig, UdpTransport};
use portbus::{EventConfig, EventThread, Gateway, GatewayConfig, PortId, Registry};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

const PING_EVENT: u32 = 0x7050_0001;
const PONG_EVENT: u32 = 0x7050_0002;

/// portbus probe
#[derive(Parser, Debug)]
#[command(name = "portbus-probe")]
#[command(version)]
#[command(about = "Send, listen and measure latency on a portbus network")]
struct Args {
    #[command(subcommand)]
    mode: Mode,

    /// Session id of this probe
    #[arg(long, default_value = "1.2.5", global = true)]
    id: PortId,

    /// Gateway id (defaults to the session's route)
    #[arg(long, global = true)]
    gateway: Option<PortId>,

    /// UDP bind address of the gateway
    #[arg(long, default_value = "0.0.0.0:7600", global = true)]
    bind: SocketAddr,

    /// Peer gateway (format: "id=addr", can repeat)
    #[arg(short, long, global = true)]
    peer: Vec<String>,

    /// Quiet mode - only output results
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Print every event received
    Listen {
        /// Event ids to listen to (decimal or 0x hex, can repeat)
        #[arg(short, long, required = true, value_parser = parse_event)]
        event: Vec<u32>,

        /// Stop after this many events (0 = unlimited)
        #[arg(short = 'n', long, default_value = "0")]
        count: u64,
    },
    /// Send an event to one session
    Send {
        /// Destination session
        #[arg(short, long)]
        to: PortId,

        /// Event id
        #[arg(short, long, value_parser = parse_event)]
        event: u32,

        /// Payload (UTF-8 text)
        #[arg(long, default_value = "")]
        payload: String,

        /// Number of sends
        #[arg(short = 'n', long, default_value = "1")]
        count: u64,

        /// Interval between sends in milliseconds
        #[arg(long, default_value = "100")]
        interval_ms: u64,
    },
    /// Broadcast an event to every session
    Broadcast {
        /// Event id
        #[arg(short, long, value_parser = parse_event)]
        event: u32,

        /// Payload (UTF-8 text)
        #[arg(long, default_value = "")]
        payload: String,
    },
    /// Send pings and measure RTT
    Ping {
        /// Session running `pong`
        #[arg(short, long)]
        to: PortId,

        /// Payload size in bytes
        #[arg(short = 's', long, default_value = "64")]
        size: usize,

        /// Number of iterations
        #[arg(short = 'n', long, default_value = "1000")]
        count: u64,

        /// Warmup iterations before measurement
        #[arg(short, long, default_value = "10")]
        warmup: u64,

        /// Interval between pings in microseconds
        #[arg(short, long, default_value = "1000")]
        interval: u64,
    },
    /// Echo pings back to their sender
    Pong,
}

fn parse_event(s: &str) -> Result<u32, String> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    }
    .map_err(|e| format!("Invalid event id '{}': {}", s, e))
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

/// Gateway serving `session` when none is given.
fn default_gateway(session: PortId) -> PortId {
    if session.domain() == 0 {
        PortId::CONTROLLER_ROUTE
    } else {
        session.route()
    }
}

/// Gateway and session living in this process.
struct Probe {
    session: EventThread,
    // Dropped after the session
    gateway: Gateway,
}

impl Probe {
    fn open(args: &Args) -> Result<Self, Box<dyn std::error::Error>> {
        let gateway_id = args.gateway.unwrap_or_else(|| default_gateway(args.id));

        let mut udp = UdpConfig::new(args.bind);
        for entry in &args.peer {
            let (id, addr) = parse_peer(entry)?;
            udp = udp.peer(id, addr);
        }
        if udp.peers.is_empty() {
            log::warn!("no peers configured; only local sessions are reachable");
        }

        let registry = Arc::new(Registry::new());
        let transport = UdpTransport::new(udp)?;
        let mut gateway = Gateway::create(
            registry.clone(),
            gateway_id,
            Box::new(transport),
            GatewayConfig::default().priority(0),
        )?;
        gateway.start()?;

        let session = EventThread::with_config(registry, args.id, EventConfig::default())?;
        Ok(Self { session, gateway })
    }
}

fn main() {
    // Initialize logger for RUST_LOG-based debug output
    env_logger::init();

    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let mut probe = Probe::open(args)?;
    if !args.quiet {
        eprintln!(
            "{} session {} via gateway {} ({})",
            ">>>".green().bold(),
            probe.session.id(),
            probe.gateway.id(),
            args.bind
        );
    }

    let result = match &args.mode {
        Mode::Listen { event, count } => run_listen(&mut probe, event, *count, args.quiet, &running),
        Mode::Send {
            to,
            event,
            payload,
            count,
            interval_ms,
        } => run_send(
            &mut probe,
            *to,
            *event,
            payload.as_bytes(),
            *count,
            Duration::from_millis(*interval_ms),
            args.quiet,
            &running,
        ),
        Mode::Broadcast { event, payload } => {
            run_broadcast(&mut probe, *event, payload.as_bytes(), args.quiet)
        }
        Mode::Ping {
            to,
            size,
            count,
            warmup,
            interval,
        } => run_ping(
            &mut probe, *to, *size, *count, *warmup, *interval, args.quiet, &running,
        ),
        Mode::Pong => run_pong(&mut probe, args.quiet, &running),
    };

    if !args.quiet {
        let stats = probe.gateway.stats().snapshot();
        eprintln!(
            "{} gateway: {} up, {} down, {} dropped",
            "---".dimmed(),
            stats.uplink_frames,
            stats.downlink_frames,
            stats.dropped()
        );
    }
    result
}

fn run_listen(
    probe: &mut Probe,
    events: &[u32],
    count: u64,
    quiet: bool,
    running: &AtomicBool,
) -> Result<(), Box<dyn std::error::Error>> {
    let received = Arc::new(AtomicU64::new(0));
    for &event in events {
        let received = received.clone();
        probe.session.attach(event, move |_, msg| {
            let n = received.fetch_add(1, Ordering::SeqCst) + 1;
            println!(
                "{} {} {} {} {}",
                format!("[{}]", n).dimmed(),
                msg.source.to_string().cyan(),
                format!("{:#010x}", msg.event).yellow(),
                format!("{} bytes", msg.payload.len()).dimmed(),
                render_payload(msg.payload)
            );
        })?;
    }
    probe.session.start()?;

    if !quiet {
        eprintln!("{}", "    Press Ctrl+C to stop".dimmed());
    }
    while running.load(Ordering::SeqCst) {
        if count > 0 && received.load(Ordering::SeqCst) >= count {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_send(
    probe: &mut Probe,
    to: PortId,
    event: u32,
    payload: &[u8],
    count: u64,
    interval: Duration,
    quiet: bool,
    running: &AtomicBool,
) -> Result<(), Box<dyn std::error::Error>> {
    probe.session.start()?;
    let mut sent = 0;
    for i in 0..count {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        match probe.session.send(to, event, payload) {
            Ok(()) => sent += 1,
            Err(e) => eprintln!("{}: {}", "Warning".yellow(), e),
        }
        if i + 1 < count {
            std::thread::sleep(interval);
        }
    }
    // Let the uplink drain before the gateway goes away
    std::thread::sleep(Duration::from_millis(50));
    if !quiet {
        eprintln!("    Sent {}/{} to {}", sent, count, to);
    }
    Ok(())
}

fn run_broadcast(
    probe: &mut Probe,
    event: u32,
    payload: &[u8],
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    probe.session.start()?;
    let recipients = probe.session.broadcast(event, payload)?;
    std::thread::sleep(Duration::from_millis(50));
    if !quiet {
        eprintln!("    Broadcast to {} local recipient(s)", recipients);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_ping(
    probe: &mut Probe,
    to: PortId,
    size: usize,
    count: u64,
    warmup: u64,
    interval_us: u64,
    quiet: bool,
    running: &AtomicBool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (tx, rx) = mpsc::channel::<u64>();
    probe.session.attach(PONG_EVENT, move |_, msg| {
        if let Some(seq) = read_seq(msg.payload) {
            let _ = tx.send(seq);
        }
    })?;
    probe.session.start()?;

    if !quiet {
        eprintln!(
            "    to={}, size={} bytes, count={}, warmup={}",
            to, size, count, warmup
        );
    }

    let mut payload = vec![0u8; size.max(8)];
    let mut latencies: Vec<f64> = Vec::with_capacity(count as usize);
    let mut lost = 0u64;
    let start_time = Instant::now();

    for i in 0..warmup + count {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let is_warmup = i < warmup;
        payload[0..8].copy_from_slice(&i.to_le_bytes());

        let send_time = Instant::now();
        probe.session.send(to, PING_EVENT, &payload)?;

        let deadline = send_time + Duration::from_millis(1000);
        let mut received = false;
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            match rx.recv_timeout(left) {
                Ok(seq) if seq == i => {
                    if !is_warmup {
                        latencies.push(send_time.elapsed().as_secs_f64() * 1_000_000.0);
                    }
                    received = true;
                    break;
                }
                // Late pong from an earlier ping
                Ok(_) => {}
                Err(_) => break,
            }
        }
        if !received && !is_warmup {
            lost += 1;
        }

        if !quiet && !is_warmup {
            let measured = i - warmup + 1;
            if measured % 100 == 0 || measured == count {
                eprint!("\r    Progress: {}/{}", measured, count);
                let _ = io::stderr().flush();
            }
        }
        if interval_us > 0 {
            std::thread::sleep(Duration::from_micros(interval_us));
        }
    }
    if !quiet {
        eprintln!();
    }

    let stats = calculate_stats(&latencies, lost);
    print_results(&stats, size, start_time.elapsed(), quiet);
    Ok(())
}

fn run_pong(
    probe: &mut Probe,
    quiet: bool,
    running: &AtomicBool,
) -> Result<(), Box<dyn std::error::Error>> {
    let echoed = Arc::new(AtomicU64::new(0));
    let counter = echoed.clone();
    probe.session.attach(PING_EVENT, move |sender, msg| {
        // Echo back immediately
        match sender.send(msg.source, PONG_EVENT, msg.payload) {
            Ok(()) => {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if !quiet && n % 100 == 0 {
                    eprint!("\r    Echoed: {} pings", n);
                    let _ = io::stderr().flush();
                }
            }
            Err(e) => {
                if !quiet {
                    eprintln!("{}: {}", "Warning".yellow(), e);
                }
            }
        }
    })?;
    probe.session.start()?;

    if !quiet {
        eprintln!("{}", "    Press Ctrl+C to stop".dimmed());
    }
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(20));
    }
    if !quiet {
        eprintln!(
            "\n\n{} Echoed {} total pings",
            "---".dimmed(),
            echoed.load(Ordering::SeqCst)
        );
    }
    Ok(())
}

fn read_seq(payload: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = payload.get(..8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

/// Text when printable, hex otherwise.
fn render_payload(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) if text.chars().all(|c| !c.is_control() || c == '\n') => {
            format!("\"{}\"", text)
        }
        _ => payload
            .iter()
            .take(64)
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(" "),
    }
}

#[derive(Debug)]
struct Stats {
    count: usize,
    lost: u64,
    min: f64,
    max: f64,
    mean: f64,
    stddev: f64,
    p50: f64,
    p90: f64,
    p99: f64,
}

fn calculate_stats(latencies: &[f64], lost: u64) -> Stats {
    if latencies.is_empty() {
        return Stats {
            count: 0,
            lost,
            min: 0.0,
            max: 0.0,
            mean: 0.0,
            stddev: 0.0,
            p50: 0.0,
            p90: 0.0,
            p99: 0.0,
        };
    }

    let mut sorted = latencies.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    let mean: f64 = latencies.iter().sum::<f64>() / n as f64;
    let variance: f64 = latencies.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;

    let percentile = |p: f64| -> f64 {
        let idx = ((p / 100.0) * (n - 1) as f64).round() as usize;
        sorted[idx.min(n - 1)]
    };

    Stats {
        count: n,
        lost,
        min: sorted[0],
        max: sorted[n - 1],
        mean,
        stddev: variance.sqrt(),
        p50: percentile(50.0),
        p90: percentile(90.0),
        p99: percentile(99.0),
    }
}

fn print_results(stats: &Stats, size: usize, total_time: Duration, quiet: bool) {
    let attempts = stats.count as u64 + stats.lost;
    let loss_pct = if attempts > 0 {
        stats.lost as f64 / attempts as f64 * 100.0
    } else {
        0.0
    };

    if quiet {
        println!(
            "min={:.1} max={:.1} avg={:.1} p99={:.1} us lost={}",
            stats.min, stats.max, stats.mean, stats.p99, stats.lost
        );
        return;
    }

    println!();
    println!("{}", "=== portbus Latency Probe Results ===".bold());
    println!();
    println!("  {} {} bytes", "Payload size:".cyan(), size);
    println!("  {} {}", "Samples:".cyan(), stats.count);
    println!("  {} {} ({:.2}%)", "Lost:".cyan(), stats.lost, loss_pct);
    println!("  {} {:.2}s", "Duration:".cyan(), total_time.as_secs_f64());
    println!();
    println!("{}", "--- Latency (microseconds) ---".dimmed());
    println!("  {} {:>10.2} us", "Min:".green(), stats.min);
    println!("  {} {:>10.2} us", "Max:".red(), stats.max);
    println!("  {} {:>10.2} us", "Mean:".yellow(), stats.mean);
    println!("  {} {:>10.2} us", "Stddev:".yellow(), stats.stddev);
    println!();
    println!("{}", "--- Percentiles ---".dimmed());
    println!("  {} {:>10.2} us", "p50:".white(), stats.p50);
    println!("  {} {:>10.2} us", "p90:".white(), stats.p90);
    println!("  {} {:>10.2} us", "p99:".white(), stats.p99);
    println!();
}
