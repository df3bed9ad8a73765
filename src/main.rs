//! dhcp-relay daemon.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use dhcp_relay::domain::ProviderId;
use dhcp_relay::services::{
    HostStore, HostTable, PacketService, RouteTable, StaticInterfaceService,
};
use dhcp_relay::{
    Collaborators, Config, DhcpRelayManager, DhcpRelayService, DryRunPacketService,
    PacketCapture, PnetCapture, PnetPacketService,
};

/// Provider for host facts seeded from the configuration file.
const CONFIG_PROVIDER: ProviderId = ProviderId::new("host", "config");

#[derive(Parser)]
#[command(name = "dhcp-relay")]
#[command(about = "DHCPv4 relay agent and ARP proxy for switch-attached clients")]
#[command(version)]
struct Args {
    /// Configuration file (default: $DHCP_RELAY_CONFIG, then /etc/dhcp-relay.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log frames instead of sending them
    #[arg(long)]
    dry_run: bool,

    /// List available network interfaces and exit
    #[arg(short, long)]
    list_interfaces: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.list_interfaces {
        println!("Available network interfaces:");
        for iface in PnetCapture::list_interfaces() {
            println!("  {}", iface);
        }
        return Ok(());
    }

    let path = Config::resolve_path(args.config);
    let config = Config::load(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Starting dhcp-relay");
    info!("Config path: {}", path.display());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(run(config, args.dry_run))
}

async fn run(config: Config, dry_run: bool) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            info!("Received interrupt, shutting down");
            running.store(false, Ordering::SeqCst);
        })
        .context("Failed to install signal handler")?;
    }

    let senders = Arc::new(PnetPacketService::new());
    let mut captures = Vec::with_capacity(config.ports.len());
    for port in &config.ports {
        let mut capture = PnetCapture::open(&port.name, port.connect_point.clone())
            .with_context(|| format!("Failed to open capture on {}", port.name))?;
        capture.set_running(Arc::clone(&running));
        if let Some(sender) = capture.take_sender() {
            senders.register(port.connect_point.clone(), sender);
        }
        info!("Capturing on {} as {}", port.name, port.connect_point);
        captures.push(capture);
    }

    let packets: Arc<dyn PacketService> = if dry_run {
        info!("Dry run: frames are logged, not sent");
        Arc::new(DryRunPacketService)
    } else {
        senders
    };

    let hosts = Arc::new(HostTable::new());
    let manager = DhcpRelayManager::new(Collaborators {
        interfaces: Arc::new(StaticInterfaceService::new(config.interfaces.clone())),
        hosts: hosts.clone(),
        host_store: hosts.clone(),
        routes: Arc::new(RouteTable::new()),
        packets,
    });
    manager.set_arp_enabled(config.arp_enabled);

    for host in &config.hosts {
        hosts.create_or_update_host(&CONFIG_PROVIDER, host.id(), host.description(), true);
    }
    match &config.server {
        Some(server) => manager.update_config(server),
        None => warn!("No DHCP server configured; DHCP traffic will be dropped"),
    }

    if captures.is_empty() {
        warn!("No ports configured; waiting for shutdown");
    }

    let handle = tokio::runtime::Handle::current();
    let mut loops = Vec::with_capacity(captures.len());
    for mut capture in captures {
        let manager = Arc::clone(&manager);
        let handle = handle.clone();
        loops.push(tokio::task::spawn_blocking(move || {
            let name = capture.interface_name().to_string();
            let frames = capture.packets()?;
            for packet in frames {
                let manager = Arc::clone(&manager);
                handle.spawn(async move { manager.process(&packet) });
            }
            info!("Capture on {} stopped", name);
            Ok::<_, dhcp_relay::CaptureError>(())
        }));
    }

    for capture_loop in loops {
        match capture_loop.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Capture failed: {}", e),
            Err(e) => error!("Capture task panicked: {}", e),
        }
    }
    while running.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let records = manager.dhcp_records();
    info!("Stopped with {} relay records", records.len());
    for record in records {
        info!(
            "  {} at {} ip {} ({})",
            record.host_id(),
            record
                .current_location()
                .map(|location| location.connect_point.to_string())
                .unwrap_or_else(|| "-".to_string()),
            record
                .ip4_address()
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "-".to_string()),
            record
                .ip4_status()
                .map(|status| status.to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
    }

    Ok(())
}
