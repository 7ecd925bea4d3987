//! BtLink demo host entry point.
//!
//! Runs the link state machine and the discovery aggregator against the
//! in-process loopback radio, so the whole lifecycle can be watched in the
//! logs without any radio hardware.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()               -- service record, log level, channel size
//!  └─ discovery scan              -- DiscoveryAggregator over a DiscoveryBus
//!  └─ LinkService::listen()       -- acceptor waits for one peer
//!  └─ simulated peer (blocking)   -- connects, sends a line, reads the echo
//!  └─ event loop
//!       ├─ SessionEnded           -> reset(), demo complete
//!       └─ Ctrl-C                 -> stop()
//! ```
//!
//! # Why an event loop? (for beginners)
//!
//! Listener callbacks run while the link holds its state lock, so they must
//! not call back into the service.  The `ChannelListener` turns each callback
//! into a `LinkEvent` on a channel, and this loop, running on its own task,
//! is free to call `reset()` in response.

use std::io::{BufRead, BufReader, Write};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use btlink_core::{
    BondState, Device, DeviceAddress, DiscoverySource, ServiceRecord, Socket, SocketStream,
    Transport,
};
use btlink_service::infrastructure::loopback::{DiscoveryBus, LoopbackRadio, LoopbackTransport};
use btlink_service::infrastructure::storage::config::{load_config, AppConfig};
use btlink_service::{ChannelListener, DiscoveryAggregator, LinkEvent, LinkService};

const LOCAL_ADDRESS: &str = "00:11:22:AA:BB:01";
const PEER_ADDRESS: &str = "00:11:22:AA:BB:02";
const BONDED_ADDRESS: &str = "00:11:22:AA:BB:03";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // The log level may come from the config file, so load it first and
    // report any problem once logging is up.
    let (config, config_error) = match load_config() {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.log_level)),
        )
        .init();

    info!("BtLink demo host starting");
    if let Some(e) = config_error {
        warn!("using default configuration: {e}");
    }

    let link_config = config.link_config();
    let local = Device::unbonded(DeviceAddress::parse(LOCAL_ADDRESS)?);
    let peer = Device::unbonded(DeviceAddress::parse(PEER_ADDRESS)?);
    let bonded = Device::new(DeviceAddress::parse(BONDED_ADDRESS)?, BondState::Bonded);

    // ── Loopback radio ────────────────────────────────────────────────────────
    let radio = LoopbackRadio::new();
    let local_adapter = radio.adapter(local.clone());
    let peer_adapter = radio.adapter(peer.clone());
    radio.adapter(bonded);

    // ── Discovery ─────────────────────────────────────────────────────────────
    let bus = Arc::new(DiscoveryBus::new());
    let (found_tx, found_rx) = oneshot::channel();
    let registration = DiscoveryAggregator::register(Arc::clone(&bus) as Arc<dyn DiscoverySource>, move |set| {
        // The receiver only disappears if main is already shutting down.
        let _ = found_tx.send(set);
    });
    radio.scan(local.address(), &bus);
    let discovered = found_rx.await.context("discovery result was not delivered")?;
    drop(registration);
    for device in discovered.into_devices() {
        info!(device = %device, bond = ?device.bond_state(), "discovered pairing candidate");
    }

    // ── Link service ──────────────────────────────────────────────────────────
    let (listener, mut events) = ChannelListener::new(config.events.channel_capacity);
    let service = LinkService::new(
        Arc::new(local_adapter),
        Arc::new(listener),
        Arc::new(echo_lines),
        link_config.clone(),
    );
    service.listen().context("failed to start listening")?;

    // ── Simulated remote peer ─────────────────────────────────────────────────
    let remote = tokio::task::spawn_blocking({
        let radio = radio.clone();
        let target = local.clone();
        let record = link_config.service.clone();
        move || run_peer(&radio, &peer_adapter, &target, &record)
    });

    // ── Event loop ────────────────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    LinkEvent::StateChanged { old, new } => info!("link {old} -> {new}"),
                    LinkEvent::InboundConnection { device } => info!(device = %device, "peer connected"),
                    LinkEvent::ListenFailed { reason } => {
                        error!("listening failed: {reason}");
                        break;
                    }
                    LinkEvent::SessionEnded { device } => {
                        info!(device = %device, "session ended; resetting link");
                        service.reset();
                        break;
                    }
                    other => info!("{other:?}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    service.stop();
    match remote.await {
        Ok(Ok(reply)) => info!("peer received echo: {reply:?}"),
        Ok(Err(e)) => warn!("peer exchange failed: {e}"),
        Err(e) => error!("peer task panicked: {e}"),
    }
    info!(
        "open sockets: {}, open endpoints: {}",
        radio.open_sockets(),
        radio.open_endpoints()
    );
    info!("BtLink demo host stopped");
    Ok(())
}

/// Session pump: echoes every line back until the peer closes.
fn echo_lines(socket: &dyn Socket) {
    let mut reader = BufReader::new(SocketStream::new(socket));
    let mut writer = SocketStream::new(socket);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => return,
            Ok(_) => {
                if let Err(e) = writer.write_all(line.as_bytes()) {
                    warn!("echo write failed: {e}");
                    return;
                }
            }
            Err(e) => {
                info!("session read ended: {e}");
                return;
            }
        }
    }
}

/// Connects to `target`, sends one line and returns the echoed reply.
fn run_peer(
    radio: &LoopbackRadio,
    adapter: &LoopbackTransport,
    target: &Device,
    record: &ServiceRecord,
) -> anyhow::Result<String> {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !radio.is_listening(target.address(), record.uuid) {
        if Instant::now() > deadline {
            anyhow::bail!("{target} never started listening");
        }
        thread::sleep(Duration::from_millis(10));
    }

    let socket = adapter.create_socket(target, record)?;
    socket.connect().context("peer connect")?;
    let mut stream = SocketStream::new(&*socket);
    stream.write_all(b"hello from the inspector peer\n")?;

    let mut reply = String::new();
    BufReader::new(SocketStream::new(&*socket)).read_line(&mut reply)?;
    socket.close()?;
    Ok(reply.trim_end().to_string())
}
