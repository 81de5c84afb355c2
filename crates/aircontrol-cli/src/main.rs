//! aircontrol CLI: run the session relay, a direct-connect host, or a bridge.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::path::Path;

use aircontrol_actuation::{DryRunGamepad, GamepadBackend};
use aircontrol_relay::{
    codegen, setup, BridgeOptions, BridgeRuntime, Config, DirectServer, RelayClient, RelayServer,
};
use aircontrol_types::{DeepLink, LayoutKind, PlayerIndex};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "aircontrol",
    about = "Turn phones into game controllers",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the session relay.
    Relay {
        /// Listen port (overrides config).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run a direct-connect host that phones pair with.
    Host {
        /// Listen port (overrides config).
        #[arg(short, long)]
        port: Option<u16>,

        /// Controller layout shown on paired phones.
        #[arg(short, long)]
        layout: Option<LayoutKind>,

        /// Log pad changes instead of creating virtual devices.
        #[arg(long)]
        dry_run: bool,
    },

    /// Join a relay session as a bridge and drive a virtual pad.
    Bridge {
        /// Relay address (host:port).
        #[arg(short, long, default_value = "127.0.0.1:3000")]
        server: String,

        /// Session code shown by the host.
        #[arg(long)]
        code: String,

        /// Name shown to the host.
        #[arg(short, long)]
        name: Option<String>,

        /// Player slot to follow.
        #[arg(short = 'P', long)]
        player: Option<i64>,

        /// Pin a game profile instead of following the session.
        #[arg(long)]
        profile: Option<String>,

        /// Log pad changes instead of creating virtual devices.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print a fresh session code and pairing code.
    Code,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = setup::load_config(cli.config.as_deref().map(Path::new))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    match cli.command {
        Commands::Relay { port } => {
            if let Some(port) = port {
                config.relay.port = port;
            }
            run_relay(&config).await?;
        }
        Commands::Host {
            port,
            layout,
            dry_run,
        } => {
            if let Some(port) = port {
                config.direct.port = port;
            }
            if let Some(layout) = layout {
                config.direct.layout = layout;
            }
            if dry_run {
                run_host(&config, DryRunGamepad::new()).await?;
            } else {
                run_host(&config, native_backend()?).await?;
            }
        }
        Commands::Bridge {
            server,
            code,
            name,
            player,
            profile,
            dry_run,
        } => {
            let player = player.map(PlayerIndex::new).transpose()?;
            let options = BridgeOptions { code, name, player };
            if dry_run {
                run_bridge(&config, &server, options, profile, DryRunGamepad::new()).await?;
            } else {
                run_bridge(&config, &server, options, profile, native_backend()?).await?;
            }
        }
        Commands::Code => {
            let mut rng = fastrand::Rng::new();
            println!("Session code: {}", codegen::session_code(&mut rng, |_| false));
            println!("Pairing code: {}", codegen::pairing_code(&mut rng));
        }
    }

    Ok(())
}

#[cfg(all(target_os = "linux", feature = "linux"))]
fn native_backend() -> anyhow::Result<aircontrol_actuation::linux::UinputGamepad> {
    Ok(aircontrol_actuation::linux::UinputGamepad::new())
}

#[cfg(not(all(target_os = "linux", feature = "linux")))]
fn native_backend() -> anyhow::Result<DryRunGamepad> {
    anyhow::bail!("this build has no virtual gamepad driver; pass --dry-run")
}

async fn run_relay(config: &Config) -> anyhow::Result<()> {
    let catalog = setup::load_catalog(config.catalog.path.as_deref().map(Path::new));
    let server = RelayServer::bind(&config.relay, catalog).await?;
    println!("Relay listening on {}", server.local_addr()?);

    let handle = server.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.shutdown().await;
        }
    });

    server.run().await?;
    Ok(())
}

async fn run_host<B: GamepadBackend>(config: &Config, backend: B) -> anyhow::Result<()> {
    let server = DirectServer::bind(&config.direct, backend).await?;
    let port = server.local_addr()?.port();
    let link = DeepLink::new(
        config.direct.scheme.clone(),
        lan_ip().to_string(),
        port,
        server.code().clone(),
    );
    println!("Pairing code: {}", server.code());
    println!("Deep link:    {link}");

    let handle = server.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            if let Ok(status) = handle.status().await {
                tracing::info!(controllers = status.controllers.len(), "stopping host");
            }
            handle.shutdown().await;
        }
    });

    server.run().await?;
    Ok(())
}

async fn run_bridge<B: GamepadBackend>(
    config: &Config,
    server: &str,
    options: BridgeOptions,
    profile: Option<String>,
    backend: B,
) -> anyhow::Result<()> {
    let locked = match profile {
        Some(id) => {
            let catalog = setup::load_catalog(config.catalog.path.as_deref().map(Path::new));
            let found = catalog
                .profile(&id)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("unknown profile '{id}'"))?;
            Some(found)
        }
        None => None,
    };

    let client = RelayClient::connect(server, config.relay.ack_timeout()).await?;
    tracing::info!(server, code = %options.code, "bridge connecting");

    let runtime = BridgeRuntime::new(backend, locked);
    tokio::select! {
        exit = runtime.run(client, options) => {
            let exit = exit?;
            tracing::info!(?exit, "bridge stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
        }
    }
    Ok(())
}

/// Best guess at the address phones on the same network can reach.
///
/// Connecting a UDP socket sends nothing; it only asks the OS which local
/// interface routes outward.
fn lan_ip() -> IpAddr {
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect((Ipv4Addr::new(192, 168, 0, 1), 9))?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .ok()
        .filter(|ip| !ip.is_unspecified())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
