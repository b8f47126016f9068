//! devbridge host: entry point.
//!
//! Runs the host service headless: an in-memory USB host with an optional
//! simulated device, the loopback backend, and a client context that logs
//! the web-view scripts it would evaluate.  Useful for exercising the whole
//! call path and the configuration without hardware.
//!
//! # Usage
//!
//! ```text
//! devbridge-host [OPTIONS]
//!
//! Options:
//!   --storage-dir <DIR>     Backend storage directory [default: ./devbridge-data]
//!   --log-level <LEVEL>     Overrides `[bridge] log_level` from the config
//!   --simulate-device       Attach a simulated, permitted device at startup
//!   --write-default-config  Write devbridge.toml with defaults if absent
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable                   | Description                    |
//! |----------------------------|--------------------------------|
//! | `DEVBRIDGE_STORAGE_DIR`    | Backend storage directory      |
//! | `DEVBRIDGE_LOG_LEVEL`      | Log level override             |
//! | `RUST_LOG`                 | Full `tracing` filter; wins over both |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use devbridge_core::BackendLauncher;
use devbridge_host::application::connectivity_monitor::NetworkProbe;
use devbridge_host::application::usb_host::UsbHost;
use devbridge_host::infrastructure::backend::loopback::LoopbackLauncher;
use devbridge_host::infrastructure::network::mock::MockNetworkProbe;
use devbridge_host::infrastructure::platform::headless::HeadlessPlatform;
use devbridge_host::infrastructure::service::{HostAdapters, HostService};
use devbridge_host::infrastructure::storage::config::{
    config_file_path, load_config, save_config, BridgeConfig,
};
use devbridge_host::infrastructure::ui_bridge::ScriptHandler;
use devbridge_host::infrastructure::usb::mock::{supported_descriptor, MockUsbHost};

const PING_QUERY: &str = r#"{"method":"GET","endpoint":"ping","body":""}"#;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// devbridge headless host.
#[derive(Debug, Parser)]
#[command(name = "devbridge-host", about = "Headless devbridge host service", version)]
struct Cli {
    /// Directory handed to the backend for its persistent state.  The host's
    /// own `devbridge.toml` lives here too.
    #[arg(long, default_value = "./devbridge-data", env = "DEVBRIDGE_STORAGE_DIR")]
    storage_dir: PathBuf,

    /// `tracing` level overriding the configured one.
    #[arg(long, env = "DEVBRIDGE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Attach a simulated device with permission already granted.
    #[arg(long)]
    simulate_device: bool,

    /// Write the default configuration file if none exists.
    #[arg(long)]
    write_default_config: bool,
}

impl Cli {
    /// Loads the configuration from the storage directory, writing the
    /// defaults first when asked to.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if writing the default file fails.
    fn load_config(&self) -> anyhow::Result<BridgeConfig> {
        let path = config_file_path(&self.storage_dir);
        if self.write_default_config && !path.exists() {
            save_config(&self.storage_dir, &BridgeConfig::default())
                .with_context(|| format!("writing default config to {}", path.display()))?;
        }
        load_config(&self.storage_dir)
            .with_context(|| format!("loading config from {}", path.display()))
    }

    /// The filter used when `RUST_LOG` is not set.
    fn default_filter(&self, config: &BridgeConfig) -> String {
        self.log_level.clone().unwrap_or_else(|| config.bridge.log_level.clone())
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments are parsed and the configuration is loaded.
/// 2. `tracing_subscriber` is initialised.  `RUST_LOG` wins; otherwise the
///    CLI or configured level is used.
/// 3. The [`HostService`] is wired and started.
/// 4. A ping call is issued; its response reaches the client context.
/// 5. Client events are delivered until Ctrl+C, then the service shuts down.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    let default_filter = cli.default_filter(&config);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter)),
        )
        .init();

    info!(
        storage = %cli.storage_dir.display(),
        vendor_id = format_args!("{:#06x}", config.device.vendor_id),
        product_id = format_args!("{:#06x}", config.device.product_id),
        "devbridge host starting"
    );

    // ── Host adapters ─────────────────────────────────────────────────────────
    let usb_host = Arc::new(MockUsbHost::new());
    if cli.simulate_device {
        usb_host.attach(supported_descriptor("simulated-0"), true);
    }
    let adapters = HostAdapters {
        usb_host: usb_host as Arc<dyn UsbHost>,
        network_probe: Some(Arc::new(MockNetworkProbe::default()) as Arc<dyn NetworkProbe>),
        platform: Arc::new(HeadlessPlatform::new(cli.storage_dir.join("exports"))),
        launcher: Arc::new(LoopbackLauncher::new()) as Arc<dyn BackendLauncher>,
    };

    let (service, mut client) =
        HostService::new(&cli.storage_dir, config, adapters, tokio::runtime::Handle::current());
    client.attach_handler(Box::new(ScriptHandler::new(|script| {
        info!(%script, "client script");
    })));

    service.start().context("starting backend")?;
    service.call(1, PING_QUERY).context("issuing ping call")?;

    // ── Client loop ───────────────────────────────────────────────────────────
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => info!("received Ctrl+C; shutting down"),
                    Err(e) => warn!("failed to listen for Ctrl+C signal: {e}"),
                }
                break;
            }
            delivered = client.deliver_next() => {
                if !delivered {
                    break;
                }
            }
        }
    }

    let report = service.shutdown();
    if !report.abandoned_queries.is_empty() {
        warn!(queries = ?report.abandoned_queries, "calls left unanswered");
    }
    info!("devbridge host stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
