use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Result;
use clap::Parser;
use futures::StreamExt;
use tracing::{debug, error, info};
use trapcam_agent::{Agent, MonotonicClock};
use trapcam_camera::source_from_config;
use trapcam_network::{LinkState, ReqwestTransport, TcpLink};
use trapcam_ops::{init_tracing, EventFeed};
use trapcam_types::{
    config::{
        CameraBackend, CameraConfig, LinkConfig, NetworkConfig, OpsConfig, TimingConfig,
        TrapcamConfig,
    },
    image::CapturePreset,
};

#[derive(Debug, Parser)]
#[command(name = "trapcam", about = "Remotely directed camera capture agent")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "TRAPCAM_CONFIG", default_value = "configs/dev.toml")]
    config: PathBuf,

    /// Force debug logging regardless of the config file.
    #[arg(long)]
    debug: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.config);
    if cli.debug {
        config.ops.debug = true;
        config.ops.log_level = None;
    }
    init_tracing(&config.ops)?;

    let link_state = LinkState::new(false);
    let transport = ReqwestTransport::new(config.network.http_timeout(), link_state.clone());
    let link = TcpLink::new(&config.network.base_url, config.link.clone(), link_state)?;
    let source = source_from_config(&config.camera);
    let feed = EventFeed::new(256);
    spawn_event_logger(&feed);

    let restart_delay = Duration::from_millis(config.timing.restart_delay_ms);
    let mut agent = Agent::new(
        config,
        source,
        transport,
        link,
        Box::new(MonotonicClock::new()),
        feed,
    );

    if let Err(err) = agent.boot().await {
        error!("{err}");
        error!("Restarting in {} ms", restart_delay.as_millis());
        tokio::time::sleep(restart_delay).await;
        std::process::exit(1);
    }

    info!("Agent ready");
    agent.run().await;
    Ok(())
}

fn spawn_event_logger(feed: &EventFeed) {
    let mut events = feed.subscribe();
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match serde_json::to_string(&event) {
                Ok(line) => debug!(target: "trapcam::events", "{line}"),
                Err(err) => debug!(target: "trapcam::events", "unserialisable event: {err}"),
            }
        }
    });
}

fn load_config(path: &Path) -> TrapcamConfig {
    match TrapcamConfig::from_file(path) {
        Ok(cfg) => {
            if let Err(err) = cfg.validate() {
                eprintln!(
                    "Invalid config in '{}': {err}. Falling back to internal defaults.",
                    path.display()
                );
                default_config()
            } else {
                cfg
            }
        }
        Err(err) => {
            eprintln!(
                "Failed to load config from '{}': {err}. Falling back to internal defaults.",
                path.display()
            );
            default_config()
        }
    }
}

fn default_config() -> TrapcamConfig {
    let config = TrapcamConfig {
        network: NetworkConfig {
            base_url: "http://127.0.0.1:3001".into(),
            device_id: "cam-01".into(),
            api_token: None,
            http_timeout_ms: 5_000,
            max_upload_bytes: None,
        },
        link: LinkConfig::default(),
        camera: CameraConfig {
            backend: CameraBackend::Synthetic,
            device: "/dev/video0".into(),
            snapshot_path: "/tmp/trapcam_snapshot.jpg".into(),
            capture: CapturePreset::capture(),
            stream: CapturePreset::stream(),
        },
        timing: TimingConfig::default(),
        ops: OpsConfig::default(),
    };
    debug_assert!(config.validate().is_ok());
    config
}
