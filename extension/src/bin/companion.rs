use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::channel::mpsc;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pet_companion::background::Background;
use pet_companion::bus::{self, Broadcaster, Endpoint};
use pet_companion::config::ExtensionConfig;
use pet_companion::content::{ContentInputs, ContentScript, PageEvent};
use pet_companion::orbit::TracingSurface;
use pet_companion::popup::PopupController;
use pet_companion::services::backend::{HttpBackend, PetBackend};
use pet_companion::services::storage::{FileStore, SharedStore};
use pet_companion::types::{ConfigPatch, OrbitMode};

#[derive(Parser)]
#[command(name = "companion")]
#[command(about = "Headless pet companion host", long_about = None)]
struct Cli {
    /// Config file (default: $CONFIG_PATH, then companion.toml)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run background and content script until Ctrl+C
    Run {
        /// Sui address to select and fetch before rendering
        #[arg(long)]
        address: Option<String>,

        /// Pet id (default: the owner's first pet)
        #[arg(long)]
        pet: Option<String>,
    },

    /// Re-fetch pet data for the stored address and pet
    Fetch,

    /// List the pets owned by an address
    Pets {
        #[arg(long)]
        address: String,
    },

    /// Show or edit the orbit playlist
    Playlist {
        #[command(subcommand)]
        action: PlaylistAction,
    },

    /// Show or hide the companion
    Toggle,

    /// Print the stored state as JSON
    Status,
}

#[derive(Subcommand)]
enum PlaylistAction {
    List,

    /// Append an equipped asset
    Add { id: String },

    Remove { id: String },

    /// Change display settings of an entry
    Edit {
        id: String,

        #[arg(long, value_enum)]
        mode: Option<Mode>,

        /// Seconds on screen
        #[arg(long)]
        duration: Option<u32>,

        #[arg(long)]
        frame_size: Option<u32>,

        #[arg(long)]
        frame_count: Option<u32>,

        #[arg(long)]
        frame_rate: Option<u32>,

        /// Cells per sprite-sheet row
        #[arg(long)]
        columns: Option<u32>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Static,
    Animated,
}

impl From<Mode> for OrbitMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Static => OrbitMode::Static,
            Mode::Animated => OrbitMode::Animated,
        }
    }
}

/// Store, background and the runtime channel shared by every command.
struct Host {
    config: ExtensionConfig,
    store: Arc<FileStore>,
    broadcaster: Broadcaster,
    background: Arc<Background<HttpBackend>>,
    runtime: Endpoint,
}

impl Host {
    async fn start(config: ExtensionConfig) -> Result<Self> {
        let store = Arc::new(
            FileStore::open(&config.store.path)
                .await
                .context(format!("Failed to open store: {}", config.store.path))?,
        );
        let broadcaster = Broadcaster::new();
        let background = Arc::new(Background::new(
            store.clone(),
            HttpBackend::from_config(&config.backend)?,
            broadcaster.clone(),
        ));

        let (runtime, inbox) = bus::channel("runtime");
        tokio::spawn(background.clone().serve(inbox));

        Ok(Self {
            config,
            store,
            broadcaster,
            background,
            runtime,
        })
    }

    async fn popup(&self) -> Result<PopupController<HttpBackend>> {
        let popup = PopupController::open(
            self.store.clone(),
            self.runtime.clone(),
            HttpBackend::from_config(&self.config.backend)?,
        )
        .await?;
        Ok(popup)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;

    match cli.command {
        Commands::Run { address, pet } => run(Host::start(config).await?, address, pet).await,
        Commands::Fetch => fetch(Host::start(config).await?).await,
        Commands::Pets { address } => pets(&config, &address).await,
        Commands::Playlist { action } => playlist(Host::start(config).await?, action).await,
        Commands::Toggle => toggle(Host::start(config).await?).await,
        Commands::Status => status(Host::start(config).await?).await,
    }
}

fn load_config(path: Option<String>) -> Result<ExtensionConfig> {
    let path = path
        .or_else(|| std::env::var("CONFIG_PATH").ok())
        .unwrap_or_else(|| "companion.toml".to_string());

    let config = if Path::new(&path).exists() {
        tracing::info!("Loading configuration from: {}", path);
        ExtensionConfig::load(&path)?
    } else {
        tracing::info!("No config at {}, using defaults", path);
        ExtensionConfig::default()
    };
    config.validate()?;
    Ok(config)
}

async fn run(host: Host, address: Option<String>, pet: Option<String>) -> Result<()> {
    let (page_events, page) = mpsc::unbounded();
    let (_tab, tab) = bus::channel("tab");
    let content = ContentScript::new(
        TracingSurface::default(),
        host.config.companion.clone(),
        host.store.clone(),
        host.runtime.clone(),
    )?;
    let inputs = ContentInputs {
        page,
        tab,
        broadcasts: host.broadcaster.subscribe(),
    };
    let page_task = tokio::spawn(content.run(true, inputs));

    match address {
        Some(address) => {
            let mut popup = host.popup().await?;
            popup.set_address(&address).await;
            if let Some(pet) = &pet {
                popup.select_pet(pet);
            }
            popup.save_and_fetch().await?;
            if let Some(e) = &popup.state().error {
                tracing::error!("Fetch failed: {}", e);
            }
        }
        None => host.background.startup_refresh().await,
    }

    tracing::info!("Companion running, press Ctrl+C to stop");
    shutdown_signal().await;

    let _ = page_events.unbounded_send(PageEvent::Unload);
    page_task.await.context("Content script task failed")??;
    Ok(())
}

async fn fetch(host: Host) -> Result<()> {
    let mut popup = host.popup().await?;
    popup.refresh().await?;

    let state = popup.state();
    if let Some(e) = &state.error {
        anyhow::bail!("Refresh failed: {}", e);
    }
    if let Some(data) = &state.pet_data {
        println!("{} ({}): {} equipped assets", data.pet.name, data.pet.id, data.assets.len());
        for asset in &data.assets {
            println!("  {}\t{}", asset.id, asset.name);
        }
    }
    Ok(())
}

async fn pets(config: &ExtensionConfig, address: &str) -> Result<()> {
    let backend = HttpBackend::from_config(&config.backend)?;
    let pets = backend.fetch_pet_list(address).await?;

    if pets.is_empty() {
        println!("No pets found for {}", address);
    }
    for pet in pets {
        println!("{}\t{}", pet.id, pet.name);
    }
    Ok(())
}

async fn playlist(host: Host, action: PlaylistAction) -> Result<()> {
    let mut popup = host.popup().await?;

    match action {
        PlaylistAction::List => {
            println!("{}", serde_json::to_string_pretty(&popup.state().playlist)?);
        }
        PlaylistAction::Add { id } => {
            if !popup.add_to_playlist(&id).await? {
                anyhow::bail!("Asset {} is not equipped or already in the playlist", id);
            }
            println!("Added {}", id);
        }
        PlaylistAction::Remove { id } => {
            if !popup.remove_from_playlist(&id).await? {
                anyhow::bail!("Asset {} is not in the playlist", id);
            }
            println!("Removed {}", id);
        }
        PlaylistAction::Edit {
            id,
            mode,
            duration,
            frame_size,
            frame_count,
            frame_rate,
            columns,
        } => {
            let patch = ConfigPatch {
                mode: mode.map(OrbitMode::from),
                duration,
                frame_size,
                frame_count,
                frame_rate,
                columns,
            };
            if patch.is_empty() {
                anyhow::bail!("Nothing to change");
            }
            if !popup.edit_entry(&id, &patch).await? {
                anyhow::bail!("Asset {} is not in the playlist", id);
            }
            println!("Updated {}", id);
        }
    }
    Ok(())
}

async fn toggle(host: Host) -> Result<()> {
    let mut popup = host.popup().await?;
    let visible = popup.toggle_visibility().await?;
    println!("Companion {}", if visible { "visible" } else { "hidden" });
    Ok(())
}

async fn status(host: Host) -> Result<()> {
    let snapshot = host.store.snapshot().await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, stopping companion");
}
