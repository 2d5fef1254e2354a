//! gyre demo server
//!
//! Spawns a game loop group from config, seeds demo entities across the
//! pool, and runs until interrupted.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use gyre::{Component, Entity, GroupConfig};

/// Thread-affine game loop demo server
#[derive(Parser, Debug)]
#[command(name = "gyre-server")]
#[command(about = "Thread-affine game loop demo server", long_about = None)]
struct Args {
    /// Path to a TOML group config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the number of loops
    #[arg(long)]
    loops: Option<usize>,

    /// Override the tick period in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Number of demo entities to register
    #[arg(long, default_value = "16")]
    entities: usize,
}

/// Demo component: counts ticks and logs a heartbeat every few seconds.
#[derive(Default)]
struct Heartbeat {
    owner: String,
    beats: u64,
    since_log: Duration,
}

impl Component for Heartbeat {
    fn on_attach(&mut self, owner: &str) {
        self.owner = owner.to_string();
    }

    fn tick(&mut self, elapse: Duration) {
        self.beats += 1;
        self.since_log += elapse;
        if self.since_log >= Duration::from_secs(5) {
            info!(entity = %self.owner, beats = self.beats, "heartbeat");
            self.since_log = Duration::ZERO;
        }
    }
}

fn main() -> Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(Args::parse()))
}

async fn run(args: Args) -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match &args.config {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            GroupConfig::from_toml(&content)?
        }
        None => GroupConfig::default(),
    };
    if let Some(loops) = args.loops {
        config.loops = Some(loops);
    }
    if let Some(tick_ms) = args.tick_ms {
        config.tick.period_ms = tick_ms;
    }

    let group = config.start();
    info!(
        group = group.id(),
        loops = group.len(),
        period_ms = config.tick.period_ms,
        "group running"
    );

    for n in 0..args.entities {
        let mut entity = Entity::new(format!("demo-{n}"));
        entity.add_component(Heartbeat::default());
        group
            .select_next()
            .submit(move |ctx| ctx.entities_mut().register(entity))?
            .await?;
    }
    info!(entities = args.entities, "demo entities registered");

    let busiest = group
        .select_ranked(|ctx| ctx.entities().entity_count(), |a, b| b.cmp(a), 1)
        .await;
    if let Some(game_loop) = busiest.first() {
        info!(game_loop = game_loop.name(), "busiest loop after seeding");
    }

    info!("press ctrl-c to stop");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;

    info!("shutting down");
    group.shutdown();
    if group.await_termination(Duration::from_secs(10)).await {
        info!("all loops terminated");
        Ok(())
    } else {
        warn!("loops failed to terminate in time");
        anyhow::bail!("shutdown timed out")
    }
}
