//! originsim CLI — run a load-balancing simulation and write its CSV bank.

use anyhow::Context;
use clap::Parser;
use originsim_balancers::{build_chain, Balancer};
use originsim_core::{simulator, write_servers_csv, StatsSink};
use originsim_model::events::FEEDBACK_CAPACITY;
use originsim_model::server::init_servers;
use originsim_model::{Config, EventSink, SimRng};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "originsim",
    about = "Discrete-event simulation of load balancing for streaming origin servers",
    version
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long = "cfg", default_value = "./config/default.yaml")]
    cfg: PathBuf,
    /// Output directory for the CSV bank.
    #[arg(long = "out", default_value = "./csv")]
    out: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let cfg = Config::from_file(&cli.cfg)
        .with_context(|| format!("loading config from {}", cli.cfg.display()))?;
    let cfg = Arc::new(cfg);
    tracing::info!(
        seed = cfg.simulation.seed,
        strategy = %cfg.balancer.strategy,
        servers = cfg.cluster.servers,
        "configuration loaded",
    );

    let rng = Arc::new(SimRng::new(cfg.simulation.seed));
    let (rtt_tx, rtt_rx) = crossbeam_channel::bounded(FEEDBACK_CAPACITY);
    let servers = init_servers(&cfg, &rng, &rtt_tx).context("initialising servers")?;
    write_servers_csv(&servers, &cli.out)
        .with_context(|| format!("writing servers.csv under {}", cli.out.display()))?;

    let balancer: Arc<dyn Balancer> =
        Arc::from(build_chain(&cfg, &servers, &rng, &rtt_rx).context("building balancer chain")?);
    let sink = Arc::new(StatsSink::new(servers.len(), &cli.out).context("opening csv bank")?);

    simulator::run(
        Arc::clone(&cfg),
        servers,
        balancer,
        rng,
        Arc::clone(&sink) as Arc<dyn EventSink>,
    )
    .context("running simulation")?;

    sink.close().context("closing statistics sink")?;
    tracing::info!(out = %cli.out.display(), "done");
    Ok(())
}
