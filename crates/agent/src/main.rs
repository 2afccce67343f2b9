use std::net::SocketAddr;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use simdock_agent::client::DispatcherClient;
use simdock_agent::config::AgentConfig;
use simdock_agent::supervisor::Supervisor;
use simdock_agent::{control, machine, recovery};

#[derive(Parser, Debug)]
#[command(name = "simdock-agent", version)]
#[command(about = "Worker daemon that books and supervises simulations")]
struct Args {
    /// Start paused: recover interrupted work but book nothing new
    /// until booking is resumed.
    #[arg(long)]
    paused: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "simdock_agent=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "agent starting");

    let cfg = AgentConfig::from_env();

    let machine_id = match machine::machine_id(&cfg.sims_root) {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(error = %e, "failed to resolve machine id");
            std::process::exit(1);
        }
    };
    tracing::info!(
        machine_id = %machine_id,
        dispatcher = %cfg.dispatcher_url,
        max_simulations = cfg.max_simulations,
        "agent configured",
    );

    if let Err(e) = tokio::fs::create_dir_all(cfg.simulations_dir()).await {
        tracing::error!(error = %e, "failed to create simulations directory");
        std::process::exit(1);
    }

    let client = DispatcherClient::new(cfg.command_url.clone(), machine_id);
    let listen_port = cfg.listen_port;
    let supervisor = Supervisor::new(cfg, client, args.paused);

    // Control surface.
    let control_app = control::router(supervisor.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], listen_port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "failed to bind control listener");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, "control surface listening");
    let control_token = supervisor.shutdown.clone();
    tokio::spawn(async move {
        let server = axum::serve(listener, control_app)
            .with_graceful_shutdown(async move { control_token.cancelled().await });
        if let Err(e) = server.await {
            tracing::error!(error = %e, "control server failed");
        }
    });

    // Signals drive the same shutdown token as /Shutdown.
    let signal_token = supervisor.shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received interrupt; shutting down");
            signal_token.cancel();
        }
    });

    if args.paused {
        tracing::info!("starting in paused mode; will not book until resumed");
    }

    // Converge on-disk state with the dispatcher before taking new work.
    if let Err(e) = recovery::rebuild(&supervisor).await {
        tracing::error!(error = %e, "failed to rebuild simulation list");
        std::process::exit(1);
    }
    tracing::info!("recovery pass complete");

    supervisor.run().await;
    tracing::info!("agent stopped");
}
