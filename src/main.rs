use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use trackdb::web::{AppState, build_router};
use trackdb::{
    QueryService, RecordStore, RegistryConfig, TrackedObjectRecord, open_row_store,
    put_with_retry, record_store,
};

#[derive(Parser)]
#[command(name = "trackdb")]
#[command(about = "Tracked-object registry with embedded vision training state")]
struct Cli {
    /// Directory for the write-ahead log and snapshots; in-memory when unset
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Partition (tenant) holding the tracked objects
    #[arg(long, global = true)]
    partition: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API
    Serve {
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Upsert records from a JSON array file
    Import { file: PathBuf },
    /// Print the number of readable records
    Count,
    /// Print one record as JSON
    Find { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = RegistryConfig::from_env().context("failed to load configuration")?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = Some(data_dir);
    }
    if let Some(partition) = cli.partition {
        config
            .set_partition_key(partition)
            .context("invalid --partition")?;
    }

    let rows = open_row_store(&config).context("failed to open row store")?;
    let store = record_store(rows, &config);

    match cli.command {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            serve(store, &config).await
        }
        Command::Import { file } => import(&store, &config, &file).await,
        Command::Count => {
            let summary = QueryService::new(store)
                .count_all_with_diagnostics()
                .await
                .context("count failed")?;
            if summary.corrupt_rows > 0 {
                warn!(corrupt_rows = summary.corrupt_rows, "some rows could not be decoded");
            }
            println!("{}", summary.records);
            Ok(())
        }
        Command::Find { name } => {
            let found = QueryService::new(store)
                .find_by_name(&name)
                .await
                .context("find failed")?;
            match found {
                Some(record) => {
                    println!("{}", serde_json::to_string_pretty(&record)?);
                    Ok(())
                }
                None => Err(anyhow!("no tracked object named '{}'", name)),
            }
        }
    }
}

async fn serve(store: RecordStore, config: &RegistryConfig) -> Result<()> {
    let state = AppState::new(QueryService::new(store), config.retry);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    info!(
        bind_addr = %config.bind_addr,
        partition = %config.partition_key,
        durable = config.data_dir.is_some(),
        "registry API started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn import(store: &RecordStore, config: &RegistryConfig, file: &Path) -> Result<()> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read '{}'", file.display()))?;
    let records: Vec<TrackedObjectRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("'{}' is not a JSON array of records", file.display()))?;

    let mut imported = 0usize;
    for record in &records {
        put_with_retry(store, record, &config.retry)
            .await
            .with_context(|| format!("failed to store '{}'", record.name))?;
        imported += 1;
    }

    info!(imported, file = %file.display(), "import complete");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("trackdb=debug,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install ctrl+c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install sigterm handler");
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
}
