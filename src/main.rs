use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use grovekeeper::{
    AppConfig, ControlResponse, GridKind, Nursery, RemapRequest, SchemaReport, ensure_schema,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "grovekeeper")]
#[command(about = "Back-office jobs for the nursery tracker")]
struct Cli {
    /// Overrides DATABASE_URL
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Overrides LIFE_UPDATE_HOUR
    #[arg(long, global = true)]
    hour: Option<u32>,

    /// Overrides LIFE_UPDATE_MINUTE
    #[arg(long, global = true)]
    minute: Option<u32>,

    /// Overrides LIFE_UPDATE_CRON
    #[arg(long, global = true)]
    cron: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create or patch the schema
    Init,
    /// Run the life update once
    RunNow,
    /// Run the scheduler until interrupted
    Serve,
    /// Show persisted run records
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Clone trees from one dome into another
    Remap {
        #[arg(long)]
        from: i64,
        #[arg(long)]
        to: i64,
        /// Only these trees (default: the whole dome)
        #[arg(long, value_delimiter = ',')]
        ids: Vec<i64>,
        #[arg(long, default_value_t = 0)]
        row_offset: i64,
        #[arg(long, default_value_t = 0)]
        col_offset: i64,
    },
    /// Show grid settings
    Settings {
        #[arg(value_enum)]
        kind: GridArg,
        #[arg(long)]
        farm: Option<i64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum GridArg {
    Farm,
    Dome,
}

impl From<GridArg> for GridKind {
    fn from(arg: GridArg) -> Self {
        match arg {
            GridArg::Farm => GridKind::Farm,
            GridArg::Dome => GridKind::Dome,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env().context("failed to load configuration")?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }
    if let Some(hour) = cli.hour {
        config.update_hour = hour;
    }
    if let Some(minute) = cli.minute {
        config.update_minute = minute;
    }
    if cli.cron.is_some() {
        config.update_cron = cli.cron;
    }

    let open = || Nursery::open(&config);
    let response = match cli.command {
        Command::Init => init(&config).await?,
        Command::RunNow => open().await?.control().run_now().await,
        Command::Serve => return serve(&open().await?).await,
        Command::History { limit } => match open().await?.run_log().recent(limit).await {
            Ok(runs) => ControlResponse::ok(runs),
            Err(err) => ControlResponse::err(err),
        },
        Command::Remap {
            from,
            to,
            ids,
            row_offset,
            col_offset,
        } => {
            let nursery = open().await?;
            let trees = nursery.trees();
            let sources = if ids.is_empty() {
                trees.list_in_dome(from).await
            } else {
                trees.load(&ids).await.map(|found| {
                    found.into_iter().filter(|t| t.dome_id == from).collect()
                })
            }
            .context("failed to load source trees")?;

            let request = RemapRequest::new(sources, to).offset(row_offset, col_offset);
            nursery.control().remap(&request).await
        }
        Command::Settings { kind, farm } => {
            ControlResponse::ok(open().await?.grid_settings().load(kind.into(), farm).await)
        }
    };

    print_response(&response)?;
    if !response.success {
        std::process::exit(1);
    }
    Ok(())
}

async fn init(config: &AppConfig) -> Result<ControlResponse> {
    let gateway = grovekeeper::Gateway::from_url(&config.database_url)?;
    let mut conn = gateway.connect().await?;
    let report: SchemaReport = ensure_schema(&mut conn).await?;
    conn.close().await?;

    if report.is_unchanged() {
        info!("schema already up to date");
    }
    Ok(ControlResponse::ok(serde_json::json!({
        "created_tables": report.created_tables,
        "added_columns": report.added_columns,
    })))
}

async fn serve(nursery: &Nursery) -> Result<()> {
    let control = nursery.control();
    print_response(&control.start().await)?;

    shutdown_signal().await;
    info!("shutdown requested");

    print_response(&control.stop().await)
}

fn print_response(response: &ControlResponse) -> Result<()> {
    let rendered = serde_json::to_string_pretty(&response.to_json())
        .context("failed to render response")?;
    println!("{rendered}");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("grovekeeper=info,sqlx=warn")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install Ctrl+C signal handler");
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
                error!(error = %err, "unable to install SIGTERM handler");
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
