use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use drive_sftp_relay::config::RelayConfig;
use drive_sftp_relay::infrastructure::stores::{Stores, setup_stores};
use drive_sftp_relay::services::diagnostics::check_accounts;
use drive_sftp_relay::services::orchestrator::Orchestrator;
use drive_sftp_relay::services::staging_sweeper::StagingSweeper;
use drive_sftp_relay::{AppState, create_app};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port for the API server
    #[arg(short, long, default_value_t = 5000)]
    port: u16,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the spreadsheet's sheets and the account rows, then exit
    CheckAccounts,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drive_sftp_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RelayConfig::from_env();
    let stores = setup_stores(&config)?;

    match args.command {
        Some(Command::CheckAccounts) => run_check_accounts(&config, &stores).await,
        None => serve(args.port, config, stores).await,
    }
}

async fn run_check_accounts(config: &RelayConfig, stores: &Stores) -> anyhow::Result<()> {
    info!("🔍 Checking account sheet '{}'...", config.account_sheet);
    let report = check_accounts(
        stores.tabular.as_ref(),
        &config.account_sheet,
        &config.account_columns,
    )
    .await?;

    println!("Sheets:");
    for title in &report.sheet_titles {
        println!("  - {}", title);
    }
    println!("{}:", config.account_sheet);
    println!("  {}", report.header.join(" | "));
    for row in &report.rows {
        println!("  {}", row.join(" | "));
    }
    info!("✅ {} account rows", report.rows.len());
    Ok(())
}

async fn serve(port: u16, config: RelayConfig, stores: Stores) -> anyhow::Result<()> {
    info!("🚀 Starting Drive SFTP relay...");
    info!(
        "🔁 Retry: {} attempts, {:?} {:?}; verify upload: {}; delete source: {}",
        config.retry.max_attempts,
        config.retry.delay,
        config.retry.backoff,
        config.verify_upload,
        config.delete_source_after_upload
    );

    let orchestrator = Arc::new(Orchestrator::from_config(
        &config,
        stores.tabular,
        stores.files,
        stores.connector,
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let sweeper = StagingSweeper::new(
        config.staging_dir.clone(),
        Duration::from_secs(config.staging_cleanup_age_hours * 3600),
        config.staging_sweep_interval,
        shutdown_rx,
    );
    let sweeper_handle = tokio::spawn(sweeper.run());

    let state = AppState {
        orchestrator,
        config,
    };

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>, latency: Duration, _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    let app = create_app(state).layer(trace_layer);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ Relay listening on: http://0.0.0.0:{}", port);
    info!("📖 Swagger UI documentation: http://localhost:{}/swagger-ui", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    if let Err(e) = sweeper_handle.await {
        error!("❌ Staging sweeper ended abnormally: {}", e);
    }

    info!("👋 Relay exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
