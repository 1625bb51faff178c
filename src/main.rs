use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use http_body_util::Full;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use prometheus::Encoder;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use session_auth::auth::password::{DEFAULT_BCRYPT_COST, MAX_BCRYPT_COST, MIN_BCRYPT_COST};
use session_auth::auth::{
    BcryptHasher, FjallUserStore, MemorySessionStore, MemoryUserStore, UserStore,
};
use session_auth::inspect::{disk_space, num_users};
use session_auth::metrics::SharedMetrics;
use session_auth::{AuthService, CookieConfig};

#[derive(Parser)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser, Debug)]
pub struct ServerConfig {
    #[arg(long, env = "SESSION_AUTH_HOST", default_value = "localhost")]
    host: String,

    #[arg(long, env = "SESSION_AUTH_PORT", default_value = "8080")]
    port: u16,

    #[arg(long, env = "SESSION_AUTH_METRIC_HOST", default_value = "localhost")]
    metric_host: String,

    #[arg(long, env = "SESSION_AUTH_METRIC_PORT", default_value = "9100")]
    metric_port: u16,

    #[arg(
        long,
        env = "SESSION_AUTH_DATA_DIR",
        default_value = ".",
        help = "Directory holding the user database"
    )]
    data_dir: PathBuf,

    #[arg(
        long,
        env = "SESSION_AUTH_IN_MEMORY",
        help = "Keep users in memory only (lost on restart)"
    )]
    in_memory: bool,

    #[arg(long, env = "SESSION_AUTH_BCRYPT_COST", default_value_t = DEFAULT_BCRYPT_COST)]
    bcrypt_cost: u32,

    #[arg(long, env = "SESSION_AUTH_SESSION_LIFETIME_SECS", default_value = "86400")]
    session_lifetime_secs: u64,

    #[arg(
        long,
        env = "SESSION_AUTH_COOKIE_SECURE",
        help = "Mark the session cookie Secure (serve behind HTTPS)"
    )]
    cookie_secure: bool,

    #[arg(
        long,
        default_value = "info",
        help = "Log level (error, warn, info, debug, trace). Can also be set via RUST_LOG env var"
    )]
    log_level: String,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inspect the user database
    Inspect {
        #[arg(long, default_value = ".")]
        data_dir: PathBuf,

        #[command(subcommand)]
        command: InspectCommand,
    },

    /// Start the auth server
    Server(ServerConfig),
}

#[derive(Debug, Subcommand)]
pub enum InspectCommand {
    /// Number of registered users
    NumUsers,
    DiskSpace,
}

fn setup_tracing(log_level: &str) {
    // Try to use RUST_LOG env var first, fall back to CLI flag
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| {
            eprintln!("Invalid log level '{}', falling back to 'info'", log_level);
            EnvFilter::new("info")
        });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let log_level = match &cli.command {
        Command::Server(config) => config.log_level.as_str(),
        _ => "info",
    };

    setup_tracing(log_level);

    match cli.command {
        Command::Inspect { command, data_dir } => match command {
            InspectCommand::NumUsers => {
                let num_users = num_users(&data_dir).await?;
                println!("Number of users: {num_users}");
            }
            InspectCommand::DiskSpace => {
                let disk_space = disk_space(&data_dir)?;
                println!("Disk space: {disk_space}");
            }
        },
        Command::Server(config) => run(config).await?,
    }
    Ok(())
}

async fn run(args: ServerConfig) -> Result<()> {
    if !BcryptHasher::is_valid_cost(args.bcrypt_cost) {
        anyhow::bail!(
            "--bcrypt-cost must be between {} and {}",
            MIN_BCRYPT_COST,
            MAX_BCRYPT_COST
        );
    }

    let metrics = SharedMetrics::new();

    let user_store: Arc<dyn UserStore> = if args.in_memory {
        info!("Using in-memory user store; accounts are lost on restart");
        Arc::new(MemoryUserStore::new())
    } else {
        info!(data_dir = %args.data_dir.display(), "Opening user database");
        Arc::new(FjallUserStore::open(&args.data_dir)?)
    };

    let user_count = user_store.count_users().await?;
    info!("Found {} user(s) in database", user_count);

    let session_lifetime = Duration::from_secs(args.session_lifetime_secs);
    let session_store = Arc::new(MemorySessionStore::with_lifetime(session_lifetime));

    let service = AuthService::new(
        user_store,
        Arc::new(BcryptHasher::new(args.bcrypt_cost)),
        session_store.clone(),
        CookieConfig {
            max_age: session_lifetime,
            secure: args.cookie_secure,
        },
        metrics.clone(),
    );

    // Spawn background task for session cleanup and metrics
    {
        let session_store = session_store.clone();
        let metrics = metrics.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;

                let removed = session_store.cleanup_expired();
                if removed > 0 {
                    tracing::debug!(removed = removed, "Cleaned up expired sessions");
                }

                let active_count = session_store.active_session_count();
                metrics.set_active_sessions(active_count);
                tracing::trace!(active_sessions = active_count, "Updated session metrics");
            }
        });
        info!("Started background session cleanup and metrics task");
    }

    run_server(args, service).await
}

async fn run_server(args: ServerConfig, service: AuthService) -> Result<()> {
    let listener = tokio::net::TcpListener::bind((args.host.as_str(), args.port)).await?;
    let local_addr = listener.local_addr()?;

    let metrics_listener =
        tokio::net::TcpListener::bind((args.metric_host.as_str(), args.metric_port)).await?;
    let metrics_addr = metrics_listener.local_addr()?;

    info!("metrics server is running at http://{metrics_addr}");

    let metrics_service = hyper::service::service_fn(
        move |req: hyper::Request<hyper::body::Incoming>| async move {
            let mut resp = hyper::Response::new(Full::new(Bytes::from("Not Found")));
            *resp.status_mut() = hyper::StatusCode::NOT_FOUND;

            if req.method() == hyper::Method::GET && req.uri().path() == "/metrics" {
                let mut buffer = Vec::new();
                let encoder = prometheus::TextEncoder::new();
                match encoder.encode(&prometheus::gather(), &mut buffer) {
                    Ok(()) => {
                        resp = hyper::Response::new(Full::new(Bytes::from(buffer)));
                        resp.headers_mut().insert(
                            hyper::header::CONTENT_TYPE,
                            hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
                        );
                    }
                    Err(err) => {
                        tracing::error!("failed to encode metrics: {err}");
                        *resp.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
                    }
                }
            }

            Ok::<_, std::convert::Infallible>(resp)
        },
    );

    let http_server = ConnBuilder::new(TokioExecutor::new());
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();

    let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());

    info!("server is running at http://{local_addr}");

    loop {
        tokio::select! {
            res = listener.accept() => {
                match res {
                    Ok((socket, _)) => {
                        let service = service.clone();
                        let handler = hyper::service::service_fn(move |req| {
                            let service = service.clone();
                            async move { service.handle_request(req).await }
                        });
                        let conn = http_server.serve_connection(TokioIo::new(socket), handler);
                        let conn = graceful.watch(conn.into_owned());
                        tokio::spawn(async move {
                            let _ = conn.await;
                        });
                    }
                    Err(err) => {
                        tracing::error!("error accepting connection: {err}");
                    }
                }
            }
            res = metrics_listener.accept() => {
                match res {
                    Ok((socket, _)) => {
                        let conn = http_server.serve_connection(TokioIo::new(socket), metrics_service);
                        let conn = graceful.watch(conn.into_owned());
                        tokio::spawn(async move {
                            let _ = conn.await;
                        });
                    }
                    Err(err) => {
                        tracing::error!("error accepting metrics connection: {err}");
                    }
                }
            }
            _ = ctrl_c.as_mut() => {
                break;
            }
        };
    }

    tokio::select! {
        () = graceful.shutdown() => {
             tracing::debug!("Gracefully shutdown!");
        },
        () = tokio::time::sleep(Duration::from_secs(10)) => {
             tracing::debug!("Waited 10 seconds for graceful shutdown, aborting...");
        }
    }

    info!("server is stopped");
    Ok(())
}
