use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use h264_rtc_streamer::config::{load_config, AppConfig};
use h264_rtc_streamer::state::AppState;
use h264_rtc_streamer::web;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// h264-rtc-streamer command line arguments
#[derive(Parser, Debug)]
#[command(name = "h264-rtc-streamer")]
#[command(version, about = "Stream an encoder's H.264 output to a WebRTC peer", long_about = None)]
struct CliArgs {
    /// Path to a TOML configuration file
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listen address (overrides config)
    #[arg(short = 'a', long, value_name = "ADDRESS")]
    address: Option<String>,

    /// HTTP port (overrides config)
    #[arg(short = 'p', long, value_name = "PORT")]
    http_port: Option<u16>,

    /// STUN server URL (overrides config)
    #[arg(long, value_name = "URL")]
    stun_server: Option<String>,

    /// Give up on ICE candidate gathering after this many milliseconds
    #[arg(long, value_name = "MS")]
    gathering_timeout_ms: Option<u64>,

    /// Give up waiting for the ICE connection after this many milliseconds
    #[arg(long, value_name = "MS")]
    connect_timeout_ms: Option<u64>,

    /// Hide error details from HTTP clients
    #[arg(long)]
    hide_error_details: bool,

    /// Encoder program (overrides config)
    #[arg(short = 'e', long, value_name = "PROGRAM")]
    encoder: Option<String>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Encoder arguments, passed verbatim (replace the configured ones)
    #[arg(last = true, value_name = "ENCODER_ARGS")]
    encoder_args: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting h264-rtc-streamer v{}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(args.config.as_deref()).await?;
    apply_cli_overrides(&mut config, &args);
    config.validate()?;

    let addr = bind_address(&config)?;
    let state = AppState::new(config);
    let app = web::create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on http://{}", addr);
    tracing::info!(
        "Encoder: {} {}",
        state.config.encoder.program,
        state.config.encoder.args.join(" ")
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
    }
}

fn apply_cli_overrides(config: &mut AppConfig, args: &CliArgs) {
    if let Some(address) = &args.address {
        config.web.bind_address = address.clone();
    }
    if let Some(port) = args.http_port {
        config.web.http_port = port;
    }
    if args.hide_error_details {
        config.web.expose_error_details = false;
    }
    if let Some(stun) = &args.stun_server {
        config.webrtc.stun_server = stun.clone();
    }
    if args.gathering_timeout_ms.is_some() {
        config.webrtc.gathering_timeout_ms = args.gathering_timeout_ms;
    }
    if args.connect_timeout_ms.is_some() {
        config.webrtc.connect_timeout_ms = args.connect_timeout_ms;
    }
    if let Some(program) = &args.encoder {
        config.encoder.program = program.clone();
    }
    if !args.encoder_args.is_empty() {
        config.encoder.args = args.encoder_args.clone();
    }
}

fn bind_address(config: &AppConfig) -> anyhow::Result<SocketAddr> {
    let ip: IpAddr = config
        .web
        .bind_address
        .trim()
        .parse()
        .with_context(|| format!("Invalid bind address: {}", config.web.bind_address))?;
    Ok(SocketAddr::new(ip, config.web.http_port))
}

fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "h264_rtc_streamer=error,tower_http=error",
        LogLevel::Warn => "h264_rtc_streamer=warn,tower_http=warn",
        LogLevel::Info => "h264_rtc_streamer=info,tower_http=info",
        LogLevel::Verbose => "h264_rtc_streamer=debug,tower_http=info",
        LogLevel::Debug => "h264_rtc_streamer=debug,tower_http=debug,webrtc=info",
        LogLevel::Trace => "h264_rtc_streamer=trace,tower_http=debug,webrtc=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
