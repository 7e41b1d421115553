use anyhow::{Context, Result};
use clap::Parser;
use femseek_client::{
    create_router, AppState, AudioSourceFactory, Config, HttpPaymentBridge, ProtocolCodec,
    SessionDeps, TranslationSession, WebSocketConnector,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "femseek-client", version, about = "Real-time speech translation client")]
struct Args {
    /// Config file (extension optional)
    #[arg(long, default_value = "config/femseek")]
    config: String,

    /// Start a session right away for this identity
    #[arg(long)]
    identity: Option<String>,

    /// Target language for an immediate start
    #[arg(long, default_value = "yo")]
    target_lang: String,

    /// Stream this WAV file instead of the configured source
    #[arg(long)]
    file: Option<PathBuf>,

    /// Don't serve the control API
    #[arg(long)]
    no_http: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Translation endpoint: {}", cfg.service.endpoint_url);

    let source = cfg.audio_source(args.file.clone())?;
    info!("Audio source: {:?}", source);

    let payments = HttpPaymentBridge::new();
    let deps = SessionDeps {
        connector: Arc::new(WebSocketConnector::default()),
        capture: Arc::new(AudioSourceFactory::new(source, cfg.capture_config())),
        payments: Arc::new(payments.clone()),
        charge: cfg.charge(),
        codec: ProtocolCodec::new(cfg.protocol.clone()),
    };

    let (session, handle, notifications) = TranslationSession::new(cfg.session_config(), deps);
    let session_task = tokio::spawn(session.run());

    let state = AppState::new(handle.clone(), payments);
    state.track(notifications);

    if let Some(identity) = args.identity {
        handle.start(identity, args.target_lang).await?;
    }

    let server = if args.no_http {
        None
    } else {
        let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind control API on {}", addr))?;
        info!("Control API listening on http://{}", addr);

        let app = create_router(state);
        Some(tokio::spawn(async move { axum::serve(listener, app).await }))
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutting down");

    if let Err(e) = handle.stop().await {
        warn!("Session already stopped: {:#}", e);
    }
    session_task.await.context("Session task panicked")?;

    if let Some(server) = server {
        server.abort();
    }

    info!("Final stats: {:?}", handle.stats());

    Ok(())
}
