//! Notes API server
//!
//! Verifies Firebase ID tokens and stores each user's notes in the hosted
//! datastore, scoped to the verified user.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method, header};
use clap::Parser;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notes_service::auth::{FirebaseVerifier, GoogleKeys};
use notes_service::config::{DatastoreSettings, ServiceAccount};
use notes_service::datastore::Gateway;
use notes_service::{AppState, router};

#[derive(Parser, Debug)]
#[command(name = "notes-service")]
#[command(about = "Authenticated notes API")]
struct Cli {
    /// Port to listen on
    #[arg(long, default_value_t = 3000, env = "NOTES_PORT")]
    port: u16,

    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0", env = "NOTES_BIND")]
    bind: String,

    /// Browser origin allowed to call the API
    #[arg(long, env = "NOTES_CORS_ORIGIN")]
    cors_origin: Option<String>,

    /// Firebase project whose ID tokens are accepted
    #[arg(long, env = "FIREBASE_PROJECT_ID")]
    firebase_project_id: Option<String>,

    /// Service account email
    #[arg(long, env = "FIREBASE_CLIENT_EMAIL")]
    firebase_client_email: Option<String>,

    /// Service account private key, PEM with `\n` escapes
    #[arg(long, env = "FIREBASE_PRIVATE_KEY", hide_env_values = true)]
    firebase_private_key: Option<String>,

    /// Datastore base URL
    #[arg(long, env = "SUPABASE_URL")]
    supabase_url: Option<String>,

    /// Datastore base URL, used when --supabase-url is not set
    #[arg(long, env = "NEXT_PUBLIC_SUPABASE_URL", hide = true)]
    public_supabase_url: Option<String>,

    /// Datastore service credential
    #[arg(long, env = "SUPABASE_SERVICE_ROLE_KEY", hide_env_values = true)]
    supabase_service_role_key: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notes_service=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let account = ServiceAccount::load(
        cli.firebase_project_id.as_deref(),
        cli.firebase_client_email.as_deref(),
        cli.firebase_private_key.as_deref(),
    )
    .context("Invalid identity provider configuration")?;
    tracing::info!(
        "Verifying ID tokens for project {} as {}",
        account.project_id,
        account.client_email
    );

    let keys = GoogleKeys::new().context("Failed to build key client")?;
    let verifier = FirebaseVerifier::new(account.project_id.clone(), keys);

    // Validated on first use
    let gateway = Gateway::new(DatastoreSettings {
        url: cli.supabase_url.clone(),
        public_url: cli.public_supabase_url.clone(),
        service_key: cli.supabase_service_role_key.clone(),
    });

    let state = Arc::new(AppState::new(Arc::new(verifier), Arc::new(gateway)));

    let mut app = router(state);
    if let Some(origin) = &cli.cors_origin {
        let origin: HeaderValue = origin
            .parse()
            .with_context(|| format!("Invalid CORS origin: {}", origin))?;
        app = app.layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        );
        tracing::info!("CORS enabled for {}", cli.cors_origin.as_deref().unwrap_or_default());
    }

    // Parse bind address
    let addr: SocketAddr = format!("{}:{}", cli.bind, cli.port).parse()?;

    tracing::info!("Starting notes-service on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Notes service shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
