//! Storefront - self-hosted e-commerce backend

mod shutdown;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use storefront::config::{Config, LogFormat};
use storefront::http::{self, AppState};
use storefront::notifications::{Dispatcher, HttpMailer, LogMailer, Mailer};
use storefront::repository::Repositories;
use storefront::services::Services;

fn init_tracing(format: LogFormat) {
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));
    match format {
        LogFormat::Compact => registry.with(tracing_subscriber::fmt::layer().compact()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.log_format);
    if config.uses_default_secret() {
        warn!("JWT_SECRET is not set; tokens are signed with the built-in development secret");
    }

    let repos = match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new().max_connections(config.database_max_connections).connect(url).await?;
            sqlx::migrate!("./migrations").run(&db).await?;
            info!("Connected to Postgres, migrations applied");
            Repositories::postgres(db)
        }
        None => {
            warn!("DATABASE_URL is not set; using the in-memory store");
            Repositories::in_memory()
        }
    };

    let mailer: Arc<dyn Mailer> = match &config.mail {
        Some(mail) => Arc::new(HttpMailer::new(mail, config.mail_sender_email.clone(), config.mail_sender_name.clone())?),
        None => {
            info!("MAIL_API_URL is not set; emails are logged only");
            Arc::new(LogMailer)
        }
    };

    let mut dispatcher = Dispatcher::new(&repos, mailer, config.dispatch_batch_size).with_lease(config.dispatch_lease);
    if let Some(url) = &config.nats_url {
        match async_nats::connect(url.as_str()).await {
            Ok(client) => {
                info!(%url, "Connected to NATS");
                dispatcher = dispatcher.with_nats(client);
            }
            Err(e) => warn!(%url, error = %e, "NATS unavailable; order events will not be published"),
        }
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    let dispatcher_task = tokio::spawn(dispatcher.run(config.dispatch_interval, stop_rx));

    let app = http::router(AppState::new(Services::new(&repos, &config)));
    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Storefront listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = shutdown::signal().await {
                error!(error = %e, "Shutdown signal handler failed");
            }
            _ = stop_tx.send(true);
        })
        .await?;

    if let Err(e) = dispatcher_task.await {
        error!(error = %e, "Notification dispatcher panicked");
    }
    info!("Storefront stopped");
    Ok(())
}
