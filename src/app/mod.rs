//! Application setup and runtime.

use crate::{
  config::Config,
  db,
  error::Result,
  http,
  recipient::RecipientValidator,
  smtp,
  store::Mailstore,
  sweeper::{self, SweepSettings},
};
use std::sync::Arc;
use tokio::{net::TcpListener, sync::watch};
use tracing::{error, info};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
  pub store: Mailstore,
  pub validator: Arc<RecipientValidator>,
  pub config: Arc<Config>,
}

impl AppState {
  pub fn new(store: Mailstore, config: Config) -> Self {
    Self {
      store,
      validator: Arc::new(RecipientValidator::new(config.allowed_domains.clone())),
      config: Arc::new(config),
    }
  }
}

/// Start the sweeper, SMTP and HTTP servers and run until SIGINT/SIGTERM.
///
/// Only startup failures (bad config, storage that cannot be opened, ports that
/// cannot be bound) are returned; everything after that is logged.
pub async fn run() -> Result<()> {
  crate::util::init_tracing();

  let config = Config::from_env()?;
  let pool = db::connect(&config.database_url).await?;
  let state = AppState::new(Mailstore::new(pool), config);
  let cfg = state.config.clone();

  let (smtp_listener, web_listener) = bind_listeners(&cfg).await?;

  info!("mailbox UI:           http://{}/", cfg.web_addr);
  info!("SMTP:                 {}", cfg.smtp_addr);
  info!("database:             {}", cfg.database_url);
  info!(
    "retention:            {} days, swept every {}s",
    cfg.retention_days,
    cfg.sweep_interval.as_secs()
  );
  match &cfg.allowed_domains {
    crate::recipient::AllowedDomains::Any => info!("accepting mail for:   any domain"),
    crate::recipient::AllowedDomains::List(set) => {
      let domains: Vec<&str> = set.iter().map(String::as_str).collect();
      info!("accepting mail for:   {}", domains.join(", "));
    }
  }

  let (shutdown_tx, shutdown_rx) = watch::channel(false);

  let sweeper = tokio::spawn(sweeper::run(
    state.store.clone(),
    SweepSettings {
      retention_days: cfg.retention_days,
      interval: cfg.sweep_interval,
    },
    shutdown_rx.clone(),
  ));

  let smtp_state = state.clone();
  let smtp_shutdown = shutdown_rx.clone();
  let smtp_task = tokio::spawn(async move {
    if let Err(e) = smtp::serve(smtp_listener, smtp_state, smtp_shutdown).await {
      error!("smtp listener error: {e}");
    }
  });

  let app = http::build_router(state.clone());
  let mut http_shutdown = shutdown_rx.clone();
  let http_task = tokio::spawn(async move {
    let serve = axum::serve(web_listener, app).with_graceful_shutdown(async move {
      let _ = http_shutdown.changed().await;
    });
    if let Err(e) = serve.await {
      error!("http server error: {e}");
    }
  });

  shutdown_signal().await;
  info!("shutting down");
  let _ = shutdown_tx.send(true);

  let _ = tokio::join!(sweeper, smtp_task, http_task);
  state.store.pool().close().await;
  Ok(())
}

/// Bind both ports before anything runs so a busy port aborts startup.
async fn bind_listeners(cfg: &Config) -> Result<(TcpListener, TcpListener)> {
  let smtp_listener = TcpListener::bind(cfg.smtp_addr).await?;
  let web_listener = TcpListener::bind(cfg.web_addr).await?;
  Ok((smtp_listener, web_listener))
}

async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      error!("cannot listen for ctrl-c: {e}");
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(mut sig) => {
        sig.recv().await;
      }
      Err(e) => {
        error!("cannot listen for SIGTERM: {e}");
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
