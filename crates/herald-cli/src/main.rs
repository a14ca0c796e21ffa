//! herald - email job queue process
//!
//! ```text
//! herald serve    admin HTTP API only
//! herald worker   queue workers only
//! herald all      both (default)
//! ```
//!
//! 設定はすべて環境変数から読む（`HeraldConfig::from_env`）。

use std::sync::Arc;

use anyhow::{Context, bail};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

use herald_core::app::{
    EmailProcessor, ProcessorRegistry, QueueAdmin, QueueRuntime, WaitlistProcessor,
};
use herald_core::config::{HeraldConfig, MailMode, StoreConfig};
use herald_core::http::{AppState, create_router};
use herald_core::impls::{
    InMemoryMailTransport, InMemoryWaitlistDirectory, SmtpMailTransport, TracingEventSink,
};
use herald_core::observability;
use herald_core::ports::{EventSink, MailTransport, WaitlistDirectory};
use herald_core::queue::{InMemoryJobStore, JobStore};

const USAGE: &str = "usage: herald [serve|worker|all]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Serve,
    Worker,
    All,
}

impl Mode {
    fn from_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let mode = match args.next().as_deref() {
            None | Some("all") => Mode::All,
            Some("serve") => Mode::Serve,
            Some("worker") => Mode::Worker,
            Some(other) => bail!("unknown command '{other}'\n{USAGE}"),
        };
        if let Some(extra) = args.next() {
            bail!("unexpected argument '{extra}'\n{USAGE}");
        }
        Ok(mode)
    }

    fn runs_http(self) -> bool {
        matches!(self, Mode::Serve | Mode::All)
    }

    fn runs_workers(self) -> bool {
        matches!(self, Mode::Worker | Mode::All)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mode = Mode::from_args(std::env::args().skip(1))?;
    let config = HeraldConfig::from_env().context("invalid configuration")?;
    observability::init(config.log_format);

    let events: Arc<dyn EventSink> = Arc::new(TracingEventSink);
    let store = build_store(&config, events).await?;
    let directory = build_directory(&config)?;

    let runtime = if mode.runs_workers() {
        let transport = build_transport(&config).await?;
        let mut registry = ProcessorRegistry::new();
        registry.register(Arc::new(EmailProcessor::new(transport.clone())))?;
        registry.register(Arc::new(WaitlistProcessor::new(transport, directory.clone())))?;
        Some(QueueRuntime::start(store.clone(), registry, &config.worker)?)
    } else {
        None
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = if mode.runs_http() {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .with_context(|| format!("bind {}", config.bind_addr))?;
        info!(addr = %config.bind_addr, "admin api listening");

        let router = create_router(AppState::new(QueueAdmin::new(store.clone(), directory)));
        let mut rx = shutdown_rx;
        Some(tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = rx.wait_for(|stop| *stop).await;
                })
                .await
        }))
    } else {
        None
    };

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    if let Some(runtime) = runtime {
        runtime.shutdown().await;
    }
    if let Some(server) = server {
        server.await?.context("http server")?;
    }
    info!("bye");
    Ok(())
}

async fn build_store(
    config: &HeraldConfig,
    events: Arc<dyn EventSink>,
) -> anyhow::Result<Arc<dyn JobStore>> {
    match &config.store {
        StoreConfig::Memory => {
            warn!("using in-memory job store: jobs are lost on restart and not shared between processes");
            Ok(Arc::new(
                InMemoryJobStore::new(config.policies.clone()).with_event_sink(events),
            ))
        }
        #[cfg(feature = "redis")]
        StoreConfig::Redis { url, namespace } => {
            let store = herald_core::queue::RedisJobStore::open(
                url,
                namespace.clone(),
                config.policies.clone(),
            )?
            .with_event_sink(events);
            if let Err(e) = store.ping().await {
                warn!(error = %e, "redis is not reachable yet; enqueue and claim will fail until it is");
            }
            info!(namespace = %namespace, "using redis job store");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis"))]
        StoreConfig::Redis { .. } => {
            bail!("redis store configured but herald was built without the `redis` feature")
        }
    }
}

async fn build_transport(config: &HeraldConfig) -> anyhow::Result<Arc<dyn MailTransport>> {
    match config.mail {
        MailMode::Smtp => {
            let transport = SmtpMailTransport::new(&config.smtp)?;
            if !transport.verify().await {
                warn!(host = %config.smtp.host, "smtp connection check failed; sends will be retried");
            }
            Ok(Arc::new(transport))
        }
        MailMode::Memory => {
            warn!("using in-memory mail transport: no email leaves this process");
            Ok(Arc::new(InMemoryMailTransport::new()))
        }
    }
}

fn build_directory(config: &HeraldConfig) -> anyhow::Result<Arc<dyn WaitlistDirectory>> {
    match &config.waitlist_file {
        Some(path) => {
            let directory = InMemoryWaitlistDirectory::from_json_file(path)?;
            info!(path = %path.display(), "loaded waitlist");
            Ok(Arc::new(directory))
        }
        None => Ok(Arc::new(InMemoryWaitlistDirectory::new())),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
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
    info!("shutdown signal received");
}
