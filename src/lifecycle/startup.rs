//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the store, cache backend, cache service and snapshot provider
//! - Publish the first snapshot
//! - Start background tasks (sweeper, warmup, store watcher, reload loop)
//! - Serve the admin API until shutdown
//!
//! # Design Decisions
//! - Fail fast on wiring errors (bad addresses, unreachable Redis)
//! - A failed first load is not fatal: the empty snapshot stays published
//!   and the next trigger retries
//! - The admin listener starts last

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

use crate::admin::{setup_admin_router, AdminState};
use crate::cache::{CacheError, CacheService, CacheSettings, CacheStore, CacheWarmup, MemoryCacheStore};
use crate::config::schema::PLACEHOLDER_API_KEY;
use crate::config::{CacheBackendKind, GatewayConfig, StoreWatcher};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals;
use crate::routing::{ConfigTranslator, SnapshotProvider};
use crate::store::JsonFileStore;

/// Bursts of reload triggers within this window collapse into one reload.
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("cache backend error: {0}")]
    Cache(#[from] CacheError),

    #[error("redis cache backend requested but this build lacks the `redis` feature")]
    RedisNotCompiled,

    #[error("redis cache backend requested without `cache.redis_url`")]
    MissingRedisUrl,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to watch store document: {0}")]
    Watcher(#[from] notify::Error),
}

/// A fully wired gateway, ready to run.
pub struct Gateway {
    config: GatewayConfig,
    store: Arc<JsonFileStore>,
    provider: Arc<SnapshotProvider>,
    cache: Arc<CacheService>,
    memory_cache: Option<Arc<MemoryCacheStore>>,
    shutdown: Arc<Shutdown>,
}

impl Gateway {
    pub async fn build(config: GatewayConfig) -> Result<Self, StartupError> {
        let store = Arc::new(JsonFileStore::new(config.store.path.clone()));
        let provider = Arc::new(SnapshotProvider::new(store.clone(), ConfigTranslator::new()));

        let (backend, memory_cache) = build_cache_backend(&config).await?;
        tracing::info!(backend = backend.name(), "Cache backend initialized");
        let cache = Arc::new(CacheService::new(backend, CacheSettings::from(&config.cache)));

        Ok(Self {
            config,
            store,
            provider,
            cache,
            memory_cache,
            shutdown: Arc::new(Shutdown::new()),
        })
    }

    pub fn provider(&self) -> &Arc<SnapshotProvider> {
        &self.provider
    }

    pub fn cache(&self) -> &Arc<CacheService> {
        &self.cache
    }

    pub fn shutdown(&self) -> &Arc<Shutdown> {
        &self.shutdown
    }

    /// Run until a terminate signal or [`Shutdown::trigger`].
    pub async fn run(self) -> Result<(), StartupError> {
        let Gateway {
            config,
            store,
            provider,
            cache,
            memory_cache,
            shutdown,
        } = self;

        if config.admin.api_key == PLACEHOLDER_API_KEY {
            tracing::warn!("Admin API key is the built-in placeholder; set admin.api_key before exposing the admin API");
        }

        if provider.reload().await.is_err() {
            tracing::warn!("Initial configuration load failed, serving an empty snapshot until the next reload");
        }

        if let Some(memory) = memory_cache {
            let interval = Duration::from_secs(config.cache.sweep_interval_secs);
            tokio::spawn(memory.run_sweeper(interval, shutdown.subscribe()));
        }

        if config.warmup.enabled {
            CacheWarmup::new(cache.clone(), store.clone(), &config.warmup).spawn(shutdown.subscribe());
        } else {
            tracing::info!("Cache warmup disabled");
        }

        let (reload_tx, reload_rx) = mpsc::unbounded_channel();
        let _watcher = if config.store.watch {
            Some(StoreWatcher::new(&config.store.path, reload_tx.clone()).run()?)
        } else {
            None
        };
        tokio::spawn(signals::listen(shutdown.clone(), reload_tx));
        let reloader = tokio::spawn(run_reload_loop(
            provider.clone(),
            reload_rx,
            shutdown.subscribe(),
        ));

        if config.admin.enabled {
            let listener = TcpListener::bind(&config.admin.bind_address).await?;
            tracing::info!(address = %listener.local_addr()?, "Admin API listening");

            let state = AdminState::new(provider.clone(), cache.clone(), &config.admin.api_key);
            let router = setup_admin_router(
                state,
                Duration::from_secs(config.admin.request_timeout_secs),
            );
            let stopping = shutdown.clone();
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { stopping.wait().await })
                .await?;
            tracing::info!("Admin API stopped");
        } else {
            tracing::info!("Admin API disabled");
            shutdown.wait().await;
        }

        shutdown.trigger();
        let _ = reloader.await;
        tracing::info!("Gateway stopped");
        Ok(())
    }
}

async fn build_cache_backend(
    config: &GatewayConfig,
) -> Result<(Arc<dyn CacheStore>, Option<Arc<MemoryCacheStore>>), StartupError> {
    match config.cache.backend {
        CacheBackendKind::Memory => {
            let memory = Arc::new(MemoryCacheStore::new());
            let backend: Arc<dyn CacheStore> = memory.clone();
            Ok((backend, Some(memory)))
        }
        CacheBackendKind::Redis => {
            let url = config
                .cache
                .redis_url
                .as_deref()
                .ok_or(StartupError::MissingRedisUrl)?;
            connect_redis(url).await.map(|store| (store, None))
        }
    }
}

#[cfg(feature = "redis")]
async fn connect_redis(url: &str) -> Result<Arc<dyn CacheStore>, StartupError> {
    let store = crate::cache::RedisCacheStore::connect(url).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(_url: &str) -> Result<Arc<dyn CacheStore>, StartupError> {
    Err(StartupError::RedisNotCompiled)
}

/// Reload on every trigger until shutdown, coalescing bursts.
pub async fn run_reload_loop(
    provider: Arc<SnapshotProvider>,
    mut triggers: mpsc::UnboundedReceiver<()>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            trigger = triggers.recv() => {
                if trigger.is_none() {
                    break;
                }
                tokio::time::sleep(RELOAD_DEBOUNCE).await;
                while triggers.try_recv().is_ok() {}
                // Failures are logged by the provider; the old snapshot stays.
                let _ = provider.reload().await;
            }
            _ = shutdown.recv() => {
                tracing::debug!("Reload loop received shutdown signal, exiting loop");
                break;
            }
        }
    }
}
