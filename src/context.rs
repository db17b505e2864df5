//! The process-lifetime owner of the router and aggregator.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::config::ConsoleConfig;
use crate::data::{AggregatorHandle, Attachment, ReconcileReport, SourceRegistration};
use crate::router::Router;
use crate::session::Connector;

/// Where the list of cores comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventorySource {
    /// The `[cores]` table of a configuration file.
    ConfigFile(PathBuf),
    /// A JSON listing in the `/api/cores` format.
    Listing(PathBuf),
}

impl InventorySource {
    pub fn load(&self) -> Result<Vec<SourceRegistration>> {
        match self {
            InventorySource::ConfigFile(path) => Ok(ConsoleConfig::load(path)?.registrations()),
            InventorySource::Listing(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read core listing {}", path.display()))?;
                SourceRegistration::parse_inventory(&json)
                    .with_context(|| format!("Invalid core listing in {}", path.display()))
            }
        }
    }
}

/// Owns the shared session, the router and the aggregator.
///
/// Build one in `main` and hand out references; consumers only add and
/// remove subscriptions and never close the connection themselves.
#[derive(Debug)]
pub struct AppContext {
    router: Router,
    aggregator: AggregatorHandle,
    attachment: Attachment,
    refresher: Mutex<Option<JoinHandle<()>>>,
}

impl AppContext {
    /// Spawn the session, attach the aggregator and connect.
    ///
    /// Cores are registered from `inventory`, except that a
    /// [`InventorySource::ConfigFile`] inventory starts from `config` itself.
    pub fn start(
        config: &ConsoleConfig,
        inventory: &InventorySource,
        connector: Arc<dyn Connector>,
    ) -> Result<AppContext> {
        let endpoint = config.endpoint()?;
        let registrations = match inventory {
            InventorySource::ConfigFile(_) => config.registrations(),
            InventorySource::Listing(_) => inventory.load()?,
        };

        let router = Router::spawn(endpoint, config.session_options(), connector);
        let aggregator = AggregatorHandle::new(config.aggregator_options());
        aggregator.reconcile(&registrations);
        let attachment = aggregator.attach(&router, config.liveness.sweep_interval);

        tracing::info!(
            "Watching {} cores via {}",
            registrations.len(),
            router.endpoint()
        );
        router.connect();

        Ok(AppContext {
            router,
            aggregator,
            attachment,
            refresher: Mutex::new(None),
        })
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn aggregator(&self) -> &AggregatorHandle {
        &self.aggregator
    }

    /// Re-read `inventory` once and reconcile.
    pub fn refresh_inventory(&self, inventory: &InventorySource) -> Result<ReconcileReport> {
        let registrations = inventory.load()?;
        Ok(self.aggregator.reconcile(&registrations))
    }

    /// Re-read `inventory` every `every`, replacing any earlier refresher.
    ///
    /// A failed read keeps the current cores.
    pub fn spawn_inventory_refresh(&self, inventory: InventorySource, every: Duration) {
        let aggregator = self.aggregator.clone();
        let every = every.max(Duration::from_millis(1));
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
            loop {
                ticker.tick().await;
                match inventory.load() {
                    Ok(registrations) => {
                        aggregator.reconcile(&registrations);
                    }
                    Err(e) => tracing::warn!("Inventory refresh failed: {:#}", e),
                }
            }
        });

        if let Some(previous) = self.refresher.lock().replace(task) {
            previous.abort();
        }
    }

    /// Stop refreshing, close the connection and detach the aggregator.
    pub async fn shutdown(self) {
        if let Some(refresher) = self.refresher.lock().take() {
            refresher.abort();
        }
        self.router.shutdown().await;
        drop(self.attachment);
    }
}
