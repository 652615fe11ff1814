use std::path::Path;
use std::sync::Arc;

use log::{error, info, warn};

use crate::config::{ConfigError, Settings};
use crate::grid::{
    BinanceFuturesExchange, GridExchange, GridManager, GridPlanner, GridResult, GridStateStore,
    JsonFilePersistence,
};
use crate::web::{self, AppState};

/// Runner for the grid web service
pub struct GridRunner {
    config: Settings,
}

impl GridRunner {
    /// Create a new runner from a configuration file
    pub fn new(config_path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = config_path.as_ref().to_string_lossy();
        let config = Settings::new(&path)?;
        Ok(Self { config })
    }

    pub fn from_settings(config: Settings) -> Self {
        Self { config }
    }

    /// Run until Ctrl-C, then flush tracked grids
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        // 1. Setup Logging
        if std::env::var("RUST_LOG").is_err() {
            std::env::set_var("RUST_LOG", &self.config.log.level);
        }
        env_logger::try_init().ok();

        info!("Starting GridRunner...");

        // 2. Exchange (credentials are mandatory)
        let exchange = Arc::new(BinanceFuturesExchange::new(&self.config.binance)?);
        info!("Using Binance endpoint {}", self.config.binance.base_url);

        match exchange.catalog().await {
            Ok(catalog) => info!("{} perpetual symbols available", catalog.perpetuals.len()),
            Err(e) => warn!("Could not load markets yet: {}", e),
        }

        // 3. Tracked grid store
        let persistence = Arc::new(JsonFilePersistence::new(&self.config.state.file));
        info!("Tracking grids in {:?}", persistence.path());
        let store = Arc::new(GridStateStore::load(persistence)?);

        // 4. Manager + server
        let exchange: Arc<dyn GridExchange> = exchange;
        let planner = GridPlanner::new(self.config.grid.min_notional_floor);
        let manager = Arc::new(GridManager::new(exchange, planner, store.clone()));

        let state = AppState {
            manager,
            default_leverage: self.config.grid.default_leverage,
        };

        let served = web::serve(
            state,
            &self.config.server.host,
            self.config.server.port,
            shutdown_signal(),
        )
        .await;

        // 5. Final flush, even if the server failed
        flush_store(&store).await?;
        served?;

        info!("GridRunner stopped");
        Ok(())
    }
}

async fn flush_store(store: &GridStateStore) -> GridResult<()> {
    let count = store.snapshot().await.len();
    store.flush().await.map_err(|e| {
        error!("Final state flush failed: {}", e);
        e
    })?;
    info!("Flushed {} tracked grid(s)", count);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}
