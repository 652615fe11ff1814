//! Grid planning and order lifecycle for Binance USD-M perpetuals
//!
//! A grid is a ladder of resting limit orders stepping away from an entry price,
//! protected by one stop-market order and closed by a series of take-profits.
//!
//! # Architecture
//!
//! - [`types`] - Requests, plans and tracked order ids
//! - [`market`] - Exchange trading rules and quantity rounding
//! - [`planner`] - Pure plan construction from a request
//! - [`executor`] - Exchange abstraction (mockable for testing) and order submission
//! - [`binance`] - Binance USD-M REST implementation of the exchange abstraction
//! - [`state`] - Tracked grid store with JSON persistence
//! - [`manager`] - Preview, create, cancel and list operations
//! - [`errors`] - Grid-specific error types
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use binance_grid::grid::{
//!     BinanceFuturesExchange, Direction, GridManager, GridPlanner, GridRequest,
//!     GridStateStore, JsonFilePersistence,
//! };
//!
//! let exchange = Arc::new(BinanceFuturesExchange::new(&settings.binance)?);
//! let store = Arc::new(GridStateStore::load(Arc::new(JsonFilePersistence::new("grid_state.json")))?);
//! let manager = GridManager::new(exchange, GridPlanner::default(), store);
//!
//! let request = GridRequest {
//!     symbol: "BTCUSDT".into(),
//!     direction: Direction::Long,
//!     entry_price: 60_000.0,
//!     distance: 500.0,
//!     steps: 4,
//!     total_quantity: 0.01,
//!     loss_budget: 50.0,
//!     tp_count: 2,
//!     tp_distance: 800.0,
//!     leverage: 10,
//! };
//!
//! let preview = manager.plan_grid(&request).await?;
//! let tracked = manager.create_grid(&request).await?;
//! manager.cancel_grid("BTCUSDT").await;
//! ```

pub mod binance;
pub mod errors;
pub mod executor;
pub mod manager;
pub mod market;
pub mod planner;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use binance::{BinanceFuturesExchange, MarketCatalog};
pub use errors::{GridError, GridResult};
pub use executor::{GridExchange, OrderExecutor};
pub use manager::GridManager;
pub use market::{round_quantity, MarketRules};
pub use planner::GridPlanner;
pub use state::{
    GridStateMap, GridStateStore, JsonFilePersistence, MemoryPersistence, StatePersistence,
};
pub use types::{
    Direction, GridOrderSpec, GridPlan, GridRequest, OrderSide, StopLossSpec, TakeProfitSpec,
    TrackedGrid, MAX_OPEN_ORDERS,
};
