//! Grid manager - the operations offered to the web layer
//!
//! Ties the planner, the order executor and the state store together and owns
//! bulk cancellation of a tracked grid.

use std::sync::Arc;

use log::{error, info, warn};

use super::errors::{GridError, GridResult};
use super::executor::{GridExchange, OrderExecutor};
use super::planner::GridPlanner;
use super::state::{GridStateMap, GridStateStore};
use super::types::{GridPlan, GridRequest, TrackedGrid};

/// Plans, places, tracks and cancels grids
pub struct GridManager<E: GridExchange + ?Sized> {
    exchange: Arc<E>,
    planner: GridPlanner,
    store: Arc<GridStateStore>,
}

impl<E: GridExchange + ?Sized> GridManager<E> {
    pub fn new(exchange: Arc<E>, planner: GridPlanner, store: Arc<GridStateStore>) -> Self {
        Self {
            exchange,
            planner,
            store,
        }
    }

    pub fn store(&self) -> &Arc<GridStateStore> {
        &self.store
    }

    /// Preview: build the plan without touching the exchange's order book
    pub async fn plan_grid(&self, request: &GridRequest) -> GridResult<GridPlan> {
        request.validate()?;
        let rules = self.exchange.market_rules(&request.symbol).await?;
        self.planner.plan(request, &rules)
    }

    /// Plan and place a grid, then track its order ids
    ///
    /// Fails with [`GridError::GridAlreadyTracked`] if the symbol already has a
    /// grid. If submission fails part way, the ids placed so far are tracked so
    /// the grid can still be cancelled, and the error is returned.
    pub async fn create_grid(&self, request: &GridRequest) -> GridResult<TrackedGrid> {
        let symbol = request.symbol.as_str();
        let _guard = self.store.lock_symbol(symbol).await;

        if self.store.contains(symbol).await {
            return Err(GridError::GridAlreadyTracked(symbol.to_string()));
        }

        let plan = self.plan_grid(request).await?;
        info!(
            "Creating {:?} grid for {}: {} levels, {} take-profits, {}x",
            request.direction,
            symbol,
            plan.grid.len(),
            plan.take_profits.len(),
            plan.leverage
        );

        let mut tracked = TrackedGrid::default();
        let result = OrderExecutor::new(self.exchange.as_ref())
            .execute(&plan, &mut tracked)
            .await;

        if let Err(e) = &result {
            error!(
                "Grid for {} aborted after {} order(s): {}",
                symbol,
                tracked.order_ids().count(),
                e
            );
        }

        if !tracked.is_empty() {
            if let Err(e) = self.store.insert(symbol, tracked.clone()).await {
                error!("Failed to persist tracked grid for {}: {}", symbol, e);
            }
        }

        result.map(|_| tracked)
    }

    /// Best-effort cancel every tracked order of `symbol` and forget the grid
    ///
    /// Individual cancellation failures are logged and skipped; the entry is
    /// removed regardless.
    pub async fn cancel_grid(&self, symbol: &str) {
        let _guard = self.store.lock_symbol(symbol).await;

        let Some(tracked) = self.store.get(symbol).await else {
            info!("No tracked grid for {}", symbol);
            return;
        };

        let mut cancelled = 0;
        for oid in tracked.order_ids() {
            match self.exchange.cancel_order(oid, symbol).await {
                Ok(()) => cancelled += 1,
                Err(e) => warn!("Cancel of {} order {} skipped: {}", symbol, oid, e),
            }
        }

        if let Err(e) = self.store.remove(symbol).await {
            error!("Failed to persist removal of {}: {}", symbol, e);
        }

        info!(
            "Cancelled {}/{} orders for {}",
            cancelled,
            tracked.order_ids().count(),
            symbol
        );
    }

    /// Current store contents
    pub async fn list_tracked_grids(&self) -> GridStateMap {
        self.store.snapshot().await
    }

    /// Sorted perpetual contract symbols
    pub async fn list_available_symbols(&self) -> GridResult<Vec<String>> {
        self.exchange.perpetual_symbols().await
    }
}
