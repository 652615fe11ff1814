//! Exchange abstraction and order submission for a planned grid

use async_trait::async_trait;
use log::{info, warn};
use reqwest::Method;

use super::errors::{GridError, GridResult};
use super::market::MarketRules;
use super::types::{GridPlan, OrderSide, TrackedGrid};

/// Exchange operations the grid engine needs - can be mocked for testing
///
/// Quantities and prices arrive already at market precision from the planner;
/// implementations only format them for the wire.
#[async_trait]
pub trait GridExchange: Send + Sync {
    /// Trading rules for a symbol
    async fn market_rules(&self, symbol: &str) -> GridResult<MarketRules>;

    /// Sorted list of perpetual contract symbols
    async fn perpetual_symbols(&self) -> GridResult<Vec<String>>;

    /// Set leverage through the dedicated endpoint
    ///
    /// Returns [`GridError::Unsupported`] when the exchange has none.
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> GridResult<()>;

    /// Raw signed request, used as a fallback for missing dedicated calls
    async fn signed_request(
        &self,
        method: Method,
        endpoint: &str,
        params: Vec<(String, String)>,
    ) -> GridResult<serde_json::Value>;

    /// Place a GTC limit order, returning the exchange order id
    async fn place_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
    ) -> GridResult<String>;

    /// Place a stop-market order (not reduce-only)
    async fn place_stop_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        stop_price: f64,
    ) -> GridResult<String>;

    /// Place a reduce-only GTC limit order
    ///
    /// Fails with [`GridError::InvalidOrder`] when reduce-only is not applicable.
    async fn place_reduce_only_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
    ) -> GridResult<String>;

    /// Cancel an order by id
    async fn cancel_order(&self, order_id: &str, symbol: &str) -> GridResult<()>;
}

/// Endpoint used when the dedicated leverage call is unavailable
pub const LEVERAGE_ENDPOINT: &str = "/fapi/v1/leverage";

/// Submits a [`GridPlan`] in order: leverage, grid, stop-loss, take-profits
pub struct OrderExecutor<'a, E: GridExchange + ?Sized> {
    exchange: &'a E,
}

impl<'a, E: GridExchange + ?Sized> OrderExecutor<'a, E> {
    pub fn new(exchange: &'a E) -> Self {
        Self { exchange }
    }

    /// Execute the plan, appending every created order id to `tracked`
    ///
    /// On error `tracked` holds the ids submitted before the failure; nothing is
    /// rolled back.
    pub async fn execute(&self, plan: &GridPlan, tracked: &mut TrackedGrid) -> GridResult<()> {
        let symbol = plan.symbol.as_str();

        self.apply_leverage(symbol, plan.leverage).await?;

        for order in &plan.grid {
            let oid = self
                .exchange
                .place_limit_order(symbol, order.side, order.quantity, order.price)
                .await?;
            info!(
                "Grid {:?} {} @ {} placed (oid {})",
                order.side, order.quantity, order.price, oid
            );
            tracked.grid.push(oid);
        }

        let sl = &plan.stop_loss;
        let sl_oid = self
            .exchange
            .place_stop_market_order(symbol, sl.side, sl.quantity, sl.price)
            .await?;
        info!("Stop-loss {:?} {} @ {} placed (oid {})", sl.side, sl.quantity, sl.price, sl_oid);
        tracked.sl = Some(sl_oid);

        for tp in &plan.take_profits {
            let oid = self.place_take_profit(symbol, tp.side, tp.quantity, tp.price).await?;
            info!("Take-profit {:?} {} @ {} placed (oid {})", tp.side, tp.quantity, tp.price, oid);
            tracked.tp.push(oid);
        }

        Ok(())
    }

    async fn apply_leverage(&self, symbol: &str, leverage: u32) -> GridResult<()> {
        match self.exchange.set_leverage(symbol, leverage).await {
            Err(GridError::Unsupported(what)) => {
                warn!("{} unavailable, sending raw leverage request", what);
                let params = vec![
                    ("symbol".to_string(), symbol.to_string()),
                    ("leverage".to_string(), leverage.to_string()),
                ];
                self.exchange
                    .signed_request(Method::POST, LEVERAGE_ENDPOINT, params)
                    .await?;
            }
            other => other?,
        }
        info!("Leverage for {} set to {}x", symbol, leverage);
        Ok(())
    }

    /// Reduce-only first; a reduce-only rejection retries the same order without it
    async fn place_take_profit(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
    ) -> GridResult<String> {
        match self
            .exchange
            .place_reduce_only_limit_order(symbol, side, quantity, price)
            .await
        {
            Ok(oid) => Ok(oid),
            Err(GridError::InvalidOrder { code, message }) => {
                warn!(
                    "Reduce-only take-profit @ {} rejected ({} {}), retrying without reduce-only",
                    price, code, message
                );
                self.exchange
                    .place_limit_order(symbol, side, quantity, price)
                    .await
            }
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

/// Mock exchange for exercising the grid engine without a real connection.
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// Kind of order the mock received
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum SubmittedKind {
        Limit,
        StopMarket,
        ReduceOnlyLimit,
    }

    /// An order the mock accepted
    #[derive(Debug, Clone, PartialEq)]
    pub struct SubmittedOrder {
        pub oid: String,
        pub kind: SubmittedKind,
        pub side: OrderSide,
        pub quantity: f64,
        pub price: f64,
    }

    /// Mock exchange for testing
    pub struct MockExchange {
        pub rules: Arc<Mutex<HashMap<String, MarketRules>>>,
        pub symbols: Arc<Mutex<Vec<String>>>,
        pub submitted: Arc<Mutex<Vec<SubmittedOrder>>>,
        pub cancelled: Arc<Mutex<Vec<String>>>,
        pub leverage_calls: Arc<Mutex<Vec<(String, u32)>>>,
        pub raw_calls: Arc<Mutex<Vec<(String, Vec<(String, String)>)>>>,
        /// Dedicated leverage call reports `Unsupported`
        pub leverage_unsupported: AtomicBool,
        /// Every reduce-only order is rejected as invalid
        pub reject_reduce_only: AtomicBool,
        /// Every cancellation fails
        pub fail_cancels: AtomicBool,
        /// Accepted submissions before every further one is rejected
        pub fail_after: Arc<Mutex<Option<usize>>>,
        next_oid: AtomicU64,
    }

    impl MockExchange {
        pub fn new(rules: MarketRules) -> Self {
            let mut map = HashMap::new();
            let symbol = rules.symbol.clone();
            map.insert(symbol.clone(), rules);
            Self {
                rules: Arc::new(Mutex::new(map)),
                symbols: Arc::new(Mutex::new(vec![symbol])),
                submitted: Arc::new(Mutex::new(Vec::new())),
                cancelled: Arc::new(Mutex::new(Vec::new())),
                leverage_calls: Arc::new(Mutex::new(Vec::new())),
                raw_calls: Arc::new(Mutex::new(Vec::new())),
                leverage_unsupported: AtomicBool::new(false),
                reject_reduce_only: AtomicBool::new(false),
                fail_cancels: AtomicBool::new(false),
                fail_after: Arc::new(Mutex::new(None)),
                next_oid: AtomicU64::new(1),
            }
        }

        pub async fn set_fail_after(&self, accepted: Option<usize>) {
            *self.fail_after.lock().await = accepted;
        }

        async fn accept(
            &self,
            kind: SubmittedKind,
            side: OrderSide,
            quantity: f64,
            price: f64,
        ) -> GridResult<String> {
            let mut submitted = self.submitted.lock().await;
            if let Some(limit) = *self.fail_after.lock().await {
                if submitted.len() >= limit {
                    return Err(GridError::Exchange {
                        code: -2019,
                        message: "Margin is insufficient.".into(),
                    });
                }
            }

            let oid = self.next_oid.fetch_add(1, Ordering::SeqCst).to_string();
            submitted.push(SubmittedOrder {
                oid: oid.clone(),
                kind,
                side,
                quantity,
                price,
            });
            Ok(oid)
        }
    }

    #[async_trait]
    impl GridExchange for MockExchange {
        async fn market_rules(&self, symbol: &str) -> GridResult<MarketRules> {
            self.rules
                .lock()
                .await
                .get(symbol)
                .cloned()
                .ok_or_else(|| GridError::AssetNotFound(symbol.to_string()))
        }

        async fn perpetual_symbols(&self) -> GridResult<Vec<String>> {
            let mut symbols = self.symbols.lock().await.clone();
            symbols.sort();
            Ok(symbols)
        }

        async fn set_leverage(&self, symbol: &str, leverage: u32) -> GridResult<()> {
            if self.leverage_unsupported.load(Ordering::SeqCst) {
                return Err(GridError::Unsupported("set_leverage".into()));
            }
            self.leverage_calls
                .lock()
                .await
                .push((symbol.to_string(), leverage));
            Ok(())
        }

        async fn signed_request(
            &self,
            _method: Method,
            endpoint: &str,
            params: Vec<(String, String)>,
        ) -> GridResult<serde_json::Value> {
            self.raw_calls
                .lock()
                .await
                .push((endpoint.to_string(), params));
            Ok(serde_json::json!({}))
        }

        async fn place_limit_order(
            &self,
            _symbol: &str,
            side: OrderSide,
            quantity: f64,
            price: f64,
        ) -> GridResult<String> {
            self.accept(SubmittedKind::Limit, side, quantity, price).await
        }

        async fn place_stop_market_order(
            &self,
            _symbol: &str,
            side: OrderSide,
            quantity: f64,
            stop_price: f64,
        ) -> GridResult<String> {
            self.accept(SubmittedKind::StopMarket, side, quantity, stop_price)
                .await
        }

        async fn place_reduce_only_limit_order(
            &self,
            _symbol: &str,
            side: OrderSide,
            quantity: f64,
            price: f64,
        ) -> GridResult<String> {
            if self.reject_reduce_only.load(Ordering::SeqCst) {
                return Err(GridError::InvalidOrder {
                    code: -2022,
                    message: "ReduceOnly Order is rejected.".into(),
                });
            }
            self.accept(SubmittedKind::ReduceOnlyLimit, side, quantity, price)
                .await
        }

        async fn cancel_order(&self, order_id: &str, _symbol: &str) -> GridResult<()> {
            if self.fail_cancels.load(Ordering::SeqCst) {
                return Err(GridError::Exchange {
                    code: -2011,
                    message: "Unknown order sent.".into(),
                });
            }
            self.cancelled.lock().await.push(order_id.to_string());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockExchange, SubmittedKind};
    use super::*;
    use crate::grid::planner::GridPlanner;
    use crate::grid::types::{Direction, GridRequest};
    use std::sync::atomic::Ordering;

    fn rules() -> MarketRules {
        MarketRules {
            symbol: "BTCUSDT".into(),
            min_price: 1.0,
            max_price: 1_000_000.0,
            min_notional: Some(5.0),
            step_size: 0.001,
            tick_size: 0.1,
        }
    }

    fn plan() -> GridPlan {
        let request = GridRequest {
            symbol: "BTCUSDT".into(),
            direction: Direction::Long,
            entry_price: 100.0,
            distance: 1.0,
            steps: 3,
            total_quantity: 0.03,
            loss_budget: 10.0,
            tp_count: 2,
            tp_distance: 2.0,
            leverage: 20,
        };
        GridPlanner::default().plan(&request, &rules()).unwrap()
    }

    #[tokio::test]
    async fn test_execute_submits_in_order() {
        let exchange = MockExchange::new(rules());
        let plan = plan();
        let mut tracked = TrackedGrid::default();

        OrderExecutor::new(&exchange)
            .execute(&plan, &mut tracked)
            .await
            .unwrap();

        assert_eq!(
            *exchange.leverage_calls.lock().await,
            vec![("BTCUSDT".to_string(), 20)]
        );

        let submitted = exchange.submitted.lock().await;
        let kinds: Vec<SubmittedKind> = submitted.iter().map(|o| o.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SubmittedKind::Limit,
                SubmittedKind::Limit,
                SubmittedKind::Limit,
                SubmittedKind::StopMarket,
                SubmittedKind::ReduceOnlyLimit,
                SubmittedKind::ReduceOnlyLimit,
            ]
        );
        assert_eq!(submitted[0].price, 99.0);
        assert_eq!(submitted[3].side, OrderSide::Sell);

        assert_eq!(tracked.grid, vec!["1", "2", "3"]);
        assert_eq!(tracked.sl.as_deref(), Some("4"));
        assert_eq!(tracked.tp, vec!["5", "6"]);
    }

    #[tokio::test]
    async fn test_reduce_only_fallback_keeps_position() {
        let exchange = MockExchange::new(rules());
        exchange.reject_reduce_only.store(true, Ordering::SeqCst);
        let plan = plan();
        let mut tracked = TrackedGrid::default();

        OrderExecutor::new(&exchange)
            .execute(&plan, &mut tracked)
            .await
            .unwrap();

        let submitted = exchange.submitted.lock().await;
        assert_eq!(submitted.len(), 6);
        assert_eq!(submitted[4].kind, SubmittedKind::Limit);
        assert_eq!(submitted[4].price, 102.0);
        assert_eq!(submitted[5].price, 104.0);
        assert_eq!(tracked.tp, vec![submitted[4].oid.clone(), submitted[5].oid.clone()]);
    }

    #[tokio::test]
    async fn test_other_errors_abort_with_partial_ids() {
        let exchange = MockExchange::new(rules());
        exchange.set_fail_after(Some(2)).await;
        let plan = plan();
        let mut tracked = TrackedGrid::default();

        let err = OrderExecutor::new(&exchange)
            .execute(&plan, &mut tracked)
            .await
            .unwrap_err();

        assert!(matches!(err, GridError::Exchange { .. }));
        assert_eq!(tracked.grid.len(), 2);
        assert!(tracked.sl.is_none());
        assert!(tracked.tp.is_empty());
    }

    #[tokio::test]
    async fn test_take_profit_rejection_is_not_retried() {
        let exchange = MockExchange::new(rules());
        // Grid + stop-loss + first take-profit succeed
        exchange.set_fail_after(Some(5)).await;
        let mut tracked = TrackedGrid::default();

        let result = OrderExecutor::new(&exchange).execute(&plan(), &mut tracked).await;

        assert!(result.is_err());
        assert_eq!(tracked.tp.len(), 1);
        assert_eq!(exchange.submitted.lock().await.len(), 5);
    }

    #[tokio::test]
    async fn test_leverage_fallback_to_raw_request() {
        let exchange = MockExchange::new(rules());
        exchange.leverage_unsupported.store(true, Ordering::SeqCst);
        let mut tracked = TrackedGrid::default();

        OrderExecutor::new(&exchange)
            .execute(&plan(), &mut tracked)
            .await
            .unwrap();

        let raw = exchange.raw_calls.lock().await;
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].0, LEVERAGE_ENDPOINT);
        assert!(raw[0].1.contains(&("leverage".to_string(), "20".to_string())));
        assert!(exchange.leverage_calls.lock().await.is_empty());
    }
}
