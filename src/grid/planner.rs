//! Grid planner - turns a [`GridRequest`] into the orders execution will submit
//!
//! Planning is pure: the same request and market rules always produce the same
//! plan, so a preview shows exactly what creation will place. Prices are rounded
//! to the tick and quantities truncated to the step here, not at submission.

use log::debug;

use super::errors::{GridError, GridResult};
use super::market::{round_quantity, MarketRules};
use super::types::{GridOrderSpec, GridPlan, GridRequest, StopLossSpec, TakeProfitSpec};

/// Exchange-wide notional floor applied when a market declares none or a smaller one
pub const DEFAULT_MIN_NOTIONAL_FLOOR: f64 = 5.0;

/// Grid planner
#[derive(Debug, Clone, Copy)]
pub struct GridPlanner {
    min_notional_floor: f64,
}

impl Default for GridPlanner {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_NOTIONAL_FLOOR)
    }
}

impl GridPlanner {
    pub fn new(min_notional_floor: f64) -> Self {
        Self { min_notional_floor }
    }

    /// Candidate ladder prices, stepping away from entry against the position
    ///
    /// Long grids buy below entry, short grids sell above it.
    pub fn candidate_prices(request: &GridRequest) -> impl Iterator<Item = f64> + '_ {
        let sign = request.direction.sign();
        (1..=request.steps)
            .map(move |i| request.entry_price - sign * request.distance * i as f64)
    }

    /// Build the full plan
    pub fn plan(&self, request: &GridRequest, rules: &MarketRules) -> GridResult<GridPlan> {
        request.validate()?;

        let min_notional = rules.effective_min_notional(self.min_notional_floor);
        let qty_per_order = request.total_quantity / request.steps as f64;
        let entry_side = request.direction.entry_side();
        let exit_side = request.direction.exit_side();

        let grid: Vec<GridOrderSpec> = Self::candidate_prices(request)
            .map(|price| rules.price_to_precision(price))
            .filter(|price| rules.contains_price(*price))
            .map(|price| GridOrderSpec {
                price,
                quantity: round_quantity(rules, qty_per_order, price, min_notional),
                side: entry_side,
            })
            .collect();

        if grid.is_empty() {
            return Err(GridError::NoViableOrders);
        }

        let realized = rules.amount_to_precision(grid.iter().map(|o| o.quantity).sum());
        let sign = request.direction.sign();

        let stop_price = rules.price_to_precision(
            rules.clamp_price(request.entry_price - sign * request.loss_budget / realized),
        );
        // Must sit on the losing side of entry or it triggers at once
        if sign * (request.entry_price - stop_price) <= 0.0 {
            return Err(GridError::InvalidRequest(format!(
                "stop-loss {} does not lie on the loss side of entry {}",
                stop_price, request.entry_price
            )));
        }
        let stop_loss = StopLossSpec {
            price: stop_price,
            quantity: realized,
            side: exit_side,
        };

        let tp_quantity = rules.amount_to_precision(realized / request.tp_count as f64);
        let take_profits: Vec<TakeProfitSpec> = (1..=request.tp_count)
            .map(|i| {
                rules.price_to_precision(request.entry_price + sign * request.tp_distance * i as f64)
            })
            .filter(|price| rules.contains_price(*price))
            .map(|price| TakeProfitSpec {
                price,
                quantity: tp_quantity,
                side: exit_side,
            })
            .collect();

        debug!(
            "Planned {} grid orders ({} requested), realized qty {}, {} take-profits for {}",
            grid.len(),
            request.steps,
            realized,
            take_profits.len(),
            request.symbol
        );

        Ok(GridPlan {
            symbol: request.symbol.clone(),
            grid,
            stop_loss,
            take_profits,
            leverage: request.leverage,
        })
    }
}
