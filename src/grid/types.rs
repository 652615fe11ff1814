//! Core data types for grid planning and tracking

use serde::{Deserialize, Serialize};

use super::errors::{GridError, GridResult};

/// Direction of the position the grid builds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Side of the entry (grid) orders
    pub fn entry_side(&self) -> OrderSide {
        match self {
            Direction::Long => OrderSide::Buy,
            Direction::Short => OrderSide::Sell,
        }
    }

    /// Side of the closing orders (stop-loss and take-profits)
    pub fn exit_side(&self) -> OrderSide {
        self.entry_side().opposite()
    }

    /// +1 for long, -1 for short. Profit lies in this direction from entry.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    /// Convert to exchange side string
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// Open orders Binance allows per symbol; one grid may not need more
pub const MAX_OPEN_ORDERS: u32 = 200;

/// Trader inputs for one grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRequest {
    /// Exchange symbol (e.g., "BTCUSDT")
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    /// Price distance between consecutive grid levels
    pub distance: f64,
    /// Number of grid levels
    pub steps: u32,
    /// Quantity split evenly across all levels
    pub total_quantity: f64,
    /// Quote-currency loss accepted if the stop-loss triggers on the full position
    pub loss_budget: f64,
    /// Number of take-profit levels
    pub tp_count: u32,
    /// Price distance between consecutive take-profit levels
    pub tp_distance: f64,
    pub leverage: u32,
}

impl GridRequest {
    /// Validate the request
    pub fn validate(&self) -> GridResult<()> {
        if self.symbol.is_empty() {
            return Err(GridError::InvalidRequest("symbol cannot be empty".into()));
        }

        if self.steps < 1 {
            return Err(GridError::InvalidRequest("steps must be at least 1".into()));
        }

        if !(self.distance > 0.0) {
            return Err(GridError::InvalidRequest("distance must be positive".into()));
        }

        if !(self.total_quantity > 0.0) {
            return Err(GridError::InvalidRequest(
                "total_quantity must be positive".into(),
            ));
        }

        if self.tp_count < 1 {
            return Err(GridError::InvalidRequest(
                "tp_count must be at least 1".into(),
            ));
        }

        // grid levels + one stop-loss + take-profits
        let orders = u64::from(self.steps) + u64::from(self.tp_count) + 1;
        if orders > u64::from(MAX_OPEN_ORDERS) {
            return Err(GridError::InvalidRequest(format!(
                "steps + tp_count + stop-loss is {} orders, at most {} allowed",
                orders, MAX_OPEN_ORDERS
            )));
        }

        if !self.entry_price.is_finite() || !self.tp_distance.is_finite() {
            return Err(GridError::InvalidRequest(
                "prices must be finite numbers".into(),
            ));
        }

        if !(self.loss_budget > 0.0) || !self.loss_budget.is_finite() {
            return Err(GridError::InvalidRequest(
                "loss_budget must be positive".into(),
            ));
        }

        if self.leverage == 0 || self.leverage > 125 {
            return Err(GridError::InvalidRequest(
                "leverage must be between 1 and 125".into(),
            ));
        }

        Ok(())
    }
}

/// One resting limit order of the ladder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridOrderSpec {
    pub price: f64,
    pub quantity: f64,
    pub side: OrderSide,
}

/// Stop-market order closing the whole realized position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopLossSpec {
    pub price: f64,
    pub quantity: f64,
    pub side: OrderSide,
}

/// One take-profit limit order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TakeProfitSpec {
    pub price: f64,
    pub quantity: f64,
    pub side: OrderSide,
}

/// Everything execution will submit for one grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridPlan {
    pub symbol: String,
    pub grid: Vec<GridOrderSpec>,
    pub stop_loss: StopLossSpec,
    pub take_profits: Vec<TakeProfitSpec>,
    pub leverage: u32,
}

impl GridPlan {
    /// Sum of all grid order quantities
    pub fn realized_quantity(&self) -> f64 {
        self.grid.iter().map(|o| o.quantity).sum()
    }
}

/// Order identifiers created for one symbol's grid
///
/// Serialized as `{"grid": [...], "sl": "...", "tp": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedGrid {
    /// Grid order ids, in ladder order
    #[serde(default)]
    pub grid: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sl: Option<String>,
    /// Take-profit order ids, in take-profit order
    #[serde(default)]
    pub tp: Vec<String>,
}

impl TrackedGrid {
    pub fn is_empty(&self) -> bool {
        self.grid.is_empty() && self.sl.is_none() && self.tp.is_empty()
    }

    /// All ids in cancellation order: grid orders, stop-loss, take-profits
    pub fn order_ids(&self) -> impl Iterator<Item = &String> {
        self.grid.iter().chain(self.sl.iter()).chain(self.tp.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GridRequest {
        GridRequest {
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
        }
    }

    #[test]
    fn test_request_validation() {
        assert!(request().validate().is_ok());

        let mut r = request();
        r.steps = 0;
        assert!(r.validate().is_err());

        let mut r = request();
        r.distance = 0.0;
        assert!(r.validate().is_err());

        let mut r = request();
        r.total_quantity = -1.0;
        assert!(r.validate().is_err());

        let mut r = request();
        r.tp_count = 0;
        assert!(r.validate().is_err());

        let mut r = request();
        r.distance = f64::NAN;
        assert!(r.validate().is_err());

        let mut r = request();
        r.loss_budget = 0.0;
        assert!(matches!(r.validate(), Err(GridError::InvalidRequest(_))));
    }

    #[test]
    fn test_order_count_capped() {
        let mut r = request();
        r.steps = u32::MAX;
        assert!(matches!(r.validate(), Err(GridError::InvalidRequest(_))));

        let mut r = request();
        r.tp_count = u32::MAX;
        assert!(matches!(r.validate(), Err(GridError::InvalidRequest(_))));

        // 197 levels + 2 take-profits + stop-loss fills the limit exactly
        let mut r = request();
        r.steps = MAX_OPEN_ORDERS - 3;
        assert!(r.validate().is_ok());
        r.steps += 1;
        assert!(r.validate().is_err());
    }

    #[test]
    fn test_direction_sides() {
        assert_eq!(Direction::Long.entry_side(), OrderSide::Buy);
        assert_eq!(Direction::Long.exit_side(), OrderSide::Sell);
        assert_eq!(Direction::Short.entry_side(), OrderSide::Sell);
        assert_eq!(Direction::Short.exit_side(), OrderSide::Buy);
    }

    #[test]
    fn test_request_json_shape() {
        let json = r#"{
            "symbol": "ETHUSDT", "direction": "short", "entry_price": 2000.0,
            "distance": 10.0, "steps": 4, "total_quantity": 0.4, "loss_budget": 50.0,
            "tp_count": 2, "tp_distance": 20.0, "leverage": 10
        }"#;
        let r: GridRequest = serde_json::from_str(json).unwrap();
        assert_eq!(r.direction, Direction::Short);
        assert_eq!(r.steps, 4);
    }

    #[test]
    fn test_tracked_grid_order_ids() {
        let tracked = TrackedGrid {
            grid: vec!["1".into(), "2".into()],
            sl: Some("3".into()),
            tp: vec!["4".into()],
        };
        let ids: Vec<&str> = tracked.order_ids().map(|s| s.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4"]);

        let json = serde_json::to_value(&tracked).unwrap();
        assert_eq!(json["sl"], "3");
        assert_eq!(json["grid"][1], "2");
        assert!(TrackedGrid::default().is_empty());
    }
}
