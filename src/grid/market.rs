//! Market trading rules and exchange-precision quantity rounding

use serde::{Deserialize, Serialize};

/// Slack allowed when comparing a notional against the exchange minimum
const NOTIONAL_TOLERANCE: f64 = 1e-8;

/// Slack used when converting a float quantity into whole step units
const STEP_TOLERANCE: f64 = 1e-9;

/// Per-symbol trading rules as published by the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRules {
    pub symbol: String,
    /// Lowest tradeable price
    pub min_price: f64,
    /// Highest tradeable price
    pub max_price: f64,
    /// Minimum notional (price * quantity), if the exchange declares one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_notional: Option<f64>,
    /// Quantity increment
    pub step_size: f64,
    /// Price increment
    pub tick_size: f64,
}

impl MarketRules {
    /// Whether an order at `price` would be accepted by the price filter
    pub fn contains_price(&self, price: f64) -> bool {
        price > 0.0 && price >= self.min_price && price <= self.max_price
    }

    /// Clamp a price into the tradeable range
    pub fn clamp_price(&self, price: f64) -> f64 {
        price.max(self.min_price).min(self.max_price)
    }

    /// Minimum notional to enforce, never below `floor`
    pub fn effective_min_notional(&self, floor: f64) -> f64 {
        self.min_notional.unwrap_or(0.0).max(floor)
    }

    /// Truncate a quantity to the tradeable step size
    pub fn amount_to_precision(&self, quantity: f64) -> f64 {
        if self.step_size <= 0.0 {
            return quantity;
        }
        let units = (quantity / self.step_size + STEP_TOLERANCE).floor();
        round_to(units * self.step_size, decimals_of(self.step_size))
    }

    /// Round a price to the nearest tick
    pub fn price_to_precision(&self, price: f64) -> f64 {
        if self.tick_size <= 0.0 {
            return price;
        }
        let ticks = (price / self.tick_size).round();
        round_to(ticks * self.tick_size, decimals_of(self.tick_size))
    }

    /// Quantity formatted for the exchange
    pub fn format_amount(&self, quantity: f64) -> String {
        format!(
            "{:.*}",
            decimals_of(self.step_size) as usize,
            self.amount_to_precision(quantity)
        )
    }

    /// Price formatted for the exchange
    pub fn format_price(&self, price: f64) -> String {
        format!(
            "{:.*}",
            decimals_of(self.tick_size) as usize,
            self.price_to_precision(price)
        )
    }
}

/// Round `target_qty` up to the step size, then keep adding one step until the
/// precision-adjusted notional at `price` reaches `min_notional`.
///
/// The result may exceed the requested quantity; it never falls below
/// `ceil(target_qty / step) * step` and is the smallest such multiple of the step
/// that clears the notional floor.
pub fn round_quantity(rules: &MarketRules, target_qty: f64, price: f64, min_notional: f64) -> f64 {
    let step = rules.step_size;
    if step <= 0.0 {
        return target_qty;
    }

    let mut units = (target_qty / step - STEP_TOLERANCE).ceil().max(0.0);
    let price_p = rules.price_to_precision(price);
    if price_p <= 0.0 {
        return rules.amount_to_precision(units * step);
    }

    loop {
        let qty_p = rules.amount_to_precision(units * step);
        if qty_p > 0.0 && qty_p * price_p >= min_notional - NOTIONAL_TOLERANCE {
            return qty_p;
        }
        units += 1.0;
    }
}

/// Number of decimal places carried by an increment such as 0.001
pub(crate) fn decimals_of(increment: f64) -> u32 {
    let mut decimals = 0;
    let mut scaled = increment.abs();
    while decimals < 12 && (scaled - scaled.round()).abs() > STEP_TOLERANCE * scaled.max(1.0) {
        decimals += 1;
        scaled *= 10.0;
    }
    decimals
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn test_decimals_of() {
        assert_eq!(decimals_of(1.0), 0);
        assert_eq!(decimals_of(0.5), 1);
        assert_eq!(decimals_of(0.001), 3);
        assert_eq!(decimals_of(0.00001), 5);
        assert_eq!(decimals_of(10.0), 0);
    }

    #[test]
    fn test_amount_truncates_to_step() {
        let r = rules();
        assert_eq!(r.amount_to_precision(0.0519), 0.051);
        assert_eq!(r.amount_to_precision(0.051), 0.051);
        // 51 * 0.001 is not exactly 0.051 in binary floating point
        assert_eq!(r.amount_to_precision(51.0 * 0.001), 0.051);
        assert_eq!(r.format_amount(0.0775), "0.077");
    }

    #[test]
    fn test_price_rounds_to_tick() {
        let r = rules();
        assert_eq!(r.price_to_precision(35.48387), 35.5);
        assert_eq!(r.price_to_precision(99.0), 99.0);
        assert_eq!(r.format_price(102.0), "102.0");
    }

    #[test]
    fn test_round_quantity_meets_notional() {
        let r = rules();
        // 0.01 at 99 is far below 5 USDT, so it grows to 0.051 (5.049)
        assert_eq!(round_quantity(&r, 0.01, 99.0, 5.0), 0.051);
        // 0.051 * 98 = 4.998, one more step is needed
        assert_eq!(round_quantity(&r, 0.01, 98.0, 5.0), 0.052);
        assert_eq!(round_quantity(&r, 0.01, 97.0, 5.0), 0.052);
    }

    #[test]
    fn test_round_quantity_keeps_large_targets() {
        let r = rules();
        // Already above the notional: only the step rounding applies
        assert_eq!(round_quantity(&r, 0.5, 100.0, 5.0), 0.5);
        assert_eq!(round_quantity(&r, 0.5004, 100.0, 5.0), 0.501);
    }

    #[test]
    fn test_round_quantity_is_smallest_qualifying_multiple() {
        let r = rules();
        for (target, price) in [(0.003, 250.0), (0.0101, 43.7), (0.2, 12.0), (0.0001, 5000.0)] {
            let qty = round_quantity(&r, target, price, 5.0);
            let floor = (target / r.step_size - 1e-9).ceil() * r.step_size;
            assert!(qty >= floor - 1e-12, "{} below step ceiling {}", qty, floor);
            assert!(qty * price >= 5.0 - 1e-8);

            // One step less either drops below the ceiling or misses the notional
            let smaller = qty - r.step_size;
            assert!(smaller < floor - 1e-12 || smaller * price < 5.0 - 1e-8);
        }
    }

    #[test]
    fn test_effective_min_notional_floor() {
        let mut r = rules();
        r.min_notional = None;
        assert_eq!(r.effective_min_notional(5.0), 5.0);
        r.min_notional = Some(2.0);
        assert_eq!(r.effective_min_notional(5.0), 5.0);
        r.min_notional = Some(100.0);
        assert_eq!(r.effective_min_notional(5.0), 100.0);
    }

    #[test]
    fn test_price_bounds() {
        let r = rules();
        assert!(r.contains_price(1.0));
        assert!(!r.contains_price(0.5));
        assert!(!r.contains_price(-3.0));
        assert_eq!(r.clamp_price(-20.0), 1.0);
        assert_eq!(r.clamp_price(2_000_000.0), 1_000_000.0);
    }
}
