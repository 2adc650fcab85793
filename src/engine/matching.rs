//! Matching & Fill Simulator
//!
//! Decides whether a working order fills against the current market
//! snapshot, at what price, and for what quantity. There is no order book
//! depth here: market orders fill their full remaining quantity at the
//! snapshot price moved adversely by the configured slippage, and limit
//! orders fill fully at the tick that touches or crosses their limit.

use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;

use crate::domain::{Order, OrderStatus, OrderType, Side};

/// A fill the simulator has decided to produce. The caller turns this into
/// an immutable `Fill` and commits it together with the ledger effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillDecision {
    pub price: Decimal,
    pub quantity: Decimal,
    pub slippage_bps: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    slippage_bps: u32,
}

impl Matcher {
    pub fn new(slippage_bps: u32) -> Self {
        Self { slippage_bps }
    }

    /// Evaluate a working order against the tick that triggered
    /// re-evaluation. `previous_price` is the snapshot price before that
    /// tick, used to detect the price path gapping through a limit level.
    pub fn evaluate(
        &self,
        order: &Order,
        tick_price: Decimal,
        previous_price: Option<Decimal>,
    ) -> Option<FillDecision> {
        if !matches!(
            order.status,
            OrderStatus::Working | OrderStatus::PartiallyFilled
        ) {
            return None;
        }
        let remaining = order.remaining_quantity();
        if remaining <= Decimal::ZERO {
            return None;
        }

        match order.order_type {
            OrderType::Market => Some(FillDecision {
                price: self.market_fill_price(tick_price, order.side),
                quantity: remaining,
                slippage_bps: self.slippage_bps,
            }),
            OrderType::Limit => {
                let limit = order.limit_price?;
                if Self::limit_triggered(order.side, limit, tick_price, previous_price) {
                    // The trader's price level was reached; the fill honors
                    // the triggering tick's price with no slippage.
                    Some(FillDecision {
                        price: tick_price,
                        quantity: remaining,
                        slippage_bps: 0,
                    })
                } else {
                    None
                }
            }
        }
    }

    /// Market-order fill price: adverse deviation of `slippage_bps` basis
    /// points, +1 for BUY and -1 for SELL.
    pub fn market_fill_price(&self, market_price: Decimal, side: Side) -> Decimal {
        let bps = Decimal::from(self.slippage_bps) / Decimal::from(10_000);
        market_price * (Decimal::ONE + side.sign() * bps)
    }

    /// A limit order triggers when the tick touches its level (price at or
    /// better than the limit for the order's side) or when the price path
    /// since the previous tick crossed the level outright.
    fn limit_triggered(
        side: Side,
        limit: Decimal,
        tick_price: Decimal,
        previous_price: Option<Decimal>,
    ) -> bool {
        let touched = match side {
            Side::Buy => tick_price <= limit,
            Side::Sell => tick_price >= limit,
        };
        if touched {
            return true;
        }
        match previous_price {
            Some(prev) => (prev - limit).signum() * (tick_price - limit).signum() < Decimal::ZERO,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Signal;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn order(side: Side, order_type: OrderType, qty: Decimal, limit: Option<Decimal>) -> Order {
        let signal = Signal {
            signal_id: "sig".into(),
            account_id: "acct".into(),
            symbol: "BTCUSDT".into(),
            side,
            order_type,
            quantity: qty,
            limit_price: limit,
            received_at: Utc::now(),
        };
        let mut order = Order::from_signal(&signal);
        order.transition(OrderStatus::Working).unwrap();
        order
    }

    #[test]
    fn market_buy_slips_against_the_trader() {
        let matcher = Matcher::new(10);
        let order = order(Side::Buy, OrderType::Market, dec!(10), None);
        let decision = matcher.evaluate(&order, dec!(50000), None).unwrap();
        // 50000 * (1 + 10/10000) = 50050
        assert_eq!(decision.price, dec!(50050));
        assert_eq!(decision.quantity, dec!(10));
        assert_eq!(decision.slippage_bps, 10);
    }

    #[test]
    fn market_sell_slips_downward() {
        let matcher = Matcher::new(10);
        let order = order(Side::Sell, OrderType::Market, dec!(2), None);
        let decision = matcher.evaluate(&order, dec!(50000), None).unwrap();
        assert_eq!(decision.price, dec!(49950));
    }

    #[test]
    fn buy_limit_triggers_at_or_below_limit() {
        let matcher = Matcher::new(10);
        let order = order(Side::Buy, OrderType::Limit, dec!(1), Some(dec!(48000)));

        assert!(matcher.evaluate(&order, dec!(48500), Some(dec!(49000))).is_none());
        let decision = matcher
            .evaluate(&order, dec!(47900), Some(dec!(48500)))
            .unwrap();
        // Limit fills honor the triggering tick, no slippage
        assert_eq!(decision.price, dec!(47900));
        assert_eq!(decision.slippage_bps, 0);
    }

    #[test]
    fn sell_limit_triggers_at_or_above_limit() {
        let matcher = Matcher::new(10);
        let order = order(Side::Sell, OrderType::Limit, dec!(1), Some(dec!(52000)));

        assert!(matcher.evaluate(&order, dec!(51000), Some(dec!(50000))).is_none());
        let decision = matcher
            .evaluate(&order, dec!(52100), Some(dec!(51000)))
            .unwrap();
        assert_eq!(decision.price, dec!(52100));
    }

    #[test]
    fn sell_limit_fills_when_price_path_crosses_down() {
        // Price gaps from above the limit to below it: the level traded,
        // so the resting order executes at the triggering tick's price.
        let matcher = Matcher::new(10);
        let order = order(Side::Sell, OrderType::Limit, dec!(5), Some(dec!(48000)));

        let decision = matcher
            .evaluate(&order, dec!(47900), Some(dec!(49000)))
            .unwrap();
        assert_eq!(decision.price, dec!(47900));
        assert_eq!(decision.quantity, dec!(5));
    }

    #[test]
    fn no_cross_detection_without_a_previous_price() {
        let matcher = Matcher::new(10);
        let order = order(Side::Sell, OrderType::Limit, dec!(5), Some(dec!(48000)));
        assert!(matcher.evaluate(&order, dec!(47900), None).is_none());
    }

    #[test]
    fn terminal_and_unstarted_orders_never_match() {
        let matcher = Matcher::new(10);
        let mut o = order(Side::Buy, OrderType::Market, dec!(1), None);
        o.transition(OrderStatus::Canceled).unwrap();
        assert!(matcher.evaluate(&o, dec!(50000), None).is_none());
    }

    #[test]
    fn remaining_quantity_is_the_fill_amount() {
        let matcher = Matcher::new(0);
        let mut o = order(Side::Buy, OrderType::Market, dec!(10), None);
        let fill = crate::domain::Fill::new(o.order_id, dec!(100), dec!(4), 0, 1);
        o.apply_fill(&fill).unwrap();

        let decision = matcher.evaluate(&o, dec!(100), None).unwrap();
        assert_eq!(decision.quantity, dec!(6));
    }
}
