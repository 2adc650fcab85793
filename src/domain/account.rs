use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Side;

/// Net position in one (account, symbol) pair.
///
/// Created lazily on the first fill and never deleted; a zero net quantity
/// is a valid steady state, not a removal. `realized_pnl` accumulates over
/// the pair's full history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub account_id: String,
    pub symbol: String,
    pub net_quantity: Decimal,
    pub average_entry_price: Decimal,
    pub realized_pnl: Decimal,
}

impl Position {
    pub fn new(account_id: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            symbol: symbol.into(),
            net_quantity: Decimal::ZERO,
            average_entry_price: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.net_quantity.is_zero()
    }

    pub fn is_long(&self) -> bool {
        self.net_quantity > Decimal::ZERO
    }

    /// Apply a fill to the position and return the realized P&L delta.
    ///
    /// Extending the position (same direction, or from flat) recomputes the
    /// entry price by weighted average cost. Reducing realizes
    /// `closing_qty × (fill_price − avg_entry)` signed by the position's
    /// direction. A reversal realizes the full closing leg and re-opens the
    /// residual at the fill price.
    pub fn apply_fill(&mut self, side: Side, quantity: Decimal, price: Decimal) -> Decimal {
        let signed_qty = quantity * side.sign();

        if self.net_quantity.is_zero() || self.net_quantity.signum() == signed_qty.signum() {
            // Extending
            let prior_abs = self.net_quantity.abs();
            let new_abs = prior_abs + quantity;
            self.average_entry_price =
                (self.average_entry_price * prior_abs + price * quantity) / new_abs;
            self.net_quantity += signed_qty;
            return Decimal::ZERO;
        }

        // Reducing or reversing
        let closing_qty = quantity.min(self.net_quantity.abs());
        let direction = self.net_quantity.signum();
        let realized = closing_qty * (price - self.average_entry_price) * direction;
        self.realized_pnl += realized;
        self.net_quantity += signed_qty;

        if self.net_quantity.is_zero() {
            self.average_entry_price = Decimal::ZERO;
        } else if self.net_quantity.signum() != direction {
            // Reversed: residual opens at the fill price
            self.average_entry_price = price;
        }
        realized
    }

    /// Mark-to-market P&L of the open quantity against a snapshot price.
    pub fn unrealized_pnl(&self, mark: Decimal) -> Decimal {
        self.net_quantity * (mark - self.average_entry_price)
    }
}

/// Cash state for one account.
///
/// `reserved_cash` is notional committed to unfilled LIMIT BUY orders, so
/// the account cannot overspend before those orders fill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub cash_balance: Decimal,
    pub reserved_cash: Decimal,
}

impl Account {
    pub fn new(account_id: impl Into<String>, starting_cash: Decimal) -> Self {
        Self {
            account_id: account_id.into(),
            cash_balance: starting_cash,
            reserved_cash: Decimal::ZERO,
        }
    }

    /// Cash not yet committed to resting orders.
    pub fn available_cash(&self) -> Decimal {
        self.cash_balance - self.reserved_cash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn extending_uses_weighted_average_cost() {
        let mut pos = Position::new("a1", "BTCUSDT");
        assert_eq!(pos.apply_fill(Side::Buy, dec!(10), dec!(100)), dec!(0));
        assert_eq!(pos.apply_fill(Side::Buy, dec!(10), dec!(110)), dec!(0));
        assert_eq!(pos.net_quantity, dec!(20));
        assert_eq!(pos.average_entry_price, dec!(105));
    }

    #[test]
    fn reducing_realizes_pnl() {
        let mut pos = Position::new("a1", "BTCUSDT");
        pos.apply_fill(Side::Buy, dec!(10), dec!(100));
        let realized = pos.apply_fill(Side::Sell, dec!(4), dec!(110));
        // 4 * (110 - 100)
        assert_eq!(realized, dec!(40));
        assert_eq!(pos.net_quantity, dec!(6));
        assert_eq!(pos.average_entry_price, dec!(100));
        assert_eq!(pos.realized_pnl, dec!(40));
    }

    #[test]
    fn closing_to_flat_resets_entry_price() {
        let mut pos = Position::new("a1", "BTCUSDT");
        pos.apply_fill(Side::Buy, dec!(5), dec!(100));
        let realized = pos.apply_fill(Side::Sell, dec!(5), dec!(90));
        assert_eq!(realized, dec!(-50));
        assert!(pos.is_flat());
        assert_eq!(pos.average_entry_price, dec!(0));
    }

    #[test]
    fn reversal_reopens_at_fill_price() {
        let mut pos = Position::new("a1", "ETHUSDT");
        pos.apply_fill(Side::Buy, dec!(5), dec!(100));
        let realized = pos.apply_fill(Side::Sell, dec!(8), dec!(120));
        // Closes 5 at +20 each; opens 3 short at 120
        assert_eq!(realized, dec!(100));
        assert_eq!(pos.net_quantity, dec!(-3));
        assert_eq!(pos.average_entry_price, dec!(120));
    }

    #[test]
    fn short_position_pnl_signs() {
        let mut pos = Position::new("a1", "ETHUSDT");
        pos.apply_fill(Side::Sell, dec!(10), dec!(100));
        assert_eq!(pos.net_quantity, dec!(-10));
        // Price drops: short gains
        let realized = pos.apply_fill(Side::Buy, dec!(10), dec!(95));
        assert_eq!(realized, dec!(50));
        assert!(pos.is_flat());
    }

    #[test]
    fn unrealized_pnl_marks_against_the_snapshot_price() {
        let mut pos = Position::new("a1", "BTCUSDT");
        pos.apply_fill(Side::Buy, dec!(2), dec!(50000));
        assert_eq!(pos.unrealized_pnl(dec!(51000)), dec!(2000));

        let mut short = Position::new("a1", "ETHUSDT");
        short.apply_fill(Side::Sell, dec!(4), dec!(3000));
        assert_eq!(short.unrealized_pnl(dec!(2900)), dec!(400));
    }

    #[test]
    fn available_cash_excludes_reservations() {
        let mut acct = Account::new("a1", dec!(1000));
        acct.reserved_cash = dec!(300);
        assert_eq!(acct.available_cash(), dec!(700));
    }
}
