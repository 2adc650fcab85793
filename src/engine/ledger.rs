//! Account ledger
//!
//! Cash spans every symbol an account trades, so Account state cannot live
//! inside a single (account, symbol) partition. It lives here instead,
//! keyed by account with a per-entry lock: each reservation, release, and
//! settlement is atomic under that lock, and the partition performs them
//! inside its serialized fill section so the order/position/cash effects
//! of one fill commit as a single unit.

use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::domain::{Account, Side};

pub struct AccountLedger {
    accounts: DashMap<String, Account>,
    starting_cash: Decimal,
    fee_bps: u32,
}

impl AccountLedger {
    pub fn new(starting_cash: Decimal, fee_bps: u32) -> Self {
        Self {
            accounts: DashMap::new(),
            starting_cash,
            fee_bps,
        }
    }

    /// Fee charged on a fill of the given notional.
    pub fn fee(&self, notional: Decimal) -> Decimal {
        notional * Decimal::from(self.fee_bps) / Decimal::from(10_000)
    }

    fn with_account<R>(&self, account_id: &str, f: impl FnOnce(&mut Account) -> R) -> R {
        let mut entry = self
            .accounts
            .entry(account_id.to_string())
            .or_insert_with(|| Account::new(account_id, self.starting_cash));
        f(&mut entry)
    }

    /// Check whether the account could spend `amount` right now.
    pub fn can_spend(&self, account_id: &str, amount: Decimal) -> bool {
        self.with_account(account_id, |acct| acct.available_cash() >= amount)
    }

    /// Reserve notional for a resting LIMIT BUY. Returns false without
    /// side effects when available cash is insufficient.
    pub fn try_reserve(&self, account_id: &str, amount: Decimal) -> bool {
        self.with_account(account_id, |acct| {
            if acct.available_cash() < amount {
                return false;
            }
            acct.reserved_cash += amount;
            true
        })
    }

    /// Release a reservation (order canceled, or fill about to settle).
    pub fn release(&self, account_id: &str, amount: Decimal) {
        self.with_account(account_id, |acct| {
            acct.reserved_cash = (acct.reserved_cash - amount).max(Decimal::ZERO);
        });
    }

    /// Settle a fill's cash effect: debit notional + fee on a BUY, credit
    /// notional − fee on a SELL, releasing `release` of reserved cash
    /// first. Returns the account state after settlement.
    pub fn settle_fill(
        &self,
        account_id: &str,
        side: Side,
        notional: Decimal,
        release: Decimal,
    ) -> Account {
        let fee = self.fee(notional);
        self.with_account(account_id, |acct| {
            acct.reserved_cash = (acct.reserved_cash - release).max(Decimal::ZERO);
            match side {
                Side::Buy => acct.cash_balance -= notional + fee,
                Side::Sell => acct.cash_balance += notional - fee,
            }
            acct.clone()
        })
    }

    /// Current state of an account, if it has been seen.
    pub fn account(&self, account_id: &str) -> Option<Account> {
        self.accounts.get(account_id).map(|a| a.clone())
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }
}
