//! Execution credit balances
//!
//! An agent's balance pays for delegated execution. Credits leaving an agent
//! (withdrawals, termination refunds) land in the [`PayoutBook`] under the
//! receiving account.

use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use noema_common::error::StateError;
use noema_common::types::account::AccountId;

/// Non-negative credit balance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    available: Decimal,
}

impl Balance {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn available(&self) -> Decimal {
        self.available
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.available <= Decimal::ZERO
    }

    /// Fail unless `amount` could be debited
    pub fn ensure_covers(&self, amount: Decimal) -> Result<(), StateError> {
        if self.available < amount {
            return Err(StateError::InsufficientBalance {
                required: amount,
                available: self.available,
            });
        }
        Ok(())
    }

    pub fn credit(&mut self, amount: Decimal) -> Result<(), StateError> {
        if amount <= Decimal::ZERO {
            return Err(StateError::InvalidAmount);
        }
        self.available = self
            .available
            .checked_add(amount)
            .ok_or(StateError::BalanceOverflow)?;
        Ok(())
    }

    pub fn debit(&mut self, amount: Decimal) -> Result<(), StateError> {
        if amount <= Decimal::ZERO {
            return Err(StateError::InvalidAmount);
        }
        self.ensure_covers(amount)?;
        self.available -= amount;
        Ok(())
    }

    /// Empty the balance, returning what it held
    pub fn drain(&mut self) -> Decimal {
        std::mem::take(&mut self.available)
    }
}

/// Credits paid out of agents, per receiving account
#[derive(Debug, Default)]
pub struct PayoutBook {
    accounts: DashMap<AccountId, Decimal>,
}

impl PayoutBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `amount` to `account`; non-positive amounts are ignored
    pub fn credit(&self, account: AccountId, amount: Decimal) -> Result<(), StateError> {
        if amount <= Decimal::ZERO {
            return Ok(());
        }
        let mut entry = self.accounts.entry(account).or_insert(Decimal::ZERO);
        *entry = entry.checked_add(amount).ok_or(StateError::BalanceOverflow)?;
        Ok(())
    }

    /// Undo a credit that could not be committed
    pub fn reverse(&self, account: &AccountId, amount: Decimal) {
        if amount <= Decimal::ZERO {
            return;
        }
        if let Some(mut entry) = self.accounts.get_mut(account) {
            *entry -= amount;
        }
    }

    pub fn paid_out(&self, account: &AccountId) -> Decimal {
        self.accounts
            .get(account)
            .map(|v| *v.value())
            .unwrap_or(Decimal::ZERO)
    }
}
