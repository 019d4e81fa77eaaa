use atelier_core::error::{MarketError, MarketResult};
use atelier_core::id::{Address, Amount};
use log::debug;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Per-address balances that purchases are settled against
#[derive(Debug, Default)]
pub struct Balances {
    accounts: Mutex<HashMap<Address, Amount>>,
}

impl Balances {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_accounts(&self) -> MarketResult<MutexGuard<'_, HashMap<Address, Amount>>> {
        self.accounts
            .lock()
            .map_err(|e| MarketError::poisoned("balances", e))
    }

    /// Credit `amount` to `account`, returning the new balance
    pub fn deposit(&self, account: Address, amount: Amount) -> MarketResult<Amount> {
        let mut accounts = self.lock_accounts()?;
        let balance = accounts.get(&account).copied().unwrap_or(0);
        let updated = balance
            .checked_add(amount)
            .ok_or(MarketError::BalanceOverflow(account))?;
        accounts.insert(account, updated);

        debug!("Deposited {} to {}, balance now {}", amount, account, updated);
        Ok(updated)
    }

    pub fn balance_of(&self, account: &Address) -> MarketResult<Amount> {
        Ok(self.lock_accounts()?.get(account).copied().unwrap_or(0))
    }

    /// Sum of all balances
    pub fn total_supply(&self) -> MarketResult<Amount> {
        Ok(self.lock_accounts()?.values().sum())
    }

    /// Take exclusive hold of the book.
    ///
    /// Every other reader and writer blocks until the returned sheet is
    /// dropped, so transfers prepared and applied through one sheet are
    /// never observed half-done.
    pub fn reserve(&self) -> MarketResult<BalanceSheet<'_>> {
        Ok(BalanceSheet {
            accounts: self.lock_accounts()?,
        })
    }
}

/// A validated transfer, ready to apply on the sheet that prepared it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreparedTransfer {
    pub from: Address,
    pub to: Address,
    pub amount: Amount,
    from_after: Amount,
    to_after: Amount,
}

/// Exclusive view of the balance book
#[derive(Debug)]
pub struct BalanceSheet<'a> {
    accounts: MutexGuard<'a, HashMap<Address, Amount>>,
}

impl BalanceSheet<'_> {
    pub fn balance_of(&self, account: &Address) -> Amount {
        self.accounts.get(account).copied().unwrap_or(0)
    }

    /// Validate moving `amount` from `from` to `to` without touching balances
    ///
    /// # Errors
    /// * `InsufficientFunds` - `from` holds less than `amount`
    /// * `BalanceOverflow` - crediting `to` would overflow
    pub fn prepare_transfer(
        &self,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> MarketResult<PreparedTransfer> {
        let available = self.balance_of(from);
        let from_after = available
            .checked_sub(amount)
            .ok_or(MarketError::InsufficientFunds {
                account: *from,
                available,
                required: amount,
            })?;

        let (from_after, to_after) = if from == to {
            (available, available)
        } else {
            let to_after = self
                .balance_of(to)
                .checked_add(amount)
                .ok_or(MarketError::BalanceOverflow(*to))?;
            (from_after, to_after)
        };

        Ok(PreparedTransfer {
            from: *from,
            to: *to,
            amount,
            from_after,
            to_after,
        })
    }

    /// Apply a transfer prepared on this sheet
    pub fn apply(&mut self, transfer: PreparedTransfer) {
        self.accounts.insert(transfer.from, transfer.from_after);
        self.accounts.insert(transfer.to, transfer.to_after);
    }
}
