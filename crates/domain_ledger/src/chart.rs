//! Chart of accounts operations

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use core_kernel::{AccountId, Actor};

use crate::account::{Account, AccountFilter, AccountStatus, AccountUpdate, NewAccount, AccountCategory};
use crate::entry::{EntryStatus, LineQuery};
use crate::error::{LedgerError, LedgerResult};
use crate::store::{LedgerTx, RowLock};

/// Creates an account
///
/// # Errors
///
/// - `CodeConflict` if the code is already used, ignoring case
/// - `UnknownAccount` if the parent code does not exist
/// - `IncompatibleParentType` if the parent has a different type
#[instrument(skip(tx, new, actor), fields(code = %new.code))]
pub async fn create_account<T: LedgerTx>(
    tx: &mut T,
    new: NewAccount,
    actor: &Actor,
    now: DateTime<Utc>,
) -> LedgerResult<Account> {
    let code = new.code.trim().to_string();
    if code.is_empty() {
        return Err(LedgerError::validation("account code is required"));
    }
    if new.name.trim().is_empty() {
        return Err(LedgerError::validation("account name is required"));
    }
    if tx.find_account_by_code(&code).await?.is_some() {
        return Err(LedgerError::CodeConflict(code));
    }

    let category = new
        .category
        .unwrap_or_else(|| AccountCategory::default_for(new.account_type));
    if !category.fits(new.account_type) {
        return Err(LedgerError::validation(format!(
            "category {:?} does not apply to {} accounts",
            category, new.account_type
        )));
    }

    let parent_id = match &new.parent_code {
        Some(parent_code) => {
            let parent = get_account_by_code(tx, parent_code).await?;
            if parent.account_type != new.account_type {
                return Err(LedgerError::IncompatibleParentType {
                    parent: parent.code,
                    parent_type: parent.account_type,
                    expected: new.account_type,
                });
            }
            Some(parent.id)
        }
        None => None,
    };

    let account = Account {
        id: AccountId::new_v7(),
        normal_balance: new.normal_balance(),
        code,
        name: new.name.trim().to_string(),
        account_type: new.account_type,
        category,
        parent_id,
        description: new.description,
        opening_balance: new.opening_balance,
        current_balance: new.opening_balance,
        status: AccountStatus::Active,
        is_cash: new.is_cash,
        is_bank: new.is_bank,
        is_contra: new.is_contra,
        created_by: actor.clone(),
        created_at: now,
        updated_at: now,
    };
    tx.insert_account(&account).await?;

    info!(
        code = %account.code,
        account_type = %account.account_type,
        normal_balance = ?account.normal_balance,
        "Created account"
    );
    Ok(account)
}

/// Applies descriptive changes to an account
///
/// The opening balance may only change while no balance roll-ups exist
/// for the account.
pub async fn update_account<T: LedgerTx>(
    tx: &mut T,
    code: &str,
    update: AccountUpdate,
    now: DateTime<Utc>,
) -> LedgerResult<Account> {
    let mut account = lock_account_by_code(tx, code).await?;

    if let Some(name) = update.name {
        if name.trim().is_empty() {
            return Err(LedgerError::validation("account name is required"));
        }
        account.name = name.trim().to_string();
    }
    if let Some(category) = update.category {
        if !category.fits(account.account_type) {
            return Err(LedgerError::validation(format!(
                "category {:?} does not apply to {} accounts",
                category, account.account_type
            )));
        }
        account.category = category;
    }
    if let Some(description) = update.description {
        account.description = description;
    }
    if let Some(parent_code) = update.parent_code {
        account.parent_id = match parent_code {
            Some(parent_code) => Some(resolve_parent(tx, &account, &parent_code).await?),
            None => None,
        };
    }
    if let Some(is_cash) = update.is_cash {
        account.is_cash = is_cash;
    }
    if let Some(is_bank) = update.is_bank {
        account.is_bank = is_bank;
    }
    if let Some(opening_balance) = update.opening_balance {
        if opening_balance != account.opening_balance {
            let rollups = tx.balances_for_account(account.id, RowLock::None).await?;
            if !rollups.is_empty() {
                return Err(LedgerError::AccountInUse {
                    code: account.code,
                    reason: "opening balance is fixed once postings exist".to_string(),
                });
            }
            account.opening_balance = opening_balance;
            account.current_balance = opening_balance;
        }
    }

    account.updated_at = now;
    tx.update_account(&account).await?;
    Ok(account)
}

async fn resolve_parent<T: LedgerTx>(tx: &mut T, account: &Account, parent_code: &str) -> LedgerResult<AccountId> {
    let parent = get_account_by_code(tx, parent_code).await?;
    if parent.account_type != account.account_type {
        return Err(LedgerError::IncompatibleParentType {
            parent: parent.code,
            parent_type: parent.account_type,
            expected: account.account_type,
        });
    }

    // Walk up from the new parent; reaching the account itself means a cycle.
    let mut cursor = Some(parent.clone());
    while let Some(ancestor) = cursor {
        if ancestor.id == account.id {
            return Err(LedgerError::validation(format!(
                "{} cannot be placed under its own descendant {}",
                account.code, parent.code
            )));
        }
        cursor = match ancestor.parent_id {
            Some(id) => tx.find_account(id, RowLock::None).await?,
            None => None,
        };
    }
    Ok(parent.id)
}

/// Deactivates an account
///
/// # Errors
///
/// Returns `AccountInUse` while the account carries a non-zero current
/// balance or appears on any draft entry.
pub async fn deactivate_account<T: LedgerTx>(
    tx: &mut T,
    code: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> LedgerResult<Account> {
    let mut account = lock_account_by_code(tx, code).await?;
    if account.status != AccountStatus::Active {
        return Err(LedgerError::InvalidStateTransition(format!(
            "account {} is not active",
            account.code
        )));
    }
    if !account.current_balance.is_zero() {
        return Err(LedgerError::AccountInUse {
            code: account.code,
            reason: format!("current balance is {}", account.current_balance),
        });
    }
    let drafts = tx
        .ledger_lines(&LineQuery::with_statuses(&[EntryStatus::Draft]).for_account(account.id))
        .await?;
    if let Some(draft) = drafts.first() {
        return Err(LedgerError::AccountInUse {
            code: account.code,
            reason: format!("used by draft entry {}", draft.entry_number),
        });
    }

    account.status = AccountStatus::Inactive;
    account.updated_at = now;
    tx.update_account(&account).await?;

    info!(code = %account.code, actor = %actor, "Deactivated account");
    Ok(account)
}

/// Returns an inactive account to service
pub async fn reactivate_account<T: LedgerTx>(
    tx: &mut T,
    code: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> LedgerResult<Account> {
    let mut account = lock_account_by_code(tx, code).await?;
    if account.status != AccountStatus::Inactive {
        return Err(LedgerError::InvalidStateTransition(format!(
            "account {} is {:?}, expected inactive",
            account.code, account.status
        )));
    }
    account.status = AccountStatus::Active;
    account.updated_at = now;
    tx.update_account(&account).await?;

    info!(code = %account.code, actor = %actor, "Reactivated account");
    Ok(account)
}

/// Looks an account up by code, ignoring case
pub async fn get_account_by_code<T: LedgerTx>(tx: &mut T, code: &str) -> LedgerResult<Account> {
    tx.find_account_by_code(code.trim())
        .await?
        .ok_or_else(|| LedgerError::UnknownAccount(code.to_string()))
}

pub async fn get_account<T: LedgerTx>(tx: &mut T, id: AccountId) -> LedgerResult<Account> {
    tx.find_account(id, RowLock::None)
        .await?
        .ok_or_else(|| LedgerError::UnknownAccount(id.to_string()))
}

/// Lists accounts matching `filter`, ordered by code
pub async fn iterate_accounts<T: LedgerTx>(tx: &mut T, filter: &AccountFilter) -> LedgerResult<Vec<Account>> {
    Ok(tx.list_accounts(filter).await?)
}

/// Direct children of an account
pub async fn child_accounts<T: LedgerTx>(tx: &mut T, code: &str) -> LedgerResult<Vec<Account>> {
    let parent = get_account_by_code(tx, code).await?;
    let filter = AccountFilter::all().of_type(parent.account_type);
    Ok(tx
        .list_accounts(&filter)
        .await?
        .into_iter()
        .filter(|a| a.parent_id == Some(parent.id))
        .collect())
}

async fn lock_account_by_code<T: LedgerTx>(tx: &mut T, code: &str) -> LedgerResult<Account> {
    let account = get_account_by_code(tx, code).await?;
    tx.find_account(account.id, RowLock::Exclusive)
        .await?
        .ok_or_else(|| LedgerError::UnknownAccount(code.to_string()))
}
