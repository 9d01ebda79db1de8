//! Period registry
//!
//! Accounting periods are contiguous, inclusive date ranges. Regular periods
//! never overlap and, outside of bootstrap, never leave gaps. An adjustment
//! period may share the closing date of its regular period; it is only used
//! when an entry pins it explicitly.

use chrono::{DateTime, Month, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{info, instrument};

use core_kernel::{Actor, Amount, DateRange, JournalEntryId, PeriodId};

use crate::error::{LedgerError, LedgerResult};
use crate::store::{LedgerTx, RowLock};

/// Status of an accounting period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodStatus {
    Open,
    Closed,
    /// Closed and frozen against reopening
    Locked,
}

impl PeriodStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodStatus::Open => "open",
            PeriodStatus::Closed => "closed",
            PeriodStatus::Locked => "locked",
        }
    }
}

/// An accounting period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountingPeriod {
    pub id: PeriodId,
    pub name: String,
    pub start_date: NaiveDate,
    /// Inclusive
    pub end_date: NaiveDate,
    pub status: PeriodStatus,
    pub is_current: bool,
    pub is_adjustment: bool,
    /// Equity carried in from the preceding period's close
    pub opening_equity: Amount,
    pub closing_equity: Option<Amount>,
    pub closing_entry_id: Option<JournalEntryId>,
    pub closed_by: Option<Actor>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closing_notes: Option<String>,
    pub created_by: Actor,
    pub created_at: DateTime<Utc>,
}

impl AccountingPeriod {
    pub fn range(&self) -> DateRange {
        DateRange {
            start: self.start_date,
            end: self.end_date,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.range().contains(date)
    }

    pub fn is_open(&self) -> bool {
        self.status == PeriodStatus::Open
    }

    /// Ledger order: by end date, the regular period before its adjustment
    /// period, then by start date.
    pub fn ledger_order(&self, other: &AccountingPeriod) -> Ordering {
        (self.end_date, self.is_adjustment, self.start_date)
            .cmp(&(other.end_date, other.is_adjustment, other.start_date))
    }

    /// Returns true if this period comes before `other` in ledger order
    pub fn precedes(&self, other: &AccountingPeriod) -> bool {
        self.id != other.id && self.ledger_order(other) == Ordering::Less
    }

    /// Checks that `date` may be posted into this period
    pub fn ensure_postable(&self, date: NaiveDate) -> LedgerResult<()> {
        if !self.contains(date) {
            return Err(LedgerError::validation(format!(
                "{} falls outside period {} ({} to {})",
                date, self.name, self.start_date, self.end_date
            )));
        }
        match self.status {
            PeriodStatus::Open => Ok(()),
            PeriodStatus::Closed => Err(LedgerError::PeriodClosed {
                period: self.name.clone(),
                date,
            }),
            PeriodStatus::Locked => Err(LedgerError::PeriodLocked(self.name.clone())),
        }
    }
}

/// Sorts periods into ledger order
pub fn sort_periods(periods: &mut [AccountingPeriod]) {
    periods.sort_by(|a, b| a.ledger_order(b));
}

/// Request to create a period
#[derive(Debug, Clone)]
pub struct NewPeriod {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_adjustment: bool,
    /// Skips the contiguity check; reserved for bootstrap
    pub allow_gap: bool,
}

impl NewPeriod {
    pub fn new(name: impl Into<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            name: name.into(),
            start_date,
            end_date,
            is_adjustment: false,
            allow_gap: false,
        }
    }

    pub fn adjustment(mut self) -> Self {
        self.is_adjustment = true;
        self
    }

    pub fn allow_gap(mut self) -> Self {
        self.allow_gap = true;
        self
    }
}

/// Period length used when generating a fiscal year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodFrequency {
    Monthly,
    Quarterly,
}

/// Creates an accounting period
///
/// # Errors
///
/// - `OverlappingPeriod` if a regular period overlaps another regular period
///   (or an adjustment period overlaps another adjustment period)
/// - `GapNotAllowed` if the period does not start the day after its
///   predecessor or end the day before its successor, unless `allow_gap` is set
/// - `ValidationFailure` if an adjustment period does not end with, and
///   start inside, an existing regular period
#[instrument(skip(tx, new, actor), fields(name = %new.name))]
pub async fn create_period<T: LedgerTx>(
    tx: &mut T,
    new: NewPeriod,
    actor: &Actor,
    now: DateTime<Utc>,
) -> LedgerResult<AccountingPeriod> {
    let range = DateRange::new(new.start_date, new.end_date)?;
    let name = new.name.trim().to_string();
    if name.is_empty() {
        return Err(LedgerError::validation("period name is required"));
    }

    let periods = tx.list_periods().await?;
    if periods.iter().any(|p| p.name.eq_ignore_ascii_case(&name)) {
        return Err(LedgerError::validation(format!("period name {} already used", name)));
    }

    let peers: Vec<&AccountingPeriod> = periods
        .iter()
        .filter(|p| p.is_adjustment == new.is_adjustment)
        .collect();
    if let Some(existing) = peers.iter().find(|p| p.range().overlaps(&range)) {
        return Err(LedgerError::OverlappingPeriod {
            name,
            existing: existing.name.clone(),
        });
    }
    if new.is_adjustment {
        let anchored = periods
            .iter()
            .any(|p| !p.is_adjustment && p.end_date == range.end && p.start_date <= range.start);
        if !anchored {
            return Err(LedgerError::validation(format!(
                "adjustment period {} must end on the closing date of a regular period and start within it",
                name
            )));
        }
    } else if !new.allow_gap {
        check_contiguity(&peers, &range)?;
    }

    let period = AccountingPeriod {
        id: PeriodId::new_v7(),
        name,
        start_date: range.start,
        end_date: range.end,
        status: PeriodStatus::Open,
        is_current: false,
        is_adjustment: new.is_adjustment,
        opening_equity: Amount::ZERO,
        closing_equity: None,
        closing_entry_id: None,
        closed_by: None,
        closed_at: None,
        closing_notes: None,
        created_by: actor.clone(),
        created_at: now,
    };
    tx.insert_period(&period).await?;

    info!(period = %period.name, start = %period.start_date, end = %period.end_date, "Created accounting period");
    Ok(period)
}

fn check_contiguity(regular: &[&AccountingPeriod], range: &DateRange) -> LedgerResult<()> {
    let previous = regular
        .iter()
        .filter(|p| p.end_date < range.start)
        .max_by_key(|p| p.end_date);
    let next = regular
        .iter()
        .filter(|p| p.start_date > range.end)
        .min_by_key(|p| p.start_date);

    if let Some(previous) = previous {
        if !previous.range().is_followed_by(range) {
            return Err(LedgerError::GapNotAllowed {
                expected: previous.end_date.succ_opt().unwrap_or(previous.end_date),
                found: range.start,
            });
        }
    }
    if let Some(next) = next {
        if !range.is_followed_by(&next.range()) {
            return Err(LedgerError::GapNotAllowed {
                expected: next.start_date.pred_opt().unwrap_or(next.start_date),
                found: range.end,
            });
        }
    }
    Ok(())
}

/// Loads a period by id
pub async fn get_period<T: LedgerTx>(tx: &mut T, id: PeriodId) -> LedgerResult<AccountingPeriod> {
    tx.find_period(id, RowLock::None)
        .await?
        .ok_or_else(|| LedgerError::UnknownPeriod(id.to_string()))
}

/// Marks `id` as the single current period
pub async fn set_current<T: LedgerTx>(tx: &mut T, id: PeriodId) -> LedgerResult<AccountingPeriod> {
    let mut period = tx
        .find_period(id, RowLock::Exclusive)
        .await?
        .ok_or_else(|| LedgerError::UnknownPeriod(id.to_string()))?;
    match period.status {
        PeriodStatus::Open => {}
        PeriodStatus::Closed => return Err(LedgerError::PeriodAlreadyClosed(period.name)),
        PeriodStatus::Locked => return Err(LedgerError::PeriodLocked(period.name)),
    }

    clear_current(tx).await?;
    period.is_current = true;
    tx.update_period(&period).await?;

    info!(period = %period.name, "Set current period");
    Ok(period)
}

/// Clears the current flag from every period
pub async fn clear_current<T: LedgerTx>(tx: &mut T) -> LedgerResult<()> {
    for mut period in tx.list_periods().await? {
        if period.is_current {
            period.is_current = false;
            tx.update_period(&period).await?;
        }
    }
    Ok(())
}

/// Finds the period covering `date`, preferring the regular period when an
/// adjustment period shares the date
pub async fn find_period_for_date<T: LedgerTx>(
    tx: &mut T,
    date: NaiveDate,
) -> LedgerResult<Option<AccountingPeriod>> {
    let periods = tx.list_periods().await?;
    Ok(periods
        .into_iter()
        .filter(|p| p.contains(date))
        .min_by_key(|p| p.is_adjustment))
}

/// Finds the period covering `date` and checks it accepts postings
pub async fn require_postable_period<T: LedgerTx>(
    tx: &mut T,
    date: NaiveDate,
) -> LedgerResult<AccountingPeriod> {
    let period = find_period_for_date(tx, date)
        .await?
        .ok_or(LedgerError::NoPeriodForDate(date))?;
    period.ensure_postable(date)?;
    Ok(period)
}

/// Lists periods in ledger order, optionally filtered by status
pub async fn list_periods<T: LedgerTx>(
    tx: &mut T,
    status: Option<PeriodStatus>,
) -> LedgerResult<Vec<AccountingPeriod>> {
    let mut periods = tx.list_periods().await?;
    sort_periods(&mut periods);
    Ok(periods
        .into_iter()
        .filter(|p| status.map_or(true, |s| p.status == s))
        .collect())
}

/// Freezes a closed period so it can no longer be reopened
pub async fn lock_period<T: LedgerTx>(
    tx: &mut T,
    id: PeriodId,
    actor: &Actor,
) -> LedgerResult<AccountingPeriod> {
    let mut period = tx
        .find_period(id, RowLock::Exclusive)
        .await?
        .ok_or_else(|| LedgerError::UnknownPeriod(id.to_string()))?;
    match period.status {
        PeriodStatus::Closed => {}
        PeriodStatus::Locked => return Err(LedgerError::PeriodLocked(period.name)),
        PeriodStatus::Open => {
            return Err(LedgerError::InvalidStateTransition(format!(
                "period {} must be closed before it is locked",
                period.name
            )))
        }
    }
    period.status = PeriodStatus::Locked;
    tx.update_period(&period).await?;

    info!(period = %period.name, actor = %actor, "Locked accounting period");
    Ok(period)
}

/// Creates the periods of fiscal (calendar) year `year`
///
/// With `with_adjustment`, a single-day adjustment period sharing the
/// year's final date is added after the regular periods. `allow_gap`
/// applies to the first period only.
pub async fn generate_fiscal_year<T: LedgerTx>(
    tx: &mut T,
    year: i32,
    frequency: PeriodFrequency,
    with_adjustment: bool,
    allow_gap: bool,
    actor: &Actor,
    now: DateTime<Utc>,
) -> LedgerResult<Vec<AccountingPeriod>> {
    let mut ranges = Vec::new();
    match frequency {
        PeriodFrequency::Monthly => {
            for month in 1..=12u32 {
                let name = Month::try_from(month as u8)
                    .map(|m| m.name().to_string())
                    .map_err(|_| LedgerError::validation(format!("invalid month {}", month)))?;
                ranges.push((format!("{} {}", name, year), DateRange::month(year, month)?));
            }
        }
        PeriodFrequency::Quarterly => {
            for quarter in 1..=4u32 {
                ranges.push((format!("Q{} {}", quarter, year), DateRange::quarter(year, quarter)?));
            }
        }
    }

    let mut created = Vec::with_capacity(ranges.len() + 1);
    for (index, (name, range)) in ranges.into_iter().enumerate() {
        let mut new = NewPeriod::new(name, range.start, range.end);
        if index == 0 && allow_gap {
            new = new.allow_gap();
        }
        created.push(create_period(tx, new, actor, now).await?);
    }

    if with_adjustment {
        if let Some(last) = created.last() {
            let end = last.end_date;
            let new = NewPeriod::new(format!("FY{} Adjustments", year), end, end).adjustment();
            created.push(create_period(tx, new, actor, now).await?);
        }
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn period(start: NaiveDate, end: NaiveDate, is_adjustment: bool) -> AccountingPeriod {
        AccountingPeriod {
            id: PeriodId::new(),
            name: format!("{}..{}", start, end),
            start_date: start,
            end_date: end,
            status: PeriodStatus::Open,
            is_current: false,
            is_adjustment,
            opening_equity: Amount::ZERO,
            closing_equity: None,
            closing_entry_id: None,
            closed_by: None,
            closed_at: None,
            closing_notes: None,
            created_by: Actor::system(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_adjustment_period_follows_its_regular_period() {
        let december = period(date(2024, 12, 1), date(2024, 12, 31), false);
        let adjustment = period(date(2024, 12, 31), date(2024, 12, 31), true);
        let january = period(date(2025, 1, 1), date(2025, 1, 31), false);

        let mut periods = vec![january.clone(), adjustment.clone(), december.clone()];
        sort_periods(&mut periods);
        assert_eq!(periods[0].id, december.id);
        assert_eq!(periods[1].id, adjustment.id);
        assert_eq!(periods[2].id, january.id);
        assert!(december.precedes(&adjustment));
        assert!(!adjustment.precedes(&december));
    }

    #[test]
    fn test_boundary_dates_are_postable() {
        let january = period(date(2024, 1, 1), date(2024, 1, 31), false);
        assert!(january.ensure_postable(date(2024, 1, 1)).is_ok());
        assert!(january.ensure_postable(date(2024, 1, 31)).is_ok());
        assert!(january.ensure_postable(date(2024, 2, 1)).is_err());
    }

    #[test]
    fn test_closed_period_rejects_postings() {
        let mut january = period(date(2024, 1, 1), date(2024, 1, 31), false);
        january.status = PeriodStatus::Closed;
        let err = january.ensure_postable(date(2024, 1, 20)).unwrap_err();
        assert!(matches!(err, LedgerError::PeriodClosed { .. }));

        january.status = PeriodStatus::Locked;
        let err = january.ensure_postable(date(2024, 1, 20)).unwrap_err();
        assert!(matches!(err, LedgerError::PeriodLocked(_)));
    }

    #[test]
    fn test_contiguity_requires_next_day() {
        let january = period(date(2024, 1, 1), date(2024, 1, 31), false);
        let peers = vec![&january];

        let february = DateRange::month(2024, 2).unwrap();
        assert!(check_contiguity(&peers, &february).is_ok());

        let march = DateRange::month(2024, 3).unwrap();
        let err = check_contiguity(&peers, &march).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::GapNotAllowed { expected, found } if expected == date(2024, 2, 1) && found == date(2024, 3, 1)
        ));
    }

    #[test]
    fn test_contiguity_before_earliest_period() {
        let february = period(date(2024, 2, 1), date(2024, 2, 29), false);
        let peers = vec![&february];

        assert!(check_contiguity(&peers, &DateRange::month(2024, 1).unwrap()).is_ok());
        assert!(check_contiguity(&peers, &DateRange::month(2023, 12).unwrap()).is_err());
    }
}
