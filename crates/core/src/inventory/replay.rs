//! Historical reconstruction and the kardex.
//!
//! Everything here is a pure function of the ledger: balances are never
//! consulted. Movements are folded in `(recorded_at, id)` order, one leg at a
//! time. Without a branch filter every leg of the product counts, so a
//! transfer shows up once as egress and once as ingress and nets to zero.

use std::collections::{BTreeMap, HashSet};
use std::ops::Neg;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use kardex_shared::types::{ActorId, BranchId, MovementId, ProductId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::InventoryError;
use super::types::{DocumentRef, Leg, MovementEntry, MovementFilter, MovementType};

/// Product, optional branch and half-open time window `[from, until)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryQuery {
    /// Product to reconstruct.
    pub product_id: ProductId,
    /// Branch to reconstruct; `None` aggregates every branch.
    pub branch_id: Option<BranchId>,
    /// Inclusive start of the period.
    pub from: DateTime<Utc>,
    /// Exclusive end of the period.
    pub until: DateTime<Utc>,
}

impl HistoryQuery {
    /// Builds a query over an explicit time window.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTimeRange` if `from > until`.
    pub fn new(
        product_id: ProductId,
        branch_id: Option<BranchId>,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Self, InventoryError> {
        if from > until {
            return Err(InventoryError::InvalidTimeRange { from, until });
        }
        Ok(Self {
            product_id,
            branch_id,
            from,
            until,
        })
    }

    /// Builds a query covering whole calendar days `date_from..=date_to` (UTC).
    ///
    /// # Errors
    ///
    /// Returns `InvalidDateRange` if `date_from > date_to`.
    pub fn for_dates(
        product_id: ProductId,
        branch_id: Option<BranchId>,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<Self, InventoryError> {
        let invalid = || InventoryError::InvalidDateRange {
            from: date_from,
            to: date_to,
        };
        if date_from > date_to {
            return Err(invalid());
        }
        let end = date_to.succ_opt().ok_or_else(invalid)?;
        Ok(Self {
            product_id,
            branch_id,
            from: date_from.and_time(NaiveTime::MIN).and_utc(),
            until: end.and_time(NaiveTime::MIN).and_utc(),
        })
    }

    /// Ledger rows needed to answer this query: full history up to `until`.
    #[must_use]
    pub fn movement_filter(&self) -> MovementFilter {
        MovementFilter {
            product_id: Some(self.product_id),
            branch_id: self.branch_id,
            until: Some(self.until),
            ..MovementFilter::default()
        }
    }

    /// Ledger rows needed to check kardex snapshots: the whole history,
    /// since a movement recorded after `until` may have committed earlier.
    #[must_use]
    pub fn snapshot_filter(&self) -> MovementFilter {
        MovementFilter {
            until: None,
            ..self.movement_filter()
        }
    }
}

/// A physical quantity with its monetary value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Valued {
    /// Units.
    pub quantity: Decimal,
    /// Monetary value of those units.
    pub value: Decimal,
}

impl Valued {
    /// `quantity` units valued at `unit_price`; `None` on overflow.
    #[must_use]
    pub fn checked_at_price(quantity: Decimal, unit_price: Decimal) -> Option<Self> {
        Some(Self {
            quantity,
            value: quantity.checked_mul(unit_price)?,
        })
    }

    /// Component-wise sum; `None` on overflow.
    #[must_use]
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        Some(Self {
            quantity: self.quantity.checked_add(rhs.quantity)?,
            value: self.value.checked_add(rhs.value)?,
        })
    }

    /// Component-wise difference; `None` on overflow.
    #[must_use]
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        Some(Self {
            quantity: self.quantity.checked_sub(rhs.quantity)?,
            value: self.value.checked_sub(rhs.value)?,
        })
    }
}

impl Neg for Valued {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            quantity: -self.quantity,
            value: -self.value,
        }
    }
}

/// Opening, period ingress/egress and closing for one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalStock {
    /// Product reconstructed.
    pub product_id: ProductId,
    /// Branch reconstructed; `None` when aggregated.
    pub branch_id: Option<BranchId>,
    /// Inclusive start of the period.
    pub from: DateTime<Utc>,
    /// Exclusive end of the period.
    pub until: DateTime<Utc>,
    /// Fold of every leg before `from`.
    pub opening: Valued,
    /// Sum of positive legs inside the period.
    pub ingress: Valued,
    /// Sum of negative legs inside the period, as a positive magnitude.
    pub egress: Valued,
    /// `opening + ingress - egress`.
    pub closing: Valued,
}

/// One leg of one movement in a kardex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KardexRow {
    /// Ledger row id.
    pub movement_id: MovementId,
    /// Logical registration time.
    pub recorded_at: DateTime<Utc>,
    /// Movement kind.
    pub movement_type: MovementType,
    /// Branch whose stock changed.
    pub branch_id: BranchId,
    /// Other branch of a transfer.
    pub counterpart_branch_id: Option<BranchId>,
    /// Units in (zero for outgoing legs).
    pub ingress: Decimal,
    /// Units out (zero for incoming legs).
    pub egress: Decimal,
    /// Price used for valuation.
    pub unit_price: Decimal,
    /// Signed value of the leg.
    pub value: Decimal,
    /// Running quantity after this row.
    pub running_quantity: Decimal,
    /// Running value after this row.
    pub running_value: Decimal,
    /// Branch stock stored on the ledger row at commit time. Omitted when a
    /// backdated movement places this row at a different point of the replay
    /// than the one it was committed at, since the two would disagree.
    pub resulting_balance: Option<Decimal>,
    /// Who performed the movement.
    pub actor_id: ActorId,
    /// Originating business document.
    pub related_document: Option<DocumentRef>,
    /// Free-form note.
    pub note: Option<String>,
}

/// Chronological movement report with running balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kardex {
    /// Period totals; `summary.closing` equals the last row's running figures.
    pub summary: HistoricalStock,
    /// One row per leg inside the period.
    pub rows: Vec<KardexRow>,
}

struct Step<'a> {
    entry: &'a MovementEntry,
    leg: Leg,
    moved: Valued,
    unit_price: Decimal,
}

/// Legs of the queried product before `until`, in ledger order.
fn steps<'a>(
    entries: &'a [MovementEntry],
    query: &HistoryQuery,
    default_price: Decimal,
) -> Result<Vec<Step<'a>>, InventoryError> {
    let branch = query.branch_id;
    let mut ordered: Vec<&MovementEntry> = entries
        .iter()
        .filter(|e| e.product_id == query.product_id && e.recorded_at < query.until)
        .collect();
    ordered.sort_by_key(|e| (e.recorded_at, e.id));

    let mut steps = Vec::new();
    for entry in ordered {
        let unit_price = entry.unit_price.unwrap_or(default_price);
        for leg in entry
            .legs()
            .filter(|leg| branch.is_none_or(|b| leg.branch_id == b))
        {
            let moved = Valued::checked_at_price(leg.delta, unit_price)
                .ok_or(InventoryError::ReplayOverflow(query.product_id))?;
            steps.push(Step {
                entry,
                leg,
                moved,
                unit_price,
            });
        }
    }
    Ok(steps)
}

/// Legs whose stored snapshot sits at the same point in commit order and in
/// replay order, keyed by `(movement, branch)`.
///
/// A leg's snapshot agrees with the replay exactly when the legs of its
/// branch that replay before it are the legs committed before it.
fn snapshots_in_order(
    entries: &[MovementEntry],
    product_id: ProductId,
) -> HashSet<(MovementId, BranchId)> {
    let mut by_branch: BTreeMap<BranchId, Vec<(DateTime<Utc>, MovementId)>> = BTreeMap::new();
    for entry in entries.iter().filter(|e| e.product_id == product_id) {
        for leg in entry.legs() {
            by_branch
                .entry(leg.branch_id)
                .or_default()
                .push((entry.recorded_at, entry.id));
        }
    }

    let mut in_order = HashSet::new();
    for (branch_id, mut legs) in by_branch {
        legs.sort_unstable();
        let mut committed: Vec<MovementId> = legs.iter().map(|&(_, id)| id).collect();
        committed.sort_unstable();

        let mut highest_before: Option<MovementId> = None;
        for (position, &(_, id)) in legs.iter().enumerate() {
            let rank = committed.partition_point(|&other| other < id);
            if rank == position && highest_before.is_none_or(|h| h < id) {
                in_order.insert((id, branch_id));
            }
            highest_before = highest_before.max(Some(id));
        }
    }
    in_order
}

/// Splits the ledger into opening, ingress, egress and closing.
///
/// `default_price` values legs whose movement carries no unit price.
///
/// # Errors
///
/// Returns `ReplayOverflow` if a value or total cannot be represented.
pub fn reconstruct(
    entries: &[MovementEntry],
    query: &HistoryQuery,
    default_price: Decimal,
) -> Result<HistoricalStock, InventoryError> {
    Ok(kardex(entries, query, default_price)?.summary)
}

/// The same fold as [`reconstruct`], exposed row by row.
///
/// Snapshots are only checked against movements present in `entries`, so
/// pass the product's whole history to keep `resulting_balance` exact.
///
/// # Errors
///
/// Returns `ReplayOverflow` if a value or total cannot be represented.
pub fn kardex(
    entries: &[MovementEntry],
    query: &HistoryQuery,
    default_price: Decimal,
) -> Result<Kardex, InventoryError> {
    let overflow = || InventoryError::ReplayOverflow(query.product_id);
    let in_order = snapshots_in_order(entries, query.product_id);
    let mut opening = Valued::default();
    let mut ingress = Valued::default();
    let mut egress = Valued::default();
    let mut running = Valued::default();
    let mut rows = Vec::new();

    for step in steps(entries, query, default_price)? {
        running = running.checked_add(step.moved).ok_or_else(overflow)?;
        if step.entry.recorded_at < query.from {
            opening = opening.checked_add(step.moved).ok_or_else(overflow)?;
            continue;
        }

        let delta = step.leg.delta;
        if delta > Decimal::ZERO {
            ingress = ingress.checked_add(step.moved).ok_or_else(overflow)?;
        } else {
            egress = egress.checked_add(-step.moved).ok_or_else(overflow)?;
        }

        let snapshot_key = (step.entry.id, step.leg.branch_id);
        rows.push(KardexRow {
            movement_id: step.entry.id,
            recorded_at: step.entry.recorded_at,
            movement_type: step.entry.movement_type,
            branch_id: step.leg.branch_id,
            counterpart_branch_id: step.leg.counterpart,
            ingress: delta.max(Decimal::ZERO),
            egress: (-delta).max(Decimal::ZERO),
            unit_price: step.unit_price,
            value: step.moved.value,
            running_quantity: running.quantity,
            running_value: running.value,
            resulting_balance: step
                .leg
                .resulting_balance
                .filter(|_| in_order.contains(&snapshot_key)),
            actor_id: step.entry.actor_id,
            related_document: step.entry.related_document.clone(),
            note: step.entry.note.clone(),
        });
    }

    let closing = opening
        .checked_add(ingress)
        .and_then(|v| v.checked_sub(egress))
        .ok_or_else(overflow)?;

    Ok(Kardex {
        summary: HistoricalStock {
            product_id: query.product_id,
            branch_id: query.branch_id,
            from: query.from,
            until: query.until,
            opening,
            ingress,
            egress,
            closing,
        },
        rows,
    })
}

/// Stock of a product derived by folding every leg recorded before `at`
/// (or the whole ledger when `at` is `None`).
///
/// # Errors
///
/// Returns `ReplayOverflow` if the total cannot be represented.
pub fn stock_at(
    entries: &[MovementEntry],
    product_id: ProductId,
    branch_id: Option<BranchId>,
    at: Option<DateTime<Utc>>,
) -> Result<Decimal, InventoryError> {
    entries
        .iter()
        .filter(|e| e.product_id == product_id && at.is_none_or(|at| e.recorded_at < at))
        .flat_map(|e| e.legs())
        .filter(|leg| branch_id.is_none_or(|b| leg.branch_id == b))
        .try_fold(Decimal::ZERO, |total, leg| total.checked_add(leg.delta))
        .ok_or(InventoryError::ReplayOverflow(product_id))
}
