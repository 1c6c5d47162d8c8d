//! Domain types for balances, ledger movements and mutation commands.

use std::fmt;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use kardex_shared::LedgerConfig;
use kardex_shared::types::{ActorId, BranchId, MovementId, ProductId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// Movement type
// ============================================================================

/// Kind of stock-affecting event recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    /// Stock arrives at a branch.
    Entry,
    /// Stock leaves a branch.
    Exit,
    /// Stock moves from one branch to another.
    Transfer,
    /// Counted stock replaces system stock; quantity is signed.
    Adjustment,
}

impl MovementType {
    /// Returns the persisted representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Entry => "ENTRY",
            Self::Exit => "EXIT",
            Self::Transfer => "TRANSFER",
            Self::Adjustment => "ADJUSTMENT",
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ENTRY" => Ok(Self::Entry),
            "EXIT" => Ok(Self::Exit),
            "TRANSFER" => Ok(Self::Transfer),
            "ADJUSTMENT" => Ok(Self::Adjustment),
            other => Err(format!("unknown movement type: {other}")),
        }
    }
}

// ============================================================================
// Balances
// ============================================================================

/// Composite identity of a balance row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BalanceKey {
    /// Product held in stock.
    pub product_id: ProductId,
    /// Branch holding the stock.
    pub branch_id: BranchId,
}

impl BalanceKey {
    /// Creates a balance key.
    #[must_use]
    pub const fn new(product_id: ProductId, branch_id: BranchId) -> Self {
        Self {
            product_id,
            branch_id,
        }
    }
}

/// Current stock of one product at one branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Product held in stock.
    pub product_id: ProductId,
    /// Branch holding the stock.
    pub branch_id: BranchId,
    /// Authoritative current quantity.
    pub stock: Decimal,
    /// Alert threshold; zero disables low-stock alerts.
    pub stock_minimum: Decimal,
    /// Branch-specific sale price.
    pub sale_price_override: Option<Decimal>,
    /// Last time the row was written.
    pub updated_at: DateTime<Utc>,
}

impl Balance {
    /// A freshly created balance with zero stock.
    #[must_use]
    pub fn empty(key: BalanceKey, now: DateTime<Utc>) -> Self {
        Self {
            product_id: key.product_id,
            branch_id: key.branch_id,
            stock: Decimal::ZERO,
            stock_minimum: Decimal::ZERO,
            sale_price_override: None,
            updated_at: now,
        }
    }

    /// Returns the composite key of this balance.
    #[must_use]
    pub const fn key(&self) -> BalanceKey {
        BalanceKey::new(self.product_id, self.branch_id)
    }

    /// Low stock means `stock <= stock_minimum` with a positive threshold.
    #[must_use]
    pub fn is_low_stock(&self) -> bool {
        self.stock_minimum > Decimal::ZERO && self.stock <= self.stock_minimum
    }

    /// Applies the present fields of a patch.
    pub fn apply(&mut self, patch: &BalancePatch, now: DateTime<Utc>) {
        if let Some(stock) = patch.stock {
            self.stock = stock;
        }
        if let Some(stock_minimum) = patch.stock_minimum {
            self.stock_minimum = stock_minimum;
        }
        if let Some(price) = patch.sale_price_override {
            self.sale_price_override = price;
        }
        self.updated_at = now;
    }
}

/// Partial update of a balance row. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalancePatch {
    /// New stock quantity.
    pub stock: Option<Decimal>,
    /// New alert threshold.
    pub stock_minimum: Option<Decimal>,
    /// `Some(None)` clears the override, `Some(Some(p))` sets it.
    pub sale_price_override: Option<Option<Decimal>>,
}

impl BalancePatch {
    /// A patch that only sets the stock.
    #[must_use]
    pub fn stock(stock: Decimal) -> Self {
        Self {
            stock: Some(stock),
            ..Self::default()
        }
    }

    /// Returns true when no field is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stock.is_none() && self.stock_minimum.is_none() && self.sale_price_override.is_none()
    }

    /// The same patch without the stock field.
    #[must_use]
    pub fn without_stock(&self) -> Self {
        Self {
            stock: None,
            ..self.clone()
        }
    }
}

/// A balance joined with the product fields used for listing and search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceView {
    /// The balance row.
    #[serde(flatten)]
    pub balance: Balance,
    /// Product code.
    pub product_code: String,
    /// Product name.
    pub product_name: String,
}

/// Filter for balance listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceFilter {
    /// Restrict to one branch.
    pub branch_id: Option<BranchId>,
    /// Restrict to one product.
    pub product_id: Option<ProductId>,
    /// Case-insensitive substring over product code and name.
    pub search: Option<String>,
    /// Only rows that are low on stock.
    pub low_stock_only: bool,
}

impl BalanceFilter {
    /// Lowercased, trimmed search term; blank terms count as absent.
    #[must_use]
    pub fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }
}

// ============================================================================
// Collaborators
// ============================================================================

/// Product attributes the ledger consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
    /// Product id.
    pub id: ProductId,
    /// Unique product code.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Default valuation price.
    pub sale_price: Decimal,
    /// Inactive products reject mutations.
    pub active: bool,
}

/// Branch attributes the ledger consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInfo {
    /// Branch id.
    pub id: BranchId,
    /// Display name.
    pub name: String,
    /// Inactive branches reject mutations.
    pub active: bool,
}

/// Opaque identity stamped into every movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Who performs the movement.
    pub id: ActorId,
    /// Who authorized it, if anyone.
    pub authorized_by: Option<ActorId>,
}

impl Actor {
    /// An actor acting without separate authorization.
    #[must_use]
    pub const fn new(id: ActorId) -> Self {
        Self {
            id,
            authorized_by: None,
        }
    }

    /// Adds an authorizer.
    #[must_use]
    pub const fn authorized_by(mut self, authorizer: ActorId) -> Self {
        self.authorized_by = Some(authorizer);
        self
    }
}

/// Link to the business document that caused a movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Document kind, e.g. `purchase`, `sale`, `manual`.
    pub document_type: String,
    /// Document id in its owning system.
    pub document_id: i64,
}

// ============================================================================
// Ledger
// ============================================================================

/// Optional metadata accepted by every mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementDetails {
    /// Price per unit at the time of the movement.
    pub unit_price: Option<Decimal>,
    /// Free-form note.
    pub note: Option<String>,
    /// Originating business document.
    pub related_document: Option<DocumentRef>,
    /// Logical registration time; defaults to now.
    pub recorded_at: Option<DateTime<Utc>>,
    /// Caller-side reference id.
    pub external_reference: Option<String>,
}

/// A ledger row ready to be appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovement {
    /// Product moved.
    pub product_id: ProductId,
    /// Branch affected (source leg for transfers).
    pub source_branch_id: BranchId,
    /// Receiving branch; only set for transfers.
    pub destination_branch_id: Option<BranchId>,
    /// Movement kind.
    pub movement_type: MovementType,
    /// Magnitude for ENTRY/EXIT/TRANSFER, signed for ADJUSTMENT.
    pub quantity: Decimal,
    /// Stock of the source branch after this movement.
    pub resulting_balance: Decimal,
    /// Stock of the destination branch after a transfer.
    pub destination_resulting_balance: Option<Decimal>,
    /// Price per unit used for valuation.
    pub unit_price: Option<Decimal>,
    /// Originating business document.
    pub related_document: Option<DocumentRef>,
    /// Who performed the movement.
    pub actor_id: ActorId,
    /// Whether a second actor authorized it.
    pub authorized: bool,
    /// The authorizing actor.
    pub authorizer_id: Option<ActorId>,
    /// Free-form note.
    pub note: Option<String>,
    /// Logical registration time.
    pub recorded_at: DateTime<Utc>,
    /// Caller-side reference id.
    pub external_reference: Option<String>,
}

/// An immutable, committed ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementEntry {
    /// Insertion sequence id.
    pub id: MovementId,
    /// Product moved.
    pub product_id: ProductId,
    /// Branch affected (source leg for transfers).
    pub source_branch_id: BranchId,
    /// Receiving branch; only set for transfers.
    pub destination_branch_id: Option<BranchId>,
    /// Movement kind.
    pub movement_type: MovementType,
    /// Magnitude for ENTRY/EXIT/TRANSFER, signed for ADJUSTMENT.
    pub quantity: Decimal,
    /// Stock of the source branch after this movement.
    pub resulting_balance: Decimal,
    /// Stock of the destination branch after a transfer.
    pub destination_resulting_balance: Option<Decimal>,
    /// Price per unit used for valuation.
    pub unit_price: Option<Decimal>,
    /// Originating business document.
    pub related_document: Option<DocumentRef>,
    /// Who performed the movement.
    pub actor_id: ActorId,
    /// Whether a second actor authorized it.
    pub authorized: bool,
    /// The authorizing actor.
    pub authorizer_id: Option<ActorId>,
    /// Free-form note.
    pub note: Option<String>,
    /// Logical registration time.
    pub recorded_at: DateTime<Utc>,
    /// Physical insertion time.
    pub inserted_at: DateTime<Utc>,
    /// Caller-side reference id.
    pub external_reference: Option<String>,
}

/// The effect of a movement on one branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Leg {
    /// Branch whose stock changes.
    pub branch_id: BranchId,
    /// Signed change in stock.
    pub delta: Decimal,
    /// Stock snapshot of that branch after the movement.
    pub resulting_balance: Option<Decimal>,
    /// The other branch of a transfer.
    pub counterpart: Option<BranchId>,
}

impl MovementEntry {
    /// Builds the committed row from an appended movement.
    #[must_use]
    pub fn from_new(id: MovementId, inserted_at: DateTime<Utc>, movement: NewMovement) -> Self {
        Self {
            id,
            product_id: movement.product_id,
            source_branch_id: movement.source_branch_id,
            destination_branch_id: movement.destination_branch_id,
            movement_type: movement.movement_type,
            quantity: movement.quantity,
            resulting_balance: movement.resulting_balance,
            destination_resulting_balance: movement.destination_resulting_balance,
            unit_price: movement.unit_price,
            related_document: movement.related_document,
            actor_id: movement.actor_id,
            authorized: movement.authorized,
            authorizer_id: movement.authorizer_id,
            note: movement.note,
            recorded_at: movement.recorded_at,
            inserted_at,
            external_reference: movement.external_reference,
        }
    }

    /// Per-branch effects of this movement. Transfers yield two legs.
    pub fn legs(&self) -> impl Iterator<Item = Leg> {
        let source = match self.movement_type {
            MovementType::Entry | MovementType::Adjustment => self.quantity,
            MovementType::Exit | MovementType::Transfer => -self.quantity,
        };
        let source_leg = Leg {
            branch_id: self.source_branch_id,
            delta: source,
            resulting_balance: Some(self.resulting_balance),
            counterpart: self.destination_branch_id,
        };
        let destination_leg = match (self.movement_type, self.destination_branch_id) {
            (MovementType::Transfer, Some(destination)) => Some(Leg {
                branch_id: destination,
                delta: self.quantity,
                resulting_balance: self.destination_resulting_balance,
                counterpart: Some(self.source_branch_id),
            }),
            _ => None,
        };
        std::iter::once(source_leg).chain(destination_leg)
    }

    /// Net signed effect of this movement on one branch.
    #[must_use]
    pub fn effect_on(&self, branch_id: BranchId) -> Decimal {
        self.legs()
            .filter(|leg| leg.branch_id == branch_id)
            .map(|leg| leg.delta)
            .sum()
    }

    /// Returns true if either leg touches the branch.
    #[must_use]
    pub fn touches(&self, branch_id: BranchId) -> bool {
        self.source_branch_id == branch_id || self.destination_branch_id == Some(branch_id)
    }
}

/// Filter for ledger listings. Results are ordered by `(recorded_at, id)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovementFilter {
    /// Restrict to one product.
    pub product_id: Option<ProductId>,
    /// Movements with a leg on this branch.
    pub branch_id: Option<BranchId>,
    /// Restrict to one movement kind.
    pub movement_type: Option<MovementType>,
    /// Inclusive lower bound on `recorded_at`.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `recorded_at`.
    pub until: Option<DateTime<Utc>>,
}

impl MovementFilter {
    /// Returns true if the movement passes every present criterion.
    #[must_use]
    pub fn matches(&self, entry: &MovementEntry) -> bool {
        self.product_id.is_none_or(|p| entry.product_id == p)
            && self.branch_id.is_none_or(|b| entry.touches(b))
            && self.movement_type.is_none_or(|t| entry.movement_type == t)
            && self.from.is_none_or(|from| entry.recorded_at >= from)
            && self.until.is_none_or(|until| entry.recorded_at < until)
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Stock arrives at a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestCommand {
    /// Product received.
    pub product_id: ProductId,
    /// Receiving branch.
    pub branch_id: BranchId,
    /// Quantity received, greater than zero.
    pub quantity: Decimal,
    /// Movement metadata.
    #[serde(default)]
    pub details: MovementDetails,
}

/// Stock leaves a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawCommand {
    /// Product removed.
    pub product_id: ProductId,
    /// Branch giving up stock.
    pub branch_id: BranchId,
    /// Quantity removed, greater than zero.
    pub quantity: Decimal,
    /// Movement metadata.
    #[serde(default)]
    pub details: MovementDetails,
}

/// Stock moves between two distinct branches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCommand {
    /// Product moved.
    pub product_id: ProductId,
    /// Branch giving up stock.
    pub source_branch_id: BranchId,
    /// Branch receiving stock.
    pub destination_branch_id: BranchId,
    /// Quantity moved, greater than zero.
    pub quantity: Decimal,
    /// Movement metadata.
    #[serde(default)]
    pub details: MovementDetails,
}

/// Counted stock replaces system stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustCommand {
    /// Product counted.
    pub product_id: ProductId,
    /// Branch counted.
    pub branch_id: BranchId,
    /// Physically counted quantity, zero or more.
    pub counted_stock: Decimal,
    /// Movement metadata.
    #[serde(default)]
    pub details: MovementDetails,
}

/// Administrative edit of stock, threshold or price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStockCommand {
    /// Product edited.
    pub product_id: ProductId,
    /// Branch edited.
    pub branch_id: BranchId,
    /// Fields to change.
    pub patch: BalancePatch,
    /// Movement metadata, used when the stock changes.
    #[serde(default)]
    pub details: MovementDetails,
}

// ============================================================================
// Outcomes
// ============================================================================

/// Result of a committed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    /// Source balance after the transfer.
    pub source: Balance,
    /// Destination balance after the transfer.
    pub destination: Balance,
    /// The TRANSFER ledger row.
    pub movement: MovementEntry,
}

/// Result of an adjust-to-actual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentOutcome {
    /// Stock before the count.
    pub previous: Decimal,
    /// Stock after the count.
    pub new: Decimal,
    /// `new - previous`; positive is surplus, negative is shortage.
    pub diff: Decimal,
    /// Balance after the adjustment.
    pub balance: Balance,
    /// The ADJUSTMENT row; absent when the count matched.
    pub movement: Option<MovementEntry>,
}

/// Result of a direct stock/price update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockUpdateOutcome {
    /// Balance after the update.
    pub balance: Balance,
    /// ENTRY or EXIT row when the stock changed.
    pub movement: Option<MovementEntry>,
}

/// Comparison of the stored balance with the ledger-derived balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceAudit {
    /// Product audited.
    pub product_id: ProductId,
    /// Branch audited.
    pub branch_id: BranchId,
    /// `Balance.stock`, zero if no row exists.
    pub stored: Decimal,
    /// Fold of every ledger row for the pair.
    pub derived: Decimal,
    /// `stored - derived`.
    pub drift: Decimal,
    /// True when there is no drift.
    pub in_sync: bool,
    /// Number of ledger rows folded.
    pub movements: usize,
}

// ============================================================================
// Policy
// ============================================================================

/// Write policy applied by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerPolicy {
    /// Accept logical timestamps in the past.
    pub allow_backdating: bool,
    /// Tolerance around now for caller-supplied timestamps.
    pub max_clock_skew: Duration,
    /// Total attempts for a mutation that hits a transaction conflict.
    pub max_attempts: u32,
    /// Base delay between attempts.
    pub retry_backoff: StdDuration,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self::from(&LedgerConfig::default())
    }
}

impl From<&LedgerConfig> for LedgerPolicy {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            allow_backdating: config.allow_backdating,
            max_clock_skew: Duration::seconds(i64::try_from(config.max_clock_skew_secs).unwrap_or(i64::MAX)),
            max_attempts: config.max_attempts.max(1),
            retry_backoff: StdDuration::from_millis(config.retry_backoff_ms),
        }
    }
}
