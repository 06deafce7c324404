use chrono::{DateTime, Utc};

use kasaku_core::{TenantId, UserId};

/// A domain event: an immutable, versioned, append-only fact.
///
/// Every event names the owner it belongs to and the user who caused it, so
/// stock movements and status changes stay attributable after the fact.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "inventory.item.stock_consumed").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// Owner of the affected records.
    fn tenant_id(&self) -> TenantId;

    /// User who issued the command that produced this event.
    fn actor(&self) -> UserId;

    /// Business time of the change.
    fn occurred_at(&self) -> DateTime<Utc>;
}
