//! Order state machine, encoded as a transition table.
//!
//! Every legal lifecycle move is one row in [`TRANSITIONS`]; anything not
//! in the table is an invariant violation and quarantines the order.

use pmm_core::OrderStatus;

/// Event kinds that drive the order state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// Exchange acknowledged the new order.
    Ack,
    /// Exchange rejected the new order.
    Reject,
    /// An amend was accepted for submission.
    AmendSubmitted,
    /// A cancel was accepted for submission.
    CancelSubmitted,
    /// Exchange confirmed the amend.
    AmendAck,
    /// Exchange rejected the amend.
    AmendReject,
    /// Exchange confirmed the cancel.
    CancelAck,
    /// Exchange rejected the cancel.
    CancelReject,
    /// Fill leaving quantity outstanding.
    PartialFill,
    /// Fill exhausting the order quantity.
    CompleteFill,
}

use LifecycleEvent::*;
use OrderStatus::*;

/// The full lifecycle table: `(from, event) -> to`.
///
/// Fills are accepted while an amend or cancel is in flight; the exchange
/// operation is not atomic, and a fill landing in that window stands.
/// `CancelSubmitted` is legal from `PendingNew` (cancel by client order id
/// before the ack) and from `PendingAmend` (stale-amend escalation).
pub const TRANSITIONS: &[(OrderStatus, LifecycleEvent, OrderStatus)] = &[
    (PendingNew, Ack, Active),
    (PendingNew, Reject, Rejected),
    (PendingNew, CancelSubmitted, PendingCancel),
    (Active, AmendSubmitted, PendingAmend),
    (Active, CancelSubmitted, PendingCancel),
    (Active, PartialFill, Active),
    (Active, CompleteFill, Filled),
    (PendingAmend, AmendAck, Active),
    (PendingAmend, AmendReject, Active),
    (PendingAmend, CancelSubmitted, PendingCancel),
    (PendingAmend, PartialFill, PendingAmend),
    (PendingAmend, CompleteFill, Filled),
    (PendingCancel, CancelAck, Cancelled),
    (PendingCancel, CancelReject, Active),
    (PendingCancel, PartialFill, PendingCancel),
    (PendingCancel, CompleteFill, Filled),
];

/// Look up the target status for `(from, event)`.
///
/// Returns `None` for moves not in the table.
pub fn transition(from: OrderStatus, event: LifecycleEvent) -> Option<OrderStatus> {
    TRANSITIONS
        .iter()
        .find(|(f, e, _)| *f == from && *e == event)
        .map(|(_, _, to)| *to)
}
