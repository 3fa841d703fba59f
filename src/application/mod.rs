//! Application layer: the reconciliation core.
//!
//! `VersionedUpdater` commits update actions under optimistic concurrency,
//! `CustomFieldAttacher` annotates transactions on top of it, and
//! `PaymentReconciler` turns gateway outcomes into those calls.

pub mod attacher;
pub mod reconciler;
pub mod updater;
