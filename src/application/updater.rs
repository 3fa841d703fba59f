use crate::domain::action::MutationAction;
use crate::domain::payment::PaymentRecord;
use crate::domain::ports::{PaymentStoreRef, PaymentUpdate};
use crate::error::StoreError;
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Coarse classification of an update failure, for callers mapping results
/// onto responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    NoActions,
    FetchFailed,
    MissingVersion,
    UpdateFailed,
    RetryFailed,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::NoActions => "no_actions",
            FailureReason::FetchFailed => "fetch_failed",
            FailureReason::MissingVersion => "missing_version",
            FailureReason::UpdateFailed => "update_failed",
            FailureReason::RetryFailed => "retry_failed",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum UpdateFailure {
    #[error("No actions to apply")]
    NoActions,
    /// `conflict` is set when the fetch that failed was the one after a
    /// version conflict.
    #[error("Failed to fetch payment: {source}")]
    FetchFailed {
        source: StoreError,
        conflict: Option<StoreError>,
    },
    #[error("Payment {payment_id} has no version")]
    MissingVersion {
        payment_id: String,
        conflict: Option<StoreError>,
    },
    #[error("Update failed: {0}")]
    UpdateFailed(StoreError),
    #[error("Update failed after retry: {retry} (first attempt: {first})")]
    RetryFailed { first: StoreError, retry: StoreError },
}

impl UpdateFailure {
    pub fn reason(&self) -> FailureReason {
        match self {
            UpdateFailure::NoActions => FailureReason::NoActions,
            UpdateFailure::FetchFailed { .. } => FailureReason::FetchFailed,
            UpdateFailure::MissingVersion { .. } => FailureReason::MissingVersion,
            UpdateFailure::UpdateFailed(_) => FailureReason::UpdateFailed,
            UpdateFailure::RetryFailed { .. } => FailureReason::RetryFailed,
        }
    }
}

/// A successful versioned update.
#[derive(Debug, Clone, PartialEq)]
pub struct Updated {
    pub resource: PaymentRecord,
    /// Whether a version conflict forced a second submission.
    pub retried: bool,
}

pub type UpdateResult = Result<Updated, UpdateFailure>;

/// Applies update actions to a payment under optimistic concurrency.
///
/// Every call starts from a fresh fetch; a version conflict is retried
/// exactly once with the refreshed version. No state is kept between calls.
#[derive(Clone)]
pub struct VersionedUpdater {
    store: PaymentStoreRef,
}

impl VersionedUpdater {
    pub fn new(store: PaymentStoreRef) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &PaymentStoreRef {
        &self.store
    }

    pub async fn apply(&self, payment_id: &str, actions: Vec<MutationAction>) -> UpdateResult {
        if actions.is_empty() {
            return Err(UpdateFailure::NoActions);
        }

        let payment = self
            .store
            .fetch(payment_id)
            .await
            .map_err(|source| {
                error!(payment_id, error = %source, "failed to fetch payment");
                UpdateFailure::FetchFailed {
                    source,
                    conflict: None,
                }
            })?;

        let Some(version) = payment.version else {
            error!(payment_id, "payment version is missing");
            return Err(UpdateFailure::MissingVersion {
                payment_id: payment_id.to_string(),
                conflict: None,
            });
        };

        let mut update = PaymentUpdate {
            id: payment_id.to_string(),
            version,
            actions,
        };
        debug!(
            payment_id,
            version,
            actions = ?update.actions.iter().map(MutationAction::name).collect::<Vec<_>>(),
            "submitting payment update"
        );

        let first = match self.store.update(&update).await {
            Ok(resource) => {
                return Ok(Updated {
                    resource,
                    retried: false,
                });
            }
            Err(e) => e,
        };

        if !first.is_conflict() {
            error!(
                payment_id,
                status = first.status_code(),
                error = %first,
                "payment update failed"
            );
            return Err(UpdateFailure::UpdateFailed(first));
        }

        warn!(payment_id, version, error = %first, "version conflict, retrying once");

        let payment = match self.store.fetch(payment_id).await {
            Ok(p) => p,
            Err(source) => {
                error!(payment_id, error = %source, "failed to re-fetch payment after conflict");
                return Err(UpdateFailure::FetchFailed {
                    source,
                    conflict: Some(first),
                });
            }
        };

        let Some(version) = payment.version else {
            error!(payment_id, "payment version is missing on retry");
            return Err(UpdateFailure::MissingVersion {
                payment_id: payment_id.to_string(),
                conflict: Some(first),
            });
        };

        update.version = version;
        match self.store.update(&update).await {
            Ok(resource) => {
                info!(payment_id, version, "payment update succeeded on retry");
                Ok(Updated {
                    resource,
                    retried: true,
                })
            }
            Err(retry) => {
                error!(
                    payment_id,
                    first_error = %first,
                    retry_error = %retry,
                    "payment update retry failed"
                );
                Err(UpdateFailure::RetryFailed { first, retry })
            }
        }
    }

    /// Submits `actions` at the version of a payment the caller has already
    /// inspected.
    ///
    /// Nothing is refetched and a conflict is not retried: it comes back as
    /// `UpdateFailed`, telling the caller its checks ran on stale data.
    pub async fn apply_at(
        &self,
        payment: &PaymentRecord,
        actions: Vec<MutationAction>,
    ) -> UpdateResult {
        if actions.is_empty() {
            return Err(UpdateFailure::NoActions);
        }
        let Some(version) = payment.version else {
            return Err(UpdateFailure::MissingVersion {
                payment_id: payment.id.clone(),
                conflict: None,
            });
        };

        let update = PaymentUpdate {
            id: payment.id.clone(),
            version,
            actions,
        };
        match self.store.update(&update).await {
            Ok(resource) => Ok(Updated {
                resource,
                retried: false,
            }),
            Err(e) => {
                warn!(payment_id = %payment.id, version, error = %e, "checked update rejected");
                Err(UpdateFailure::UpdateFailed(e))
            }
        }
    }
}
