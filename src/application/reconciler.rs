use super::attacher::{AttachFailure, Attached, CustomFieldAttacher};
use super::updater::{UpdateFailure, Updated, VersionedUpdater};
use crate::domain::action::{MutationAction, TransactionDraft};
use crate::domain::custom_type::{TRANSACTION_COMMENTS_FIELD, TRANSACTION_COMMENTS_TYPE_KEY};
use crate::domain::outcome::{GatewayOutcome, PaymentOutcome};
use crate::domain::payment::{Money, PaymentRecord, TargetMatch, TransactionState, TransactionType};
use crate::domain::ports::PaymentStoreRef;
use crate::error::{ConnectorError, StoreError};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Failed to fetch payment: {0}")]
    Fetch(#[from] StoreError),
    #[error(transparent)]
    Update(#[from] UpdateFailure),
    #[error("No transaction on payment {payment_id} matches reference {reference}")]
    TransactionNotFound {
        payment_id: String,
        reference: String,
    },
    #[error("There is no successful payment transaction to reverse on payment {0}")]
    NothingToReverse(String),
    #[error("Invalid payment data: {0}")]
    Invalid(#[from] ConnectorError),
}

/// Whether the gateway was asked to authorize only or to take the payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaymentAction {
    #[default]
    Authorize,
    Payment,
}

impl PaymentAction {
    fn transaction_type(&self) -> TransactionType {
        match self {
            PaymentAction::Authorize => TransactionType::Authorization,
            PaymentAction::Payment => TransactionType::Charge,
        }
    }
}

/// Result of committing a gateway outcome onto a payment.
///
/// The transaction is persisted even when `annotation` failed; the comment
/// is diagnostic and its failure is reported, not rolled back.
#[derive(Debug)]
pub struct Reconciled {
    pub payment_id: String,
    pub transaction_id: Option<String>,
    pub retried: bool,
    pub annotation: Result<Attached, AttachFailure>,
}

/// Commits gateway outcomes and payment modifications onto platform
/// payments.
#[derive(Clone)]
pub struct PaymentReconciler {
    store: PaymentStoreRef,
    updater: VersionedUpdater,
    attacher: CustomFieldAttacher,
}

impl PaymentReconciler {
    pub fn new(store: PaymentStoreRef) -> Self {
        let updater = VersionedUpdater::new(store.clone());
        Self {
            store,
            attacher: CustomFieldAttacher::new(updater.clone()),
            updater,
        }
    }

    pub fn updater(&self) -> &VersionedUpdater {
        &self.updater
    }

    pub fn attacher(&self) -> &CustomFieldAttacher {
        &self.attacher
    }

    /// Records a gateway outcome (redirect return or webhook) as a
    /// transaction and attaches the gateway comments to it.
    ///
    /// Recording the same outcome again updates the transaction already
    /// carrying its reference rather than adding a second one.
    pub async fn record_outcome(
        &self,
        payment_id: &str,
        outcome: &GatewayOutcome,
        action: PaymentAction,
    ) -> Result<Reconciled, ReconcileError> {
        self.record(
            payment_id,
            outcome,
            action.transaction_type(),
            outcome.transaction_state(),
        )
        .await
    }

    /// Records a direct payment whose verdict came from the checkout rather
    /// than the gateway status.
    pub async fn record_checkout(
        &self,
        payment_id: &str,
        outcome: &GatewayOutcome,
        checkout: PaymentOutcome,
    ) -> Result<Reconciled, ReconcileError> {
        self.record(
            payment_id,
            outcome,
            TransactionType::Authorization,
            checkout.transaction_state(),
        )
        .await
    }

    async fn record(
        &self,
        payment_id: &str,
        outcome: &GatewayOutcome,
        kind: TransactionType,
        state: TransactionState,
    ) -> Result<Reconciled, ReconcileError> {
        let payment = self.store.fetch(payment_id).await?;
        let amount = outcome
            .money()
            .unwrap_or_else(|| payment.amount_planned.clone());

        let comments = outcome.comments();
        let interface_text = match outcome.bank_details_text(&amount)? {
            Some(bank) => format!("{}\n{}", comments, bank),
            None => comments.clone(),
        };

        // A redelivered outcome moves the existing transaction instead of adding another.
        let recorded = payment.transactions.iter().rev().find(|t| {
            t.kind == kind && t.interaction_id.as_deref() == Some(outcome.reference_id.as_str())
        });
        let transaction = match recorded {
            Some(t) => {
                info!(
                    payment_id,
                    reference = %outcome.reference_id,
                    transaction_id = %t.id,
                    "outcome already recorded, updating its state"
                );
                MutationAction::ChangeTransactionState {
                    transaction_id: t.id.clone(),
                    state,
                }
            }
            None => MutationAction::AddTransaction {
                transaction: TransactionDraft {
                    kind,
                    amount,
                    interaction_id: Some(outcome.reference_id.clone()),
                    state,
                },
            },
        };

        let updated = self
            .updater
            .apply(
                payment_id,
                vec![
                    transaction,
                    MutationAction::SetStatusInterfaceText { interface_text },
                ],
            )
            .await?;
        let transaction_id = correlated_id(&updated.resource, &outcome.reference_id);
        info!(
            payment_id,
            reference = %outcome.reference_id,
            ?kind,
            ?state,
            retried = updated.retried,
            "gateway outcome recorded"
        );

        let annotation = self
            .attacher
            .attach(
                payment_id,
                &outcome.reference_id,
                TRANSACTION_COMMENTS_FIELD,
                &comments,
                TRANSACTION_COMMENTS_TYPE_KEY,
            )
            .await;
        if let Err(e) = &annotation {
            warn!(payment_id, error = %e, "failed to attach transaction comments");
        }

        Ok(Reconciled {
            payment_id: payment_id.to_string(),
            transaction_id,
            retried: updated.retried,
            annotation,
        })
    }

    /// First phase of a redirect payment: adds a pending transaction and
    /// associates the comments type with an empty value.
    pub async fn register_pending(
        &self,
        payment_id: &str,
        reference: &str,
        amount: Money,
    ) -> Result<Reconciled, ReconcileError> {
        let updated = self
            .updater
            .apply(
                payment_id,
                vec![MutationAction::AddTransaction {
                    transaction: TransactionDraft {
                        kind: TransactionType::Authorization,
                        amount,
                        interaction_id: Some(reference.to_string()),
                        state: TransactionState::Pending,
                    },
                }],
            )
            .await?;

        let annotation = self
            .attacher
            .attach_empty(
                payment_id,
                reference,
                TRANSACTION_COMMENTS_FIELD,
                TRANSACTION_COMMENTS_TYPE_KEY,
            )
            .await;
        if let Err(e) = &annotation {
            warn!(payment_id, error = %e, "failed to pre-register transaction comments type");
        }

        Ok(Reconciled {
            payment_id: payment_id.to_string(),
            transaction_id: correlated_id(&updated.resource, reference),
            retried: updated.retried,
            annotation,
        })
    }

    /// Second phase: moves the pending transaction to the gateway's verdict
    /// and fills in the comments on the already associated type.
    pub async fn complete_pending(
        &self,
        payment_id: &str,
        outcome: &GatewayOutcome,
    ) -> Result<Reconciled, ReconcileError> {
        let payment = self.store.fetch(payment_id).await?;
        let transaction_id = match payment.locate_transaction(&outcome.reference_id) {
            Some((t, TargetMatch::Correlated)) => t.id.clone(),
            _ => {
                return Err(ReconcileError::TransactionNotFound {
                    payment_id: payment_id.to_string(),
                    reference: outcome.reference_id.clone(),
                });
            }
        };

        let updated = self
            .updater
            .apply(
                payment_id,
                vec![MutationAction::ChangeTransactionState {
                    transaction_id: transaction_id.clone(),
                    state: outcome.transaction_state(),
                }],
            )
            .await?;

        let annotation = self
            .attacher
            .set_field_fast(
                payment_id,
                &outcome.reference_id,
                TRANSACTION_COMMENTS_FIELD,
                &outcome.comments(),
            )
            .await;
        if let Err(e) = &annotation {
            warn!(payment_id, error = %e, "failed to update transaction comments");
        }

        Ok(Reconciled {
            payment_id: payment_id.to_string(),
            transaction_id: Some(transaction_id),
            retried: updated.retried,
            annotation,
        })
    }

    pub async fn capture(
        &self,
        payment_id: &str,
        amount: Option<Money>,
    ) -> Result<Updated, ReconcileError> {
        let payment = self.store.fetch(payment_id).await?;
        let amount = amount.unwrap_or_else(|| payment.amount_planned.clone());
        self.add_modification(&payment, TransactionType::Charge, amount)
            .await
    }

    pub async fn cancel(&self, payment_id: &str) -> Result<Updated, ReconcileError> {
        let payment = self.store.fetch(payment_id).await?;
        let amount = payment.amount_planned.clone();
        self.add_modification(&payment, TransactionType::CancelAuthorization, amount)
            .await
    }

    pub async fn refund(
        &self,
        payment_id: &str,
        amount: Option<Money>,
    ) -> Result<Updated, ReconcileError> {
        let payment = self.store.fetch(payment_id).await?;
        let amount = amount.unwrap_or_else(|| payment.amount_planned.clone());
        self.add_modification(&payment, TransactionType::Refund, amount)
            .await
    }

    /// Undoes a payment: refunds a successful charge, otherwise cancels a
    /// successful authorization. Payments already refunded or cancelled
    /// (successfully or pending) are not reversed again.
    ///
    /// The reversal is submitted at the version the checks ran on. If the
    /// payment moved in between, the checks run once more on a fresh copy.
    pub async fn reverse(&self, payment_id: &str) -> Result<Updated, ReconcileError> {
        let payment = self.store.fetch(payment_id).await?;
        match self.reverse_checked(&payment).await {
            Err(ReconcileError::Update(UpdateFailure::UpdateFailed(e))) if e.is_conflict() => {
                warn!(payment_id, error = %e, "payment changed while reversing, checking again");
                let payment = self.store.fetch(payment_id).await?;
                self.reverse_checked(&payment).await
            }
            result => result,
        }
    }

    async fn reverse_checked(&self, payment: &PaymentRecord) -> Result<Updated, ReconcileError> {
        let reverted = payment.has_transaction_in_state(
            TransactionType::Refund,
            &[TransactionState::Success, TransactionState::Pending],
        ) || payment.has_transaction_in_state(
            TransactionType::CancelAuthorization,
            &[TransactionState::Success, TransactionState::Pending],
        );
        if reverted {
            return Err(ReconcileError::NothingToReverse(payment.id.clone()));
        }

        let succeeded = |kind| payment.has_transaction_in_state(kind, &[TransactionState::Success]);
        let kind = if succeeded(TransactionType::Charge) {
            TransactionType::Refund
        } else if succeeded(TransactionType::Authorization) {
            TransactionType::CancelAuthorization
        } else {
            return Err(ReconcileError::NothingToReverse(payment.id.clone()));
        };

        let action = modification(payment, kind, payment.amount_planned.clone());
        let updated = self.updater.apply_at(payment, vec![action]).await?;
        info!(payment_id = %payment.id, ?kind, "payment reversed");
        Ok(updated)
    }

    async fn add_modification(
        &self,
        payment: &PaymentRecord,
        kind: TransactionType,
        amount: Money,
    ) -> Result<Updated, ReconcileError> {
        let updated = self
            .updater
            .apply(&payment.id, vec![modification(payment, kind, amount)])
            .await?;
        info!(payment_id = %payment.id, ?kind, "payment modification recorded");
        Ok(updated)
    }
}

fn modification(payment: &PaymentRecord, kind: TransactionType, amount: Money) -> MutationAction {
    MutationAction::AddTransaction {
        transaction: TransactionDraft {
            kind,
            amount,
            interaction_id: payment.interface_id.clone(),
            state: TransactionState::Success,
        },
    }
}

fn correlated_id(payment: &PaymentRecord, reference: &str) -> Option<String> {
    match payment.locate_transaction(reference) {
        Some((t, TargetMatch::Correlated)) => Some(t.id.clone()),
        _ => None,
    }
}
