use super::updater::{UpdateFailure, VersionedUpdater};
use crate::domain::action::MutationAction;
use crate::domain::payment::{FieldValue, PaymentRecord, TargetMatch};
use crate::error::StoreError;
use std::fmt;
use thiserror::Error;
use tracing::{error, info};

/// Wire shape a string field was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    Plain,
    Localized,
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Representation::Plain => f.write_str("plain"),
            Representation::Localized => f.write_str("localized"),
        }
    }
}

/// The update action and representation that ended up succeeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachMethod {
    CustomType(Representation),
    CustomField(Representation),
}

impl AttachMethod {
    pub fn representation(&self) -> Representation {
        match self {
            AttachMethod::CustomType(r) | AttachMethod::CustomField(r) => *r,
        }
    }
}

impl fmt::Display for AttachMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttachMethod::CustomType(Representation::Plain) => "setTransactionCustomType",
            AttachMethod::CustomType(Representation::Localized) => {
                "setTransactionCustomType_localized"
            }
            AttachMethod::CustomField(Representation::Plain) => "setTransactionCustomField",
            AttachMethod::CustomField(Representation::Localized) => {
                "setTransactionCustomField_localized"
            }
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attached {
    pub method: AttachMethod,
    pub transaction_id: String,
    pub target: TargetMatch,
    pub retried: bool,
    pub resource: PaymentRecord,
}

#[derive(Error, Debug)]
pub enum AttachFailure {
    #[error("Failed to fetch payment: {0}")]
    FetchFailed(StoreError),
    #[error("Payment {0} has no transactions")]
    NoTransactions(String),
    #[error("Both representations were rejected: plain: {plain}; localized: {localized}")]
    AttachFailed {
        plain: UpdateFailure,
        localized: UpdateFailure,
    },
}

pub type AttachResult = Result<Attached, AttachFailure>;

#[derive(Debug, Clone, Copy)]
enum FieldWrite<'a> {
    CustomType { type_key: &'a str },
    CustomField,
}

impl FieldWrite<'_> {
    fn action(&self, transaction_id: &str, field_name: &str, value: FieldValue) -> MutationAction {
        match self {
            FieldWrite::CustomType { type_key } => MutationAction::set_transaction_custom_type(
                transaction_id,
                type_key,
                field_name,
                value,
            ),
            FieldWrite::CustomField => {
                MutationAction::set_transaction_custom_field(transaction_id, field_name, value)
            }
        }
    }

    fn method(&self, representation: Representation) -> AttachMethod {
        match self {
            FieldWrite::CustomType { .. } => AttachMethod::CustomType(representation),
            FieldWrite::CustomField => AttachMethod::CustomField(representation),
        }
    }
}

/// Writes one named string field onto the transaction a gateway reference
/// points at.
///
/// Fields may be declared as plain or localized strings, and the declaration
/// is not known up front: the plain shape is always submitted first and the
/// `{"en": value}` shape only after it is rejected.
#[derive(Clone)]
pub struct CustomFieldAttacher {
    updater: VersionedUpdater,
}

impl CustomFieldAttacher {
    pub fn new(updater: VersionedUpdater) -> Self {
        Self { updater }
    }

    /// Sets the custom type `type_key` on the target transaction with
    /// `field_name` set to `value`.
    pub async fn attach(
        &self,
        payment_id: &str,
        correlation_key: &str,
        field_name: &str,
        value: &str,
        type_key: &str,
    ) -> AttachResult {
        self.write(
            payment_id,
            correlation_key,
            field_name,
            value,
            FieldWrite::CustomType { type_key },
        )
        .await
    }

    /// Associates the custom type with an empty field, so the field can
    /// later be written with [`set_field_fast`](Self::set_field_fast).
    pub async fn attach_empty(
        &self,
        payment_id: &str,
        correlation_key: &str,
        field_name: &str,
        type_key: &str,
    ) -> AttachResult {
        self.write(
            payment_id,
            correlation_key,
            field_name,
            "",
            FieldWrite::CustomType { type_key },
        )
        .await
    }

    /// Updates a single field on a transaction that already carries its
    /// custom type.
    pub async fn set_field_fast(
        &self,
        payment_id: &str,
        correlation_key: &str,
        field_name: &str,
        value: &str,
    ) -> AttachResult {
        self.write(payment_id, correlation_key, field_name, value, FieldWrite::CustomField)
            .await
    }

    async fn write(
        &self,
        payment_id: &str,
        correlation_key: &str,
        field_name: &str,
        value: &str,
        write: FieldWrite<'_>,
    ) -> AttachResult {
        let payment = self
            .updater
            .store()
            .fetch(payment_id)
            .await
            .map_err(AttachFailure::FetchFailed)?;

        let (transaction_id, target) = payment
            .locate_transaction(correlation_key)
            .map(|(t, target)| (t.id.clone(), target))
            .ok_or_else(|| AttachFailure::NoTransactions(payment_id.to_string()))?;
        if target == TargetMatch::LastFallback {
            info!(
                payment_id,
                correlation_key,
                %transaction_id,
                "no transaction matches reference, using the last one"
            );
        }

        let plain = match self
            .updater
            .apply(
                payment_id,
                vec![write.action(&transaction_id, field_name, FieldValue::from(value))],
            )
            .await
        {
            Ok(updated) => {
                let method = write.method(Representation::Plain);
                info!(payment_id, %transaction_id, %method, "transaction field written");
                return Ok(Attached {
                    method,
                    transaction_id,
                    target,
                    retried: updated.retried,
                    resource: updated.resource,
                });
            }
            Err(e) => e,
        };

        info!(
            payment_id,
            %transaction_id,
            error = %plain,
            "plain value rejected, trying localized"
        );
        match self
            .updater
            .apply(
                payment_id,
                vec![write.action(&transaction_id, field_name, FieldValue::localized(value))],
            )
            .await
        {
            Ok(updated) => {
                let method = write.method(Representation::Localized);
                info!(payment_id, %transaction_id, %method, "transaction field written");
                Ok(Attached {
                    method,
                    transaction_id,
                    target,
                    retried: updated.retried,
                    resource: updated.resource,
                })
            }
            Err(localized) => {
                error!(
                    payment_id,
                    %transaction_id,
                    plain_error = %plain,
                    localized_error = %localized,
                    "both field representations were rejected"
                );
                Err(AttachFailure::AttachFailed { plain, localized })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::custom_type::{
        CustomTypeDefinition, FieldType, TRANSACTION_COMMENTS_FIELD, TRANSACTION_COMMENTS_TYPE_KEY,
    };
    use crate::domain::payment::{Money, Transaction, TransactionState, TransactionType};
    use crate::domain::ports::CustomTypeStore;
    use crate::infrastructure::in_memory::InMemoryPaymentStore;
    use std::sync::Arc;

    async fn store_with_payment() -> InMemoryPaymentStore {
        let store = InMemoryPaymentStore::new();
        store
            .ensure_type(&CustomTypeDefinition::transaction_comments())
            .await
            .unwrap();
        let mut payment = PaymentRecord::new("P1", Money::new("EUR", 1000));
        payment.transactions.push(Transaction {
            id: "T1".to_string(),
            kind: TransactionType::Authorization,
            amount: Money::new("EUR", 1000),
            interaction_id: Some("ref-abc".to_string()),
            state: TransactionState::Pending,
            custom: None,
        });
        store.insert(payment).await;
        store
    }

    fn attacher(store: InMemoryPaymentStore) -> CustomFieldAttacher {
        CustomFieldAttacher::new(VersionedUpdater::new(Arc::new(store)))
    }

    #[tokio::test]
    async fn test_attach_plain() {
        let attacher = attacher(store_with_payment().await);
        let attached = attacher
            .attach(
                "P1",
                "ref-abc",
                TRANSACTION_COMMENTS_FIELD,
                "Novalnet TID: 123",
                TRANSACTION_COMMENTS_TYPE_KEY,
            )
            .await
            .unwrap();

        assert_eq!(attached.method, AttachMethod::CustomType(Representation::Plain));
        assert_eq!(attached.method.to_string(), "setTransactionCustomType");
        assert_eq!(attached.target, TargetMatch::Correlated);
        assert_eq!(
            attached.resource.transactions[0].field(TRANSACTION_COMMENTS_FIELD),
            Some(&FieldValue::Text("Novalnet TID: 123".to_string()))
        );
    }

    #[tokio::test]
    async fn test_attach_falls_back_to_localized() {
        let store = store_with_payment().await;
        let mut localized = CustomTypeDefinition::transaction_comments();
        localized.key = "localized-comments".to_string();
        localized.field_definitions[0].field_type = FieldType::LocalizedString;
        store.ensure_type(&localized).await.unwrap();

        let attached = attacher(store)
            .attach("P1", "ref-abc", TRANSACTION_COMMENTS_FIELD, "hello", "localized-comments")
            .await
            .unwrap();
        assert_eq!(attached.method.representation(), Representation::Localized);
        assert_eq!(attached.method.to_string(), "setTransactionCustomType_localized");
    }

    #[tokio::test]
    async fn test_no_transactions() {
        let store = InMemoryPaymentStore::new();
        store
            .insert(PaymentRecord::new("P2", Money::new("EUR", 1000)))
            .await;
        let result = attacher(store)
            .attach("P2", "ref", TRANSACTION_COMMENTS_FIELD, "x", TRANSACTION_COMMENTS_TYPE_KEY)
            .await;
        assert!(matches!(result, Err(AttachFailure::NoTransactions(_))));
    }

    #[tokio::test]
    async fn test_set_field_fast_needs_type() {
        let attacher = attacher(store_with_payment().await);
        let result = attacher
            .set_field_fast("P1", "ref-abc", TRANSACTION_COMMENTS_FIELD, "x")
            .await;
        assert!(matches!(result, Err(AttachFailure::AttachFailed { .. })));

        attacher
            .attach_empty(
                "P1",
                "ref-abc",
                TRANSACTION_COMMENTS_FIELD,
                TRANSACTION_COMMENTS_TYPE_KEY,
            )
            .await
            .unwrap();
        let attached = attacher
            .set_field_fast("P1", "ref-abc", TRANSACTION_COMMENTS_FIELD, "x")
            .await
            .unwrap();
        assert_eq!(attached.method.to_string(), "setTransactionCustomField");
    }
}
