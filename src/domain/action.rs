use super::custom_type::CustomTypeDefinition;
use super::payment::{
    CustomFields, FieldValue, Money, PaymentRecord, Transaction, TransactionState,
    TransactionType, TypeReference,
};
use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Data for a transaction that does not exist yet; the store assigns its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDraft {
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_id: Option<String>,
    pub state: TransactionState,
}

/// One change submitted in a payment update, in the platform's wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum MutationAction {
    AddTransaction {
        transaction: TransactionDraft,
    },
    #[serde(rename_all = "camelCase")]
    SetTransactionCustomType {
        transaction_id: String,
        #[serde(rename = "type")]
        type_ref: TypeReference,
        fields: BTreeMap<String, FieldValue>,
    },
    #[serde(rename_all = "camelCase")]
    SetTransactionCustomField {
        transaction_id: String,
        name: String,
        value: FieldValue,
    },
    #[serde(rename_all = "camelCase")]
    ChangeTransactionState {
        transaction_id: String,
        state: TransactionState,
    },
    #[serde(rename_all = "camelCase")]
    SetStatusInterfaceText {
        interface_text: String,
    },
}

impl MutationAction {
    pub fn set_transaction_custom_type(
        transaction_id: &str,
        type_key: &str,
        field_name: &str,
        value: FieldValue,
    ) -> Self {
        MutationAction::SetTransactionCustomType {
            transaction_id: transaction_id.to_string(),
            type_ref: TypeReference::by_key(type_key),
            fields: BTreeMap::from([(field_name.to_string(), value)]),
        }
    }

    pub fn set_transaction_custom_field(
        transaction_id: &str,
        name: &str,
        value: FieldValue,
    ) -> Self {
        MutationAction::SetTransactionCustomField {
            transaction_id: transaction_id.to_string(),
            name: name.to_string(),
            value,
        }
    }

    /// The wire name of the action, used in log events.
    pub fn name(&self) -> &'static str {
        match self {
            MutationAction::AddTransaction { .. } => "addTransaction",
            MutationAction::SetTransactionCustomType { .. } => "setTransactionCustomType",
            MutationAction::SetTransactionCustomField { .. } => "setTransactionCustomField",
            MutationAction::ChangeTransactionState { .. } => "changeTransactionState",
            MutationAction::SetStatusInterfaceText { .. } => "setStatusInterfaceText",
        }
    }
}

fn transaction_mut<'a>(
    payment: &'a mut PaymentRecord,
    transaction_id: &str,
) -> Result<&'a mut Transaction, StoreError> {
    let payment_id = payment.id.clone();
    payment
        .transactions
        .iter_mut()
        .find(|t| t.id == transaction_id)
        .ok_or_else(|| {
            StoreError::InvalidAction(format!(
                "Transaction '{}' not found on payment '{}'",
                transaction_id, payment_id
            ))
        })
}

fn resolve_type<'a>(
    types: &'a HashMap<String, CustomTypeDefinition>,
    type_ref: &TypeReference,
) -> Result<&'a CustomTypeDefinition, StoreError> {
    let key = type_ref.key.as_deref().ok_or_else(|| {
        StoreError::InvalidAction("Custom type must be referenced by key".to_string())
    })?;
    types
        .get(key)
        .ok_or_else(|| StoreError::InvalidAction(format!("Custom type '{}' does not exist", key)))
}

impl PaymentRecord {
    /// Applies one action the way the platform would, validating custom
    /// fields against `types`. Used by the local store adapters; the record
    /// may be partially modified on error, so callers apply to a copy.
    pub fn apply_action(
        &mut self,
        action: &MutationAction,
        types: &HashMap<String, CustomTypeDefinition>,
    ) -> Result<(), StoreError> {
        match action {
            MutationAction::AddTransaction { transaction } => {
                self.transactions.push(Transaction {
                    id: uuid::Uuid::new_v4().to_string(),
                    kind: transaction.kind,
                    amount: transaction.amount.clone(),
                    interaction_id: transaction.interaction_id.clone(),
                    state: transaction.state,
                    custom: None,
                });
            }
            MutationAction::SetTransactionCustomType {
                transaction_id,
                type_ref,
                fields,
            } => {
                let definition = resolve_type(types, type_ref)?;
                if !definition.applies_to("transaction") {
                    return Err(StoreError::InvalidAction(format!(
                        "Custom type '{}' cannot be used on transactions",
                        definition.key
                    )));
                }
                for (name, value) in fields {
                    definition.validate_field(name, value)?;
                }
                let transaction = transaction_mut(self, transaction_id)?;
                transaction.custom = Some(CustomFields {
                    type_ref: TypeReference::by_key(definition.key.clone()),
                    fields: fields.clone(),
                });
            }
            MutationAction::SetTransactionCustomField {
                transaction_id,
                name,
                value,
            } => {
                let transaction = transaction_mut(self, transaction_id)?;
                let custom = transaction.custom.as_mut().ok_or_else(|| {
                    StoreError::InvalidAction(format!(
                        "Transaction '{}' has no custom type",
                        transaction_id
                    ))
                })?;
                resolve_type(types, &custom.type_ref)?.validate_field(name, value)?;
                custom.fields.insert(name.clone(), value.clone());
            }
            MutationAction::ChangeTransactionState {
                transaction_id,
                state,
            } => {
                transaction_mut(self, transaction_id)?.state = *state;
            }
            MutationAction::SetStatusInterfaceText { interface_text } => {
                self.payment_status.interface_text = Some(interface_text.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::custom_type::{TRANSACTION_COMMENTS_FIELD, TRANSACTION_COMMENTS_TYPE_KEY};

    fn registry() -> HashMap<String, CustomTypeDefinition> {
        let def = CustomTypeDefinition::transaction_comments();
        HashMap::from([(def.key.clone(), def)])
    }

    fn payment_with_transaction() -> PaymentRecord {
        let mut payment = PaymentRecord::new("P1", Money::new("EUR", 1000));
        payment
            .apply_action(
                &MutationAction::AddTransaction {
                    transaction: TransactionDraft {
                        kind: TransactionType::Authorization,
                        amount: Money::new("EUR", 1000),
                        interaction_id: Some("ref-abc".to_string()),
                        state: TransactionState::Pending,
                    },
                },
                &registry(),
            )
            .unwrap();
        payment
    }

    #[test]
    fn test_action_wire_shape() {
        let action = MutationAction::set_transaction_custom_type(
            "T1",
            TRANSACTION_COMMENTS_TYPE_KEY,
            TRANSACTION_COMMENTS_FIELD,
            FieldValue::localized("hi"),
        );
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "action": "setTransactionCustomType",
                "transactionId": "T1",
                "type": {"typeId": "type", "key": "novalnet-transaction-comments"},
                "fields": {"transactionComments": {"en": "hi"}}
            })
        );
    }

    #[test]
    fn test_custom_field_requires_type() {
        let mut payment = payment_with_transaction();
        let tx_id = payment.transactions[0].id.clone();

        let write = MutationAction::set_transaction_custom_field(
            &tx_id,
            TRANSACTION_COMMENTS_FIELD,
            "x".into(),
        );
        let result = payment.apply_action(&write, &registry());
        assert!(matches!(result, Err(StoreError::InvalidAction(_))));

        payment
            .apply_action(
                &MutationAction::set_transaction_custom_type(
                    &tx_id,
                    TRANSACTION_COMMENTS_TYPE_KEY,
                    TRANSACTION_COMMENTS_FIELD,
                    "".into(),
                ),
                &registry(),
            )
            .unwrap();
        payment
            .apply_action(
                &MutationAction::set_transaction_custom_field(
                    &tx_id,
                    TRANSACTION_COMMENTS_FIELD,
                    "x".into(),
                ),
                &registry(),
            )
            .unwrap();
        assert_eq!(
            payment.transactions[0].field(TRANSACTION_COMMENTS_FIELD),
            Some(&FieldValue::Text("x".to_string()))
        );
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut payment = payment_with_transaction();
        let tx_id = payment.transactions[0].id.clone();
        let result = payment.apply_action(
            &MutationAction::set_transaction_custom_type(&tx_id, "missing", "f", "x".into()),
            &registry(),
        );
        assert!(matches!(result, Err(StoreError::InvalidAction(_))));
    }
}
