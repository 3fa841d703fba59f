use super::payment::FieldValue;
use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const TRANSACTION_COMMENTS_TYPE_KEY: &str = "novalnet-transaction-comments";
pub const TRANSACTION_COMMENTS_FIELD: &str = "transactionComments";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum FieldType {
    String,
    LocalizedString,
    Number,
    Boolean,
}

impl FieldType {
    pub fn accepts(&self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (FieldType::String, FieldValue::Text(_))
                | (FieldType::LocalizedString, FieldValue::Localized(_))
                | (FieldType::Number, FieldValue::Number(_))
                | (FieldType::Boolean, FieldValue::Boolean(_))
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub name: String,
    pub label: BTreeMap<String, String>,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_hint: Option<String>,
}

impl FieldDefinition {
    pub fn new(name: &str, label: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            label: BTreeMap::from([("en".to_string(), label.to_string())]),
            field_type,
            required: false,
            input_hint: None,
        }
    }
}

/// Schema of a custom type that can be attached to platform resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomTypeDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    pub key: String,
    pub name: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<BTreeMap<String, String>>,
    pub resource_type_ids: Vec<String>,
    #[serde(default)]
    pub field_definitions: Vec<FieldDefinition>,
}

/// What `ensure_type` had to do to make a definition available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    /// The type existed; this many field definitions were added.
    Extended(usize),
    Unchanged,
}

impl CustomTypeDefinition {
    /// The transaction-level type carrying gateway comments and risk data.
    pub fn transaction_comments() -> Self {
        let mut merchant_note =
            FieldDefinition::new("merchantNote", "Merchant Note", FieldType::String);
        merchant_note.input_hint = Some("SingleLine".to_string());

        Self {
            id: None,
            version: None,
            key: TRANSACTION_COMMENTS_TYPE_KEY.to_string(),
            name: BTreeMap::from([(
                "en".to_string(),
                "Novalnet Transaction Comments (hidden)".to_string(),
            )]),
            description: Some(BTreeMap::from([(
                "en".to_string(),
                "Transaction-level metadata for Novalnet (hidden in MC)".to_string(),
            )])),
            resource_type_ids: vec!["transaction".to_string()],
            field_definitions: vec![
                FieldDefinition::new(
                    TRANSACTION_COMMENTS_FIELD,
                    "Transaction Comments",
                    FieldType::String,
                ),
                FieldDefinition::new("riskScore", "Risk Score", FieldType::Number),
                merchant_note,
                FieldDefinition::new("deviceId", "Device ID", FieldType::String),
            ],
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.field_definitions.iter().find(|f| f.name == name)
    }

    pub fn applies_to(&self, resource_type_id: &str) -> bool {
        self.resource_type_ids.iter().any(|r| r == resource_type_id)
    }

    /// Field definitions of `desired` that this type does not declare yet.
    pub fn missing_fields<'a>(
        &self,
        desired: &'a CustomTypeDefinition,
    ) -> Vec<&'a FieldDefinition> {
        desired
            .field_definitions
            .iter()
            .filter(|f| self.field(&f.name).is_none())
            .collect()
    }

    /// Rejects values the platform would refuse for this field.
    pub fn validate_field(&self, name: &str, value: &FieldValue) -> Result<(), StoreError> {
        let definition = self.field(name).ok_or_else(|| {
            StoreError::InvalidAction(format!(
                "Field '{}' is not defined on type '{}'",
                name, self.key
            ))
        })?;

        if definition.field_type.accepts(value) {
            Ok(())
        } else {
            Err(StoreError::InvalidAction(format!(
                "Field '{}' of type '{}' expects {:?}",
                name, self.key, definition.field_type
            )))
        }
    }
}
