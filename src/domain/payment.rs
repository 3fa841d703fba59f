use crate::error::ConnectorError;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// A monetary amount in minor units, as the platform stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Money {
    pub currency_code: String,
    pub cent_amount: i64,
    #[serde(default = "default_fraction_digits")]
    pub fraction_digits: u32,
}

fn default_fraction_digits() -> u32 {
    2
}

impl Money {
    pub fn new(currency_code: impl Into<String>, cent_amount: i64) -> Self {
        Self {
            currency_code: currency_code.into(),
            cent_amount,
            fraction_digits: default_fraction_digits(),
        }
    }

    /// The amount in major units, e.g. `1050` cents becomes `10.50`.
    pub fn to_decimal(&self) -> Result<Decimal, ConnectorError> {
        Decimal::try_new(self.cent_amount, self.fraction_digits).map_err(|_| {
            ConnectorError::ValidationError(format!(
                "Unsupported fraction digits {} for {} amount",
                self.fraction_digits, self.currency_code
            ))
        })
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub enum TransactionType {
    Authorization,
    Charge,
    Refund,
    CancelAuthorization,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
pub enum TransactionState {
    #[default]
    Initial,
    Pending,
    Success,
    Failure,
}

/// Reference to a custom type. The platform returns `id` on reads while
/// writes address the type by `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeReference {
    pub type_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl TypeReference {
    pub fn by_key(key: impl Into<String>) -> Self {
        Self {
            type_id: "type".to_string(),
            id: None,
            key: Some(key.into()),
        }
    }
}

/// A custom field value in one of the shapes the platform accepts.
///
/// A `LocalizedString` field only accepts the `Localized` shape, which is why
/// comment writers have to try both. Shapes this crate never writes (sets,
/// money, references) are kept as `Other` so the payment still decodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Boolean(bool),
    Number(serde_json::Number),
    Localized(BTreeMap<String, String>),
    Other(serde_json::Value),
}

impl FieldValue {
    pub const DEFAULT_LOCALE: &'static str = "en";

    pub fn localized(text: impl Into<String>) -> Self {
        FieldValue::Localized(BTreeMap::from([(
            Self::DEFAULT_LOCALE.to_string(),
            text.into(),
        )]))
    }

    /// Text of a plain or localized value, preferring the default locale.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Localized(map) => map
                .get(Self::DEFAULT_LOCALE)
                .or_else(|| map.values().next())
                .map(String::as_str),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFields {
    #[serde(rename = "type")]
    pub type_ref: TypeReference,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

/// Accepts a gateway reference given either as a JSON string or a number.
pub(crate) fn deserialize_reference<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    }))
}

/// One state change (authorize, charge, refund, cancel) recorded on a payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: Money,
    /// The gateway's reference, used to correlate gateway events.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_reference"
    )]
    pub interaction_id: Option<String>,
    #[serde(default)]
    pub state: TransactionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<CustomFields>,
}

impl Transaction {
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.custom.as_ref().and_then(|c| c.fields.get(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_text: Option<String>,
}

/// How a target transaction was chosen for a correlation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMatch {
    /// A transaction's `interactionId` equals the key.
    Correlated,
    /// Nothing matched, so the most recently added transaction was used.
    LastFallback,
}

/// A versioned payment as held by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    pub amount_planned: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anonymous_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_id: Option<String>,
    #[serde(default)]
    pub payment_method_info: PaymentMethodInfo,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl PaymentRecord {
    pub fn new(id: impl Into<String>, amount_planned: Money) -> Self {
        Self {
            id: id.into(),
            version: Some(1),
            amount_planned,
            customer_id: None,
            anonymous_id: None,
            interface_id: None,
            payment_method_info: PaymentMethodInfo::default(),
            payment_status: PaymentStatus::default(),
            transactions: Vec::new(),
        }
    }

    pub fn transaction(&self, transaction_id: &str) -> Option<&Transaction> {
        self.transactions.iter().find(|t| t.id == transaction_id)
    }

    /// Finds the transaction a gateway reference refers to.
    ///
    /// The most recent transaction whose `interactionId` matches wins, so a
    /// re-delivered outcome lands on the transaction it just added. Falls back
    /// to the last transaction when nothing matches; `None` only when the
    /// payment has no transactions at all.
    pub fn locate_transaction(&self, correlation_key: &str) -> Option<(&Transaction, TargetMatch)> {
        self.transactions
            .iter()
            .rev()
            .find(|t| t.interaction_id.as_deref() == Some(correlation_key))
            .map(|t| (t, TargetMatch::Correlated))
            .or_else(|| {
                self.transactions
                    .last()
                    .map(|t| (t, TargetMatch::LastFallback))
            })
    }

    pub fn has_transaction_in_state(
        &self,
        kind: TransactionType,
        states: &[TransactionState],
    ) -> bool {
        self.transactions
            .iter()
            .any(|t| t.kind == kind && states.contains(&t.state))
    }
}
