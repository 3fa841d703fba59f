use super::payment::{Money, TransactionState, deserialize_reference};
use crate::error::ConnectorError;
use serde::Deserialize;

/// Outcome reported by the checkout front end for a direct payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum PaymentOutcome {
    Authorized,
    Rejected,
    #[serde(other)]
    Unknown,
}

impl PaymentOutcome {
    pub fn transaction_state(&self) -> TransactionState {
        match self {
            PaymentOutcome::Authorized => TransactionState::Success,
            PaymentOutcome::Rejected => TransactionState::Failure,
            PaymentOutcome::Unknown => TransactionState::Initial,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BankDetails {
    pub account_holder: Option<String>,
    pub iban: Option<String>,
    pub bic: Option<String>,
    pub bank_name: Option<String>,
    pub bank_place: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayResult {
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayTransaction {
    #[serde(default, deserialize_with = "deserialize_reference")]
    tid: Option<String>,
    payment_type: Option<String>,
    status: Option<String>,
    amount: Option<i64>,
    currency: Option<String>,
    bank_details: Option<BankDetails>,
}

/// The subset of a gateway payment / transaction-details response the
/// reconciler consumes.
#[derive(Debug, Default, Deserialize)]
pub struct GatewayResponse {
    #[serde(default)]
    result: GatewayResult,
    #[serde(default)]
    transaction: GatewayTransaction,
}

/// A gateway's verdict on one payment attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOutcome {
    /// Gateway transaction id (TID); the correlation key on the platform.
    pub reference_id: String,
    pub status: String,
    pub payment_type: Option<String>,
    /// Minor units.
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub bank_details: Option<BankDetails>,
}

impl TryFrom<GatewayResponse> for GatewayOutcome {
    type Error = ConnectorError;

    fn try_from(response: GatewayResponse) -> Result<Self, Self::Error> {
        let tx = response.transaction;
        let reference_id = tx.tid.ok_or_else(|| {
            ConnectorError::ValidationError("Gateway response has no TID".to_string())
        })?;
        let status = response
            .result
            .status
            .or(tx.status)
            .unwrap_or_else(|| "N/A".to_string());

        Ok(Self {
            reference_id,
            status,
            payment_type: tx.payment_type,
            amount: tx.amount,
            currency: tx.currency,
            bank_details: tx.bank_details,
        })
    }
}

impl GatewayOutcome {
    pub fn from_json(body: &str) -> Result<Self, ConnectorError> {
        serde_json::from_str::<GatewayResponse>(body)?.try_into()
    }

    /// Maps the gateway status onto a platform transaction state.
    pub fn transaction_state(&self) -> TransactionState {
        match self.status.to_ascii_uppercase().as_str() {
            "SUCCESS" | "CONFIRMED" => TransactionState::Success,
            "PENDING" | "ON_HOLD" => TransactionState::Pending,
            "FAILURE" | "DEACTIVATED" => TransactionState::Failure,
            _ => TransactionState::Initial,
        }
    }

    /// The amount in platform form, if the gateway reported one.
    pub fn money(&self) -> Option<Money> {
        match (self.amount, &self.currency) {
            (Some(amount), Some(currency)) => Some(Money::new(currency.clone(), amount)),
            _ => None,
        }
    }

    /// Human-readable comment attached to the platform transaction.
    pub fn comments(&self) -> String {
        format!(
            "Novalnet Transaction ID: {}\nPayment Type: {}\nStatus: {}",
            self.reference_id,
            self.payment_type.as_deref().unwrap_or("N/A"),
            self.status
        )
    }

    /// Transfer instructions for invoice and prepayment methods, `None`
    /// when the gateway sent no bank details.
    pub fn bank_details_text(&self, amount: &Money) -> Result<Option<String>, ConnectorError> {
        let Some(bank) = self.bank_details.as_ref() else {
            return Ok(None);
        };
        let na = |v: &Option<String>| v.clone().unwrap_or_else(|| "N/A".to_string());
        Ok(Some(format!(
            "Please transfer the amount of {} {} to the following account.\n\
             Account holder: {}\nIBAN: {}\nBIC: {}\nBANK NAME: {}\nBANK PLACE: {}\n\
             Please use the following payment reference for your money transfer:\n\
             Payment Reference 1: {}",
            amount.to_decimal()?,
            amount.currency_code,
            na(&bank.account_holder),
            na(&bank.iban),
            na(&bank.bic),
            na(&bank.bank_name),
            na(&bank.bank_place),
            self.reference_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREPAYMENT_RESPONSE: &str = r#"{
        "result": {"status": "SUCCESS", "status_code": 100},
        "transaction": {
            "tid": 14799000000012345,
            "payment_type": "PREPAYMENT",
            "status": "PENDING",
            "amount": 1050,
            "currency": "EUR",
            "bank_details": {
                "account_holder": "Novalnet AG",
                "iban": "DE24300209002411761956",
                "bic": "BARCDEFFXXX",
                "bank_name": "Barclays",
                "bank_place": "Frankfurt"
            }
        }
    }"#;

    #[test]
    fn test_parse_gateway_response() {
        let outcome = GatewayOutcome::from_json(PREPAYMENT_RESPONSE).unwrap();
        assert_eq!(outcome.reference_id, "14799000000012345");
        assert_eq!(outcome.status, "SUCCESS");
        assert_eq!(outcome.transaction_state(), TransactionState::Success);
        assert_eq!(outcome.money(), Some(Money::new("EUR", 1050)));
        assert_eq!(
            outcome.comments(),
            "Novalnet Transaction ID: 14799000000012345\nPayment Type: PREPAYMENT\nStatus: SUCCESS"
        );
    }

    #[test]
    fn test_bank_details_text_uses_major_units() {
        let outcome = GatewayOutcome::from_json(PREPAYMENT_RESPONSE).unwrap();
        let text = outcome
            .bank_details_text(&Money::new("EUR", 1050))
            .unwrap()
            .unwrap();
        assert!(text.starts_with("Please transfer the amount of 10.50 EUR"));
        assert!(text.contains("IBAN: DE24300209002411761956"));
        assert!(text.ends_with("Payment Reference 1: 14799000000012345"));
    }

    #[test]
    fn test_missing_tid_rejected() {
        let result = GatewayOutcome::from_json(r#"{"result": {"status": "FAILURE"}}"#);
        assert!(matches!(result, Err(ConnectorError::ValidationError(_))));
    }

    #[test]
    fn test_checkout_outcome_mapping() {
        let outcome: PaymentOutcome = serde_json::from_str(r#""Authorized""#).unwrap();
        assert_eq!(outcome.transaction_state(), TransactionState::Success);
        let outcome: PaymentOutcome = serde_json::from_str(r#""Something""#).unwrap();
        assert_eq!(outcome.transaction_state(), TransactionState::Initial);
        assert_eq!(
            PaymentOutcome::Rejected.transaction_state(),
            TransactionState::Failure
        );
    }
}
