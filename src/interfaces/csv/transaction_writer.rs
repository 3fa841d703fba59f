use crate::domain::custom_type::TRANSACTION_COMMENTS_FIELD;
use crate::domain::payment::{PaymentRecord, TransactionState, TransactionType};
use crate::error::ConnectorError;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct TransactionRow<'a> {
    payment_id: &'a str,
    transaction_id: &'a str,
    #[serde(rename = "type")]
    kind: TransactionType,
    state: TransactionState,
    amount: String,
    currency: &'a str,
    interaction_id: &'a str,
    comments: &'a str,
}

/// Writes one CSV row per transaction, amounts in major units.
pub struct TransactionWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> TransactionWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_payments(&mut self, payments: &[PaymentRecord]) -> Result<(), ConnectorError> {
        for payment in payments {
            for tx in &payment.transactions {
                self.writer.serialize(TransactionRow {
                    payment_id: &payment.id,
                    transaction_id: &tx.id,
                    kind: tx.kind,
                    state: tx.state,
                    amount: tx.amount.to_decimal()?.to_string(),
                    currency: &tx.amount.currency_code,
                    interaction_id: tx.interaction_id.as_deref().unwrap_or(""),
                    comments: tx
                        .field(TRANSACTION_COMMENTS_FIELD)
                        .and_then(|v| v.as_text())
                        .unwrap_or(""),
                })?;
            }
        }
        self.writer.flush()?;
        Ok(())
    }
}
