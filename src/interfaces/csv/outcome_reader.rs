use crate::domain::outcome::GatewayOutcome;
use crate::error::ConnectorError;
use serde::Deserialize;
use std::io::Read;

/// One gateway outcome row: the payment it belongs to and what the gateway
/// reported for it.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct OutcomeRecord {
    pub payment_id: String,
    pub tid: String,
    pub status: String,
    pub payment_type: Option<String>,
    pub amount: Option<i64>,
    pub currency: Option<String>,
}

impl OutcomeRecord {
    pub fn into_outcome(self) -> (String, GatewayOutcome) {
        let outcome = GatewayOutcome {
            reference_id: self.tid,
            status: self.status,
            payment_type: self.payment_type,
            amount: self.amount,
            currency: self.currency,
            bank_details: None,
        };
        (self.payment_id, outcome)
    }
}

/// Reads gateway outcomes from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over `Result<OutcomeRecord>`.
/// It handles whitespace trimming and flexible record lengths automatically.
pub struct OutcomeReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> OutcomeReader<R> {
    /// Creates a new `OutcomeReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes outcomes.
    pub fn outcomes(self) -> impl Iterator<Item = Result<OutcomeRecord, ConnectorError>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(ConnectorError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_valid_stream() {
        let data = "payment_id, tid, status, payment_type, amount, currency\n\
                    P1, 14799000000012345, SUCCESS, CREDITCARD, 1050, EUR\n\
                    P2, 14799000000012346, PENDING, , , ";
        let reader = OutcomeReader::new(data.as_bytes());
        let results: Vec<Result<OutcomeRecord, ConnectorError>> = reader.outcomes().collect();

        assert_eq!(results.len(), 2);
        let first = results[0].as_ref().unwrap();
        assert_eq!(first.payment_id, "P1");
        assert_eq!(first.amount, Some(1050));

        let (payment_id, outcome) = results[1].as_ref().unwrap().clone().into_outcome();
        assert_eq!(payment_id, "P2");
        assert_eq!(outcome.payment_type, None);
        assert_eq!(outcome.money(), None);
    }

    #[test]
    fn test_reader_malformed_line() {
        let data = "payment_id, tid, status, payment_type, amount, currency\n\
                    P1, 1, SUCCESS, CREDITCARD, ten, EUR";
        let reader = OutcomeReader::new(data.as_bytes());
        let results: Vec<Result<OutcomeRecord, ConnectorError>> = reader.outcomes().collect();

        assert!(results[0].is_err());
    }
}
