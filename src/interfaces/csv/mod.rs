pub mod outcome_reader;
pub mod transaction_writer;
