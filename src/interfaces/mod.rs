//! CSV adapters for the replay tool.

pub mod csv;
