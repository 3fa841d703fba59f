//! Domain model: payments, transactions, update actions and the ports the
//! application layer talks to.

pub mod action;
pub mod custom_type;
pub mod outcome;
pub mod payment;
pub mod ports;
