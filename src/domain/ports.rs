use super::action::MutationAction;
use super::custom_type::{CustomTypeDefinition, EnsureOutcome};
use super::payment::PaymentRecord;
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// A versioned update: applied only if `version` is still current.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentUpdate {
    #[serde(skip)]
    pub id: String,
    pub version: u64,
    pub actions: Vec<MutationAction>,
}

/// Versioned resource store holding payments.
///
/// `update` must compare-and-set atomically and report a stale `version`
/// as `StoreError::Conflict`.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn fetch(&self, payment_id: &str) -> Result<PaymentRecord>;
    async fn update(&self, update: &PaymentUpdate) -> Result<PaymentRecord>;
}

#[async_trait]
pub trait CustomTypeStore: Send + Sync {
    /// Creates the type, or adds the field definitions it is missing.
    async fn ensure_type(&self, definition: &CustomTypeDefinition) -> Result<EnsureOutcome>;
}

pub type PaymentStoreRef = Arc<dyn PaymentStore>;
pub type CustomTypeStoreRef = Arc<dyn CustomTypeStore>;
