use crate::domain::custom_type::{CustomTypeDefinition, EnsureOutcome};
use crate::domain::payment::PaymentRecord;
use crate::domain::ports::{CustomTypeStore, PaymentStore, PaymentUpdate};
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory payment store with platform update semantics.
///
/// Updates are compare-and-set on `version` under the write lock, so
/// concurrent writers to the same payment see real version conflicts.
/// Custom-field actions are validated against the registered custom types.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    payments: Arc<RwLock<HashMap<String, PaymentRecord>>>,
    types: Arc<RwLock<HashMap<String, CustomTypeDefinition>>>,
}

impl InMemoryPaymentStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a payment as the platform would have created it.
    pub async fn insert(&self, payment: PaymentRecord) {
        let mut payments = self.payments.write().await;
        payments.insert(payment.id.clone(), payment);
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn fetch(&self, payment_id: &str) -> Result<PaymentRecord> {
        let payments = self.payments.read().await;
        payments
            .get(payment_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(payment_id.to_string()))
    }

    async fn update(&self, update: &PaymentUpdate) -> Result<PaymentRecord> {
        let types = self.types.read().await;
        let mut payments = self.payments.write().await;

        let current = payments
            .get(&update.id)
            .ok_or_else(|| StoreError::NotFound(update.id.clone()))?;
        if current.version != Some(update.version) {
            return Err(StoreError::Conflict {
                id: update.id.clone(),
                submitted: update.version,
                current: current.version,
            });
        }

        let mut next = current.clone();
        for action in &update.actions {
            next.apply_action(action, &types)?;
        }
        next.version = Some(update.version + 1);
        payments.insert(next.id.clone(), next.clone());
        Ok(next)
    }
}

#[async_trait]
impl CustomTypeStore for InMemoryPaymentStore {
    async fn ensure_type(&self, definition: &CustomTypeDefinition) -> Result<EnsureOutcome> {
        let mut types = self.types.write().await;
        let Some(existing) = types.get_mut(&definition.key) else {
            let mut created = definition.clone();
            created.version = Some(1);
            types.insert(created.key.clone(), created);
            return Ok(EnsureOutcome::Created);
        };

        let missing: Vec<_> = existing
            .missing_fields(definition)
            .into_iter()
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(EnsureOutcome::Unchanged);
        }
        let added = missing.len();
        existing.field_definitions.extend(missing);
        existing.version = existing.version.map(|v| v + 1);
        Ok(EnsureOutcome::Extended(added))
    }
}
