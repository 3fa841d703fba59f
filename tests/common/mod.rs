#![allow(dead_code)]

use async_trait::async_trait;
use novalnet_reconcile::domain::action::MutationAction;
use novalnet_reconcile::domain::custom_type::CustomTypeDefinition;
use novalnet_reconcile::domain::outcome::GatewayOutcome;
use novalnet_reconcile::domain::payment::{
    Money, PaymentRecord, Transaction, TransactionState, TransactionType,
};
use novalnet_reconcile::domain::ports::{CustomTypeStore, PaymentStore, PaymentUpdate};
use novalnet_reconcile::error::{Result, StoreError};
use novalnet_reconcile::infrastructure::in_memory::InMemoryPaymentStore;
use std::collections::VecDeque;
use std::sync::Mutex;

/// What the next `update` call does.
#[derive(Debug, Clone, Copy)]
pub enum UpdateStep {
    /// Forward to the backing store.
    Apply,
    /// Another writer commits first, then the update is forwarded.
    ConcurrentWrite,
    /// Fail with this HTTP status without touching the backing store.
    Reject(u16),
}

/// What the next `fetch` call does.
#[derive(Debug, Clone, Copy)]
pub enum FetchStep {
    Serve,
    Fail,
    StripVersion,
}

/// Payment store that follows a script and records every call.
///
/// Once a script runs out, calls fall through to the backing store.
pub struct ScriptedStore {
    pub inner: InMemoryPaymentStore,
    fetch_steps: Mutex<VecDeque<FetchStep>>,
    update_steps: Mutex<VecDeque<UpdateStep>>,
    fetches: Mutex<usize>,
    submitted: Mutex<Vec<PaymentUpdate>>,
    concurrent_action: Mutex<Option<MutationAction>>,
}

impl ScriptedStore {
    pub fn new(inner: InMemoryPaymentStore) -> Self {
        Self {
            inner,
            fetch_steps: Mutex::new(VecDeque::new()),
            update_steps: Mutex::new(VecDeque::new()),
            fetches: Mutex::new(0),
            submitted: Mutex::new(Vec::new()),
            concurrent_action: Mutex::new(None),
        }
    }

    /// What the other writer commits on `ConcurrentWrite`; defaults to a
    /// status text change.
    pub fn with_concurrent_action(self, action: MutationAction) -> Self {
        *self.concurrent_action.lock().unwrap() = Some(action);
        self
    }

    pub fn with_fetches(self, steps: &[FetchStep]) -> Self {
        self.fetch_steps.lock().unwrap().extend(steps);
        self
    }

    pub fn with_updates(self, steps: &[UpdateStep]) -> Self {
        self.update_steps.lock().unwrap().extend(steps);
        self
    }

    pub fn fetch_count(&self) -> usize {
        *self.fetches.lock().unwrap()
    }

    pub fn update_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }

    /// Every update submitted, in order, including rejected ones.
    pub fn submitted(&self) -> Vec<PaymentUpdate> {
        self.submitted.lock().unwrap().clone()
    }

    async fn concurrent_write(&self, payment_id: &str) -> Result<()> {
        let action = self
            .concurrent_action
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| MutationAction::SetStatusInterfaceText {
                interface_text: "written by someone else".to_string(),
            });
        let current = self.inner.fetch(payment_id).await?;
        self.inner
            .update(&PaymentUpdate {
                id: payment_id.to_string(),
                version: current.version.unwrap_or_default(),
                actions: vec![action],
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for ScriptedStore {
    async fn fetch(&self, payment_id: &str) -> Result<PaymentRecord> {
        *self.fetches.lock().unwrap() += 1;
        let step = self
            .fetch_steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(FetchStep::Serve);
        match step {
            FetchStep::Serve => self.inner.fetch(payment_id).await,
            FetchStep::Fail => Err(StoreError::Http {
                status: 503,
                body: "service unavailable".to_string(),
            }),
            FetchStep::StripVersion => {
                let mut payment = self.inner.fetch(payment_id).await?;
                payment.version = None;
                Ok(payment)
            }
        }
    }

    async fn update(&self, update: &PaymentUpdate) -> Result<PaymentRecord> {
        self.submitted.lock().unwrap().push(update.clone());
        let step = self
            .update_steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(UpdateStep::Apply);
        match step {
            UpdateStep::Apply => self.inner.update(update).await,
            UpdateStep::ConcurrentWrite => {
                self.concurrent_write(&update.id).await?;
                self.inner.update(update).await
            }
            UpdateStep::Reject(status) => Err(StoreError::Http {
                status,
                body: format!("rejected with {}", status),
            }),
        }
    }
}

pub fn transaction(
    id: &str,
    kind: TransactionType,
    interaction_id: &str,
    state: TransactionState,
) -> Transaction {
    Transaction {
        id: id.to_string(),
        kind,
        amount: Money::new("EUR", 1000),
        interaction_id: Some(interaction_id.to_string()),
        state,
        custom: None,
    }
}

/// `P1` at version 3 with one pending authorization `T1` for `ref-abc`.
pub fn pending_payment() -> PaymentRecord {
    let mut payment = PaymentRecord::new("P1", Money::new("EUR", 1000));
    payment.version = Some(3);
    payment.transactions.push(transaction(
        "T1",
        TransactionType::Authorization,
        "ref-abc",
        TransactionState::Pending,
    ));
    payment
}

/// In-memory store with the transaction comments type and the given payments.
pub async fn seeded_store(payments: Vec<PaymentRecord>) -> InMemoryPaymentStore {
    let store = InMemoryPaymentStore::new();
    store
        .ensure_type(&CustomTypeDefinition::transaction_comments())
        .await
        .unwrap();
    for payment in payments {
        store.insert(payment).await;
    }
    store
}

pub fn gateway_outcome(tid: &str, status: &str, amount: Option<i64>) -> GatewayOutcome {
    GatewayOutcome {
        reference_id: tid.to_string(),
        status: status.to_string(),
        payment_type: Some("CREDITCARD".to_string()),
        amount,
        currency: amount.map(|_| "EUR".to_string()),
        bank_details: None,
    }
}
