use crate::domain::custom_type::{CustomTypeDefinition, EnsureOutcome};
use crate::domain::payment::PaymentRecord;
use crate::domain::ports::{CustomTypeStore, PaymentStore, PaymentUpdate};
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for storing payments.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family for storing custom type definitions.
pub const CF_TYPES: &str = "types";

/// A persistent payment store using RocksDB.
///
/// Payments and custom types live in separate Column Families. Writes go
/// through a single gate so the version check and the put are atomic with
/// respect to other writers sharing this handle.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbPaymentStore {
    db: Arc<DB>,
    write_gate: Arc<Mutex<()>>,
}

impl RocksDbPaymentStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families ("payments" and "types") exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_payments = ColumnFamilyDescriptor::new(CF_PAYMENTS, Options::default());
        let cf_types = ColumnFamilyDescriptor::new(CF_TYPES, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_payments, cf_types])?;

        Ok(Self {
            db: Arc::new(db),
            write_gate: Arc::new(Mutex::new(())),
        })
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &str) -> Result<Option<T>> {
        let cf = self.db.cf_handle(cf_name).ok_or_else(|| missing_cf(cf_name))?;
        match self.db.get_pinned_cf(&cf, key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, cf_name: &str, key: &str, value: &T) -> Result<()> {
        let cf = self.db.cf_handle(cf_name).ok_or_else(|| missing_cf(cf_name))?;
        self.db.put_cf(&cf, key.as_bytes(), serde_json::to_vec(value)?)?;
        Ok(())
    }

    fn all_types(&self) -> Result<HashMap<String, CustomTypeDefinition>> {
        let cf = self.db.cf_handle(CF_TYPES).ok_or_else(|| missing_cf(CF_TYPES))?;
        let mut types = HashMap::new();
        for item in self.db.iterator_cf(&cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item?;
            let definition: CustomTypeDefinition = serde_json::from_slice(&value)?;
            types.insert(definition.key.clone(), definition);
        }
        Ok(types)
    }

    /// Seeds a payment as the platform would have created it.
    pub async fn insert(&self, payment: PaymentRecord) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        self.put_json(CF_PAYMENTS, &payment.id, &payment)
    }
}

fn missing_cf(name: &str) -> StoreError {
    StoreError::InternalError(Box::new(std::io::Error::other(format!(
        "{} column family not found",
        name
    ))))
}

#[async_trait]
impl PaymentStore for RocksDbPaymentStore {
    async fn fetch(&self, payment_id: &str) -> Result<PaymentRecord> {
        self.get_json(CF_PAYMENTS, payment_id)?
            .ok_or_else(|| StoreError::NotFound(payment_id.to_string()))
    }

    async fn update(&self, update: &PaymentUpdate) -> Result<PaymentRecord> {
        let _gate = self.write_gate.lock().await;

        let current: PaymentRecord = self
            .get_json(CF_PAYMENTS, &update.id)?
            .ok_or_else(|| StoreError::NotFound(update.id.clone()))?;
        if current.version != Some(update.version) {
            return Err(StoreError::Conflict {
                id: update.id.clone(),
                submitted: update.version,
                current: current.version,
            });
        }

        let types = self.all_types()?;
        let mut next = current;
        for action in &update.actions {
            next.apply_action(action, &types)?;
        }
        next.version = Some(update.version + 1);
        self.put_json(CF_PAYMENTS, &next.id, &next)?;
        Ok(next)
    }
}

#[async_trait]
impl CustomTypeStore for RocksDbPaymentStore {
    async fn ensure_type(&self, definition: &CustomTypeDefinition) -> Result<EnsureOutcome> {
        let _gate = self.write_gate.lock().await;

        let Some(mut existing) =
            self.get_json::<CustomTypeDefinition>(CF_TYPES, &definition.key)?
        else {
            let mut created = definition.clone();
            created.version = Some(1);
            self.put_json(CF_TYPES, &created.key, &created)?;
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
        self.put_json(CF_TYPES, &existing.key, &existing)?;
        Ok(EnsureOutcome::Extended(added))
    }
}
