use clap::{Args, Parser, ValueEnum};
use miette::{IntoDiagnostic, Result, miette};
use novalnet_reconcile::application::reconciler::{PaymentAction, PaymentReconciler};
use novalnet_reconcile::domain::custom_type::CustomTypeDefinition;
use novalnet_reconcile::domain::payment::PaymentRecord;
use novalnet_reconcile::domain::ports::{CustomTypeStoreRef, PaymentStoreRef};
use novalnet_reconcile::infrastructure::commercetools::{CommercetoolsConfig, CommercetoolsStore};
use novalnet_reconcile::infrastructure::in_memory::InMemoryPaymentStore;
#[cfg(feature = "storage-rocksdb")]
use novalnet_reconcile::infrastructure::rocksdb::RocksDbPaymentStore;
use novalnet_reconcile::interfaces::csv::outcome_reader::OutcomeReader;
use novalnet_reconcile::interfaces::csv::transaction_writer::TransactionWriter;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    /// Local store: in memory, or RocksDB when --db-path is given
    Local,
    /// The commercetools HTTP API
    Commercetools,
}

#[derive(Clone, Copy, ValueEnum)]
enum ActionArg {
    Authorize,
    Payment,
}

impl From<ActionArg> for PaymentAction {
    fn from(arg: ActionArg) -> Self {
        match arg {
            ActionArg::Authorize => PaymentAction::Authorize,
            ActionArg::Payment => PaymentAction::Payment,
        }
    }
}

#[derive(Args)]
struct CommercetoolsArgs {
    #[arg(long, env = "CTP_PROJECT_KEY")]
    ct_project_key: Option<String>,
    #[arg(long, env = "CTP_CLIENT_ID")]
    ct_client_id: Option<String>,
    #[arg(long, env = "CTP_CLIENT_SECRET", hide_env_values = true)]
    ct_client_secret: Option<String>,
    #[arg(
        long,
        env = "CTP_AUTH_URL",
        default_value = "https://auth.europe-west1.gcp.commercetools.com"
    )]
    ct_auth_url: String,
    #[arg(
        long,
        env = "CTP_API_URL",
        default_value = "https://api.europe-west1.gcp.commercetools.com"
    )]
    ct_api_url: String,
}

impl CommercetoolsArgs {
    fn into_config(self) -> Result<CommercetoolsConfig> {
        let required = |value: Option<String>, flag: &str| {
            value.ok_or_else(|| miette!("--{} is required with --store commercetools", flag))
        };
        Ok(CommercetoolsConfig {
            project_key: required(self.ct_project_key, "ct-project-key")?,
            client_id: required(self.ct_client_id, "ct-client-id")?,
            client_secret: required(self.ct_client_secret, "ct-client-secret")?,
            auth_url: self.ct_auth_url,
            api_url: self.ct_api_url,
        })
    }
}

/// Replays gateway outcomes onto payments and prints the resulting transactions as CSV.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input gateway outcomes CSV file
    input: PathBuf,

    /// JSON array of payments to seed into the local store before replaying
    #[arg(long)]
    payments: Option<PathBuf>,

    /// Where payments live
    #[arg(long, value_enum, default_value_t = StoreKind::Local)]
    store: StoreKind,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Whether outcomes are recorded as authorizations or charges
    #[arg(long, value_enum, default_value_t = ActionArg::Authorize)]
    payment_action: ActionArg,

    #[command(flatten)]
    commercetools: CommercetoolsArgs,
}

enum Backend {
    Memory(InMemoryPaymentStore),
    #[cfg(feature = "storage-rocksdb")]
    RocksDb(RocksDbPaymentStore),
    Commercetools(CommercetoolsStore),
}

impl Backend {
    fn open(
        store: StoreKind,
        db_path: Option<PathBuf>,
        commercetools: CommercetoolsArgs,
    ) -> Result<Self> {
        if store == StoreKind::Commercetools {
            return Ok(Backend::Commercetools(CommercetoolsStore::new(
                commercetools.into_config()?,
            )));
        }

        match db_path {
            #[cfg(feature = "storage-rocksdb")]
            Some(path) => Ok(Backend::RocksDb(
                RocksDbPaymentStore::open(path).into_diagnostic()?,
            )),
            #[cfg(not(feature = "storage-rocksdb"))]
            Some(_) => {
                warn!(
                    "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' \
                     feature is not enabled. Falling back to In-Memory storage."
                );
                Ok(Backend::Memory(InMemoryPaymentStore::new()))
            }
            None => Ok(Backend::Memory(InMemoryPaymentStore::new())),
        }
    }

    fn payment_store(&self) -> PaymentStoreRef {
        match self {
            Backend::Memory(s) => Arc::new(s.clone()),
            #[cfg(feature = "storage-rocksdb")]
            Backend::RocksDb(s) => Arc::new(s.clone()),
            Backend::Commercetools(s) => Arc::new(s.clone()),
        }
    }

    fn type_store(&self) -> CustomTypeStoreRef {
        match self {
            Backend::Memory(s) => Arc::new(s.clone()),
            #[cfg(feature = "storage-rocksdb")]
            Backend::RocksDb(s) => Arc::new(s.clone()),
            Backend::Commercetools(s) => Arc::new(s.clone()),
        }
    }

    async fn seed(&self, payment: PaymentRecord) -> Result<()> {
        match self {
            Backend::Memory(s) => s.insert(payment).await,
            #[cfg(feature = "storage-rocksdb")]
            Backend::RocksDb(s) => s.insert(payment).await.into_diagnostic()?,
            Backend::Commercetools(_) => {
                warn!(
                    payment_id = %payment.id,
                    "payments are created by the platform, not seeding"
                );
            }
        }
        Ok(())
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(io::stderr().is_terminal()),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let backend = Backend::open(cli.store, cli.db_path, cli.commercetools)?;
    let ensured = backend
        .type_store()
        .ensure_type(&CustomTypeDefinition::transaction_comments())
        .await
        .into_diagnostic()?;
    info!(outcome = ?ensured, "transaction comments type ready");

    // Payments to report on, in id order
    let mut touched = BTreeSet::new();
    if let Some(path) = cli.payments {
        let file = File::open(path).into_diagnostic()?;
        let payments: Vec<PaymentRecord> = serde_json::from_reader(file).into_diagnostic()?;
        for payment in payments {
            touched.insert(payment.id.clone());
            backend.seed(payment).await?;
        }
    }

    let store = backend.payment_store();
    let reconciler = PaymentReconciler::new(store.clone());
    let action = PaymentAction::from(cli.payment_action);

    let file = File::open(cli.input).into_diagnostic()?;
    for record in OutcomeReader::new(file).outcomes() {
        match record {
            Ok(record) => {
                let (payment_id, outcome) = record.into_outcome();
                touched.insert(payment_id.clone());
                if let Err(e) = reconciler.record_outcome(&payment_id, &outcome, action).await {
                    error!(%payment_id, "Error processing outcome: {}", e);
                }
            }
            Err(e) => {
                error!("Error reading outcome: {}", e);
            }
        }
    }

    let mut payments = Vec::with_capacity(touched.len());
    for payment_id in &touched {
        match store.fetch(payment_id).await {
            Ok(payment) => payments.push(payment),
            Err(e) => error!(%payment_id, "Error fetching payment: {}", e),
        }
    }

    let stdout = io::stdout();
    let mut writer = TransactionWriter::new(stdout.lock());
    writer.write_payments(&payments).into_diagnostic()?;

    Ok(())
}
