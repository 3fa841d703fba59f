use crate::domain::custom_type::{CustomTypeDefinition, EnsureOutcome, FieldDefinition};
use crate::domain::payment::PaymentRecord;
use crate::domain::ports::{CustomTypeStore, PaymentStore, PaymentUpdate};
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Connection settings for a commercetools project.
#[derive(Debug, Clone)]
pub struct CommercetoolsConfig {
    pub project_key: String,
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub api_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorEntry {
    code: String,
    current_version: Option<u64>,
}

#[derive(Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
enum TypeAction<'a> {
    #[serde(rename_all = "camelCase")]
    AddFieldDefinition { field_definition: &'a FieldDefinition },
}

#[derive(Serialize)]
struct TypeUpdate<'a> {
    version: u64,
    actions: Vec<TypeAction<'a>>,
}

/// Payment store backed by the commercetools HTTP API.
///
/// Authenticates with the client-credentials flow and caches the access
/// token until shortly before it expires. Payment data is never cached.
#[derive(Clone)]
pub struct CommercetoolsStore {
    http: reqwest::Client,
    config: CommercetoolsConfig,
    token: Arc<RwLock<Option<AccessToken>>>,
}

const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

impl CommercetoolsStore {
    pub fn new(config: CommercetoolsConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            token: Arc::new(RwLock::new(None)),
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.project_key,
            path
        )
    }

    async fn access_token(&self) -> Result<String> {
        {
            let token = self.token.read().await;
            if let Some(token) = token.as_ref()
                && token.expires_at > Instant::now()
            {
                return Ok(token.value.clone());
            }
        }

        let mut token = self.token.write().await;
        // Another caller may have refreshed while this one waited for the lock.
        if let Some(current) = token.as_ref()
            && current.expires_at > Instant::now()
        {
            return Ok(current.value.clone());
        }
        let scope = format!("manage_project:{}", self.config.project_key);
        let response = self
            .http
            .post(format!(
                "{}/oauth/token",
                self.config.auth_url.trim_end_matches('/')
            ))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials"), ("scope", scope.as_str())])
            .send()
            .await?;
        let granted: TokenResponse = check(response).await?.json().await?;
        debug!(
            expires_in = granted.expires_in,
            "obtained commercetools access token"
        );

        let lifetime =
            Duration::from_secs(granted.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *token = Some(AccessToken {
            value: granted.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(granted.access_token)
    }
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Http {
        status: status.as_u16(),
        body,
    })
}

/// Turns a 409 response body into a typed conflict, keeping the platform's
/// reported current version when present.
fn conflict_from_body(id: &str, submitted: u64, body: &str) -> StoreError {
    let current = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| {
            b.errors
                .into_iter()
                .find(|e| e.code == "ConcurrentModification")
        })
        .and_then(|e| e.current_version);
    StoreError::Conflict {
        id: id.to_string(),
        submitted,
        current,
    }
}

#[async_trait]
impl PaymentStore for CommercetoolsStore {
    async fn fetch(&self, payment_id: &str) -> Result<PaymentRecord> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(self.url(&format!("payments/{}", payment_id)))
            .bearer_auth(token)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(payment_id.to_string()));
        }
        Ok(check(response).await?.json().await?)
    }

    async fn update(&self, update: &PaymentUpdate) -> Result<PaymentRecord> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(self.url(&format!("payments/{}", update.id)))
            .bearer_auth(token)
            .json(update)
            .send()
            .await?;
        match check(response).await {
            Ok(response) => Ok(response.json().await?),
            Err(StoreError::Http { status: 409, body }) => {
                Err(conflict_from_body(&update.id, update.version, &body))
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl CustomTypeStore for CommercetoolsStore {
    async fn ensure_type(&self, definition: &CustomTypeDefinition) -> Result<EnsureOutcome> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(self.url(&format!("types/key={}", definition.key)))
            .bearer_auth(&token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            let mut body = definition.clone();
            body.id = None;
            body.version = None;
            check(
                self.http
                    .post(self.url("types"))
                    .bearer_auth(&token)
                    .json(&body)
                    .send()
                    .await?,
            )
            .await?;
            info!(key = %definition.key, "created custom type");
            return Ok(EnsureOutcome::Created);
        }

        let existing: CustomTypeDefinition = check(response).await?.json().await?;
        let missing = existing.missing_fields(definition);
        if missing.is_empty() {
            return Ok(EnsureOutcome::Unchanged);
        }

        let version = existing.version.ok_or_else(|| {
            StoreError::InvalidAction(format!(
                "Custom type '{}' has no version",
                existing.key
            ))
        })?;
        let update = TypeUpdate {
            version,
            actions: missing
                .iter()
                .map(|f| TypeAction::AddFieldDefinition { field_definition: *f })
                .collect(),
        };
        check(
            self.http
                .post(self.url(&format!("types/key={}", definition.key)))
                .bearer_auth(&token)
                .json(&update)
                .send()
                .await?,
        )
        .await?;
        info!(key = %definition.key, added = missing.len(), "added custom type fields");
        Ok(EnsureOutcome::Extended(missing.len()))
    }
}
