//! Schema registry client.
//!
//! Resolves subjects to registered Avro schemas over the registry's REST
//! protocol, optionally registering the local schema when the registry does
//! not know it yet. Loaded schemas are cached for the process lifetime; a
//! version drift against the registry's latest version is logged, never
//! reloaded.

use crate::config::SchemaRegistryConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const CONTENT_TYPE: &str = "application/vnd.schemaregistry.v1+json";

/// A registered binary contract: numeric id, version, and the parsed schema.
///
/// Immutable once loaded and shared via `Arc` for the process lifetime.
#[derive(Debug)]
pub struct RegisteredSchema {
    pub id: u32,
    pub version: u32,
    pub definition: String,
    pub schema: apache_avro::Schema,
}

#[derive(Serialize)]
struct SchemaPayload<'a> {
    schema: &'a str,
}

#[derive(Deserialize)]
struct LookupResponse {
    id: u32,
    version: u32,
    schema: String,
}

#[derive(Deserialize)]
struct RegisterResponse {
    id: u32,
}

#[derive(Deserialize)]
struct VersionResponse {
    version: u32,
}

pub struct SchemaRegistryClient {
    base_url: String,
    auto_register: bool,
    http: reqwest::Client,
    cache: Mutex<HashMap<String, Arc<RegisteredSchema>>>,
}

impl SchemaRegistryClient {
    pub fn new(config: &SchemaRegistryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            auto_register: config.auto_register,
            http,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Resolves `subject` to the registered schema matching `schema_json`.
    ///
    /// Looks the schema up under the subject; on a miss, registers it when
    /// auto-registration is enabled, otherwise surfaces the lookup failure
    /// (startup-fatal for the caller). On a hit, compares the looked-up
    /// version against the subject's latest registered version and logs a
    /// warning when the local schema is stale; processing continues with the
    /// looked-up schema. Callers are expected to wrap this in
    /// [`retry`](crate::retry) since the registry may be briefly unavailable
    /// during rolling deploys.
    #[instrument(skip(self, schema_json))]
    pub async fn load_schema(
        &self,
        subject: &str,
        schema_json: &str,
    ) -> Result<Arc<RegisteredSchema>> {
        if let Some(cached) = self.cache.lock().expect("schema cache lock poisoned").get(subject) {
            debug!("Schema for subject '{}' served from cache", subject);
            return Ok(Arc::clone(cached));
        }

        let looked_up = match self.lookup(subject, schema_json).await? {
            Some(found) => {
                self.check_version_drift(subject, &found).await;
                found
            }
            None if self.auto_register => {
                info!("Schema for subject '{}' not registered yet, registering", subject);
                let id = self.register(subject, schema_json).await?;
                // The freshly registered schema is the subject's latest
                // version by construction.
                let version = self.latest_version(subject).await?;
                LookupResponse {
                    id,
                    version,
                    schema: schema_json.to_string(),
                }
            }
            None => {
                return Err(Error::Registry {
                    message: format!("no schema registered under subject '{subject}'"),
                });
            }
        };

        let schema = apache_avro::Schema::parse_str(&looked_up.schema)?;
        let registered = Arc::new(RegisteredSchema {
            id: looked_up.id,
            version: looked_up.version,
            definition: looked_up.schema,
            schema,
        });

        info!(
            subject,
            schema_id = registered.id,
            version = registered.version,
            "Loaded schema"
        );

        self.cache
            .lock()
            .expect("schema cache lock poisoned")
            .insert(subject.to_string(), Arc::clone(&registered));
        Ok(registered)
    }

    /// `POST /subjects/{subject}` — finds the registered version of this
    /// exact schema content. `Ok(None)` means the registry does not know it.
    async fn lookup(&self, subject: &str, schema_json: &str) -> Result<Option<LookupResponse>> {
        let url = format!("{}/subjects/{}", self.base_url, subject);
        let response = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .json(&SchemaPayload { schema: schema_json })
            .send()
            .await?;

        match response.status() {
            reqwest::StatusCode::OK => Ok(Some(response.json().await?)),
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            status => Err(Error::Registry {
                message: format!("lookup for subject '{subject}' failed with status {status}"),
            }),
        }
    }

    /// `POST /subjects/{subject}/versions` — registers the schema content.
    async fn register(&self, subject: &str, schema_json: &str) -> Result<u32> {
        let url = format!("{}/subjects/{}/versions", self.base_url, subject);
        let response = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .json(&SchemaPayload { schema: schema_json })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Registry {
                message: format!(
                    "registration for subject '{subject}' failed with status {}",
                    response.status()
                ),
            });
        }

        let registered: RegisterResponse = response.json().await?;
        Ok(registered.id)
    }

    /// `GET /subjects/{subject}/versions/latest`.
    async fn latest_version(&self, subject: &str) -> Result<u32> {
        let url = format!("{}/subjects/{}/versions/latest", self.base_url, subject);
        let latest: VersionResponse = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(latest.version)
    }

    /// Warns when the registry holds a newer version than the one compiled
    /// into this service. Diagnostic only; failures to fetch the latest
    /// version are logged and ignored.
    async fn check_version_drift(&self, subject: &str, looked_up: &LookupResponse) {
        match self.latest_version(subject).await {
            Ok(latest_version) if latest_version != looked_up.version => {
                warn!(
                    subject,
                    local_version = looked_up.version,
                    latest_version,
                    "Local schema is stale relative to the registry"
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(subject, error = %e, "Could not fetch latest schema version");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"{"type":"record","name":"Sample","fields":[{"name":"id","type":"string"}]}"#;

    fn client(url: &str, auto_register: bool) -> SchemaRegistryClient {
        SchemaRegistryClient::new(&SchemaRegistryConfig {
            url: url.to_string(),
            auto_register,
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn lookup_body(id: u32, version: u32) -> String {
        serde_json::json!({
            "subject": "events-value",
            "id": id,
            "version": version,
            "schema": SCHEMA,
        })
        .to_string()
    }

    #[tokio::test]
    async fn loads_registered_schema() {
        let mut server = mockito::Server::new_async().await;
        let lookup = server
            .mock("POST", "/subjects/events-value")
            .with_status(200)
            .with_body(lookup_body(42, 1))
            .create_async()
            .await;
        let latest = server
            .mock("GET", "/subjects/events-value/versions/latest")
            .with_status(200)
            .with_body(r#"{"version": 1}"#)
            .create_async()
            .await;

        let client = client(&server.url(), false);
        let schema = client.load_schema("events-value", SCHEMA).await.unwrap();

        assert_eq!(schema.id, 42);
        assert_eq!(schema.version, 1);
        lookup.assert_async().await;
        latest.assert_async().await;
    }

    #[tokio::test]
    async fn version_drift_returns_looked_up_schema() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/subjects/events-value")
            .with_status(200)
            .with_body(lookup_body(42, 1))
            .create_async()
            .await;
        server
            .mock("GET", "/subjects/events-value/versions/latest")
            .with_status(200)
            .with_body(r#"{"version": 2}"#)
            .create_async()
            .await;

        let client = client(&server.url(), false);
        let schema = client.load_schema("events-value", SCHEMA).await.unwrap();

        // The stale local schema stays in use; drift is only logged.
        assert_eq!(schema.version, 1);
        assert_eq!(schema.id, 42);
    }

    #[tokio::test]
    async fn unknown_schema_without_auto_register_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/subjects/events-value")
            .with_status(404)
            .with_body(r#"{"error_code": 40403, "message": "Schema not found"}"#)
            .create_async()
            .await;

        let client = client(&server.url(), false);
        let err = client.load_schema("events-value", SCHEMA).await.unwrap_err();

        assert!(matches!(err, Error::Registry { .. }));
    }

    #[tokio::test]
    async fn unknown_schema_with_auto_register_registers() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/subjects/events-value")
            .with_status(404)
            .with_body(r#"{"error_code": 40403, "message": "Schema not found"}"#)
            .create_async()
            .await;
        let register = server
            .mock("POST", "/subjects/events-value/versions")
            .with_status(200)
            .with_body(r#"{"id": 7}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/subjects/events-value/versions/latest")
            .with_status(200)
            .with_body(r#"{"version": 1}"#)
            .create_async()
            .await;

        let client = client(&server.url(), true);
        let schema = client.load_schema("events-value", SCHEMA).await.unwrap();

        assert_eq!(schema.id, 7);
        assert_eq!(schema.version, 1);
        register.assert_async().await;
    }

    #[tokio::test]
    async fn second_load_is_served_from_cache() {
        let mut server = mockito::Server::new_async().await;
        let lookup = server
            .mock("POST", "/subjects/events-value")
            .with_status(200)
            .with_body(lookup_body(42, 1))
            .expect(1)
            .create_async()
            .await;
        server
            .mock("GET", "/subjects/events-value/versions/latest")
            .with_status(200)
            .with_body(r#"{"version": 1}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client(&server.url(), false);
        let first = client.load_schema("events-value", SCHEMA).await.unwrap();
        let second = client.load_schema("events-value", SCHEMA).await.unwrap();

        assert_eq!(first.id, second.id);
        lookup.assert_async().await;
    }
}
