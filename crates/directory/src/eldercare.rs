//! Eldercare Locator SOAP client.
//!
//! Operations: `login(asUserName, asPassword)` returns a session token,
//! `SearchByCityState(asCity, asState, asToken)` and
//! `SearchByZip(asZipCode, asToken)` return a .NET DataSet whose `Table1`
//! rows are the agencies.

use crate::record::DirectoryRecord;
use crate::service::DirectoryService;
use care_core::config::DirectoryConfig;
use care_core::{AppError, AppResult};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const REQUEST_TIMEOUT_SECS: u64 = 30;
const RECORD_ELEMENT: &str = "Table1";

/// SOAP client for the Eldercare directory.
///
/// The session token is acquired lazily on first use and re-acquired once
/// when a lookup made with the cached token fails.
pub struct EldercareClient {
    client: Client,
    endpoint: String,
    namespace: String,
    credentials: Option<(String, String)>,
    token: Mutex<Option<String>>,
}

impl EldercareClient {
    pub fn new(
        endpoint: impl Into<String>,
        namespace: impl Into<String>,
        credentials: Option<(String, String)>,
    ) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Tool(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            namespace: namespace.into(),
            credentials,
            token: Mutex::new(None),
        })
    }

    /// Build a client from configuration, reading credentials from the environment.
    pub fn from_config(config: &DirectoryConfig) -> AppResult<Self> {
        let credentials = config.credentials();
        if credentials.is_none() {
            warn!(
                "Eldercare credentials not set ({} / {}); lookups will fail",
                config.username_env, config.password_env
            );
        }
        Self::new(&config.endpoint, &config.namespace, credentials)
    }

    async fn call(&self, operation: &str, params: &[(&str, &str)]) -> AppResult<String> {
        let body = envelope(&self.namespace, operation, params);
        let action = format!("\"{}{}\"", self.namespace, operation);

        debug!("Calling Eldercare {} ({} bytes)", operation, body.len());

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", action)
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::Tool(format!("Eldercare {} request failed: {}", operation, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AppError::Tool(format!("Failed to read Eldercare response: {}", e)))?;

        // SOAP faults arrive with HTTP 500; prefer the fault text when present.
        if let Some(fault) = element_text(&text, "faultstring")? {
            return Err(AppError::Tool(format!("Eldercare {} fault: {}", operation, fault)));
        }

        if !status.is_success() {
            return Err(AppError::Tool(format!(
                "Eldercare {} failed with status {}",
                operation, status
            )));
        }

        Ok(text)
    }

    async fn login(&self) -> AppResult<String> {
        let (username, password) = self.credentials.as_ref().ok_or_else(|| {
            AppError::Tool("Eldercare credentials are not configured".to_string())
        })?;

        let response = self
            .call(
                "login",
                &[("asUserName", username.as_str()), ("asPassword", password.as_str())],
            )
            .await?;

        let token = element_text(&response, "loginResult")?
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AppError::Tool("Eldercare login returned no token".to_string()))?;

        info!("Acquired Eldercare session token");
        Ok(token)
    }

    /// The cached token, or a new one. The flag is true when it was just acquired.
    async fn token(&self, refresh: bool) -> AppResult<(String, bool)> {
        let mut cached = self.token.lock().await;
        if !refresh {
            if let Some(token) = cached.as_ref() {
                return Ok((token.clone(), false));
            }
        }

        let token = self.login().await?;
        *cached = Some(token.clone());
        Ok((token, true))
    }

    async fn search(&self, operation: &str, params: &[(&str, &str)]) -> AppResult<Vec<DirectoryRecord>> {
        let (token, fresh) = self.token(false).await?;
        match self.search_with_token(operation, params, &token).await {
            Ok(records) => Ok(records),
            // A brand new token is not the problem
            Err(e) if fresh => Err(e),
            Err(e) => {
                warn!("Eldercare {} failed, re-acquiring token: {}", operation, e);
                let (token, _) = self.token(true).await?;
                self.search_with_token(operation, params, &token).await
            }
        }
    }

    async fn search_with_token(
        &self,
        operation: &str,
        params: &[(&str, &str)],
        token: &str,
    ) -> AppResult<Vec<DirectoryRecord>> {
        let mut all_params = params.to_vec();
        all_params.push(("asToken", token));

        let response = self.call(operation, &all_params).await?;
        let records = parse_records(&response)?;

        info!("Eldercare {} returned {} records", operation, records.len());
        Ok(records)
    }
}

#[async_trait::async_trait]
impl DirectoryService for EldercareClient {
    fn name(&self) -> &str {
        "eldercare"
    }

    async fn by_city_state(&self, city: &str, state: &str) -> AppResult<Vec<DirectoryRecord>> {
        self.search("SearchByCityState", &[("asCity", city), ("asState", state)])
            .await
    }

    async fn by_zip(&self, zip_code: &str) -> AppResult<Vec<DirectoryRecord>> {
        self.search("SearchByZip", &[("asZipCode", zip_code)]).await
    }
}

/// Render a SOAP 1.1 request envelope.
fn envelope(namespace: &str, operation: &str, params: &[(&str, &str)]) -> String {
    let mut body = String::new();
    for (name, value) in params {
        body.push_str(&format!("<{0}>{1}</{0}>", name, escape(*value)));
    }

    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<soap:Envelope xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#,
            r#"xmlns:xsd="http://www.w3.org/2001/XMLSchema" "#,
            r#"xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">"#,
            r#"<soap:Body><{op} xmlns="{ns}">{body}</{op}></soap:Body></soap:Envelope>"#
        ),
        op = operation,
        ns = escape(namespace),
        body = body
    )
}

fn xml_error(e: impl std::fmt::Display) -> AppError {
    AppError::Tool(format!("Malformed Eldercare XML: {}", e))
}

/// Text content of the first element with local name `name`.
fn element_text(xml: &str, name: &str) -> AppResult<Option<String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut inside = false;
    let mut text = String::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) if e.local_name().as_ref() == name.as_bytes() => inside = true,
            Event::Empty(e) if e.local_name().as_ref() == name.as_bytes() => {
                return Ok(Some(String::new()))
            }
            Event::Text(t) if inside => text.push_str(&t.unescape().map_err(xml_error)?),
            Event::CData(c) if inside => text.push_str(&String::from_utf8_lossy(&c.into_inner())),
            Event::End(e) if inside && e.local_name().as_ref() == name.as_bytes() => {
                return Ok(Some(text))
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Collect every `Table1` row in a search response.
fn parse_records(xml: &str) -> AppResult<Vec<DirectoryRecord>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut records = Vec::new();
    let mut current: Option<DirectoryRecord> = None;
    let mut field: Option<(String, String)> = None;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == RECORD_ELEMENT {
                    current = Some(DirectoryRecord::new());
                } else if current.is_some() {
                    field = Some((name, String::new()));
                }
            }
            Event::Empty(e) => {
                if let Some(record) = current.as_mut() {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    record.set(name, "");
                }
            }
            Event::Text(t) => {
                if let Some((_, value)) = field.as_mut() {
                    value.push_str(&t.unescape().map_err(xml_error)?);
                }
            }
            Event::CData(c) => {
                if let Some((_, value)) = field.as_mut() {
                    value.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(e) => {
                let name = e.local_name();
                if name.as_ref() == RECORD_ELEMENT.as_bytes() {
                    if let Some(record) = current.take() {
                        records.push(record);
                    }
                } else if let (Some(record), Some((field_name, value))) =
                    (current.as_mut(), field.take())
                {
                    record.set(field_name, value);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(records)
}
