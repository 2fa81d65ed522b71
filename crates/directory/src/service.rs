//! Directory lookup contract.

use crate::record::DirectoryRecord;
use care_core::{AppError, AppResult};
use std::sync::Mutex;
use std::time::Duration;

/// Trait for eldercare directory backends.
#[async_trait::async_trait]
pub trait DirectoryService: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Agencies near a city and two-letter state code.
    async fn by_city_state(&self, city: &str, state: &str) -> AppResult<Vec<DirectoryRecord>>;

    /// Agencies near a zip code.
    async fn by_zip(&self, zip_code: &str) -> AppResult<Vec<DirectoryRecord>>;
}

/// A lookup received by [`StaticDirectory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    CityState { city: String, state: String },
    Zip(String),
}

/// Directory returning the same records for every lookup and recording calls.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    records: Vec<DirectoryRecord>,
    failure: Option<String>,
    delay: Option<Duration>,
    lookups: Mutex<Vec<Lookup>>,
}

impl StaticDirectory {
    pub fn new(records: Vec<DirectoryRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    /// Every lookup fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Sleep this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Lookups received so far, in order.
    pub fn lookups(&self) -> Vec<Lookup> {
        self.lookups
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn answer(&self, lookup: Lookup) -> AppResult<Vec<DirectoryRecord>> {
        self.lookups
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(lookup);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.failure {
            Some(message) => Err(AppError::Tool(message.clone())),
            None => Ok(self.records.clone()),
        }
    }
}

#[async_trait::async_trait]
impl DirectoryService for StaticDirectory {
    fn name(&self) -> &str {
        "static"
    }

    async fn by_city_state(&self, city: &str, state: &str) -> AppResult<Vec<DirectoryRecord>> {
        self.answer(Lookup::CityState {
            city: city.to_string(),
            state: state.to_string(),
        })
        .await
    }

    async fn by_zip(&self, zip_code: &str) -> AppResult<Vec<DirectoryRecord>> {
        self.answer(Lookup::Zip(zip_code.to_string())).await
    }
}
