//! In-memory fakes for exercising the aggregation pipeline without
//! touching the network.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::adapters::PlatformAdapter;
use crate::error::{PlatformError, Result};
use crate::types::event::RawResult;
use crate::types::platform::{AdapterKind, Capability, PlatformDescriptor, PlatformKey};

/// Which error a [`MockAdapter`] should produce on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Auth,
    Transport,
    DataShape,
    Exhausted,
    NotFound,
}

/// Scripted adapter that serves canned payloads, a fixed failure, or an
/// artificial delay.
pub struct MockAdapter {
    descriptor: PlatformDescriptor,
    results: Vec<serde_json::Value>,
    failure: Option<MockFailure>,
    delay: Option<Duration>,
}

impl MockAdapter {
    pub fn new(key: &str) -> Self {
        let key = PlatformKey::from(key);
        Self {
            descriptor: PlatformDescriptor {
                display_name: format!("Mock {key}"),
                base_url: format!("https://{key}.test"),
                capabilities: vec![
                    Capability::Search,
                    Capability::EventDetail,
                    Capability::VenueDetail,
                ],
                enabled: true,
                adapter: AdapterKind::Api,
                url_patterns: Vec::new(),
                requires_rotation: false,
                key,
            },
            results: Vec::new(),
            failure: None,
            delay: None,
        }
    }

    /// Append one raw payload to every successful search response.
    pub fn with_result(mut self, payload: serde_json::Value) -> Self {
        self.results.push(payload);
        self
    }

    /// Fail every call with the given error kind.
    pub fn failing_with(mut self, failure: MockFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    /// Sleep before answering any call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn error(&self, failure: MockFailure) -> PlatformError {
        let platform = self.descriptor.key.clone();
        match failure {
            MockFailure::Auth => PlatformError::Auth {
                platform,
                message: "mock credential rejection".into(),
            },
            MockFailure::Transport => PlatformError::Transport {
                platform,
                message: "mock connection failure".into(),
            },
            MockFailure::DataShape => PlatformError::DataShape {
                platform,
                selector: "mock".into(),
            },
            MockFailure::Exhausted => PlatformError::Exhausted(platform),
            MockFailure::NotFound => PlatformError::NotFound(format!("{platform}: mock")),
        }
    }

    async fn before_answer(&self) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = self.failure {
            return Err(self.error(failure));
        }
        Ok(())
    }

    fn raw(&self, payload: serde_json::Value) -> RawResult {
        RawResult {
            platform: self.descriptor.key.clone(),
            payload,
            fetched_at: Utc::now(),
        }
    }
}

#[async_trait]
impl PlatformAdapter for MockAdapter {
    fn descriptor(&self) -> &PlatformDescriptor {
        &self.descriptor
    }

    async fn search_events(
        &self,
        _query: &str,
        _location: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RawResult>> {
        self.before_answer().await?;
        Ok(self
            .results
            .iter()
            .take(limit)
            .map(|p| self.raw(p.clone()))
            .collect())
    }

    async fn get_event(&self, id: &str) -> Result<RawResult> {
        self.before_answer().await?;
        self.results
            .first()
            .map(|p| self.raw(p.clone()))
            .ok_or_else(|| PlatformError::NotFound(format!("event {id}")))
    }

    async fn get_venue(&self, id: &str) -> Result<RawResult> {
        self.before_answer().await?;
        self.results
            .first()
            .map(|p| self.raw(p.clone()))
            .ok_or_else(|| PlatformError::NotFound(format!("venue {id}")))
    }

    async fn probe(&self) -> Result<()> {
        self.before_answer().await
    }
}
