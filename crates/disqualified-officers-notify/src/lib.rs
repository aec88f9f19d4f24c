use std::time::Duration;

use disqualified_officers_core::{DisqualificationPayload, OfficerId, OfficerType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

pub const RESOURCE_CHANGED_PATH: &str = "/private/resource-changed";

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum NotifyError {
    #[error("resource-changed endpoint unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("unexpected resource-changed response: {0}")]
    Unexpected(String),
    #[error("failed to serialise change notification: {0}")]
    Serialization(String),
}

/// A change to broadcast for one officer.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceChangedRequest {
    pub context_id: String,
    pub officer_id: OfficerId,
    pub officer_type: OfficerType,
    pub snapshot: Option<DisqualificationPayload>,
    pub is_delete: bool,
}

impl ResourceChangedRequest {
    #[must_use]
    pub fn changed(context_id: &str, officer_id: OfficerId, officer_type: OfficerType) -> Self {
        Self {
            context_id: context_id.to_string(),
            officer_id,
            officer_type,
            snapshot: None,
            is_delete: false,
        }
    }

    #[must_use]
    pub fn deleted(
        context_id: &str,
        officer_id: OfficerId,
        officer_type: OfficerType,
        snapshot: Option<DisqualificationPayload>,
    ) -> Self {
        Self {
            context_id: context_id.to_string(),
            officer_id,
            officer_type,
            snapshot,
            is_delete: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangedResourceEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub published_at: String,
}

/// Body of a `POST /private/resource-changed` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangedResource {
    pub resource_uri: String,
    pub resource_kind: String,
    pub context_id: String,
    pub event: ChangedResourceEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_data: Option<Value>,
}

#[derive(Debug, Clone, Copy)]
pub struct ChangedResourceMapper {
    clock: fn() -> OffsetDateTime,
}

impl Default for ChangedResourceMapper {
    fn default() -> Self {
        Self::new(OffsetDateTime::now_utc)
    }
}

impl ChangedResourceMapper {
    #[must_use]
    pub fn new(clock: fn() -> OffsetDateTime) -> Self {
        Self { clock }
    }

    /// Build the outbound change body.
    ///
    /// # Errors
    /// Returns [`NotifyError::Serialization`] when the deletion snapshot or the
    /// publish timestamp cannot be rendered.
    pub fn map(&self, request: &ResourceChangedRequest) -> Result<ChangedResource, NotifyError> {
        let published_at = (self.clock)()
            .to_offset(time::UtcOffset::UTC)
            .format(time::macros::format_description!(
                "[year]-[month]-[day]T[hour]:[minute]:[second]"
            ))
            .map_err(|err| NotifyError::Serialization(format!("published_at: {err}")))?;

        let deleted_data = match (&request.snapshot, request.is_delete) {
            (Some(snapshot), true) => Some(
                snapshot
                    .data_value()
                    .map_err(|err| NotifyError::Serialization(format!("deleted_data: {err}")))?,
            ),
            _ => None,
        };

        Ok(ChangedResource {
            resource_uri: request.officer_type.resource_uri(&request.officer_id),
            resource_kind: request.officer_type.resource_kind().to_string(),
            context_id: request.context_id.clone(),
            event: ChangedResourceEvent {
                event_type: if request.is_delete { "deleted" } else { "changed" }.to_string(),
                published_at,
            },
            deleted_data,
        })
    }
}

/// Outbound change propagation.
pub trait ChangeNotifier: Send + Sync {
    /// Deliver one change signal. Implementations do not retry.
    ///
    /// # Errors
    /// Returns [`NotifyError`] when the change could not be delivered.
    fn notify(&self, request: &ResourceChangedRequest) -> Result<(), NotifyError>;
}

/// Blocking HTTP client for the resource-changed endpoint.
#[derive(Clone)]
pub struct HttpChangeNotifier {
    agent: ureq::Agent,
    endpoint: String,
    mapper: ChangedResourceMapper,
}

impl HttpChangeNotifier {
    #[must_use]
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self::with_mapper(base_url, timeout, ChangedResourceMapper::default())
    }

    #[must_use]
    pub fn with_mapper(base_url: &str, timeout: Duration, mapper: ChangedResourceMapper) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Self {
            agent,
            endpoint: format!("{}{RESOURCE_CHANGED_PATH}", base_url.trim_end_matches('/')),
            mapper,
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ChangeNotifier for HttpChangeNotifier {
    fn notify(&self, request: &ResourceChangedRequest) -> Result<(), NotifyError> {
        let body = self.mapper.map(request)?;
        let payload = serde_json::to_string(&body)
            .map_err(|err| NotifyError::Serialization(err.to_string()))?;

        let response = self
            .agent
            .post(&self.endpoint)
            .set("content-type", "application/json")
            .set("x-request-id", &request.context_id)
            .send_string(&payload);

        match response {
            Ok(resp) if (200..=299).contains(&resp.status()) => {
                tracing::debug!(
                    context_id = %request.context_id,
                    resource_uri = %body.resource_uri,
                    event = %body.event.event_type,
                    "resource-changed delivered"
                );
                Ok(())
            }
            Ok(resp) => Err(NotifyError::Unexpected(format!(
                "resource-changed returned http status {}",
                resp.status()
            ))),
            Err(ureq::Error::Status(503, _)) => {
                tracing::error!(context_id = %request.context_id, "resource-changed returned 503");
                Err(NotifyError::ServiceUnavailable(
                    "resource-changed returned http status 503".to_string(),
                ))
            }
            Err(ureq::Error::Status(code, _)) => {
                tracing::error!(context_id = %request.context_id, status = code, "resource-changed failed");
                Err(NotifyError::Unexpected(format!(
                    "resource-changed returned http status {code}"
                )))
            }
            Err(ureq::Error::Transport(err)) => {
                tracing::error!(context_id = %request.context_id, error = %err, "resource-changed transport error");
                Err(NotifyError::ServiceUnavailable(format!("transport error: {err}")))
            }
        }
    }
}

/// Delegates to `inner` only when the stream hook is enabled.
#[derive(Debug, Clone)]
pub struct StreamHookGate<N> {
    inner: N,
    enabled: bool,
}

impl<N: ChangeNotifier> StreamHookGate<N> {
    #[must_use]
    pub fn new(inner: N, enabled: bool) -> Self {
        Self { inner, enabled }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl<N: ChangeNotifier> ChangeNotifier for StreamHookGate<N> {
    fn notify(&self, request: &ResourceChangedRequest) -> Result<(), NotifyError> {
        if !self.enabled {
            tracing::debug!(
                context_id = %request.context_id,
                officer_id = %request.officer_id,
                "stream hook disabled; resource-changed not sent"
            );
            return Ok(());
        }
        self.inner.notify(request)
    }
}
