use std::sync::Arc;

use disqualified_officers_core::{
    ensure_officer_type, is_newer_than_stored, is_request_stale, transform,
    CorporateDisqualification, DeltaAt, DisqualificationPayload, DisqualificationRequest,
    DisqualificationStore, InternalCorporateDisqualification, InternalNaturalDisqualification,
    KernelError, NaturalDisqualification, OfficerId, OfficerType, StoreError,
};
use disqualified_officers_notify::{ChangeNotifier, NotifyError, ResourceChangedRequest};
use time::OffsetDateTime;

pub const API_CONTRACT_VERSION: &str = "api.v1";

/// Closed set of failures surfaced to callers.
#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("bad gateway: {0}")]
    BadGateway(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<KernelError> for ApiError {
    fn from(value: KernelError) -> Self {
        Self::BadRequest(value.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Transient(message) => Self::BadGateway(message),
            StoreError::Permanent(message) => Self::BadRequest(message),
            StoreError::Corrupt(message) => Self::Internal(message),
        }
    }
}

impl From<NotifyError> for ApiError {
    fn from(value: NotifyError) -> Self {
        match value {
            NotifyError::ServiceUnavailable(message) => Self::ServiceUnavailable(message),
            NotifyError::Unexpected(message) | NotifyError::Serialization(message) => {
                Self::Internal(message)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Applied,
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NothingToDelete,
}

/// Reconciles inbound deltas against the store and propagates accepted changes.
#[derive(Clone)]
pub struct DisqualifiedOfficersApi {
    store: Arc<dyn DisqualificationStore>,
    notifier: Arc<dyn ChangeNotifier>,
    clock: fn() -> OffsetDateTime,
}

impl DisqualifiedOfficersApi {
    #[must_use]
    pub fn new(store: Arc<dyn DisqualificationStore>, notifier: Arc<dyn ChangeNotifier>) -> Self {
        Self::with_clock(store, notifier, OffsetDateTime::now_utc)
    }

    #[must_use]
    pub fn with_clock(
        store: Arc<dyn DisqualificationStore>,
        notifier: Arc<dyn ChangeNotifier>,
        clock: fn() -> OffsetDateTime,
    ) -> Self {
        Self { store, notifier, clock }
    }

    /// Apply a natural officer delta.
    ///
    /// # Errors
    /// Returns [`ApiError`] when the request is malformed, the id is already stored
    /// as a corporate officer, persistence fails, or the change notification fails
    /// after persisting.
    pub fn upsert_natural(
        &self,
        context_id: &str,
        officer_id: &str,
        request: InternalNaturalDisqualification,
    ) -> Result<UpsertOutcome, ApiError> {
        self.upsert(context_id, officer_id, DisqualificationRequest::from(request))
    }

    /// Apply a corporate officer delta.
    ///
    /// # Errors
    /// Returns [`ApiError`] when the request is malformed, the id is already stored
    /// as a natural officer, persistence fails, or the change notification fails
    /// after persisting.
    pub fn upsert_corporate(
        &self,
        context_id: &str,
        officer_id: &str,
        request: InternalCorporateDisqualification,
    ) -> Result<UpsertOutcome, ApiError> {
        self.upsert(context_id, officer_id, DisqualificationRequest::from(request))
    }

    fn upsert(
        &self,
        context_id: &str,
        officer_id: &str,
        request: DisqualificationRequest,
    ) -> Result<UpsertOutcome, ApiError> {
        let officer_id = OfficerId::parse(officer_id).map_err(|err| {
            tracing::error!(context_id, error = %err, "rejected upsert");
            ApiError::from(err)
        })?;
        let officer_type = request.payload.officer_type();
        let candidate = DeltaAt::from_offset_date_time(request.internal_data.delta_at)
            .map_err(|err| {
                tracing::error!(context_id, officer_id = %officer_id, error = %err, "rejected upsert");
                ApiError::from(err)
            })?;

        let existing = self.store.find_by_id(&officer_id)?;
        if let Some(stored) = &existing {
            ensure_officer_type(stored, officer_type).map_err(|err| {
                tracing::error!(context_id, error = %err, "rejected upsert");
                ApiError::from(err)
            })?;
            let newer = is_newer_than_stored(candidate, &stored.delta_at).map_err(|err| {
                ApiError::Internal(format!("stored delta_at for {officer_id} is invalid: {err}"))
            })?;
            if !newer {
                tracing::info!(
                    context_id,
                    officer_id = %officer_id,
                    %officer_type,
                    delta_at = %candidate,
                    stored_delta_at = %stored.delta_at,
                    "stale upsert ignored"
                );
                return Ok(UpsertOutcome::Ignored);
            }
        }

        let draft = transform(officer_id.clone(), request, (self.clock)())?;
        let record = draft.into_record(existing.as_ref());
        self.store.save(&record).map_err(|err| {
            tracing::error!(context_id, officer_id = %officer_id, error = %err, "failed to persist disqualification");
            ApiError::from(err)
        })?;
        tracing::info!(
            context_id,
            officer_id = %officer_id,
            %officer_type,
            delta_at = %record.delta_at,
            "disqualification saved"
        );

        self.notify(&ResourceChangedRequest::changed(context_id, officer_id, officer_type))?;
        Ok(UpsertOutcome::Applied)
    }

    /// Public read of a natural officer.
    ///
    /// # Errors
    /// Returns [`ApiError::NotFound`] when no natural record exists for the id.
    pub fn get_natural(&self, officer_id: &str) -> Result<NaturalDisqualification, ApiError> {
        match self.get(OfficerType::Natural, officer_id)? {
            DisqualificationPayload::Natural(data) => Ok(data),
            DisqualificationPayload::Corporate(_) => Err(not_found(OfficerType::Natural, officer_id)),
        }
    }

    /// Public read of a corporate officer.
    ///
    /// # Errors
    /// Returns [`ApiError::NotFound`] when no corporate record exists for the id.
    pub fn get_corporate(&self, officer_id: &str) -> Result<CorporateDisqualification, ApiError> {
        match self.get(OfficerType::Corporate, officer_id)? {
            DisqualificationPayload::Corporate(data) => Ok(data),
            DisqualificationPayload::Natural(_) => Err(not_found(OfficerType::Corporate, officer_id)),
        }
    }

    fn get(
        &self,
        officer_type: OfficerType,
        officer_id: &str,
    ) -> Result<DisqualificationPayload, ApiError> {
        let id = OfficerId::parse(officer_id)
            .map_err(|_| not_found(officer_type, officer_id))?;
        let record = self
            .store
            .find_by_id_and_type(&id, officer_type)?
            .ok_or_else(|| not_found(officer_type, officer_id))?;
        Ok(record.payload.redacted_for_public())
    }

    /// Remove an officer record if the request is not older than what is stored.
    ///
    /// Deleting an id with no record still emits a "deleted" change without a
    /// snapshot and succeeds.
    ///
    /// # Errors
    /// Returns [`ApiError::BadRequest`] for an unknown officer type, a missing or
    /// malformed delta, or a record stored under the other officer type;
    /// [`ApiError::Conflict`] when the request is stale; store and notification
    /// failures map as for upserts.
    pub fn delete(
        &self,
        context_id: &str,
        officer_type_token: &str,
        officer_id: &str,
        request_delta_at: Option<&str>,
    ) -> Result<DeleteOutcome, ApiError> {
        let (officer_type, officer_id, request_delta_at) =
            parse_delete(officer_type_token, officer_id, request_delta_at).inspect_err(|err| {
                tracing::error!(context_id, officer_id, error = %err, "rejected delete");
            })?;

        let Some(existing) = self.store.find_by_id(&officer_id)? else {
            tracing::info!(
                context_id,
                officer_id = %officer_id,
                %officer_type,
                "delete requested for absent disqualification"
            );
            self.notify(&ResourceChangedRequest::deleted(context_id, officer_id, officer_type, None))?;
            return Ok(DeleteOutcome::NothingToDelete);
        };

        ensure_officer_type(&existing, officer_type).map_err(|err| {
            tracing::error!(context_id, error = %err, "rejected delete");
            ApiError::from(err)
        })?;

        let stale = is_request_stale(&request_delta_at.to_string(), &existing.delta_at)
            .map_err(|err| {
                ApiError::Internal(format!("stored delta_at for {officer_id} is invalid: {err}"))
            })?;
        if stale {
            tracing::error!(
                context_id,
                officer_id = %officer_id,
                delta_at = %request_delta_at,
                stored_delta_at = %existing.delta_at,
                "stale delete rejected"
            );
            return Err(ApiError::Conflict(format!(
                "stale delete for {officer_id}: {request_delta_at} is older than stored {}",
                existing.delta_at
            )));
        }

        let snapshot = existing.payload.with_kind();
        self.store.delete_by_id(&officer_id).map_err(|err| {
            tracing::error!(context_id, officer_id = %officer_id, error = %err, "failed to delete disqualification");
            ApiError::from(err)
        })?;
        tracing::info!(context_id, officer_id = %officer_id, %officer_type, "disqualification deleted");

        self.notify(&ResourceChangedRequest::deleted(
            context_id,
            officer_id,
            officer_type,
            Some(snapshot),
        ))?;
        Ok(DeleteOutcome::Deleted)
    }

    fn notify(&self, request: &ResourceChangedRequest) -> Result<(), ApiError> {
        self.notifier.notify(request).map_err(|err| {
            tracing::error!(
                context_id = %request.context_id,
                officer_id = %request.officer_id,
                error = %err,
                "change notification failed"
            );
            ApiError::from(err)
        })
    }
}

fn parse_delete(
    officer_type_token: &str,
    officer_id: &str,
    request_delta_at: Option<&str>,
) -> Result<(OfficerType, OfficerId, DeltaAt), ApiError> {
    let officer_type = OfficerType::parse(officer_type_token)?;
    let officer_id = OfficerId::parse(officer_id)?;
    let raw_delta_at = request_delta_at
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("delta_at header is required".to_string()))?;
    let delta_at = DeltaAt::parse(raw_delta_at)?;
    Ok((officer_type, officer_id, delta_at))
}

fn not_found(officer_type: OfficerType, officer_id: &str) -> ApiError {
    ApiError::NotFound(format!("no {officer_type} disqualification for officer id {officer_id}"))
}
