use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use time::{Date, Duration, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};
use ulid::Ulid;

/// Width of the fixed `yyyyMMddHHmmssSSSSSS` delta timestamp encoding.
pub const DELTA_AT_LEN: usize = 20;

const ETAG_LEN: usize = 40;

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum KernelError {
    #[error("invalid delta_at: {0}")]
    InvalidDeltaAt(String),
    #[error("unknown officer type: {0}")]
    UnknownOfficerType(String),
    #[error("invalid officer id: {0}")]
    InvalidOfficerId(String),
    #[error("{requested} officer requested but {stored} officer found for officer id {officer_id}")]
    OfficerTypeMismatch { officer_id: String, requested: OfficerType, stored: OfficerType },
    #[error("validation error: {0}")]
    Validation(String),
}

/// Failure reported by a [`DisqualificationStore`].
///
/// `Transient` failures (connection loss, lock contention) are safe to redeliver;
/// `Permanent` failures (document validation, constraint violations) are not.
/// `Corrupt` means a stored row exists but cannot be decoded.
#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum StoreError {
    #[error("transient store failure: {0}")]
    Transient(String),
    #[error("permanent store failure: {0}")]
    Permanent(String),
    #[error("corrupt stored record: {0}")]
    Corrupt(String),
}

impl StoreError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct OfficerId(String);

impl OfficerId {
    /// Validate a raw officer identifier taken from a path segment.
    ///
    /// # Errors
    /// Returns [`KernelError::InvalidOfficerId`] for blank ids or ids containing `/`.
    pub fn parse(raw: &str) -> Result<Self, KernelError> {
        if raw.trim().is_empty() {
            return Err(KernelError::InvalidOfficerId("officer id MUST be non-empty".to_string()));
        }
        if raw.contains('/') {
            return Err(KernelError::InvalidOfficerId(format!(
                "officer id MUST NOT contain '/': {raw}"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for OfficerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OfficerType {
    Natural,
    Corporate,
}

impl OfficerType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Natural => "natural",
            Self::Corporate => "corporate",
        }
    }

    /// Resolve the officer type token used in resource paths.
    ///
    /// # Errors
    /// Returns [`KernelError::UnknownOfficerType`] for any token other than
    /// `natural` or `corporate`.
    pub fn parse(value: &str) -> Result<Self, KernelError> {
        match value {
            "natural" => Ok(Self::Natural),
            "corporate" => Ok(Self::Corporate),
            other => Err(KernelError::UnknownOfficerType(other.to_string())),
        }
    }

    #[must_use]
    pub fn kind(self) -> DisqualificationKind {
        match self {
            Self::Natural => DisqualificationKind::NaturalDisqualification,
            Self::Corporate => DisqualificationKind::CorporateDisqualification,
        }
    }

    /// Resource kind tag used by downstream change consumers.
    #[must_use]
    pub fn resource_kind(self) -> &'static str {
        match self {
            Self::Natural => "disqualified-officer-natural",
            Self::Corporate => "disqualified-officer-corporate",
        }
    }

    #[must_use]
    pub fn resource_uri(self, officer_id: &OfficerId) -> String {
        format!("/disqualified-officers/{}/{officer_id}", self.as_str())
    }
}

impl Display for OfficerType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Delta timestamps
// ---------------------------------------------------------------------------

/// Source-system change timestamp, encoded as `yyyyMMddHHmmssSSSSSS` in UTC.
///
/// The encoding is fixed width and zero padded, so string order and
/// chronological order agree.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DeltaAt(OffsetDateTime);

impl DeltaAt {
    /// Parse a 20-digit delta timestamp.
    ///
    /// # Errors
    /// Returns [`KernelError::InvalidDeltaAt`] when the input is not exactly 20 ASCII
    /// digits or does not name a valid calendar instant.
    pub fn parse(raw: &str) -> Result<Self, KernelError> {
        if raw.len() != DELTA_AT_LEN || !raw.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(KernelError::InvalidDeltaAt(format!(
                "expected {DELTA_AT_LEN} digits (yyyyMMddHHmmssSSSSSS), got {raw:?}"
            )));
        }

        let digits = |start: usize, end: usize| -> Result<u32, KernelError> {
            raw[start..end]
                .parse::<u32>()
                .map_err(|err| KernelError::InvalidDeltaAt(format!("{raw}: {err}")))
        };
        let component = |value: u32| -> Result<u8, KernelError> {
            u8::try_from(value).map_err(|err| KernelError::InvalidDeltaAt(format!("{raw}: {err}")))
        };
        let out_of_range =
            |err: time::error::ComponentRange| KernelError::InvalidDeltaAt(format!("{raw}: {err}"));

        let year = i32::try_from(digits(0, 4)?)
            .map_err(|err| KernelError::InvalidDeltaAt(format!("{raw}: {err}")))?;
        let month = Month::try_from(component(digits(4, 6)?)?).map_err(out_of_range)?;
        let day = component(digits(6, 8)?)?;
        let date = Date::from_calendar_date(year, month, day).map_err(out_of_range)?;
        let time = Time::from_hms_micro(
            component(digits(8, 10)?)?,
            component(digits(10, 12)?)?,
            component(digits(12, 14)?)?,
            digits(14, 20)?,
        )
        .map_err(out_of_range)?;

        Ok(Self(PrimitiveDateTime::new(date, time).assume_utc()))
    }

    /// Convert a structured timestamp into delta form, normalising to UTC and
    /// truncating to microsecond precision.
    ///
    /// # Errors
    /// Returns [`KernelError::InvalidDeltaAt`] when the UTC year does not fit in four digits.
    pub fn from_offset_date_time(value: OffsetDateTime) -> Result<Self, KernelError> {
        let utc = value.to_offset(UtcOffset::UTC);
        if !(0..=9999).contains(&utc.year()) {
            return Err(KernelError::InvalidDeltaAt(format!(
                "year {} cannot be encoded in yyyyMMddHHmmssSSSSSS",
                utc.year()
            )));
        }
        let sub_micro_nanos = i64::from(utc.nanosecond() % 1_000);
        Ok(Self(utc - Duration::nanoseconds(sub_micro_nanos)))
    }

    #[must_use]
    pub fn as_offset_date_time(self) -> OffsetDateTime {
        self.0
    }
}

impl Display for DeltaAt {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let value = self.0;
        write!(
            f,
            "{:04}{:02}{:02}{:02}{:02}{:02}{:06}",
            value.year(),
            u8::from(value.month()),
            value.day(),
            value.hour(),
            value.minute(),
            value.second(),
            value.microsecond()
        )
    }
}

impl FromStr for DeltaAt {
    type Err = KernelError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

/// Delete-path staleness check: `true` iff the request is strictly older than
/// the stored delta. A blank stored delta never makes a request stale.
///
/// # Errors
/// Returns [`KernelError::InvalidDeltaAt`] when either timestamp is malformed.
pub fn is_request_stale(request_delta_at: &str, stored_delta_at: &str) -> Result<bool, KernelError> {
    let request = DeltaAt::parse(request_delta_at)?;
    if stored_delta_at.trim().is_empty() {
        return Ok(false);
    }
    let stored = DeltaAt::parse(stored_delta_at)?;
    Ok(request < stored)
}

/// Write-path acceptance check: `true` iff the candidate is strictly after the
/// stored delta, or nothing usable is stored. Equal deltas are already applied.
///
/// # Errors
/// Returns [`KernelError::InvalidDeltaAt`] when the stored timestamp is malformed.
pub fn is_newer_than_stored(candidate: DeltaAt, stored_delta_at: &str) -> Result<bool, KernelError> {
    if stored_delta_at.trim().is_empty() {
        return Ok(true);
    }
    let stored = DeltaAt::parse(stored_delta_at)?;
    Ok(candidate > stored)
}

// ---------------------------------------------------------------------------
// Payload shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub enum DisqualificationKind {
    #[serde(rename = "natural-disqualification")]
    NaturalDisqualification,
    #[serde(rename = "corporate-disqualification")]
    CorporateDisqualification,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line_1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line_2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premises: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct LastVariation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub court_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "iso_date::option")]
    pub varied_on: Option<Date>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Disqualification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub company_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub court_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disqualification_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "iso_date::option")]
    pub disqualified_from: Option<Date>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "iso_date::option")]
    pub disqualified_until: Option<Date>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "iso_date::option")]
    pub heard_on: Option<Date>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "iso_date::option")]
    pub undertaken_on: Option<Date>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_variation: Option<LastVariation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct PermissionToAct {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub company_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub court_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "iso_date::option")]
    pub granted_on: Option<Date>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "iso_date::option")]
    pub expires_on: Option<Date>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct DisqualificationLinks {
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NaturalDisqualification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<DisqualificationKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_forenames: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub honours: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "iso_date::option")]
    pub date_of_birth: Option<Date>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nationality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person_number: Option<String>,
    #[serde(default)]
    pub disqualifications: Vec<Disqualification>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions_to_act: Vec<PermissionToAct>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<DisqualificationLinks>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CorporateDisqualification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<DisqualificationKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_of_registration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person_number: Option<String>,
    #[serde(default)]
    pub disqualifications: Vec<Disqualification>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions_to_act: Vec<PermissionToAct>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<DisqualificationLinks>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Officer data proper, discriminated by officer type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "officer_type", content = "data", rename_all = "snake_case")]
pub enum DisqualificationPayload {
    Natural(NaturalDisqualification),
    Corporate(CorporateDisqualification),
}

impl DisqualificationPayload {
    #[must_use]
    pub fn officer_type(&self) -> OfficerType {
        match self {
            Self::Natural(_) => OfficerType::Natural,
            Self::Corporate(_) => OfficerType::Corporate,
        }
    }

    #[must_use]
    pub fn etag(&self) -> Option<&str> {
        match self {
            Self::Natural(data) => data.etag.as_deref(),
            Self::Corporate(data) => data.etag.as_deref(),
        }
    }

    pub fn set_etag(&mut self, etag: String) {
        match self {
            Self::Natural(data) => data.etag = Some(etag),
            Self::Corporate(data) => data.etag = Some(etag),
        }
    }

    /// Stamp the resource kind matching the payload variant.
    #[must_use]
    pub fn with_kind(mut self) -> Self {
        let kind = self.officer_type().kind();
        match &mut self {
            Self::Natural(data) => data.kind = Some(kind),
            Self::Corporate(data) => data.kind = Some(kind),
        }
        self
    }

    /// Strip fields that are never exposed on public reads.
    #[must_use]
    pub fn redacted_for_public(mut self) -> Self {
        let (person_number, permissions) = match &mut self {
            Self::Natural(data) => (&mut data.person_number, &mut data.permissions_to_act),
            Self::Corporate(data) => (&mut data.person_number, &mut data.permissions_to_act),
        };
        *person_number = None;
        for permission in permissions.iter_mut() {
            permission.purpose = None;
        }
        self
    }

    /// Serialise the untagged officer data.
    ///
    /// # Errors
    /// Returns an error when the payload cannot be represented as JSON.
    pub fn data_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Natural(data) => serde_json::to_value(data),
            Self::Corporate(data) => serde_json::to_value(data),
        }
    }

    /// Serialise the untagged officer data to a JSON string.
    ///
    /// # Errors
    /// Returns an error when the payload cannot be represented as JSON.
    pub fn data_json(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Natural(data) => serde_json::to_string(data),
            Self::Corporate(data) => serde_json::to_string(data),
        }
    }

    /// Decode untagged officer data for a known officer type.
    ///
    /// # Errors
    /// Returns an error when the JSON does not match the officer type's shape.
    pub fn from_data_json(officer_type: OfficerType, raw: &str) -> Result<Self, serde_json::Error> {
        match officer_type {
            OfficerType::Natural => serde_json::from_str(raw).map(Self::Natural),
            OfficerType::Corporate => serde_json::from_str(raw).map(Self::Corporate),
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound delta requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InternalDisqualificationData {
    #[serde(default)]
    pub officer_disq_id: Option<String>,
    #[serde(default)]
    pub officer_detail_id: Option<String>,
    #[serde(default)]
    pub officer_id_raw: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub delta_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InternalNaturalDisqualification {
    pub external_data: NaturalDisqualification,
    pub internal_data: InternalDisqualificationData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InternalCorporateDisqualification {
    pub external_data: CorporateDisqualification,
    pub internal_data: InternalDisqualificationData,
}

/// Officer-type independent view of an inbound write.
#[derive(Debug, Clone, PartialEq)]
pub struct DisqualificationRequest {
    pub payload: DisqualificationPayload,
    pub internal_data: InternalDisqualificationData,
}

impl From<InternalNaturalDisqualification> for DisqualificationRequest {
    fn from(value: InternalNaturalDisqualification) -> Self {
        Self {
            payload: DisqualificationPayload::Natural(value.external_data),
            internal_data: value.internal_data,
        }
    }
}

impl From<InternalCorporateDisqualification> for DisqualificationRequest {
    fn from(value: InternalCorporateDisqualification) -> Self {
        Self {
            payload: DisqualificationPayload::Corporate(value.external_data),
            internal_data: value.internal_data,
        }
    }
}

// ---------------------------------------------------------------------------
// Persisted record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisqualificationRecord {
    pub id: OfficerId,
    pub officer_disq_id: Option<String>,
    pub officer_detail_id: Option<String>,
    pub officer_id_raw: Option<String>,
    pub delta_at: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub payload: DisqualificationPayload,
}

impl DisqualificationRecord {
    #[must_use]
    pub fn officer_type(&self) -> OfficerType {
        self.payload.officer_type()
    }

    /// Validate a record before it is persisted.
    ///
    /// # Errors
    /// Returns [`KernelError::Validation`] when the delta timestamp is malformed,
    /// the etag is missing, or `created_at` is after `updated_at`.
    pub fn validate(&self) -> Result<(), KernelError> {
        if !self.delta_at.trim().is_empty() {
            DeltaAt::parse(&self.delta_at)
                .map_err(|err| KernelError::Validation(format!("delta_at MUST be valid: {err}")))?;
        }

        match self.payload.etag() {
            Some(etag) if !etag.trim().is_empty() => {}
            _ => {
                return Err(KernelError::Validation(
                    "etag MUST be set before persisting".to_string(),
                ));
            }
        }

        if self.created_at > self.updated_at {
            return Err(KernelError::Validation(
                "created_at MUST NOT be after updated_at".to_string(),
            ));
        }

        Ok(())
    }
}

/// Confirm a stored record belongs to the officer type the caller addressed.
///
/// # Errors
/// Returns [`KernelError::OfficerTypeMismatch`] when the stored variant differs.
pub fn ensure_officer_type(
    record: &DisqualificationRecord,
    requested: OfficerType,
) -> Result<(), KernelError> {
    let stored = record.officer_type();
    if stored == requested {
        return Ok(());
    }
    Err(KernelError::OfficerTypeMismatch {
        officer_id: record.id.to_string(),
        requested,
        stored,
    })
}

/// Transformed write awaiting its `created_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct DisqualificationDraft {
    pub id: OfficerId,
    pub officer_disq_id: Option<String>,
    pub officer_detail_id: Option<String>,
    pub officer_id_raw: Option<String>,
    pub delta_at: DeltaAt,
    pub updated_at: OffsetDateTime,
    pub payload: DisqualificationPayload,
}

impl DisqualificationDraft {
    /// Finish the record, carrying `created_at` forward from the existing record
    /// or defaulting it to `updated_at` on first acceptance.
    #[must_use]
    pub fn into_record(self, existing: Option<&DisqualificationRecord>) -> DisqualificationRecord {
        let created_at = existing.map_or(self.updated_at, |record| record.created_at);
        DisqualificationRecord {
            id: self.id,
            officer_disq_id: self.officer_disq_id,
            officer_detail_id: self.officer_detail_id,
            officer_id_raw: self.officer_id_raw,
            delta_at: self.delta_at.to_string(),
            created_at,
            updated_at: self.updated_at,
            payload: self.payload,
        }
    }
}

/// Map an inbound delta into the persisted shape.
///
/// The payload always receives a freshly generated etag; any caller-supplied
/// etag is discarded.
///
/// # Errors
/// Returns [`KernelError::InvalidDeltaAt`] when the inbound delta timestamp
/// cannot be encoded.
pub fn transform(
    officer_id: OfficerId,
    request: DisqualificationRequest,
    now: OffsetDateTime,
) -> Result<DisqualificationDraft, KernelError> {
    let DisqualificationRequest { mut payload, internal_data } = request;
    let delta_at = DeltaAt::from_offset_date_time(internal_data.delta_at)?;
    payload.set_etag(generate_etag(now));

    Ok(DisqualificationDraft {
        id: officer_id,
        officer_disq_id: internal_data.officer_disq_id,
        officer_detail_id: internal_data.officer_detail_id,
        officer_id_raw: internal_data.officer_id_raw,
        delta_at,
        updated_at: now,
        payload,
    })
}

/// Produce a 40 character lowercase hex integrity tag.
#[must_use]
pub fn generate_etag(now: OffsetDateTime) -> String {
    let mut hasher = Sha256::new();
    hasher.update(Ulid::new().to_string().as_bytes());
    hasher.update(now.unix_timestamp_nanos().to_string().as_bytes());
    let mut digest_hex = hex::encode(hasher.finalize());
    digest_hex.truncate(ETAG_LEN);
    digest_hex
}

// ---------------------------------------------------------------------------
// Persistence contract
// ---------------------------------------------------------------------------

/// Document store keyed by officer id.
pub trait DisqualificationStore: Send + Sync {
    /// Load the record for `id` regardless of officer type.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the lookup cannot be completed.
    fn find_by_id(&self, id: &OfficerId) -> Result<Option<DisqualificationRecord>, StoreError>;

    /// Load the record for `id` only if it is stored as `officer_type`.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the lookup cannot be completed.
    fn find_by_id_and_type(
        &self,
        id: &OfficerId,
        officer_type: OfficerType,
    ) -> Result<Option<DisqualificationRecord>, StoreError> {
        Ok(self.find_by_id(id)?.filter(|record| record.officer_type() == officer_type))
    }

    /// Replace-or-insert by id.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the record is rejected or cannot be written.
    fn save(&self, record: &DisqualificationRecord) -> Result<(), StoreError>;

    /// Remove the record for `id`; removing an absent id is not an error.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the delete cannot be completed.
    fn delete_by_id(&self, id: &OfficerId) -> Result<(), StoreError>;
}
