//! Per-session flow state.
//!
//! The processor keeps nothing per user in memory. Everything that must
//! survive between the redirect and the callback is written as notes into a
//! host-owned [`SessionStore`], so concurrent users never share discovery
//! records.
//!
//! # Notes
//!
//! | key         | value                                     |
//! |-------------|-------------------------------------------|
//! | `openid`    | chosen provider endpoint                  |
//! | `discovery` | [`PendingDiscovery`] awaiting verification |
//! | `state`     | [`FlowPhase`]                             |
//! | `authType`  | service hint remembered by the host       |
//! | `principal` | [`Principal`](crate::principal::Principal) after success |

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::OpenIdResult;
use crate::consumer::DiscoveryRecord;
use crate::error::OpenIdError;
use crate::provider::ProviderKind;

/// Session note holding the chosen provider endpoint.
pub const OPENID_NOTE: &str = "openid";
/// Session note holding the pending discovery record.
pub const DISCOVERY_NOTE: &str = "discovery";
/// Session note holding the flow phase.
pub const STATE_NOTE: &str = "state";
/// Request parameter and session note naming the provider service key.
pub const AUTH_TYPE: &str = "authType";
/// Session note holding the authenticated principal.
pub const PRINCIPAL_NOTE: &str = "principal";

/// Host-owned, session-scoped note storage.
///
/// Implementations must round-trip values unchanged between the two
/// requests of a flow.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns a note, or `None` if it is not set.
    async fn get_note(&self, key: &str) -> OpenIdResult<Option<Value>>;

    /// Sets a note, replacing any previous value.
    async fn set_note(&self, key: &str, value: Value) -> OpenIdResult<()>;

    /// Removes a note and returns its previous value.
    async fn remove_note(&self, key: &str) -> OpenIdResult<Option<Value>>;
}

/// In-memory [`SessionStore`] for a single session.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    notes: RwLock<HashMap<String, Value>>,
}

impl MemorySessionStore {
    /// Creates an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of notes currently stored.
    pub async fn len(&self) -> usize {
        self.notes.read().await.len()
    }

    /// Returns `true` if no notes are stored.
    pub async fn is_empty(&self) -> bool {
        self.notes.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get_note(&self, key: &str) -> OpenIdResult<Option<Value>> {
        Ok(self.notes.read().await.get(key).cloned())
    }

    async fn set_note(&self, key: &str, value: Value) -> OpenIdResult<()> {
        self.notes.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_note(&self, key: &str) -> OpenIdResult<Option<Value>> {
        Ok(self.notes.write().await.remove(key))
    }
}

/// Phase of the authentication flow for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowPhase {
    /// Redirect issued, waiting for the provider callback.
    Auth,
    /// Reserved for a separate authorization step; never entered.
    Authz,
    /// Callback verified and a principal produced.
    Finish,
    /// Callback processed without a verified identity.
    Failed,
}

/// The discovery record a session's authentication request was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDiscovery {
    /// Random identifier of this flow.
    pub flow_id: Uuid,

    /// The provider the flow was started with.
    pub provider: ProviderKind,

    /// The associated discovery record.
    pub record: DiscoveryRecord,

    /// When the authentication request was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
}

impl PendingDiscovery {
    /// Creates a pending record issued now.
    #[must_use]
    pub fn new(provider: ProviderKind, record: DiscoveryRecord) -> Self {
        Self {
            flow_id: Uuid::new_v4(),
            provider,
            record,
            issued_at: OffsetDateTime::now_utc(),
        }
    }

    /// Checks if the record is older than `ttl`.
    ///
    /// A deadline beyond the representable date range never expires.
    #[must_use]
    pub fn is_expired(&self, ttl: Duration) -> bool {
        let Ok(ttl) = time::Duration::try_from(ttl) else {
            return false;
        };
        match self.issued_at.checked_add(ttl) {
            Some(deadline) => OffsetDateTime::now_utc() > deadline,
            None => false,
        }
    }
}

/// Snapshot of the flow notes stored in a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowState {
    /// The pending discovery record, if a request is outstanding.
    pub pending: Option<PendingDiscovery>,
    /// The current phase, if a flow was ever started.
    pub phase: Option<FlowPhase>,
    /// The provider endpoint chosen for the last request.
    pub provider_endpoint: Option<String>,
}

impl FlowState {
    /// Reads the flow notes from a session.
    ///
    /// # Errors
    ///
    /// Returns [`OpenIdError::Session`] if the store fails or a note cannot
    /// be decoded.
    pub async fn load(session: &dyn SessionStore) -> OpenIdResult<Self> {
        Ok(Self {
            pending: read_note(session, DISCOVERY_NOTE).await?,
            phase: read_note(session, STATE_NOTE).await?,
            provider_endpoint: read_note(session, OPENID_NOTE).await?,
        })
    }
}

/// Reads and decodes a typed note.
pub(crate) async fn read_note<T: DeserializeOwned>(
    session: &dyn SessionStore,
    key: &str,
) -> OpenIdResult<Option<T>> {
    session
        .get_note(key)
        .await?
        .map(|value| decode(key, value))
        .transpose()
}

/// Removes a note and decodes its previous value.
pub(crate) async fn take_note<T: DeserializeOwned>(
    session: &dyn SessionStore,
    key: &str,
) -> OpenIdResult<Option<T>> {
    session
        .remove_note(key)
        .await?
        .map(|value| decode(key, value))
        .transpose()
}

/// Encodes and writes a typed note.
pub(crate) async fn write_note<T: Serialize>(
    session: &dyn SessionStore,
    key: &str,
    value: &T,
) -> OpenIdResult<()> {
    let value = serde_json::to_value(value)
        .map_err(|e| OpenIdError::session(format!("cannot encode note '{key}': {e}")))?;
    session.set_note(key, value).await
}

fn decode<T: DeserializeOwned>(key: &str, value: Value) -> OpenIdResult<T> {
    serde_json::from_value(value)
        .map_err(|e| OpenIdError::session(format!("cannot decode note '{key}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn record() -> DiscoveryRecord {
        DiscoveryRecord::new(Url::parse("https://op.example.com/").unwrap())
            .with_assoc_handle("h-1")
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemorySessionStore::new();
        assert!(store.is_empty().await);

        store.set_note("k", serde_json::json!("v")).await.unwrap();
        assert_eq!(
            store.get_note("k").await.unwrap(),
            Some(serde_json::json!("v"))
        );
        assert_eq!(store.len().await, 1);

        let removed = store.remove_note("k").await.unwrap();
        assert_eq!(removed, Some(serde_json::json!("v")));
        assert!(store.get_note("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_typed_notes() {
        let store = MemorySessionStore::new();
        let pending = PendingDiscovery::new(ProviderKind::Yahoo, record());

        write_note(&store, DISCOVERY_NOTE, &pending).await.unwrap();
        write_note(&store, STATE_NOTE, &FlowPhase::Auth).await.unwrap();

        let state = FlowState::load(&store).await.unwrap();
        let loaded = state.pending.unwrap();
        assert_eq!(loaded.flow_id, pending.flow_id);
        assert_eq!(loaded.record, pending.record);
        assert_eq!(state.phase, Some(FlowPhase::Auth));
        assert!(state.provider_endpoint.is_none());

        let taken: Option<PendingDiscovery> = take_note(&store, DISCOVERY_NOTE).await.unwrap();
        assert_eq!(taken.map(|p| p.flow_id), Some(pending.flow_id));
        let again: Option<PendingDiscovery> = take_note(&store, DISCOVERY_NOTE).await.unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn test_undecodable_note_is_session_error() {
        let store = MemorySessionStore::new();
        store
            .set_note(DISCOVERY_NOTE, serde_json::json!({"unexpected": true}))
            .await
            .unwrap();

        let err = FlowState::load(&store).await.unwrap_err();
        assert!(matches!(err, OpenIdError::Session { .. }));
        assert!(err.to_string().contains("discovery"));
    }

    #[test]
    fn test_phase_serialization() {
        assert_eq!(serde_json::to_value(FlowPhase::Auth).unwrap(), "AUTH");
        assert_eq!(serde_json::to_value(FlowPhase::Finish).unwrap(), "FINISH");
    }

    #[test]
    fn test_pending_expiry() {
        let mut pending = PendingDiscovery::new(ProviderKind::Google, record());
        assert!(!pending.is_expired(Duration::from_secs(600)));

        pending.issued_at = OffsetDateTime::now_utc() - time::Duration::seconds(601);
        assert!(pending.is_expired(Duration::from_secs(600)));
    }

    #[test]
    fn test_pending_expiry_with_unrepresentable_deadline() {
        let pending = PendingDiscovery::new(ProviderKind::Google, record());
        assert!(!pending.is_expired(Duration::from_secs(u64::MAX)));
        assert!(!pending.is_expired(Duration::from_secs(100_000 * 365 * 24 * 3600)));
    }

    #[test]
    fn test_pending_flow_ids_are_unique() {
        let a = PendingDiscovery::new(ProviderKind::Google, record());
        let b = PendingDiscovery::new(ProviderKind::Google, record());
        assert_ne!(a.flow_id, b.flow_id);
    }
}
