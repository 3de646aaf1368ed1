//! Session state types for true typestate enforcement (Innovation 1 Phase 3).
//!
//! This module defines the **data-carrying** state types that replace `HandshakeState`.
//! The key insight is that the state type itself holds all relevant data, and state
//! transitions consume the old state to produce a new one.
//!
//! ## Design Principles
//!
//! 1. **State types hold data** — not just markers with PhantomData
//! 2. **Transition consumes old state** — `try_register(self)` takes ownership
//! 3. **Guaranteed fields** — `RegisteredState.nick` is `String`, not `Option<String>`
//! 4. **No runtime flags** — no `registered: bool`, the TYPE is the state
//!
//! ## State Machine
//!
//! ```text
//! ┌─────────────────────┐     try_register()     ┌─────────────────────┐
//! │  UnregisteredState  │ ────────────────────▶  │   RegisteredState   │
//! │  nick: Option       │     (consumes self)    │   nick: String ✓    │
//! │  user: Option       │                        │   user: String ✓    │
//! └─────────────────────┘                        └─────────────────────┘
//! ```

use crate::handlers::batch::BatchRouting;
use crate::handlers::{BatchState, SaslState};
use crate::state::Uid;
use crate::state::client::{DeviceId, SessionId};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::time::Instant;

// ============================================================================
// SessionState trait — Unified interface for universal handlers
// ============================================================================

/// Common interface for both UnregisteredState and RegisteredState.
///
/// This trait allows universal handlers (QUIT, PING, PONG, NICK, CAP) to work
/// with both state types without code duplication. Each method provides access
/// to fields that exist in both states, with appropriate semantics.
#[allow(dead_code)] // Methods will be used as handlers are migrated
pub trait SessionState: Send {
    /// Get the nick, if set. Always `Some` for RegisteredState.
    fn nick(&self) -> Option<&str>;

    /// Get the nick or "*" for error messages.
    fn nick_or_star(&self) -> &str {
        self.nick().unwrap_or("*")
    }

    /// Set the nick (during registration or NICK change).
    fn set_nick(&mut self, nick: String);

    /// Whether the connection is registered (type-level truth).
    fn is_registered(&self) -> bool;

    /// Get enabled capabilities.
    fn capabilities(&self) -> &HashSet<String>;

    /// Get mutable capabilities (for CAP REQ).
    fn capabilities_mut(&mut self) -> &mut HashSet<String>;

    /// Check if a capability is enabled.
    fn has_cap(&self, cap: &str) -> bool {
        self.capabilities().contains(cap)
    }

    /// Whether CAP negotiation is in progress.
    fn cap_negotiating(&self) -> bool;

    /// Set CAP negotiation state.
    fn set_cap_negotiating(&mut self, negotiating: bool);

    /// Get CAP protocol version.
    fn cap_version(&self) -> u32;

    /// Set CAP protocol version.
    fn set_cap_version(&mut self, version: u32);

    /// Whether this is a TLS connection.
    fn is_tls(&self) -> bool;

    /// Get TLS certificate fingerprint.
    fn certfp(&self) -> Option<&str>;

    /// Get account name if authenticated.
    fn account(&self) -> Option<&str>;

    /// Set account name.
    fn set_account(&mut self, account: Option<String>);

    /// Get active batch state.
    fn active_batch(&self) -> Option<&BatchState>;

    /// Get mutable active batch state.
    fn active_batch_mut(&mut self) -> &mut Option<BatchState>;

    /// Get active batch reference tag.
    fn active_batch_ref(&self) -> Option<&str>;

    /// Set active batch reference.
    fn set_active_batch_ref(&mut self, batch_ref: Option<String>);

    /// Record the client device identifier negotiated for this session (bouncer reattach).
    ///
    /// No-op for states that don't track per-device identity (e.g. `ServerState`).
    fn set_device_id(&mut self, _device_id: Option<DeviceId>) {}

    /// Record reattach bookkeeping computed after a successful SASL reauth.
    ///
    /// No-op for states that can't reattach to an existing client (e.g. `ServerState`).
    fn set_reattach_info(&mut self, _info: Option<ReattachInfo>) {}

    /// Whether this session is a server-to-server peer link rather than a client.
    fn is_server(&self) -> bool {
        false
    }

    /// Relay decision recorded for the currently open server-to-server batch, if any.
    fn batch_routing(&self) -> Option<&BatchRouting> {
        None
    }
}

/// Accessor trait for SASL authentication state, shared by every session kind
/// that can negotiate `AUTHENTICATE` (clients pre- and post-registration, and
/// peer links relaying SASL on behalf of a bursting server).
#[allow(dead_code)] // Methods will be used as handlers are migrated
pub trait SaslAccess {
    /// Session identifier used for multiclient fan-out and reattach bookkeeping.
    ///
    /// Peer links have no client session and return a nil UUID.
    fn session_id(&self) -> SessionId {
        SessionId::nil()
    }

    /// Get the current SASL mechanism state.
    fn sasl_state(&self) -> &SaslState;

    /// Replace the SASL mechanism state.
    fn set_sasl_state(&mut self, state: SaslState);

    /// Get the buffer accumulating chunked `AUTHENTICATE` payloads.
    fn sasl_buffer(&self) -> &str;

    /// Get the mutable buffer accumulating chunked `AUTHENTICATE` payloads.
    fn sasl_buffer_mut(&mut self) -> &mut String;
}

/// Bookkeeping captured when a SASL reauth reattaches to an existing client,
/// so the connection loop can replay missed state after registration completes.
#[derive(Debug, Clone)]
pub struct ReattachInfo {
    /// Account name the session reattached under.
    pub account: String,
    /// Device identifier presented via `CAP REQ bouncer-networks`/labeled-reattach, if any.
    pub device_id: Option<DeviceId>,
    /// Channels the client was already joined to, with per-channel membership state.
    pub channels: Vec<(String, crate::state::client::ChannelMembership)>,
    /// Timestamp of the last message this device has seen, for history replay.
    pub replay_since: Option<DateTime<Utc>>,
    /// UID of the client this session reattached to, if one already existed.
    pub existing_uid: Option<Uid>,
}

/// Data needed to initiate an outbound server-to-server connection.
///
/// Populated when this side is the connector (per a `connect {}` block); the
/// handshake loop sends PASS/CAP LS/SERVER up front instead of waiting for
/// the peer to speak first.
#[derive(Debug, Clone)]
pub struct InitiatorData {
    /// SID we expect the remote server to identify as.
    pub remote_sid: String,
    /// Link password to send in our PASS.
    pub remote_password: String,
}

// ============================================================================
// UnregisteredState — Pre-registration connection state
// ============================================================================

/// State for connections that have not yet completed registration.
///
/// Pre-registration commands (NICK, USER, CAP, PASS, WEBIRC, AUTHENTICATE)
/// operate on this state. Nick and user are `Option` because they haven't
/// been provided yet.
#[derive(Debug, Default)]
pub struct UnregisteredState {
    /// Nick provided by NICK command.
    pub nick: Option<String>,
    /// Username provided by USER command.
    pub user: Option<String>,
    /// Realname provided by USER command.
    pub realname: Option<String>,
    /// Whether CAP negotiation is in progress.
    pub cap_negotiating: bool,
    /// CAP protocol version (301 or 302).
    pub cap_version: u32,
    /// Capabilities enabled by this client.
    pub capabilities: HashSet<String>,
    /// SASL authentication state.
    pub sasl_state: SaslState,
    /// Buffer for accumulating chunked SASL data (for large payloads).
    pub sasl_buffer: String,
    /// Account name if SASL authenticated.
    pub account: Option<String>,
    /// Whether this is a TLS connection.
    pub is_tls: bool,
    /// TLS client certificate fingerprint (SHA-256, hex-encoded).
    pub certfp: Option<String>,
    /// Whether WEBIRC was used to set client info.
    pub webirc_used: bool,
    /// Real IP address from WEBIRC (overrides connection IP).
    pub webirc_ip: Option<String>,
    /// Real hostname from WEBIRC (overrides reverse DNS).
    pub webirc_host: Option<String>,
    /// Password received via PASS command.
    pub pass_received: Option<String>,
    /// Active batch state for client-to-server batches (e.g., draft/multiline).
    pub active_batch: Option<BatchState>,
    /// Reference tag for the active batch.
    pub active_batch_ref: Option<String>,
    /// Set when this connection is initiating an outbound server link.
    pub initiator_data: Option<InitiatorData>,
    /// Whether a SERVER command has been seen (this connection is becoming a peer link).
    pub is_server_handshake: bool,
    /// Server name from the SERVER handshake command.
    pub server_name: Option<String>,
    /// SID from the SERVER handshake command.
    pub server_sid: Option<String>,
    /// Info string from the SERVER handshake command.
    pub server_info: Option<String>,
    /// Hopcount from the SERVER handshake command.
    pub server_hopcount: u32,
    /// Session identifier assigned when the connection is accepted.
    pub session_id: SessionId,
    /// Device identifier, once negotiated via a reattaching SASL exchange.
    pub device_id: Option<DeviceId>,
    /// Reattach bookkeeping, set once a SASL reauth resolves to an existing client.
    pub reattach_info: Option<ReattachInfo>,
}

impl SessionState for UnregisteredState {
    fn nick(&self) -> Option<&str> {
        self.nick.as_deref()
    }

    fn set_nick(&mut self, nick: String) {
        self.nick = Some(nick);
    }

    fn is_registered(&self) -> bool {
        false
    }

    fn capabilities(&self) -> &HashSet<String> {
        &self.capabilities
    }

    fn capabilities_mut(&mut self) -> &mut HashSet<String> {
        &mut self.capabilities
    }

    fn cap_negotiating(&self) -> bool {
        self.cap_negotiating
    }

    fn set_cap_negotiating(&mut self, negotiating: bool) {
        self.cap_negotiating = negotiating;
    }

    fn cap_version(&self) -> u32 {
        self.cap_version
    }

    fn set_cap_version(&mut self, version: u32) {
        self.cap_version = version;
    }

    fn is_tls(&self) -> bool {
        self.is_tls
    }

    fn certfp(&self) -> Option<&str> {
        self.certfp.as_deref()
    }

    fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    fn set_account(&mut self, account: Option<String>) {
        self.account = account;
    }

    fn active_batch(&self) -> Option<&BatchState> {
        self.active_batch.as_ref()
    }

    fn active_batch_mut(&mut self) -> &mut Option<BatchState> {
        &mut self.active_batch
    }

    fn active_batch_ref(&self) -> Option<&str> {
        self.active_batch_ref.as_deref()
    }

    fn set_active_batch_ref(&mut self, batch_ref: Option<String>) {
        self.active_batch_ref = batch_ref;
    }

    fn set_device_id(&mut self, device_id: Option<DeviceId>) {
        self.device_id = device_id;
    }

    fn set_reattach_info(&mut self, info: Option<ReattachInfo>) {
        self.reattach_info = info;
    }
}

impl SaslAccess for UnregisteredState {
    fn session_id(&self) -> SessionId {
        self.session_id
    }

    fn sasl_state(&self) -> &SaslState {
        &self.sasl_state
    }

    fn set_sasl_state(&mut self, state: SaslState) {
        self.sasl_state = state;
    }

    fn sasl_buffer(&self) -> &str {
        &self.sasl_buffer
    }

    fn sasl_buffer_mut(&mut self) -> &mut String {
        &mut self.sasl_buffer
    }
}

#[allow(dead_code)] // Phase 3: Methods will be used when connection loop switches to ConnectionState
impl UnregisteredState {
    /// Create a new unregistered state.
    pub fn new(is_tls: bool, certfp: Option<String>) -> Self {
        Self {
            is_tls,
            certfp,
            ..Default::default()
        }
    }

    /// Check if registration requirements are met.
    ///
    /// Requirements:
    /// - NICK has been provided
    /// - USER has been provided
    /// - CAP negotiation is not in progress (if started)
    pub fn can_register(&self) -> bool {
        self.nick.is_some() && self.user.is_some() && !self.cap_negotiating
    }

    /// Attempt to transition to RegisteredState.
    ///
    /// This **consumes** self. If registration requirements are not met,
    /// returns `Err(self)` so the caller can continue using the state.
    ///
    /// This is the "Parse, Don't Validate" pattern — we parse the unregistered
    /// state into a registered state once, rather than checking a flag repeatedly.
    #[allow(clippy::result_large_err)] // By design: Err returns self to continue registration
    pub fn try_register(self) -> Result<RegisteredState, Self> {
        match (&self.nick, &self.user) {
            (Some(nick), Some(user)) if !self.cap_negotiating => {
                Ok(RegisteredState {
                    nick: nick.clone(),
                    user: user.clone(),
                    realname: self.realname.unwrap_or_default(),
                    capabilities: self.capabilities,
                    account: self.account,
                    is_tls: self.is_tls,
                    certfp: self.certfp,
                    cap_version: self.cap_version,
                    session_id: self.session_id,
                    sasl_state: self.sasl_state,
                    sasl_buffer: self.sasl_buffer,
                    // Post-registration state starts fresh
                    failed_oper_attempts: 0,
                    last_oper_attempt: None,
                    active_batch: None,
                    active_batch_ref: None,
                })
            }
            _ => Err(self),
        }
    }
}

// ============================================================================
// RegisteredState — Post-registration connection state
// ============================================================================

/// State for fully registered connections.
///
/// Post-registration commands (PRIVMSG, JOIN, MODE, etc.) operate on this state.
/// Nick and user are **guaranteed** to be present — they are `String`, not `Option`.
///
/// ## Compile-Time Guarantees
///
/// When a handler receives `Context<'_, RegisteredState>`:
/// - `ctx.state.nick` is always valid (no unwrap needed)
/// - `ctx.state.user` is always valid (no unwrap needed)
/// - The connection has completed the full registration handshake
#[derive(Debug)]
pub struct RegisteredState {
    /// Nick — guaranteed present after registration.
    pub nick: String,
    /// Username — guaranteed present after registration.
    pub user: String,
    /// Realname (may be empty but is always a valid String).
    pub realname: String,
    /// Capabilities enabled by this client.
    pub capabilities: HashSet<String>,
    /// Account name if authenticated (SASL or services).
    pub account: Option<String>,
    /// Whether this is a TLS connection.
    pub is_tls: bool,
    /// TLS client certificate fingerprint.
    pub certfp: Option<String>,
    /// Failed OPER attempts counter (brute-force protection).
    pub failed_oper_attempts: u8,
    /// Timestamp of last OPER attempt (for rate limiting).
    pub last_oper_attempt: Option<Instant>,
    /// Active batch state for client-to-server batches (e.g., draft/multiline).
    pub active_batch: Option<BatchState>,
    /// Reference tag for the active batch.
    pub active_batch_ref: Option<String>,
    /// CAP protocol version (preserved from registration).
    pub cap_version: u32,
    /// Session identifier, carried forward from registration for multiclient fan-out.
    pub session_id: SessionId,
    /// SASL authentication state (retained for reauth via `AUTHENTICATE` post-registration).
    pub sasl_state: SaslState,
    /// Buffer for accumulating chunked SASL data.
    pub sasl_buffer: String,
}

#[allow(dead_code)] // Methods will be used as handlers are migrated
impl RegisteredState {
    /// Check if a capability is enabled.
    #[inline]
    pub fn has_cap(&self, cap: &str) -> bool {
        self.capabilities.contains(cap)
    }

    /// Get account name for message tags.
    #[inline]
    pub fn account_tag(&self) -> Option<&str> {
        self.account.as_deref()
    }
}

impl SessionState for RegisteredState {
    fn nick(&self) -> Option<&str> {
        Some(&self.nick)
    }

    fn set_nick(&mut self, nick: String) {
        self.nick = nick;
    }

    fn is_registered(&self) -> bool {
        true
    }

    fn capabilities(&self) -> &HashSet<String> {
        &self.capabilities
    }

    fn capabilities_mut(&mut self) -> &mut HashSet<String> {
        &mut self.capabilities
    }

    fn cap_negotiating(&self) -> bool {
        false // Never negotiating after registration
    }

    fn set_cap_negotiating(&mut self, _negotiating: bool) {
        // No-op for registered state - CAP END was already called
    }

    fn cap_version(&self) -> u32 {
        self.cap_version
    }

    fn set_cap_version(&mut self, version: u32) {
        self.cap_version = version;
    }

    fn is_tls(&self) -> bool {
        self.is_tls
    }

    fn certfp(&self) -> Option<&str> {
        self.certfp.as_deref()
    }

    fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    fn set_account(&mut self, account: Option<String>) {
        self.account = account;
    }

    fn active_batch(&self) -> Option<&BatchState> {
        self.active_batch.as_ref()
    }

    fn active_batch_mut(&mut self) -> &mut Option<BatchState> {
        &mut self.active_batch
    }

    fn active_batch_ref(&self) -> Option<&str> {
        self.active_batch_ref.as_deref()
    }

    fn set_active_batch_ref(&mut self, batch_ref: Option<String>) {
        self.active_batch_ref = batch_ref;
    }
}

impl SaslAccess for RegisteredState {
    fn session_id(&self) -> SessionId {
        self.session_id
    }

    fn sasl_state(&self) -> &SaslState {
        &self.sasl_state
    }

    fn set_sasl_state(&mut self, state: SaslState) {
        self.sasl_state = state;
    }

    fn sasl_buffer(&self) -> &str {
        &self.sasl_buffer
    }

    fn sasl_buffer_mut(&mut self) -> &mut String {
        &mut self.sasl_buffer
    }
}

// ============================================================================
// ServerState — Server-to-server peer link state
// ============================================================================

/// State for an established server-to-server (peer) link.
///
/// Mirrors `RegisteredState`'s role but for the TS6 peer protocol: once a
/// `SERVER` burst completes, the connection's handlers operate on this state
/// instead of a client's. There is no notion of nick/user/channels here — a
/// peer link relays propagated commands and BATCH-wrapped bursts.
#[derive(Debug)]
pub struct ServerState {
    /// Peer server's name (e.g. `hub.example.net`).
    pub name: String,
    /// Peer server's SID.
    pub sid: String,
    /// Peer server's info string (from the SERVER command).
    pub info: String,
    /// Number of hops between this server and the peer.
    pub hopcount: u32,
    /// Capability tokens the peer advertised.
    pub capabilities: HashSet<String>,
    /// Whether this link is TLS-encrypted.
    pub is_tls: bool,
    /// Active batch state for a server-to-server BATCH currently being relayed.
    pub active_batch: Option<BatchState>,
    /// Reference tag for the active server-to-server batch.
    pub active_batch_ref: Option<String>,
    /// Relay decision recorded when the active batch started.
    pub batch_routing: Option<BatchRouting>,
    /// SASL state for AUTHENTICATE messages relayed through this peer on behalf
    /// of a bursting client.
    pub sasl_state: SaslState,
    /// Buffer for accumulating chunked SASL data relayed through this peer.
    pub sasl_buffer: String,
}

impl SessionState for ServerState {
    fn nick(&self) -> Option<&str> {
        None
    }

    fn set_nick(&mut self, _nick: String) {}

    fn is_registered(&self) -> bool {
        true
    }

    fn capabilities(&self) -> &HashSet<String> {
        &self.capabilities
    }

    fn capabilities_mut(&mut self) -> &mut HashSet<String> {
        &mut self.capabilities
    }

    fn cap_negotiating(&self) -> bool {
        false
    }

    fn set_cap_negotiating(&mut self, _negotiating: bool) {}

    fn cap_version(&self) -> u32 {
        0
    }

    fn set_cap_version(&mut self, _version: u32) {}

    fn is_tls(&self) -> bool {
        self.is_tls
    }

    fn certfp(&self) -> Option<&str> {
        None
    }

    fn account(&self) -> Option<&str> {
        None
    }

    fn set_account(&mut self, _account: Option<String>) {}

    fn active_batch(&self) -> Option<&BatchState> {
        self.active_batch.as_ref()
    }

    fn active_batch_mut(&mut self) -> &mut Option<BatchState> {
        &mut self.active_batch
    }

    fn active_batch_ref(&self) -> Option<&str> {
        self.active_batch_ref.as_deref()
    }

    fn set_active_batch_ref(&mut self, batch_ref: Option<String>) {
        self.active_batch_ref = batch_ref;
    }

    fn is_server(&self) -> bool {
        true
    }

    fn batch_routing(&self) -> Option<&BatchRouting> {
        self.batch_routing.as_ref()
    }
}

impl SaslAccess for ServerState {
    fn sasl_state(&self) -> &SaslState {
        &self.sasl_state
    }

    fn set_sasl_state(&mut self, state: SaslState) {
        self.sasl_state = state;
    }

    fn sasl_buffer(&self) -> &str {
        &self.sasl_buffer
    }

    fn sasl_buffer_mut(&mut self) -> &mut String {
        &mut self.sasl_buffer
    }
}

// ============================================================================
// ConnectionState enum — For the connection loop state machine
// ============================================================================

/// State machine for connection lifecycle.
///
/// Used by the connection loop to track which phase the connection is in.
/// This replaces the `registered: bool` flag with an explicit enum.
#[allow(dead_code)] // Will be used when connection loop is fully migrated
pub enum ConnectionState {
    /// Connection is in pre-registration phase.
    Unregistered(UnregisteredState),
    /// Connection has completed registration.
    Registered(RegisteredState),
}

#[allow(dead_code)] // Will be used when connection loop is fully migrated
impl ConnectionState {
    /// Create a new connection in unregistered state.
    pub fn new(is_tls: bool, certfp: Option<String>) -> Self {
        Self::Unregistered(UnregisteredState::new(is_tls, certfp))
    }

    /// Check if this connection is registered.
    #[inline]
    pub fn is_registered(&self) -> bool {
        matches!(self, Self::Registered(_))
    }

    /// Get nick if available (for error messages, logging).
    pub fn nick(&self) -> Option<&str> {
        match self {
            Self::Unregistered(s) => s.nick.as_deref(),
            Self::Registered(s) => Some(&s.nick),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unregistered_cannot_register_without_nick() {
        let state = UnregisteredState::default();
        assert!(!state.can_register());
        assert!(state.try_register().is_err());
    }

    #[test]
    fn test_unregistered_cannot_register_without_user() {
        let mut state = UnregisteredState::default();
        state.nick = Some("test".to_string());
        assert!(!state.can_register());
        assert!(state.try_register().is_err());
    }

    #[test]
    fn test_unregistered_cannot_register_during_cap_negotiation() {
        let mut state = UnregisteredState::default();
        state.nick = Some("test".to_string());
        state.user = Some("testuser".to_string());
        state.cap_negotiating = true;
        assert!(!state.can_register());
        assert!(state.try_register().is_err());
    }

    #[test]
    fn test_successful_registration() {
        let mut state = UnregisteredState::default();
        state.nick = Some("test".to_string());
        state.user = Some("testuser".to_string());
        state.realname = Some("Test User".to_string());
        state.capabilities.insert("echo-message".to_string());
        state.account = Some("testaccount".to_string());

        assert!(state.can_register());

        let registered = state.try_register().expect("should register");
        assert_eq!(registered.nick, "test");
        assert_eq!(registered.user, "testuser");
        assert_eq!(registered.realname, "Test User");
        assert!(registered.capabilities.contains("echo-message"));
        assert_eq!(registered.account, Some("testaccount".to_string()));
    }

    #[test]
    fn test_registered_has_cap() {
        let state = RegisteredState {
            nick: "test".to_string(),
            user: "testuser".to_string(),
            realname: String::new(),
            capabilities: ["echo-message".to_string()].into_iter().collect(),
            account: None,
            is_tls: false,
            certfp: None,
            failed_oper_attempts: 0,
            last_oper_attempt: None,
            active_batch: None,
            active_batch_ref: None,
            cap_version: 302,
            session_id: SessionId::nil(),
            sasl_state: SaslState::default(),
            sasl_buffer: String::new(),
        };

        assert!(state.has_cap("echo-message"));
        assert!(!state.has_cap("server-time"));
    }
}
