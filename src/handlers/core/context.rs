//! Command handler context and core types (Innovation 1 Phase 3).
//!
//! Defines the `Context<'a, S>` struct passed to all handlers. The type parameter
//! `S` is the session state type.
//!
//! ## Migration Status
//!
//! Currently `S` defaults to `HandshakeState` for backward compatibility.
//! As handlers are migrated, they will use:
//! - `Context<'a, UnregisteredState>` — for pre-registration handlers
//! - `Context<'a, RegisteredState>` — for post-registration handlers
//!
//! Once all handlers are migrated, `HandshakeState` will be deleted.

use super::middleware::ResponseMiddleware;
use super::registry::Registry;
use crate::db::Database;
use crate::handlers::batch::BatchState;
use crate::handlers::cap::SaslState;
use crate::state::Matrix;
use ts6_proto::Message;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Handler context passed to each command handler.
///
/// Generic over session state type `S`. During migration, defaults to
/// `HandshakeState` for backward compatibility.
pub struct Context<'a, S = HandshakeState> {
    /// The user's unique ID.
    pub uid: &'a str,
    /// Shared server state.
    pub matrix: &'a Arc<Matrix>,
    /// Sender for outgoing messages to this client.
    pub sender: ResponseMiddleware<'a>,
    /// Session state (type varies by registration phase).
    pub state: &'a mut S,
    /// Database for services.
    pub db: &'a Database,
    /// Remote address of the client.
    pub remote_addr: SocketAddr,
    /// Label from incoming message for labeled-response (IRCv3).
    pub label: Option<String>,
    /// Suppress automatic labeled-response ACK/BATCH wrapping.
    pub suppress_labeled_ack: bool,
    /// Reference tag of the client-to-server BATCH currently wrapping this message, if any.
    pub active_batch_id: Option<String>,
    /// Command registry (for STATS m command usage tracking).
    pub registry: &'a Arc<Registry>,
}

impl<'a, S> Context<'a, S> {
    /// Create a new context.
    #[allow(clippy::too_many_arguments)]
    #[allow(dead_code)] // Phase 3: Will be used when connection loop switches to ConnectionState
    pub fn new(
        uid: &'a str,
        matrix: &'a Arc<Matrix>,
        sender: ResponseMiddleware<'a>,
        state: &'a mut S,
        db: &'a Database,
        remote_addr: SocketAddr,
        label: Option<String>,
        registry: &'a Arc<Registry>,
    ) -> Self {
        Self {
            uid,
            matrix,
            sender,
            state,
            db,
            remote_addr,
            label,
            suppress_labeled_ack: false,
            active_batch_id: None,
            registry,
        }
    }

    /// Build and send a server reply in one call.
    #[inline]
    pub async fn send_reply(
        &self,
        response: ts6_proto::Response,
        params: Vec<String>,
    ) -> Result<(), HandlerError> {
        use crate::handlers::util::helpers::server_reply;
        let reply = server_reply(&self.matrix.server_info.name, response, params);
        self.sender.send(reply).await?;
        Ok(())
    }

    /// Send an already-built error reply and record it against command-error metrics.
    #[inline]
    pub async fn send_error(
        &self,
        cmd: &str,
        error_kind: &str,
        reply: Message,
    ) -> Result<(), HandlerError> {
        crate::metrics::record_command_error(cmd, error_kind);
        self.sender.send(reply).await?;
        Ok(())
    }

    /// Mint a `CapabilityAuthority` bound to this connection's server state.
    #[inline]
    pub fn authority(&self) -> crate::caps::CapabilityAuthority {
        crate::caps::CapabilityAuthority::new(self.matrix.clone())
    }

    /// This server's configured name, for use as a reply prefix or source string.
    #[inline]
    pub fn server_name(&self) -> &str {
        &self.matrix.server_info.name
    }
}

impl<'a, S: crate::state::session::SessionState> Context<'a, S> {
    /// Get the session's current nick, or "*" if not yet set.
    #[inline]
    pub fn nick(&self) -> &str {
        self.state.nick_or_star()
    }

    /// Build a `Prefix::ServerName` for this server, for replies sent to this client.
    #[inline]
    pub fn server_prefix(&self) -> ts6_proto::Prefix {
        ts6_proto::Prefix::ServerName(self.matrix.server_info.name.clone())
    }
}

/// State tracked during client registration handshake.
#[derive(Debug, Default)]
pub struct HandshakeState {
    /// Nick provided by NICK command.
    pub nick: Option<String>,
    /// Username provided by USER command.
    pub user: Option<String>,
    /// Realname provided by USER command.
    pub realname: Option<String>,
    /// Whether registration is complete.
    pub registered: bool,
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
    /// Set by the network layer when a client presents a certificate.
    pub certfp: Option<String>,
    /// Failed OPER attempts counter (brute-force protection).
    pub failed_oper_attempts: u8,
    /// Timestamp of last OPER attempt (for rate limiting).
    pub last_oper_attempt: Option<std::time::Instant>,
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
}

impl HandshakeState {
    /// Check if we have both NICK and USER and can complete registration.
    /// Also requires CAP negotiation to be finished if it was started.
    pub fn can_register(&self) -> bool {
        self.nick.is_some() && self.user.is_some() && !self.registered && !self.cap_negotiating
    }
}

/// Errors that can occur during command handling.
#[derive(Debug, Error)]
#[allow(clippy::large_enum_variant)] // Send variant is large but rarely constructed
pub enum HandlerError {
    #[error("not enough parameters")]
    NeedMoreParams,
    #[error("no text to send")]
    NoTextToSend,
    #[allow(dead_code)] // TODO: Return from NickHandler instead of sending reply directly
    #[error("nickname in use: {0}")]
    NicknameInUse(String),
    #[allow(dead_code)] // TODO: Return from NickHandler for invalid nicks
    #[error("erroneous nickname: {0}")]
    ErroneousNickname(String),
    #[error("not registered")]
    NotRegistered,
    /// Disconnect the client silently (error message already sent)
    #[error("access denied")]
    AccessDenied,
    #[allow(dead_code)] // TODO: Return from USER handler for re-registration attempts
    #[error("already registered")]
    AlreadyRegistered,
    #[error("internal error: nick or user missing after registration")]
    NickOrUserMissing,
    #[error("send error: {0}")]
    Send(#[from] mpsc::error::SendError<Message>),
    #[error("client quit: {0:?}")]
    Quit(Option<String>),
    /// Signal to the handshake loop that a STARTTLS upgrade should occur now.
    #[error("starttls upgrade requested")]
    StartTls,
    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NeedMoreParams => "need_more_params",
            Self::NoTextToSend => "no_text_to_send",
            Self::NicknameInUse(_) => "nickname_in_use",
            Self::ErroneousNickname(_) => "erroneous_nickname",
            Self::NotRegistered => "not_registered",
            Self::AccessDenied => "access_denied",
            Self::AlreadyRegistered => "already_registered",
            Self::NickOrUserMissing => "nick_or_user_missing",
            Self::Send(_) => "send_error",
            Self::Quit(_) => "quit",
            Self::StartTls => "starttls",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Convert to an IRC error reply message.
    ///
    /// Returns `None` for errors that don't warrant a client-visible reply
    /// (e.g., internal errors, send failures, quit, STARTTLS which is handled
    /// specially by the handshake loop).
    pub fn to_irc_reply(
        &self,
        server_name: &str,
        nick: &str,
        cmd_name: &str,
    ) -> Option<ts6_proto::Message> {
        use ts6_proto::{Command, Prefix, Response};
        match self {
            Self::NotRegistered => Some(ts6_proto::Message {
                tags: None,
                prefix: Some(Prefix::ServerName(server_name.to_string())),
                command: Command::Response(
                    Response::ERR_NOTREGISTERED,
                    vec!["*".to_string(), "You have not registered".to_string()],
                ),
            }),
            Self::NeedMoreParams => Some(ts6_proto::Message {
                tags: None,
                prefix: Some(Prefix::ServerName(server_name.to_string())),
                command: Command::Response(
                    Response::ERR_NEEDMOREPARAMS,
                    vec![
                        nick.to_string(),
                        cmd_name.to_string(),
                        "Not enough parameters".to_string(),
                    ],
                ),
            }),
            Self::NoTextToSend => Some(ts6_proto::Message {
                tags: None,
                prefix: Some(Prefix::ServerName(server_name.to_string())),
                command: Command::Response(
                    Response::ERR_NOTEXTTOSEND,
                    vec![nick.to_string(), "No text to send".to_string()],
                ),
            }),
            Self::NicknameInUse(bad_nick) => Some(ts6_proto::Message {
                tags: None,
                prefix: Some(Prefix::ServerName(server_name.to_string())),
                command: Command::Response(
                    Response::ERR_NICKNAMEINUSE,
                    vec![
                        nick.to_string(),
                        bad_nick.clone(),
                        "Nickname is already in use".to_string(),
                    ],
                ),
            }),
            Self::ErroneousNickname(bad_nick) => Some(ts6_proto::Message {
                tags: None,
                prefix: Some(Prefix::ServerName(server_name.to_string())),
                command: Command::Response(
                    Response::ERR_ERRONEOUSNICKNAME,
                    vec![
                        nick.to_string(),
                        bad_nick.clone(),
                        "Erroneous nickname".to_string(),
                    ],
                ),
            }),
            Self::AlreadyRegistered => Some(ts6_proto::Message {
                tags: None,
                prefix: Some(Prefix::ServerName(server_name.to_string())),
                command: Command::Response(
                    Response::ERR_ALREADYREGISTERED,
                    vec!["*".to_string(), "You may not reregister".to_string()],
                ),
            }),
            // These errors don't get client-visible replies
            Self::AccessDenied => None, // Error already sent
            Self::NickOrUserMissing => None, // Internal error
            Self::Send(_) => None, // Internal error
            Self::Quit(_) => None, // Handled specially by connection loop
            Self::StartTls => None, // Handled specially by handshake loop
            Self::Internal(_) => None, // Internal error
        }
    }
}

/// Result type for command handlers.
pub type HandlerResult = Result<(), HandlerError>;

// ============================================================================
// User lookup helpers (Phase 1.1: DRY refactoring)
// ============================================================================

/// Resolve a nickname to UID. Returns None if not found.
///
/// Uses IRC case-folding for comparison. When multiple sessions share a
/// nick (bouncer/multiclient), returns the first bound UID.
pub fn resolve_nick_to_uid<S>(ctx: &Context<'_, S>, nick: &str) -> Option<String> {
    let lower = ts6_proto::irc_to_lower(nick);
    ctx.matrix.user_manager.get_first_uid(&lower)
}

/// Get the current user's nick, falling back to "*" if not found.
pub async fn get_nick_or_star<S>(ctx: &Context<'_, S>) -> String {
    if let Some(user_ref) = ctx.matrix.user_manager.users.get(ctx.uid) {
        user_ref.read().await.nick.clone()
    } else {
        "*".to_string()
    }
}

/// Fetch the current nick, user, and visible host for a given UID from Matrix.
pub async fn user_mask_from_state<S>(
    ctx: &Context<'_, S>,
    uid: &str,
) -> Option<(String, String, String)> {
    let user_ref = ctx.matrix.user_manager.users.get(uid)?;
    let user = user_ref.read().await;
    Some((
        user.nick.clone(),
        user.user.clone(),
        user.visible_host.clone(),
    ))
}

/// Get the current user's nick and oper status. Returns None if user not found.
pub async fn get_oper_info<S>(ctx: &Context<'_, S>) -> Option<(String, bool)> {
    let user_ref = ctx.matrix.user_manager.users.get(ctx.uid)?;
    let user = user_ref.read().await;
    Some((user.nick.clone(), user.modes.oper))
}

/// Check if a user is in a specific channel.
///
/// Returns true if the user (identified by uid) is a member of the channel.
pub async fn is_user_in_channel<S>(ctx: &Context<'_, S>, uid: &str, channel_lower: &str) -> bool {
    if let Some(user_ref) = ctx.matrix.user_manager.users.get(uid) {
        let user = user_ref.read().await;
        user.channels.contains(channel_lower)
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_error_codes() {
        assert_eq!(HandlerError::NeedMoreParams.error_code(), "need_more_params");
        assert_eq!(HandlerError::NotRegistered.error_code(), "not_registered");
        assert_eq!(HandlerError::Internal("test".into()).error_code(), "internal_error");
        assert_eq!(HandlerError::StartTls.error_code(), "starttls");
    }

    #[test]
    fn test_handler_error_to_irc_reply() {
        let reply = HandlerError::NeedMoreParams.to_irc_reply("server", "nick", "JOIN");
        assert!(reply.is_some());

        // Internal errors and STARTTLS don't generate client-visible replies
        let reply = HandlerError::Internal("oops".into()).to_irc_reply("server", "nick", "JOIN");
        assert!(reply.is_none());
        let reply = HandlerError::StartTls.to_irc_reply("server", "nick", "STARTTLS");
        assert!(reply.is_none());
    }
}
