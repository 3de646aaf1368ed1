//! Unified error handling for solanumd.
//!
//! Command-handling errors (`HandlerError`/`HandlerResult`) live in
//! `handlers::core::context` alongside the typestate `Context` they're
//! returned from; this module holds the error types that don't belong to
//! that module, such as channel operation errors shared across handlers.

use ts6_proto::{Command, Message, Prefix, Response};
use thiserror::Error;

// ============================================================================
// Channel Errors (actor operations)
// ============================================================================

/// Channel operation errors.
///
/// These errors represent channel-specific failures that can be mapped
/// to RFC-compliant error responses by handler code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("not on channel")]
    NotOnChannel,

    #[error("you're not channel operator")]
    ChanOpPrivsNeeded,

    #[error("user {0} is not on that channel")]
    UserNotInChannel(String),

    #[error("user {0} is already on that channel")]
    UserOnChannel(String),

    #[error("cannot knock on this channel")]
    CannotKnock,

    #[error("channel is open")]
    ChanOpen,

    #[error("channel is restarting")]
    ChannelTombstone,

    #[error("session invalid")]
    SessionInvalid,

    #[error("cannot join channel (+b)")]
    BannedFromChan,

    #[error("cannot join channel (+i)")]
    InviteOnlyChan,

    #[error("cannot join channel (+l)")]
    ChannelIsFull,

    #[error("cannot join channel (+k)")]
    BadChannelKey,

    #[error("channel key already set")]
    #[allow(dead_code)]
    KeySet,

    #[error("{0} is unknown mode char to me for {1}")]
    #[allow(dead_code)]
    UnknownMode(char, String),

    #[error("channel doesn't support modes")]
    #[allow(dead_code)]
    NoChanModes,

    #[error("channel list {0} is full")]
    #[allow(dead_code)]
    BanListFull(char),

    #[error("you're not the original channel operator")]
    #[allow(dead_code)]
    UniqOpPrivsNeeded,

    #[error("{0}")]
    #[allow(dead_code)]
    UnknownError(String),
}

impl ChannelError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    #[allow(dead_code)] // Available for future metrics integration
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotOnChannel => "not_on_channel",
            Self::ChanOpPrivsNeeded => "chanop_privs_needed",
            Self::UserNotInChannel(_) => "user_not_in_channel",
            Self::UserOnChannel(_) => "user_on_channel",
            Self::CannotKnock => "cannot_knock",
            Self::ChanOpen => "chan_open",
            Self::ChannelTombstone => "channel_tombstone",
            Self::SessionInvalid => "session_invalid",
            Self::BannedFromChan => "banned_from_chan",
            Self::InviteOnlyChan => "invite_only_chan",
            Self::ChannelIsFull => "channel_is_full",
            Self::BadChannelKey => "bad_channel_key",
            Self::KeySet => "key_set",
            Self::UnknownMode(_, _) => "unknown_mode",
            Self::NoChanModes => "no_chan_modes",
            Self::BanListFull(_) => "ban_list_full",
            Self::UniqOpPrivsNeeded => "uniq_op_privs_needed",
            Self::UnknownError(_) => "unknown_error",
        }
    }

    /// Convert to an IRC error reply message.
    #[allow(dead_code)] // Available for handler use
    pub fn to_irc_reply(&self, server_name: &str, nick: &str, channel: &str) -> Message {
        let (response, args) = match self {
            Self::NotOnChannel => (
                Response::ERR_NOTONCHANNEL,
                vec![nick.to_string(), channel.to_string(), "You're not on that channel".to_string()],
            ),
            Self::ChanOpPrivsNeeded => (
                Response::ERR_CHANOPRIVSNEEDED,
                vec![nick.to_string(), channel.to_string(), "You're not channel operator".to_string()],
            ),
            Self::UserNotInChannel(target) => (
                Response::ERR_USERNOTINCHANNEL,
                vec![nick.to_string(), target.clone(), channel.to_string(), "They aren't on that channel".to_string()],
            ),
            Self::UserOnChannel(target) => (
                Response::ERR_USERONCHANNEL,
                vec![nick.to_string(), target.clone(), channel.to_string(), "is already on channel".to_string()],
            ),
            Self::BannedFromChan => (
                Response::ERR_BANNEDFROMCHAN,
                vec![nick.to_string(), channel.to_string(), "Cannot join channel (+b)".to_string()],
            ),
            Self::InviteOnlyChan => (
                Response::ERR_INVITEONLYCHAN,
                vec![nick.to_string(), channel.to_string(), "Cannot join channel (+i)".to_string()],
            ),
            Self::ChannelIsFull => (
                Response::ERR_CHANNELISFULL,
                vec![nick.to_string(), channel.to_string(), "Cannot join channel (+l)".to_string()],
            ),
            Self::BadChannelKey => (
                Response::ERR_BADCHANNELKEY,
                vec![nick.to_string(), channel.to_string(), "Cannot join channel (+k)".to_string()],
            ),
            Self::UnknownMode(c, chan) => (
                Response::ERR_UNKNOWNMODE,
                vec![nick.to_string(), c.to_string(), format!("is unknown mode char to me for {}", chan)],
            ),
            Self::BanListFull(list_char) => (
                Response::ERR_BANLISTFULL,
                vec![nick.to_string(), channel.to_string(), list_char.to_string(), "Channel list is full".to_string()],
            ),
            Self::UniqOpPrivsNeeded => (
                Response::ERR_UNIQOPPRIVSNEEDED,
                vec![nick.to_string(), "You're not the original channel operator".to_string()],
            ),
            // These don't have standard IRC numerics - use generic error
            Self::CannotKnock | Self::ChanOpen | Self::ChannelTombstone
            | Self::SessionInvalid | Self::KeySet | Self::NoChanModes
            | Self::UnknownError(_) => (
                Response::ERR_UNKNOWNERROR,
                vec![nick.to_string(), channel.to_string(), self.to_string()],
            ),
        };

        Message {
            tags: None,
            prefix: Some(Prefix::ServerName(server_name.to_string())),
            command: Command::Response(response, args),
        }
    }
}

// ============================================================================
// Host-mask index errors
// ============================================================================

/// Errors raised by the host-mask/CIDR index (`security::hostmask`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostmaskError {
    #[error("invalid IPv4 prefix length: {0}")]
    InvalidIpv4Bits(u8),

    #[error("invalid IPv6 prefix length: {0}")]
    InvalidIpv6Bits(u8),

    #[error("empty host mask")]
    EmptyMask,

    #[error("precedence counter exhausted")]
    PrecedenceExhausted,
}

// ============================================================================
// Database Errors (re-exported, kept in db module for sqlx proximity)
// ============================================================================

// DbError stays in db/mod.rs because it has #[from] sqlx::Error which requires
// sqlx to be in scope. We just document that it exists there.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_error_codes() {
        assert_eq!(ChannelError::NotOnChannel.error_code(), "not_on_channel");
        assert_eq!(ChannelError::BannedFromChan.error_code(), "banned_from_chan");
    }

    #[test]
    fn test_channel_error_to_irc_reply() {
        let reply = ChannelError::NotOnChannel.to_irc_reply("server", "nick", "#test");
        assert!(matches!(reply.command, Command::Response(Response::ERR_NOTONCHANNEL, _)));
    }
}
