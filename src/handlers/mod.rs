//! IRC command handlers.
//!
//! This module contains the command handler infrastructure (see [`core`]) and
//! one submodule per command family. Handlers are registered with the
//! [`core::Registry`] by command name and dispatched through one of three
//! typestate-scoped methods depending on session phase: pre-registration,
//! post-registration, or server-to-server.

pub mod core;

pub mod admin;
pub mod bans;
pub mod batch;
pub mod cap;
pub mod channel;
pub mod chathistory;
pub mod connection;
pub mod messaging;
pub mod mode;
pub mod monitor;
pub mod oper;
pub mod s2s;
pub mod server;
pub mod server_query;
pub mod services;
pub mod user;
pub mod user_query;
pub mod util;

pub use core::{
    Context, DynUniversalHandler, HandlerError, HandlerResult, HandshakeState, PostRegHandler,
    PreRegHandler, ResponseMiddleware, ServerHandler, UniversalHandler, get_nick_or_star,
    get_oper_info, is_user_in_channel, resolve_nick_to_uid, user_mask_from_state,
};
pub use cap::SaslState;
pub use connection::WelcomeBurstWriter;
pub use mode::apply_user_modes_typed;
pub use monitor::notify_monitors_online;
pub use util::helpers::{
    err_unknowncommand, matches_hostmask, server_notice, server_reply, with_label,
};

// ============================================================================
// Common error reply helpers
// ============================================================================
//
// These build on `server_reply` (in `util::helpers`) and are shared across
// command families. Kept here (rather than in `util`) since they existed on
// the original flat registry and many handlers still import them from
// `crate::handlers::*`.

use ts6_proto::Response;

/// Create ERR_NOPRIVILEGES reply (481) - user is not an IRC operator.
pub fn err_noprivileges(server_name: &str, nick: &str) -> ts6_proto::Message {
    server_reply(
        server_name,
        Response::ERR_NOPRIVILEGES,
        vec![
            nick.to_string(),
            "Permission Denied - You're not an IRC operator".to_string(),
        ],
    )
}

/// Create ERR_NEEDMOREPARAMS reply (461) - not enough parameters.
pub fn err_needmoreparams(server_name: &str, nick: &str, command: &str) -> ts6_proto::Message {
    server_reply(
        server_name,
        Response::ERR_NEEDMOREPARAMS,
        vec![
            nick.to_string(),
            command.to_string(),
            "Not enough parameters".to_string(),
        ],
    )
}

/// Create ERR_NOSUCHNICK reply (401) - no such nick/channel.
pub fn err_nosuchnick(server_name: &str, nick: &str, target: &str) -> ts6_proto::Message {
    server_reply(
        server_name,
        Response::ERR_NOSUCHNICK,
        vec![
            nick.to_string(),
            target.to_string(),
            "No such nick/channel".to_string(),
        ],
    )
}

/// Create ERR_NOSUCHCHANNEL reply (403) - no such channel.
pub fn err_nosuchchannel(server_name: &str, nick: &str, channel: &str) -> ts6_proto::Message {
    server_reply(
        server_name,
        Response::ERR_NOSUCHCHANNEL,
        vec![
            nick.to_string(),
            channel.to_string(),
            "No such channel".to_string(),
        ],
    )
}
