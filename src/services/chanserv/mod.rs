//! ChanServ - Channel registration and access control service.
//!
//! Handles channel registration, access control, and moderation commands.

mod commands;

pub use commands::ChanServ;
