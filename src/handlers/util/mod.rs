//! Shared helper functions for IRC command handlers.

pub mod helpers;
