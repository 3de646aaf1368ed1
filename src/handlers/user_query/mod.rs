//! User query handlers: WHO, WHOIS, WHOWAS, USERHOST, ISON
//!
//! RFC 2812 §3.6 - User based queries

mod who;
mod whois;

pub use who::WhoHandler;
pub use whois::{IsonHandler, UserhostHandler, WhoisHandler, WhowasHandler};
