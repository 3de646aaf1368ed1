//! Server query handlers: VERSION, TIME, ADMIN, INFO, LUSERS, STATS, MOTD
//!
//! RFC 2812 §3.4 - Server queries and commands

mod admin;
mod info;
mod lusers;
mod motd;
mod stats;
mod time;
mod version;

pub use admin::AdminHandler;
pub use info::InfoHandler;
pub use lusers::LusersHandler;
pub use motd::MotdHandler;
pub use stats::StatsHandler;
pub use time::TimeHandler;
pub use version::VersionHandler;
