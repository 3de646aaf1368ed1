//! Repository for K-line and D-line bans.

mod models;
mod queries;

#[allow(unused_imports)] // Available for admin commands
pub use models::{Dline, Gline, Kline, Rline, Shun, Zline};
pub use queries::BanRepository;
