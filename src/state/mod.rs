//! State management module.
//!
//! Contains the Matrix (shared server state) and related entities.

pub mod actor;
mod channel;
pub mod client;
pub(crate) mod dashmap_ext;
pub mod managers;
mod matrix;
mod mode_builder;
pub mod observer;
pub mod persistence;
pub mod privilege;
pub mod scheduler;
pub mod session;
mod uid;
mod user;

pub use channel::{Channel, ListEntry, MemberModes, Topic};
pub use client::ChannelMembership;
pub use dashmap_ext::DashMapExt;
pub use matrix::{HotConfig, Matrix, MatrixParams};
pub use privilege::{PrivilegeDiff, PrivilegeRegistry, PrivilegeSet};
pub use scheduler::Scheduler;
pub use session::{
    BatchRouting, InitiatorData, ReattachInfo, RegisteredState, SaslAccess, ServerState,
    SessionState, UnregisteredState,
};
pub use user::{User, UserModes, UserParams};
// Exports used by matrix.rs internally
#[allow(unused_imports)]
pub(crate) use channel::ChannelModes;
#[allow(unused_imports)]
pub(crate) use user::WhowasEntry;
// Uid is used in security/rate_limit.rs - allow for now
#[allow(unused_imports)]
pub use actor::Uid;
#[allow(unused_imports)] // Will be used when we implement multi-mode commands
pub use mode_builder::{ChannelModeBuilder, ModeChangeResult, parse_mlock};
pub use uid::UidGenerator;

pub use managers::channel::ChannelManager;
pub use managers::lifecycle::LifecycleManager;
pub use managers::monitor::MonitorManager;
pub use managers::security::{SecurityManager, SecurityManagerParams};
pub use managers::service::ServiceManager;
pub use managers::user::UserManager;
pub use crate::sync::SyncManager;
