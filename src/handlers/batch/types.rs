//! Type definitions for batch handling.

use ts6_crdt::clock::ServerId;
use ts6_proto::Tag;

/// Maximum bytes allowed in a multiline batch message.
/// Per Ergo's implementation and irctest expectations.
pub const MULTILINE_MAX_BYTES: usize = 4096;

/// Maximum lines allowed in a multiline batch.
/// Per Ergo's implementation and irctest expectations.
pub const MULTILINE_MAX_LINES: usize = 32;

/// State for an in-progress batch.
#[derive(Debug, Clone)]
pub struct BatchState {
    /// Batch type (e.g., "draft/multiline").
    pub batch_type: String,
    /// Target for the batch (e.g., channel or nick for multiline).
    pub target: String,
    /// Accumulated message lines.
    pub lines: Vec<BatchLine>,
    /// Total bytes accumulated (just the message content).
    pub total_bytes: usize,
    /// Command type (PRIVMSG or NOTICE).
    pub command_type: Option<String>,
    /// Response label from labeled-response (saved from BATCH +, applied to BATCH -).
    pub response_label: Option<String>,
    /// Client-only tags from BATCH + command (tags starting with '+').
    pub client_tags: Vec<Tag>,
}

/// Relay decision for a server-to-server BATCH, recorded when the batch starts
/// and replayed when it ends.
#[derive(Debug, Clone)]
pub enum BatchRouting {
    /// Forward to every other peer (split-horizon from the source).
    Broadcast,
    /// Deliver to a single locally-connected user (by UID).
    Local(String),
    /// Forward along the route to a remote server.
    Routed(ServerId),
    /// No relay action (target unresolved or unknown batch type).
    None,
}

/// A line within a batch.
#[derive(Debug, Clone)]
pub struct BatchLine {
    /// The message content.
    pub content: String,
    /// Whether this line should be concatenated with the previous (no newline).
    pub concat: bool,
}
