//! IRC message types and parsing.

mod borrowed;
/// 32-entry LRU of pre-serialized per-capability message variants.
pub mod cache;
/// Wire-format size limits (`TAGSLEN`, `DATALEN`, tag/param caps).
pub mod limits;
mod nom_parser;
mod parse;
mod serialize;
/// IRCv3 tag utilities.
pub mod tags;
mod types;

pub use self::borrowed::MessageRef;
pub use self::cache::MsgBufCache;
pub use self::types::{Message, Tag};
