//! CAP negotiation is handled separately in cap.rs - this module is empty.
//! 
//! CAP negotiation is in `handlers/cap.rs` and accessed via:
//! - `CapHandler`
//! - `AuthenticateHandler`
//! - `SaslState`
