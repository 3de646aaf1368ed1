//! Connection and registration handlers.
//!
//! Handles NICK, USER, PASS, PING, PONG, QUIT commands.

mod caps;
mod nick;
mod pass;
mod ping;
mod quit;
mod starttls;
mod user;
mod webirc;
mod welcome_burst;

pub use nick::NickHandler;
pub use pass::PassHandler;
pub use ping::{PingHandler, PongHandler};
pub use quit::QuitHandler;
pub use starttls::StarttlsHandler;
pub use user::UserHandler;
pub use webirc::WebircHandler;
pub use welcome_burst::WelcomeBurstWriter;
