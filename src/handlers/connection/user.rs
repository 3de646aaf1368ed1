//! USER command handler for connection registration.

use super::super::{Context, HandlerError, HandlerResult, PreRegHandler};
use crate::state::UnregisteredState;
use async_trait::async_trait;
use ts6_proto::MessageRef;
use tracing::debug;

/// Handler for USER command.
///
/// Registration completion (the 001-005 welcome burst) is not triggered here:
/// once NICK and USER are both set, the handshake loop notices via
/// `UnregisteredState::can_register()` and runs `WelcomeBurstWriter` itself.
pub struct UserHandler;

#[async_trait]
impl PreRegHandler for UserHandler {
    async fn handle(
        &self,
        ctx: &mut Context<'_, UnregisteredState>,
        msg: &MessageRef<'_>,
    ) -> HandlerResult {
        // USER <username> <mode> <unused> <realname>
        let username = msg.arg(0).ok_or(HandlerError::NeedMoreParams)?;
        // arg(1) is mode, arg(2) is unused
        let realname = msg.arg(3).unwrap_or("");

        if username.is_empty() {
            return Err(HandlerError::NeedMoreParams);
        }

        ctx.state.user = Some(username.to_string());
        ctx.state.realname = Some(realname.to_string());

        debug!(user = %username, realname = %realname, uid = %ctx.uid, "User set");

        Ok(())
    }
}
