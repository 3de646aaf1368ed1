//! PASS command handler for connection registration.

use super::super::{Context, HandlerResult, PreRegHandler, server_reply};
use crate::state::UnregisteredState;
use async_trait::async_trait;
use ts6_proto::{MessageRef, Response};
use tracing::debug;

/// Handler for PASS command.
///
/// `PASS password`
///
/// Sets the connection password before registration.
pub struct PassHandler;

#[async_trait]
impl PreRegHandler for PassHandler {
    async fn handle(
        &self,
        ctx: &mut Context<'_, UnregisteredState>,
        msg: &MessageRef<'_>,
    ) -> HandlerResult {
        // PASS must come before NICK/USER (RFC 2812 Section 3.1.1)
        if ctx.state.nick.is_some() || ctx.state.user.is_some() {
            let reply = server_reply(
                &ctx.matrix.server_info.name,
                Response::ERR_ALREADYREGISTERED,
                vec![
                    "*".to_string(),
                    "PASS must be sent before NICK/USER".to_string(),
                ],
            );
            ctx.sender.send(reply).await?;
            return Ok(());
        }

        // PASS <password>
        let password = match msg.arg(0) {
            Some(p) if !p.is_empty() => p,
            _ => {
                let reply = server_reply(
                    &ctx.matrix.server_info.name,
                    Response::ERR_NEEDMOREPARAMS,
                    vec![
                        "*".to_string(),
                        "PASS".to_string(),
                        "Not enough parameters".to_string(),
                    ],
                );
                ctx.sender.send(reply).await?;
                return Ok(());
            }
        };

        ctx.state.pass_received = Some(password.to_string());
        debug!("PASS received");

        Ok(())
    }
}
