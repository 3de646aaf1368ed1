//! PING and PONG handlers.

use super::super::{Context, HandlerResult, UniversalHandler};
use crate::state::SessionState;
use async_trait::async_trait;
use ts6_proto::{Message, MessageRef};

/// Handler for PING command.
pub struct PingHandler;

#[async_trait]
impl<S: SessionState> UniversalHandler<S> for PingHandler {
    async fn handle(&self, ctx: &mut Context<'_, S>, msg: &MessageRef<'_>) -> HandlerResult {
        // PING <server>
        let server = msg.arg(0).unwrap_or("");

        let pong = Message::pong(server);
        ctx.sender.send(pong).await?;

        Ok(())
    }
}

/// Handler for PONG command.
pub struct PongHandler;

#[async_trait]
impl<S: SessionState> UniversalHandler<S> for PongHandler {
    async fn handle(&self, ctx: &mut Context<'_, S>, _msg: &MessageRef<'_>) -> HandlerResult {
        // PONG normally produces no output, but with labeled-response we send ACK
        if let Some(label) = &ctx.label {
            let ack = super::super::labeled_ack(&ctx.matrix.server_info.name, label);
            ctx.sender.send(ack).await?;
        }

        // Just acknowledge PONG - resets idle timer (handled in connection loop)
        Ok(())
    }
}
