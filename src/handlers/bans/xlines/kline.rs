//! K-line (local user@host ban) handlers.

use super::super::common::{BanType, disconnect_matching_ban};
use crate::handlers::{Context, HandlerResult, PostRegHandler, server_notice};
use crate::state::RegisteredState;
use crate::{require_arg_or_reply, require_oper_cap};
use async_trait::async_trait;
use ts6_proto::MessageRef;

/// Handler for KLINE command.
///
/// `KLINE [time] user@host :reason`
///
/// Bans a user mask from the server.
pub struct KlineHandler;

#[async_trait]
impl PostRegHandler for KlineHandler {
    async fn handle(
        &self,
        ctx: &mut Context<'_, RegisteredState>,
        msg: &MessageRef<'_>,
    ) -> HandlerResult {
        let server_name = ctx.matrix.server_info.name.clone();

        let Some(_cap) = require_oper_cap!(ctx, "KLINE", request_kline_cap) else {
            return Ok(());
        };

        // KLINE [time] <user@host> <reason>
        // For now, assume first arg is mask, second is reason
        let Some(mask) = require_arg_or_reply!(ctx, msg, 0, "KLINE") else {
            return Ok(());
        };
        let reason = msg.arg(1).unwrap_or("No reason given");
        let nick = ctx.nick().to_string();

        // Store K-line in database
        if let Err(e) = ctx
            .db
            .bans()
            .add_kline(mask, Some(reason), &nick, None)
            .await
        {
            tracing::error!(error = %e, "Failed to add K-line to database");
        }

        // Disconnect any matching users
        let disconnected = disconnect_matching_ban(ctx, BanType::Kline, mask, reason).await;

        tracing::info!(
            oper = %nick,
            mask = %mask,
            reason = %reason,
            disconnected = disconnected,
            "KLINE added"
        );

        // Send confirmation
        let text = if disconnected > 0 {
            format!("K-line added: {mask} ({reason}) - {disconnected} user(s) disconnected")
        } else {
            format!("K-line added: {mask} ({reason})")
        };
        ctx.sender.send(server_notice(&server_name, &nick, &text)).await?;

        Ok(())
    }
}

/// Handler for UNKLINE command.
///
/// `UNKLINE user@host`
///
/// Removes a K-line.
pub struct UnklineHandler;

#[async_trait]
impl PostRegHandler for UnklineHandler {
    async fn handle(
        &self,
        ctx: &mut Context<'_, RegisteredState>,
        msg: &MessageRef<'_>,
    ) -> HandlerResult {
        let server_name = ctx.matrix.server_info.name.clone();

        let Some(_cap) = require_oper_cap!(ctx, "UNKLINE", request_kline_cap) else {
            return Ok(());
        };

        // UNKLINE <mask>
        let Some(mask) = require_arg_or_reply!(ctx, msg, 0, "UNKLINE") else {
            return Ok(());
        };
        let nick = ctx.nick().to_string();

        // Remove K-line from database
        let removed = match ctx.db.bans().remove_kline(mask).await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "Failed to remove K-line from database");
                false
            }
        };

        if removed {
            tracing::info!(oper = %nick, mask = %mask, "UNKLINE removed");
        }

        // Send confirmation
        let text = if removed {
            format!("K-line removed: {mask}")
        } else {
            format!("No K-line found for: {mask}")
        };
        ctx.sender.send(server_notice(&server_name, &nick, &text)).await?;

        Ok(())
    }
}
