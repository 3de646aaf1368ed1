//! INVITE command handler
//!
//! RFC 2812 - Channel invitation

use super::super::{
    Context, HandlerError, HandlerResult, PostRegHandler, err_chanoprivsneeded, err_notonchannel,
    server_reply, user_mask_from_state,
};
use crate::state::RegisteredState;
use async_trait::async_trait;
use ts6_proto::{Command, MessageRef, Response, irc_to_lower};

/// Handler for INVITE command.
///
/// `INVITE nickname channel`
///
/// Invites a user to a channel.
pub struct InviteHandler;

#[async_trait]
impl PostRegHandler for InviteHandler {
    async fn handle(
        &self,
        ctx: &mut Context<'_, RegisteredState>,
        msg: &MessageRef<'_>,
    ) -> HandlerResult {
        let server_name = ctx.matrix.server_info.name.clone();
        let (nick, user_name, host) = user_mask_from_state(ctx, ctx.uid)
            .await
            .ok_or(HandlerError::NickOrUserMissing)?;

        // INVITE <nickname> <channel>
        let target_nick = msg.arg(0).ok_or(HandlerError::NeedMoreParams)?;
        let channel_name = msg.arg(1).ok_or(HandlerError::NeedMoreParams)?;

        let channel_lower = irc_to_lower(channel_name);
        let target_lower = irc_to_lower(target_nick);

        // Check if target exists
        let target_uid = match ctx.matrix.user_manager.get_first_uid(&target_lower) {
            Some(uid) => uid.value().clone(),
            None => {
                let reply = server_reply(
                    &server_name,
                    Response::ERR_NOSUCHNICK,
                    vec![
                        nick.clone(),
                        target_nick.to_string(),
                        "No such nick/channel".to_string(),
                    ],
                );
                ctx.sender.send(reply).await?;
                return Ok(());
            }
        };

        // Check if channel exists
        if let Some(channel_ref) = ctx.matrix.channel_manager.channels.get(&channel_lower) {
            let channel = channel_ref.read().await;

            // Check if user is on channel
            if !channel.is_member(ctx.uid) {
                ctx.sender
                    .send(err_notonchannel(&server_name, &nick, channel_name))
                    .await?;
                return Ok(());
            }

            // Check if target already on channel
            if channel.is_member(&target_uid) {
                let reply = server_reply(
                    &server_name,
                    Response::ERR_USERONCHANNEL,
                    vec![
                        nick.clone(),
                        target_nick.to_string(),
                        channel_name.to_string(),
                        "is already on channel".to_string(),
                    ],
                );
                ctx.sender.send(reply).await?;
                return Ok(());
            }

            // If channel is +i, check if user is op
            if channel.modes.invite_only && !channel.is_op(ctx.uid) {
                ctx.sender
                    .send(err_chanoprivsneeded(&server_name, &nick, channel_name))
                    .await?;
                return Ok(());
            }
        } else {
            // Channel doesn't exist - some servers allow inviting to non-existent channels
            // We'll allow it for now
        }

        // Send INVITE to target
        if let Some(sender) = ctx.matrix.user_manager.get_first_sender(&target_uid) {
            let invite_msg = ts6_proto::Message {
                tags: None,
                prefix: Some(ts6_proto::Prefix::Nickname(
                    nick.clone(),
                    user_name,
                    host,
                )),
                command: Command::INVITE(target_nick.to_string(), channel_name.to_string()),
            };
            let _ = sender.send(invite_msg).await;
        }

        // RPL_INVITING (341)
        let reply = server_reply(
            &server_name,
            Response::RPL_INVITING,
            vec![
                nick.clone(),
                target_nick.to_string(),
                channel_name.to_string(),
            ],
        );
        ctx.sender.send(reply).await?;

        Ok(())
    }
}
