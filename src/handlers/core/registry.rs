//! Command handler registry and dispatch.
//!
//! The `Registry` holds three typed handler maps, one per session state
//! (pre-registration, post-registration, server-to-server), and provides
//! command usage statistics. Includes IRC-aware instrumentation for
//! observability (Innovation 3).

use super::context::{Context, HandlerResult};
use super::traits::{PostRegHandler, PreRegHandler, ServerHandler};
use crate::handlers::util::helpers::{err_unknowncommand, with_label};
use crate::hooks::{HookData, HookPoint, MessageHandlerData, MessageTagData, TagDecision};
use crate::handlers::{
    admin::{SajoinHandler, SamodeHandler, SanickHandler, SapartHandler},
    bans::{
        DlineHandler, GlineHandler, KlineHandler, RlineHandler, ShunHandler, UndlineHandler,
        UnglineHandler, UnklineHandler, UnrlineHandler, UnshunHandler, UnzlineHandler,
        ZlineHandler,
    },
    batch::{BatchHandler, server::ServerBatchHandler},
    cap::{AuthenticateHandler, CapHandler},
    channel::{
        CycleHandler, InviteHandler, JoinHandler, KickHandler, KnockHandler, ListHandler,
        NamesHandler, PartHandler, TopicHandler,
    },
    chathistory::ChatHistoryHandler,
    connection::{
        NickHandler, PassHandler, PingHandler, PongHandler, QuitHandler, StarttlsHandler,
        UserHandler, WebircHandler,
    },
    messaging::{NoticeHandler, PrivmsgHandler, TagmsgHandler},
    mode::ModeHandler,
    monitor::MonitorHandler,
    oper,
    s2s::{ConnectHandler, LinksHandler, MapHandler, SquitHandler},
    server::{
        self, ServerHandshakeHandler, ServerPropagationHandler, capab::CapabHandler,
        delta::DeltaHandler, encap::EncapHandler, routing::RoutedMessageHandler, sid::SidHandler,
        sjoin::SJoinHandler, svinfo::SvinfoHandler, tb::TbHandler, tmode::TModeHandler,
        uid::UidHandler,
    },
    server_query::{
        AdminHandler, InfoHandler, LusersHandler, MotdHandler, StatsHandler, TimeHandler,
        VersionHandler,
    },
    services::{account::RegisterHandler, aliases::{CsHandler, NsHandler}},
    user::status::{AwayHandler, SetnameHandler, SilenceHandler},
    user_query::{IsonHandler, UserhostHandler, WhoHandler, WhoisHandler, WhowasHandler},
};
use crate::state::{RegisteredState, ServerState, UnregisteredState};
use crate::telemetry::CommandTimer;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use ts6_proto::MessageRef;
use tracing::{Instrument, debug};

/// Registry of command handlers, split by the session state each applies to.
pub struct Registry {
    pre_reg_handlers: HashMap<&'static str, Box<dyn PreRegHandler>>,
    post_reg_handlers: HashMap<&'static str, Box<dyn PostRegHandler>>,
    server_handlers: HashMap<&'static str, Box<dyn ServerHandler>>,
    /// Command usage counters for STATS m
    command_counts: HashMap<&'static str, Arc<AtomicU64>>,
}

impl Registry {
    /// Create a new registry with all handlers registered.
    ///
    /// `webirc_blocks` is passed from config for WEBIRC authorization.
    pub fn new(webirc_blocks: Vec<crate::config::WebircBlock>) -> Self {
        let mut pre_reg_handlers: HashMap<&'static str, Box<dyn PreRegHandler>> = HashMap::new();

        // WEBIRC must be registered before NICK/USER are sent by the client.
        pre_reg_handlers.insert("WEBIRC", Box::new(WebircHandler::new(webirc_blocks)));
        pre_reg_handlers.insert("PASS", Box::new(PassHandler));
        pre_reg_handlers.insert("USER", Box::new(UserHandler));
        pre_reg_handlers.insert("STARTTLS", Box::new(StarttlsHandler));
        pre_reg_handlers.insert("NICK", Box::new(NickHandler));
        pre_reg_handlers.insert("PING", Box::new(PingHandler));
        pre_reg_handlers.insert("PONG", Box::new(PongHandler));
        pre_reg_handlers.insert("QUIT", Box::new(QuitHandler));
        pre_reg_handlers.insert("CAP", Box::new(CapHandler));
        pre_reg_handlers.insert("AUTHENTICATE", Box::new(AuthenticateHandler));
        pre_reg_handlers.insert("REGISTER", Box::new(RegisterHandler));

        // Server handshake, pre-registration only: a peer announces itself
        // with SERVER/SVINFO/CAPAB before it is promoted to `ServerState`.
        pre_reg_handlers.insert("SERVER", Box::new(ServerHandshakeHandler));
        pre_reg_handlers.insert("SVINFO", Box::new(SvinfoHandler));
        pre_reg_handlers.insert("CAPAB", Box::new(CapabHandler));

        let mut post_reg_handlers: HashMap<&'static str, Box<dyn PostRegHandler>> = HashMap::new();

        // Connection/registration commands remain valid post-registration.
        post_reg_handlers.insert("NICK", Box::new(NickHandler));
        post_reg_handlers.insert("PING", Box::new(PingHandler));
        post_reg_handlers.insert("PONG", Box::new(PongHandler));
        post_reg_handlers.insert("QUIT", Box::new(QuitHandler));
        post_reg_handlers.insert("CAP", Box::new(CapHandler));
        post_reg_handlers.insert("AUTHENTICATE", Box::new(AuthenticateHandler));
        post_reg_handlers.insert("REGISTER", Box::new(RegisterHandler));

        // Channel handlers
        post_reg_handlers.insert("JOIN", Box::new(JoinHandler));
        post_reg_handlers.insert("PART", Box::new(PartHandler));
        post_reg_handlers.insert("CYCLE", Box::new(CycleHandler));
        post_reg_handlers.insert("TOPIC", Box::new(TopicHandler));
        post_reg_handlers.insert("NAMES", Box::new(NamesHandler));
        post_reg_handlers.insert("MODE", Box::new(ModeHandler));
        post_reg_handlers.insert("KICK", Box::new(KickHandler));
        post_reg_handlers.insert("LIST", Box::new(ListHandler));
        post_reg_handlers.insert("INVITE", Box::new(InviteHandler));
        post_reg_handlers.insert("KNOCK", Box::new(KnockHandler));

        // Messaging handlers
        post_reg_handlers.insert("PRIVMSG", Box::new(PrivmsgHandler));
        post_reg_handlers.insert("NOTICE", Box::new(NoticeHandler));
        post_reg_handlers.insert("TAGMSG", Box::new(TagmsgHandler));

        // User query handlers
        post_reg_handlers.insert("WHO", Box::new(WhoHandler));
        post_reg_handlers.insert("WHOIS", Box::new(WhoisHandler));
        post_reg_handlers.insert("WHOWAS", Box::new(WhowasHandler));
        post_reg_handlers.insert("USERHOST", Box::new(UserhostHandler));
        post_reg_handlers.insert("ISON", Box::new(IsonHandler));

        // Server query handlers
        post_reg_handlers.insert("VERSION", Box::new(VersionHandler));
        post_reg_handlers.insert("TIME", Box::new(TimeHandler));
        post_reg_handlers.insert("ADMIN", Box::new(AdminHandler));
        post_reg_handlers.insert("INFO", Box::new(InfoHandler));
        post_reg_handlers.insert("LUSERS", Box::new(LusersHandler));
        post_reg_handlers.insert("STATS", Box::new(StatsHandler));
        post_reg_handlers.insert("MOTD", Box::new(MotdHandler));

        // Oper-client-initiated server-topology queries.
        post_reg_handlers.insert("CONNECT", Box::new(ConnectHandler));
        post_reg_handlers.insert("LINKS", Box::new(LinksHandler));
        post_reg_handlers.insert("MAP", Box::new(MapHandler));
        post_reg_handlers.insert("SQUIT", Box::new(SquitHandler));

        // User status/profile handlers
        post_reg_handlers.insert("AWAY", Box::new(AwayHandler));
        post_reg_handlers.insert("SETNAME", Box::new(SetnameHandler));
        post_reg_handlers.insert("SILENCE", Box::new(SilenceHandler));
        post_reg_handlers.insert("MONITOR", Box::new(MonitorHandler));
        post_reg_handlers.insert("CHATHISTORY", Box::new(ChatHistoryHandler));

        // Batch handler for IRCv3 message batching (draft/multiline)
        post_reg_handlers.insert("BATCH", Box::new(BatchHandler));

        // Service aliases
        post_reg_handlers.insert("NICKSERV", Box::new(NsHandler));
        post_reg_handlers.insert("NS", Box::new(NsHandler));
        post_reg_handlers.insert("CHANSERV", Box::new(CsHandler));
        post_reg_handlers.insert("CS", Box::new(CsHandler));

        // Operator handlers (OPER, KILL, WALLOPS, GLOBOPS, DIE, REHASH,
        // RESTART, CHGHOST, CHGIDENT, VHOST, TRACE, SPAMCONF, CLEARCHAN)
        oper::register(&mut post_reg_handlers);

        // Ban handlers
        post_reg_handlers.insert("KLINE", Box::new(KlineHandler));
        post_reg_handlers.insert("DLINE", Box::new(DlineHandler));
        post_reg_handlers.insert("GLINE", Box::new(GlineHandler));
        post_reg_handlers.insert("ZLINE", Box::new(ZlineHandler));
        post_reg_handlers.insert("RLINE", Box::new(RlineHandler));
        post_reg_handlers.insert("SHUN", Box::new(ShunHandler));
        post_reg_handlers.insert("UNKLINE", Box::new(UnklineHandler));
        post_reg_handlers.insert("UNDLINE", Box::new(UndlineHandler));
        post_reg_handlers.insert("UNGLINE", Box::new(UnglineHandler));
        post_reg_handlers.insert("UNZLINE", Box::new(UnzlineHandler));
        post_reg_handlers.insert("UNRLINE", Box::new(UnrlineHandler));
        post_reg_handlers.insert("UNSHUN", Box::new(UnshunHandler));

        // Admin SA* handlers
        post_reg_handlers.insert("SAJOIN", Box::new(SajoinHandler));
        post_reg_handlers.insert("SAPART", Box::new(SapartHandler));
        post_reg_handlers.insert("SANICK", Box::new(SanickHandler));
        post_reg_handlers.insert("SAMODE", Box::new(SamodeHandler));

        let mut server_handlers: HashMap<&'static str, Box<dyn ServerHandler>> = HashMap::new();

        server_handlers.insert("NICK", Box::new(NickHandler));
        server_handlers.insert("PING", Box::new(PingHandler));
        server_handlers.insert("PONG", Box::new(PongHandler));
        server_handlers.insert("QUIT", Box::new(QuitHandler));

        // Topology propagation from established peers (distinct from the
        // pre-registration handshake handler registered above).
        server_handlers.insert("SERVER", Box::new(ServerPropagationHandler));
        server_handlers.insert("SID", Box::new(SidHandler));
        server_handlers.insert("UID", Box::new(UidHandler));
        server_handlers.insert("SJOIN", Box::new(SJoinHandler));
        server_handlers.insert("TB", Box::new(TbHandler));
        server_handlers.insert("TMODE", Box::new(TModeHandler));
        server_handlers.insert("TOPIC", Box::new(server::topic::TopicHandler));
        server_handlers.insert("KICK", Box::new(server::kick::KickHandler));
        server_handlers.insert("KILL", Box::new(server::kill::KillHandler));
        server_handlers.insert("DELTA", Box::new(DeltaHandler));
        server_handlers.insert("ENCAP", Box::new(EncapHandler));
        server_handlers.insert("BATCH", Box::new(ServerBatchHandler));

        // Server-origin routed messages share a single handler across the
        // three message commands it understands.
        server_handlers.insert("PRIVMSG", Box::new(RoutedMessageHandler));
        server_handlers.insert("NOTICE", Box::new(RoutedMessageHandler));
        server_handlers.insert("TAGMSG", Box::new(RoutedMessageHandler));

        // Initialize command counters for every distinct command name across
        // all three maps (a command may appear in more than one map).
        let mut command_counts = HashMap::new();
        for &cmd in pre_reg_handlers
            .keys()
            .chain(post_reg_handlers.keys())
            .chain(server_handlers.keys())
        {
            command_counts
                .entry(cmd)
                .or_insert_with(|| Arc::new(AtomicU64::new(0)));
        }

        Self {
            pre_reg_handlers,
            post_reg_handlers,
            server_handlers,
            command_counts,
        }
    }

    /// Get command usage statistics for STATS m.
    pub fn get_command_stats(&self) -> Vec<(&'static str, u64)> {
        let mut stats: Vec<_> = self
            .command_counts
            .iter()
            .map(|(cmd, count)| (*cmd, count.load(Ordering::Relaxed)))
            .filter(|(_, count)| *count > 0)
            .collect();

        stats.sort_by(|a, b| b.1.cmp(&a.1));
        stats
    }

    fn record_dispatch(&self, cmd_name: &str) {
        if let Some(counter) = self.command_counts.get(cmd_name) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Fire `message_tag` once per non-empty client tag, iterated in reverse
    /// so that, for a duplicated key, the last occurrence wins. Returns
    /// `false` if a subscriber voted to drop the whole message.
    fn fire_message_tag_hooks<S>(&self, ctx: &Context<'_, S>, msg: &MessageRef<'_>) -> bool {
        let Some(tags) = msg.tags else {
            return true;
        };

        for raw_tag in tags.split(';').rev() {
            if raw_tag.is_empty() {
                continue;
            }
            let (key, value) = match raw_tag.split_once('=') {
                Some((k, v)) => (k, Some(v.to_string())),
                None => (raw_tag, None),
            };
            if key.is_empty() {
                continue;
            }

            let mut data = HookData::MessageTag(MessageTagData {
                uid: ctx.uid.to_string(),
                key: key.to_string(),
                value,
                decision: TagDecision::Allow,
            });
            ctx.matrix.hooks.fire(HookPoint::MessageTag, &mut data);

            if let HookData::MessageTag(tag_data) = data
                && tag_data.decision == TagDecision::Drop
            {
                return false;
            }
        }

        true
    }

    /// Fire `message_handler` with the currently-selected command name,
    /// letting a subscriber (e.g. the batch engine) rebind it to a
    /// different registered handler.
    fn fire_message_handler_hook<S>(&self, ctx: &Context<'_, S>, cmd_name: String) -> String {
        let mut data = HookData::MessageHandler(MessageHandlerData {
            uid: ctx.uid.to_string(),
            command: cmd_name,
            rebind: None,
        });
        ctx.matrix.hooks.fire(HookPoint::MessageHandler, &mut data);

        match data {
            HookData::MessageHandler(handler_data) => {
                handler_data.rebind.unwrap_or(handler_data.command)
            }
            _ => unreachable!("fire() preserves the HookData variant"),
        }
    }

    /// Dispatch a pre-registration message (before NICK/USER complete).
    pub async fn dispatch_pre_reg(
        &self,
        ctx: &mut Context<'_, UnregisteredState>,
        msg: &MessageRef<'_>,
    ) -> HandlerResult {
        let cmd_name = msg.command_name().to_ascii_uppercase();
        self.record_dispatch(&cmd_name);

        if !self.fire_message_tag_hooks(ctx, msg) {
            return Ok(());
        }
        let cmd_name = self.fire_message_handler_hook(ctx, cmd_name);

        if let Some(handler) = self.pre_reg_handlers.get(cmd_name.as_str()) {
            let target = msg.arg(0);
            let span = crate::telemetry::spans::command(&cmd_name, ctx.uid, target);
            let timer = CommandTimer::new(cmd_name.clone());
            let result = handler.handle(ctx, msg).instrument(span).await;
            if let Err(ref e) = result {
                timer.record_error(e.error_code());
                debug!(command = %cmd_name, error = %e, "Command error");
            }
            result
        } else {
            self.unknown_command(ctx.uid, ctx, &cmd_name).await
        }
    }

    /// Dispatch a post-registration message from a fully registered client.
    pub async fn dispatch_post_reg(
        &self,
        ctx: &mut Context<'_, RegisteredState>,
        msg: &MessageRef<'_>,
    ) -> HandlerResult {
        let cmd_name = msg.command_name().to_ascii_uppercase();
        self.record_dispatch(&cmd_name);

        if !self.fire_message_tag_hooks(ctx, msg) {
            return Ok(());
        }
        let cmd_name = self.fire_message_handler_hook(ctx, cmd_name);

        if let Some(handler) = self.post_reg_handlers.get(cmd_name.as_str()) {
            let target = msg.arg(0);
            let span = crate::telemetry::spans::command(&cmd_name, ctx.uid, target);
            let timer = CommandTimer::new(cmd_name.clone());
            let result = handler.handle(ctx, msg).instrument(span).await;
            if let Err(ref e) = result {
                timer.record_error(e.error_code());
                debug!(command = %cmd_name, error = %e, "Command error");
            }
            result
        } else {
            self.unknown_command(ctx.uid, ctx, &cmd_name).await
        }
    }

    /// Dispatch a message arriving from an established server link.
    pub async fn dispatch_server(
        &self,
        ctx: &mut Context<'_, ServerState>,
        msg: &MessageRef<'_>,
    ) -> HandlerResult {
        let cmd_name = msg.command_name().to_ascii_uppercase();
        self.record_dispatch(&cmd_name);

        if !self.fire_message_tag_hooks(ctx, msg) {
            return Ok(());
        }
        let cmd_name = self.fire_message_handler_hook(ctx, cmd_name);

        if let Some(handler) = self.server_handlers.get(cmd_name.as_str()) {
            let target = msg.arg(0);
            let span = crate::telemetry::spans::command(&cmd_name, ctx.uid, target);
            let timer = CommandTimer::new(cmd_name.clone());
            let result = handler.handle(ctx, msg).instrument(span).await;
            if let Err(ref e) = result {
                timer.record_error(e.error_code());
                debug!(command = %cmd_name, error = %e, "Command error");
            }
            result
        } else {
            self.unknown_command(ctx.uid, ctx, &cmd_name).await
        }
    }

    /// Send ERR_UNKNOWNCOMMAND. There is no `HandlerError` variant for this
    /// case, so the registry replies directly rather than leaving it to the
    /// caller's error-to-reply translation.
    async fn unknown_command<S>(
        &self,
        uid: &str,
        ctx: &mut Context<'_, S>,
        cmd_name: &str,
    ) -> HandlerResult {
        let nick = super::context::get_nick_or_star(ctx).await;
        let reply = err_unknowncommand(&ctx.matrix.server_info.name, &nick, cmd_name);
        let reply = with_label(reply, ctx.label.as_deref());
        ctx.sender.send(reply).await?;

        crate::metrics::record_command_error(cmd_name, "unknown_command");
        debug!(command = %cmd_name, %uid, "Unknown command");
        Ok(())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
