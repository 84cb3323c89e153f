//! Command dispatch for the admin channel.
//!
//! Every inbound command goes through the same pipeline: private chats
//! only, then the rate limiter and entitlement check for session
//! commands, then role checks, then argument parsing, then the session
//! manager or access registry, then a reply.  Handlers never propagate
//! errors; each failure becomes a reply and a log line.

use std::sync::Arc;
use std::time::Instant;

use teloxide::utils::command::BotCommands;

use pb_domain::config::{ListingConfig, TelegramConfig};
use pb_domain::error::{Error, Result};
use pb_domain::{AdminId, ChatId, PhoneNumber};
use pb_sessions::{AccessRegistry, InitiateOutcome, Membership, RateLimiter, SessionManager};

use crate::listing;
use crate::transport::{AdminTransport, Button, ChatKind, Inbound, OutgoingMessage, Sender};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Commands
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Recognized commands.  Single-argument variants take the whole remainder
/// of the message; it is trimmed before use.
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "PairBridge commands:")]
pub enum Command {
    #[command(description = "show your status card")]
    Start,
    #[command(description = "show the command menu")]
    Menu,
    #[command(description = "pair a number: /reqpair +num")]
    ReqPair(String),
    #[command(description = "disconnect a number: /delpair +num")]
    DelPair(String),
    #[command(description = "grant premium: /addprem id")]
    AddPrem(String),
    #[command(description = "revoke premium: /delprem id")]
    DelPrem(String),
    #[command(description = "list premium users")]
    ListPrem,
    #[command(description = "add a reseller: /addresell id")]
    AddResell(String),
    #[command(description = "remove a reseller: /delresell id")]
    DelResell(String),
    #[command(description = "list resellers")]
    ListResell,
    #[command(description = "list connected numbers")]
    ListUser,
}

/// Who may run a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Anyone,
    /// Rate-limited, then entitled users only.
    Entitled,
    /// Administrators and resellers.
    Owner,
    Administrator,
}

impl Command {
    /// Parse `/cmd`, `/cmd@bot_username` or `/cmd argument text`.  Unknown
    /// commands, commands addressed to another bot and plain text yield
    /// `None`.
    pub fn recognize(text: &str, bot_username: &str) -> Option<Self> {
        Self::parse(text.trim(), bot_username).ok()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Menu => "menu",
            Self::ReqPair(_) => "reqpair",
            Self::DelPair(_) => "delpair",
            Self::AddPrem(_) => "addprem",
            Self::DelPrem(_) => "delprem",
            Self::ListPrem => "listprem",
            Self::AddResell(_) => "addresell",
            Self::DelResell(_) => "delresell",
            Self::ListResell => "listresell",
            Self::ListUser => "listuser",
        }
    }

    /// Trimmed argument, `None` when absent or blank.
    pub fn arg(&self) -> Option<&str> {
        match self {
            Self::ReqPair(a)
            | Self::DelPair(a)
            | Self::AddPrem(a)
            | Self::DelPrem(a)
            | Self::AddResell(a)
            | Self::DelResell(a) => Some(a.trim()).filter(|a| !a.is_empty()),
            _ => None,
        }
    }

    fn gate(&self) -> Gate {
        match self {
            Self::Start | Self::Menu => Gate::Anyone,
            Self::ReqPair(_) | Self::DelPair(_) => Gate::Entitled,
            Self::AddPrem(_) | Self::DelPrem(_) | Self::ListPrem | Self::ListUser => Gate::Owner,
            Self::AddResell(_) | Self::DelResell(_) | Self::ListResell => Gate::Administrator,
        }
    }
}

// ── Reply text ──────────────────────────────────────────────────────

const UNAUTHORIZED: &str = "🚫 You are not authorized to use this command.\n\n📩 Please contact an administrator to get access.";
const OWNERS_ONLY: &str = "❌ Only owners can use this command.";
const OWNERS_AND_RESELLERS_ONLY: &str = "❌ Only owners and resellers can use this command.";
const ADMINISTRATORS_ONLY: &str = "❌ Only administrators can use this command.";
const INVALID_PHONE: &str =
    "❌ Invalid phone number. Use international format (e.g., +919876543210).";
const INVALID_USER_ID: &str = "❌ Invalid user ID.";

const MENU_TEXT: &str = "*🤖 Menu*\n\n/reqpair +num\n/delpair +num\n/addprem id\n/delprem id\n/listprem\n/addresell id\n/delresell id\n/listresell\n/listuser";
const MISC_MENU_TEXT: &str = "*📦 Misc Menu*\n\n- Coming soon -";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Dispatcher {
    access: Arc<AccessRegistry>,
    limiter: Arc<RateLimiter>,
    sessions: Arc<SessionManager>,
    transport: Arc<dyn AdminTransport>,
    bot_username: String,
    telegram: TelegramConfig,
    listing: ListingConfig,
    started: Instant,
}

impl Dispatcher {
    pub fn new(
        access: Arc<AccessRegistry>,
        limiter: Arc<RateLimiter>,
        sessions: Arc<SessionManager>,
        transport: Arc<dyn AdminTransport>,
        bot_username: impl Into<String>,
        telegram: TelegramConfig,
        listing: ListingConfig,
    ) -> Self {
        Self {
            access,
            limiter,
            sessions,
            transport,
            bot_username: bot_username.into(),
            telegram,
            listing,
            started: Instant::now(),
        }
    }

    /// Handle one inbound update.  Never fails; problems become replies.
    pub async fn handle(&self, inbound: Inbound) {
        match inbound {
            Inbound::Message {
                chat,
                kind,
                from,
                text,
            } => {
                if kind != ChatKind::Private {
                    return;
                }
                let Some(command) = Command::recognize(&text, &self.bot_username) else {
                    return;
                };
                tracing::debug!(
                    command = command.name(),
                    user_id = %from.id,
                    chat_id = %chat,
                    "command received"
                );
                self.run(chat, &from, command).await;
            }
            Inbound::Callback {
                id,
                chat,
                kind,
                from,
                data,
            } => {
                if kind != ChatKind::Private {
                    return;
                }
                self.on_callback(&id, chat, &from, &data).await;
            }
        }
    }

    async fn run(&self, chat: ChatId, from: &Sender, command: Command) {
        match self.execute(chat, from, &command).await {
            Ok(Some(message)) => self.reply(message).await,
            Ok(None) => {}
            Err(e) => self.report_failure(chat, &command, e).await,
        }
    }

    async fn execute(
        &self,
        chat: ChatId,
        from: &Sender,
        command: &Command,
    ) -> Result<Option<OutgoingMessage>> {
        self.authorize(command, from.id)?;

        let arg = command.arg();
        match command {
            Command::Start | Command::Menu => Ok(Some(self.start_card(chat, from))),
            Command::ReqPair(_) => self.req_pair(chat, command, arg).await,
            Command::DelPair(_) => self.del_pair(chat, command, arg).await,
            Command::AddPrem(_) => self.mutate_entitled(chat, command, arg, true),
            Command::DelPrem(_) => self.mutate_entitled(chat, command, arg, false),
            Command::AddResell(_) => self.mutate_reseller(chat, command, arg, true),
            Command::DelResell(_) => self.mutate_reseller(chat, command, arg, false),
            Command::ListPrem => self.list_entitled(chat).await,
            Command::ListResell => self.list_resellers(chat).await,
            Command::ListUser => self.list_users(chat).await,
        }
    }

    /// Rate limit and role checks.  Denials are [`Error::Unauthorized`]
    /// carrying the reply text.
    fn authorize(&self, command: &Command, id: AdminId) -> Result<()> {
        match command.gate() {
            Gate::Anyone => Ok(()),
            Gate::Entitled => {
                if let Err(limited) = self.limiter.check(id) {
                    tracing::info!(user_id = %id, retry_after_secs = limited.retry_after_secs(), "rate limited");
                    return Err(Error::Unauthorized(format!(
                        "❌ Rate limit exceeded. Try again in {} seconds.",
                        limited.retry_after_secs()
                    )));
                }
                if self.access.is_entitled(id) {
                    Ok(())
                } else {
                    Err(Error::Unauthorized(UNAUTHORIZED.to_string()))
                }
            }
            Gate::Owner if self.access.is_owner(id) => Ok(()),
            Gate::Owner => Err(Error::Unauthorized(
                match command {
                    Command::AddPrem(_) | Command::DelPrem(_) => OWNERS_ONLY,
                    _ => OWNERS_AND_RESELLERS_ONLY,
                }
                .to_string(),
            )),
            Gate::Administrator if self.access.is_administrator(id) => Ok(()),
            Gate::Administrator => Err(Error::Unauthorized(ADMINISTRATORS_ONLY.to_string())),
        }
    }

    async fn reply(&self, message: OutgoingMessage) {
        let chat = message.chat;
        if let Err(e) = self.transport.send(message).await {
            tracing::warn!(chat_id = %chat, error = %e, "reply failed");
        }
    }

    /// Turn a failed command into a reply.  Denials and bad arguments carry
    /// their own text; infrastructure failures get a generic one.
    async fn report_failure(&self, chat: ChatId, command: &Command, err: Error) {
        let name = command.name();
        if err.is_user_facing() {
            tracing::debug!(command = name, chat_id = %chat, error = %err, "command rejected");
        } else if matches!(err, Error::Storage { .. }) {
            tracing::error!(command = name, chat_id = %chat, error = %err, "command failed");
        } else {
            tracing::warn!(command = name, chat_id = %chat, error = %err, "command failed");
        }

        let text = match err {
            Error::Unauthorized(text) | Error::InvalidInput(text) => text,
            Error::Storage { .. } => format!("❌ Failed to process /{name}: Server error."),
            other => format!("❌ Failed to process /{name}: {other}"),
        };
        self.reply(OutgoingMessage::text(chat, text)).await;
    }

    // ── Start card and menus ────────────────────────────────────────

    fn start_card(&self, chat: ChatId, from: &Sender) -> OutgoingMessage {
        let name = match &from.username {
            Some(u) => format!("@{u}"),
            None => from.id.to_string(),
        };
        let status = if self.access.is_entitled(from.id) {
            "Premium"
        } else {
            "No Access"
        };
        let text = format!(
            "┌──────┤ {bot} ├──────┐\n│➻ Name: {name}\n│➻ Status: {status}\n│➻ Sessions: {sessions}\n│➻ Online: {online}\n└────────────────────────┘",
            bot = self.telegram.bot_name,
            sessions = self.sessions.active_count(),
            online = format_uptime(self.started.elapsed().as_secs()),
        );

        let mut rows = vec![vec![
            Button::callback("〢Menu", "menu"),
            Button::callback("〢Misc Menu", "miscmenu"),
        ]];
        if let Some(link) = &self.telegram.channel_invite_link {
            rows.push(vec![Button::url("〢Channel", link)]);
        }
        if let Some(link) = &self.telegram.group_link {
            rows.push(vec![Button::url("〢Group", link)]);
        }
        OutgoingMessage::text(chat, text).with_buttons(rows)
    }

    async fn on_callback(&self, id: &str, chat: ChatId, from: &Sender, data: &str) {
        let (ack, body) = match data {
            "menu" => ("Menu opened ✅", MENU_TEXT),
            "miscmenu" => ("Misc menu ✅", MISC_MENU_TEXT),
            other => {
                tracing::debug!(user_id = %from.id, data = other, "unknown callback");
                return;
            }
        };
        if let Err(e) = self.transport.answer_callback(id, ack).await {
            tracing::warn!(callback_id = id, error = %e, "answering callback failed");
        }
        self.reply(OutgoingMessage::markdown(chat, body)).await;
    }

    // ── Sessions ────────────────────────────────────────────────────

    async fn req_pair(
        &self,
        chat: ChatId,
        command: &Command,
        arg: Option<&str>,
    ) -> Result<Option<OutgoingMessage>> {
        let phone = phone_arg(command, arg)?;

        let text = match self.sessions.initiate(phone.clone(), Some(chat)).await {
            Ok(InitiateOutcome::Started { .. }) | Ok(InitiateOutcome::Abandoned) => {
                format!("⏳ Starting pairing for {phone}...")
            }
            Ok(InitiateOutcome::InFlight(_)) => {
                format!("⏳ Pairing for {phone} is already in progress.")
            }
            Ok(InitiateOutcome::AlreadyOpen) => format!("✅ {phone} is already connected."),
            Err(e @ Error::Network { .. }) => {
                // The requester already got the connect-failure notice.
                tracing::warn!(phone = %phone, chat_id = %chat, error = %e, "pairing start failed");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        Ok(Some(OutgoingMessage::text(chat, text)))
    }

    async fn del_pair(
        &self,
        chat: ChatId,
        command: &Command,
        arg: Option<&str>,
    ) -> Result<Option<OutgoingMessage>> {
        let phone = phone_arg(command, arg)?;

        let text = match self.sessions.terminate(&phone).await {
            Ok(outcome) => {
                tracing::info!(
                    phone = %phone,
                    owner = %outcome.chat,
                    remote_logout = outcome.remote_logout,
                    credentials_removed = outcome.credentials_removed,
                    "session deleted"
                );
                format!("✅ Session for {phone} has been deleted and disconnected.")
            }
            Err(Error::NoActiveSession(_)) => format!("❌ No active session found for {phone}."),
            Err(e) => {
                if matches!(e, Error::Storage { .. }) {
                    tracing::error!(phone = %phone, error = %e, "session deletion failed");
                } else {
                    tracing::warn!(phone = %phone, error = %e, "session deletion failed");
                }
                format!("❌ Failed to delete session for {phone}: {e}")
            }
        };
        Ok(Some(OutgoingMessage::text(chat, text)))
    }

    // ── Access sets ─────────────────────────────────────────────────

    fn mutate_entitled(
        &self,
        chat: ChatId,
        command: &Command,
        arg: Option<&str>,
        add: bool,
    ) -> Result<Option<OutgoingMessage>> {
        let id = user_id_arg(command, arg)?;
        let text = if add {
            match self.access.add_entitled(id)? {
                Membership::Changed => format!("✅ User {id} added to premium."),
                Membership::Unchanged => format!("❌ User {id} is already premium."),
            }
        } else {
            match self.access.remove_entitled(id)? {
                Membership::Changed => format!("✅ User {id} removed from premium."),
                Membership::Unchanged => format!("❌ User {id} is not premium."),
            }
        };
        Ok(Some(OutgoingMessage::text(chat, text)))
    }

    fn mutate_reseller(
        &self,
        chat: ChatId,
        command: &Command,
        arg: Option<&str>,
        add: bool,
    ) -> Result<Option<OutgoingMessage>> {
        let id = user_id_arg(command, arg)?;
        let text = if add {
            match self.access.add_reseller(id)? {
                Membership::Changed => format!("✅ User {id} added as reseller."),
                Membership::Unchanged => format!("❌ User {id} is already a reseller."),
            }
        } else {
            match self.access.remove_reseller(id)? {
                Membership::Changed => format!("✅ User {id} removed from resellers."),
                Membership::Unchanged => format!("❌ User {id} is not a reseller."),
            }
        };
        Ok(Some(OutgoingMessage::text(chat, text)))
    }

    // ── Listings ────────────────────────────────────────────────────

    async fn list_entitled(&self, chat: ChatId) -> Result<Option<OutgoingMessage>> {
        let ids = self.access.entitled();
        if ids.is_empty() {
            return Ok(Some(OutgoingMessage::text(chat, "❌ No premium users found.")));
        }
        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            let name = listing::display_name(self.transport.as_ref(), id).await;
            entries.push(listing::entry(id, &name, None));
        }
        self.send_listing(chat, "Premium Users List", &entries).await
    }

    async fn list_resellers(&self, chat: ChatId) -> Result<Option<OutgoingMessage>> {
        let ids = self.access.resellers();
        if ids.is_empty() {
            return Ok(Some(OutgoingMessage::text(chat, "❌ No resellers found.")));
        }
        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            let name = listing::display_name(self.transport.as_ref(), id).await;
            entries.push(listing::entry(id, &name, None));
        }
        self.send_listing(chat, "Reseller List", &entries).await
    }

    async fn list_users(&self, chat: ChatId) -> Result<Option<OutgoingMessage>> {
        let bindings = self.access.bindings();
        if bindings.is_empty() {
            return Ok(Some(OutgoingMessage::text(
                chat,
                "❌ No users have connected numbers.",
            )));
        }
        let mut entries = Vec::with_capacity(bindings.len());
        for (owner, phone) in bindings {
            let id = AdminId(owner.0);
            let name = listing::display_name(self.transport.as_ref(), id).await;
            entries.push(listing::entry(id, &name, Some(&phone)));
        }
        self.send_listing(chat, "Connected Users", &entries).await
    }

    async fn send_listing(
        &self,
        chat: ChatId,
        title: &str,
        entries: &[String],
    ) -> Result<Option<OutgoingMessage>> {
        let chunks = listing::paginate(title, entries, &self.listing);
        listing::send_chunks(self.transport.as_ref(), chat, chunks, &self.listing).await?;
        Ok(None)
    }
}

// ── Argument helpers ────────────────────────────────────────────────

/// A missing or malformed argument is [`Error::InvalidInput`] carrying the
/// reply text.
fn phone_arg(command: &Command, arg: Option<&str>) -> Result<PhoneNumber> {
    let Some(raw) = arg else {
        return Err(Error::InvalidInput(format!(
            "❌ Provide a phone number.\nExample: /{} +919876543210",
            command.name()
        )));
    };
    PhoneNumber::parse(raw).map_err(|_| Error::InvalidInput(INVALID_PHONE.to_string()))
}

fn user_id_arg(command: &Command, arg: Option<&str>) -> Result<AdminId> {
    let Some(raw) = arg else {
        return Err(Error::InvalidInput(format!(
            "❌ Provide a user ID.\nExample: /{} 123456789",
            command.name()
        )));
    };
    raw.parse::<AdminId>()
        .map_err(|_| Error::InvalidInput(INVALID_USER_ID.to_string()))
}

/// `HH:MM:SS`; hours keep counting past a day.
pub fn format_uptime(secs: u64) -> String {
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
