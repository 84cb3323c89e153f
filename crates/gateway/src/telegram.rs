//! Telegram adapter on top of teloxide: long polling in, Bot API calls out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use teloxide::dispatching::{Dispatcher as UpdateDispatcher, UpdateFilterExt};
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::payloads::{AnswerCallbackQuerySetters, SendMessageSetters};
use teloxide::requests::{Requester, ResponseResult};
use teloxide::types::{
    AllowedUpdate, CallbackQuery, CallbackQueryId, Chat, InlineKeyboardButton,
    InlineKeyboardMarkup, Message, ParseMode, Update, User,
};
use teloxide::update_listeners::Polling;
use teloxide::utils::command::BotCommands;
use teloxide::{dptree, Bot};
use tokio_util::sync::CancellationToken;
use url::Url;

use pb_domain::config::TelegramConfig;
use pb_domain::error::{Error, Result};
use pb_domain::{AdminId, ChatId};

use crate::dispatch::{Command, Dispatcher};
use crate::transport::{AdminTransport, Button, ButtonAction, ChatKind, Inbound, OutgoingMessage, Sender};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Legacy Markdown keeps `*bold*` working in the fixed reply texts.
#[allow(deprecated)]
const LEGACY_MARKDOWN: ParseMode = ParseMode::Markdown;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct TelegramTransport {
    bot: Bot,
    poll_timeout: Duration,
}

impl TelegramTransport {
    pub fn new(config: &TelegramConfig, token: &str) -> Result<Self> {
        let poll_timeout = Duration::from_secs(config.poll_timeout_secs);
        // Leave headroom over the long-poll timeout so the server answers first.
        let client = teloxide::net::default_reqwest_settings()
            .timeout(poll_timeout + Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Transport(format!("building HTTP client: {e}")))?;

        let mut bot = Bot::with_client(token, client);
        let api_base = config.api_base.trim_end_matches('/');
        if api_base != DEFAULT_API_BASE {
            let url = Url::parse(api_base)
                .map_err(|e| Error::Config(format!("telegram.api_base {api_base:?}: {e}")))?;
            bot = bot.set_api_url(url);
        }

        Ok(Self { bot, poll_timeout })
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    /// The bot's `@username`, used to accept `/cmd@username`.
    pub async fn identify(&self) -> Result<String> {
        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| Error::Transport(format!("getMe: {e}")))?;
        Ok(me.username().to_owned())
    }

    /// Publish the command list shown in the client's command menu.
    pub async fn register_commands(&self) -> Result<()> {
        self.bot
            .set_my_commands(Command::bot_commands())
            .await
            .map_err(|e| Error::Transport(format!("setMyCommands: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl AdminTransport for TelegramTransport {
    async fn send(&self, message: OutgoingMessage) -> Result<()> {
        let mut request = self
            .bot
            .send_message(teloxide::types::ChatId(message.chat.0), message.text);
        if message.markdown {
            request = request.parse_mode(LEGACY_MARKDOWN);
        }
        if !message.buttons.is_empty() {
            request = request.reply_markup(keyboard(&message.buttons)?);
        }
        request
            .await
            .map_err(|e| Error::Transport(format!("sendMessage: {e}")))?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<()> {
        self.bot
            .answer_callback_query(CallbackQueryId(callback_id.to_string()))
            .text(text)
            .await
            .map_err(|e| Error::Transport(format!("answerCallbackQuery: {e}")))?;
        Ok(())
    }

    async fn username_of(&self, id: AdminId) -> Result<Option<String>> {
        let chat = self
            .bot
            .get_chat(teloxide::types::ChatId(id.0))
            .await
            .map_err(|e| Error::Transport(format!("getChat: {e}")))?;
        Ok(chat.username().map(str::to_owned))
    }
}

/// Convert button rows into an inline keyboard.
fn keyboard(rows: &[Vec<Button>]) -> Result<InlineKeyboardMarkup> {
    let rows = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| match &b.action {
                    ButtonAction::Callback(data) => {
                        Ok(InlineKeyboardButton::callback(b.label.clone(), data.clone()))
                    }
                    ButtonAction::Url(raw) => Url::parse(raw)
                        .map(|url| InlineKeyboardButton::url(b.label.clone(), url))
                        .map_err(|e| Error::Transport(format!("button {:?} url {raw:?}: {e}", b.label))),
                })
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(InlineKeyboardMarkup::new(rows))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inbound
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Text messages with a sender; everything else yields `None`.
pub fn inbound_from_message(msg: &Message) -> Option<Inbound> {
    let from = msg.from.as_ref()?;
    let text = msg.text()?;
    Some(Inbound::Message {
        chat: ChatId(msg.chat.id.0),
        kind: chat_kind(&msg.chat),
        from: sender(from),
        text: text.to_owned(),
    })
}

/// Button presses on a message we can still see.
pub fn inbound_from_callback(query: &CallbackQuery) -> Option<Inbound> {
    let chat = query.message.as_ref()?.chat();
    Some(Inbound::Callback {
        id: query.id.to_string(),
        chat: ChatId(chat.id.0),
        kind: chat_kind(chat),
        from: sender(&query.from),
        data: query.data.clone().unwrap_or_default(),
    })
}

fn chat_kind(chat: &Chat) -> ChatKind {
    if chat.is_private() {
        ChatKind::Private
    } else {
        ChatKind::Shared
    }
}

fn sender(user: &User) -> Sender {
    Sender {
        id: AdminId(user.id.0 as i64),
        username: user.username.clone(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Polling
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn on_message(msg: Message, dispatcher: Arc<Dispatcher>) -> ResponseResult<()> {
    if let Some(inbound) = inbound_from_message(&msg) {
        dispatcher.handle(inbound).await;
    }
    Ok(())
}

async fn on_callback_query(query: CallbackQuery, dispatcher: Arc<Dispatcher>) -> ResponseResult<()> {
    if let Some(inbound) = inbound_from_callback(&query) {
        dispatcher.handle(inbound).await;
    }
    Ok(())
}

/// Long-poll until `shutdown`.  Updates are not serialized per chat, so
/// one slow command never holds up the next.  Poll failures are logged and
/// retried by the listener.
pub async fn run_polling(
    transport: Arc<TelegramTransport>,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) {
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(on_message))
        .branch(Update::filter_callback_query().endpoint(on_callback_query));

    let mut updates = UpdateDispatcher::builder(transport.bot.clone(), handler)
        .dependencies(dptree::deps![dispatcher])
        .distribution_function(|_| None::<std::convert::Infallible>)
        .build();

    let token = updates.shutdown_token();
    let stopper = tokio::spawn(async move {
        shutdown.cancelled().await;
        match token.shutdown() {
            Ok(done) => done.await,
            Err(e) => tracing::debug!(error = ?e, "dispatcher was idle at shutdown"),
        }
    });

    let polling = Polling::builder(transport.bot.clone())
        .timeout(transport.poll_timeout)
        .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery])
        .build();

    tracing::info!(poll_timeout_secs = transport.poll_timeout.as_secs(), "telegram polling started");
    updates
        .dispatch_with_listener(
            polling,
            LoggingErrorHandler::with_custom_text("Telegram polling error (will retry)"),
        )
        .await;
    stopper.abort();
    tracing::info!("telegram polling stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::{InlineKeyboardButtonKind, UpdateKind};

    fn update(raw: &str) -> Update {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn private_message_becomes_inbound() {
        let u = update(
            r#"{
                "update_id": 10,
                "message": {
                    "message_id": 1,
                    "date": 1700000000,
                    "chat": {"id": 2002, "type": "private", "first_name": "A", "username": "alice"},
                    "from": {"id": 2002, "is_bot": false, "first_name": "A", "username": "alice"},
                    "text": "/reqpair +15551234567"
                }
            }"#,
        );
        let UpdateKind::Message(msg) = &u.kind else {
            panic!("not a message: {:?}", u.kind);
        };
        assert_eq!(
            inbound_from_message(msg),
            Some(Inbound::Message {
                chat: ChatId(2002),
                kind: ChatKind::Private,
                from: Sender {
                    id: AdminId(2002),
                    username: Some("alice".into()),
                },
                text: "/reqpair +15551234567".into(),
            })
        );
    }

    #[test]
    fn supergroup_callback_is_shared() {
        let u = update(
            r#"{
                "update_id": 11,
                "callback_query": {
                    "id": "cb1",
                    "from": {"id": 7, "is_bot": false, "first_name": "B"},
                    "message": {
                        "message_id": 5,
                        "date": 1700000000,
                        "chat": {"id": -1001234, "type": "supergroup", "title": "G"},
                        "from": {"id": 99, "is_bot": true, "first_name": "Bot", "username": "PairBridgeBot"},
                        "text": "card"
                    },
                    "chat_instance": "ci",
                    "data": "menu"
                }
            }"#,
        );
        let UpdateKind::CallbackQuery(query) = &u.kind else {
            panic!("not a callback: {:?}", u.kind);
        };
        match inbound_from_callback(query) {
            Some(Inbound::Callback { id, kind, from, data, .. }) => {
                assert_eq!(id, "cb1");
                assert_eq!(kind, ChatKind::Shared);
                assert_eq!(from.id, AdminId(7));
                assert_eq!(data, "menu");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_text_message_is_skipped() {
        let u = update(
            r#"{
                "update_id": 12,
                "message": {
                    "message_id": 2,
                    "date": 1700000000,
                    "chat": {"id": 1, "type": "private", "first_name": "A"},
                    "from": {"id": 1, "is_bot": false, "first_name": "A"},
                    "location": {"latitude": 52.52, "longitude": 13.40}
                }
            }"#,
        );
        let UpdateKind::Message(msg) = &u.kind else {
            panic!("not a message: {:?}", u.kind);
        };
        assert!(inbound_from_message(msg).is_none());
    }

    #[test]
    fn keyboard_keeps_rows_and_actions() {
        let markup = keyboard(&[
            vec![Button::callback("Menu", "menu"), Button::callback("Misc", "miscmenu")],
            vec![Button::url("Channel", "https://t.me/x")],
        ])
        .unwrap();
        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[0][0].text, "Menu");
        assert!(matches!(
            &markup.inline_keyboard[0][1].kind,
            InlineKeyboardButtonKind::CallbackData(d) if d == "miscmenu"
        ));
        assert!(matches!(
            &markup.inline_keyboard[1][0].kind,
            InlineKeyboardButtonKind::Url(u) if u.as_str() == "https://t.me/x"
        ));
    }

    #[test]
    fn keyboard_rejects_bad_url() {
        let err = keyboard(&[vec![Button::url("Group", "not a url")]]).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[test]
    fn custom_api_base_is_accepted() {
        let config = TelegramConfig {
            api_base: "http://127.0.0.1:8081/".into(),
            ..Default::default()
        };
        let transport = TelegramTransport::new(&config, "123:abc").unwrap();
        assert_eq!(transport.bot().api_url().as_str(), "http://127.0.0.1:8081/");
    }

    #[test]
    fn malformed_api_base_is_config_error() {
        let config = TelegramConfig {
            api_base: "::nope".into(),
            ..Default::default()
        };
        assert!(matches!(
            TelegramTransport::new(&config, "123:abc"),
            Err(Error::Config(_))
        ));
    }
}
