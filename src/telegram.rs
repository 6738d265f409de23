//! Telegram Bot API transport: long polling, update decoding and the
//! outbox that turns controller actions into API calls.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use dashmap::DashMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;

use crate::controller::{
    Action, Command, ConversationController, ERROR_MESSAGE, Inbound, Incoming, Markup,
    OutgoingMessage, Outbox,
};
use crate::search_client::Searcher;
use crate::session::UserId;

const POLL_TIMEOUT_SECS: u64 = 25;

#[derive(Clone)]
pub struct BotApi {
    client: Client,
    base_url: String,
}

impl BotApi {
    pub fn new(api_url: &str, token: &str) -> Result<BotApi> {
        // long polls must outlive the server-side wait
        let client = Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
            .build()
            .context("Failed to build Telegram HTTP client")?;
        Ok(BotApi {
            client,
            base_url: format!("{}/bot{token}", api_url.trim_end_matches('/')),
        })
    }

    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let body = json!({
            "offset": offset,
            "timeout": POLL_TIMEOUT_SECS,
            "allowed_updates": ["message", "callback_query"],
        });
        self.call("getUpdates", &body)
            .await
            .map(Option::unwrap_or_default)
    }

    pub async fn send_message(&self, chat_id: i64, message: &OutgoingMessage) -> Result<()> {
        let body = SendMessageRequest {
            chat_id,
            text: &message.text,
            parse_mode: message.html.then_some("HTML"),
            disable_web_page_preview: true,
            reply_markup: message.markup.as_ref().map(InlineKeyboardMarkup::from),
        };
        self.call::<_, serde_json::Value>("sendMessage", &body).await?;
        Ok(())
    }

    pub async fn edit_message_text(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()> {
        let body = json!({ "chat_id": chat_id, "message_id": message_id, "text": text });
        self.call::<_, serde_json::Value>("editMessageText", &body)
            .await?;
        Ok(())
    }

    pub async fn answer_callback_query(&self, callback_query_id: &str) -> Result<()> {
        let body = json!({ "callback_query_id": callback_query_id });
        self.call::<_, serde_json::Value>("answerCallbackQuery", &body)
            .await?;
        Ok(())
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{method}", self.base_url);
        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        let payload: TelegramResponse<T> = response
            .json()
            .await
            .with_context(|| format!("telegram {method} returned {status} with unreadable body"))?;
        if !payload.ok {
            let description = payload
                .description
                .unwrap_or_else(|| format!("telegram {method} failed"));
            bail!("{description} ({status})");
        }
        Ok(payload.result)
    }
}

/// Decodes an update into the conversation's terms. Updates with nothing
/// for the bot to act on (stickers, edits, joins) yield `None`.
pub fn to_incoming(update: &Update) -> Option<Incoming> {
    if let Some(message) = &update.message {
        let text = message.text.as_deref()?;
        let from = message.from.as_ref()?;
        let inbound = match Command::parse(text) {
            Some(command) => Inbound::Command(command),
            None => Inbound::Text(text.to_string()),
        };
        return Some(Incoming {
            user_id: from.id,
            first_name: from.first_name.clone(),
            inbound,
        });
    }

    let callback = update.callback_query.as_ref()?;
    Some(Incoming {
        user_id: callback.from.id,
        first_name: callback.from.first_name.clone(),
        inbound: Inbound::Callback(callback.data.clone().unwrap_or_default()),
    })
}

/// User who sent the update, if any.
pub fn sender_of(update: &Update) -> Option<UserId> {
    match (&update.message, &update.callback_query) {
        (Some(message), _) => message.from.as_ref().map(|u| u.id),
        (None, Some(callback)) => Some(callback.from.id),
        (None, None) => None,
    }
}

/// Chat the update belongs to, for replies.
pub fn chat_of(update: &Update) -> Option<i64> {
    update
        .message
        .as_ref()
        .or_else(|| update.callback_query.as_ref()?.message.as_ref())
        .map(|m| m.chat.id)
}

pub struct TelegramOutbox {
    api: BotApi,
    chat_id: i64,
    origin_message_id: Option<i64>,
}

impl TelegramOutbox {
    pub fn new(api: BotApi, chat_id: i64, origin_message_id: Option<i64>) -> TelegramOutbox {
        TelegramOutbox {
            api,
            chat_id,
            origin_message_id,
        }
    }
}

impl Outbox for TelegramOutbox {
    async fn deliver(&mut self, action: Action) -> Result<()> {
        match action {
            Action::Send(message) => self.api.send_message(self.chat_id, &message).await,
            Action::EditOrigin(text) => match self.origin_message_id {
                Some(message_id) => {
                    self.api
                        .edit_message_text(self.chat_id, message_id, &text)
                        .await
                }
                None => {
                    self.api
                        .send_message(self.chat_id, &OutgoingMessage::plain(text))
                        .await
                }
            },
        }
    }
}

/// Handles one update end to end. Any error is logged with the update and
/// answered with an apology; nothing propagates to the polling loop.
pub async fn dispatch<S: Searcher>(
    api: BotApi,
    controller: Arc<ConversationController<S>>,
    update: Update,
) {
    if let Err(e) = try_dispatch(&api, &controller, &update).await {
        log::error!("update {:?} caused error: {:#}", update, e);
        if let Some(chat_id) = chat_of(&update) {
            let apology = OutgoingMessage::plain(ERROR_MESSAGE);
            if let Err(e) = api.send_message(chat_id, &apology).await {
                log::error!("failed to send error reply to chat {chat_id}: {:#}", e);
            }
        }
    }
}

async fn try_dispatch<S: Searcher>(
    api: &BotApi,
    controller: &ConversationController<S>,
    update: &Update,
) -> Result<()> {
    if let Some(callback) = &update.callback_query {
        api.answer_callback_query(&callback.id).await?;
    }

    let Some(incoming) = to_incoming(update) else {
        log::debug!("ignoring update {}", update.update_id);
        return Ok(());
    };
    let Some(chat_id) = chat_of(update) else {
        log::debug!("update {} has no chat to reply to", update.update_id);
        return Ok(());
    };
    let origin = update
        .callback_query
        .as_ref()
        .and_then(|c| c.message.as_ref())
        .map(|m| m.message_id);

    let mut outbox = TelegramOutbox::new(api.clone(), chat_id, origin);
    controller.handle(incoming, &mut outbox).await
}

/// Feeds each sender's updates, in arrival order, to a worker task of its
/// own. Different senders are handled concurrently.
pub struct UpdateRouter<S> {
    api: BotApi,
    controller: Arc<ConversationController<S>>,
    queues: DashMap<UserId, mpsc::UnboundedSender<Update>>,
}

impl<S: Searcher + 'static> UpdateRouter<S> {
    pub fn new(api: BotApi, controller: Arc<ConversationController<S>>) -> Self {
        UpdateRouter {
            api,
            controller,
            queues: DashMap::new(),
        }
    }

    pub fn route(&self, update: Update) {
        let Some(user) = sender_of(&update) else {
            tokio::spawn(dispatch(self.api.clone(), self.controller.clone(), update));
            return;
        };

        let mut queue = self
            .queues
            .entry(user)
            .or_insert_with(|| self.spawn_worker(user));
        if let Err(mpsc::error::SendError(update)) = queue.send(update) {
            log::warn!("worker for user {user} is gone, starting a new one");
            *queue = self.spawn_worker(user);
            if queue.send(update).is_err() {
                log::error!("dropping update for user {user}: worker exited immediately");
            }
        }
    }

    fn spawn_worker(&self, user: UserId) -> mpsc::UnboundedSender<Update> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Update>();
        let api = self.api.clone();
        let controller = self.controller.clone();
        tokio::spawn(async move {
            log::debug!("worker for user {user} started");
            while let Some(update) = rx.recv().await {
                dispatch(api.clone(), controller.clone(), update).await;
            }
        });
        tx
    }
}

/// How long the polling loop waits after a failed `getUpdates`.
#[derive(Debug, Clone, Copy)]
pub struct PollBackoff {
    pub retry: Duration,
    /// Used on 409, when another instance holds the long poll.
    pub conflict: Duration,
}

impl Default for PollBackoff {
    fn default() -> Self {
        PollBackoff {
            retry: Duration::from_secs(5),
            conflict: Duration::from_secs(15),
        }
    }
}

/// Long-poll forever with the default backoff.
pub async fn run<S: Searcher + 'static>(
    api: BotApi,
    controller: Arc<ConversationController<S>>,
) -> Result<()> {
    run_with_backoff(api, controller, PollBackoff::default()).await
}

pub async fn run_with_backoff<S: Searcher + 'static>(
    api: BotApi,
    controller: Arc<ConversationController<S>>,
    backoff: PollBackoff,
) -> Result<()> {
    let router = UpdateRouter::new(api.clone(), controller);
    let mut offset: i64 = 0;
    log::info!("bot started, polling for updates");

    loop {
        let updates = match api.get_updates(offset).await {
            Ok(updates) => updates,
            Err(e) => {
                let msg = format!("{:#}", e);
                if msg.contains("409") {
                    log::warn!(
                        "another bot instance is polling; retrying in {}ms",
                        backoff.conflict.as_millis()
                    );
                    tokio::time::sleep(backoff.conflict).await;
                } else {
                    log::error!(
                        "getUpdates error: {msg}; retrying in {}ms",
                        backoff.retry.as_millis()
                    );
                    tokio::time::sleep(backoff.retry).await;
                }
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            router.route(update);
        }
    }
}

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    disable_web_page_preview: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup>,
}

#[derive(Debug, Serialize, PartialEq)]
struct InlineKeyboardMarkup {
    inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Serialize, PartialEq)]
struct InlineKeyboardButton {
    text: String,
    callback_data: String,
}

impl From<&Markup> for InlineKeyboardMarkup {
    fn from(markup: &Markup) -> Self {
        let rows = match markup {
            Markup::Choices(choices) => choices
                .iter()
                .map(|c| {
                    vec![InlineKeyboardButton {
                        text: c.label.clone(),
                        callback_data: c.data.clone(),
                    }]
                })
                .collect(),
        };
        InlineKeyboardMarkup {
            inline_keyboard: rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::Choice;

    fn update(value: serde_json::Value) -> Update {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_text_message_becomes_text() {
        let u = update(json!({
            "update_id": 10,
            "message": {
                "message_id": 1,
                "chat": { "id": 500 },
                "from": { "id": 7, "first_name": "Asha" },
                "text": "movies: vikram"
            }
        }));
        let incoming = to_incoming(&u).unwrap();
        assert_eq!(incoming.user_id, 7);
        assert_eq!(incoming.first_name, "Asha");
        assert_eq!(incoming.inbound, Inbound::Text("movies: vikram".to_string()));
        assert_eq!(chat_of(&u), Some(500));
    }

    #[test]
    fn test_command_with_mention_is_parsed() {
        let u = update(json!({
            "update_id": 11,
            "message": {
                "message_id": 2,
                "chat": { "id": 500 },
                "from": { "id": 7, "first_name": "Asha" },
                "text": "/categories@tb_bot"
            }
        }));
        assert_eq!(
            to_incoming(&u).unwrap().inbound,
            Inbound::Command(Command::Categories)
        );
    }

    #[test]
    fn test_callback_query_uses_origin_chat() {
        let u = update(json!({
            "update_id": 12,
            "callback_query": {
                "id": "cb-1",
                "from": { "id": 7, "first_name": "Asha" },
                "message": { "message_id": 99, "chat": { "id": 501 } },
                "data": "cat_tv"
            }
        }));
        let incoming = to_incoming(&u).unwrap();
        assert_eq!(incoming.inbound, Inbound::Callback("cat_tv".to_string()));
        assert_eq!(chat_of(&u), Some(501));
    }

    #[test]
    fn test_sender_of() {
        let message = update(json!({
            "update_id": 14,
            "message": { "message_id": 4, "chat": { "id": 500 }, "from": { "id": 7 }, "text": "x" }
        }));
        assert_eq!(sender_of(&message), Some(7));

        let anonymous = update(json!({
            "update_id": 15,
            "message": { "message_id": 5, "chat": { "id": 500 }, "text": "x" }
        }));
        assert_eq!(sender_of(&anonymous), None);

        let callback = update(json!({
            "update_id": 16,
            "callback_query": { "id": "cb", "from": { "id": 9 }, "data": "cat_tv" }
        }));
        assert_eq!(sender_of(&callback), Some(9));
    }

    #[test]
    fn test_non_text_message_is_ignored() {
        let u = update(json!({
            "update_id": 13,
            "message": {
                "message_id": 3,
                "chat": { "id": 500 },
                "from": { "id": 7, "first_name": "Asha" }
            }
        }));
        assert!(to_incoming(&u).is_none());
    }

    #[test]
    fn test_markup_serialization() {
        let choices = InlineKeyboardMarkup::from(&Markup::Choices(vec![
            Choice {
                label: "Movies".to_string(),
                data: "cat_movies".to_string(),
            },
            Choice {
                label: "Tv".to_string(),
                data: "cat_tv".to_string(),
            },
        ]));
        assert_eq!(
            serde_json::to_value(&choices).unwrap(),
            json!({ "inline_keyboard": [
                [{ "text": "Movies", "callback_data": "cat_movies" }],
                [{ "text": "Tv", "callback_data": "cat_tv" }]
            ] })
        );
    }
}
