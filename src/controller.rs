//! Conversation handling, independent of the chat transport.
//!
//! The controller turns inbound commands, callbacks and text into
//! [`Action`]s pushed through an [`Outbox`]. The Telegram module supplies
//! the real outbox; tests record actions in a `Vec`.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use html_escape::encode_text;

use crate::data_models::{Category, ResultRecord, SearchRequest};
use crate::search_client::Searcher;
use crate::session::{ConversationState, SessionStore, UserId};

pub const CATEGORY_CALLBACK_PREFIX: &str = "cat_";

pub const EMPTY_QUERY_PROMPT: &str = "Please provide a search term.";
pub const NO_RESULTS_MESSAGE: &str = "❌ No results found. Try a different search term.";
pub const SEARCH_FAILED_MESSAGE: &str = "❌ Search failed. Please try again later.";
pub const CANCELLED_MESSAGE: &str = "Operation cancelled.";
pub const NOTHING_TO_CANCEL_MESSAGE: &str = "Nothing to cancel.";
pub const ERROR_MESSAGE: &str = "❌ An error occurred. Please try again later.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Search,
    Categories,
    Cancel,
    Unknown(String),
}

impl Command {
    /// Parses `/name` or `/name@bot_username`; arguments are ignored.
    pub fn parse(text: &str) -> Option<Command> {
        let first = text.trim().split_whitespace().next()?;
        let name = first.strip_prefix('/')?;
        let name = name.split_once('@').map(|(base, _)| base).unwrap_or(name);
        Some(match name.to_lowercase().as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "search" => Command::Search,
            "categories" => Command::Categories,
            "cancel" => Command::Cancel,
            _ => Command::Unknown(name.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Command(Command),
    Text(String),
    Callback(String),
}

/// One update, reduced to what the conversation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incoming {
    pub user_id: UserId,
    pub first_name: String,
    pub inbound: Inbound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Markup {
    /// One button per row, each reporting `data` back when pressed.
    Choices(Vec<Choice>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub label: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub html: bool,
    pub markup: Option<Markup>,
}

impl OutgoingMessage {
    pub fn plain(text: impl Into<String>) -> OutgoingMessage {
        OutgoingMessage {
            text: text.into(),
            html: false,
            markup: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send a new message to the chat the update came from.
    Send(OutgoingMessage),
    /// Replace the text of the message whose button triggered the callback.
    EditOrigin(String),
}

pub trait Outbox: Send {
    fn deliver(&mut self, action: Action) -> impl Future<Output = Result<()>> + Send;
}

impl Outbox for Vec<Action> {
    async fn deliver(&mut self, action: Action) -> Result<()> {
        self.push(action);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResolution {
    Empty,
    Ready(SearchRequest),
}

/// Works out what to search for from raw user text. An inline
/// `category: query` prefix is only honoured when no category is pinned,
/// and only when the prefix names a known category.
pub fn resolve_query(raw: &str, session_category: Option<Category>) -> QueryResolution {
    let text = raw.trim();
    let mut query = text;
    let mut category = session_category;

    if category.is_none() {
        if let Some((prefix, rest)) = text.split_once(':') {
            if let Some(found) = Category::lookup(prefix) {
                category = Some(found);
                query = rest.trim();
            }
        }
    }

    match SearchRequest::new(query, None) {
        Some(mut request) => {
            request.category = category;
            QueryResolution::Ready(request)
        }
        None => QueryResolution::Empty,
    }
}

/// HTML-formatted listing. Telegram only allows http(s) and tg links on
/// buttons, so the magnet URI goes in the body as copyable code.
pub fn format_record(record: &ResultRecord) -> OutgoingMessage {
    let mut text = format!(
        "🎬 <b>{}</b>\n📦 Size: {}\n🌱 Seeds: {}\n📅 Date: {}",
        encode_text(&record.title),
        encode_text(&record.size),
        encode_text(&record.seeds),
        encode_text(&record.date),
    );
    if let Some(magnet) = &record.magnet_link {
        text.push_str(&format!("\n🧲 <code>{}</code>", encode_text(magnet)));
    }
    OutgoingMessage {
        text,
        html: true,
        markup: None,
    }
}

pub fn greeting(first_name: &str) -> String {
    format!(
        "👋 Hello {first_name}!\n\n\
         I can help you search for torrents on TamilBlasters.\n\n\
         🔍 You can:\n\
         - Send me a search query directly\n\
         - Use /search to start an interactive search\n\
         - Use /categories to browse by category\n\n\
         ⚠️ Note: Always comply with your local laws."
    )
}

pub fn category_keyboard() -> OutgoingMessage {
    let choices = Category::ALL
        .into_iter()
        .map(|c| Choice {
            label: c.label().to_string(),
            data: format!("{CATEGORY_CALLBACK_PREFIX}{}", c.key()),
        })
        .collect();
    OutgoingMessage {
        text: "📚 Select a category to browse:".to_string(),
        html: false,
        markup: Some(Markup::Choices(choices)),
    }
}

pub struct ConversationController<S> {
    searcher: Arc<S>,
    sessions: Arc<SessionStore>,
}

impl<S: Searcher> ConversationController<S> {
    pub fn new(searcher: Arc<S>, sessions: Arc<SessionStore>) -> Self {
        ConversationController { searcher, sessions }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub async fn handle<O: Outbox>(&self, incoming: Incoming, outbox: &mut O) -> Result<()> {
        let user = incoming.user_id;
        match incoming.inbound {
            Inbound::Command(Command::Start) | Inbound::Command(Command::Help) => {
                outbox
                    .deliver(Action::Send(OutgoingMessage::plain(greeting(
                        &incoming.first_name,
                    ))))
                    .await
            }
            Inbound::Command(Command::Search) => {
                self.sessions.await_query(user);
                outbox
                    .deliver(Action::Send(OutgoingMessage::plain(
                        "🔍 What would you like to search for?\n\
                         (You can also specify a category like 'movies: vikram')",
                    )))
                    .await
            }
            Inbound::Command(Command::Categories) => {
                outbox.deliver(Action::Send(category_keyboard())).await
            }
            Inbound::Command(Command::Cancel) => self.cancel(user, outbox).await,
            Inbound::Command(Command::Unknown(name)) => {
                log::debug!("unknown command /{name} from user {user}");
                outbox
                    .deliver(Action::Send(OutgoingMessage::plain(
                        "Unknown command. Use /start to see what I can do.",
                    )))
                    .await
            }
            Inbound::Callback(data) => self.select_category(user, &data, outbox).await,
            Inbound::Text(text) => self.perform_search(user, &text, outbox).await,
        }
    }

    async fn cancel<O: Outbox>(&self, user: UserId, outbox: &mut O) -> Result<()> {
        let previous = self.sessions.reset(user);
        let text = if previous.state == ConversationState::Idle && previous.category.is_none() {
            NOTHING_TO_CANCEL_MESSAGE
        } else {
            CANCELLED_MESSAGE
        };
        outbox.deliver(Action::Send(OutgoingMessage::plain(text))).await
    }

    async fn select_category<O: Outbox>(
        &self,
        user: UserId,
        data: &str,
        outbox: &mut O,
    ) -> Result<()> {
        let Some(category) = data
            .strip_prefix(CATEGORY_CALLBACK_PREFIX)
            .and_then(Category::lookup)
        else {
            log::warn!("ignoring unrecognised callback data {data:?} from user {user}");
            return Ok(());
        };

        self.sessions.pin_category(user, category);
        outbox
            .deliver(Action::EditOrigin(format!(
                "Selected category: {}\n\nNow send me your search query for this category:",
                category.label()
            )))
            .await
    }

    async fn perform_search<O: Outbox>(
        &self,
        user: UserId,
        text: &str,
        outbox: &mut O,
    ) -> Result<()> {
        let session = self.sessions.get(user);
        let request = match resolve_query(text, session.category) {
            QueryResolution::Ready(request) => request,
            QueryResolution::Empty => {
                // direct blank text leaves an idle user idle
                if session.state == ConversationState::AwaitingQuery {
                    self.sessions.await_query(user);
                }
                return outbox
                    .deliver(Action::Send(OutgoingMessage::plain(EMPTY_QUERY_PROMPT)))
                    .await;
            }
        };

        // the pinned category is spent once a search is issued
        self.sessions.reset(user);

        let scope = request
            .category
            .map(|c| format!(" in {c}"))
            .unwrap_or_default();
        outbox
            .deliver(Action::Send(OutgoingMessage::plain(format!(
                "🔍 Searching for '{}'{scope}...",
                request.query
            ))))
            .await?;

        let results = match self.searcher.search(&request.query, request.category).await {
            Ok(results) => results,
            Err(e) => {
                log::debug!("search for {:?} failed: {e}", request.query);
                return outbox
                    .deliver(Action::Send(OutgoingMessage::plain(SEARCH_FAILED_MESSAGE)))
                    .await;
            }
        };

        if results.is_empty() {
            return outbox
                .deliver(Action::Send(OutgoingMessage::plain(NO_RESULTS_MESSAGE)))
                .await;
        }

        for (idx, record) in results.iter().enumerate() {
            if let Err(e) = outbox.deliver(Action::Send(format_record(record))).await {
                log::warn!("failed to send result #{idx} ({:?}): {:#}", record.title, e);
            }
        }

        outbox
            .deliver(Action::Send(OutgoingMessage::plain(format!(
                "✅ Found {} results\n\
                 You can search again or use /categories to browse by category.",
                results.len()
            ))))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parse() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/search@tb_bot"), Some(Command::Search));
        assert_eq!(Command::parse(" /CANCEL now"), Some(Command::Cancel));
        assert_eq!(
            Command::parse("/foo"),
            Some(Command::Unknown("foo".to_string()))
        );
        assert_eq!(Command::parse("vikram"), None);
    }

    #[test]
    fn test_format_record_with_magnet() {
        let record = ResultRecord {
            title: "Vikram <HD>".to_string(),
            magnet_link: Some("magnet:?xt=urn:btih:abc&dn=Vikram".to_string()),
            size: "2.1 GB".to_string(),
            seeds: "154".to_string(),
            date: "2022-07-08".to_string(),
        };
        let message = format_record(&record);
        assert!(message.html);
        assert_eq!(
            message.text,
            "🎬 <b>Vikram &lt;HD&gt;</b>\n📦 Size: 2.1 GB\n🌱 Seeds: 154\n📅 Date: 2022-07-08\n\
             🧲 <code>magnet:?xt=urn:btih:abc&amp;dn=Vikram</code>"
        );
        assert!(message.markup.is_none());
    }

    #[test]
    fn test_format_record_without_magnet_has_no_code_line() {
        let message = format_record(&ResultRecord::default());
        assert!(!message.text.contains("<code>"));
        assert!(message.markup.is_none());
    }

    #[test]
    fn test_category_keyboard_lists_every_category() {
        let message = category_keyboard();
        let Some(Markup::Choices(choices)) = message.markup else {
            panic!("expected choices");
        };
        assert_eq!(choices.len(), Category::ALL.len());
        assert_eq!(choices[0].data, "cat_movies");
        assert_eq!(choices[1].label, "Tv");
    }
}
