//! Search vocabulary and query handling.
//!
//! A query is free text mixed with `command:value` tokens, e.g.
//! `from:alice has:image before:2024-03-01 budget`. [`parse_query`] splits it
//! into [`SearchQueryItem`]s with character cursors for completion, and
//! [`SearchParam::from_items`] turns the items into a search request.
use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Date format accepted by `before:`, `during:` and `after:`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchCommandType {
    User,
    Has,
    Date,
    Channel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchCommand {
    /// Free text.
    #[default]
    #[serde(rename = "")]
    Empty,
    From,
    Mentions,
    Has,
    Before,
    During,
    After,
    In,
}

impl SearchCommand {
    /// Every real command, in menu order.
    pub const ALL: [SearchCommand; 7] = [
        Self::From,
        Self::Mentions,
        Self::Has,
        Self::Before,
        Self::During,
        Self::After,
        Self::In,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "",
            Self::From => "from",
            Self::Mentions => "mentions",
            Self::Has => "has",
            Self::Before => "before",
            Self::During => "during",
            Self::After => "after",
            Self::In => "in",
        }
    }

    /// Parse a command name. Case-insensitive; never yields [`Self::Empty`].
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(name))
    }

    /// What kind of value the command takes.
    pub fn kind(self) -> Option<SearchCommandType> {
        match self {
            Self::Empty => None,
            Self::From | Self::Mentions => Some(SearchCommandType::User),
            Self::Has => Some(SearchCommandType::Has),
            Self::Before | Self::During | Self::After => Some(SearchCommandType::Date),
            Self::In => Some(SearchCommandType::Channel),
        }
    }

    /// Commands whose name starts with `prefix`.
    pub fn completions(prefix: &str) -> Vec<SearchCommand> {
        let prefix = prefix.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .filter(|c| c.as_str().starts_with(&prefix))
            .collect()
    }

    pub fn meta(self) -> Option<SearchCommandMeta> {
        let (title, description) = match self {
            Self::Empty => return None,
            Self::From => ("From a user", "Messages sent by a user"),
            Self::Mentions => ("Mentions a user", "Messages that mention a user"),
            Self::Has => ("Has", "Messages with a link, embed or attachment"),
            Self::Before => ("Before a date", "Messages sent before a date"),
            Self::During => ("During a date", "Messages sent on a date"),
            Self::After => ("After a date", "Messages sent after a date"),
            Self::In => ("In a channel", "Messages posted in a channel"),
        };
        Some(SearchCommandMeta {
            name: self,
            kind: self.kind()?,
            title: title.to_string(),
            description: description.to_string(),
        })
    }
}

impl std::fmt::Display for SearchCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Help-menu entry for a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCommandMeta {
    pub name: SearchCommand,
    #[serde(rename = "type")]
    pub kind: SearchCommandType,
    pub description: String,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchValueHas {
    Link,
    Embed,
    File,
    Video,
    Image,
    Sound,
}

impl SearchValueHas {
    pub const ALL: [SearchValueHas; 6] = [
        Self::Link,
        Self::Embed,
        Self::File,
        Self::Video,
        Self::Image,
        Self::Sound,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::Embed => "embed",
            Self::File => "file",
            Self::Video => "video",
            Self::Image => "image",
            Self::Sound => "sound",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(value))
    }
}

/// One token of a query.
///
/// Cursors are character offsets into the query text, `cursor_end`
/// exclusive. `index` is the token's position in the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQueryItem {
    pub command: SearchCommand,
    pub value: String,
    pub index: usize,
    pub cursor_start: usize,
    pub cursor_end: usize,
}

impl SearchQueryItem {
    /// Whether a caret at `cursor` is inside or touching this token.
    pub fn contains(&self, cursor: usize) -> bool {
        (self.cursor_start..=self.cursor_end).contains(&cursor)
    }
}

/// Split a query into items.
///
/// `name:value` with a known command name becomes a command item (the value
/// may be empty while the user is still typing). Anything else, including
/// unknown `x:y` tokens, is free text.
pub fn parse_query(text: &str) -> Vec<SearchQueryItem> {
    let mut items = Vec::new();
    let mut token = String::new();
    let mut start = 0;

    for (pos, ch) in text.chars().chain(std::iter::once(' ')).enumerate() {
        if ch.is_whitespace() {
            if !token.is_empty() {
                let index = items.len();
                items.push(query_item(std::mem::take(&mut token), index, start, pos));
            }
            start = pos + 1;
        } else {
            token.push(ch);
        }
    }
    items
}

fn query_item(token: String, index: usize, cursor_start: usize, cursor_end: usize) -> SearchQueryItem {
    let parsed = token
        .split_once(':')
        .and_then(|(name, value)| Some((SearchCommand::parse(name)?, value.to_string())));
    let (command, value) = parsed.unwrap_or((SearchCommand::Empty, token));
    SearchQueryItem {
        command,
        value,
        index,
        cursor_start,
        cursor_end,
    }
}

/// The item under the caret, if any.
pub fn item_at_cursor(items: &[SearchQueryItem], cursor: usize) -> Option<&SearchQueryItem> {
    items.iter().find(|item| item.contains(cursor))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchUser {
    pub name: String,
    pub value: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchChannel {
    pub name: String,
    pub value: String,
    pub address: String,
}

/// A completion candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOption {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub key: String,
    pub value: String,
}

impl SearchOption {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: None,
            address: None,
            avatar: None,
            key: key.into(),
            value: value.into(),
        }
    }

    fn matches(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.value.to_lowercase().starts_with(&needle)
            || self
                .name
                .as_deref()
                .is_some_and(|n| n.to_lowercase().starts_with(&needle))
    }
}

impl From<SearchUser> for SearchOption {
    fn from(user: SearchUser) -> Self {
        Self {
            name: Some(user.name),
            address: Some(user.address),
            avatar: user.avatar,
            key: SearchCommandType::User.key().to_string(),
            value: user.value,
        }
    }
}

impl From<SearchChannel> for SearchOption {
    fn from(channel: SearchChannel) -> Self {
        Self {
            name: Some(channel.name),
            address: Some(channel.address),
            avatar: None,
            key: SearchCommandType::Channel.key().to_string(),
            value: channel.value,
        }
    }
}

impl SearchCommandType {
    /// Key used for this kind in a [`SearchRecommend`] map.
    pub fn key(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Has => "has",
            Self::Date => "date",
            Self::Channel => "channel",
        }
    }
}

/// Completion candidates grouped by [`SearchCommandType::key`].
pub type SearchRecommend = BTreeMap<String, Vec<SearchOption>>;

/// Candidates for the value of `item`.
///
/// `has:` completes from the fixed [`SearchValueHas`] set; user and channel
/// commands complete from `known`. Free text and dates get nothing.
pub fn recommend(item: &SearchQueryItem, known: &SearchRecommend) -> Vec<SearchOption> {
    let Some(kind) = item.command.kind() else {
        return Vec::new();
    };
    match kind {
        SearchCommandType::Date => Vec::new(),
        SearchCommandType::Has => SearchValueHas::ALL
            .into_iter()
            .map(|v| SearchOption::new(kind.key(), v.as_str()))
            .filter(|o| o.matches(&item.value))
            .collect(),
        SearchCommandType::User | SearchCommandType::Channel => known
            .get(kind.key())
            .into_iter()
            .flatten()
            .filter(|o| o.matches(&item.value))
            .cloned()
            .collect(),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchResultGroupType {
    #[default]
    Messages,
    Files,
    Channels,
    People,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchOrderType {
    #[default]
    New,
    Old,
    Relevant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchFilterType {
    From,
    Date,
}

impl SearchFilterType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::From => "from",
            Self::Date => "date",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub key: String,
    pub value: String,
}

impl SearchFilter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("{command}: expected a date like 2024-03-01, got {value:?}")]
    InvalidDate { command: SearchCommand, value: String },

    #[error("has: unknown value {0:?}")]
    InvalidHas(String),
}

/// A search request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParam {
    pub query: String,
    pub groupby: SearchResultGroupType,
    pub filters: Vec<SearchFilter>,
    pub orderby: SearchOrderType,
}

impl SearchParam {
    /// Parse `text` into a request with default grouping and ordering.
    pub fn parse(text: &str) -> Result<Self, SearchError> {
        Self::from_items(
            &parse_query(text),
            SearchResultGroupType::default(),
            SearchOrderType::default(),
        )
    }

    /// Build a request from parsed items.
    ///
    /// Free text joins into `query`. `from:` becomes a `from` filter, the
    /// date commands become `date` filters valued `<command>:<YYYY-MM-DD>`,
    /// and the remaining commands filter under their own name. Commands with
    /// no value yet are skipped.
    pub fn from_items(
        items: &[SearchQueryItem],
        groupby: SearchResultGroupType,
        orderby: SearchOrderType,
    ) -> Result<Self, SearchError> {
        let mut words = Vec::new();
        let mut filters = Vec::new();

        for item in items {
            if item.command == SearchCommand::Empty {
                words.push(item.value.as_str());
                continue;
            }
            if item.value.is_empty() {
                debug!(command = %item.command, "skipping command without a value");
                continue;
            }
            let filter = match item.command {
                SearchCommand::Before | SearchCommand::During | SearchCommand::After => {
                    let date = parse_date(item.command, &item.value)?;
                    SearchFilter::new(
                        SearchFilterType::Date.as_str(),
                        format!("{}:{}", item.command, date.format(DATE_FORMAT)),
                    )
                }
                SearchCommand::Has => {
                    let has = SearchValueHas::parse(&item.value)
                        .ok_or_else(|| SearchError::InvalidHas(item.value.clone()))?;
                    SearchFilter::new(item.command.as_str(), has.as_str())
                }
                SearchCommand::From => {
                    SearchFilter::new(SearchFilterType::From.as_str(), item.value.clone())
                }
                _ => SearchFilter::new(item.command.as_str(), item.value.clone()),
            };
            filters.push(filter);
        }

        Ok(Self {
            query: words.join(" "),
            groupby,
            filters,
            orderby,
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn parse_date(command: SearchCommand, value: &str) -> Result<NaiveDate, SearchError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| SearchError::InvalidDate {
        command,
        value: value.to_string(),
    })
}

// ── Results ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPageInfo {
    pub total_rows: u64,
    pub per_page: u64,
    pub page_index: u64,
}

impl SearchPageInfo {
    pub fn page_count(&self) -> u64 {
        if self.per_page == 0 {
            return 0;
        }
        self.total_rows.div_ceil(self.per_page)
    }

    pub fn has_next(&self) -> bool {
        self.page_index + 1 < self.page_count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultUser {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub id: String,
    /// Milliseconds since the Unix epoch.
    pub at: i64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<SearchResultUser>,
}

impl SearchResultItem {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.at)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchData {
    pub page_info: SearchPageInfo,
    pub list: Vec<SearchResultItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub query: String,
    pub recommend: SearchRecommend,
    pub data: SearchData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_round_trip_names() {
        for command in SearchCommand::ALL {
            assert_eq!(SearchCommand::parse(command.as_str()), Some(command));
            assert!(command.meta().is_some());
        }
        assert_eq!(SearchCommand::parse("FROM"), Some(SearchCommand::From));
        assert_eq!(SearchCommand::parse(""), None);
        assert!(SearchCommand::Empty.meta().is_none());
    }

    #[test]
    fn command_kinds() {
        assert_eq!(SearchCommand::Mentions.kind(), Some(SearchCommandType::User));
        assert_eq!(SearchCommand::During.kind(), Some(SearchCommandType::Date));
        assert_eq!(SearchCommand::In.kind(), Some(SearchCommandType::Channel));
        assert_eq!(SearchCommand::Empty.kind(), None);
    }

    #[test]
    fn completions_by_prefix() {
        assert_eq!(SearchCommand::completions("m"), vec![SearchCommand::Mentions]);
        assert_eq!(
            SearchCommand::completions(""),
            SearchCommand::ALL.to_vec()
        );
        assert!(SearchCommand::completions("zz").is_empty());
    }

    #[test]
    fn empty_command_serializes_as_empty_string() {
        let item = SearchQueryItem {
            command: SearchCommand::Empty,
            value: "hello".into(),
            index: 0,
            cursor_start: 0,
            cursor_end: 5,
        };
        let json = serde_json::to_string(&item).unwrap();
        assert_eq!(
            json,
            r#"{"command":"","value":"hello","index":0,"cursorStart":0,"cursorEnd":5}"#
        );
    }

    #[test]
    fn page_info_math() {
        let page = SearchPageInfo { total_rows: 41, per_page: 20, page_index: 1 };
        assert_eq!(page.page_count(), 3);
        assert!(page.has_next());
        let last = SearchPageInfo { page_index: 2, ..page };
        assert!(!last.has_next());
        assert_eq!(SearchPageInfo::default().page_count(), 0);
    }

    #[test]
    fn result_item_timestamp() {
        let item: SearchResultItem =
            serde_json::from_str(r#"{"id":"m1","at":1700000000000,"type":"text"}"#).unwrap();
        assert_eq!(item.kind, "text");
        assert!(item.user.is_none());
        assert_eq!(item.timestamp().unwrap().timestamp(), 1_700_000_000);
    }
}
