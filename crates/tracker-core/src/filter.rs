//! Filter and search over the canonical message list
//!
//! Three independent predicates narrow the list in order: read status,
//! source, then free text. The derivation is pure and keeps the relative
//! order of the input.

use crate::message::{Message, Source};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Read-status predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Unread,
    Read,
}

impl StatusFilter {
    pub fn matches(&self, message: &Message) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Unread => !message.is_read,
            StatusFilter::Read => message.is_read,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StatusFilter::All => "All Messages",
            StatusFilter::Unread => "Unread",
            StatusFilter::Read => "Read",
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(StatusFilter::All),
            "unread" => Ok(StatusFilter::Unread),
            "read" => Ok(StatusFilter::Read),
            other => Err(format!("unknown status filter: {}", other)),
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusFilter::All => "all",
            StatusFilter::Unread => "unread",
            StatusFilter::Read => "read",
        };
        f.write_str(s)
    }
}

/// Source predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFilter {
    #[default]
    All,
    Arbor,
    Gmail,
}

impl SourceFilter {
    pub fn matches(&self, message: &Message) -> bool {
        match self {
            SourceFilter::All => true,
            SourceFilter::Arbor => message.source == Source::Arbor,
            SourceFilter::Gmail => message.source == Source::Gmail,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SourceFilter::All => "All Sources",
            SourceFilter::Arbor => "Arbor",
            SourceFilter::Gmail => "Gmail",
        }
    }
}

impl FromStr for SourceFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(SourceFilter::All),
            "arbor" => Ok(SourceFilter::Arbor),
            "gmail" => Ok(SourceFilter::Gmail),
            other => Err(format!("unknown source filter: {}", other)),
        }
    }
}

impl fmt::Display for SourceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceFilter::All => "all",
            SourceFilter::Arbor => "arbor",
            SourceFilter::Gmail => "gmail",
        };
        f.write_str(s)
    }
}

/// Check whether a message matches a free-text query.
///
/// Case-insensitive substring match over subject, sender name and content.
/// An empty query matches everything; absent fields never match.
pub fn matches_query(message: &Message, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    let needle = query.to_lowercase();
    let contains = |text: &str| text.to_lowercase().contains(&needle);

    contains(message.subject.as_str())
        || message.sender_name.as_deref().is_some_and(contains)
        || message.content.as_deref().is_some_and(contains)
}

/// The three view predicates held by the presentation layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewFilter {
    pub status: StatusFilter,
    pub source: SourceFilter,
    pub query: String,
}

impl ViewFilter {
    pub fn new(status: StatusFilter, source: SourceFilter, query: impl Into<String>) -> Self {
        Self {
            status,
            source,
            query: query.into(),
        }
    }

    pub fn matches(&self, message: &Message) -> bool {
        self.status.matches(message)
            && self.source.matches(message)
            && matches_query(message, &self.query)
    }

    /// Derive the view list from the canonical list
    pub fn apply<'a>(&self, messages: &'a [Message]) -> Vec<&'a Message> {
        filter_messages(messages, self.status, self.source, &self.query)
    }
}

/// Derive the view list: status, then source, then text; all must pass.
pub fn filter_messages<'a>(
    messages: &'a [Message],
    status: StatusFilter,
    source: SourceFilter,
    query: &str,
) -> Vec<&'a Message> {
    messages
        .iter()
        .filter(|m| status.matches(m))
        .filter(|m| source.matches(m))
        .filter(|m| matches_query(m, query))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::fixtures::message;
    use crate::message::MessageId;
    use std::collections::HashSet;

    fn sample() -> Vec<Message> {
        let mut list = Vec::new();

        let mut m = message(1, 50);
        m.subject = "Field Trip".to_string();
        list.push(m);

        let mut m = message(2, 40);
        m.is_read = true;
        m.source = Source::Gmail;
        m.sender_name = Some("Coach Patel".to_string());
        list.push(m);

        let mut m = message(3, 30);
        m.source = Source::Gmail;
        m.content = Some("Bring a packed lunch for the field day".to_string());
        list.push(m);

        let mut m = message(4, 20);
        m.is_read = true;
        m.sender_name = None;
        m.content = None;
        list.push(m);

        list
    }

    fn ids(view: &[&Message]) -> Vec<MessageId> {
        view.iter().map(|m| m.id.clone()).collect()
    }

    #[test]
    fn test_unread_preserves_order() {
        let list = sample();
        let view = filter_messages(&list, StatusFilter::Unread, SourceFilter::All, "");
        assert_eq!(ids(&view), vec![MessageId::from(1), MessageId::from(3)]);
        assert!(view.iter().all(|m| !m.is_read));
    }

    #[test]
    fn test_read_and_source() {
        let list = sample();
        let view = filter_messages(&list, StatusFilter::Read, SourceFilter::All, "");
        assert_eq!(ids(&view), vec![MessageId::from(2), MessageId::from(4)]);

        let view = filter_messages(&list, StatusFilter::All, SourceFilter::Gmail, "");
        assert_eq!(ids(&view), vec![MessageId::from(2), MessageId::from(3)]);

        let view = filter_messages(&list, StatusFilter::All, SourceFilter::Arbor, "");
        assert_eq!(ids(&view), vec![MessageId::from(1), MessageId::from(4)]);
    }

    #[test]
    fn test_search_case_insensitive() {
        let list = sample();
        let view = filter_messages(&list, StatusFilter::All, SourceFilter::All, "field");
        assert_eq!(ids(&view), vec![MessageId::from(1), MessageId::from(3)]);

        let view = filter_messages(&list, StatusFilter::All, SourceFilter::All, "PATEL");
        assert_eq!(ids(&view), vec![MessageId::from(2)]);
    }

    #[test]
    fn test_search_missing_fields_do_not_match() {
        let list = sample();
        // Message 4 has neither sender name nor content
        let view = filter_messages(&list, StatusFilter::All, SourceFilter::All, "sender 4");
        assert!(view.is_empty());
        let view = filter_messages(&list, StatusFilter::All, SourceFilter::All, "subject 4");
        assert_eq!(ids(&view), vec![MessageId::from(4)]);
    }

    #[test]
    fn test_composition_equals_intersection() {
        let list = sample();
        let statuses = [StatusFilter::All, StatusFilter::Unread, StatusFilter::Read];
        let sources = [SourceFilter::All, SourceFilter::Arbor, SourceFilter::Gmail];
        let queries = ["", "field", "sender", "zzz"];

        for status in statuses {
            for source in sources {
                for query in queries {
                    let combined: HashSet<MessageId> =
                        ids(&filter_messages(&list, status, source, query))
                            .into_iter()
                            .collect();

                    let a: HashSet<MessageId> =
                        ids(&filter_messages(&list, status, SourceFilter::All, ""))
                            .into_iter()
                            .collect();
                    let b: HashSet<MessageId> =
                        ids(&filter_messages(&list, StatusFilter::All, source, ""))
                            .into_iter()
                            .collect();
                    let c: HashSet<MessageId> = ids(&filter_messages(
                        &list,
                        StatusFilter::All,
                        SourceFilter::All,
                        query,
                    ))
                    .into_iter()
                    .collect();

                    let expected: HashSet<MessageId> =
                        a.iter().filter(|id| b.contains(id) && c.contains(id)).cloned().collect();
                    assert_eq!(combined, expected, "{} {} {:?}", status, source, query);
                }
            }
        }
    }

    #[test]
    fn test_idempotent() {
        let list = sample();
        let filter = ViewFilter::new(StatusFilter::Unread, SourceFilter::Gmail, "field");
        let once: Vec<Message> = filter.apply(&list).into_iter().cloned().collect();
        let twice: Vec<Message> = filter.apply(&once).into_iter().cloned().collect();
        assert_eq!(once, twice);
        assert!(filter.matches(&list[2]));
    }

    #[test]
    fn test_parse_filters() {
        assert_eq!("Unread".parse::<StatusFilter>(), Ok(StatusFilter::Unread));
        assert_eq!("gmail".parse::<SourceFilter>(), Ok(SourceFilter::Gmail));
        assert!("spam".parse::<SourceFilter>().is_err());
    }
}
