use regex::Regex;
use serde::{Deserialize, Serialize};
use toolshim_common::SearchConfig;
use toolshim_protocol::{Message, Role};

use crate::error::{TransformError, compile};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub source: String,
}

/// Decides when the latest user text needs current information and derives
/// the query sent to the search provider.
#[derive(Debug, Clone)]
pub struct SearchHeuristic {
    triggers: Regex,
    skip: Regex,
    min_chars: usize,
    max_chars: usize,
    min_question_words: usize,
    max_query_chars: usize,
    skip_markers: Vec<String>,
    filler_prefixes: Vec<String>,
}

impl SearchHeuristic {
    pub fn new(config: &SearchConfig) -> Result<Self, TransformError> {
        Ok(Self {
            triggers: compile("search triggers", &config.triggers)?,
            skip: compile("search skip", &config.skip)?,
            min_chars: config.min_chars,
            max_chars: config.max_chars,
            min_question_words: config.min_question_words,
            max_query_chars: config.max_query_chars,
            skip_markers: config.skip_markers.clone(),
            filler_prefixes: config.filler_prefixes.clone(),
        })
    }

    pub fn needs_search(&self, text: &str) -> bool {
        let text = text.trim();
        let chars = text.chars().count();
        if chars < self.min_chars || chars > self.max_chars {
            return false;
        }
        if self
            .skip_markers
            .iter()
            .any(|marker| text.contains(marker.as_str()))
        {
            return false;
        }
        if text.starts_with(['[', '{']) {
            return false;
        }
        if self.skip.is_match(text) {
            return false;
        }
        if self.triggers.is_match(text) {
            return true;
        }
        text.ends_with('?') && text.split_whitespace().count() > self.min_question_words
    }

    /// Strips leading filler phrases and trailing punctuation.
    pub fn derive_query(&self, text: &str) -> String {
        let original = text.trim();
        let mut query = original;
        for prefix in &self.filler_prefixes {
            let head = query.get(..prefix.len());
            if head.is_some_and(|head| head.eq_ignore_ascii_case(prefix)) {
                query = query[prefix.len()..].trim();
            }
        }
        let mut query = query.trim_end_matches(['?', '.', '!']);
        if query.chars().count() < 3 {
            query = original.trim_end_matches(['?', '.', '!']);
        }
        query.chars().take(self.max_query_chars).collect()
    }
}

pub fn render_results(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "[{}] {}\n{}\nSource: {}",
                i + 1,
                hit.title,
                hit.snippet,
                hit.source
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Index and text of the newest user turn.
pub fn last_user_text(messages: &[Message]) -> Option<(usize, &str)> {
    messages
        .iter()
        .enumerate()
        .rev()
        .find(|(_, message)| message.role == Role::User)
        .map(|(idx, message)| (idx, message.first_text().unwrap_or_default()))
}

/// Inserts the results as one system turn right before the newest user turn.
pub fn inject_results(messages: &mut Vec<Message>, hits: &[SearchHit]) -> bool {
    if hits.is_empty() {
        return false;
    }
    let Some((idx, _)) = last_user_text(messages) else {
        return false;
    };
    let context = format!(
        "Web search results for context (use these to answer the user's question accurately):\n\n\
         {}\n\n\
         Use the above search results to provide an accurate, up-to-date answer. Cite sources \
         when relevant. If the results don't fully answer the question, say what you know and \
         note what you couldn't verify.",
        render_results(hits)
    );
    messages.insert(idx, Message::system(context));
    true
}
