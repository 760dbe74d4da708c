use std::borrow::Cow;

use regex::{Captures, Regex};
use toolshim_common::RoutingTable;

use crate::error::{TransformError, compile};

/// Maps backend model ids found in JSON response bodies back to client ids.
/// Ids are matched and substituted in their JSON string-escaped form, so a
/// quote or backslash in an id cannot break the surrounding document.
#[derive(Debug, Clone)]
pub struct ModelNameRewriter {
    /// (backend id, client id), both escaped, longest backend id first.
    pairs: Vec<(String, String)>,
    pattern: Option<Regex>,
}

impl ModelNameRewriter {
    pub fn new(routes: &RoutingTable) -> Result<Self, TransformError> {
        Self::from_pairs(routes.reverse_pairs())
    }

    pub fn from_pairs(pairs: Vec<(String, String)>) -> Result<Self, TransformError> {
        let mut pairs: Vec<(String, String)> = pairs
            .into_iter()
            .filter(|(backend, _)| !backend.is_empty())
            .map(|(backend, client)| (json_escaped(&backend), json_escaped(&client)))
            .collect();
        pairs.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        let pattern = if pairs.is_empty() {
            None
        } else {
            let alternation = pairs
                .iter()
                .map(|(backend, _)| regex::escape(backend))
                .collect::<Vec<_>>()
                .join("|");
            Some(compile("model ids", &alternation)?)
        };
        Ok(Self { pairs, pattern })
    }

    fn client_for(&self, backend: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(known, _)| known == backend)
            .map(|(_, client)| client.as_str())
    }

    /// Replaces every known backend id in `body`. The backend id used for the
    /// current request maps to the client id the request named; other ids use
    /// the configured reverse mapping.
    pub fn rewrite<'b>(
        &self,
        body: &'b str,
        request_backend: Option<&str>,
        client_model: &str,
    ) -> Cow<'b, str> {
        let Some(pattern) = self.pattern.as_ref() else {
            return Cow::Borrowed(body);
        };
        let request_backend = request_backend.map(json_escaped);
        let client_model = json_escaped(client_model);
        pattern.replace_all(body, |caps: &Captures<'_>| {
            let found = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            if Some(found) == request_backend.as_deref() {
                return client_model.clone();
            }
            self.client_for(found).unwrap_or(found).to_string()
        })
    }

    pub fn rewrite_bytes(
        &self,
        body: &[u8],
        request_backend: Option<&str>,
        client_model: &str,
    ) -> Vec<u8> {
        let text = String::from_utf8_lossy(body);
        self.rewrite(&text, request_backend, client_model)
            .into_owned()
            .into_bytes()
    }
}

/// `value` as it appears between the quotes of a JSON string.
fn json_escaped(value: &str) -> String {
    match serde_json::to_string(value) {
        Ok(quoted) if quoted.len() >= 2 => quoted[1..quoted.len() - 1].to_string(),
        _ => value.to_string(),
    }
}
