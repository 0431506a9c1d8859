//! Provider endpoints and HTTP transport selection.
//!
//! Each provider lists transport options in preference order. The first one
//! whose `maxSize` is larger than the encoded query wins; the last one is the
//! fallback and is expected to have no size limit.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};

use streaming::ProviderKind;

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Characters JavaScript's `encodeURIComponent` leaves as-is.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Percent-encode a URI component (`encodeURIComponent` rules).
pub fn encode_component(s: &str) -> String {
    utf8_percent_encode(s, COMPONENT).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportOption {
    pub method: Method,
    /// Encoded query length this option accepts (exclusive). `None` never
    /// matches on size, so such an option is only used as the fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_prefix: Option<String>,
}

impl TransportOption {
    pub fn get() -> Self {
        Self {
            method: Method::Get,
            max_size: None,
            query_prefix: None,
            body_prefix: None,
        }
    }
}

static FALLBACK: TransportOption = TransportOption {
    method: Method::Get,
    max_size: None,
    query_prefix: None,
    body_prefix: None,
};

/// Pick the transport for a query whose encoded form is `encoded_len` bytes.
///
/// An option qualifies only while the length stays strictly below its
/// `max_size`; a query exactly at the limit falls through to the next one.
pub fn select_transport(options: &[TransportOption], encoded_len: usize) -> Option<&TransportOption> {
    options
        .iter()
        .find(|o| o.max_size.is_some_and(|max| encoded_len < max))
        .or_else(|| options.last())
}

/// A fully built comparison request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
    pub accept: String,
    pub content_type: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderEndpoint {
    pub url: String,
    pub mime_type: String,
    pub methods: Vec<TransportOption>,
}

impl ProviderEndpoint {
    pub fn overpass() -> Self {
        Self {
            url: "https://overpass-api.de/api/interpreter?data=".to_string(),
            mime_type: "application/json".to_string(),
            methods: vec![TransportOption::get()],
        }
    }

    pub fn wikidata() -> Self {
        Self {
            url: "https://query.wikidata.org/sparql".to_string(),
            mime_type: "application/sparql-results+json".to_string(),
            methods: vec![
                TransportOption {
                    method: Method::Get,
                    max_size: Some(2100),
                    query_prefix: Some("?query=".to_string()),
                    body_prefix: None,
                },
                TransportOption {
                    method: Method::Post,
                    max_size: None,
                    query_prefix: None,
                    body_prefix: Some("query=".to_string()),
                },
            ],
        }
    }

    /// Encode `query` and wrap it in a request using the selected transport.
    pub fn request_for(&self, query: &str) -> QueryRequest {
        let encoded = encode_component(query);
        let option = select_transport(&self.methods, encoded.len()).unwrap_or(&FALLBACK);
        match option.method {
            Method::Get => QueryRequest {
                method: Method::Get,
                url: format!(
                    "{}{}{}",
                    self.url,
                    option.query_prefix.as_deref().unwrap_or(""),
                    encoded
                ),
                body: None,
                accept: self.mime_type.clone(),
                content_type: None,
            },
            Method::Post => QueryRequest {
                method: Method::Post,
                url: self.url.clone(),
                body: Some(format!(
                    "{}{}",
                    option.body_prefix.as_deref().unwrap_or(""),
                    encoded
                )),
                accept: self.mime_type.clone(),
                content_type: Some(FORM_CONTENT_TYPE),
            },
        }
    }
}

/// Endpoint configuration for every provider kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderEndpoints {
    pub osm: ProviderEndpoint,
    pub wikidata: ProviderEndpoint,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            osm: ProviderEndpoint::overpass(),
            wikidata: ProviderEndpoint::wikidata(),
        }
    }
}

impl ProviderEndpoints {
    pub fn get(&self, kind: ProviderKind) -> &ProviderEndpoint {
        match kind {
            ProviderKind::Osm => &self.osm,
            ProviderKind::Wikidata => &self.wikidata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn get_then_post() -> Vec<TransportOption> {
        ProviderEndpoint::wikidata().methods
    }

    #[test]
    fn size_threshold_picks_get_then_post() {
        let options = get_then_post();
        assert_eq!(select_transport(&options, 2099).unwrap().method, Method::Get);
        assert_eq!(select_transport(&options, 2101).unwrap().method, Method::Post);
    }

    #[test]
    fn query_at_the_size_limit_is_posted() {
        let options = get_then_post();
        assert_eq!(options[0].max_size, Some(2100));
        assert_eq!(select_transport(&options, 2100).unwrap().method, Method::Post);

        let at_limit = ProviderEndpoint::wikidata().request_for(&"x".repeat(2100));
        assert_eq!(at_limit.method, Method::Post);
    }

    #[test]
    fn unlimited_single_option_is_always_chosen() {
        let options = vec![TransportOption::get()];
        assert_eq!(select_transport(&options, 1_000_000).unwrap().method, Method::Get);
        assert!(select_transport(&[], 10).is_none());
    }

    #[test]
    fn encodes_like_encode_uri_component() {
        assert_eq!(encode_component("a b&c=d"), "a%20b%26c%3Dd");
        assert_eq!(encode_component("-_.!~*'()"), "-_.!~*'()");
        assert_eq!(encode_component("[\"x\"];"), "%5B%22x%22%5D%3B");
        assert_eq!(encode_component("é"), "%C3%A9");
    }

    #[test]
    fn get_request_puts_prefixed_query_in_url() {
        let req = ProviderEndpoint::wikidata().request_for("SELECT *");
        assert_eq!(
            req,
            QueryRequest {
                method: Method::Get,
                url: "https://query.wikidata.org/sparql?query=SELECT%20*".to_string(),
                body: None,
                accept: "application/sparql-results+json".to_string(),
                content_type: None,
            }
        );
    }

    #[test]
    fn long_query_is_posted_as_form_body() {
        let query = "x".repeat(2200);
        let req = ProviderEndpoint::wikidata().request_for(&query);
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.url, "https://query.wikidata.org/sparql");
        assert_eq!(req.body.as_deref(), Some(format!("query={query}").as_str()));
        assert_eq!(req.content_type, Some(FORM_CONTENT_TYPE));
    }

    #[test]
    fn endpoints_parse_with_defaults_for_missing_providers() {
        let eps: ProviderEndpoints = serde_json::from_str(
            r#"{"osm": {"url": "http://localhost/api?data=", "mimeType": "application/json",
                        "methods": [{"method": "GET"}]}}"#,
        )
        .unwrap();
        assert_eq!(eps.get(ProviderKind::Osm).url, "http://localhost/api?data=");
        assert_eq!(eps.get(ProviderKind::Wikidata), &ProviderEndpoint::wikidata());
    }
}
