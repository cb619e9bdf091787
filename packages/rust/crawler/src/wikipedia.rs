//! MediaWiki link source.
//!
//! Issues one `action=query&prop=links` request per title and reads a single
//! page of results (`pllimit=max`, article namespace only). Redirects and title
//! normalisation are resolved server-side; the node is still keyed by the title
//! that was requested so that seeds and nodes line up.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use linkgraph_shared::{LinkGraphError, LinkSet, Result, SourceConfig};

use crate::{FetchError, FetchedArticle, LinkSource};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("LinkGraph/", env!("CARGO_PKG_VERSION"));

/// Error codes the API uses for throttling or temporary unavailability.
const TRANSIENT_API_CODES: &[&str] = &["maxlag", "ratelimited", "readonly"];

// ---------------------------------------------------------------------------
// Response shape (formatversion=2)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    query: Option<Query>,
    #[serde(default)]
    error: Option<ApiError>,
    #[serde(default, rename = "continue")]
    continuation: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    #[serde(default)]
    info: String,
}

#[derive(Debug, Deserialize)]
struct Query {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    title: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
    #[serde(default)]
    links: Vec<PageLink>,
}

#[derive(Debug, Deserialize)]
struct PageLink {
    title: String,
}

// ---------------------------------------------------------------------------
// WikipediaClient
// ---------------------------------------------------------------------------

/// [`LinkSource`] backed by a MediaWiki `api.php` endpoint.
pub struct WikipediaClient {
    client: Client,
    api_url: Url,
}

impl WikipediaClient {
    /// Build a client for the configured endpoint.
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let user_agent = config.user_agent.as_deref().unwrap_or(USER_AGENT);
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LinkGraphError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
        })
    }
}

#[async_trait]
impl LinkSource for WikipediaClient {
    #[instrument(skip(self), fields(source = "mediawiki"))]
    async fn fetch(&self, title: &str) -> std::result::Result<FetchedArticle, FetchError> {
        let transient = |message: String| FetchError::Transient {
            title: title.to_string(),
            message,
        };
        let parse = |message: String| FetchError::Parse {
            title: title.to_string(),
            message,
        };

        let response = self
            .client
            .get(self.api_url.clone())
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("formatversion", "2"),
                ("prop", "links"),
                ("pllimit", "max"),
                ("plnamespace", "0"),
                ("redirects", "1"),
                ("titles", title),
            ])
            .send()
            .await
            .map_err(|e| transient(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound {
                title: title.to_string(),
            });
        }
        if is_transient_status(status) {
            return Err(transient(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(parse(format!("unexpected HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| transient(format!("body read failed: {e}")))?;

        let parsed: ApiResponse =
            serde_json::from_str(&body).map_err(|e| parse(format!("invalid JSON: {e}")))?;

        article_from_response(title, parsed)
    }

    fn name(&self) -> &str {
        "mediawiki"
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

/// Interpret a decoded API response for `title`.
fn article_from_response(
    title: &str,
    response: ApiResponse,
) -> std::result::Result<FetchedArticle, FetchError> {
    if let Some(err) = response.error {
        let message = format!("{}: {}", err.code, err.info);
        let transient = TRANSIENT_API_CODES.contains(&err.code.as_str())
            || err.code.starts_with("internal_api_error");
        return Err(if transient {
            FetchError::Transient {
                title: title.to_string(),
                message,
            }
        } else {
            FetchError::Parse {
                title: title.to_string(),
                message,
            }
        });
    }

    let page = response
        .query
        .and_then(|q| q.pages.into_iter().next())
        .ok_or_else(|| FetchError::Parse {
            title: title.to_string(),
            message: "response has no pages".into(),
        })?;

    if page.missing || page.invalid {
        return Err(FetchError::NotFound {
            title: title.to_string(),
        });
    }

    if response.continuation.is_some() {
        debug!(title, "link list truncated to first result page");
    }

    let links: LinkSet = page.links.into_iter().map(|l| l.title).collect();
    Ok(FetchedArticle {
        title: title.to_string(),
        resolved_title: page.title,
        links,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> WikipediaClient {
        let config = SourceConfig {
            api_url: Url::parse(&format!("{}/w/api.php", server.uri())).unwrap(),
            timeout_secs: 5,
            user_agent: None,
        };
        WikipediaClient::new(&config).unwrap()
    }

    #[test]
    fn redirect_keeps_requested_title() {
        let body = r#"{
            "batchcomplete": true,
            "query": {
                "redirects": [{"from": "Rust lang", "to": "Rust (programming language)"}],
                "pages": [{"pageid": 1, "ns": 0, "title": "Rust (programming language)",
                           "links": [{"ns": 0, "title": "Mozilla"}]}]
            }
        }"#;
        let parsed: ApiResponse = serde_json::from_str(body).unwrap();
        let article = article_from_response("Rust lang", parsed).unwrap();
        assert_eq!(article.title, "Rust lang");
        assert_eq!(article.resolved_title, "Rust (programming language)");
        assert!(article.links.contains("Mozilla"));
    }

    #[test]
    fn throttling_error_code_is_transient() {
        let body = r#"{"error": {"code": "maxlag", "info": "Waiting for db: 7 seconds lagged"}}"#;
        let parsed: ApiResponse = serde_json::from_str(body).unwrap();
        let err = article_from_response("A", parsed).unwrap_err();
        assert!(matches!(err, FetchError::Transient { .. }));
    }

    #[tokio::test]
    async fn fetches_links_for_title() {
        let server = MockServer::start().await;
        let body = r#"{
            "batchcomplete": true,
            "query": {"pages": [{"pageid": 7, "ns": 0, "title": "A",
                "links": [{"ns": 0, "title": "B"}, {"ns": 0, "title": "C"}, {"ns": 0, "title": "B"}]}]}
        }"#;

        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("titles", "A"))
            .and(query_param("prop", "links"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let article = client.fetch("A").await.expect("fetch A");
        assert_eq!(article.title, "A");
        let expected: LinkSet = ["B".to_string(), "C".to_string()].into_iter().collect();
        assert_eq!(article.links, expected);
    }

    #[tokio::test]
    async fn article_without_links_has_empty_set() {
        let server = MockServer::start().await;
        Mock::given(path("/w/api.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"query": {"pages": [{"pageid": 3, "ns": 0, "title": "Stub"}]}}"#,
            ))
            .mount(&server)
            .await;

        let article = client_for(&server).await.fetch("Stub").await.unwrap();
        assert!(article.links.is_empty());
    }

    #[tokio::test]
    async fn missing_page_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(path("/w/api.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"query": {"pages": [{"ns": 0, "title": "Nope", "missing": true}]}}"#,
            ))
            .mount(&server)
            .await;

        let err = client_for(&server).await.fetch("Nope").await.unwrap_err();
        assert_eq!(
            err,
            FetchError::NotFound {
                title: "Nope".into()
            }
        );
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(path("/w/api.php"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).await.fetch("A").await.unwrap_err();
        assert!(matches!(err, FetchError::Transient { ref message, .. } if message.contains("503")));
    }

    #[tokio::test]
    async fn garbage_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(path("/w/api.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).await.fetch("A").await.unwrap_err();
        assert!(matches!(err, FetchError::Parse { .. }));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transient() {
        let config = SourceConfig {
            api_url: Url::parse("http://127.0.0.1:9/w/api.php").unwrap(),
            timeout_secs: 2,
            user_agent: None,
        };
        let client = WikipediaClient::new(&config).unwrap();
        let err = client.fetch("A").await.unwrap_err();
        assert!(matches!(err, FetchError::Transient { .. }));
    }
}
