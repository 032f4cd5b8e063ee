use http::{header::CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, StatusCode};
use log::{debug, warn};
use serde::{de::DeserializeOwned, Serialize};
use url::Url;

use crate::error::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://getpocket.com";

pub const REQUEST_TOKEN_PATH: &str = "/v3/oauth/request";
pub const ACCESS_TOKEN_PATH: &str = "/v3/oauth/authorize";
pub const GET_PATH: &str = "/v3/get";
pub const AUTHORIZE_PATH: &str = "/auth/authorize";

const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF8";
const X_ACCEPT: &str = "x-accept";
const X_ERROR_CODE: &str = "x-error-code";
const X_ERROR: &str = "x-error";

/// Thin JSON-over-HTTPS client for the Pocket v3 API
///
/// Holds no credentials. Every operation takes the consumer key and any
/// token it needs explicitly, so a handshake can be split across process
/// invocations.
#[derive(Clone)]
pub struct PocketClient {
    http: reqwest::Client,
    base_url: Url,
}

impl PocketClient {
    /// Creates a client whose endpoints all resolve against `base_url`
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: Url::parse(base_url)?,
        })
    }

    /// Resolves a service path against the base URL
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// POSTs `body` as JSON to `path` and decodes the JSON answer
    ///
    /// A non-success status becomes [`Error::Protocol`]; the body of such a
    /// response is never decoded.
    pub(crate) async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        debug!("POST {}", url);

        let response = self
            .http
            .post(url)
            .headers(json_headers())
            .body(serde_json::to_string(body)?)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let err = protocol_error(status, response.headers());
            warn!("{} answered {}", path, status);
            return Err(err);
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    headers.insert(
        HeaderName::from_static(X_ACCEPT),
        HeaderValue::from_static("application/json"),
    );
    headers
}

fn protocol_error(status: StatusCode, headers: &HeaderMap) -> Error {
    Error::Protocol {
        status: status.to_string(),
        code: header_text(headers, X_ERROR_CODE),
        message: header_text(headers, X_ERROR),
    }
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use wiremock::{
        matchers::{body_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    #[test]
    fn endpoints_resolve_against_base_url() {
        let client = PocketClient::with_base_url(DEFAULT_BASE_URL).unwrap();

        assert_eq!(
            client.endpoint(GET_PATH).unwrap().as_str(),
            "https://getpocket.com/v3/get"
        );
        assert_eq!(
            client.endpoint(AUTHORIZE_PATH).unwrap().as_str(),
            "https://getpocket.com/auth/authorize"
        );
    }

    #[test]
    fn reject_bad_base_url() {
        let error = PocketClient::with_base_url("not a url").err().unwrap();
        assert!(matches!(error, Error::Url(_)));
    }

    #[tokio::test]
    async fn post_sends_json_headers_and_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/echo"))
            .and(header("content-type", JSON_CONTENT_TYPE))
            .and(header("x-accept", "application/json"))
            .and(body_json(json!({"foo": "bar"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = PocketClient::with_base_url(&server.uri()).unwrap();
        let value: Value = client
            .post("/v3/echo", &json!({"foo": "bar"}))
            .await
            .unwrap();

        assert_eq!(value, json!({"ok": true}));
    }

    #[tokio::test]
    async fn post_maps_error_headers() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/echo"))
            .respond_with(
                ResponseTemplate::new(400)
                    .insert_header("x-error-code", "138")
                    .insert_header("x-error", "Missing consumer key.")
                    .set_body_json(json!({"ok": true})),
            )
            .mount(&server)
            .await;

        let client = PocketClient::with_base_url(&server.uri()).unwrap();
        let error = client
            .post::<_, Value>("/v3/echo", &json!({}))
            .await
            .unwrap_err();

        match error {
            Error::Protocol {
                status,
                code,
                message,
            } => {
                assert_eq!(status, "400 Bad Request");
                assert_eq!(code.as_deref(), Some("138"));
                assert_eq!(message.as_deref(), Some("Missing consumer key."));
            }
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn post_reports_non_json_body_as_decode_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/echo"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = PocketClient::with_base_url(&server.uri()).unwrap();
        let error = client
            .post::<_, Value>("/v3/echo", &json!({}))
            .await
            .unwrap_err();

        assert!(matches!(error, Error::Decode(_)));
    }
}
