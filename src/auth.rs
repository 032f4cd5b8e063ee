use log::debug;
use serde::{Deserialize, Serialize};

use crate::client::{PocketClient, ACCESS_TOKEN_PATH, AUTHORIZE_PATH, REQUEST_TOKEN_PATH};
use crate::error::Result;

/// The first leg of the handshake
///
/// `authorization_url` is never sent by the service; it is built locally from
/// the returned code and the redirect URI that was sent with the request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestToken {
    pub code: String,
    /// Echo of the state sent with the request, if any
    pub state: Option<String>,
    pub authorization_url: String,
}

/// The terminal artifact of the handshake
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccessToken {
    #[serde(rename = "access_token")]
    pub token: String,
    pub username: String,
}

#[derive(Serialize)]
struct RequestTokenBody<'a> {
    consumer_key: &'a str,
    redirect_uri: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
}

#[derive(Deserialize)]
struct RequestTokenResponse {
    code: String,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Serialize)]
struct AccessTokenBody<'a> {
    consumer_key: &'a str,
    code: &'a str,
}

impl PocketClient {
    /// Obtains a request token and the URL the user must visit to authorize it
    pub async fn fetch_request_token(
        &self,
        consumer_key: &str,
        redirect_uri: &str,
        state: Option<&str>,
    ) -> Result<RequestToken> {
        let body = RequestTokenBody {
            consumer_key,
            redirect_uri,
            state,
        };

        let response: RequestTokenResponse = self.post(REQUEST_TOKEN_PATH, &body).await?;
        let authorization_url = self.authorization_url(&response.code, redirect_uri)?;
        debug!("obtained request token");

        Ok(RequestToken {
            code: response.code,
            state: response.state,
            authorization_url,
        })
    }

    /// Exchanges an authorized request token for an access token
    pub async fn fetch_access_token(
        &self,
        consumer_key: &str,
        request_token: &str,
    ) -> Result<AccessToken> {
        let body = AccessTokenBody {
            consumer_key,
            code: request_token,
        };

        let token: AccessToken = self.post(ACCESS_TOKEN_PATH, &body).await?;
        debug!("obtained access token for {}", token.username);

        Ok(token)
    }

    /// Builds `{authorize}?request_token={code}&redirect_uri={redirect_uri}`
    ///
    /// Neither value is percent-encoded; the service expects them verbatim.
    pub fn authorization_url(&self, code: &str, redirect_uri: &str) -> Result<String> {
        let endpoint = self.endpoint(AUTHORIZE_PATH)?;
        Ok(format!(
            "{}?request_token={}&redirect_uri={}",
            endpoint, code, redirect_uri
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::DEFAULT_BASE_URL;
    use crate::error::Error;
    use serde_json::{json, Value};
    use wiremock::{
        matchers::{body_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    const CODE: &str = "dcba4321-dcba-4321-dcba-4321dc";
    const REDIRECT_URI: &str = "http://localhost:3000/";

    async fn mock_request_token(server: &MockServer, sent: Value, answer: Value) {
        Mock::given(method("POST"))
            .and(path("/v3/oauth/request"))
            .and(header("content-type", "application/json; charset=UTF8"))
            .and(header("x-accept", "application/json"))
            .and(body_json(sent))
            .respond_with(ResponseTemplate::new(200).set_body_json(answer))
            .expect(1)
            .mount(server)
            .await;
    }

    #[test]
    fn authorization_url_uses_fixed_pattern() {
        let client = PocketClient::with_base_url(DEFAULT_BASE_URL).unwrap();
        let url = client.authorization_url(CODE, REDIRECT_URI).unwrap();

        assert_eq!(
            url,
            "https://getpocket.com/auth/authorize?request_token=dcba4321-dcba-4321-dcba-4321dc&redirect_uri=http://localhost:3000/"
        );
    }

    #[tokio::test]
    async fn fetch_request_token_echoes_state() {
        let server = MockServer::start().await;
        mock_request_token(
            &server,
            json!({"consumer_key": "1234-abcd", "redirect_uri": REDIRECT_URI, "state": "xyz"}),
            json!({"code": CODE, "state": "xyz"}),
        )
        .await;

        let client = PocketClient::with_base_url(&server.uri()).unwrap();
        let token = client
            .fetch_request_token("1234-abcd", REDIRECT_URI, Some("xyz"))
            .await
            .unwrap();

        assert_eq!(token.code.len(), 30);
        assert_eq!(token.state.as_deref(), Some("xyz"));
        assert_eq!(
            token.authorization_url,
            format!(
                "{}/auth/authorize?request_token={}&redirect_uri={}",
                server.uri(),
                CODE,
                REDIRECT_URI
            )
        );
    }

    #[tokio::test]
    async fn fetch_request_token_without_state() {
        let server = MockServer::start().await;
        mock_request_token(
            &server,
            json!({"consumer_key": "1234-abcd", "redirect_uri": REDIRECT_URI}),
            json!({"code": CODE, "state": null}),
        )
        .await;

        let client = PocketClient::with_base_url(&server.uri()).unwrap();
        let token = client
            .fetch_request_token("1234-abcd", REDIRECT_URI, None)
            .await
            .unwrap();

        assert_eq!(token.code, CODE);
        assert_eq!(token.state, None);
    }

    #[tokio::test]
    async fn fetch_request_token_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/oauth/request"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("x-error-code", "152")
                    .insert_header("x-error", "Invalid consumer key."),
            )
            .mount(&server)
            .await;

        let client = PocketClient::with_base_url(&server.uri()).unwrap();
        let error = client
            .fetch_request_token("bogus", REDIRECT_URI, None)
            .await
            .unwrap_err();

        assert_eq!(
            error.to_string(),
            "protocol error: 403 Forbidden (code 152): Invalid consumer key."
        );
    }

    #[tokio::test]
    async fn fetch_access_token_decodes_token_and_username() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/oauth/authorize"))
            .and(header("content-type", "application/json; charset=UTF8"))
            .and(header("x-accept", "application/json"))
            .and(body_json(json!({"consumer_key": "1234-abcd", "code": CODE})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "5678defg-5678-defg-5678-defg56",
                "username": "pocketuser"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = PocketClient::with_base_url(&server.uri()).unwrap();
        let token = client.fetch_access_token("1234-abcd", CODE).await.unwrap();

        assert_eq!(
            token,
            AccessToken {
                token: "5678defg-5678-defg-5678-defg56".to_string(),
                username: "pocketuser".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn fetch_access_token_unauthorized_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/oauth/authorize"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("x-error-code", "158")
                    .insert_header("x-error", "User rejected code."),
            )
            .mount(&server)
            .await;

        let client = PocketClient::with_base_url(&server.uri()).unwrap();
        let error = client.fetch_access_token("1234-abcd", CODE).await.unwrap_err();

        assert!(matches!(error, Error::Protocol { .. }));
    }
}
