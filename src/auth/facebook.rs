//! Facebook Login
//!
//! Authorization-code flow with PKCE via `oauth2`, then a Graph API call for
//! the profile. The profile JSON (`id`, `name`) is handed back untouched.

use anyhow::Context;
use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet,
    EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RequestTokenError, Scope,
    TokenResponse, TokenUrl,
};
use serde_json::Value;

use super::federated::{AuthorizationRedirect, IdentityProvider, ProviderError};
use crate::config::FacebookConfig;
use crate::models::StrategyKind;

/// OAuth client with auth and token endpoints set
type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

pub struct FacebookProvider {
    client: ConfiguredClient,
    http: reqwest::Client,
    profile_url: String,
    scopes: Vec<String>,
}

impl FacebookProvider {
    pub fn from_config(config: &FacebookConfig) -> anyhow::Result<Self> {
        let client_id = config
            .client_id
            .clone()
            .context("facebook.client_id (or FB_APP_CLIENT_ID) is not set")?;
        let client_secret = config
            .client_secret
            .clone()
            .context("facebook.client_secret (or FB_APP_CLIENT_SECRET) is not set")?;

        let client = BasicClient::new(ClientId::new(client_id))
            .set_client_secret(ClientSecret::new(client_secret))
            .set_auth_uri(AuthUrl::new(config.auth_url.clone()).context("Invalid facebook.auth_url")?)
            .set_token_uri(
                TokenUrl::new(config.token_url.clone()).context("Invalid facebook.token_url")?,
            )
            .set_redirect_uri(
                RedirectUrl::new(config.callback_url.clone())
                    .context("Invalid facebook.callback_url")?,
            )
            // Graph API expects client credentials as form parameters
            .set_auth_type(AuthType::RequestBody);

        let http = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            http,
            profile_url: config.profile_url.clone(),
            scopes: config.scopes.clone(),
        })
    }
}

#[async_trait]
impl IdentityProvider for FacebookProvider {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Facebook
    }

    fn authorization_redirect(&self) -> AuthorizationRedirect {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (url, csrf_state) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .set_pkce_challenge(pkce_challenge)
            .url();

        AuthorizationRedirect {
            url: url.to_string(),
            csrf_state: csrf_state.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        }
    }

    async fn fetch_profile(&self, code: &str, pkce_verifier: &str) -> Result<Value, ProviderError> {
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| match e {
                // Graph API errors are not RFC 6749 shaped, so a refusal can
                // surface as either variant.
                RequestTokenError::ServerResponse(resp) => ProviderError::Denied(resp.to_string()),
                RequestTokenError::Parse(err, _) => ProviderError::Denied(err.to_string()),
                other => ProviderError::Transport(
                    anyhow::Error::new(other).context("Token exchange failed"),
                ),
            })?;

        let response = self
            .http
            .get(&self.profile_url)
            .bearer_auth(token.access_token().secret())
            .send()
            .await
            .context("Profile request failed")?;

        if response.status().is_client_error() {
            return Err(ProviderError::Denied(format!(
                "profile request rejected with {}",
                response.status()
            )));
        }

        let profile = response
            .error_for_status()
            .context("Profile request failed")?
            .json::<Value>()
            .await
            .context("Profile response is not JSON")?;

        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> FacebookConfig {
        FacebookConfig {
            client_id: Some("app-123".to_string()),
            client_secret: Some("shh".to_string()),
            callback_url: "http://localhost:3000/auth/facebook/callback".to_string(),
            ..FacebookConfig::default()
        }
    }

    #[test]
    fn test_authorization_redirect() {
        let provider = FacebookProvider::from_config(&config()).unwrap();

        let redirect = provider.authorization_redirect();

        assert!(redirect.url.starts_with("https://www.facebook.com/"));
        assert!(redirect.url.contains("client_id=app-123"));
        assert!(redirect.url.contains("response_type=code"));
        assert!(redirect.url.contains("code_challenge_method=S256"));
        assert!(redirect.url.contains("scope=public_profile"));
        assert!(redirect.url.contains(&format!("state={}", redirect.csrf_state)));
        assert!(!redirect.pkce_verifier.is_empty());
        assert!(!redirect.url.contains(&redirect.pkce_verifier));
    }

    #[test]
    fn test_each_redirect_gets_fresh_state() {
        let provider = FacebookProvider::from_config(&config()).unwrap();

        let a = provider.authorization_redirect();
        let b = provider.authorization_redirect();

        assert_ne!(a.csrf_state, b.csrf_state);
        assert_ne!(a.pkce_verifier, b.pkce_verifier);
    }

    #[test]
    fn test_missing_credentials() {
        let mut config = config();
        config.client_secret = None;
        assert!(FacebookProvider::from_config(&config).is_err());
    }

    #[test]
    fn test_invalid_callback_url() {
        let mut config = config();
        config.callback_url = "not a url".to_string();
        assert!(FacebookProvider::from_config(&config).is_err());
    }

    mod fetch_profile {
        use super::*;
        use serde_json::json;
        use wiremock::matchers::{body_string_contains, header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        fn provider(server: &MockServer) -> FacebookProvider {
            let config = FacebookConfig {
                token_url: format!("{}/oauth/access_token", server.uri()),
                profile_url: format!("{}/me", server.uri()),
                ..config()
            };
            FacebookProvider::from_config(&config).unwrap()
        }

        async fn mount_token(server: &MockServer, response: ResponseTemplate) {
            Mock::given(method("POST"))
                .and(path("/oauth/access_token"))
                .respond_with(response)
                .mount(server)
                .await;
        }

        fn token_ok() -> ResponseTemplate {
            ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok-123",
                "token_type": "bearer",
                "expires_in": 3600
            }))
        }

        async fn mount_profile(server: &MockServer, response: ResponseTemplate) {
            Mock::given(method("GET"))
                .and(path("/me"))
                .and(header("authorization", "Bearer tok-123"))
                .respond_with(response)
                .mount(server)
                .await;
        }

        #[tokio::test]
        async fn test_returns_profile_json() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/oauth/access_token"))
                .and(body_string_contains("code=abc"))
                .and(body_string_contains("code_verifier=verifier-1"))
                .and(body_string_contains("client_secret=shh"))
                .respond_with(token_ok())
                .expect(1)
                .mount(&server)
                .await;
            mount_profile(
                &server,
                ResponseTemplate::new(200).set_body_json(json!({"id": "1029", "name": "Bob"})),
            )
            .await;

            let profile = provider(&server).fetch_profile("abc", "verifier-1").await.unwrap();

            assert_eq!(profile, json!({"id": "1029", "name": "Bob"}));
        }

        #[tokio::test]
        async fn test_rejected_code_is_denied() {
            let server = MockServer::start().await;
            mount_token(
                &server,
                ResponseTemplate::new(400).set_body_json(json!({
                    "error": "invalid_grant",
                    "error_description": "Code expired"
                })),
            )
            .await;

            let result = provider(&server).fetch_profile("abc", "verifier-1").await;

            assert!(matches!(result, Err(ProviderError::Denied(_))), "{:?}", result);
        }

        #[tokio::test]
        async fn test_graph_style_token_error_is_denied() {
            let server = MockServer::start().await;
            mount_token(
                &server,
                ResponseTemplate::new(400).set_body_json(json!({
                    "error": {
                        "message": "Invalid verification code format.",
                        "type": "OAuthException",
                        "code": 100
                    }
                })),
            )
            .await;

            let result = provider(&server).fetch_profile("abc", "verifier-1").await;

            assert!(matches!(result, Err(ProviderError::Denied(_))), "{:?}", result);
        }

        #[tokio::test]
        async fn test_token_endpoint_outage_is_transport_error() {
            let server = MockServer::start().await;
            mount_token(&server, ResponseTemplate::new(500)).await;

            let result = provider(&server).fetch_profile("abc", "verifier-1").await;

            assert!(matches!(result, Err(ProviderError::Transport(_))), "{:?}", result);
        }

        #[tokio::test]
        async fn test_profile_client_error_is_denied() {
            let server = MockServer::start().await;
            mount_token(&server, token_ok()).await;
            mount_profile(&server, ResponseTemplate::new(401)).await;

            let result = provider(&server).fetch_profile("abc", "verifier-1").await;

            assert!(matches!(result, Err(ProviderError::Denied(_))), "{:?}", result);
        }

        #[tokio::test]
        async fn test_profile_server_error_is_transport_error() {
            let server = MockServer::start().await;
            mount_token(&server, token_ok()).await;
            mount_profile(&server, ResponseTemplate::new(503)).await;

            let result = provider(&server).fetch_profile("abc", "verifier-1").await;

            assert!(matches!(result, Err(ProviderError::Transport(_))), "{:?}", result);
        }

        #[tokio::test]
        async fn test_profile_not_json_is_transport_error() {
            let server = MockServer::start().await;
            mount_token(&server, token_ok()).await;
            mount_profile(
                &server,
                ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"),
            )
            .await;

            let result = provider(&server).fetch_profile("abc", "verifier-1").await;

            assert!(matches!(result, Err(ProviderError::Transport(_))), "{:?}", result);
        }
    }
}
