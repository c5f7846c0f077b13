use crate::app::config::PingIdentityProviderConfig;
use crate::core::models::pingidentity::{PingGroup, PingUser};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// Refresh tokens this long before PingOne says they expire
const TOKEN_GRACE_SECS: i64 = 60;

/// Upper bound on pages followed for one listing, guards against a
/// `next` link that never terminates
const MAX_PAGES: usize = 10_000;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("PingIdentity token request failed with status {status}")]
    Auth { status: u16 },

    #[error("PingIdentity request to {endpoint} failed with status {status}")]
    Status { endpoint: String, status: u16 },

    #[error("PingIdentity request to {endpoint} failed")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("PingIdentity response from {endpoint} could not be decoded")]
    Decode {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("PingIdentity pagination for {endpoint} exceeded the page limit")]
    TooManyPages { endpoint: String },

    #[error("PingIdentity token from {endpoint} has an unusable expiry of {expires_in}s")]
    TokenExpiry { endpoint: String, expires_in: i64 },
}

impl ClientError {
    /// Upstream http status, if the failure carried one
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Auth { status } | ClientError::Status { status, .. } => Some(*status),
            ClientError::Transport { source, .. } | ClientError::Decode { source, .. } => {
                source.status().map(|s| s.as_u16())
            }
            ClientError::TooManyPages { .. } | ClientError::TokenExpiry { .. } => None,
        }
    }
}

/// Read access to an identity source's users and groups
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentitySourceClient: Send + Sync {
    /// Every user, fetched in pages of `page_size`
    async fn fetch_users(&self, page_size: u32) -> Result<Vec<PingUser>, ClientError>;

    /// Every group, fetched in pages of `page_size`
    async fn fetch_groups(&self, page_size: u32) -> Result<Vec<PingGroup>, ClientError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_expired(&self, grace: ChronoDuration) -> bool {
        Utc::now() + grace >= self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
}

#[derive(Debug, Deserialize, Default)]
struct Links {
    next: Option<Link>,
}

#[derive(Debug, Deserialize)]
struct Embedded<T> {
    #[serde(default = "Vec::new", alias = "users", alias = "groups")]
    items: Vec<T>,
}

/// One page of a PingOne HAL collection
#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(rename = "_embedded")]
    embedded: Option<Embedded<T>>,
    #[serde(rename = "_links", default)]
    links: Links,
}

/// PingOne management api client using client credentials
pub struct PingIdentityClient {
    http: Client,
    api_base: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl PingIdentityClient {
    pub fn new(config: &PingIdentityProviderConfig) -> Result<Self, anyhow::Error> {
        let http = reqwest::ClientBuilder::new()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .gzip(true)
            .build()?;

        Ok(Self {
            http,
            api_base: format!(
                "{}/environments/{}",
                config.api_path.as_str().trim_end_matches('/'),
                config.env_id
            ),
            token_url: format!(
                "{}/{}/as/token",
                config.auth_path.as_str().trim_end_matches('/'),
                config.env_id
            ),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token: Mutex::new(None),
        })
    }

    /// A valid access token, fetching a new one when the cached one
    /// is missing or about to expire
    async fn access_token(&self) -> Result<String, ClientError> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if !token.is_expired(ChronoDuration::seconds(TOKEN_GRACE_SECS)) {
                return Ok(token.access_token.clone());
            }
        }

        let token = self.acquire_token().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);

        Ok(access_token)
    }

    #[instrument(skip(self))]
    async fn acquire_token(&self) -> Result<CachedToken, ClientError> {
        let res = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                endpoint: self.token_url.clone(),
                source,
            })?;

        if !res.status().is_success() {
            return Err(ClientError::Auth {
                status: res.status().as_u16(),
            });
        }

        let token: TokenResponse = res.json().await.map_err(|source| ClientError::Decode {
            endpoint: self.token_url.clone(),
            source,
        })?;

        let expires_at = ChronoDuration::try_seconds(token.expires_in)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| ClientError::TokenExpiry {
                endpoint: self.token_url.clone(),
                expires_in: token.expires_in,
            })?;
        debug!("Acquired PingIdentity token, expires at {}", expires_at);

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at,
        })
    }

    /// Lists a whole collection by following `_links.next` until absent
    async fn list<T: DeserializeOwned>(
        &self,
        collection: &str,
        page_size: u32,
    ) -> Result<Vec<T>, ClientError> {
        let endpoint = format!("{}/{}", self.api_base, collection);
        let mut results = Vec::new();

        let mut request = self
            .http
            .get(&endpoint)
            .query(&[("limit", page_size.to_string())])
            .query(&[("include", "memberOfGroupIDs")]);

        for page_no in 0..MAX_PAGES {
            let token = self.access_token().await?;
            let res = request
                .bearer_auth(token)
                .send()
                .await
                .map_err(|source| ClientError::Transport {
                    endpoint: endpoint.clone(),
                    source,
                })?;

            if res.status() == StatusCode::UNAUTHORIZED {
                // force a fresh token on the next cycle
                *self.token.lock().await = None;
            }

            if !res.status().is_success() {
                return Err(ClientError::Status {
                    endpoint: endpoint.clone(),
                    status: res.status().as_u16(),
                });
            }

            let page: Page<T> = res.json().await.map_err(|source| ClientError::Decode {
                endpoint: endpoint.clone(),
                source,
            })?;

            let items = page.embedded.map(|e| e.items).unwrap_or_default();
            debug!(
                "Fetched page {} of {} with {} records",
                page_no + 1,
                collection,
                items.len()
            );
            results.extend(items);

            match page.links.next {
                Some(next) => request = self.http.get(next.href),
                None => return Ok(results),
            }
        }

        Err(ClientError::TooManyPages { endpoint })
    }
}

#[async_trait]
impl IdentitySourceClient for PingIdentityClient {
    #[instrument(skip(self))]
    async fn fetch_users(&self, page_size: u32) -> Result<Vec<PingUser>, ClientError> {
        self.list("users", page_size).await
    }

    #[instrument(skip(self))]
    async fn fetch_groups(&self, page_size: u32) -> Result<Vec<PingGroup>, ClientError> {
        self.list("groups", page_size).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::PingIdentityProviderConfigBuilder;
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> PingIdentityClient {
        let config = PingIdentityProviderConfigBuilder::default()
            .id("test")
            .env_id("env-1")
            .client_id("cid")
            .client_secret("secret")
            .api_path(Url::parse(&format!("{}/v1", server.uri())).unwrap())
            .auth_path(Url::parse(&server.uri()).unwrap())
            .build()
            .unwrap();

        PingIdentityClient::new(&config).unwrap()
    }

    async fn mount_token(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/env-1/as/token"))
            .and(header("authorization", "Basic Y2lkOnNlY3JldA=="))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok",
                "expires_in": 3600,
                "token_type": "Bearer",
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_follows_next_links() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/v1/environments/env-1/users"))
            .and(query_param("limit", "2"))
            .and(query_param_is_missing("cursor"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_embedded": { "users": [
                    { "id": "u1", "username": "alice" },
                    { "id": "u2", "username": "bob" },
                ]},
                "_links": { "next": {
                    "href": format!("{}/v1/environments/env-1/users?limit=2&cursor=p2", server.uri())
                }},
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/environments/env-1/users"))
            .and(query_param("cursor", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_embedded": { "users": [ { "id": "u3", "username": "carol" } ] },
                "_links": {},
            })))
            .expect(1)
            .mount(&server)
            .await;

        let users = client_for(&server).fetch_users(2).await.unwrap();
        let names: Vec<_> = users.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
    }

    #[tokio::test]
    async fn test_groups_with_empty_embedded() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/v1/environments/env-1/groups"))
            .and(query_param("limit", "25"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "_links": {} })))
            .mount(&server)
            .await;

        let groups = client_for(&server).fetch_groups(25).await.unwrap();
        assert!(groups.is_empty());
    }

    #[tokio::test]
    async fn test_token_is_cached_across_calls() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/v1/environments/env-1/groups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_embedded": { "groups": [ { "id": "g1", "name": "devs" } ] },
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.fetch_groups(10).await.unwrap();
        let groups = client.fetch_groups(10).await.unwrap();
        assert_eq!(groups[0].name, "devs");
    }

    #[tokio::test]
    async fn test_error_status_has_no_body() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/v1/environments/env-1/users"))
            .respond_with(ResponseTemplate::new(403).set_body_string("{\"detail\":\"jane@corp\"}"))
            .mount(&server)
            .await;

        let err = client_for(&server).fetch_users(10).await.unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert!(!err.to_string().contains("jane@corp"));
    }

    #[tokio::test]
    async fn test_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/env-1/as/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client_for(&server).fetch_users(10).await.unwrap_err();
        assert!(matches!(err, ClientError::Auth { status: 401 }));
    }

    #[tokio::test]
    async fn test_out_of_range_token_expiry_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/env-1/as/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok",
                "expires_in": i64::MAX,
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).fetch_users(10).await.unwrap_err();
        assert!(matches!(err, ClientError::TokenExpiry { expires_in: i64::MAX, .. }));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_cached_token_expiry() {
        let token = CachedToken {
            access_token: "t".to_string(),
            expires_at: Utc::now() + ChronoDuration::minutes(10),
        };
        assert!(!token.is_expired(ChronoDuration::seconds(TOKEN_GRACE_SECS)));
        assert!(token.is_expired(ChronoDuration::minutes(15)));
    }
}
