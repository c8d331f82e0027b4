//! Minimal Bluesky XRPC client
//!
//! Covers what the labeler needs from the social graph: a session, the
//! follower list of the labeler account, and recent notifications.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{MembersPage, MembershipProvider};
use crate::error::{LabelerError, Result};

const FOLLOWERS_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    access_jwt: String,
    refresh_jwt: String,
    did: String,
}

/// XRPC error body, e.g. `{"error":"ExpiredToken","message":"Token has expired"}`.
#[derive(Debug, Default, Deserialize)]
struct XrpcError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

impl XrpcError {
    fn is_auth(&self) -> bool {
        AUTH_ERRORS.contains(&self.error.as_str())
    }
}

/// Error codes the PDS uses for a token it will no longer accept.
const AUTH_ERRORS: [&str; 4] = ["ExpiredToken", "InvalidToken", "AuthenticationRequired", "AuthMissing"];

/// A response sorted by what the caller should do with it.
enum Reply {
    Ok(Response),
    /// The access token was refused; renew the session and retry.
    AuthRejected(String),
    Failed(LabelerError),
}

async fn classify(method: &str, response: Response) -> Reply {
    let status = response.status();
    if status.is_success() {
        return Reply::Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let err: XrpcError = serde_json::from_str(&body).unwrap_or_default();
    let detail = format!("{} returned {} {}: {}", method, status.as_u16(), err.error, err.message);

    if status == StatusCode::UNAUTHORIZED || (status == StatusCode::BAD_REQUEST && err.is_auth()) {
        Reply::AuthRejected(detail)
    } else {
        Reply::Failed(LabelerError::Transport(detail))
    }
}

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Actor {
    pub did: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FollowersResponse {
    #[serde(default)]
    pub followers: Vec<Actor>,
    pub cursor: Option<String>,
}

/// A notification as returned by `listNotifications`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub reason: String,
    pub author: NotificationAuthor,
    pub indexed_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationAuthor {
    pub did: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NotificationsResponse {
    #[serde(default)]
    pub notifications: Vec<Notification>,
}

pub struct BskyClient {
    client: Client,
    service: String,
    identifier: String,
    password: String,
    session: RwLock<Option<Session>>,
}

impl BskyClient {
    pub fn new(
        service: impl Into<String>,
        identifier: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("fortune_labeler/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            service: service.into().trim_end_matches('/').to_string(),
            identifier: identifier.into(),
            password: password.into(),
            session: RwLock::new(None),
        })
    }

    fn xrpc(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.service, method)
    }

    /// Create a fresh session and cache it.
    pub async fn login(&self) -> Result<()> {
        let response = self
            .client
            .post(self.xrpc("com.atproto.server.createSession"))
            .json(&CreateSessionRequest {
                identifier: &self.identifier,
                password: &self.password,
            })
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED || response.status() == StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            return Err(LabelerError::Auth(format!("createSession rejected: {}", body)));
        }

        let session: Session = response.error_for_status()?.json().await?;
        info!(did = %session.did, "Logged in to {}", self.service);
        *self.session.write().await = Some(session);
        Ok(())
    }

    async fn access_token(&self) -> Result<String> {
        if let Some(session) = self.session.read().await.as_ref() {
            return Ok(session.access_jwt.clone());
        }
        self.login().await?;
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_jwt.clone())
            .ok_or_else(|| LabelerError::Auth("no session after login".into()))
    }

    /// Swap the cached session for a fresh one: `refreshSession` first,
    /// a full login if the refresh token is refused too.
    async fn renew_session(&self) -> Result<()> {
        let refresh_jwt = self.session.read().await.as_ref().map(|s| s.refresh_jwt.clone());
        if let Some(refresh_jwt) = refresh_jwt {
            match self.refresh(&refresh_jwt).await {
                Ok(session) => {
                    debug!(did = %session.did, "Session refreshed");
                    *self.session.write().await = Some(session);
                    return Ok(());
                }
                Err(e) => warn!("Session refresh failed, logging in again: {}", e),
            }
        }
        *self.session.write().await = None;
        self.login().await
    }

    async fn refresh(&self, refresh_jwt: &str) -> Result<Session> {
        let method = "com.atproto.server.refreshSession";
        let response = self
            .client
            .post(self.xrpc(method))
            .bearer_auth(refresh_jwt)
            .send()
            .await?;

        match classify(method, response).await {
            Reply::Ok(response) => Ok(response.json().await?),
            Reply::AuthRejected(detail) => Err(LabelerError::Auth(detail)),
            Reply::Failed(e) => Err(e),
        }
    }

    async fn send_get(&self, method: &str, query: &[(&str, String)]) -> Result<Reply> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(self.xrpc(method))
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;
        Ok(classify(method, response).await)
    }

    /// Authenticated GET. A refused token renews the session and the request
    /// is retried once; a second refusal drops the session so the next call
    /// logs in from scratch.
    async fn get<T: for<'de> Deserialize<'de>>(&self, method: &str, query: &[(&str, String)]) -> Result<T> {
        match self.send_get(method, query).await? {
            Reply::Ok(response) => return Ok(response.json().await?),
            Reply::Failed(e) => return Err(e),
            Reply::AuthRejected(detail) => {
                warn!("{}, renewing session", detail);
                self.renew_session().await?;
            }
        }

        match self.send_get(method, query).await? {
            Reply::Ok(response) => Ok(response.json().await?),
            Reply::Failed(e) => Err(e),
            Reply::AuthRejected(detail) => {
                *self.session.write().await = None;
                Err(LabelerError::Auth(detail))
            }
        }
    }

    pub async fn list_notifications(&self, limit: u32) -> Result<Vec<Notification>> {
        let response: NotificationsResponse = self
            .get("app.bsky.notification.listNotifications", &[("limit", limit.to_string())])
            .await?;
        Ok(response.notifications)
    }
}

#[async_trait]
impl MembershipProvider for BskyClient {
    async fn fetch_members_page(&self, cursor: Option<&str>) -> Result<MembersPage> {
        let mut query = vec![
            ("actor", self.identifier.clone()),
            ("limit", FOLLOWERS_PAGE_LIMIT.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }

        let response: FollowersResponse = self.get("app.bsky.graph.getFollowers", &query).await?;
        debug!(count = response.followers.len(), "Fetched followers page");
        Ok(MembersPage {
            identities: response.followers.into_iter().map(|a| a.did).collect(),
            next_cursor: response.cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Query, State};
    use axum::http::{header::AUTHORIZATION, HeaderMap};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Issues `login<n>` access tokens; `login1` is already expired.
    #[derive(Default)]
    struct MockPds {
        logins: AtomicUsize,
        refreshes: AtomicUsize,
        refresh_ok: bool,
    }

    type Answer = (StatusCode, Json<Value>);

    fn bearer(headers: &HeaderMap) -> String {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .unwrap_or_default()
            .to_string()
    }

    fn expired() -> Answer {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "ExpiredToken", "message": "Token has expired" })),
        )
    }

    async fn create_session(State(pds): State<Arc<MockPds>>) -> Json<Value> {
        let n = pds.logins.fetch_add(1, Ordering::SeqCst) + 1;
        Json(json!({
            "accessJwt": format!("login{}", n),
            "refreshJwt": format!("refresh{}", n),
            "did": "did:plc:labeler",
            "handle": "labeler.test"
        }))
    }

    async fn refresh_session(State(pds): State<Arc<MockPds>>, headers: HeaderMap) -> Answer {
        pds.refreshes.fetch_add(1, Ordering::SeqCst);
        if !pds.refresh_ok || !bearer(&headers).starts_with("refresh") {
            return expired();
        }
        (
            StatusCode::OK,
            Json(json!({ "accessJwt": "refreshed", "refreshJwt": "refresh-next", "did": "did:plc:labeler" })),
        )
    }

    async fn get_followers(headers: HeaderMap, Query(query): Query<HashMap<String, String>>) -> Answer {
        if query.get("actor").map(String::as_str) == Some("did:plc:missing") {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "InvalidRequest", "message": "Profile not found" })),
            );
        }
        if bearer(&headers) == "login1" {
            return expired();
        }
        (StatusCode::OK, Json(json!({ "followers": [{ "did": "did:plc:a" }] })))
    }

    async fn spawn_pds(refresh_ok: bool) -> (String, Arc<MockPds>) {
        let pds = Arc::new(MockPds { refresh_ok, ..Default::default() });
        let app = Router::new()
            .route("/xrpc/com.atproto.server.createSession", post(create_session))
            .route("/xrpc/com.atproto.server.refreshSession", post(refresh_session))
            .route("/xrpc/app.bsky.graph.getFollowers", get(get_followers))
            .with_state(pds.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{}", addr), pds)
    }

    fn client(service: &str, identifier: &str) -> BskyClient {
        BskyClient::new(service, identifier, "pw", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_retried() {
        let (service, pds) = spawn_pds(true).await;
        let client = client(&service, "did:plc:labeler");
        client.login().await.unwrap();

        for _ in 0..3 {
            let page = client.fetch_members_page(None).await.unwrap();
            assert_eq!(page.identities, vec!["did:plc:a".to_string()]);
        }
        assert_eq!(pds.logins.load(Ordering::SeqCst), 1);
        assert_eq!(pds.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refused_refresh_falls_back_to_login() {
        let (service, pds) = spawn_pds(false).await;
        let client = client(&service, "did:plc:labeler");
        client.login().await.unwrap();

        let page = client.fetch_members_page(None).await.unwrap();
        assert_eq!(page.identities.len(), 1);
        client.fetch_members_page(None).await.unwrap();

        assert_eq!(pds.logins.load(Ordering::SeqCst), 2);
        assert_eq!(pds.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_auth_bad_request_is_transport_error() {
        let (service, pds) = spawn_pds(true).await;
        let client = client(&service, "did:plc:missing");
        client.login().await.unwrap();

        let err = client.fetch_members_page(None).await.unwrap_err();
        assert!(matches!(err, LabelerError::Transport(msg) if msg.contains("InvalidRequest")));
        assert_eq!(pds.refreshes.load(Ordering::SeqCst), 0);
        assert_eq!(pds.logins.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parse_followers_page() {
        let body = r#"{"subject":{"did":"did:plc:labeler"},"followers":[{"did":"did:plc:a","handle":"a.bsky.social"},{"did":"did:plc:b"}],"cursor":"abc"}"#;
        let parsed: FollowersResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.followers.len(), 2);
        assert_eq!(parsed.cursor.as_deref(), Some("abc"));

        let last: FollowersResponse = serde_json::from_str(r#"{"followers":[]}"#).unwrap();
        assert!(last.cursor.is_none());
    }

    #[test]
    fn test_parse_notifications() {
        let body = r#"{"notifications":[{"uri":"at://x","reason":"follow","author":{"did":"did:plc:a"},"indexedAt":"2024-01-01T00:00:00.000Z","isRead":false}]}"#;
        let parsed: NotificationsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.notifications[0].reason, "follow");
        assert_eq!(parsed.notifications[0].author.did, "did:plc:a");
    }

    #[test]
    fn test_xrpc_url_trims_slash() {
        let client = BskyClient::new("https://bsky.social/", "did:plc:me", "pw", Duration::from_secs(5)).unwrap();
        assert_eq!(client.xrpc("app.bsky.graph.getFollowers"), "https://bsky.social/xrpc/app.bsky.graph.getFollowers");
    }
}
