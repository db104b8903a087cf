use crate::error::{ApiError, Result};
use crate::identifiers::Identity;
use crate::models::TokenPair;
use crate::store::CredentialStore;
use anyhow::anyhow;
use log::{debug, info, warn};
use reqwest::{header, Method, StatusCode};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

pub const LOGIN_PATH: &str = "/auth/token/";
pub const REFRESH_PATH: &str = "/auth/token/refresh/";

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RequestMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl FromStr for RequestMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(RequestMethod::Get),
            "post" => Ok(RequestMethod::Post),
            "put" => Ok(RequestMethod::Put),
            "patch" => Ok(RequestMethod::Patch),
            "delete" => Ok(RequestMethod::Delete),
            _ => Err(anyhow!("unknown method: {}", s)),
        }
    }
}

impl From<RequestMethod> for Method {
    fn from(m: RequestMethod) -> Method {
        match m {
            RequestMethod::Get => Method::GET,
            RequestMethod::Post => Method::POST,
            RequestMethod::Put => Method::PUT,
            RequestMethod::Patch => Method::PATCH,
            RequestMethod::Delete => Method::DELETE,
        }
    }
}

/// How an endpoint wants the access token presented.
///
/// The backend is not consistent about this, so each endpoint declares its own.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AuthScheme {
    /// `Authorization: Bearer <access>`
    Bearer,
    /// `Cookie: access_token=<access>; refresh_token=<refresh>`
    CookiePair,
}

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub method: Method,
    pub path: String,
    pub auth: AuthScheme,
    pub query: Vec<(String, String)>,
}

impl Endpoint {
    pub fn new(method: Method, path: impl Into<String>, auth: AuthScheme) -> Self {
        Endpoint {
            method,
            path: path.into(),
            auth,
            query: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>, auth: AuthScheme) -> Self {
        Self::new(Method::GET, path, auth)
    }

    pub fn post(path: impl Into<String>, auth: AuthScheme) -> Self {
        Self::new(Method::POST, path, auth)
    }

    pub fn put(path: impl Into<String>, auth: AuthScheme) -> Self {
        Self::new(Method::PUT, path, auth)
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }
}

/// Authenticated access to the storefront backend on behalf of many identities.
///
/// Holds no per-user state of its own: every call names the identity it acts for, and tokens
/// are always read from and written back to the credential store.
#[derive(Debug, Clone)]
pub struct SessionClient {
    http_client: reqwest::Client,
    base_url: String,
    store: CredentialStore,
    refresh_locks: Arc<Mutex<HashMap<Identity, Arc<tokio::sync::Mutex<()>>>>>,
}

impl SessionClient {
    pub fn new(base_url: &str, store: CredentialStore) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(SessionClient {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            store,
            refresh_locks: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth_headers(scheme: AuthScheme, tokens: &TokenPair) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        let (name, raw) = match scheme {
            AuthScheme::Bearer => (
                header::AUTHORIZATION,
                format!("Bearer {}", tokens.access_token),
            ),
            AuthScheme::CookiePair => (
                header::COOKIE,
                format!(
                    "access_token={}; refresh_token={}",
                    tokens.access_token, tokens.refresh_token
                ),
            ),
        };
        let mut value = header::HeaderValue::from_str(&raw)
            .map_err(|_| anyhow!("stored token is not usable in an HTTP header"))?;
        value.set_sensitive(true);
        headers.insert(name, value);
        Ok(headers)
    }

    /// Exchanges email and password for a fresh token pair.
    ///
    /// The backend sets both tokens as cookies on a 200 response. Any other status means the
    /// credentials were refused, and comes back as `Ok(None)`.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Option<TokenPair>> {
        debug!("backend POST {}", LOGIN_PATH);
        let res = self
            .http_client
            .post(self.url(LOGIN_PATH))
            .json(&json!({
                "email": email,
                "password": password,
            }))
            .send()
            .await?;
        if res.status() != StatusCode::OK {
            info!("login refused by backend (HTTP {})", res.status());
            return Ok(None);
        }
        let mut access_token: Option<String> = None;
        let mut refresh_token: Option<String> = None;
        for cookie in res.cookies() {
            if cookie.value().is_empty() {
                continue;
            }
            match cookie.name() {
                "access_token" => access_token = Some(cookie.value().to_string()),
                "refresh_token" => refresh_token = Some(cookie.value().to_string()),
                _ => (),
            }
        }
        Ok(Some(TokenPair {
            access_token: access_token.ok_or(ApiError::MissingCredentials("access_token"))?,
            refresh_token: refresh_token.ok_or(ApiError::MissingCredentials("refresh_token"))?,
        }))
    }

    /// Logs `identity` in and stores the resulting tokens.
    ///
    /// Returns false if the backend refused the credentials; nothing is stored in that case.
    pub async fn login(&self, identity: Identity, email: &str, password: &str) -> Result<bool> {
        match self.authenticate(email, password).await? {
            Some(tokens) => {
                self.store.upsert(identity, &tokens).await?;
                info!("identity {} logged in", identity);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Forgets the stored credentials. Returns false if there were none.
    pub async fn logout(&self, identity: Identity) -> Result<bool> {
        let removed = self.store.remove(identity).await?;
        self.prune_refresh_lock(identity);
        if removed {
            info!("identity {} logged out", identity);
        }
        Ok(removed)
    }

    fn refresh_lock(&self, identity: Identity) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .refresh_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(identity)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Forgets the refresh lock of `identity` unless some call still holds or waits on it.
    fn prune_refresh_lock(&self, identity: Identity) {
        let mut locks = self
            .refresh_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&identity)
            .map_or(false, |lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&identity);
        }
    }

    /// Number of identities with a refresh in flight.
    pub fn pending_refreshes(&self) -> usize {
        self.refresh_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Uses the stored refresh token to mint a new access token, and persists it.
    ///
    /// Refreshes for one identity are serialized. `rejected` is the pair whose access token the
    /// backend just turned down; if the store already holds a different access token by the
    /// time the lock is acquired, some concurrent call refreshed first and that token is used
    /// as-is.
    async fn refresh(&self, identity: Identity, rejected: &TokenPair) -> Result<TokenPair> {
        let lock = self.refresh_lock(identity);
        let result = {
            let _guard = lock.lock().await;
            self.refresh_locked(identity, rejected).await
        };
        drop(lock);
        self.prune_refresh_lock(identity);
        result
    }

    async fn refresh_locked(&self, identity: Identity, rejected: &TokenPair) -> Result<TokenPair> {
        let current = self
            .store
            .get(identity)
            .await?
            .ok_or(ApiError::AuthExpired(identity))?;
        if current.access_token != rejected.access_token {
            debug!("access token for {} was already refreshed", identity);
            return Ok(current);
        }

        debug!("backend POST {}", REFRESH_PATH);
        let res = self
            .http_client
            .post(self.url(REFRESH_PATH))
            .json(&json!({ "refresh": current.refresh_token }))
            .send()
            .await?;
        if res.status() != StatusCode::OK {
            warn!(
                "token refresh for identity {} failed (HTTP {})",
                identity,
                res.status()
            );
            return Err(ApiError::AuthExpired(identity));
        }
        let body = decode_body(res.bytes().await?.as_ref())?;
        let access_token = body["access"]
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or(ApiError::MissingCredentials("access"))?
            .to_string();
        // the backend does not rotate refresh tokens today, but keep a new one if it sends one
        let rotated = body["refresh"].as_str().filter(|s| !s.is_empty());
        let refreshed = TokenPair {
            access_token,
            refresh_token: rotated.unwrap_or(&current.refresh_token).to_string(),
        };
        if rotated.is_some() {
            self.store.replace_tokens(identity, &refreshed).await?;
        } else {
            self.store
                .update_access_token(identity, &refreshed.access_token)
                .await?;
        }
        debug!("refreshed access token for identity {}", identity);
        Ok(refreshed)
    }

    async fn send(
        &self,
        endpoint: &Endpoint,
        body: Option<&Value>,
        tokens: &TokenPair,
    ) -> Result<reqwest::Response> {
        debug!(
            "backend {} {} query={:?}",
            endpoint.method, endpoint.path, endpoint.query
        );
        let mut req = self
            .http_client
            .request(endpoint.method.clone(), self.url(&endpoint.path))
            .headers(Self::auth_headers(endpoint.auth, tokens)?);
        if !endpoint.query.is_empty() {
            req = req.query(&endpoint.query);
        }
        req = if let Some(b) = body { req.json(b) } else { req };
        Ok(req.send().await?)
    }

    /// Issues an authenticated call on behalf of `identity` and decodes the JSON reply.
    ///
    /// Fails with `NotAuthorized` without touching the network if nothing is on file. A 401
    /// triggers at most one refresh, followed by exactly one retry; a second 401 is final.
    pub async fn call(
        &self,
        identity: Identity,
        endpoint: &Endpoint,
        body: Option<&Value>,
    ) -> Result<Value> {
        let tokens = self
            .store
            .get(identity)
            .await?
            .ok_or(ApiError::NotAuthorized(identity))?;
        let mut res = self.send(endpoint, body, &tokens).await?;
        if res.status() == StatusCode::UNAUTHORIZED {
            debug!("access token rejected for identity {}", identity);
            let tokens = self.refresh(identity, &tokens).await?;
            res = self.send(endpoint, body, &tokens).await?;
            if res.status() == StatusCode::UNAUTHORIZED {
                warn!(
                    "identity {} still unauthorized after token refresh: {} {}",
                    identity, endpoint.method, endpoint.path
                );
                return Err(ApiError::AuthExpired(identity));
            }
        }
        let status = res.status();
        let bytes = res.bytes().await?;
        if status == StatusCode::OK || status == StatusCode::CREATED {
            decode_body(bytes.as_ref())
        } else {
            Err(ApiError::Backend {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            })
        }
    }

    /// Bearer-authenticated call to an arbitrary backend path.
    pub async fn request(
        &self,
        identity: Identity,
        method: Method,
        path: &str,
        query: Vec<(String, String)>,
        body: Option<&Value>,
    ) -> Result<Value> {
        let endpoint = Endpoint::new(method, path, AuthScheme::Bearer).with_query(query);
        self.call(identity, &endpoint, body).await
    }
}

/// Empty bodies decode as JSON null.
fn decode_body(bytes: &[u8]) -> Result<Value> {
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(bytes)
        .map_err(|e| ApiError::MalformedPayload(format!("backend response is not JSON: {}", e)))
}

#[test]
fn test_request_method() {
    assert_eq!(RequestMethod::from_str("get").unwrap(), RequestMethod::Get);
    assert_eq!(RequestMethod::from_str("PUT").unwrap(), RequestMethod::Put);
    assert_eq!(Method::from(RequestMethod::Delete), Method::DELETE);
    assert!(RequestMethod::from_str("fetch").is_err());
}

#[test]
fn test_auth_headers() {
    let tokens = TokenPair::new("A1", "R1");
    let headers = SessionClient::auth_headers(AuthScheme::Bearer, &tokens).unwrap();
    assert_eq!(headers[header::AUTHORIZATION], "Bearer A1");
    assert!(headers[header::AUTHORIZATION].is_sensitive());
    assert!(headers.get(header::COOKIE).is_none());

    let headers = SessionClient::auth_headers(AuthScheme::CookiePair, &tokens).unwrap();
    assert_eq!(
        headers[header::COOKIE],
        "access_token=A1; refresh_token=R1"
    );
    assert!(headers.get(header::AUTHORIZATION).is_none());

    let bad = TokenPair::new("A1\n", "R1");
    assert!(SessionClient::auth_headers(AuthScheme::Bearer, &bad).is_err());
}

#[test]
fn test_decode_body() {
    assert_eq!(decode_body(b"").unwrap(), Value::Null);
    assert_eq!(decode_body(b"{\"a\": 1}").unwrap(), json!({"a": 1}));
    assert!(matches!(
        decode_body(b"<html>"),
        Err(ApiError::MalformedPayload(_))
    ));
}
