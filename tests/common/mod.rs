//! In-memory fakes of the storage and outbound service traits.

#![allow(dead_code)]

use anyhow::{Result, anyhow};
use axum::http::{HeaderMap, HeaderValue, Method, header::COOKIE};
use bytes::Bytes;
use dbauth::{
    BoxFuture,
    auth::{AccountStore, AppHooks, AuthConfig, auth_options},
    dbauth::{
        AuthHooks, AuthRequest, DbAuthHandler, DbAuthOptions, SignupInput, SignupResult,
        UserStore, UsernameTaken,
    },
    models::{Account, NewUser, User},
    services::{Analytics, AnalyticsEvent, EmailRequest, Mailer, NewSubscription, Subscriptions},
};
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(0))
}

#[derive(Default)]
struct StoreState {
    accounts: Vec<Account>,
    users: Vec<User>,
    sessions: HashMap<Vec<u8>, (Uuid, i64)>,
    subscriptions: Vec<NewSubscription>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    stale_username_reads: AtomicBool,
}

impl MemoryStore {
    pub fn accounts(&self) -> Vec<Account> {
        lock(&self.state).accounts.clone()
    }

    pub fn users(&self) -> Vec<User> {
        lock(&self.state).users.clone()
    }

    pub fn subscriptions(&self) -> Vec<NewSubscription> {
        lock(&self.state).subscriptions.clone()
    }

    pub fn session_count(&self) -> usize {
        lock(&self.state).sessions.len()
    }

    /// Make username lookups miss, as a concurrent signup would see them.
    pub fn set_stale_username_reads(&self, stale: bool) {
        self.stale_username_reads.store(stale, Ordering::SeqCst);
    }

    /// Move a user's reset token expiry, e.g. into the past.
    pub fn set_reset_expiry(&self, user_id: Uuid, expires_at: i64) {
        let mut state = lock(&self.state);
        if let Some(user) = state.users.iter_mut().find(|user| user.id == user_id) {
            user.reset_token_expires_at = Some(expires_at);
        }
    }
}

impl UserStore for MemoryStore {
    fn find_user_by_username<'a>(&'a self, username: &'a str) -> BoxFuture<'a, Option<User>> {
        Box::pin(async move {
            if self.stale_username_reads.load(Ordering::SeqCst) {
                return Ok(None);
            }
            Ok(lock(&self.state)
                .users
                .iter()
                .find(|user| user.email == username)
                .cloned())
        })
    }

    fn find_user_by_reset_token<'a>(
        &'a self,
        token_hash: &'a [u8],
    ) -> BoxFuture<'a, Option<User>> {
        Box::pin(async move {
            Ok(lock(&self.state)
                .users
                .iter()
                .find(|user| user.reset_token.as_deref() == Some(token_hash))
                .cloned())
        })
    }

    fn set_reset_token(&self, user_id: Uuid, token: Option<(Vec<u8>, i64)>) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            let user = state
                .users
                .iter_mut()
                .find(|user| user.id == user_id)
                .ok_or_else(|| anyhow!("no user {user_id}"))?;
            let (hash, expires_at) = token.unzip();
            user.reset_token = hash;
            user.reset_token_expires_at = expires_at;
            Ok(())
        })
    }

    fn update_password<'a>(
        &'a self,
        user_id: Uuid,
        hashed_password: &'a str,
        salt: &'a str,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            let user = state
                .users
                .iter_mut()
                .find(|user| user.id == user_id)
                .ok_or_else(|| anyhow!("no user {user_id}"))?;
            user.hashed_password = hashed_password.to_string();
            user.salt = salt.to_string();
            user.reset_token = None;
            user.reset_token_expires_at = None;
            Ok(())
        })
    }

    fn insert_session<'a>(
        &'a self,
        user_id: Uuid,
        token_hash: &'a [u8],
        ttl_seconds: i64,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            lock(&self.state).sessions.insert(
                token_hash.to_vec(),
                (user_id, now_unix().saturating_add(ttl_seconds)),
            );
            Ok(())
        })
    }

    fn lookup_session<'a>(&'a self, token_hash: &'a [u8]) -> BoxFuture<'a, Option<Uuid>> {
        Box::pin(async move {
            let now = now_unix();
            Ok(lock(&self.state)
                .sessions
                .get(token_hash)
                .filter(|(_, expires_at)| *expires_at > now)
                .map(|(user_id, _)| *user_id))
        })
    }

    fn delete_session<'a>(&'a self, token_hash: &'a [u8]) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            lock(&self.state).sessions.remove(token_hash);
            Ok(())
        })
    }
}

impl AccountStore for MemoryStore {
    fn create_account<'a>(&'a self, api_key: &'a str) -> BoxFuture<'a, Account> {
        Box::pin(async move {
            let account = Account {
                id: Uuid::new_v4(),
                api_key: api_key.to_string(),
            };
            lock(&self.state).accounts.push(account.clone());
            Ok(account)
        })
    }

    fn delete_account(&self, id: Uuid) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            lock(&self.state).accounts.retain(|account| account.id != id);
            Ok(())
        })
    }

    fn create_user(&self, user: NewUser) -> BoxFuture<'_, User> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            if state.users.iter().any(|existing| existing.email == user.email) {
                return Err(UsernameTaken(user.email).into());
            }
            let user = User {
                id: Uuid::new_v4(),
                email: user.email,
                hashed_password: user.hashed_password,
                salt: user.salt,
                name: user.name,
                account_id: user.account_id,
                role: user.role,
                reset_token: None,
                reset_token_expires_at: None,
            };
            state.users.push(user.clone());
            Ok(user)
        })
    }
}

impl Subscriptions for MemoryStore {
    fn create_subscription(&self, subscription: NewSubscription) -> BoxFuture<'_, Uuid> {
        Box::pin(async move {
            lock(&self.state).subscriptions.push(subscription);
            Ok(Uuid::new_v4())
        })
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailRequest>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<EmailRequest> {
        lock(&self.sent).clone()
    }
}

impl Mailer for RecordingMailer {
    fn send_email(&self, request: EmailRequest) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            lock(&self.sent).push(request);
            if self.fail {
                Err(anyhow!("mail provider unavailable"))
            } else {
                Ok(())
            }
        })
    }
}

#[derive(Default)]
pub struct RecordingAnalytics {
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl RecordingAnalytics {
    pub fn events(&self) -> Vec<AnalyticsEvent> {
        lock(&self.events).clone()
    }
}

impl Analytics for RecordingAnalytics {
    fn capture(&self, event: AnalyticsEvent) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            lock(&self.events).push(event);
            Ok(())
        })
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    pub analytics: Arc<RecordingAnalytics>,
    pub hooks: Arc<AppHooks>,
    pub config: Arc<AuthConfig>,
}

impl Harness {
    pub fn new(config: AuthConfig) -> Self {
        Self::with_mailer(config, RecordingMailer::default())
    }

    pub fn with_mailer(config: AuthConfig, mailer: RecordingMailer) -> Self {
        let config = Arc::new(config);
        let store = Arc::new(MemoryStore::default());
        let mailer = Arc::new(mailer);
        let analytics = Arc::new(RecordingAnalytics::default());
        let hooks = Arc::new(AppHooks::new(
            Arc::clone(&config),
            store.clone(),
            mailer.clone(),
            store.clone(),
            analytics.clone(),
        ));
        Self {
            store,
            mailer,
            analytics,
            hooks,
            config,
        }
    }

    pub fn handler(&self) -> Result<DbAuthHandler> {
        self.handler_with(auth_options(&self.config))
    }

    pub fn handler_with(&self, options: DbAuthOptions) -> Result<DbAuthHandler> {
        DbAuthHandler::new(options, self.store.clone(), self.hooks.clone())
    }

    /// Handler whose password policy rejects every password.
    pub fn strict_handler(&self) -> Result<DbAuthHandler> {
        DbAuthHandler::new(
            auth_options(&self.config),
            self.store.clone(),
            Arc::new(RejectAllPasswords(self.hooks.clone())),
        )
    }
}

pub fn development() -> Result<AuthConfig> {
    AuthConfig::development()
}

/// Poll `check` until it holds or two seconds pass.
pub async fn wait_for<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

pub fn post(body: &Value) -> AuthRequest {
    AuthRequest {
        method: Method::POST,
        headers: HeaderMap::new(),
        query: HashMap::new(),
        body: Bytes::from(body.to_string()),
    }
}

pub fn get(method: &str) -> AuthRequest {
    AuthRequest {
        method: Method::GET,
        headers: HeaderMap::new(),
        query: HashMap::from([("method".to_string(), method.to_string())]),
        body: Bytes::new(),
    }
}

/// Attach `name=value` from a `Set-Cookie` header to a request.
pub fn with_cookie(mut request: AuthRequest, set_cookie: &str) -> Result<AuthRequest> {
    let pair = set_cookie
        .split(';')
        .next()
        .ok_or_else(|| anyhow!("empty Set-Cookie"))?;
    request.headers.insert(COOKIE, HeaderValue::from_str(pair)?);
    Ok(request)
}

/// The `resetToken` query parameter of a reset link.
pub fn reset_token_from(url: &str) -> Result<String> {
    let url = url::Url::parse(url)?;
    url.query_pairs()
        .find(|(key, _)| key == "resetToken")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| anyhow!("no resetToken in {url}"))
}

/// The application hooks with a password policy that nothing satisfies.
pub struct RejectAllPasswords(pub Arc<AppHooks>);

impl AuthHooks for RejectAllPasswords {
    fn forgot_password<'a>(&'a self, user: User, reset_token: &'a str) -> BoxFuture<'a, User> {
        self.0.forgot_password(user, reset_token)
    }

    fn login(&self, user: User) -> BoxFuture<'_, User> {
        self.0.login(user)
    }

    fn reset_password<'a>(&'a self, user: &'a User) -> BoxFuture<'a, bool> {
        self.0.reset_password(user)
    }

    fn signup(&self, input: SignupInput) -> BoxFuture<'_, SignupResult> {
        self.0.signup(input)
    }

    fn validate_password(&self, _password: &str) -> bool {
        false
    }
}
