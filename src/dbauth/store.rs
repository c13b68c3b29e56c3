//! Storage and callback seams of the auth handler.

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::BoxFuture;
use crate::models::User;

/// Persistence the handler needs for users and sessions.
pub trait UserStore: Send + Sync {
    fn find_user_by_username<'a>(&'a self, username: &'a str) -> BoxFuture<'a, Option<User>>;

    fn find_user_by_reset_token<'a>(&'a self, token_hash: &'a [u8])
    -> BoxFuture<'a, Option<User>>;

    /// Store a reset token hash and its expiry (unix seconds), or clear both with `None`.
    fn set_reset_token(
        &self,
        user_id: Uuid,
        token: Option<(Vec<u8>, i64)>,
    ) -> BoxFuture<'_, ()>;

    /// Replace the password and clear any outstanding reset token.
    fn update_password<'a>(
        &'a self,
        user_id: Uuid,
        hashed_password: &'a str,
        salt: &'a str,
    ) -> BoxFuture<'a, ()>;

    fn insert_session<'a>(
        &'a self,
        user_id: Uuid,
        token_hash: &'a [u8],
        ttl_seconds: i64,
    ) -> BoxFuture<'a, ()>;

    /// Resolve an unexpired session to its user id.
    fn lookup_session<'a>(&'a self, token_hash: &'a [u8]) -> BoxFuture<'a, Option<Uuid>>;

    fn delete_session<'a>(&'a self, token_hash: &'a [u8]) -> BoxFuture<'a, ()>;
}

/// What the handler passes to the signup callback once the request is validated.
#[derive(Clone, Debug)]
pub struct SignupInput {
    pub username: String,
    pub hashed_password: String,
    pub salt: String,
    pub user_attributes: Map<String, Value>,
}

#[derive(Clone, Debug)]
pub enum SignupResult {
    /// The created user; the handler logs them in.
    User(User),
    /// A message for the client; nobody is logged in.
    Message(String),
}

/// Application callbacks invoked at fixed points of each flow.
///
/// Errors returned here are shown to the client as the flow's error message.
pub trait AuthHooks: Send + Sync {
    fn forgot_password<'a>(&'a self, user: User, reset_token: &'a str) -> BoxFuture<'a, User>;

    fn login(&self, user: User) -> BoxFuture<'_, User>;

    /// Returning `true` logs the user in after the password change.
    fn reset_password<'a>(&'a self, user: &'a User) -> BoxFuture<'a, bool>;

    fn signup(&self, input: SignupInput) -> BoxFuture<'_, SignupResult>;

    fn validate_password(&self, password: &str) -> bool;
}
