//! Postgres implementation of the user, account and subscription stores.
//!
//! User-table column names come from the handler's [`AuthFields`], so the
//! queries are assembled once at construction from validated identifiers.

use anyhow::{Context, Result, anyhow};
use sqlx::{PgPool, Row, postgres::PgRow};
use std::sync::Arc;
use tracing::{Instrument, info_span};
use uuid::Uuid;

use crate::{
    BoxFuture,
    auth::AccountStore,
    dbauth::{AuthFields, UserStore, UsernameTaken},
    models::{Account, NewUser, Role, User},
    services::{NewSubscription, Subscriptions},
};

struct UserQueries {
    by_username: String,
    by_reset_token: String,
    set_reset_token: String,
    update_password: String,
    insert: String,
}

impl UserQueries {
    fn new(fields: &AuthFields) -> Self {
        let select = format!(
            "SELECT {id} AS id, {username} AS username, {hashed} AS hashed_password, \
             {salt} AS salt, name, account_id, role, {token} AS reset_token, \
             EXTRACT(EPOCH FROM {expires})::bigint AS reset_token_expires_at \
             FROM users",
            id = fields.id,
            username = fields.username,
            hashed = fields.hashed_password,
            salt = fields.salt,
            token = fields.reset_token,
            expires = fields.reset_token_expires_at,
        );
        Self {
            by_username: format!("{select} WHERE {} = $1", fields.username),
            by_reset_token: format!("{select} WHERE {} = $1", fields.reset_token),
            set_reset_token: format!(
                "UPDATE users SET {token} = $2, {expires} = to_timestamp($3::bigint), \
                 updated_at = NOW() WHERE {id} = $1",
                token = fields.reset_token,
                expires = fields.reset_token_expires_at,
                id = fields.id,
            ),
            update_password: format!(
                "UPDATE users SET {hashed} = $2, {salt} = $3, {token} = NULL, \
                 {expires} = NULL, updated_at = NOW() WHERE {id} = $1",
                hashed = fields.hashed_password,
                salt = fields.salt,
                token = fields.reset_token,
                expires = fields.reset_token_expires_at,
                id = fields.id,
            ),
            insert: format!(
                "INSERT INTO users ({username}, {hashed}, {salt}, name, account_id, role) \
                 VALUES ($1, $2, $3, $4, $5, $6) RETURNING {id} AS id",
                username = fields.username,
                hashed = fields.hashed_password,
                salt = fields.salt,
                id = fields.id,
            ),
        }
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    queries: Arc<UserQueries>,
}

impl PgStore {
    /// # Errors
    /// Returns an error if the field mapping contains invalid column names.
    pub fn new(pool: PgPool, fields: &AuthFields) -> Result<Self> {
        fields.validate()?;
        Ok(Self {
            pool,
            queries: Arc::new(UserQueries::new(fields)),
        })
    }

    async fn fetch_user(&self, key: UserKey<'_>) -> Result<Option<User>> {
        let query = match key {
            UserKey::Username(_) => self.queries.by_username.as_str(),
            UserKey::ResetToken(_) => self.queries.by_reset_token.as_str(),
        };
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let statement = sqlx::query(query);
        let statement = match key {
            UserKey::Username(username) => statement.bind(username),
            UserKey::ResetToken(hash) => statement.bind(hash),
        };
        let row = statement
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user")?;
        row.as_ref().map(user_from_row).transpose()
    }
}

#[derive(Clone, Copy)]
enum UserKey<'a> {
    Username(&'a str),
    ResetToken(&'a [u8]),
}

fn user_from_row(row: &PgRow) -> Result<User> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("username")?,
        hashed_password: row.try_get("hashed_password")?,
        salt: row.try_get("salt")?,
        name: row.try_get("name")?,
        account_id: row.try_get("account_id")?,
        role: role.parse::<Role>().map_err(|err| anyhow!(err))?,
        reset_token: row.try_get("reset_token")?,
        reset_token_expires_at: row.try_get("reset_token_expires_at")?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

impl UserStore for PgStore {
    fn find_user_by_username<'a>(&'a self, username: &'a str) -> BoxFuture<'a, Option<User>> {
        Box::pin(async move {
            self.fetch_user(UserKey::Username(username)).await
        })
    }

    fn find_user_by_reset_token<'a>(
        &'a self,
        token_hash: &'a [u8],
    ) -> BoxFuture<'a, Option<User>> {
        Box::pin(async move {
            self.fetch_user(UserKey::ResetToken(token_hash)).await
        })
    }

    fn set_reset_token(&self, user_id: Uuid, token: Option<(Vec<u8>, i64)>) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let query = self.queries.set_reset_token.as_str();
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "UPDATE",
                db.statement = query
            );
            let (hash, expires_at) = token.unzip();
            sqlx::query(query)
                .bind(user_id)
                .bind(hash)
                .bind(expires_at)
                .execute(&self.pool)
                .instrument(span)
                .await
                .context("failed to store reset token")?;
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
            let query = self.queries.update_password.as_str();
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "UPDATE",
                db.statement = query
            );
            sqlx::query(query)
                .bind(user_id)
                .bind(hashed_password)
                .bind(salt)
                .execute(&self.pool)
                .instrument(span)
                .await
                .context("failed to update password")?;
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
            let query = r"
                INSERT INTO user_sessions (user_id, session_hash, expires_at)
                VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
            ";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = query
            );
            sqlx::query(query)
                .bind(user_id)
                .bind(token_hash)
                .bind(ttl_seconds)
                .execute(&self.pool)
                .instrument(span)
                .await
                .context("failed to insert session")?;
            Ok(())
        })
    }

    fn lookup_session<'a>(&'a self, token_hash: &'a [u8]) -> BoxFuture<'a, Option<Uuid>> {
        Box::pin(async move {
            let query = r"
                SELECT user_id
                FROM user_sessions
                WHERE session_hash = $1
                  AND expires_at > NOW()
                LIMIT 1
            ";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query
            );
            let row = sqlx::query(query)
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .instrument(span)
                .await
                .context("failed to lookup session")?;
            Ok(row.map(|row| row.get("user_id")))
        })
    }

    fn delete_session<'a>(&'a self, token_hash: &'a [u8]) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let query = "DELETE FROM user_sessions WHERE session_hash = $1";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "DELETE",
                db.statement = query
            );
            sqlx::query(query)
                .bind(token_hash)
                .execute(&self.pool)
                .instrument(span)
                .await
                .context("failed to delete session")?;
            Ok(())
        })
    }
}

impl AccountStore for PgStore {
    fn create_account<'a>(&'a self, api_key: &'a str) -> BoxFuture<'a, Account> {
        Box::pin(async move {
            let query = "INSERT INTO accounts (api_key) VALUES ($1) RETURNING id";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = query
            );
            let row = sqlx::query(query)
                .bind(api_key)
                .fetch_one(&self.pool)
                .instrument(span)
                .await
                .context("failed to insert account")?;
            Ok(Account {
                id: row.get("id"),
                api_key: api_key.to_string(),
            })
        })
    }

    fn delete_account(&self, id: Uuid) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let query = "DELETE FROM accounts WHERE id = $1";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "DELETE",
                db.statement = query
            );
            sqlx::query(query)
                .bind(id)
                .execute(&self.pool)
                .instrument(span)
                .await
                .context("failed to delete account")?;
            Ok(())
        })
    }

    fn create_user(&self, user: NewUser) -> BoxFuture<'_, User> {
        Box::pin(async move {
            let query = self.queries.insert.as_str();
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = query
            );
            let row = sqlx::query(query)
                .bind(&user.email)
                .bind(&user.hashed_password)
                .bind(&user.salt)
                .bind(&user.name)
                .bind(user.account_id)
                .bind(user.role.as_str())
                .fetch_one(&self.pool)
                .instrument(span)
                .await
                .map_err(|err| {
                    if is_unique_violation(&err) {
                        anyhow::Error::new(UsernameTaken(user.email.clone()))
                    } else {
                        anyhow::Error::new(err).context("failed to insert user")
                    }
                })?;

            Ok(User {
                id: row.get("id"),
                email: user.email,
                hashed_password: user.hashed_password,
                salt: user.salt,
                name: user.name,
                account_id: user.account_id,
                role: user.role,
                reset_token: None,
                reset_token_expires_at: None,
            })
        })
    }
}

impl Subscriptions for PgStore {
    fn create_subscription(&self, subscription: NewSubscription) -> BoxFuture<'_, Uuid> {
        Box::pin(async move {
            let query = r"
                INSERT INTO subscriptions (account_id, plan_id, status, trial_ends_at)
                VALUES ($1, $2, 'trialing', NOW() + ($3 * INTERVAL '1 day'))
                RETURNING id
            ";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = query
            );
            let row = sqlx::query(query)
                .bind(subscription.account_id)
                .bind(&subscription.plan_id)
                .bind(i32::try_from(subscription.trial_days).unwrap_or(i32::MAX))
                .fetch_one(&self.pool)
                .instrument(span)
                .await
                .context("failed to insert subscription")?;
            Ok(row.get("id"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> AuthFields {
        AuthFields {
            id: "id".to_string(),
            username: "email".to_string(),
            hashed_password: "hashed_password".to_string(),
            salt: "salt".to_string(),
            reset_token: "reset_token".to_string(),
            reset_token_expires_at: "reset_token_expires_at".to_string(),
            challenge: "webauthn_challenge".to_string(),
        }
    }

    #[test]
    fn queries_use_mapped_columns() {
        let mut fields = fields();
        fields.username = "login_email".to_string();
        let queries = UserQueries::new(&fields);
        assert!(queries.by_username.ends_with("WHERE login_email = $1"));
        assert!(queries.by_username.contains("login_email AS username"));
        assert!(queries.insert.starts_with("INSERT INTO users (login_email,"));
        assert!(queries.update_password.contains("reset_token = NULL"));
    }

    #[test]
    fn unique_violation_only_for_database_errors() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[tokio::test]
    async fn rejects_invalid_columns() -> Result<()> {
        let pool = sqlx::postgres::PgPoolOptions::new().connect_lazy("postgres://localhost/dbauth")?;
        let mut fields = fields();
        fields.salt = "salt; DROP TABLE users".to_string();
        assert!(PgStore::new(pool, &fields).is_err());
        Ok(())
    }
}
