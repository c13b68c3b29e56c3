//! Database-backed auth handler.
//!
//! A single endpoint serves every auth action. The action is named by the
//! `method` field of a JSON `POST` body, or by the `method` query parameter on
//! `GET`:
//!
//! | method               | verb | result                                     |
//! |----------------------|------|--------------------------------------------|
//! | `login`              | POST | session cookie + `{"id"}`                  |
//! | `logout`             | POST | cookie cleared                             |
//! | `signup`             | POST | session cookie + `{"id"}`, or `{"message"}` |
//! | `forgotPassword`     | POST | reset token issued, sanitized user         |
//! | `validateResetToken` | POST | sanitized user                             |
//! | `resetPassword`      | POST | new password stored, optional login        |
//! | `getToken`           | GET  | current user id as text                    |
//! | `webAuthn*`          | both | rejected unless WebAuthn is enabled        |
//!
//! Application behavior is plugged in through [`AuthHooks`]; persistence
//! through [`UserStore`]. Failures are answered as `{"error": "<message>"}`
//! with the messages configured in [`DbAuthOptions`].

mod cookie;
pub mod crypto;
mod error;
mod handler;
mod options;
mod request;
mod store;

pub use error::{DbAuthError, UsernameTaken, render};
pub use handler::{AuthMethod, DbAuthHandler};
pub use options::{
    AuthFields, CookieOptions, DbAuthOptions, ForgotPasswordErrors, ForgotPasswordOptions,
    LoginErrors, LoginOptions, ResetPasswordErrors, ResetPasswordOptions, SameSite, SignupErrors,
    SignupOptions, WebAuthnCredentialFields, WebAuthnDeviceType, WebAuthnOptions,
};
pub use request::{AuthRequest, AuthResponse};
pub use store::{AuthHooks, SignupInput, SignupResult, UserStore};
