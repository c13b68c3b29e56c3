//! Application auth configuration: handler options and callbacks.

mod config;
mod hooks;

pub use config::{
    AuthConfig, DEFAULT_COOKIE_NAME, DEFAULT_DEV_BASE_URL, DEFAULT_TRIAL_DAYS, Environment,
    LOGIN_EXPIRES, PlanIds, RESET_TOKEN_EXPIRES, auth_options,
};
pub use hooks::{AccountStore, AppHooks, new_api_key};
