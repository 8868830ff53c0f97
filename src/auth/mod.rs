//! Authentication against Atlassian
//!
//! [`OAuthClient`] drives the authorization code flow and the token endpoint;
//! [`TokenRefreshGuard`] keeps stored access tokens fresh.

mod oauth;
mod refresh;

pub use oauth::{complete_authorization, CallbackError, OAuthClient, TokenResponse};
pub use refresh::TokenRefreshGuard;
