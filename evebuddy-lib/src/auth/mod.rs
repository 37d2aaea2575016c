//! EVE Online SSO authentication

mod client;
pub(crate) mod common;
mod config;
mod jwt;
mod pkce;
mod token;

pub use client::FlowState;
pub use client::PendingLogin;
pub use client::SsoClient;
pub use config::AUTHORIZE_URL;
pub use config::DISCOVERY_URL;
pub use config::EVE_AUDIENCE;
pub use config::SsoConfig;
pub use config::TOKEN_URL;
pub use jsonwebtoken::Algorithm;
pub use token::Token;
