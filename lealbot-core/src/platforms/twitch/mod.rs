// File: lealbot-core/src/platforms/twitch/mod.rs

pub mod helix;
pub mod oauth;

pub use helix::HelixClient;
pub use oauth::TwitchOauthClient;
