// File: lealbot-core/src/platforms/mod.rs

pub mod twitch;

pub use twitch::helix::HelixClient;
pub use twitch::oauth::TwitchOauthClient;
