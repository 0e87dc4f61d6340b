// File: lealbot-core/src/tasks/mod.rs

pub mod token_refresh;
pub mod vip_grant;

pub use token_refresh::spawn_token_refresh_task;
pub use vip_grant::spawn_vip_grant_task;
