// src/lib.rs

pub mod auth;
pub mod crypto;
pub mod db;
pub mod eventbus;
pub mod platforms;
pub mod repositories;
pub mod services;
pub mod tasks;
pub mod test_utils;

pub use db::Database;
pub use lealbot_common::error::Error;
