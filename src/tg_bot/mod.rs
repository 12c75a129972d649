mod admin;
pub mod bot_config;
mod command;
mod endpoints;
pub mod helpers;
pub mod init;
mod notifications;

pub use notifications::notify_user;
