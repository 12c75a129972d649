pub mod bot_user;
pub mod cycle;
pub mod ledger;
pub mod position;
