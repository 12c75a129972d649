pub mod persistent;
pub mod session_store;
