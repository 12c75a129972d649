pub mod app_context;
pub mod constants;
pub mod settings;
