use crate::config::app_context::AppContext;

pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Clone)]
pub struct BotConfig {
    pub context: AppContext,
}
