use crate::tg_bot::bot_config::BotConfig;
use crate::tg_bot::command::{AdminCommand, UserCommand};
use crate::tg_bot::{admin, endpoints};
use teloxide::dptree::{self, case};
use std::error::Error as StdError;
use teloxide::dispatching::{DefaultKey, Dispatcher, UpdateHandler};
use teloxide::prelude::*;
use tracing::{debug, warn};

fn schema(
    whitelisted_chat_ids: Option<Vec<i64>>,
    admin_chat_ids: Vec<i64>,
) -> UpdateHandler<Box<dyn StdError + Send + Sync + 'static>> {
    let user_commands = teloxide::filter_command::<UserCommand, _>().branch(
        dptree::filter(move |msg: Message| match &whitelisted_chat_ids {
            None => msg.chat.is_private(),
            Some(whitelisted) => {
                debug!("message chat id: {}", msg.chat.id.0);
                whitelisted.contains(&msg.chat.id.0)
            }
        })
        .branch(case![UserCommand::Start].endpoint(endpoints::start))
        .branch(case![UserCommand::Simulate].endpoint(endpoints::simulate))
        .branch(case![UserCommand::Balance].endpoint(endpoints::balance))
        .branch(case![UserCommand::History].endpoint(endpoints::history))
        .branch(case![UserCommand::Cycle].endpoint(endpoints::cycle))
        .branch(case![UserCommand::Withdraw(amount)].endpoint(endpoints::withdraw))
        .branch(case![UserCommand::Stop].endpoint(endpoints::stop))
        .branch(case![UserCommand::Help].endpoint(endpoints::help)),
    );

    let admin_commands = teloxide::filter_command::<AdminCommand, _>().branch(
        dptree::filter(move |msg: Message| admin_chat_ids.contains(&msg.chat.id.0))
            .branch(case![AdminCommand::Credit(target, amount, note)].endpoint(admin::credit))
            .branch(case![AdminCommand::Debit(target, amount, note)].endpoint(admin::debit))
            .branch(case![AdminCommand::StartCycle(target, initial, daily_roi)].endpoint(admin::start_cycle))
            .branch(case![AdminCommand::PauseCycle(target)].endpoint(admin::pause_cycle))
            .branch(case![AdminCommand::ResumeCycle(target)].endpoint(admin::resume_cycle))
            .branch(case![AdminCommand::SetRoi(target, percentage)].endpoint(admin::set_roi))
            .branch(case![AdminCommand::AutoOn(target)].endpoint(admin::auto_on))
            .branch(case![AdminCommand::AutoOff(target)].endpoint(admin::auto_off))
            .branch(case![AdminCommand::Buy(symbol, entry)].endpoint(admin::buy))
            .branch(case![AdminCommand::Sell(symbol, exit)].endpoint(admin::sell))
            .branch(case![AdminCommand::Withdrawals].endpoint(admin::withdrawals))
            .branch(case![AdminCommand::Approve(tx_id)].endpoint(admin::approve))
            .branch(case![AdminCommand::Reject(tx_id)].endpoint(admin::reject))
            .branch(case![AdminCommand::Users].endpoint(admin::users))
            .branch(case![AdminCommand::AdminHelp].endpoint(admin::admin_help)),
    );

    Update::filter_message()
        .branch(admin_commands)
        .branch(user_commands)
}

pub async fn build_dispatcher(
    bot: Bot,
    config: &BotConfig,
) -> Dispatcher<Bot, Box<dyn StdError + Send + Sync + 'static>, DefaultKey> {
    let (whitelisted_chat_ids, admin_chat_ids) = {
        let settings = config.context.get_settings().await;
        (
            settings.tgbot.as_ref().and_then(|tg| tg.whitelisted_chat_ids.clone()),
            settings.admin_chat_ids(),
        )
    };

    Dispatcher::builder(bot, schema(whitelisted_chat_ids, admin_chat_ids))
        .dependencies(dptree::deps![config.clone()])
        .default_handler(|upd| async move {
            warn!("unhandled update: {:?}", upd);
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "an error has occurred in the dispatcher",
        ))
        .enable_ctrlc_handler()
        .build()
}
