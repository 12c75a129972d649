pub mod cycle_ticker;
pub mod registry;
pub mod trading_worker;

use crate::config::app_context::AppContext;
use crate::storage::persistent;
use anyhow::Result;
use tracing::info;

pub async fn start_auto_trading(context: &AppContext, user_id: i32) -> bool {
    let worker_context = context.clone();
    context
        .workers
        .start(user_id, move |stop| {
            trading_worker::run_trading_worker(worker_context, user_id, stop)
        })
        .await
}

pub async fn stop_auto_trading(context: &AppContext, user_id: i32) -> bool {
    context.workers.stop(user_id).await
}

/// Restarts the loops of every user that had auto trading on before the restart.
pub async fn resume_enabled_workers(context: &AppContext) -> Result<usize> {
    let mut resumed = 0;
    for user in persistent::list_auto_trading_users(&context.db_pool).await? {
        if start_auto_trading(context, user.id).await {
            resumed += 1;
        }
    }
    info!("Resumed {resumed} simulated trading loops");
    Ok(resumed)
}
