use crate::schema::{profits, trading_cycles, trading_positions, transactions, users};
use crate::simulation::cycle::{self, CycleConfig, TickOutcome};
use crate::simulation::ledger;
use crate::simulation::trade_generator::SimulatedTrade;
use crate::simulation::SimulationError;
use crate::types::bot_user::{BotUser, NewBotUser, UserStatus};
use crate::types::cycle::{CycleStatus, TradingCycle};
use crate::types::ledger::{NewProfit, NewTransaction, Profit, Transaction, TxKind, TxStatus};
use crate::types::position::{
    NewTradingPosition, PositionStatus, TradingPosition, TRADE_TYPE_ADMIN, TRADE_TYPE_AUTO,
};
use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::pooled_connection::deadpool::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use std::sync::Arc;
use teloxide::types::User as TelegramUser;
use tracing::{debug, info, warn};

pub type DbPool = Arc<Pool<AsyncPgConnection>>;

pub fn connect(database_url: &str) -> Result<DbPool> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    Ok(Arc::new(Pool::builder(manager).build()?))
}

#[derive(Debug, Clone)]
pub enum UserLookup {
    TelegramId(i64),
    Username(String),
}

#[derive(Debug, Clone)]
pub struct BalanceAdjustment {
    pub user: BotUser,
    pub previous_balance: f64,
    pub transaction: Transaction,
    pub cycle: Option<TradingCycle>,
    pub cycle_completed: bool,
}

#[derive(Debug, Clone)]
pub struct RecordedTrade {
    pub user: BotUser,
    pub position: TradingPosition,
    /// The pnl that was actually booked after clamping at zero.
    pub pnl: f64,
}

#[derive(Debug, Clone)]
pub struct CycleTick {
    pub user: BotUser,
    pub cycle: TradingCycle,
    pub outcome: TickOutcome,
}

pub async fn load_or_create_user(pool: &DbPool, user_data: &TelegramUser) -> Result<BotUser> {
    let mut conn = pool.get().await?;
    let existing = users::table
        .filter(users::telegram_id.eq(user_data.id.0 as i64))
        .select(BotUser::as_select())
        .first(&mut conn)
        .await
        .optional()?;
    match existing {
        Some(existing_user) => Ok(diesel::update(users::table.find(existing_user.id))
            .set((
                users::last_activity.eq(Utc::now().naive_utc()),
                users::username.eq(user_data.username.clone()),
            ))
            .returning(BotUser::as_returning())
            .get_result(&mut conn)
            .await?),
        None => {
            let user = diesel::insert_into(users::table)
                .values(NewBotUser::new_from_tg_user(user_data))
                .returning(BotUser::as_returning())
                .get_result(&mut conn)
                .await?;
            info!("Registered user {} ({})", user.id, user.display_name());
            Ok(user)
        }
    }
}

pub async fn get_user(pool: &DbPool, user_id: i32) -> Result<Option<BotUser>> {
    let mut conn = pool.get().await?;
    Ok(users::table
        .find(user_id)
        .select(BotUser::as_select())
        .first(&mut conn)
        .await
        .optional()?)
}

pub async fn find_user(pool: &DbPool, lookup: &UserLookup) -> Result<BotUser> {
    let mut conn = pool.get().await?;
    let query = users::table.select(BotUser::as_select()).into_boxed();
    let query = match lookup {
        UserLookup::TelegramId(telegram_id) => query.filter(users::telegram_id.eq(*telegram_id)),
        UserLookup::Username(username) => {
            query.filter(users::username.eq(username.trim_start_matches('@').to_string()))
        }
    };
    query
        .first(&mut conn)
        .await
        .optional()?
        .ok_or_else(|| SimulationError::UserNotFound(format!("{lookup:?}")).into())
}

pub async fn list_auto_trading_users(pool: &DbPool) -> Result<Vec<BotUser>> {
    let mut conn = pool.get().await?;
    Ok(users::table
        .filter(users::auto_trading_enabled.eq(true))
        .select(BotUser::as_select())
        .load(&mut conn)
        .await?)
}

pub async fn list_users(pool: &DbPool) -> Result<Vec<BotUser>> {
    let mut conn = pool.get().await?;
    Ok(users::table
        .select(BotUser::as_select())
        .order(users::id)
        .load(&mut conn)
        .await?)
}

pub async fn list_active_users(pool: &DbPool) -> Result<Vec<BotUser>> {
    let mut conn = pool.get().await?;
    Ok(users::table
        .filter(users::status.eq(UserStatus::Active))
        .select(BotUser::as_select())
        .order(users::id)
        .load(&mut conn)
        .await?)
}

pub async fn set_auto_trading(pool: &DbPool, user_id: i32, enabled: bool) -> Result<BotUser> {
    let mut conn = pool.get().await?;
    Ok(diesel::update(users::table.find(user_id))
        .set(users::auto_trading_enabled.eq(enabled))
        .returning(BotUser::as_returning())
        .get_result(&mut conn)
        .await?)
}

async fn lock_user(conn: &mut AsyncPgConnection, user_id: i32) -> Result<BotUser> {
    users::table
        .find(user_id)
        .select(BotUser::as_select())
        .for_update()
        .get_result(conn)
        .await
        .optional()?
        .ok_or_else(|| SimulationError::UserNotFound(user_id.to_string()).into())
}

async fn set_balance(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    balance: f64,
    status: UserStatus,
    initial_deposit: f64,
) -> Result<BotUser> {
    Ok(diesel::update(users::table.find(user_id))
        .set((
            users::balance.eq(balance),
            users::status.eq(status),
            users::initial_deposit.eq(initial_deposit),
            users::last_activity.eq(Utc::now().naive_utc()),
        ))
        .returning(BotUser::as_returning())
        .get_result(conn)
        .await?)
}

async fn insert_transaction(conn: &mut AsyncPgConnection, tx: NewTransaction) -> Result<Transaction> {
    Ok(diesel::insert_into(transactions::table)
        .values(tx)
        .returning(Transaction::as_returning())
        .get_result(conn)
        .await?)
}

/// Adds to the day's profit row, creating it on first use.
async fn upsert_profit(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    date: NaiveDate,
    amount: f64,
    percentage: f64,
) -> Result<()> {
    diesel::insert_into(profits::table)
        .values(NewProfit {
            user_id,
            amount,
            percentage,
            date,
        })
        .on_conflict((profits::user_id, profits::date))
        .do_update()
        .set((
            profits::amount.eq(profits::amount + excluded(profits::amount)),
            profits::percentage.eq(profits::percentage + excluded(profits::percentage)),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

fn pnl_percentage(pnl: f64, balance_before: f64) -> f64 {
    if balance_before > 0.0 {
        pnl / balance_before * 100.0
    } else {
        0.0
    }
}

/// `/simulate`: grants the configured starting balance once, otherwise waits for an admin credit.
pub async fn request_paper_funds(pool: &DbPool, user_id: i32, starting_balance: f64) -> Result<BotUser> {
    let mut conn = pool.get().await?;
    conn.transaction::<_, anyhow::Error, _>(|conn| {
        async move {
            let user = lock_user(conn, user_id).await?;
            if user.status == UserStatus::Active || user.initial_deposit > 0.0 {
                return Ok(user);
            }
            if starting_balance <= 0.0 {
                return set_balance(conn, user_id, user.balance, UserStatus::Depositing, user.initial_deposit)
                    .await;
            }
            let balance = ledger::credit(user.balance, starting_balance)?;
            insert_transaction(
                conn,
                NewTransaction::completed(
                    user_id,
                    TxKind::Deposit,
                    starting_balance,
                    Some("paper starting balance".to_string()),
                ),
            )
            .await?;
            set_balance(
                conn,
                user_id,
                balance,
                UserStatus::Active,
                user.initial_deposit + starting_balance,
            )
            .await
        }
        .scope_boxed()
    })
    .await
}

/// Admin credit (positive) or debit (negative) of paper SOL. Debits never go below zero.
pub async fn adjust_balance(
    pool: &DbPool,
    user_id: i32,
    delta: f64,
    note: Option<String>,
    admin_id: Option<i64>,
    cycle_config: &CycleConfig,
) -> Result<BalanceAdjustment> {
    let cycle_config = cycle_config.clone();
    let mut conn = pool.get().await?;
    conn.transaction::<_, anyhow::Error, _>(|conn| {
        async move {
            let now = Utc::now().naive_utc();
            let user = lock_user(conn, user_id).await?;
            let balance = ledger::adjust(user.balance, delta)?;
            let (kind, status, initial_deposit) = if delta >= 0.0 {
                (TxKind::AdminCredit, UserStatus::Active, user.initial_deposit + delta)
            } else {
                (TxKind::AdminDebit, user.status, user.initial_deposit)
            };
            let admin = admin_id.map_or_else(|| "cli".to_string(), |id| id.to_string());
            let notes = match note {
                Some(note) => format!("admin {admin}: {note}"),
                None => format!("admin {admin}"),
            };
            let transaction =
                insert_transaction(conn, NewTransaction::completed(user_id, kind, delta, Some(notes))).await?;
            let updated = set_balance(conn, user_id, balance, status, initial_deposit).await?;

            let mut cycle_completed = false;
            let cycle = match open_cycle_for_update(conn, user_id).await? {
                Some(mut open) => {
                    cycle_completed = cycle::apply_balance_adjustment(&mut open, delta, now);
                    Some(save_cycle(conn, &open).await?)
                }
                None if delta > 0.0 => Some(create_cycle(conn, user_id, balance, None, &cycle_config, now).await?),
                None => None,
            };
            Ok(BalanceAdjustment {
                user: updated,
                previous_balance: user.balance,
                transaction,
                cycle,
                cycle_completed,
            })
        }
        .scope_boxed()
    })
    .await
}

pub async fn request_withdrawal(
    pool: &DbPool,
    user_id: i32,
    amount: f64,
    minimum: f64,
) -> Result<(BotUser, Transaction)> {
    let mut conn = pool.get().await?;
    conn.transaction::<_, anyhow::Error, _>(|conn| {
        async move {
            let user = lock_user(conn, user_id).await?;
            let balance = ledger::withdraw(user.balance, amount, minimum)?;
            let tx = insert_transaction(conn, NewTransaction::pending_withdrawal(user_id, amount)).await?;
            let user = set_balance(conn, user_id, balance, user.status, user.initial_deposit).await?;
            Ok((user, tx))
        }
        .scope_boxed()
    })
    .await
}

/// Approve completes the pending withdrawal, reject fails it and refunds the amount.
pub async fn resolve_withdrawal(pool: &DbPool, tx_id: i32, approve: bool) -> Result<(BotUser, Transaction)> {
    let mut conn = pool.get().await?;
    conn.transaction::<_, anyhow::Error, _>(|conn| {
        async move {
            let tx: Transaction = transactions::table
                .find(tx_id)
                .filter(transactions::kind.eq(TxKind::Withdraw))
                .select(Transaction::as_select())
                .for_update()
                .get_result(conn)
                .await?;
            if tx.status != TxStatus::Pending {
                return Err(SimulationError::WithdrawalNotPending {
                    id: tx.id,
                    status: tx.status,
                }
                .into());
            }
            let user = lock_user(conn, tx.user_id).await?;
            let (status, user) = if approve {
                (TxStatus::Completed, user)
            } else {
                let balance = ledger::credit(user.balance, tx.amount)?;
                let user = set_balance(conn, user.id, balance, user.status, user.initial_deposit).await?;
                (TxStatus::Failed, user)
            };
            let tx = diesel::update(transactions::table.find(tx_id))
                .set((
                    transactions::status.eq(status),
                    transactions::processed_at.eq(Some(Utc::now().naive_utc())),
                ))
                .returning(Transaction::as_returning())
                .get_result(conn)
                .await?;
            Ok((user, tx))
        }
        .scope_boxed()
    })
    .await
}

pub async fn pending_withdrawals(pool: &DbPool) -> Result<Vec<Transaction>> {
    let mut conn = pool.get().await?;
    Ok(transactions::table
        .filter(transactions::kind.eq(TxKind::Withdraw))
        .filter(transactions::status.eq(TxStatus::Pending))
        .order(transactions::timestamp.asc())
        .select(Transaction::as_select())
        .load(&mut conn)
        .await?)
}

/// Books one simulated trade: closed position, ledger row, daily profit and balance in one transaction.
pub async fn record_simulated_trade(pool: &DbPool, user_id: i32, trade: SimulatedTrade) -> Result<RecordedTrade> {
    let mut conn = pool.get().await?;
    conn.transaction::<_, anyhow::Error, _>(|conn| {
        async move {
            let user = lock_user(conn, user_id).await?;
            let (balance, pnl) = ledger::apply_pnl(user.balance, trade.pnl);
            let roi_percentage = if trade.stake > 0.0 {
                pnl / trade.stake * 100.0
            } else {
                0.0
            };
            let position = diesel::insert_into(trading_positions::table)
                .values(NewTradingPosition {
                    user_id,
                    token_name: trade.token_name.clone(),
                    token_symbol: trade.token_symbol.clone(),
                    amount: trade.stake,
                    entry_price: trade.entry_price,
                    exit_price: Some(trade.exit_price),
                    status: PositionStatus::Closed,
                    trade_type: TRADE_TYPE_AUTO.to_string(),
                    opened_at: trade.opened_at,
                    closed_at: Some(trade.closed_at),
                    roi_percentage: Some(roi_percentage),
                    created_by: None,
                })
                .returning(TradingPosition::as_returning())
                .get_result(conn)
                .await?;
            let notes = format!(
                "simulated trade: entry {:.8} exit {:.8} stake {:.4}",
                trade.entry_price, trade.exit_price, trade.stake
            );
            insert_transaction(
                conn,
                NewTransaction::completed(user_id, TxKind::for_pnl(pnl), pnl, Some(notes))
                    .with_token(trade.token_name.clone(), trade.exit_price)
                    .with_position(position.id),
            )
            .await?;
            upsert_profit(
                conn,
                user_id,
                trade.closed_at.date(),
                pnl,
                pnl_percentage(pnl, user.balance),
            )
            .await?;
            let user = set_balance(conn, user_id, balance, user.status, user.initial_deposit).await?;
            Ok(RecordedTrade { user, position, pnl })
        }
        .scope_boxed()
    })
    .await
}

/// Newest first.
pub async fn recent_profits(pool: &DbPool, user_id: i32, limit: i64) -> Result<Vec<Profit>> {
    let mut conn = pool.get().await?;
    Ok(profits::table
        .filter(profits::user_id.eq(user_id))
        .order(profits::date.desc())
        .limit(limit)
        .select(Profit::as_select())
        .load(&mut conn)
        .await?)
}

pub async fn recent_positions(pool: &DbPool, user_id: i32, limit: i64) -> Result<Vec<TradingPosition>> {
    let mut conn = pool.get().await?;
    Ok(trading_positions::table
        .filter(trading_positions::user_id.eq(user_id))
        .order(trading_positions::opened_at.desc())
        .limit(limit)
        .select(TradingPosition::as_select())
        .load(&mut conn)
        .await?)
}

pub async fn recent_transactions(pool: &DbPool, user_id: i32, limit: i64) -> Result<Vec<Transaction>> {
    let mut conn = pool.get().await?;
    Ok(transactions::table
        .filter(transactions::user_id.eq(user_id))
        .order(transactions::timestamp.desc())
        .limit(limit)
        .select(Transaction::as_select())
        .load(&mut conn)
        .await?)
}

async fn open_cycle_for_update(conn: &mut AsyncPgConnection, user_id: i32) -> Result<Option<TradingCycle>> {
    Ok(trading_cycles::table
        .filter(trading_cycles::user_id.eq(user_id))
        .filter(trading_cycles::status.ne(CycleStatus::Completed))
        .order(trading_cycles::start_date.desc())
        .select(TradingCycle::as_select())
        .for_update()
        .first(conn)
        .await
        .optional()?)
}

async fn save_cycle(conn: &mut AsyncPgConnection, cycle: &TradingCycle) -> Result<TradingCycle> {
    Ok(diesel::update(trading_cycles::table.find(cycle.id))
        .set(cycle)
        .returning(TradingCycle::as_returning())
        .get_result(conn)
        .await?)
}

async fn create_cycle(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    initial_balance: f64,
    daily_roi: Option<f64>,
    config: &CycleConfig,
    now: NaiveDateTime,
) -> Result<TradingCycle> {
    let plan = cycle::plan_cycle(user_id, initial_balance, daily_roi, config, now)?;
    let mut created = diesel::insert_into(trading_cycles::table)
        .values(plan)
        .returning(TradingCycle::as_returning())
        .get_result(conn)
        .await?;
    cycle::begin(&mut created, now)?;
    let started = save_cycle(conn, &created).await?;
    info!(
        "Started cycle {} for user {user_id}: {:.4} -> {:.4} SOL at {:.2}%/day",
        started.id, started.initial_balance, started.target_balance, started.daily_roi_percentage
    );
    Ok(started)
}

pub async fn open_cycle(pool: &DbPool, user_id: i32) -> Result<Option<TradingCycle>> {
    let mut conn = pool.get().await?;
    Ok(trading_cycles::table
        .filter(trading_cycles::user_id.eq(user_id))
        .filter(trading_cycles::status.ne(CycleStatus::Completed))
        .order(trading_cycles::start_date.desc())
        .select(TradingCycle::as_select())
        .first(&mut conn)
        .await
        .optional()?)
}

pub async fn cycle_history(pool: &DbPool, user_id: i32, limit: i64) -> Result<Vec<TradingCycle>> {
    let mut conn = pool.get().await?;
    Ok(trading_cycles::table
        .filter(trading_cycles::user_id.eq(user_id))
        .order(trading_cycles::start_date.desc())
        .limit(limit)
        .select(TradingCycle::as_select())
        .load(&mut conn)
        .await?)
}

/// Completes any open cycle of the user and begins a new one.
pub async fn start_cycle(
    pool: &DbPool,
    user_id: i32,
    initial_balance: Option<f64>,
    daily_roi: Option<f64>,
    config: &CycleConfig,
) -> Result<TradingCycle> {
    let config = config.clone();
    let mut conn = pool.get().await?;
    conn.transaction::<_, anyhow::Error, _>(|conn| {
        async move {
            let now = Utc::now().naive_utc();
            let user = lock_user(conn, user_id).await?;
            if let Some(mut open) = open_cycle_for_update(conn, user_id).await? {
                cycle::complete(&mut open, now)?;
                save_cycle(conn, &open).await?;
                debug!("Closed cycle {} before starting a new one", open.id);
            }
            create_cycle(
                conn,
                user_id,
                initial_balance.unwrap_or(user.balance),
                daily_roi,
                &config,
                now,
            )
            .await
        }
        .scope_boxed()
    })
    .await
}

async fn update_open_cycle<F>(pool: &DbPool, user_id: i32, change: F) -> Result<TradingCycle>
where
    F: FnOnce(&mut TradingCycle) -> Result<(), SimulationError> + Send + 'static,
{
    let mut conn = pool.get().await?;
    conn.transaction::<_, anyhow::Error, _>(|conn| {
        async move {
            let mut open = open_cycle_for_update(conn, user_id)
                .await?
                .ok_or(SimulationError::NoOpenCycle(user_id))?;
            change(&mut open)?;
            save_cycle(conn, &open).await
        }
        .scope_boxed()
    })
    .await
}

pub async fn pause_cycle(pool: &DbPool, user_id: i32) -> Result<TradingCycle> {
    update_open_cycle(pool, user_id, cycle::pause).await
}

pub async fn resume_cycle(pool: &DbPool, user_id: i32) -> Result<TradingCycle> {
    update_open_cycle(pool, user_id, cycle::resume).await
}

pub async fn set_cycle_roi(pool: &DbPool, user_id: i32, percentage: f64) -> Result<TradingCycle> {
    update_open_cycle(pool, user_id, move |open| cycle::set_daily_roi(open, percentage)).await
}

/// Applies today's growth to every running cycle. A failing user is logged and skipped.
pub async fn tick_all_cycles(pool: &DbPool, length_days: i64, now: NaiveDateTime) -> Result<Vec<CycleTick>> {
    let running: Vec<i32> = {
        let mut conn = pool.get().await?;
        trading_cycles::table
            .filter(trading_cycles::status.eq(CycleStatus::InProgress))
            .select(trading_cycles::id)
            .load(&mut conn)
            .await?
    };
    let mut ticks = Vec::with_capacity(running.len());
    for cycle_id in running {
        match tick_cycle(pool, cycle_id, length_days, now).await {
            Ok(tick) => ticks.push(tick),
            Err(e) => warn!("Cycle {cycle_id} tick failed: {e:#}"),
        }
    }
    Ok(ticks)
}

async fn tick_cycle(pool: &DbPool, cycle_id: i32, length_days: i64, now: NaiveDateTime) -> Result<CycleTick> {
    let mut conn = pool.get().await?;
    conn.transaction::<_, anyhow::Error, _>(|conn| {
        async move {
            let mut locked: TradingCycle = trading_cycles::table
                .find(cycle_id)
                .select(TradingCycle::as_select())
                .for_update()
                .get_result(conn)
                .await?;
            let user = lock_user(conn, locked.user_id).await?;
            let outcome = cycle::apply_daily_tick(&mut locked, now.date(), now, length_days);
            let TickOutcome::Applied { profit, percentage, .. } = outcome else {
                return Ok(CycleTick {
                    user,
                    cycle: locked,
                    outcome,
                });
            };
            let saved = save_cycle(conn, &locked).await?;
            let (balance, booked) = ledger::apply_pnl(user.balance, profit);
            insert_transaction(
                conn,
                NewTransaction::completed(
                    user.id,
                    TxKind::for_pnl(booked),
                    booked,
                    Some(format!("simulated cycle growth {percentage:.2}%")),
                ),
            )
            .await?;
            upsert_profit(conn, user.id, now.date(), booked, pnl_percentage(booked, user.balance)).await?;
            let user = set_balance(conn, user.id, balance, user.status, user.initial_deposit).await?;
            Ok(CycleTick {
                user,
                cycle: saved,
                outcome,
            })
        }
        .scope_boxed()
    })
    .await
}

/// Opens an admin position for every funded active user. The stake stays in the balance until close.
pub async fn open_admin_positions(
    pool: &DbPool,
    token_symbol: &str,
    entry_price: f64,
    stake_fraction: f64,
    admin_id: i64,
) -> Result<Vec<(BotUser, TradingPosition)>> {
    if !(entry_price.is_finite() && entry_price > 0.0) {
        return Err(SimulationError::NonPositiveAmount(entry_price).into());
    }
    let mut opened = Vec::new();
    for user in list_active_users(pool).await? {
        if user.balance <= 0.0 {
            continue;
        }
        let symbol = token_symbol.to_uppercase();
        let user_id = user.id;
        let mut conn = pool.get().await?;
        let position = conn
            .transaction::<_, anyhow::Error, _>(|conn| {
                async move {
                    let locked = lock_user(conn, user_id).await?;
                    let stake = locked.balance * stake_fraction;
                    let position = diesel::insert_into(trading_positions::table)
                        .values(NewTradingPosition {
                            user_id: locked.id,
                            token_name: symbol.clone(),
                            token_symbol: symbol.clone(),
                            amount: stake,
                            entry_price,
                            exit_price: None,
                            status: PositionStatus::Open,
                            trade_type: TRADE_TYPE_ADMIN.to_string(),
                            opened_at: Utc::now().naive_utc(),
                            closed_at: None,
                            roi_percentage: None,
                            created_by: Some(admin_id),
                        })
                        .returning(TradingPosition::as_returning())
                        .get_result(conn)
                        .await?;
                    insert_transaction(
                        conn,
                        NewTransaction::completed(
                            locked.id,
                            TxKind::Buy,
                            stake,
                            Some(format!("admin {admin_id}: simulated buy")),
                        )
                        .with_token(symbol, entry_price)
                        .with_position(position.id),
                    )
                    .await?;
                    Ok(position)
                }
                .scope_boxed()
            })
            .await?;
        opened.push((user, position));
    }
    info!("Opened {} simulated {token_symbol} positions", opened.len());
    Ok(opened)
}

/// Closes every open admin position on `token_symbol` at `exit_price`.
pub async fn close_admin_positions(
    pool: &DbPool,
    token_symbol: &str,
    exit_price: f64,
) -> Result<Vec<(RecordedTrade, f64)>> {
    if !(exit_price.is_finite() && exit_price >= 0.0) {
        return Err(SimulationError::NonPositiveAmount(exit_price).into());
    }
    let open: Vec<TradingPosition> = {
        let mut conn = pool.get().await?;
        trading_positions::table
            .filter(trading_positions::token_symbol.eq(token_symbol.to_uppercase()))
            .filter(trading_positions::status.eq(PositionStatus::Open))
            .filter(trading_positions::trade_type.eq(TRADE_TYPE_ADMIN))
            .select(TradingPosition::as_select())
            .load(&mut conn)
            .await?
    };
    let mut closed = Vec::with_capacity(open.len());
    for position in open {
        let mut conn = pool.get().await?;
        let result = conn
            .transaction::<_, anyhow::Error, _>(|conn| {
                async move {
                    let user = lock_user(conn, position.user_id).await?;
                    let roi = position.roi_at(exit_price);
                    let (balance, pnl) = ledger::apply_pnl(user.balance, position.amount * roi / 100.0);
                    let now = Utc::now().naive_utc();
                    let position = diesel::update(trading_positions::table.find(position.id))
                        .filter(trading_positions::status.eq(PositionStatus::Open))
                        .set((
                            trading_positions::exit_price.eq(Some(exit_price)),
                            trading_positions::status.eq(PositionStatus::Closed),
                            trading_positions::closed_at.eq(Some(now)),
                            trading_positions::roi_percentage.eq(Some(roi)),
                        ))
                        .returning(TradingPosition::as_returning())
                        .get_result(conn)
                        .await?;
                    insert_transaction(
                        conn,
                        NewTransaction::completed(
                            user.id,
                            TxKind::Sell,
                            (position.amount + pnl).max(0.0),
                            Some(format!("simulated sell, pnl {pnl:+.4} SOL")),
                        )
                        .with_token(position.token_name.clone(), exit_price)
                        .with_position(position.id),
                    )
                    .await?;
                    upsert_profit(conn, user.id, now.date(), pnl, pnl_percentage(pnl, user.balance)).await?;
                    let user = set_balance(conn, user.id, balance, user.status, user.initial_deposit).await?;
                    Ok((RecordedTrade { user, position, pnl }, roi))
                }
                .scope_boxed()
            })
            .await;
        match result {
            Ok(entry) => closed.push(entry),
            Err(e) => warn!("Closing position failed: {e:#}"),
        }
    }
    Ok(closed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pnl_percentage_of_empty_balance_is_zero() {
        assert_eq!(pnl_percentage(0.5, 0.0), 0.0);
        assert_eq!(pnl_percentage(0.5, 10.0), 5.0);
    }
}
