use crate::types::cycle::CycleStatus;
use crate::types::ledger::TxStatus;
use thiserror::Error;

/// Domain rule violations surfaced to handlers and the CLI.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(f64),
    #[error("insufficient paper balance: requested {requested:.4} SOL, available {available:.4} SOL")]
    InsufficientBalance { requested: f64, available: f64 },
    #[error("minimum paper withdrawal is {minimum:.4} SOL, requested {requested:.4} SOL")]
    BelowMinimumWithdrawal { requested: f64, minimum: f64 },
    #[error("cannot {action} a cycle that is {from}")]
    InvalidCycleTransition {
        action: &'static str,
        from: CycleStatus,
    },
    #[error("invalid daily ROI percentage {0}, must be finite and above -100")]
    InvalidRoi(f64),
    #[error("user {0} has no open cycle")]
    NoOpenCycle(i32),
    #[error("withdrawal {id} is {status}, only pending withdrawals can be resolved")]
    WithdrawalNotPending { id: i32, status: TxStatus },
    #[error("user not found: {0}")]
    UserNotFound(String),
}
