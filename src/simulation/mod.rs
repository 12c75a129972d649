pub mod cycle;
pub mod errors;
pub mod ledger;
pub mod session;
pub mod trade_generator;

pub use errors::SimulationError;
