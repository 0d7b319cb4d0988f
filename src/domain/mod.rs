pub mod account;
pub mod error;
pub mod task;
pub mod tax;
pub mod trade;

pub use account::{Account, AccountId, AccountPool, PoolSummary};
pub use error::{CommandResponse, EngineError};
pub use task::RepeatingTask;
pub use tax::{TaxEngine, TaxPolicy, TaxStats, TaxSummary};
pub use trade::{SessionStats, TradeIntent, TradeKind, TradeObserver, TradeOutcome};
