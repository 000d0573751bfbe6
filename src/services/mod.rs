//! Services module for business logic

pub mod audit;
pub mod clock;
pub mod pin_guard;
pub mod session;
pub mod settlement;
pub mod user_locks;
pub mod wallet_ledger;
pub mod webhook_processor;

pub use audit::AuditTrail;
pub use clock::{Clock, SystemClock};
pub use pin_guard::{PinGuard, PinStatus};
pub use session::Session;
pub use settlement::{AsyncSettlement, PurchaseRequest, SettlementEngine, SettlementOutcome};
pub use wallet_ledger::{BalanceChange, BalanceChanged, WalletLedger};
pub use webhook_processor::{WebhookOutcome, WebhookProcessor, WebhookProcessorError};
