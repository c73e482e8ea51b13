pub mod breakdown;
pub mod database;
pub mod dedup;
pub mod manager;
pub mod messages;
pub mod metrics;
pub mod notifier;
pub mod repository;
pub mod scheduler;
pub mod status;

pub use breakdown::{recalculate_amounts, round_money, PaymentBreakdown, PhaseAmount};
pub use database::Database;
pub use dedup::{DedupKey, DedupStore, InMemoryDedupStore, RedisDedupStore};
pub use manager::{LoadedRequest, SaveOutcome, ServiceRequestManager};
pub use messages::{compose, ComposedMessage, PaymentContext};
pub use metrics::{get_metrics, init_metrics};
pub use notifier::{LogNotifier, Notifier, SmtpNotifier};
pub use repository::{RequestRepository, StaffDirectory};
pub use scheduler::{today_in, PaymentDueScheduler, RunSummary};
pub use status::{
    apply_customer_approval, apply_status_change, check_transition, reconcile_for_save,
    reconcile_loaded, Advisory, Reconciliation, SaveReconciliation, StatusChange,
};
