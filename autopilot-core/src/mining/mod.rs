//! Pattern discovery.
//!
//! Three miners share the event stream: association mining over
//! sliding-window transactions, ordered sequence discovery across daily
//! partitions, and time-of-day / solar clustering. Each produces the
//! common [`crate::pattern::Pattern`] envelope.

pub mod association;
pub mod fp_growth;
pub mod sequence;
pub mod temporal;
pub mod transactions;

pub use association::{AssociationMiner, AssociationMinerConfig, AssociationRule};
pub use sequence::{SequenceMiner, SequenceMinerConfig};
pub use temporal::{TemporalAnalyzer, TemporalAnalyzerConfig};
pub use transactions::{build_transactions, TransactionWindow};
