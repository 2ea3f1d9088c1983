//! Pairing core: preference queues, the session table, the matcher and the
//! relay built on top of them.

pub mod engine;
pub mod matcher;
pub mod queue;
pub mod relay;
pub mod table;

pub use engine::{PairingEngine, PairingState, PairingStats};
pub use matcher::{PartnerMatcher, PreferenceMatcher};
pub use queue::{PreferenceQueueSet, WaitingEntry};
pub use relay::{forwarded_text, Relay};
pub use table::SessionTable;
