//! Renter host database: a registry of storage hosts with reliability
//! tracking, background liveness scanning and weighted random selection.

pub mod config;
pub mod entry;
pub mod events;
pub mod hostdb;
mod metrics;
pub mod probe;
pub mod scan;
pub mod store;
pub mod traits;
pub mod tree;
pub mod types;
pub mod validator;
pub mod weight;

pub use config::HostDbConfig;
pub use entry::HostEntry;
pub use events::{EventEmitter, HostEvent};
pub use hostdb::{HostDb, HostDbBuilder};
pub use probe::{ProbeError, TcpProber};
pub use scan::{EnqueueResult, ScanOutcome, Scanner};
pub use store::{FileHostStore, HostStore, HostStoreError, MemoryHostStore};
pub use traits::{
    AddressValidator, AtomicBlockHeight, BlockHeightSource, Clock, HostProber, ManualClock,
    ProbeResult, SystemClock,
};
pub use tree::HostTree;
pub use types::{
    BlockHeight, Currency, HostDbEntry, HostSettings, NetAddress, PublicKey, PublicKeyParseError,
};
pub use validator::{NetAddressError, StandardValidator};
