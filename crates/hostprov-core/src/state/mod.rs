// # Installation State
//
// The only persisted state is the filesystem itself: a domain is installed
// when its document root exists. There is no metadata store.
//
// - [`InstallStore`]: reads installation records off the hosting root
// - [`InstallLocks`]: in-memory set of domains with a run in flight

pub mod install;
pub mod locks;

pub use install::{InstallStore, InstallationRecord};
pub use locks::{DomainGuard, InstallLocks};
