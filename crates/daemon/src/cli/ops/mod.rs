pub mod daemon;
pub mod health;
pub mod init;
pub mod records;
pub mod version;

pub use daemon::Daemon;
pub use health::Health;
pub use init::Init;
pub use records::Records;
pub use version::Version;
