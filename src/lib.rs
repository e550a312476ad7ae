pub mod cli;
pub mod config;
pub mod construct;
pub mod error;
pub mod export;
pub mod fanout;
pub mod fleet;
pub mod placement;
pub mod registry;
pub mod scanner;
pub mod transport;

pub use config::{AuthMode, SwarmConfig};
pub use error::{ErrorKind, Result, SwarmError};
pub use fanout::FanOutReport;
pub use registry::{JointLink, Registry};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
