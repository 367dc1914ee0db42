pub mod app;

pub use app::adb::command::AdbCommand;
pub use app::discovery::connect::ConnectOptions;
pub use app::discovery::{connect_to_all_emulators, DiscoveryOptions};
pub use app::error::AppError;
pub use app::models::{DiscoveryReport, MatchTier, ResolvedDevice};
