pub mod loader;
pub mod model;

pub use loader::{ConfigLoader, parse_flag};
pub use model::{AppConfig, DatabaseConfig, GatewayConfig, mask_url};
