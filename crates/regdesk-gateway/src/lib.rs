pub mod api;
pub mod error;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod state;

pub use server::GatewayServer;
pub use shutdown::shutdown_signal;
