pub mod app;
pub mod client;
pub mod compiler;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod profile;
pub mod protocol;
pub mod retry;
pub mod router;
pub mod server;
pub mod session;
pub mod tools;
pub mod transport;

pub use app::AppBundle;
pub use error::{FailureKind, PortfolioError, Result};
pub use router::{EntryPoint, ResponseRouter, RouterState};
