pub mod app;
pub mod backup;
pub mod config;
pub mod dates;
pub mod errors;
pub mod github;
pub mod handlers;
pub mod models;
pub mod roster;
pub mod state;
pub mod stats;
pub mod storage;

pub use app::router;
pub use config::Config;
pub use state::AppState;
