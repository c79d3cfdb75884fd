pub mod achievements;
pub mod app;
pub mod challenge;
pub mod clock;
pub mod config;
pub mod errors;
pub mod events;
pub mod export;
pub mod handlers;
pub mod leaderboard;
pub mod merge;
pub mod models;
pub mod remote;
pub mod session;
pub mod state;
pub mod static_files;
pub mod stats;
pub mod storage;
pub mod streak;
pub mod sync;
pub mod tracker;
pub mod ui;

pub use app::router;
pub use config::Config;
pub use state::AppState;
pub use storage::LocalStore;
