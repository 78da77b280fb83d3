pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;

pub use routes::app;
pub use routes::todos::Todo;
pub use state::AppState;
