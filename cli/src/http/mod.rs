pub mod models;
pub mod routes;
pub mod server;
pub mod state;

pub use state::AppState;
