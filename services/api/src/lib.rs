//! Studio booking API
//!
//! Class calendar, bookings with package credits, waitlists, client and
//! package administration, notifications and studio settings.

pub mod calendar;
pub mod config;
pub mod engine;
pub mod error;
pub mod maintenance;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
