// Multi-tenant insurance-advisory platform: tenant resolution, guarded
// authentication, session security and subscription/usage enforcement,
// assembled into one request pipeline.

pub mod app;
pub mod config;
pub mod database;
pub mod error;
pub mod guards;
pub mod handlers;
pub mod middleware;
pub mod services;
pub mod session;
pub mod state;
pub mod stores;
pub mod subscription;
pub mod tenancy;
pub mod usage;

pub use app::app;
pub use state::AppState;
