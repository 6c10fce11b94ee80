// Infrastructure layer (shared components)
pub mod infrastructure;

pub use infrastructure::config;
pub use infrastructure::error;
pub use infrastructure::metrics;
pub use infrastructure::postgres;

// Domain layer
pub mod logged;
pub mod message;
pub mod template;
pub mod users;

// Application layer
pub mod mailer;
pub mod transport;

// Supporting modules
pub mod telemetry;
