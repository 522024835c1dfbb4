pub mod gateway;
pub mod service;

pub use gateway::AuthGateway;
pub use service::AuthService;
