pub mod capture_session;
pub mod pipeline;
pub mod scheduler;
