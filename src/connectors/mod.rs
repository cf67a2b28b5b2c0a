pub mod lifecycle;
pub mod poller;
pub mod types;
