pub mod catalog;
pub mod events;
pub mod reconciler;
pub mod types;
