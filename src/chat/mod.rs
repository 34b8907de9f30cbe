pub mod messages;
pub mod store;
