pub mod coordinator;
pub mod registry;
pub mod worker;
