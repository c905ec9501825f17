pub mod connectivity;
pub mod retention;
pub mod throttle;
