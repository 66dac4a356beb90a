pub mod coordinator;
pub mod encoder;
pub mod events;
