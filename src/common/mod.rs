pub mod naming;
pub mod profile;
pub mod response;
pub mod upload;
