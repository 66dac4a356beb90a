pub mod transcode;
pub mod videos;
