pub mod archive;
pub mod catalog;
pub mod decoration;
pub mod engine;
pub mod mirror;
pub mod paths;
pub mod transfer;
pub mod uploader;
