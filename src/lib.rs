pub mod app;
pub mod archive;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod hpss;
pub mod http;
pub mod manifest;
pub mod output;
pub mod summary;
pub mod template;
pub mod transfer;
