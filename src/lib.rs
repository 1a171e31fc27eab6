#![warn(
    rust_2024_compatibility,
    clippy::all,
    clippy::future_not_send,
    clippy::mod_module_files,
    clippy::needless_pass_by_ref_mut,
    clippy::unused_async
)]

pub mod access;
pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod listing;
pub mod proxy;
pub mod render;
pub mod store;
pub mod upstream;

#[cfg(test)]
mod test_support;
