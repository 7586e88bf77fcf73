pub mod archive;
pub mod baseline;
pub mod commands;
pub mod config;
pub mod delta;
pub mod diff;
pub mod error;
pub mod fingerprint;
pub mod hooks;
pub mod layout;
pub mod platform;
pub mod retention;
pub mod runtime;

#[cfg(test)]
mod tests;
#[cfg(test)]
mod testutil;
