#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod io;
pub mod ir;
pub mod layout;
pub mod palette;
pub mod remote;
pub mod rules;
pub mod store;

#[cfg(feature = "cli")]
pub use cli::run;
