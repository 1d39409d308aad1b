pub mod cli;
pub mod config;
pub mod engine;
pub mod layout;
pub mod provision;
pub mod raster;
pub mod server;
pub mod util;
pub mod worker;
