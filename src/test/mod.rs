pub mod utils;

mod config;
mod sessions;
