pub mod common;

mod config_layering;
mod status_server;
