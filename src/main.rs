use std::env;

use anyhow::Result;
use env_logger::Env;

mod auth;
mod callback;
mod cli;
mod client;
mod config;
mod error;
mod items;
mod parser;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    cli::run(env::args()).await
}
