pub mod fetch;
pub mod ping;

use anyhow::Result;
use kline_loader::Config;
use std::path::PathBuf;

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Ok(Config::default()),
    }
}
