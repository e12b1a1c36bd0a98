//! Titan host process.
//!
//! Usage: `titan-host [config.json]`, then one JSON request per line on
//! stdin, e.g. `{"id": 1, "op": "createScene", "args": ["Main"]}`.

use std::path::PathBuf;

use titan_host::{init_logging, run, HostConfig};

fn main() -> anyhow::Result<()> {
    init_logging();

    let config = HostConfig::load(std::env::args_os().nth(1).map(PathBuf::from))?;
    run(config)
}
