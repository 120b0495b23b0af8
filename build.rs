//! Build script generating manual pages from the CLI definitions.

use std::{fs, path::PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli.rs"]
#[allow(dead_code, reason = "the build script only renders the command definitions")]
mod cli;

fn render(command: clap::Command, out_dir: &PathBuf, name: &str) -> std::io::Result<()> {
    let man = Man::new(command);
    let mut buf: Vec<u8> = Vec::new();
    man.render(&mut buf)?;
    fs::write(out_dir.join(format!("{name}.1")), buf)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=src/cli.rs");

    let out_dir = PathBuf::from("target/generated-man");
    fs::create_dir_all(&out_dir)?;

    render(cli::ServerCli::command(), &out_dir, "firerelay-server")?;
    render(cli::ForwarderCli::command(), &out_dir, "firerelay-forwarder")?;

    Ok(())
}
