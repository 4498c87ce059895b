use clap_mangen::Man;
use std::fs::File;
use std::path::Path;

use clap::CommandFactory;
use rc_notify::cli::Cli;

fn main() -> anyhow::Result<()> {
    let out_path = std::env::args().nth(1).unwrap_or_else(|| "rc-notify.1".to_string());
    let cmd = Cli::command();
    let path = Path::new(&out_path);
    let mut file = File::create(path)?;
    Man::new(cmd).render(&mut file)?;
    eprintln!("Generated man page at {}", path.display());
    Ok(())
}
