use clap::Parser;
use qu::ick_use::*;
use sih_bed_occupancy::{config::Config, fetch, orig_path, path_exists};
use std::path::PathBuf;

#[derive(Parser)]
struct Opt {
    /// Config file with the source URLs and fetch policy.
    #[clap(long, default_value = "report.toml")]
    config: PathBuf,
    /// Re-download files that are already present.
    #[clap(long, short)]
    force: bool,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    let config = Config::load(&opt.config)?;
    let client = fetch::client(config.fetch.timeout_secs)?;

    let sources = [
        (&config.beds_registry_url, orig_path("hospitais_leitos.csv")),
        (&config.admissions_url, orig_path("sih_rd.csv")),
    ];
    for (url, dest) in sources {
        if path_exists(&dest)? && !opt.force {
            println!("\"{}\" already present, skipping (use --force)", dest.display());
            continue;
        }
        fetch::download_with_retry(&client, url, &dest, config.fetch.retries)?;
        println!("fetched \"{}\"", dest.display());
    }
    Ok(())
}
