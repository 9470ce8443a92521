use clap::Parser;
use qu::ick_use::*;
use sih_bed_occupancy::{config::Config, header, orig_path, Admissions, Facilities, YearMonth};
use std::path::PathBuf;

#[derive(Parser)]
struct Opt {
    /// Config file with the region/year filters.
    #[clap(long, default_value = "report.toml")]
    config: PathBuf,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    let config = Config::load(&opt.config)?;

    let facilities = Facilities::load_orig(orig_path("hospitais_leitos.csv"), &config.uf)?;
    let admissions = Admissions::load_orig(orig_path("sih_rd.csv"))?;

    header("Before cleaning");
    println!("facility registry rows ({}): {}", config.uf, facilities.len());
    println!("hospitalization records: {}", admissions.len());

    // The report covers January up to the configured month; records billed
    // later, or admitted before the target year, are out of scope.
    let first_month = YearMonth::january(config.year);
    let admissions = admissions.filter(|adm| {
        adm.competency_month <= config.max_competency_month
            && adm.admission_date.year_month() >= first_month
    });

    header("After cleaning");
    println!("facility registry rows ({}): {}", config.uf, facilities.len());
    println!("hospitalization records: {}", admissions.len());

    facilities.save("facilities.bin")?;
    admissions.save("admissions.bin")?;
    Ok(())
}
