//! Descriptive report on SUS bed occupancy: the daily series, per-facility
//! means, distributions, outliers and correlations.
use clap::Parser;
use qu::ick_use::*;
use sih_bed_occupancy::{
    config::Config,
    header,
    occupancy::DailyOccupancy,
    present,
    stats::correlation,
    summary::{self, FacilitySummaries},
    Admissions, Facilities,
};
use std::path::PathBuf;
use term_data_table::{Cell, Row, Table};

#[derive(Parser)]
struct Opt {
    #[clap(long, default_value = "report.toml")]
    config: PathBuf,
    /// How many daily rows to print in the sample table.
    #[clap(long, default_value_t = 15)]
    daily_rows: usize,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    let config = Config::load(&opt.config)?;
    let facilities = Facilities::load("facilities.bin")?;
    let admissions = Admissions::load("admissions.bin")?;

    println!(
        "Hospital overcrowding in {} - SUS bed occupancy, Jan-{:02}/{}",
        config.uf, config.max_competency_month, config.year
    );
    println!(
        "\nSources: OpenDataSUS facility/bed registry and the SIH/SUS\n\
         hospitalization records (AIH), restricted to one state and year."
    );

    let daily = DailyOccupancy::derive(&admissions, &facilities)?;
    let summaries = FacilitySummaries::derive(&daily, &admissions, &facilities)?;

    header("Daily bed occupancy");
    println!(
        "{} facility-days across {} facilities. First {} rows:",
        daily.len(),
        daily.facility_ids().len(),
        opt.daily_rows
    );
    println!("{}", present::daily_table(&daily, opt.daily_rows));
    println!(
        "Occupied beds are a running admission/discharge balance from the\n\
         start of the window, not a calibrated census; early values are\n\
         relative to an unknown baseline."
    );

    header("Monthly means by facility type");
    println!("{}", present::monthly_table(&summary::monthly_type_means(&daily)));

    header("Average hospital occupancy");
    println!(
        "One row per facility with a known bed count ({} facilities):",
        summaries.len()
    );
    println!("{}", present::summaries_table(summaries.iter_ref()));

    println!("Distribution of average daily occupancy:");
    let occupancy = summaries.values_of(|s| Some(s.avg_daily_occupancy));
    println!("{}", present::distribution_table(&occupancy, 10));

    header("Facility types with SUS beds");
    let mut census_table = Table::new().with_row(
        Row::new()
            .with_cell(Cell::from("Facility type"))
            .with_cell(Cell::from("Registry rows")),
    );
    for (facility_type, count) in summary::facility_type_census(&facilities) {
        census_table.add_row(
            Row::new()
                .with_cell(Cell::from(facility_type.to_string()))
                .with_cell(Cell::from(count.to_string())),
        );
    }
    println!("{}", census_table);

    present::centrality_section("average daily occupancy", &occupancy);
    present::variability_section("average daily occupancy", &summaries, |s| {
        Some(s.avg_daily_occupancy)
    });

    header("Top 6 facilities by average daily occupancy");
    let top6 = summaries.top_by(6, |s| s.avg_daily_occupancy);
    println!("{}", present::summaries_table(top6.iter().copied()));
    println!(
        "The highest averages sit in general and specialized hospitals in\n\
         the metropolitan municipalities; the outliers flagged above are\n\
         exactly these facilities."
    );

    header("Most frequent principal diagnoses, top 10 facilities");
    let top10: Vec<_> = summaries
        .top_by(10, |s| s.avg_daily_occupancy)
        .iter()
        .map(|s| s.cnes)
        .collect();
    let diagnoses = summary::most_frequent_diagnoses(&top10, &admissions, &facilities);
    println!("{}", present::diagnosis_table(&diagnoses));

    header("SUS bed counts");
    let beds = summaries.values_of(|s| Some(s.mean_beds));
    present::centrality_section("mean SUS beds", &beds);
    present::variability_section("mean SUS beds", &summaries, |s| Some(s.mean_beds));
    println!("Distribution of mean SUS beds:");
    println!("{}", present::distribution_table(&beds, 10));

    header("Mean occupancy rate");
    let rates = summaries.values_of(|s| s.mean_occupancy_rate_pct);
    present::centrality_section("mean occupancy rate (%)", &rates);
    present::variability_section("mean occupancy rate (%)", &summaries, |s| {
        s.mean_occupancy_rate_pct
    });
    println!("Distribution of the mean occupancy rate:");
    println!("{}", present::distribution_table(&rates, 10));

    header("Top 10 facilities by mean occupancy rate");
    let top_rate = summaries.top_by(10, |s| s.mean_occupancy_rate_pct.unwrap_or(f64::MIN));
    println!("{}", present::summaries_table(top_rate.iter().copied()));

    header("Correlation: SUS beds vs occupancy rate");
    let paired: Vec<(f64, f64)> = summaries
        .iter_ref()
        .filter_map(|s| s.mean_occupancy_rate_pct.map(|rate| (s.mean_beds, rate)))
        .collect();
    let (bed_col, rate_col): (Vec<f64>, Vec<f64>) = paired.into_iter().unzip();
    print_correlations(&bed_col, &rate_col);
    println!(
        "Bed counts relate moderately to the occupancy rate: the more SUS\n\
         beds a facility offers, the fuller those beds tend to run."
    );

    header("Correlation: death rate vs occupancy rate");
    let paired: Vec<(f64, f64)> = summaries
        .iter_ref()
        .filter_map(|s| {
            s.mean_occupancy_rate_pct
                .map(|rate| (s.mean_death_rate_pct, rate))
        })
        .collect();
    let (death_col, rate_col): (Vec<f64>, Vec<f64>) = paired.into_iter().unzip();
    print_correlations(&death_col, &rate_col);
    println!(
        "Facilities that take the gravest cases tend to show both a higher\n\
         death rate and a higher occupancy rate."
    );

    header("Conclusions");
    println!(
        "- Overcrowding concentrates in metropolitan regions, where demand\n\
          and bed supply are both largest.\n\
         - Specialized hospitals with SUS beds carry heavy demand but are\n\
          thinly distributed across the state.\n\
         - Few facilities overall ran overcrowded; those that did are the\n\
          general and specialized hospitals of the big urban centres."
    );
    Ok(())
}

fn print_correlations(x: &[f64], y: &[f64]) {
    match correlation::pearson(x, y) {
        Some(r) => println!("Pearson:  {:.2}", r),
        None => println!("Pearson:  undefined"),
    }
    match correlation::spearman(x, y) {
        Some(r) => println!("Spearman: {:.2}", r),
        None => println!("Spearman: undefined"),
    }
    match correlation::kendall(x, y) {
        Some(r) => println!("Kendall:  {:.2}", r),
        None => println!("Kendall:  undefined"),
    }
}
