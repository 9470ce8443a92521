//! Report rendering helpers.
//!
//! Strictly a consumer of the derived tables: nothing here computes, it only
//! formats. Distributions are shown as fixed-width bucket tables, the
//! terminal stand-in for the histograms of the interactive report.
use crate::{
    header,
    occupancy::DailyOccupancy,
    stats::describe::{centrality, spread, summary},
    summary::{DiagnosisFrequency, FacilitySummaries, FacilitySummary, MonthlyTypeMean},
};
use term_data_table::{Cell, Row, Table};

/// An undefined rate (zero-bed month) renders as text, never as 0.
pub fn fmt_rate(rate: Option<f64>) -> String {
    match rate {
        Some(rate) => format!("{:.2}", rate),
        None => "undefined".to_string(),
    }
}

pub fn daily_table(daily: &DailyOccupancy, limit: usize) -> Table<'static> {
    let mut table = Table::new().with_row(
        Row::new()
            .with_cell(Cell::from("CNES"))
            .with_cell(Cell::from("Date"))
            .with_cell(Cell::from("Admissions"))
            .with_cell(Cell::from("Discharges"))
            .with_cell(Cell::from("SUS beds"))
            .with_cell(Cell::from("Occupied"))
            .with_cell(Cell::from("Occupancy %"))
            .with_cell(Cell::from("Death rate %")),
    );
    for sample in daily.iter_ref().take(limit) {
        table.add_row(
            Row::new()
                .with_cell(Cell::from(sample.cnes.to_string()))
                .with_cell(Cell::from(sample.date.to_string()))
                .with_cell(Cell::from(sample.admissions.to_string()))
                .with_cell(Cell::from(sample.discharges.to_string()))
                .with_cell(Cell::from(sample.total_beds.to_string()))
                .with_cell(Cell::from(sample.occupied_beds.to_string()))
                .with_cell(Cell::from(fmt_rate(sample.occupancy_rate_pct)))
                .with_cell(Cell::from(format!("{:.2}", sample.death_rate_pct))),
        );
    }
    table
}

pub fn summaries_table<'a>(rows: impl Iterator<Item = &'a FacilitySummary>) -> Table<'static> {
    let mut table = Table::new().with_row(
        Row::new()
            .with_cell(Cell::from("Facility"))
            .with_cell(Cell::from("Municipality"))
            .with_cell(Cell::from("Type"))
            .with_cell(Cell::from("Mean admissions/day"))
            .with_cell(Cell::from("Mean stay (days)"))
            .with_cell(Cell::from("Mean SUS beds"))
            .with_cell(Cell::from("Death rate %"))
            .with_cell(Cell::from("Mean occupancy %"))
            .with_cell(Cell::from("Avg daily occupancy")),
    );
    for row in rows {
        table.add_row(
            Row::new()
                .with_cell(Cell::from(row.name.to_string()))
                .with_cell(Cell::from(row.municipality.to_string()))
                .with_cell(Cell::from(row.facility_type.to_string()))
                .with_cell(Cell::from(format!("{:.2}", row.mean_daily_admissions)))
                .with_cell(Cell::from(format!("{:.2}", row.mean_length_of_stay)))
                .with_cell(Cell::from(format!("{:.2}", row.mean_beds)))
                .with_cell(Cell::from(format!("{:.0}", row.mean_death_rate_pct)))
                .with_cell(Cell::from(fmt_rate(row.mean_occupancy_rate_pct)))
                .with_cell(Cell::from(format!("{:.2}", row.avg_daily_occupancy))),
        );
    }
    table
}

pub fn monthly_table(rows: &[MonthlyTypeMean]) -> Table<'static> {
    let mut table = Table::new().with_row(
        Row::new()
            .with_cell(Cell::from("Month"))
            .with_cell(Cell::from("Facility type"))
            .with_cell(Cell::from("Days"))
            .with_cell(Cell::from("Mean occupancy %"))
            .with_cell(Cell::from("Mean SUS beds"))
            .with_cell(Cell::from("Mean death rate %")),
    );
    for row in rows {
        table.add_row(
            Row::new()
                .with_cell(Cell::from(row.month.to_string()))
                .with_cell(Cell::from(row.facility_type.to_string()))
                .with_cell(Cell::from(row.samples.to_string()))
                .with_cell(Cell::from(fmt_rate(row.mean_occupancy_rate_pct)))
                .with_cell(Cell::from(format!("{:.2}", row.mean_beds)))
                .with_cell(Cell::from(format!("{:.2}", row.mean_death_rate_pct))),
        );
    }
    table
}

pub fn diagnosis_table(rows: &[DiagnosisFrequency]) -> Table<'static> {
    let mut table = Table::new().with_row(
        Row::new()
            .with_cell(Cell::from("Facility"))
            .with_cell(Cell::from("Municipality"))
            .with_cell(Cell::from("Type"))
            .with_cell(Cell::from("Top diagnosis"))
            .with_cell(Cell::from("Records")),
    );
    for row in rows {
        table.add_row(
            Row::new()
                .with_cell(Cell::from(row.facility_name.to_string()))
                .with_cell(Cell::from(row.municipality.to_string()))
                .with_cell(Cell::from(row.facility_type.to_string()))
                .with_cell(Cell::from(
                    crate::summary::diagnosis_label(&row.diagnosis).to_string(),
                ))
                .with_cell(Cell::from(row.count.to_string())),
        );
    }
    table
}

/// Bucket a column into `buckets` equal-width bins and tabulate the counts,
/// the terminal rendering of a histogram.
pub fn distribution_table(values: &[f64], buckets: usize) -> Table<'static> {
    let mut table = Table::new().with_row(
        Row::new()
            .with_cell(Cell::from("Range"))
            .with_cell(Cell::from("Count"))
            .with_cell(Cell::from("Percentage")),
    );
    if values.is_empty() {
        return table;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let buckets = buckets.max(1);
    let width = (max - min) / buckets as f64;
    let mut counts = vec![0usize; buckets];
    for &value in values {
        let mut idx = if width == 0.0 {
            0
        } else {
            ((value - min) / width) as usize
        };
        if idx >= buckets {
            idx = buckets - 1;
        }
        counts[idx] += 1;
    }
    for (i, count) in counts.iter().enumerate() {
        let lo = min + i as f64 * width;
        let hi = lo + width;
        table.add_row(
            Row::new()
                .with_cell(Cell::from(format!("{:.2} - {:.2}", lo, hi)))
                .with_cell(Cell::from(count.to_string()))
                .with_cell(Cell::from(format!(
                    "{:.1}%",
                    *count as f64 / values.len() as f64 * 100.0
                ))),
        );
    }
    table
}

/// Print the mean/median/mode block for one summary-table column.
pub fn centrality_section(metric: &str, values: &[f64]) {
    header(&format!("Centrality measures - {}", metric));
    match centrality(values) {
        Some(c) => {
            println!("Mean:   {:.2}", c.mean);
            println!("Median: {:.2}", c.median);
            println!("Mode:   {:.2}", c.mode);
        }
        None => println!("No data."),
    }
}

/// Print the IQR block, the outlier table and the describe-style summary for
/// one summary-table column.
pub fn variability_section(
    metric: &str,
    summaries: &FacilitySummaries,
    value_of: impl Fn(&FacilitySummary) -> Option<f64>,
) {
    header(&format!("Variability measures - {}", metric));
    let values = summaries.values_of(&value_of);
    let Some(fence) = spread(&values) else {
        println!("No data.");
        return;
    };
    println!("IQR:         {:.2}", fence.iqr);
    println!("Lower fence: {:.2}", fence.lower_fence);
    println!("Upper fence: {:.2}", fence.upper_fence);

    let mut outliers = Table::new().with_row(
        Row::new()
            .with_cell(Cell::from("Municipality"))
            .with_cell(Cell::from(metric.to_string()))
            .with_cell(Cell::from("Facility type")),
    );
    let mut outlier_count = 0;
    for row in summaries.iter_ref() {
        let Some(value) = value_of(row) else { continue };
        if fence.is_outlier(value) {
            outlier_count += 1;
            outliers.add_row(
                Row::new()
                    .with_cell(Cell::from(row.municipality.to_string()))
                    .with_cell(Cell::from(format!("{:.2}", value)))
                    .with_cell(Cell::from(row.facility_type.to_string())),
            );
        }
    }
    println!("\nOutliers ({}):\n{}", outlier_count, outliers);

    if let Some(s) = summary(&values) {
        let mut table = Table::new();
        for (label, value) in [
            ("count", s.count as f64),
            ("mean", s.mean),
            ("std", s.std_dev),
            ("min", s.min),
            ("25%", s.q1),
            ("50%", s.median),
            ("75%", s.q3),
            ("max", s.max),
        ] {
            table.add_row(
                Row::new()
                    .with_cell(Cell::from(label))
                    .with_cell(Cell::from(format!("{:.2}", value))),
            );
        }
        println!("Statistical summary:\n{}", table);
    }
}
