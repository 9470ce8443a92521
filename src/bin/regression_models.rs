//! Regression models over the occupancy tables: ordinary least squares on
//! the facility summaries, then a logistic classifier for in-hospital death.
use clap::Parser;
use qu::ick_use::*;
use sih_bed_occupancy::{
    config::Config,
    header,
    occupancy::DailyOccupancy,
    sort_f64,
    stats::{
        logistic, regression,
        regression::DesignMatrix,
        train_test_split,
    },
    summary::FacilitySummaries,
    Admissions, ArcStr, Facilities,
};
use std::path::PathBuf;
use term_data_table::{Cell, Row, Table};

/// Seed for every shuffle in this report, so reruns print the same figures.
const SPLIT_SEED: u64 = 0;

#[derive(Parser)]
struct Opt {
    #[clap(long, default_value = "report.toml")]
    config: PathBuf,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    let config = Config::load(&opt.config)?;
    let facilities = Facilities::load("facilities.bin")?;
    let admissions = Admissions::load("admissions.bin")?;

    let daily = DailyOccupancy::derive(&admissions, &facilities)?;
    let summaries = FacilitySummaries::derive(&daily, &admissions, &facilities)?;

    simple_regression(&config, &summaries)?;
    multiple_regression(&summaries)?;

    logistic_model("Logistic regression without municipality", &daily, &admissions, false, 1000)?;
    logistic_model("Logistic regression with municipality", &daily, &admissions, true, 2000)?;
    Ok(())
}

/// Occupancy rate explained by bed count alone.
fn simple_regression(config: &Config, summaries: &FacilitySummaries) -> Result {
    header("Linear regression: SUS beds vs occupancy rate");

    let rows: Vec<(f64, f64)> = summaries
        .iter_ref()
        .filter_map(|s| s.mean_occupancy_rate_pct.map(|rate| (s.mean_beds, rate)))
        .collect();
    let (x, y): (Vec<f64>, Vec<f64>) = rows.into_iter().unzip();

    let (train, test) = train_test_split(x.len(), 0.2, SPLIT_SEED);
    let train_x: Vec<f64> = train.iter().map(|&i| x[i]).collect();
    let train_y: Vec<f64> = train.iter().map(|&i| y[i]).collect();
    let fit = regression::fit_simple(&train_x, &train_y)?;

    println!("Trained on {} facilities, held out {}.", train.len(), test.len());
    println!("b0 (intercept):   {:.2}", fit.intercept);
    println!("b1 (coefficient): {:.2}", fit.coefficients[0]);
    println!(
        "Predicted mean occupancy rate at {} SUS beds: {:.2}%",
        config.predict_beds,
        fit.predict(&[config.predict_beds])
    );

    let fitted: Vec<f64> = x.iter().map(|&beds| fit.predict(&[beds])).collect();
    let eval = regression::evaluate(&y, &fitted);
    println!("RMSE: {:.2}", eval.rmse);
    println!("r2:   {:.4}", eval.r_squared);
    Ok(())
}

/// Occupancy rate explained by beds, death rate, average occupancy and
/// facility type (one-hot, first level as reference).
fn multiple_regression(summaries: &FacilitySummaries) -> Result {
    header("Multiple linear regression");

    let rows: Vec<(&ArcStr, f64, f64, f64, f64)> = summaries
        .iter_ref()
        .filter_map(|s| {
            s.mean_occupancy_rate_pct.map(|rate| {
                (
                    &s.facility_type,
                    s.mean_beds,
                    s.mean_death_rate_pct,
                    s.avg_daily_occupancy,
                    rate,
                )
            })
        })
        .collect();

    let mut design = DesignMatrix::new(rows.len());
    design.push_numeric("leitos_sus_mean", &rows.iter().map(|r| r.1).collect::<Vec<_>>());
    design.push_numeric("obitos_mean", &rows.iter().map(|r| r.2).collect::<Vec<_>>());
    design.push_numeric(
        "ocupacao_media_diaria",
        &rows.iter().map(|r| r.3).collect::<Vec<_>>(),
    );
    let types: Vec<&str> = rows.iter().map(|r| &**r.0).collect();
    design.push_categorical("tipo_unidade", &types);
    let y: Vec<f64> = rows.iter().map(|r| r.4).collect();

    let (train, test) = train_test_split(design.len(), 0.2, SPLIT_SEED);
    let train_y: Vec<f64> = train.iter().map(|&i| y[i]).collect();
    let fit = regression::fit(&design.select(&train), &train_y)?;

    println!("Trained on {} facilities, held out {}.", train.len(), test.len());
    println!("Intercept: {:.3}", fit.intercept);
    println!("Coefficients:");
    for (name, coef) in design.names().iter().zip(&fit.coefficients) {
        println!("  {}: {:.3}", name, coef);
    }

    let fitted: Vec<f64> = design.rows().iter().map(|row| fit.predict(row)).collect();
    let eval = regression::evaluate(&y, &fitted);
    println!("RMSE: {:.2}", eval.rmse);
    println!("r2:   {:.4}", eval.r_squared);
    Ok(())
}

/// Death predicted from facility type, patient age and the occupancy rate on
/// the admission day, optionally adding the facility's municipality.
fn logistic_model(
    title: &str,
    daily: &DailyOccupancy,
    admissions: &Admissions,
    with_municipality: bool,
    max_iterations: usize,
) -> Result {
    header(title);

    // join each record to its facility-day; records without a defined
    // occupancy rate that day are dropped
    struct Case {
        facility_type: ArcStr,
        municipality: ArcStr,
        age: f64,
        rate: f64,
        death: bool,
    }
    let cases: Vec<Case> = admissions
        .iter_ref()
        .filter_map(|adm| {
            let sample = daily.sample_at(adm.cnes, adm.admission_date)?;
            let rate = sample.occupancy_rate_pct?;
            Some(Case {
                facility_type: sample.facility_type.clone(),
                municipality: sample.municipality.clone(),
                age: adm.age as f64,
                rate,
                death: adm.death,
            })
        })
        .collect();

    let labels: Vec<bool> = cases.iter().map(|c| c.death).collect();
    let deaths = labels.iter().filter(|&&l| l).count();
    println!("Outcome distribution over {} records:", labels.len());
    println!("  survived: {}", labels.len() - deaths);
    println!("  died:     {}", deaths);

    let mut design = DesignMatrix::new(cases.len());
    if with_municipality {
        let municipalities: Vec<&str> = cases.iter().map(|c| &*c.municipality).collect();
        design.push_categorical("municipio", &municipalities);
    }
    let types: Vec<&str> = cases.iter().map(|c| &*c.facility_type).collect();
    design.push_categorical("tipo_unidade", &types);
    design.push_numeric("idade", &cases.iter().map(|c| c.age).collect::<Vec<_>>());
    design.push_numeric(
        "taxa_ocupacao_diaria_pct",
        &cases.iter().map(|c| c.rate).collect::<Vec<_>>(),
    );

    let (train, test) = train_test_split(design.len(), 0.2, SPLIT_SEED);
    let train_rows: Vec<Vec<f64>> = train.iter().map(|&i| design.rows()[i].clone()).collect();
    let train_labels: Vec<bool> = train.iter().map(|&i| labels[i]).collect();
    let test_rows: Vec<Vec<f64>> = test.iter().map(|&i| design.rows()[i].clone()).collect();
    let test_labels: Vec<bool> = test.iter().map(|&i| labels[i]).collect();

    // scale on the training side only, then oversample the minority class
    let scaler = logistic::StandardScaler::fit(&train_rows);
    let train_rows = scaler.transform(&train_rows);
    let test_rows = scaler.transform(&test_rows);
    let (balanced_rows, balanced_labels) = logistic::smote(&train_rows, &train_labels, 5, SPLIT_SEED)?;
    println!(
        "Training on {} rows after oversampling ({} held out).",
        balanced_rows.len(),
        test_rows.len()
    );

    let fit = logistic::fit(&balanced_rows, &balanced_labels, max_iterations)?;
    let predicted: Vec<bool> = test_rows.iter().map(|row| fit.predict(row)).collect();

    let cm = logistic::confusion_matrix(&test_labels, &predicted);
    let cm_table = Table::new()
        .with_row(
            Row::new()
                .with_cell(Cell::from(""))
                .with_cell(Cell::from("predicted survived"))
                .with_cell(Cell::from("predicted died")),
        )
        .with_row(
            Row::new()
                .with_cell(Cell::from("survived"))
                .with_cell(Cell::from(cm.true_negative.to_string()))
                .with_cell(Cell::from(cm.false_positive.to_string())),
        )
        .with_row(
            Row::new()
                .with_cell(Cell::from("died"))
                .with_cell(Cell::from(cm.false_negative.to_string()))
                .with_cell(Cell::from(cm.true_positive.to_string())),
        );
    println!("Confusion matrix:\n{}", cm_table);

    let report = logistic::classification_report(&cm);
    let mut report_table = Table::new().with_row(
        Row::new()
            .with_cell(Cell::from("class"))
            .with_cell(Cell::from("precision"))
            .with_cell(Cell::from("recall"))
            .with_cell(Cell::from("f1"))
            .with_cell(Cell::from("support")),
    );
    for (label, metrics) in [("survived", &report.survived), ("died", &report.died)] {
        report_table.add_row(
            Row::new()
                .with_cell(Cell::from(label))
                .with_cell(Cell::from(format!("{:.2}", metrics.precision)))
                .with_cell(Cell::from(format!("{:.2}", metrics.recall)))
                .with_cell(Cell::from(format!("{:.2}", metrics.f1)))
                .with_cell(Cell::from(metrics.support.to_string())),
        );
    }
    println!("Classification report:\n{}", report_table);
    println!("accuracy:    {:.2}", report.accuracy);
    println!("macro f1:    {:.2}", report.macro_f1);
    println!("weighted f1: {:.2}", report.weighted_f1);

    println!("\nIntercept: {:.3}", fit.intercept);
    let mut coefficients: Vec<(&String, f64)> = design
        .names()
        .iter()
        .zip(fit.coefficients.iter().copied())
        .collect();
    coefficients.sort_by(|a, b| sort_f64(&b.1, &a.1));
    let mut coef_table = Table::new().with_row(
        Row::new()
            .with_cell(Cell::from("variable"))
            .with_cell(Cell::from("coefficient")),
    );
    for (name, coef) in coefficients {
        coef_table.add_row(
            Row::new()
                .with_cell(Cell::from(name.to_string()))
                .with_cell(Cell::from(format!("{:.3}", coef))),
        );
    }
    println!("Model coefficients:\n{}", coef_table);
    Ok(())
}
