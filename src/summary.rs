//! Per-facility summary statistics over the daily occupancy table.
//!
//! `avg_daily_occupancy` is mean admissions x mean length-of-stay: the
//! steady-state occupancy of a queue with that arrival rate and service
//! time, not the time-integrated occupancy.
use crate::{
    occupancy::DailyOccupancy, round2, sort_f64, Admissions, ArcStr, CnesId, Facilities,
    PipelineError, YearMonth,
};
use once_cell::sync::Lazy;
use qu::ick_use::*;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, ops::Deref};

/// One row per facility that has a resolvable bed count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilitySummary {
    pub cnes: CnesId,
    pub name: ArcStr,
    pub municipality: ArcStr,
    pub facility_type: ArcStr,
    /// Mean of the daily admission counts, 2 decimals.
    pub mean_daily_admissions: f64,
    /// Mean length-of-stay in days over the facility's records, 2 decimals.
    /// 0 when the facility has no records.
    pub mean_length_of_stay: f64,
    /// Mean of the daily bed counts, 2 decimals.
    pub mean_beds: f64,
    /// Mean of the death flag x 100, rounded to the nearest integer.
    pub mean_death_rate_pct: f64,
    /// Mean of the defined daily occupancy rates, 2 decimals. `None` when
    /// every daily rate was undefined (zero-bed months only).
    pub mean_occupancy_rate_pct: Option<f64>,
    /// mean_daily_admissions x mean_length_of_stay, 2 decimals.
    pub avg_daily_occupancy: f64,
}

pub struct FacilitySummaries {
    els: Vec<FacilitySummary>,
}

impl FacilitySummaries {
    /// Collapse the daily table to one row per facility.
    ///
    /// Facilities absent from the daily table (because they never resolved a
    /// bed count) are excluded here too; the exclusions are consistent by
    /// construction.
    pub fn derive(
        daily: &DailyOccupancy,
        admissions: &Admissions,
        facilities: &Facilities,
    ) -> Result<Self, PipelineError> {
        #[derive(Default)]
        struct Acc {
            days: usize,
            entries: u64,
            beds: i64,
            rate_sum: f64,
            rate_n: usize,
        }
        let mut accs: BTreeMap<CnesId, Acc> = BTreeMap::new();
        for sample in daily.iter_ref() {
            let acc = accs.entry(sample.cnes).or_default();
            acc.days += 1;
            acc.entries += sample.admissions as u64;
            acc.beds += sample.total_beds;
            if let Some(rate) = sample.occupancy_rate_pct {
                acc.rate_sum += rate;
                acc.rate_n += 1;
            }
        }

        let mut els = Vec::with_capacity(accs.len());
        for (cnes, acc) in accs {
            let Some(facility) = facilities.find_first(cnes) else {
                // cannot happen for rows derived from the registry join
                event!(Level::WARN, "facility {} missing from the registry", cnes);
                continue;
            };

            let mut stay_sum = 0u64;
            let mut deaths = 0usize;
            let mut records = 0usize;
            for adm in admissions.for_facility(cnes) {
                stay_sum += adm.length_of_stay_days as u64;
                deaths += adm.death as usize;
                records += 1;
            }

            let mean_daily_admissions = round2(acc.entries as f64 / acc.days as f64);
            let mean_length_of_stay = if records > 0 {
                round2(stay_sum as f64 / records as f64)
            } else {
                0.0
            };
            let mean_death_rate_pct = if records > 0 {
                (deaths as f64 / records as f64 * 100.0).round()
            } else {
                0.0
            };
            els.push(FacilitySummary {
                cnes,
                name: facility.name.clone(),
                municipality: facility.municipality.clone(),
                facility_type: facility.facility_type.clone(),
                mean_daily_admissions,
                mean_length_of_stay,
                mean_beds: round2(acc.beds as f64 / acc.days as f64),
                mean_death_rate_pct,
                mean_occupancy_rate_pct: (acc.rate_n > 0)
                    .then(|| round2(acc.rate_sum / acc.rate_n as f64)),
                avg_daily_occupancy: round2(mean_daily_admissions * mean_length_of_stay),
            });
        }

        if !daily.is_empty() && els.is_empty() {
            return Err(PipelineError::JoinIntegrity {
                stage: "facility summary",
                detail: "no facility survived the registry metadata join".to_string(),
            });
        }
        Ok(Self { els })
    }

    /// The `n` facilities with the largest value of `metric`, descending.
    pub fn top_by(&self, n: usize, metric: impl Fn(&FacilitySummary) -> f64) -> Vec<&FacilitySummary> {
        let mut rows: Vec<&FacilitySummary> = self.els.iter().collect();
        rows.sort_by(|a, b| sort_f64(&metric(b), &metric(a)));
        rows.truncate(n);
        rows
    }

    /// Collect a metric column, skipping rows where it is undefined.
    pub fn values_of(&self, metric: impl Fn(&FacilitySummary) -> Option<f64>) -> Vec<f64> {
        self.els.iter().filter_map(metric).collect()
    }

    pub fn iter_ref(&self) -> impl Iterator<Item = &FacilitySummary> + '_ {
        self.els.iter()
    }
}

impl Deref for FacilitySummaries {
    type Target = [FacilitySummary];
    fn deref(&self) -> &Self::Target {
        &self.els
    }
}

/// Labels for the CID codes that dominate the busiest facilities. Codes
/// outside this map are shown as-is.
static CID_LABELS: Lazy<BTreeMap<&'static str, &'static str>> = Lazy::new(|| {
    BTreeMap::from([
        ("K359", "Apendicite aguda"),
        ("S525", "Fratura da extremidade distal do rádio"),
        ("Z302", "Esterilização"),
        ("O800", "Parto espontâneo cefálico"),
        ("I64", "Acidente vascular cerebral"),
        ("I219", "Infarto agudo do miocárdio"),
        ("O82", "Parto por cesariana"),
        ("F192", "Síndrome de dependência"),
    ])
});

pub fn diagnosis_label(code: &str) -> &str {
    CID_LABELS.get(code).copied().unwrap_or(code)
}

/// The most recorded principal diagnosis of one facility.
#[derive(Debug, Clone)]
pub struct DiagnosisFrequency {
    pub cnes: CnesId,
    pub facility_name: ArcStr,
    pub municipality: ArcStr,
    pub facility_type: ArcStr,
    pub diagnosis: ArcStr,
    pub count: usize,
}

/// For each listed facility, the principal diagnosis with the most records.
/// Ties resolve to the smaller code. Facilities with no records are skipped.
pub fn most_frequent_diagnoses(
    cnes_ids: &[CnesId],
    admissions: &Admissions,
    facilities: &Facilities,
) -> Vec<DiagnosisFrequency> {
    let mut out = Vec::with_capacity(cnes_ids.len());
    for &cnes in cnes_ids {
        let mut counts: BTreeMap<ArcStr, usize> = BTreeMap::new();
        for adm in admissions.for_facility(cnes) {
            *counts.entry(adm.principal_diagnosis.clone()).or_default() += 1;
        }
        let Some((diagnosis, count)) = counts
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        else {
            continue;
        };
        let Some(facility) = facilities.find_first(cnes) else {
            continue;
        };
        out.push(DiagnosisFrequency {
            cnes,
            facility_name: facility.name.clone(),
            municipality: facility.municipality.clone(),
            facility_type: facility.facility_type.clone(),
            diagnosis,
            count,
        });
    }
    out
}

/// Mean daily metrics per (month, facility type), the tabular form of the
/// monthly trend series.
#[derive(Debug, Clone)]
pub struct MonthlyTypeMean {
    pub month: YearMonth,
    pub facility_type: ArcStr,
    pub samples: usize,
    pub mean_occupancy_rate_pct: Option<f64>,
    pub mean_beds: f64,
    pub mean_death_rate_pct: f64,
}

pub fn monthly_type_means(daily: &DailyOccupancy) -> Vec<MonthlyTypeMean> {
    #[derive(Default)]
    struct Acc {
        samples: usize,
        rate_sum: f64,
        rate_n: usize,
        beds: i64,
        death_sum: f64,
    }
    let mut accs: BTreeMap<(YearMonth, ArcStr), Acc> = BTreeMap::new();
    for sample in daily.iter_ref() {
        let acc = accs
            .entry((sample.month, sample.facility_type.clone()))
            .or_default();
        acc.samples += 1;
        acc.beds += sample.total_beds;
        acc.death_sum += sample.death_rate_pct;
        if let Some(rate) = sample.occupancy_rate_pct {
            acc.rate_sum += rate;
            acc.rate_n += 1;
        }
    }
    accs.into_iter()
        .map(|((month, facility_type), acc)| MonthlyTypeMean {
            month,
            facility_type,
            samples: acc.samples,
            mean_occupancy_rate_pct: (acc.rate_n > 0)
                .then(|| round2(acc.rate_sum / acc.rate_n as f64)),
            mean_beds: round2(acc.beds as f64 / acc.samples as f64),
            mean_death_rate_pct: round2(acc.death_sum / acc.samples as f64),
        })
        .collect()
}

/// How many registry rows of each facility type have SUS beds, descending.
pub fn facility_type_census(facilities: &Facilities) -> Vec<(ArcStr, usize)> {
    let mut counts: BTreeMap<ArcStr, usize> = BTreeMap::new();
    for facility in facilities.iter_ref() {
        if facility.sus_beds.map_or(false, |beds| beds > 0) {
            *counts.entry(facility.facility_type.clone()).or_default() += 1;
        }
    }
    let mut rows: Vec<_> = counts.into_iter().collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    rows
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{occupancy::DailyOccupancy, Admission, Date8, Facility, Management};

    fn facility(cnes: CnesId, competency: &str, sus_beds: Option<i64>) -> Facility {
        Facility {
            cnes,
            competency: competency.try_into().unwrap(),
            name: format!("HOSPITAL {}", cnes).into(),
            municipality: "JOAO PESSOA".into(),
            facility_type: "HOSPITAL GERAL".into(),
            management: Management::Municipal,
            sus_beds,
            telephone: crate::NOT_APPLICABLE.into(),
            email: crate::NOT_APPLICABLE.into(),
        }
    }

    fn admission(
        cnes: CnesId,
        admitted: Date8,
        discharged: Date8,
        stay: u32,
        diagnosis: &str,
        death: bool,
    ) -> Admission {
        Admission {
            cnes,
            competency_month: 1,
            admission_date: admitted,
            discharge_date: discharged,
            length_of_stay_days: stay,
            principal_diagnosis: diagnosis.into(),
            age: 40,
            death,
            municipality_code: 250_750,
        }
    }

    fn d(day: u32) -> Date8 {
        Date8::from_ymd(2024, 1, day)
    }

    #[test]
    fn summary_means_and_product() {
        let facilities: Facilities = vec![facility(1, "202401", Some(10))].into_iter().collect();
        let admissions: Admissions = vec![
            admission(1, d(1), d(3), 2, "K359", false),
            admission(1, d(1), d(5), 4, "K359", true),
            admission(1, d(2), d(5), 3, "I219", false),
        ]
        .into_iter()
        .collect();
        let daily = DailyOccupancy::derive(&admissions, &facilities).unwrap();
        let summaries = FacilitySummaries::derive(&daily, &admissions, &facilities).unwrap();

        assert_eq!(summaries.len(), 1);
        let row = &summaries[0];
        // event days: 1st, 2nd, 3rd, 5th -> admissions 2, 1, 0, 0
        assert_eq!(row.mean_daily_admissions, 0.75);
        assert_eq!(row.mean_length_of_stay, 3.0);
        assert_eq!(row.mean_beds, 10.0);
        // 1 death in 3 records, x100 rounded to integer
        assert_eq!(row.mean_death_rate_pct, 33.0);
        assert_eq!(
            row.avg_daily_occupancy,
            round2(row.mean_daily_admissions * row.mean_length_of_stay)
        );
    }

    #[test]
    fn facility_without_bed_count_is_excluded_everywhere() {
        let facilities: Facilities = vec![facility(1, "202401", Some(10))].into_iter().collect();
        let admissions: Admissions = vec![
            admission(1, d(1), d(2), 1, "K359", false),
            admission(2, d(1), d(2), 1, "K359", false),
        ]
        .into_iter()
        .collect();
        let daily = DailyOccupancy::derive(&admissions, &facilities).unwrap();
        let summaries = FacilitySummaries::derive(&daily, &admissions, &facilities).unwrap();

        assert!(daily.iter_ref().all(|s| s.cnes == 1));
        assert!(summaries.iter_ref().all(|s| s.cnes == 1));
        assert_eq!(summaries.len(), 1);
    }

    #[test]
    fn top_by_sorts_descending() {
        let facilities: Facilities = vec![
            facility(1, "202401", Some(10)),
            facility(2, "202401", Some(10)),
        ]
        .into_iter()
        .collect();
        let admissions: Admissions = vec![
            admission(1, d(1), d(2), 1, "K359", false),
            admission(2, d(1), d(2), 5, "K359", false),
            admission(2, d(1), d(2), 5, "K359", false),
        ]
        .into_iter()
        .collect();
        let daily = DailyOccupancy::derive(&admissions, &facilities).unwrap();
        let summaries = FacilitySummaries::derive(&daily, &admissions, &facilities).unwrap();

        let top = summaries.top_by(1, |s| s.avg_daily_occupancy);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].cnes, 2);
    }

    #[test]
    fn diagnosis_frequency_ties_take_the_smaller_code() {
        let facilities: Facilities = vec![facility(1, "202401", Some(10))].into_iter().collect();
        let admissions: Admissions = vec![
            admission(1, d(1), d(2), 1, "Z302", false),
            admission(1, d(1), d(2), 1, "K359", false),
        ]
        .into_iter()
        .collect();
        let rows = most_frequent_diagnoses(&[1], &admissions, &facilities);
        assert_eq!(rows.len(), 1);
        assert_eq!(&*rows[0].diagnosis, "K359");
        assert_eq!(rows[0].count, 1);
    }

    #[test]
    fn diagnosis_labels_pass_unknown_codes_through() {
        assert_eq!(diagnosis_label("K359"), "Apendicite aguda");
        assert_eq!(diagnosis_label("Q999"), "Q999");
    }

    #[test]
    fn census_counts_rows_with_beds() {
        let mut rows = vec![
            facility(1, "202401", Some(10)),
            facility(1, "202402", Some(10)),
            facility(2, "202401", Some(0)),
            facility(3, "202401", None),
        ];
        rows[2].facility_type = "PRONTO SOCORRO".into();
        let facilities: Facilities = rows.into_iter().collect();
        let census = facility_type_census(&facilities);
        assert_eq!(census, vec![("HOSPITAL GERAL".into(), 2)]);
    }
}
