//! Daily bed-occupancy derivation.
//!
//! Admission and discharge events are counted per facility per calendar day,
//! outer-joined, decorated with the registry bed count for the day's month,
//! and folded into a running occupied-bed count per facility.
//!
//! The running count starts at zero on the first observed event day for a
//! facility and is never recalibrated against a real census, so absolute
//! occupancy values are relative to that implicit baseline. It also carries
//! across month boundaries: occupancy does not reset when the month key
//! changes.
use crate::{round2, Admissions, ArcStr, CnesId, Date8, Facilities, PipelineError, YearMonth};
use qu::ick_use::*;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, ops::Deref};

/// One facility-day on which at least one admission or discharge occurred.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyOccupancySample {
    pub cnes: CnesId,
    /// Month key of `date` (digit truncation, not calendar parsing).
    pub month: YearMonth,
    pub date: Date8,
    /// Admissions counted on this day.
    pub admissions: u32,
    /// Discharges counted on this day.
    pub discharges: u32,
    /// SUS beds the registry reports for this facility and month.
    pub total_beds: i64,
    /// Running (admissions - discharges) for the facility, ordered by date.
    pub occupied_beds: i64,
    /// `occupied_beds / total_beds * 100`, 2 decimals. `None` when the
    /// registry reports zero or negative beds: the ratio is undefined, not
    /// zero.
    pub occupancy_rate_pct: Option<f64>,
    /// Mean of the death flag over admissions that entered this day, as a
    /// percentage. Days with discharges only report 0.
    pub death_rate_pct: f64,
    pub facility_type: ArcStr,
    pub municipality: ArcStr,
}

/// The derived daily occupancy table, ordered by (facility, date), with a
/// lookup index per facility-day.
#[derive(Debug)]
pub struct DailyOccupancy {
    els: Vec<DailyOccupancySample>,
    day_idx: BTreeMap<(CnesId, Date8), usize>,
}

impl DailyOccupancy {
    /// Build the daily table from cleaned admissions and the bed registry.
    ///
    /// Facility-days whose `(CNES, month)` has no registry row with a usable
    /// bed count are dropped before the running count is folded, so they
    /// never contribute to it. Losing every row this way is a join-integrity
    /// failure, not an empty report.
    pub fn derive(
        admissions: &Admissions,
        facilities: &Facilities,
    ) -> Result<Self, PipelineError> {
        // Daily admission and discharge counts. The two groupings are
        // independent: a discharge lands in its own date's month key, which
        // can differ from the admission's. Keying the map by
        // (facility, month, date) makes iteration order the fold order.
        let mut days: BTreeMap<(CnesId, YearMonth, Date8), (u32, u32)> = BTreeMap::new();
        for adm in admissions.iter_ref() {
            days.entry((
                adm.cnes,
                adm.admission_date.year_month(),
                adm.admission_date,
            ))
            .or_default()
            .0 += 1;
            days.entry((
                adm.cnes,
                adm.discharge_date.year_month(),
                adm.discharge_date,
            ))
            .or_default()
            .1 += 1;
        }

        // Mean death rate per facility per admission day.
        let mut deaths: BTreeMap<(CnesId, Date8), (usize, usize)> = BTreeMap::new();
        for adm in admissions.iter_ref() {
            let entry = deaths.entry((adm.cnes, adm.admission_date)).or_default();
            entry.0 += adm.death as usize;
            entry.1 += 1;
        }

        let event_days = days.len();
        let mut els = Vec::with_capacity(event_days);
        let mut day_idx = BTreeMap::new();
        let mut current: Option<CnesId> = None;
        let mut occupied = 0i64;
        for ((cnes, month, date), (entered, left)) in days {
            let Some(facility) = facilities.find_month(cnes, month) else {
                continue;
            };
            let Some(total_beds) = facility.sus_beds else {
                continue;
            };
            if current != Some(cnes) {
                current = Some(cnes);
                occupied = 0;
            }
            occupied += entered as i64 - left as i64;
            let occupancy_rate_pct = (total_beds > 0)
                .then(|| round2(occupied as f64 / total_beds as f64 * 100.0));
            let death_rate_pct = deaths
                .get(&(cnes, date))
                .map(|(died, total)| round2(*died as f64 / *total as f64 * 100.0))
                .unwrap_or(0.0);
            day_idx.insert((cnes, date), els.len());
            els.push(DailyOccupancySample {
                cnes,
                month,
                date,
                admissions: entered,
                discharges: left,
                total_beds,
                occupied_beds: occupied,
                occupancy_rate_pct,
                death_rate_pct,
                facility_type: facility.facility_type.clone(),
                municipality: facility.municipality.clone(),
            });
        }

        if event_days > 0 && els.is_empty() {
            return Err(PipelineError::JoinIntegrity {
                stage: "daily occupancy",
                detail: format!(
                    "all {} facility-days were lost joining the bed registry",
                    event_days
                ),
            });
        }
        event!(
            Level::INFO,
            "derived {} daily samples from {} facility-days",
            els.len(),
            event_days
        );
        Ok(Self { els, day_idx })
    }

    /// The sample for a facility-day, if one was derived.
    pub fn sample_at(&self, cnes: CnesId, date: Date8) -> Option<&DailyOccupancySample> {
        let idx = self.day_idx.get(&(cnes, date))?;
        self.els.get(*idx)
    }

    pub fn iter_ref(&self) -> impl Iterator<Item = &DailyOccupancySample> + '_ {
        self.els.iter()
    }

    /// Facility ids present in the table, ascending, each once.
    pub fn facility_ids(&self) -> Vec<CnesId> {
        let mut ids: Vec<CnesId> = self.els.iter().map(|s| s.cnes).collect();
        ids.dedup();
        ids
    }
}

impl Deref for DailyOccupancy {
    type Target = [DailyOccupancySample];
    fn deref(&self) -> &Self::Target {
        &self.els
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Admission, Facility, Management};

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

    fn admission(cnes: CnesId, admitted: Date8, discharged: Date8, death: bool) -> Admission {
        Admission {
            cnes,
            competency_month: admitted.year_month().month() as u8,
            admission_date: admitted,
            discharge_date: discharged,
            length_of_stay_days: 1,
            principal_diagnosis: "A000".into(),
            age: 40,
            death,
            municipality_code: 250_750,
        }
    }

    fn d(day: u32) -> Date8 {
        Date8::from_ymd(2024, 1, day)
    }

    #[test]
    fn running_count_and_rate() {
        // day 1: 3 in / 0 out, day 2: 1 in / 2 out, day 3: 0 in / 1 out
        let facilities: Facilities = vec![facility(1, "202401", Some(10))].into_iter().collect();
        let admissions: Admissions = vec![
            admission(1, d(1), d(2), false),
            admission(1, d(1), d(2), false),
            admission(1, d(1), d(3), false),
            admission(1, d(2), d(4), false),
        ]
        .into_iter()
        .collect();

        let daily = DailyOccupancy::derive(&admissions, &facilities).unwrap();
        let occupied: Vec<i64> = daily.iter_ref().map(|s| s.occupied_beds).collect();
        assert_eq!(occupied, vec![3, 2, 1, 0]);
        let rates: Vec<f64> = daily
            .iter_ref()
            .map(|s| s.occupancy_rate_pct.unwrap())
            .collect();
        assert_eq!(rates, vec![30.0, 20.0, 10.0, 0.0]);
        // the outer join keeps the discharge-only day 4 with zero admissions
        let last = daily.sample_at(1, d(4)).unwrap();
        assert_eq!((last.admissions, last.discharges), (0, 1));
    }

    #[test]
    fn discharge_lands_in_its_own_month_key() {
        let facilities: Facilities = vec![
            facility(1, "202401", Some(10)),
            facility(1, "202402", Some(10)),
        ]
        .into_iter()
        .collect();
        let admissions: Admissions =
            vec![admission(1, d(30), Date8::from_ymd(2024, 2, 2), false)]
                .into_iter()
                .collect();

        let daily = DailyOccupancy::derive(&admissions, &facilities).unwrap();
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].month, "202401".try_into().unwrap());
        assert_eq!(daily[1].month, "202402".try_into().unwrap());
        // occupancy carries over the month boundary: +1 then -1
        assert_eq!(daily[0].occupied_beds, 1);
        assert_eq!(daily[1].occupied_beds, 0);
    }

    #[test]
    fn unregistered_facility_is_dropped() {
        let facilities: Facilities = vec![facility(1, "202401", Some(10))].into_iter().collect();
        let admissions: Admissions = vec![
            admission(1, d(1), d(2), false),
            admission(2, d(1), d(2), false),
        ]
        .into_iter()
        .collect();

        let daily = DailyOccupancy::derive(&admissions, &facilities).unwrap();
        assert!(daily.iter_ref().all(|s| s.cnes == 1));
        assert!(daily.sample_at(2, d(1)).is_none());
        // and the dropped facility never feeds the other's running count
        assert_eq!(daily.sample_at(1, d(1)).unwrap().occupied_beds, 1);
    }

    #[test]
    fn month_without_bed_count_is_dropped_but_count_carries() {
        let facilities: Facilities = vec![
            facility(1, "202401", Some(10)),
            facility(1, "202402", None),
            facility(1, "202403", Some(10)),
        ]
        .into_iter()
        .collect();
        let admissions: Admissions = vec![
            admission(1, d(1), Date8::from_ymd(2024, 2, 10), false),
            admission(1, d(2), Date8::from_ymd(2024, 3, 5), false),
        ]
        .into_iter()
        .collect();

        let daily = DailyOccupancy::derive(&admissions, &facilities).unwrap();
        // the February discharge day is unidentifiable and dropped
        assert!(daily.iter_ref().all(|s| s.month.month() != 2));
        // the fold skips it rather than resetting: 1, 2, then 2 - 1
        let occupied: Vec<i64> = daily.iter_ref().map(|s| s.occupied_beds).collect();
        assert_eq!(occupied, vec![1, 2, 1]);
    }

    #[test]
    fn zero_bed_month_has_undefined_rate() {
        let facilities: Facilities = vec![facility(1, "202401", Some(0))].into_iter().collect();
        let admissions: Admissions = vec![admission(1, d(1), d(2), false)].into_iter().collect();

        let daily = DailyOccupancy::derive(&admissions, &facilities).unwrap();
        assert_eq!(daily[0].occupied_beds, 1);
        assert_eq!(daily[0].occupancy_rate_pct, None);
    }

    #[test]
    fn death_rate_is_mean_of_flag_on_admission_day() {
        let facilities: Facilities = vec![facility(1, "202401", Some(10))].into_iter().collect();
        let admissions: Admissions = vec![
            admission(1, d(1), d(2), true),
            admission(1, d(1), d(3), false),
        ]
        .into_iter()
        .collect();

        let daily = DailyOccupancy::derive(&admissions, &facilities).unwrap();
        assert_eq!(daily.sample_at(1, d(1)).unwrap().death_rate_pct, 50.0);
        // discharge-only days have no admissions to average over
        assert_eq!(daily.sample_at(1, d(2)).unwrap().death_rate_pct, 0.0);
    }

    #[test]
    fn losing_every_row_is_a_join_error() {
        let facilities: Facilities = Vec::new().into_iter().collect();
        let admissions: Admissions = vec![admission(1, d(1), d(2), false)].into_iter().collect();

        let err = DailyOccupancy::derive(&admissions, &facilities).unwrap_err();
        assert!(matches!(err, PipelineError::JoinIntegrity { .. }));
    }
}
