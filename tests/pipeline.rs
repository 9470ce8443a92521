//! End-to-end checks of the derivation pipeline over in-memory tables.
use sih_bed_occupancy::{
    occupancy::DailyOccupancy, round2, summary::FacilitySummaries, Admission, Admissions, Date8,
    Facilities, Facility, Management, YearMonth, NOT_APPLICABLE,
};

fn facility(cnes: u32, competency: &str, sus_beds: Option<i64>) -> Facility {
    Facility {
        cnes,
        competency: competency.try_into().unwrap(),
        name: format!("HOSPITAL {}", cnes).into(),
        municipality: "JOAO PESSOA".into(),
        facility_type: "HOSPITAL GERAL".into(),
        management: Management::Municipal,
        sus_beds,
        telephone: NOT_APPLICABLE.into(),
        email: NOT_APPLICABLE.into(),
    }
}

fn admission(cnes: u32, admitted: Date8, discharged: Date8, stay: u32, death: bool) -> Admission {
    Admission {
        cnes,
        competency_month: admitted.year_month().month() as u8,
        admission_date: admitted,
        discharge_date: discharged,
        length_of_stay_days: stay,
        principal_diagnosis: "K359".into(),
        age: 40,
        death,
        municipality_code: 250_750,
    }
}

fn d(day: u32) -> Date8 {
    Date8::from_ymd(2024, 1, day)
}

#[test]
fn occupancy_sequence_for_a_known_scenario() {
    // day 1: 3 admissions, day 2: 1 admission / 2 discharges, day 3: 1
    // discharge; 10 beds
    let facilities: Facilities = vec![facility(1, "202401", Some(10))].into_iter().collect();
    let admissions: Admissions = vec![
        admission(1, d(1), d(2), 1, false),
        admission(1, d(1), d(2), 1, false),
        admission(1, d(1), d(3), 2, false),
        admission(1, d(2), d(9), 7, false),
    ]
    .into_iter()
    .collect();

    let daily = DailyOccupancy::derive(&admissions, &facilities).unwrap();
    let first_three: Vec<(i64, Option<f64>)> = daily
        .iter_ref()
        .take(3)
        .map(|s| (s.occupied_beds, s.occupancy_rate_pct))
        .collect();
    assert_eq!(
        first_three,
        vec![(3, Some(30.0)), (2, Some(20.0)), (1, Some(10.0))]
    );
}

#[test]
fn every_event_date_appears_once() {
    let facilities: Facilities = vec![facility(1, "202401", Some(10))].into_iter().collect();
    let admissions: Admissions = vec![
        admission(1, d(1), d(20), 19, false),
        admission(1, d(5), d(20), 15, false),
    ]
    .into_iter()
    .collect();

    let daily = DailyOccupancy::derive(&admissions, &facilities).unwrap();
    let dates: Vec<Date8> = daily.iter_ref().map(|s| s.date).collect();
    // admission-only days and the shared discharge-only day all survive the
    // outer join, each exactly once
    assert_eq!(dates, vec![d(1), d(5), d(20)]);
    let last = daily.sample_at(1, d(20)).unwrap();
    assert_eq!((last.admissions, last.discharges), (0, 2));
    assert_eq!(last.occupied_beds, 0);
}

#[test]
fn unregistered_facility_surfaces_no_rows_anywhere() {
    let facilities: Facilities = vec![facility(1, "202401", Some(10))].into_iter().collect();
    let admissions: Admissions = vec![
        admission(1, d(1), d(2), 1, false),
        admission(2, d(1), d(2), 1, false),
        admission(2, d(3), d(4), 1, true),
    ]
    .into_iter()
    .collect();

    let daily = DailyOccupancy::derive(&admissions, &facilities).unwrap();
    let summaries = FacilitySummaries::derive(&daily, &admissions, &facilities).unwrap();

    assert_eq!(daily.iter_ref().filter(|s| s.cnes == 2).count(), 0);
    assert_eq!(summaries.iter_ref().filter(|s| s.cnes == 2).count(), 0);
    // the registered facility is unaffected
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].cnes, 1);
    // dropped + kept facility-days account for every event day:
    // 6 = (1,d1) (1,d2) (2,d1) (2,d2) (2,d3) (2,d4); facility 2's 4 dropped
    assert_eq!(daily.len(), 6 - 4);
}

#[test]
fn rate_is_exactly_occupied_over_total_for_every_sample() {
    let facilities: Facilities = vec![
        facility(1, "202401", Some(7)),
        facility(2, "202401", Some(13)),
    ]
    .into_iter()
    .collect();
    let admissions: Admissions = vec![
        admission(1, d(1), d(4), 3, false),
        admission(1, d(2), d(4), 2, false),
        admission(2, d(3), d(8), 5, true),
        admission(2, d(3), d(9), 6, false),
    ]
    .into_iter()
    .collect();

    let daily = DailyOccupancy::derive(&admissions, &facilities).unwrap();
    assert!(!daily.is_empty());
    for sample in daily.iter_ref() {
        assert_eq!(
            sample.occupancy_rate_pct.unwrap(),
            round2(sample.occupied_beds as f64 / sample.total_beds as f64 * 100.0),
        );
    }
}

#[test]
fn summary_product_identity_holds_for_every_facility() {
    let facilities: Facilities = vec![
        facility(1, "202401", Some(10)),
        facility(2, "202401", Some(30)),
    ]
    .into_iter()
    .collect();
    let admissions: Admissions = vec![
        admission(1, d(1), d(4), 3, false),
        admission(1, d(2), d(6), 4, true),
        admission(2, d(1), d(2), 1, false),
        admission(2, d(10), d(21), 11, false),
        admission(2, d(10), d(15), 5, false),
    ]
    .into_iter()
    .collect();

    let daily = DailyOccupancy::derive(&admissions, &facilities).unwrap();
    let summaries = FacilitySummaries::derive(&daily, &admissions, &facilities).unwrap();

    assert_eq!(summaries.len(), 2);
    for row in summaries.iter_ref() {
        assert_eq!(
            row.avg_daily_occupancy,
            round2(row.mean_daily_admissions * row.mean_length_of_stay),
        );
    }
}

#[test]
fn csv_to_summary_round_trip() {
    let facility_csv = "\
COMP,CNES,NOME_ESTABELECIMENTO,MUNICIPIO,UF,DS_TIPO_UNIDADE,TP_GESTAO,LEITOS_SUS,NU_TELEFONE,NO_EMAIL
202401,1,HOSPITAL UM,JOAO PESSOA,PB,HOSPITAL GERAL,M,10,,
202401,7,HOSPITAL OUTRO,RECIFE,PE,HOSPITAL GERAL,E,50,,
";
    let admission_csv = "\
CNES,MES_CMPT,DT_INTER,DT_SAIDA,DIAS_PERM,DIAG_PRINC,IDADE,MORTE,MUNIC_MOV
1,1,20240102,20240104,2,K359,30,0,250750
1,1,20240103,20240104,1,I219,80,1,250750
1,12,20240110,20240111,1,I219,55,0,250750
1,2,20231230,20240104,5,I219,55,0,250750
";
    let facilities = Facilities::from_csv(facility_csv.as_bytes(), "PB").unwrap();
    assert_eq!(facilities.len(), 1);

    let admissions = Admissions::from_csv(admission_csv.as_bytes()).unwrap();
    // competency after November and admissions before the target year are
    // out of scope
    let admissions = admissions.filter(|adm| {
        adm.competency_month <= 11
            && adm.admission_date.year_month() >= YearMonth::january(2024)
    });
    assert_eq!(admissions.len(), 2);

    let daily = DailyOccupancy::derive(&admissions, &facilities).unwrap();
    let summaries = FacilitySummaries::derive(&daily, &admissions, &facilities).unwrap();
    assert_eq!(summaries.len(), 1);
    let row = &summaries[0];
    assert_eq!(row.mean_death_rate_pct, 50.0);
    assert_eq!(row.mean_length_of_stay, 1.5);
    assert_eq!(&*row.name, "HOSPITAL UM");
}
