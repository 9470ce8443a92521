pub mod config;
pub mod error;
pub mod fetch;
pub mod occupancy;
pub mod present;
pub mod stats;
pub mod summary;
mod util;

pub use anyhow::{Context, Error};
use chrono::NaiveDate;
use itertools::Either;
use qu::ick_use::*;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt, fs, io, iter,
    ops::Deref,
    path::{Path, PathBuf},
    sync::Arc,
};

pub use crate::{
    error::PipelineError,
    util::{header, latin1_to_utf8, path_exists, round2, sort_f64, NOT_APPLICABLE},
};
use crate::util::{bed_count, bool_01, cnes, date8, management, optional_string, year_month};

pub type ArcStr = Arc<str>;
pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;

/// National facility registry identifier. Identifies the same hospital in
/// both source tables.
pub type CnesId = u32;

/// An 8-digit `yyyymmdd` date as recorded in the hospitalization extract.
///
/// The numeric encoding orders chronologically, so these sort and compare
/// without being parsed into calendar dates.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Date8(u32);

impl Date8 {
    pub fn from_ymd(year: u32, month: u32, day: u32) -> Self {
        Date8(year * 10_000 + month * 100 + day)
    }

    /// The `yyyymm` key for this date, by digit truncation.
    pub fn year_month(self) -> YearMonth {
        YearMonth(self.0 / 100)
    }

    pub fn day(self) -> u32 {
        self.0 % 100
    }

    /// Calendar form, if the digits name a real date.
    pub fn as_date(self) -> Option<NaiveDate> {
        let ym = self.year_month();
        NaiveDate::from_ymd_opt(ym.year() as i32, ym.month(), self.day())
    }
}

impl TryFrom<&str> for Date8 {
    type Error = anyhow::Error;

    fn try_from(s: &str) -> Result<Self> {
        ensure!(
            s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()),
            "expected an 8-digit yyyymmdd date, got \"{}\"",
            s
        );
        Ok(Date8(s.parse()?))
    }
}

impl fmt::Display for Date8 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let ym = self.year_month();
        write!(f, "{:04}-{:02}-{:02}", ym.year(), ym.month(), self.day())
    }
}

/// A 6-digit `yyyymm` key, used both for registry competency months and for
/// the month component of daily occupancy rows.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth(u32);

impl YearMonth {
    pub fn january(year: u16) -> Self {
        YearMonth(year as u32 * 100 + 1)
    }

    pub fn year(self) -> u32 {
        self.0 / 100
    }

    pub fn month(self) -> u32 {
        self.0 % 100
    }
}

impl TryFrom<&str> for YearMonth {
    type Error = anyhow::Error;

    fn try_from(s: &str) -> Result<Self> {
        ensure!(
            s.len() == 6 && s.bytes().all(|b| b.is_ascii_digit()),
            "expected a 6-digit yyyymm key, got \"{}\"",
            s
        );
        Ok(YearMonth(s.parse()?))
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

/// How a facility is administered within SUS.
///
/// The registry encodes this as a single letter. Codes outside the known set
/// are preserved verbatim rather than rejected, so a registry revision can't
/// break ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Management {
    Municipal,
    Estadual,
    Dupla,
    SemGestao,
    Other(ArcStr),
}

impl Management {
    pub fn from_code(code: &str) -> Self {
        match code {
            "M" => Management::Municipal,
            "E" => Management::Estadual,
            "D" => Management::Dupla,
            "S" => Management::SemGestao,
            other => Management::Other(other.into()),
        }
    }
}

impl fmt::Display for Management {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Management::Municipal => f.write_str("Municipal"),
            Management::Estadual => f.write_str("Estadual"),
            Management::Dupla => f.write_str("Dupla"),
            Management::SemGestao => f.write_str("Sem Gestão"),
            Management::Other(code) => f.write_str(code),
        }
    }
}

/// Columns the facility registry must provide. Anything else in the export
/// is ignored at parse time.
const FACILITY_COLUMNS: &[&str] = &[
    "COMP",
    "CNES",
    "NOME_ESTABELECIMENTO",
    "MUNICIPIO",
    "UF",
    "DS_TIPO_UNIDADE",
    "TP_GESTAO",
    "LEITOS_SUS",
    "NU_TELEFONE",
    "NO_EMAIL",
];

#[derive(Debug, Clone, Deserialize)]
struct FacilityRaw {
    #[serde(rename = "COMP", deserialize_with = "year_month")]
    competency: YearMonth,
    #[serde(rename = "CNES", deserialize_with = "cnes")]
    cnes: CnesId,
    #[serde(rename = "NOME_ESTABELECIMENTO")]
    name: ArcStr,
    #[serde(rename = "MUNICIPIO")]
    municipality: ArcStr,
    #[serde(rename = "UF")]
    uf: ArcStr,
    #[serde(rename = "DS_TIPO_UNIDADE")]
    facility_type: ArcStr,
    #[serde(rename = "TP_GESTAO", deserialize_with = "management")]
    management: Management,
    #[serde(rename = "LEITOS_SUS", deserialize_with = "bed_count")]
    sus_beds: Option<i64>,
    #[serde(rename = "NU_TELEFONE", deserialize_with = "optional_string")]
    telephone: Option<ArcStr>,
    #[serde(rename = "NO_EMAIL", deserialize_with = "optional_string")]
    email: Option<ArcStr>,
}

/// A row in the facility/bed registry: one facility in one reporting month.
///
/// `(cnes, competency)` is not guaranteed unique in the source; whenever the
/// pipeline needs one row per key it takes the first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Facility {
    pub cnes: CnesId,
    pub competency: YearMonth,
    pub name: ArcStr,
    pub municipality: ArcStr,
    pub facility_type: ArcStr,
    pub management: Management,
    /// SUS-funded beds reported for the month. `None` when the registry has
    /// no usable figure; such months are treated as unidentifiable, not as
    /// zero-bed.
    pub sus_beds: Option<i64>,
    pub telephone: ArcStr,
    pub email: ArcStr,
}

impl From<FacilityRaw> for Facility {
    fn from(from: FacilityRaw) -> Self {
        Self {
            cnes: from.cnes,
            competency: from.competency,
            name: from.name,
            municipality: from.municipality,
            facility_type: from.facility_type,
            management: from.management,
            sus_beds: from.sus_beds,
            telephone: from.telephone.unwrap_or_else(|| NOT_APPLICABLE.into()),
            email: from.email.unwrap_or_else(|| NOT_APPLICABLE.into()),
        }
    }
}

/// The parsed facility registry, with pre-built indexes for `(cnes, month)`
/// and `cnes` lookups. Both indexes keep the first matching row.
pub struct Facilities {
    els: Arc<Vec<Facility>>,
    month_idx: BTreeMap<(CnesId, YearMonth), usize>,
    cnes_idx: BTreeMap<CnesId, usize>,
}

impl Facilities {
    /// Load the registry CSV, keeping only rows for the given UF.
    ///
    /// The export is ISO-8859-1 encoded, so the whole file is transcoded
    /// before parsing.
    pub fn load_orig(path: impl AsRef<Path>, uf: &str) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("while reading \"{}\"", path.display()))?;
        let text = latin1_to_utf8(&bytes);
        Self::from_csv(text.as_bytes(), uf)
            .with_context(|| format!("while loading \"{}\"", path.display()))
    }

    /// Parse registry rows from CSV text, keeping only the given UF.
    pub fn from_csv(reader: impl io::Read, uf: &str) -> Result<Self> {
        let raw: Vec<FacilityRaw> = load_csv(reader, "facility registry", FACILITY_COLUMNS)?;
        let els: Vec<Facility> = raw
            .into_iter()
            .filter(|r| &*r.uf == uf)
            .map(Into::into)
            .collect();
        let this = Self::new(els);
        let dups = this.els.len() - this.month_idx.len();
        if dups > 0 {
            event!(
                Level::WARN,
                "{} duplicate (CNES, month) rows in the facility registry; keeping the first of each",
                dups
            );
        }
        Ok(this)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(load(path)?))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result {
        save(&self.els, path)
    }

    /// The registry row for a facility in a given month, if any.
    pub fn find_month(&self, cnes: CnesId, month: YearMonth) -> Option<&Facility> {
        let idx = self.month_idx.get(&(cnes, month))?;
        self.els.get(*idx)
    }

    /// The first registry row for a facility, across all months.
    pub fn find_first(&self, cnes: CnesId) -> Option<&Facility> {
        let idx = self.cnes_idx.get(&cnes)?;
        self.els.get(*idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = Facility> + '_ {
        self.els.iter().cloned()
    }

    pub fn iter_ref(&self) -> impl Iterator<Item = &Facility> + '_ {
        self.els.iter()
    }

    pub fn filter(&self, f: impl Fn(&Facility) -> bool) -> Self {
        Self::new(self.iter().filter(f).collect())
    }

    fn new(els: Vec<Facility>) -> Self {
        let mut this = Facilities {
            els: els.into(),
            month_idx: BTreeMap::new(),
            cnes_idx: BTreeMap::new(),
        };
        this.rebuild_index();
        this
    }

    fn rebuild_index(&mut self) {
        self.month_idx.clear();
        self.cnes_idx.clear();
        for (idx, el) in self.els.iter().enumerate() {
            self.month_idx.entry((el.cnes, el.competency)).or_insert(idx);
            self.cnes_idx.entry(el.cnes).or_insert(idx);
        }
    }
}

impl Deref for Facilities {
    type Target = [Facility];
    fn deref(&self) -> &Self::Target {
        &*self.els
    }
}

impl FromIterator<Facility> for Facilities {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = Facility>,
    {
        Self::new(iter.into_iter().collect())
    }
}

/// Columns the hospitalization extract must provide.
const ADMISSION_COLUMNS: &[&str] = &[
    "CNES",
    "MES_CMPT",
    "DT_INTER",
    "DT_SAIDA",
    "DIAS_PERM",
    "DIAG_PRINC",
    "IDADE",
    "MORTE",
    "MUNIC_MOV",
];

#[derive(Debug, Deserialize)]
struct AdmissionRaw {
    #[serde(rename = "CNES", deserialize_with = "cnes")]
    cnes: CnesId,
    #[serde(rename = "MES_CMPT")]
    competency_month: u8,
    #[serde(rename = "DT_INTER", deserialize_with = "date8")]
    admission_date: Date8,
    #[serde(rename = "DT_SAIDA", deserialize_with = "date8")]
    discharge_date: Date8,
    #[serde(rename = "DIAS_PERM")]
    length_of_stay_days: u32,
    #[serde(rename = "DIAG_PRINC")]
    principal_diagnosis: ArcStr,
    #[serde(rename = "IDADE")]
    age: u16,
    #[serde(rename = "MORTE", deserialize_with = "bool_01")]
    death: bool,
    #[serde(rename = "MUNIC_MOV")]
    municipality_code: u32,
}

/// One hospitalization record (an AIH).
///
/// The discharge date is assumed to be on or after the admission date; the
/// source does not guarantee it and the pipeline does not check it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admission {
    pub cnes: CnesId,
    /// Billing competency month (1-12), distinct from the admission month.
    pub competency_month: u8,
    pub admission_date: Date8,
    pub discharge_date: Date8,
    pub length_of_stay_days: u32,
    /// Principal diagnosis, as a CID code.
    pub principal_diagnosis: ArcStr,
    pub age: u16,
    pub death: bool,
    /// IBGE code of the facility's municipality.
    pub municipality_code: u32,
}

impl From<AdmissionRaw> for Admission {
    fn from(from: AdmissionRaw) -> Self {
        Self {
            cnes: from.cnes,
            competency_month: from.competency_month,
            admission_date: from.admission_date,
            discharge_date: from.discharge_date,
            length_of_stay_days: from.length_of_stay_days,
            principal_diagnosis: from.principal_diagnosis,
            age: from.age,
            death: from.death,
            municipality_code: from.municipality_code,
        }
    }
}

/// The parsed list of hospitalization records, with a pre-built index for
/// the facility id.
#[derive(Debug)]
pub struct Admissions {
    els: Arc<Vec<Admission>>,
    cnes_idx: BTreeMap<CnesId, Vec<usize>>,
}

impl Admissions {
    pub fn load_orig(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file =
            fs::File::open(path).with_context(|| format!("while reading \"{}\"", path.display()))?;
        Self::from_csv(io::BufReader::new(file))
            .with_context(|| format!("while loading \"{}\"", path.display()))
    }

    pub fn from_csv(reader: impl io::Read) -> Result<Self> {
        let raw: Vec<AdmissionRaw> =
            load_csv(reader, "hospitalization records", ADMISSION_COLUMNS)?;
        Ok(Self::new(raw.into_iter().map(Into::into).collect()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(load(path)?))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result {
        save(&self.els, path)
    }

    pub fn for_facility(&self, cnes: CnesId) -> impl Iterator<Item = &Admission> + Clone + '_ {
        let idxs = match self.cnes_idx.get(&cnes) {
            Some(idxs) => idxs,
            None => return Either::Left(iter::empty()),
        };
        Either::Right(idxs.iter().map(|idx| {
            self.els
                .get(*idx)
                .expect("inconsistent admission facility index")
        }))
    }

    pub fn iter(&self) -> impl Iterator<Item = Admission> + '_ {
        self.els.iter().cloned()
    }

    pub fn iter_ref(&self) -> impl Iterator<Item = &Admission> + '_ {
        self.els.iter()
    }

    /// Get an `Admissions` object containing only records that match the
    /// filter.
    pub fn filter(&self, f: impl Fn(&Admission) -> bool) -> Self {
        Self::new(self.iter().filter(f).collect())
    }

    pub fn retain(&mut self, f: impl Fn(&Admission) -> bool) {
        Arc::make_mut(&mut self.els).retain(f);
        self.rebuild_index();
    }

    fn new(els: Vec<Admission>) -> Self {
        let mut this = Admissions {
            els: Arc::new(els),
            cnes_idx: BTreeMap::new(),
        };
        this.rebuild_index();
        this
    }

    fn rebuild_index(&mut self) {
        self.cnes_idx.clear();
        for (idx, el) in self.els.iter().enumerate() {
            self.cnes_idx.entry(el.cnes).or_insert_with(Vec::new).push(idx);
        }
    }
}

impl Deref for Admissions {
    type Target = [Admission];
    fn deref(&self) -> &Self::Target {
        &*self.els
    }
}

impl<'a> IntoIterator for &'a Admissions {
    type IntoIter = <&'a [Admission] as IntoIterator>::IntoIter;
    type Item = &'a Admission;
    fn into_iter(self) -> Self::IntoIter {
        self.els.iter()
    }
}

impl FromIterator<Admission> for Admissions {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = Admission>,
    {
        Self::new(iter.into_iter().collect())
    }
}

/// Parse CSV rows after checking the header carries every required column.
///
/// A missing column is a schema error naming the table and all absent
/// columns, rather than a serde error about whichever field happened to be
/// deserialized first.
fn load_csv<T: DeserializeOwned>(
    reader: impl io::Read,
    table: &'static str,
    required: &[&str],
) -> Result<Vec<T>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = rdr
        .headers()
        .with_context(|| format!("while reading the {} header", table))?
        .clone();
    let missing: Vec<String> = required
        .iter()
        .filter(|col| !headers.iter().any(|h| h == **col))
        .map(|col| col.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::Schema {
            table,
            columns: missing,
        }
        .into());
    }
    rdr.into_deserialize()
        .collect::<Result<Vec<T>, _>>()
        .with_context(|| format!("while parsing {} rows", table))
}

/// Load an intermediate table into memory.
fn load<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>> {
    fn inner<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
        let reader = io::BufReader::new(fs::File::open(path)?);
        bincode::deserialize_from(reader).map_err(Into::into)
    }
    let path = path.as_ref();
    check_extension(path, "bin")?;
    let path = output_path(path);

    inner(&path).with_context(|| format!("unable to load data from \"{}\"", path.display()))
}

/// Save an intermediate table to disk.
fn save<T: Serialize>(contents: &[T], path: impl AsRef<Path>) -> Result {
    fn inner<T: Serialize>(contents: &[T], path: &Path) -> Result {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("could not create parent")?;
        }
        if path_exists(path)? {
            event!(
                Level::WARN,
                "overwriting existing file at \"{}\"",
                path.display()
            );
        }
        let mut out = io::BufWriter::new(fs::File::create(path)?);
        bincode::serialize_into(&mut out, contents)?;
        Ok(())
    }
    let path = path.as_ref();
    check_extension(path, "bin")?;
    let path = output_path(path);

    inner(contents, &path).with_context(|| format!("unable to save data to \"{}\"", path.display()))
}

/// Note: No protection from escaping the root directory.
pub fn orig_path(input: impl AsRef<Path>) -> PathBuf {
    Path::new("data/source").join(input)
}

/// Note: No protection from escaping the root directory.
pub fn output_path(input: impl AsRef<Path>) -> PathBuf {
    Path::new("data/output").join(input)
}

pub fn check_extension(path: &Path, ext: &str) -> Result<()> {
    ensure!(
        matches!(path.extension(), Some(p) if p == ext),
        "filename should end with `.{}`",
        ext
    );
    Ok(())
}
