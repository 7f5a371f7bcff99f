//! End-to-end tests: synthetic release archives through a real
//! `SqliteStore` in a temporary directory.

use std::{cell::RefCell, fs, io::Write, path::PathBuf, rc::Rc};

use microdata_core::{
  arrays::{ArraySet, Artifact},
  stage::{Progress, Stage},
  table::Column,
};
use microdata_store_sqlite::SqliteStore;
use rand::SeedableRng as _;
use rand_chacha::ChaCha8Rng;
use tempfile::TempDir;

use crate::{
  Catalog, Error, Fetcher, PipelineSettings, Result, archive::testing::zip_bytes,
  donor::{Calibration, weighted_quantile},
  standard_catalog,
};

// ─── Fixtures ────────────────────────────────────────────────────────────────

/// Serves one fixed body, or a fixed HTTP status, and records every URL.
#[derive(Clone, Default)]
struct StaticFetcher {
  body:   Vec<u8>,
  status: Option<u16>,
  urls:   Rc<RefCell<Vec<String>>>,
}

impl Fetcher for StaticFetcher {
  fn fetch(&self, url: &str, dest: &mut dyn Write) -> Result<u64> {
    self.urls.borrow_mut().push(url.to_owned());
    if let Some(status) = self.status {
      return Err(Error::Download { url: url.to_owned(), status });
    }
    dest.write_all(&self.body)?;
    Ok(self.body.len() as u64)
  }
}

fn rng(seed: u64) -> ChaCha8Rng { ChaCha8Rng::seed_from_u64(seed) }

fn settings() -> PipelineSettings {
  let mut settings = PipelineSettings::default();
  settings.growth_index.set("earnings", 2019, 100.0);
  settings.growth_index.set("earnings", 2020, 110.0);
  settings
}

fn catalog_with(dir: &TempDir, fetcher: StaticFetcher) -> Catalog<SqliteStore> {
  standard_catalog(SqliteStore::new(dir.path().join("data")), Box::new(fetcher), settings())
}

fn catalog(dir: &TempDir) -> Catalog<SqliteStore> {
  catalog_with(dir, StaticFetcher::default())
}

fn write_archive(dir: &TempDir, name: &str, entries: &[(&str, &str)]) -> PathBuf {
  let path = dir.path().join(name);
  fs::write(&path, zip_bytes(entries)).unwrap();
  path
}

/// Two households of two adults, one job each.
fn frs_archive(dir: &TempDir) -> PathBuf {
  write_archive(dir, "frs_2019.zip", &[
    (
      "UKDA-0000-tab/tab/adult.tab",
      "SERNUM\tBENUNIT\tPERSON\tAGE\tAGE80\tSEINCAM2\n\
       1\t1\t1\t4\t40\t0\n\
       1\t1\t2\t4\t38\t0\n\
       2\t1\t1\t5\t50\t10\n\
       2\t1\t2\t5\t52\t\n",
    ),
    ("UKDA-0000-tab/tab/child.tab", "SERNUM\tBENUNIT\tPERSON\tAGE\n"),
    (
      "UKDA-0000-tab/tab/accounts.tab",
      "SERNUM\tBENUNIT\tPERSON\tACCOUNT\tACCINT\n1\t1\t1\t1\t5\n2\t1\t1\t6\t7\n",
    ),
    (
      "UKDA-0000-tab/tab/benefits.tab",
      "SERNUM\tBENUNIT\tPERSON\tBENEFIT\tBENAMT\tVAR2\n1\t1\t2\t14\t60\t2\n2\t1\t2\t14\t50\t1\n",
    ),
    (
      "UKDA-0000-tab/tab/job.tab",
      "SERNUM\tBENUNIT\tPERSON\tGRWAGE\n1\t1\t1\t100\n1\t1\t2\t200\n2\t1\t1\t300\n2\t1\t2\t400\n",
    ),
    ("UKDA-0000-tab/tab/chldcare.tab", "SERNUM\tBENUNIT\tPERSON\tCHAMT\n"),
    ("UKDA-0000-tab/tab/benunit.tab", "SERNUM\tBENUNIT\tBUKIDS\n1\t1\t0\n2\t1\t0\n"),
    (
      "UKDA-0000-tab/tab/househol.tab",
      "SERNUM\tGVTREGNO\tCTBAND\tCTANNUAL\tGROSS4\n1\t5\t3\t1200\t1000\n2\t5\t3\t0\t2000\n",
    ),
    ("UKDA-0000-tab/mrdoc/README.txt", "documentation"),
  ])
}

/// Eight taxpayers with dividends.
fn spi_archive(dir: &TempDir) -> PathBuf {
  write_archive(dir, "spi_2019.zip", &[(
    "UKDA-0001-tab/tab/put1819uk.tab",
    "FACT\tPAY\tINCBBS\tDIVIDENDS\tAGERANGE\n\
     1000\t20000\t100\t500\t2\n\
     1000\t30000\t200\t0\t3\n\
     1000\t40000\t50\t1500\t3\n\
     1000\t50000\t400\t2500\t4\n\
     1000\t60000\t300\t4000\t4\n\
     1000\t70000\t800\t8000\t5\n\
     1000\t80000\t600\t12000\t6\n\
     1000\t90000\t900\t20000\t6\n",
  )])
}

fn cps_zip() -> Vec<u8> {
  zip_bytes(&[
    (
      "asecpub20csv/pppub20.csv",
      "PH_SEQ,PF_SEQ,P_SEQ,TAX_ID,SPM_ID,A_FNLWGT,INT_VAL,A_AGE,WSAL_VAL\n\
       1,1,1,101,1001,150.5,10,40,30000\n\
       1,1,2,101,1001,150.5,0,38,20000\n\
       2,1,1,201,2001,200,5,70,0\n",
    ),
    ("asecpub20csv/ffpub20.csv", "FH_SEQ,FFPOS,FSUP_WGT\n1,1,300\n2,1,400\n"),
    ("asecpub20csv/hhpub20.csv", "H_SEQ,HSUP_WGT,GESTFIPS\n1,300,6\n2,400,36\n"),
  ])
}

fn arrays(artifact: Artifact) -> ArraySet { artifact.into_arrays().unwrap() }

fn floats(set: &ArraySet, variable: &str, year: i32) -> Vec<f64> {
  set.values(variable, year).unwrap().to_f64().unwrap()
}

// ─── FRS ─────────────────────────────────────────────────────────────────────

#[test]
fn job_income_lands_on_its_own_person() {
  let dir = TempDir::new().unwrap();
  let catalog = catalog(&dir);
  let source = frs_archive(&dir);
  let mut rng = rng(1);

  catalog.generate("raw_frs", 2019, Some(&source), &mut rng).unwrap();
  let base = arrays(catalog.load("base_frs", 2019, &mut rng).unwrap());

  assert_eq!(floats(&base, "P_person_id", 2019), vec![101.0, 102.0, 201.0, 202.0]);
  assert_eq!(floats(&base, "P_GRWAGE", 2019), vec![100.0, 200.0, 300.0, 400.0]);
  assert_eq!(floats(&base, "P_household_id", 2019), vec![1.0, 1.0, 2.0, 2.0]);
  assert_eq!(floats(&base, "P_benunit_id", 2019), vec![101.0, 101.0, 201.0, 201.0]);
  assert_eq!(floats(&base, "H_household_id", 2019).len(), 2);
  assert_eq!(floats(&base, "P_GROSS4", 2019), vec![1000.0, 1000.0, 2000.0, 2000.0]);

  // Pivoted categories: only codes that occur get a column, zero elsewhere.
  assert_eq!(floats(&base, "P_ACCINT_ACCOUNT_CODE_1", 2019), vec![5.0, 0.0, 0.0, 0.0]);
  assert_eq!(floats(&base, "P_ACCINT_ACCOUNT_CODE_6", 2019), vec![0.0, 0.0, 7.0, 0.0]);
  assert!(base.get("P_ACCINT_ACCOUNT_CODE_2", 2019).is_none());
  assert_eq!(floats(&base, "P_BENAMT_BENEFIT_CODE_1014", 2019), vec![0.0, 60.0, 0.0, 0.0]);
  assert_eq!(floats(&base, "P_BENAMT_BENEFIT_CODE_14", 2019), vec![0.0, 0.0, 0.0, 50.0]);

  // The only reported amount in the stratum fills the unreported one.
  assert_eq!(floats(&base, "H_CTANNUAL", 2019), vec![1200.0, 1200.0]);
  assert_eq!(
    base.values("P_role", 2019).unwrap().to_strings().unwrap(),
    vec!["adult"; 4]
  );
  assert!(base.metadata.contains_key("source_sha256"));
}

#[test]
fn person_ids_are_distinct_and_recover_their_household() {
  let dir = TempDir::new().unwrap();
  let catalog = catalog(&dir);
  let source = frs_archive(&dir);
  let mut rng = rng(2);
  catalog.generate("raw_frs", 2019, Some(&source), &mut rng).unwrap();
  let base = arrays(catalog.load("base_frs", 2019, &mut rng).unwrap());

  let Column::Int(people) = base.values("P_person_id", 2019).unwrap() else {
    panic!("person ids should be integers");
  };
  let Column::Int(households) = base.values("P_household_id", 2019).unwrap() else {
    panic!("household ids should be integers");
  };
  let distinct: std::collections::HashSet<_> = people.iter().collect();
  assert_eq!(distinct.len(), people.len());
  for (person, household) in people.iter().zip(households) {
    assert_eq!(person / 100, *household);
  }
}

#[test]
fn households_of_ten_or_more_people_build() {
  let dir = TempDir::new().unwrap();
  let catalog = catalog(&dir);
  let mut adult = String::from("SERNUM\tBENUNIT\tPERSON\tAGE80\n");
  for person in 1..=12 {
    adult.push_str(&format!("1\t{}\t{person}\t30\n", if person <= 6 { 1 } else { 2 }));
  }
  let source = write_archive(&dir, "large.zip", &[
    ("UKDA-0000-tab/tab/adult.tab", adult.as_str()),
    ("UKDA-0000-tab/tab/child.tab", "SERNUM\tBENUNIT\tPERSON\tAGE\n"),
    ("UKDA-0000-tab/tab/accounts.tab", "SERNUM\tBENUNIT\tPERSON\tACCOUNT\tACCINT\n"),
    ("UKDA-0000-tab/tab/benefits.tab", "SERNUM\tBENUNIT\tPERSON\tBENEFIT\tBENAMT\tVAR2\n"),
    ("UKDA-0000-tab/tab/job.tab", "SERNUM\tBENUNIT\tPERSON\tGRWAGE\n1\t2\t11\t500\n"),
    ("UKDA-0000-tab/tab/chldcare.tab", "SERNUM\tBENUNIT\tPERSON\tCHAMT\n"),
    ("UKDA-0000-tab/tab/benunit.tab", "SERNUM\tBENUNIT\n1\t1\n1\t2\n"),
    (
      "UKDA-0000-tab/tab/househol.tab",
      "SERNUM\tGVTREGNO\tCTBAND\tCTANNUAL\tGROSS4\n1\t5\t3\t1200\t1000\n",
    ),
  ]);
  let mut rng = rng(17);
  catalog.generate("raw_frs", 2019, Some(&source), &mut rng).unwrap();
  let base = arrays(catalog.load("base_frs", 2019, &mut rng).unwrap());

  assert_eq!(
    base.values("P_person_id", 2019).unwrap(),
    &Column::Int((101..=112).collect())
  );
  let benunits = floats(&base, "P_benunit_id", 2019);
  assert_eq!(benunits[5], 101.0);
  assert_eq!(benunits[6], 102.0);
  assert_eq!(floats(&base, "P_GRWAGE", 2019)[10], 500.0);
  assert_eq!(floats(&base, "P_household_id", 2019), vec![1.0; 12]);
}

#[test]
fn regeneration_is_stable_outside_randomized_fields() {
  let dir = TempDir::new().unwrap();
  let catalog = catalog(&dir);
  let source = frs_archive(&dir);
  catalog.generate("raw_frs", 2019, Some(&source), &mut rng(3)).unwrap();

  catalog.generate("base_frs", 2019, None, &mut rng(4)).unwrap();
  let first = arrays(catalog.load("base_frs", 2019, &mut rng(0)).unwrap());
  catalog.generate("base_frs", 2019, None, &mut rng(5)).unwrap();
  let second = arrays(catalog.load("base_frs", 2019, &mut rng(0)).unwrap());

  assert_eq!(first.len(), second.len());
  for (key, array) in first.iter().filter(|(k, _)| k.variable != "H_CTANNUAL") {
    assert_eq!(
      Some(array),
      second.get(&key.variable, key.period),
      "{} differs",
      key.path()
    );
  }
  assert_ne!(first.metadata.get("run_id"), second.metadata.get("run_id"));
}

#[test]
fn model_ready_frs_spans_the_horizon_and_uprates() {
  let dir = TempDir::new().unwrap();
  let catalog = catalog(&dir);
  let source = frs_archive(&dir);
  let mut rng = rng(6);
  catalog.generate("raw_frs", 2019, Some(&source), &mut rng).unwrap();

  // No base year is stored yet; the latest raw year is used.
  let frs = arrays(catalog.load("frs", 2019, &mut rng).unwrap());
  assert!(catalog.exists("base_frs", 2019).unwrap());
  assert_eq!(frs.periods().len(), 10);
  assert_eq!(frs.periods().first(), Some(&2019));
  assert_eq!(frs.metadata.get("base_year").map(String::as_str), Some("2019"));

  assert_eq!(
    frs.values("person_id", 2019).unwrap(),
    &Column::Int(vec![101, 102, 201, 202])
  );
  assert_eq!(
    floats(&frs, "employment_income", 2019),
    vec![5200.0, 10400.0, 15600.0, 20800.0]
  );
  let uprated = floats(&frs, "employment_income", 2020);
  assert!((uprated[0] - 5720.0).abs() < 1e-6);
  // No index level past 2020: carried forward from the base year.
  assert_eq!(floats(&frs, "employment_income", 2025)[3], 20800.0);
  assert_eq!(floats(&frs, "age", 2019), vec![40.0, 38.0, 50.0, 52.0]);
  assert_eq!(floats(&frs, "household_weight", 2019), vec![1000.0, 2000.0]);
  assert_eq!(frs.get("household_id", 2019).unwrap().entity, "household");
}

#[test]
fn loading_without_any_source_fails_with_typed_errors() {
  let dir = TempDir::new().unwrap();
  let catalog = catalog(&dir);
  let mut rng = rng(7);

  let err = catalog.load("raw_frs", 2019, &mut rng).unwrap_err();
  assert!(matches!(err, Error::NotFound { stage: Stage::Raw, year: 2019, .. }), "{err:?}");

  let err = catalog.load("base_frs", 2019, &mut rng).unwrap_err();
  assert!(
    matches!(err, Error::MissingDependency { ref dependency, .. } if dependency == "raw_frs 2019"),
    "{err:?}"
  );
  assert!(matches!(err.root(), Error::NotFound { .. }));

  let err = catalog.load("frs", 2019, &mut rng).unwrap_err();
  assert!(matches!(err, Error::MissingDependency { .. }), "{err:?}");

  assert!(catalog.years("base_frs").unwrap().is_empty());
  assert!(matches!(
    catalog.load("nope", 2019, &mut rng),
    Err(Error::UnknownDataset(_))
  ));
}

#[test]
fn missing_raw_tables_are_named() {
  let dir = TempDir::new().unwrap();
  let catalog = catalog(&dir);
  let source = write_archive(&dir, "partial.zip", &[(
    "UKDA-0000-tab/tab/adult.tab",
    "SERNUM\tBENUNIT\tPERSON\tAGE80\n1\t1\t1\t40\n",
  )]);
  let mut rng = rng(8);
  catalog.generate("raw_frs", 2019, Some(&source), &mut rng).unwrap();

  let err = catalog.generate("base_frs", 2019, None, &mut rng).unwrap_err();
  assert!(
    matches!(err, Error::MissingDependency { ref dependency, .. } if dependency == "table child"),
    "{err:?}"
  );
  assert!(!catalog.exists("base_frs", 2019).unwrap());
}

#[test]
fn archives_without_a_tab_folder_are_format_errors() {
  let dir = TempDir::new().unwrap();
  let catalog = catalog(&dir);
  let source = write_archive(&dir, "bad.zip", &[("data/adult.csv", "A\n1\n")]);
  let err = catalog
    .generate("raw_frs", 2019, Some(&source), &mut rng(9))
    .unwrap_err();
  assert!(
    matches!(err, Error::Format { ref dataset, year: 2019, stage: Stage::Raw, .. } if dataset == "raw_frs"),
    "{err:?}"
  );
  assert!(catalog.years("raw_frs").unwrap().is_empty());
}

#[test]
fn remove_without_a_year_removes_every_year() {
  let dir = TempDir::new().unwrap();
  let catalog = catalog(&dir);
  let source = frs_archive(&dir);
  let mut rng = rng(10);
  assert_eq!(catalog.progress("raw_frs", 2019).unwrap(), Progress::Absent);
  catalog.generate("raw_frs", 2019, Some(&source), &mut rng).unwrap();
  catalog.generate("raw_frs", 2020, Some(&source), &mut rng).unwrap();
  assert_eq!(catalog.years("raw_frs").unwrap().len(), 2);
  assert_eq!(catalog.progress("raw_frs", 2019).unwrap(), Progress::At(Stage::Raw));

  assert_eq!(catalog.remove("raw_frs", None).unwrap(), 2);
  assert!(catalog.years("raw_frs").unwrap().is_empty());
  assert_eq!(catalog.progress("raw_frs", 2020).unwrap(), Progress::Absent);
}

// ─── SPI and imputation ──────────────────────────────────────────────────────

#[test]
fn spi_weights_reach_the_population() {
  let dir = TempDir::new().unwrap();
  let catalog = catalog(&dir);
  let source = spi_archive(&dir);
  let mut rng = rng(11);
  catalog.generate("raw_spi", 2019, Some(&source), &mut rng).unwrap();
  let base = arrays(catalog.load("base_spi", 2019, &mut rng).unwrap());

  let weights = floats(&base, "P_FACT", 2019);
  assert_eq!(weights.len(), 9);
  assert!((weights.iter().sum::<f64>() - 66e6).abs() < 1e-3);
  assert_eq!(floats(&base, "H_FACT", 2019), weights);
  assert_eq!(
    base.values("P_person_id", 2019).unwrap(),
    &Column::Int((0..9).collect())
  );
}

#[test]
fn dividends_are_imputed_from_the_spi() {
  let dir = TempDir::new().unwrap();
  let catalog = catalog(&dir);
  let frs_source = frs_archive(&dir);
  let spi_source = spi_archive(&dir);
  let mut rng = rng(12);
  catalog.generate("raw_frs", 2019, Some(&frs_source), &mut rng).unwrap();
  catalog.generate("raw_spi", 2019, Some(&spi_source), &mut rng).unwrap();

  let adjusted = arrays(catalog.load("frs_spi_adj", 2019, &mut rng).unwrap());
  let dividends = floats(&adjusted, "dividend_income", 2019);
  // Only the one person reporting dividends is imputed.
  assert_eq!(dividends[0], 0.0);
  assert_eq!(dividends[1], 0.0);
  assert_eq!(dividends[3], 0.0);

  let Calibration::DonorQuantile(q) = catalog.settings().imputation.calibration else {
    panic!("default calibration is a donor quantile");
  };
  let spi = arrays(catalog.load("spi", 2019, &mut rng).unwrap());
  let donor: Vec<(f64, f64)> = floats(&spi, "dividend_income", 2019)
    .into_iter()
    .zip(floats(&spi, "person_weight", 2019))
    .filter(|(d, _)| *d != 0.0)
    .collect();
  let (values, weights): (Vec<f64>, Vec<f64>) = donor.into_iter().unzip();
  let expected = weighted_quantile(&values, &weights, q).unwrap();
  assert!((dividends[2] - expected).abs() / expected < 1e-3);

  // Everything else is the FRS unchanged.
  assert_eq!(
    floats(&adjusted, "employment_income", 2019),
    vec![5200.0, 10400.0, 15600.0, 20800.0]
  );
}

#[test]
fn synthetic_frs_keeps_identifiers() {
  let dir = TempDir::new().unwrap();
  let catalog = catalog(&dir);
  let source = frs_archive(&dir);
  let mut rng = rng(13);
  catalog.generate("raw_frs", 2019, Some(&source), &mut rng).unwrap();

  let synth = arrays(catalog.load("synth_frs", 2019, &mut rng).unwrap());
  assert_eq!(synth.periods().len(), 1);
  assert_eq!(
    synth.values("person_id", 2019).unwrap(),
    &Column::Int(vec![101, 102, 201, 202])
  );
  let mut income = floats(&synth, "employment_income", 2019);
  income.sort_by(f64::total_cmp);
  assert_eq!(income, vec![5200.0, 10400.0, 15600.0, 20800.0]);
}

// ─── CPS and ACS ─────────────────────────────────────────────────────────────

#[test]
fn cps_is_downloaded_and_split_into_units() {
  let dir = TempDir::new().unwrap();
  let fetcher = StaticFetcher { body: cps_zip(), ..Default::default() };
  let urls = Rc::clone(&fetcher.urls);
  let catalog = catalog_with(&dir, fetcher);
  let mut rng = rng(14);

  let cps = arrays(catalog.load("cps", 2020, &mut rng).unwrap());
  assert_eq!(*urls.borrow(), vec![catalog.settings().cps_url(2020)]);
  assert!(catalog.exists("raw_cps", 2020).unwrap());
  assert!(catalog.exists("base_cps", 2020).unwrap());

  assert_eq!(cps.values("person_id", 2020).unwrap(), &Column::Int(vec![101, 102, 201]));
  assert_eq!(
    cps.values("person_family_id", 2020).unwrap(),
    &Column::Int(vec![101, 101, 201])
  );
  assert_eq!(cps.values("family_id", 2020).unwrap(), &Column::Int(vec![101, 201]));
  assert_eq!(cps.values("tax_unit_id", 2020).unwrap(), &Column::Int(vec![101, 201]));
  assert_eq!(floats(&cps, "tax_unit_weight", 2020), vec![300.0, 400.0]);
  assert_eq!(floats(&cps, "spm_unit_weight", 2020), vec![300.0, 400.0]);
  assert_eq!(floats(&cps, "interest_income", 2020), vec![10.0, 0.0, 5.0]);
  assert_eq!(floats(&cps, "person_weight", 2020), vec![150.5, 150.5, 200.0]);

  let raw = catalog.load("raw_cps", 2020, &mut rng).unwrap().into_tables().unwrap();
  assert_eq!(
    raw.metadata.get("source").map(String::as_str),
    Some(catalog.settings().cps_url(2020).as_str())
  );
}

#[test]
fn failed_downloads_report_url_and_status() {
  let dir = TempDir::new().unwrap();
  let fetcher = StaticFetcher { status: Some(404), ..Default::default() };
  let catalog = catalog_with(&dir, fetcher);

  let err = catalog.load("raw_cps", 2020, &mut rng(15)).unwrap_err();
  assert!(
    matches!(err.root(), Error::Download { url, status: 404 } if url.contains("asecpub20csv")),
    "{err:?}"
  );
  assert!(matches!(err, Error::Generation { stage: Stage::Raw, .. }));
  assert!(!catalog.exists("raw_cps", 2020).unwrap());
}

const ACS_CSV: &str = "SERIALNO,SPORDER,SPM_ID,WT,SPM_WEIGHT,SPM_RESOURCES,SPM_POVTHRESHOLD,ST,PUMA\n\
     1001,1,5,12000,12000,40000,25000,6,100\n\
     1001,2,5,11000,12000,40000,25000,6,100\n\
     1002,1,6,9000,9000,15000,20000,36,200\n";

#[test]
fn acs_units_and_weights() {
  let dir = TempDir::new().unwrap();
  let catalog = catalog(&dir);
  let source = write_archive(&dir, "acs_2019.zip", &[("spm_pu_2019.csv", ACS_CSV)]);
  let mut rng = rng(16);
  catalog.generate("raw_acs", 2019, Some(&source), &mut rng).unwrap();

  let acs = arrays(catalog.load("acs", 2019, &mut rng).unwrap());
  assert_eq!(
    acs.values("person_id", 2019).unwrap(),
    &Column::Int(vec![100101, 100102, 100201])
  );
  assert_eq!(floats(&acs, "person_weight", 2019), vec![120.0, 110.0, 90.0]);
  assert_eq!(acs.values("spm_unit_id", 2019).unwrap(), &Column::Int(vec![5, 6]));
  assert_eq!(floats(&acs, "spm_unit_weight", 2019), vec![120.0, 90.0]);
  assert_eq!(floats(&acs, "SPM_unit_net_income", 2019), vec![40000.0, 15000.0]);
  assert_eq!(floats(&acs, "poverty_threshold", 2019), vec![25000.0, 20000.0]);
  assert_eq!(acs.values("household_id", 2019).unwrap(), &Column::Int(vec![1001, 1002]));
}

#[test]
fn acs_is_downloaded_without_a_source() {
  let dir = TempDir::new().unwrap();
  let fetcher = StaticFetcher {
    body: zip_bytes(&[("spm_pu_2019.csv", ACS_CSV)]),
    ..Default::default()
  };
  let urls = Rc::clone(&fetcher.urls);
  let catalog = catalog_with(&dir, fetcher);
  let mut rng = rng(17);

  let acs = arrays(catalog.load("acs", 2019, &mut rng).unwrap());
  assert_eq!(*urls.borrow(), vec![catalog.settings().acs_url(2019)]);
  assert!(urls.borrow()[0].contains("spm_pu_2019"));
  assert_eq!(floats(&acs, "spm_unit_weight", 2019), vec![120.0, 90.0]);

  let raw = catalog.load("raw_acs", 2019, &mut rng).unwrap().into_tables().unwrap();
  assert_eq!(
    raw.metadata.get("source").map(String::as_str),
    Some(catalog.settings().acs_url(2019).as_str())
  );
  assert_eq!(urls.borrow().len(), 1);
}
