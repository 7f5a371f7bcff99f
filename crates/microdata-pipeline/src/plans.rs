//! Built-in projection plans, one per model-ready survey dataset. Each can
//! be replaced from settings.

use std::collections::BTreeMap;

use crate::project::{Encoding, ProjectionPlan, Source, VariableSpec, id};

const WEEKS: f64 = 52.0;

fn sum(name: &str, entity: &str, columns: &[&str]) -> VariableSpec {
  VariableSpec::new(
    name,
    entity,
    Source::SumOf(columns.iter().map(|c| (*c).to_owned()).collect()),
  )
}

fn column(name: &str, entity: &str, column: &str) -> VariableSpec {
  VariableSpec::new(name, entity, Source::Column(column.to_owned()))
}

fn role(column: &str) -> VariableSpec {
  VariableSpec::new("role", "person", Source::Column(column.to_owned()))
    .encoded(Encoding::FixedWidth)
}

/// Family Resources Survey. Amounts are weekly in the release.
pub fn frs_plan() -> ProjectionPlan {
  let accounts =
    |codes: &[u32]| -> Vec<String> { codes.iter().map(|c| format!("P_ACCINT_ACCOUNT_CODE_{c}")).collect() };
  ProjectionPlan {
    variables: vec![
      id("person_id", "person", "P_person_id"),
      id("person_benunit_id", "person", "P_benunit_id"),
      id("person_household_id", "person", "P_household_id"),
      role("P_role"),
      column("person_weight", "person", "P_GROSS4"),
      sum("age", "person", &["P_AGE80", "P_AGE"]),
      sum("employment_income", "person", &["P_GRWAGE"]).scaled(WEEKS).uprated("earnings"),
      sum("self_employment_income", "person", &["P_SEINCAM2"])
        .scaled(WEEKS)
        .uprated("earnings"),
      VariableSpec::new("savings_interest_income", "person", Source::SumOf(accounts(&[1, 3, 5])))
        .uprated("earnings"),
      VariableSpec::new("dividend_income", "person", Source::SumOf(accounts(&[6, 7, 8])))
        .uprated("earnings"),
      VariableSpec::new("benefits", "person", Source::Prefix("P_BENAMT_BENEFIT_CODE_".into()))
        .scaled(WEEKS)
        .uprated("prices"),
      sum("childcare_expenses", "person", &["P_CHAMT"]).scaled(WEEKS).uprated("prices"),
      id("benunit_id", "benunit", "B_benunit_id"),
      id("household_id", "household", "H_household_id"),
      column("household_weight", "household", "H_GROSS4"),
      id("region", "household", "H_GVTREGNO"),
      column("council_tax", "household", "H_CTANNUAL").uprated("council_tax"),
    ],
  }
}

/// Survey of Personal Incomes. Amounts are annual; age is banded.
pub fn spi_plan() -> ProjectionPlan {
  let bands = BTreeMap::from([
    ("1".to_owned(), 16.0),
    ("2".to_owned(), 25.0),
    ("3".to_owned(), 35.0),
    ("4".to_owned(), 45.0),
    ("5".to_owned(), 55.0),
    ("6".to_owned(), 65.0),
    ("7".to_owned(), 75.0),
  ]);
  ProjectionPlan {
    variables: vec![
      id("person_id", "person", "P_person_id"),
      id("person_benunit_id", "person", "P_benunit_id"),
      id("person_household_id", "person", "P_household_id"),
      role("P_role"),
      column("person_weight", "person", "P_FACT"),
      VariableSpec::new("age", "person", Source::Map {
        column:  "P_AGERANGE".into(),
        values:  bands,
        default: 0.0,
      }),
      sum("employment_income", "person", &["P_PAY", "P_EPB"]).uprated("earnings"),
      sum("self_employment_income", "person", &["P_PROFITS"]).uprated("earnings"),
      sum("savings_interest_income", "person", &["P_INCBBS"]).uprated("earnings"),
      sum("dividend_income", "person", &["P_DIVIDENDS"]).uprated("earnings"),
      sum("pension_income", "person", &["P_PENSION"]).uprated("earnings"),
      id("benunit_id", "benunit", "B_benunit_id"),
      id("household_id", "household", "H_household_id"),
      column("household_weight", "household", "H_FACT"),
    ],
  }
}

/// CPS ASEC.
pub fn cps_plan() -> ProjectionPlan {
  ProjectionPlan {
    variables: vec![
      id("person_id", "person", "person_id"),
      id("person_family_id", "person", "person_family_id"),
      id("person_household_id", "person", "person_household_id"),
      id("person_tax_unit_id", "person", "person_tax_unit_id"),
      id("person_spm_unit_id", "person", "person_spm_unit_id"),
      column("person_weight", "person", "person_weight"),
      sum("age", "person", &["P_A_AGE"]),
      column("interest_income", "person", "P_INT_VAL"),
      sum("employment_income", "person", &["P_WSAL_VAL"]),
      id("family_id", "family", "family_id"),
      column("family_weight", "family", "family_weight"),
      id("tax_unit_id", "tax_unit", "tax_unit_id"),
      column("tax_unit_weight", "tax_unit", "tax_unit_weight"),
      id("spm_unit_id", "spm_unit", "spm_unit_id"),
      column("spm_unit_weight", "spm_unit", "spm_unit_weight"),
      id("household_id", "household", "household_id"),
      column("household_weight", "household", "household_weight"),
    ],
  }
}

/// ACS SPM research file, read straight from the raw tables.
pub fn acs_plan() -> ProjectionPlan {
  ProjectionPlan {
    variables: vec![
      id("person_id", "person", "person_id"),
      id("person_spm_unit_id", "person", "P_SPM_ID"),
      id("person_household_id", "person", "P_SERIALNO"),
      column("person_weight", "person", "P_WT").scaled(0.01),
      id("spm_unit_id", "spm_unit", "S_SPM_ID"),
      column("spm_unit_weight", "spm_unit", "S_SPM_WEIGHT").scaled(0.01),
      column("SPM_unit_net_income", "spm_unit", "S_SPM_RESOURCES"),
      column("poverty_threshold", "spm_unit", "S_SPM_POVTHRESHOLD"),
      id("household_id", "household", "H_SERIALNO"),
    ],
  }
}

/// Built-in plan for a model-ready dataset, by name.
pub fn builtin(dataset: &str) -> Option<ProjectionPlan> {
  match dataset {
    "frs" => Some(frs_plan()),
    "spi" => Some(spi_plan()),
    "cps" => Some(cps_plan()),
    "acs" => Some(acs_plan()),
    _ => None,
  }
}
