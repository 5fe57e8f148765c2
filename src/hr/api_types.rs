//! Serde-deserializable types matching HR API responses.
//!
//! The API encodes empty values loosely: a missing many-to-one is `false`
//! instead of `null`, and empty text fields come back as `false` as well.
//! These types absorb that looseness so domain types don't have to.

use serde::{Deserialize, Deserializer, Serialize};

use super::types::{Employee, EmployeeSummary, Page, PersonalDetails, Relation};

// ============================================================================
// Loose field shapes
// ============================================================================

/// A many-to-one reference as sent by the API: `[id, "label"]`, `false` or `null`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRelation {
  Pair(u64, String),
  Flag(bool),
}

fn deserialize_relation<'de, D>(deserializer: D) -> Result<Relation, D::Error>
where
  D: Deserializer<'de>,
{
  match Option::<RawRelation>::deserialize(deserializer)? {
    Some(RawRelation::Pair(id, label)) => Ok(Relation::Present { id, label }),
    Some(RawRelation::Flag(false)) | None => Ok(Relation::Absent),
    Some(RawRelation::Flag(true)) => Err(serde::de::Error::custom(
      "expected [id, label], false or null for relation, got true",
    )),
  }
}

/// A text field that may be a string, a number, `false` or `null`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawText {
  Text(String),
  Number(serde_json::Number),
  Flag(bool),
}

fn deserialize_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  match Option::<RawText>::deserialize(deserializer)? {
    Some(RawText::Text(s)) => Ok(Some(s)),
    Some(RawText::Number(n)) => Ok(Some(n.to_string())),
    Some(RawText::Flag(false)) | None => Ok(None),
    Some(RawText::Flag(true)) => Err(serde::de::Error::custom(
      "expected text, number, false or null, got true",
    )),
  }
}

// ============================================================================
// Auth endpoint
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiLoginRequest<'a> {
  pub login: &'a str,
  pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ApiLoginResponse {
  pub token: String,
  pub uid: u64,
  pub employee_id: u64,
  #[serde(default)]
  pub is_manager: bool,
  #[serde(default)]
  pub is_internal: bool,
}

// ============================================================================
// Employee endpoints
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiEmployee {
  pub id: u64,
  #[serde(default)]
  pub name: String,
  #[serde(default, deserialize_with = "deserialize_text")]
  pub job_title: Option<String>,
  #[serde(default, deserialize_with = "deserialize_text")]
  pub work_email: Option<String>,
  #[serde(rename = "department_id", default, deserialize_with = "deserialize_relation")]
  pub department: Relation,
  #[serde(rename = "parent_id", default, deserialize_with = "deserialize_relation")]
  pub parent: Relation,
  #[serde(default)]
  pub child_ids: Vec<u64>,
  #[serde(default, deserialize_with = "deserialize_text")]
  pub image_url: Option<String>,
  #[serde(default, deserialize_with = "deserialize_text")]
  pub private_email: Option<String>,
  #[serde(default, deserialize_with = "deserialize_text")]
  pub private_phone: Option<String>,
  #[serde(default, deserialize_with = "deserialize_text")]
  pub marital: Option<String>,
  #[serde(default, deserialize_with = "deserialize_text")]
  pub children: Option<String>,
  #[serde(default, deserialize_with = "deserialize_text")]
  pub emergency_contact: Option<String>,
  #[serde(default, deserialize_with = "deserialize_text")]
  pub emergency_phone: Option<String>,
  #[serde(default, deserialize_with = "deserialize_text")]
  pub certificate: Option<String>,
  #[serde(default, deserialize_with = "deserialize_text")]
  pub study_field: Option<String>,
  #[serde(default, deserialize_with = "deserialize_text")]
  pub study_school: Option<String>,
  #[serde(default, deserialize_with = "deserialize_text")]
  pub write_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiEmployeeRow {
  pub id: u64,
  #[serde(default)]
  pub name: String,
  #[serde(default, deserialize_with = "deserialize_text")]
  pub job_title: Option<String>,
  #[serde(rename = "department_id", default, deserialize_with = "deserialize_relation")]
  pub department: Relation,
}

#[derive(Debug, Deserialize)]
pub struct ApiEmployeePage {
  #[serde(default)]
  pub items: Vec<ApiEmployeeRow>,
  #[serde(default)]
  pub total: u64,
}

// ============================================================================
// Conversions to domain types
// ============================================================================

impl From<ApiEmployee> for Employee {
  fn from(e: ApiEmployee) -> Self {
    Employee {
      id: e.id,
      name: e.name,
      job_title: e.job_title,
      work_email: e.work_email,
      department: e.department,
      parent: e.parent,
      child_ids: e.child_ids,
      image_url: e.image_url,
      details: PersonalDetails {
        private_email: e.private_email,
        private_phone: e.private_phone,
        marital: e.marital,
        children: e.children,
        emergency_contact: e.emergency_contact,
        emergency_phone: e.emergency_phone,
        certificate: e.certificate,
        study_field: e.study_field,
        study_school: e.study_school,
      },
      write_date: e.write_date,
    }
  }
}

impl From<ApiEmployeeRow> for EmployeeSummary {
  fn from(row: ApiEmployeeRow) -> Self {
    EmployeeSummary {
      id: row.id,
      name: row.name,
      job_title: row.job_title,
      department: row.department,
    }
  }
}

impl From<ApiEmployeePage> for Page<EmployeeSummary> {
  fn from(page: ApiEmployeePage) -> Self {
    Page {
      items: page.items.into_iter().map(EmployeeSummary::from).collect(),
      total: page.total,
    }
  }
}
