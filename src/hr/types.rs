use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to another record, e.g. an employee's department or manager.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Relation {
  Present {
    id: u64,
    label: String,
  },
  #[default]
  Absent,
}

impl Relation {
  pub fn id(&self) -> Option<u64> {
    match self {
      Relation::Present { id, .. } => Some(*id),
      Relation::Absent => None,
    }
  }

  pub fn label(&self) -> Option<&str> {
    match self {
      Relation::Present { label, .. } => Some(label),
      Relation::Absent => None,
    }
  }
}

/// Profile fields an employee may edit through the self-service flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
  PrivateEmail,
  PrivatePhone,
  Marital,
  Children,
  EmergencyContact,
  EmergencyPhone,
  Certificate,
  StudyField,
  StudySchool,
}

impl ProfileField {
  pub const ALL: [ProfileField; 9] = [
    ProfileField::PrivateEmail,
    ProfileField::PrivatePhone,
    ProfileField::Marital,
    ProfileField::Children,
    ProfileField::EmergencyContact,
    ProfileField::EmergencyPhone,
    ProfileField::Certificate,
    ProfileField::StudyField,
    ProfileField::StudySchool,
  ];

  /// Wire name, as used in API payloads and storage.
  pub fn as_str(&self) -> &'static str {
    match self {
      ProfileField::PrivateEmail => "private_email",
      ProfileField::PrivatePhone => "private_phone",
      ProfileField::Marital => "marital",
      ProfileField::Children => "children",
      ProfileField::EmergencyContact => "emergency_contact",
      ProfileField::EmergencyPhone => "emergency_phone",
      ProfileField::Certificate => "certificate",
      ProfileField::StudyField => "study_field",
      ProfileField::StudySchool => "study_school",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|f| f.as_str() == s)
  }
}

impl fmt::Display for ProfileField {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Editable personal details of an employee
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalDetails {
  pub private_email: Option<String>,
  pub private_phone: Option<String>,
  pub marital: Option<String>,
  pub children: Option<String>,
  pub emergency_contact: Option<String>,
  pub emergency_phone: Option<String>,
  pub certificate: Option<String>,
  pub study_field: Option<String>,
  pub study_school: Option<String>,
}

impl PersonalDetails {
  pub fn get(&self, field: ProfileField) -> Option<&str> {
    self.slot(field).as_deref()
  }

  pub fn set(&mut self, field: ProfileField, value: Option<String>) {
    *self.slot_mut(field) = value;
  }

  fn slot(&self, field: ProfileField) -> &Option<String> {
    match field {
      ProfileField::PrivateEmail => &self.private_email,
      ProfileField::PrivatePhone => &self.private_phone,
      ProfileField::Marital => &self.marital,
      ProfileField::Children => &self.children,
      ProfileField::EmergencyContact => &self.emergency_contact,
      ProfileField::EmergencyPhone => &self.emergency_phone,
      ProfileField::Certificate => &self.certificate,
      ProfileField::StudyField => &self.study_field,
      ProfileField::StudySchool => &self.study_school,
    }
  }

  fn slot_mut(&mut self, field: ProfileField) -> &mut Option<String> {
    match field {
      ProfileField::PrivateEmail => &mut self.private_email,
      ProfileField::PrivatePhone => &mut self.private_phone,
      ProfileField::Marital => &mut self.marital,
      ProfileField::Children => &mut self.children,
      ProfileField::EmergencyContact => &mut self.emergency_contact,
      ProfileField::EmergencyPhone => &mut self.emergency_phone,
      ProfileField::Certificate => &mut self.certificate,
      ProfileField::StudyField => &mut self.study_field,
      ProfileField::StudySchool => &mut self.study_school,
    }
  }
}

/// Full employee record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
  pub id: u64,
  pub name: String,
  pub job_title: Option<String>,
  pub work_email: Option<String>,
  pub department: Relation,
  pub parent: Relation, // manager
  pub child_ids: Vec<u64>,
  pub image_url: Option<String>,
  pub details: PersonalDetails,
  pub write_date: Option<String>,
}

/// Employee row in list views
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeSummary {
  pub id: u64,
  pub name: String,
  pub job_title: Option<String>,
  pub department: Relation,
}

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
  pub items: Vec<T>,
  pub total: u64,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_profile_field_parse_matches_wire_names() {
    for field in ProfileField::ALL {
      assert_eq!(ProfileField::parse(field.as_str()), Some(field));
      let json = serde_json::to_string(&field).unwrap();
      assert_eq!(json, format!("\"{}\"", field.as_str()));
    }
    assert_eq!(ProfileField::parse("salary"), None);
  }

  #[test]
  fn test_personal_details_get_set() {
    let mut details = PersonalDetails::default();
    assert_eq!(details.get(ProfileField::Marital), None);

    details.set(ProfileField::Marital, Some("single".into()));
    assert_eq!(details.get(ProfileField::Marital), Some("single"));
    assert_eq!(details.marital.as_deref(), Some("single"));
    assert_eq!(details.get(ProfileField::Children), None);
  }

  #[test]
  fn test_relation_accessors() {
    let dept = Relation::Present {
      id: 3,
      label: "Engineering".into(),
    };
    assert_eq!(dept.id(), Some(3));
    assert_eq!(dept.label(), Some("Engineering"));
    assert_eq!(Relation::Absent.id(), None);
    assert_eq!(Relation::default(), Relation::Absent);
  }
}
