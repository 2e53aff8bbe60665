use serde::{Deserialize, Serialize};

use crate::choice::{AcademicLevel, HowHeard, IasCourse, UserType};

/// A validated submission, ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRegistration {
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub university_id: Option<String>,
    pub phone: String,
    pub email: Option<String>,
    pub user_type: UserType,
    pub academic_level: AcademicLevel,
    pub how_heard: HowHeard,
    pub ias_course: Option<IasCourse>,
}

/// A persisted registration row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub id: i64,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub university_id: Option<String>,
    pub phone: String,
    pub email: Option<String>,
    pub user_type: UserType,
    pub academic_level: AcademicLevel,
    pub how_heard: HowHeard,
    pub ias_course: Option<IasCourse>,
}

impl Registration {
    pub fn from_new(id: i64, new: NewRegistration) -> Self {
        Self {
            id,
            first_name: new.first_name,
            middle_name: new.middle_name,
            last_name: new.last_name,
            university_id: new.university_id,
            phone: new.phone,
            email: new.email,
            user_type: new.user_type,
            academic_level: new.academic_level,
            how_heard: new.how_heard,
            ias_course: new.ias_course,
        }
    }
}
