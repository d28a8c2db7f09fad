use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Report progress as shown on the student dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UserStatus {
    #[default]
    Pending,
    Analyzing,
    #[serde(rename = "Report Generated")]
    ReportGenerated,
    Error,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Pending => "Pending",
            UserStatus::Analyzing => "Analyzing",
            UserStatus::ReportGenerated => "Report Generated",
            UserStatus::Error => "Error",
        }
    }

    /// Unknown or missing values read as `Pending`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("Analyzing") => UserStatus::Analyzing,
            Some("Report Generated") => UserStatus::ReportGenerated,
            Some("Error") => UserStatus::Error,
            _ => UserStatus::Pending,
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserRow {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub age: Option<String>,
    pub standard: Option<String>,
    pub interests: Option<String>,
    pub status: Option<String>,
    pub report_path: Option<String>,
    pub report_uploaded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    pub fn status(&self) -> UserStatus {
        UserStatus::parse(self.status.as_deref())
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
