// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User account model and the payloads that act on it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Textual birth date format accepted and produced by the API (`DD-MM-YYYY`).
pub const BIRTH_DATE_FORMAT: &str = "%d-%m-%Y";

/// Presence flag of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum UserStatus {
    Online,
    Offline,
}

/// Stored user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Repository-assigned id (None until first save)
    pub id: Option<u64>,
    /// Unique handle, editable
    pub username: String,
    /// Display name, doubles as the login credential
    pub name: String,
    /// Session token issued at registration
    pub token: String,
    pub status: UserStatus,
    /// Calendar date of registration (UTC)
    pub creation_date: NaiveDate,
    pub birth_date: Option<NaiveDate>,
}

/// Registration candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub name: String,
}

/// Login credentials: the username selects the account, the name proves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub name: String,
}

/// Partial profile update. Absent members leave the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Validate)]
pub struct UserChanges {
    /// An empty string means "no change", so only the upper bound applies
    #[serde(default)]
    #[validate(length(max = 64))]
    pub username: Option<String>,
    /// Birth date in `DD-MM-YYYY` form
    #[serde(default, alias = "birthDate")]
    pub birth_date: Option<String>,
}

impl UserChanges {
    /// The requested username, treating an empty string as "no change".
    pub fn requested_username(&self) -> Option<&str> {
        self.username.as_deref().filter(|u| !u.is_empty())
    }
}

/// Errors from birth date parsing.
#[derive(Debug, thiserror::Error)]
pub enum BirthDateError {
    #[error("expected exactly DD-MM-YYYY")]
    Shape,

    #[error("not a calendar date: {0}")]
    Calendar(#[from] chrono::ParseError),
}

/// Parse a `DD-MM-YYYY` birth date, rejecting impossible calendar dates.
///
/// chrono's numeric fields accept short or signed runs, so the fixed
/// 2-2-4 digit layout is checked before parsing.
pub fn parse_birth_date(raw: &str) -> Result<NaiveDate, BirthDateError> {
    let bytes = raw.as_bytes();
    let well_formed = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            2 | 5 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !well_formed {
        return Err(BirthDateError::Shape);
    }

    Ok(NaiveDate::parse_from_str(raw, BIRTH_DATE_FORMAT)?)
}

/// Format a birth date the way the API accepts it.
pub fn format_birth_date(date: NaiveDate) -> String {
    date.format(BIRTH_DATE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_birth_date_valid() {
        let date = parse_birth_date("24-12-1999").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(1999, 12, 24).unwrap());
        assert_eq!(format_birth_date(date), "24-12-1999");
    }

    #[test]
    fn test_parse_birth_date_rejects_impossible_dates() {
        assert!(parse_birth_date("31-02-1999").is_err());
        assert!(parse_birth_date("29-02-2023").is_err());
        assert!(parse_birth_date("29-02-2024").is_ok());
    }

    #[test]
    fn test_parse_birth_date_rejects_other_formats() {
        assert!(parse_birth_date("1999-12-24").is_err());
        assert!(parse_birth_date("12/24/1999").is_err());
        assert!(parse_birth_date("").is_err());
        assert!(parse_birth_date("yesterday").is_err());
        assert!(parse_birth_date("1-2-1999").is_err());
        assert!(parse_birth_date("01-02-99").is_err());
        assert!(parse_birth_date(" 01-02-1999").is_err());
        assert!(parse_birth_date("01-02-1999 ").is_err());
        assert!(parse_birth_date("01-02-+999").is_err());
        assert!(parse_birth_date("01-02-19999").is_err());
    }

    #[test]
    fn test_requested_username_ignores_empty() {
        let changes = UserChanges {
            username: Some(String::new()),
            birth_date: None,
        };
        assert_eq!(changes.requested_username(), None);

        let changes = UserChanges {
            username: Some("bob".to_string()),
            birth_date: None,
        };
        assert_eq!(changes.requested_username(), Some("bob"));
    }

    #[test]
    fn test_changes_username_length_limit() {
        let changes = UserChanges {
            username: Some("a".repeat(65)),
            birth_date: None,
        };
        assert!(changes.validate().is_err());

        let changes = UserChanges {
            username: Some("a".repeat(64)),
            birth_date: None,
        };
        assert!(changes.validate().is_ok());
        assert!(UserChanges::default().validate().is_ok());
    }

    #[test]
    fn test_status_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&UserStatus::Online).unwrap(),
            "\"ONLINE\""
        );
        assert_eq!(
            serde_json::from_str::<UserStatus>("\"OFFLINE\"").unwrap(),
            UserStatus::Offline
        );
    }
}
