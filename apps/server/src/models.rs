use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPublic {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<User> for UserPublic {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            created_at: user.created_at,
        }
    }
}

/// Populated user reference. Relation columns always hold a plain UUID; this
/// shape only ever comes out of an explicit join or lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserRef {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// Populated skill reference (title/description summary).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillRef {
    pub id: Uuid,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "skill_category", rename_all = "PascalCase")]
pub enum SkillCategory {
    Frontend,
    #[serde(rename = "UI/UX Design")]
    #[sqlx(rename = "UI/UX Design")]
    UiUxDesign,
    #[serde(rename = "AI/ML")]
    #[sqlx(rename = "AI/ML")]
    AiMl,
    Backend,
    Cybersecurity,
    Java,
    #[serde(rename = "DSA")]
    #[sqlx(rename = "DSA")]
    Dsa,
    Other,
}

impl FromStr for SkillCategory {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Frontend" => Ok(Self::Frontend),
            "UI/UX Design" => Ok(Self::UiUxDesign),
            "AI/ML" => Ok(Self::AiMl),
            "Backend" => Ok(Self::Backend),
            "Cybersecurity" => Ok(Self::Cybersecurity),
            "Java" => Ok(Self::Java),
            "DSA" => Ok(Self::Dsa),
            "Other" => Ok(Self::Other),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "skill_level", rename_all = "PascalCase")]
pub enum SkillLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl FromStr for SkillLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Beginner" => Ok(Self::Beginner),
            "Intermediate" => Ok(Self::Intermediate),
            "Advanced" => Ok(Self::Advanced),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "request_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl FromStr for RequestStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Skill {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: SkillCategory,
    pub level: SkillLevel,
    pub rating: Option<f64>,
    pub user_id: Uuid,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExchangeRequest {
    pub id: Uuid,
    pub from_id: Uuid,
    pub to_id: Uuid,
    pub skill_id: Uuid,
    pub message: Option<String>,
    pub status: RequestStatus,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_labels_round_trip_through_from_str() {
        for label in [
            "Frontend",
            "UI/UX Design",
            "AI/ML",
            "Backend",
            "Cybersecurity",
            "Java",
            "DSA",
            "Other",
        ] {
            let category: SkillCategory = label.parse().expect(label);
            assert_eq!(
                serde_json::to_value(category).unwrap(),
                serde_json::Value::String(label.to_string())
            );
        }
        assert!("frontend".parse::<SkillCategory>().is_err());
        assert!("Cooking".parse::<SkillCategory>().is_err());
    }

    #[test]
    fn request_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(RequestStatus::Accepted).unwrap(),
            serde_json::Value::String("accepted".to_string())
        );
        assert!("Accepted".parse::<RequestStatus>().is_err());
        assert_eq!("rejected".parse::<RequestStatus>(), Ok(RequestStatus::Rejected));
    }

    #[test]
    fn skill_level_defaults_to_beginner() {
        assert_eq!(SkillLevel::default(), SkillLevel::Beginner);
    }
}
