//! Domain records owned by a coach: athletes, goals, session logs and assistants.
//!
//! Records are plain data. Timestamps are maintained by the store; creation
//! inputs carry only caller-supplied fields and validate themselves before
//! anything is written.

use crate::error::ApiError;
use crate::types::{CallerId, EntityId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Athlete {
    pub id: EntityId,
    pub owner: CallerId,
    pub name: String,
    pub sport: Option<String>,
    pub level: Option<String>,
    pub notes: Option<String>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    pub deleted_at_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Active,
    Achieved,
    Abandoned,
}

impl GoalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GoalStatus::Active => "active",
            GoalStatus::Achieved => "achieved",
            GoalStatus::Abandoned => "abandoned",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: EntityId,
    pub owner: CallerId,
    pub athlete_id: EntityId,
    pub title: String,
    pub description: Option<String>,
    /// ISO date (YYYY-MM-DD)
    pub target_date: Option<String>,
    pub status: GoalStatus,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    pub deleted_at_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLog {
    pub id: EntityId,
    pub owner: CallerId,
    pub athlete_id: EntityId,
    /// ISO date (YYYY-MM-DD)
    pub performed_on: String,
    pub duration_minutes: Option<u32>,
    /// Rate of perceived exertion, 1 to 10
    pub perceived_effort: Option<u8>,
    pub notes: Option<String>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    pub deleted_at_ms: Option<u64>,
}

/// A coaching persona whose instructions are folded into prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assistant {
    pub id: EntityId,
    pub owner: CallerId,
    pub name: String,
    pub instructions: String,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    pub deleted_at_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAthlete {
    pub name: String,
    pub sport: Option<String>,
    pub level: Option<String>,
    pub notes: Option<String>,
}

impl NewAthlete {
    pub fn validate(&self) -> Result<(), ApiError> {
        require_text("athlete name", &self.name)
    }

    pub fn into_record(self, owner: CallerId) -> Athlete {
        Athlete {
            id: EntityId::generate(),
            owner,
            name: self.name.trim().to_string(),
            sport: self.sport,
            level: self.level,
            notes: self.notes,
            created_at_ms: 0,
            updated_at_ms: 0,
            deleted_at_ms: None,
        }
    }
}

/// Partial update of an athlete; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AthleteUpdate {
    pub name: Option<String>,
    pub sport: Option<String>,
    pub level: Option<String>,
    pub notes: Option<String>,
}

impl AthleteUpdate {
    pub fn validate(&self) -> Result<(), ApiError> {
        match &self.name {
            Some(name) => require_text("athlete name", name),
            None => Ok(()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.sport.is_none() && self.level.is_none() && self.notes.is_none()
    }

    pub fn apply(self, athlete: &mut Athlete) {
        if let Some(name) = self.name {
            athlete.name = name.trim().to_string();
        }
        if self.sport.is_some() {
            athlete.sport = self.sport;
        }
        if self.level.is_some() {
            athlete.level = self.level;
        }
        if self.notes.is_some() {
            athlete.notes = self.notes;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGoal {
    pub athlete_id: EntityId,
    pub title: String,
    pub description: Option<String>,
    pub target_date: Option<String>,
}

impl NewGoal {
    pub fn validate(&self) -> Result<(), ApiError> {
        require_text("goal title", &self.title)?;
        if let Some(date) = &self.target_date {
            validate_iso_date("target_date", date)?;
        }
        Ok(())
    }

    pub fn into_record(self, owner: CallerId) -> Goal {
        Goal {
            id: EntityId::generate(),
            owner,
            athlete_id: self.athlete_id,
            title: self.title.trim().to_string(),
            description: self.description,
            target_date: self.target_date,
            status: GoalStatus::Active,
            created_at_ms: 0,
            updated_at_ms: 0,
            deleted_at_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSessionLog {
    pub athlete_id: EntityId,
    pub performed_on: String,
    pub duration_minutes: Option<u32>,
    pub perceived_effort: Option<u8>,
    pub notes: Option<String>,
}

impl NewSessionLog {
    pub fn validate(&self) -> Result<(), ApiError> {
        validate_iso_date("performed_on", &self.performed_on)?;
        if let Some(effort) = self.perceived_effort {
            if !(1..=10).contains(&effort) {
                return Err(ApiError::InvalidInput(format!(
                    "perceived_effort must be between 1 and 10, got {}",
                    effort
                )));
            }
        }
        Ok(())
    }

    pub fn into_record(self, owner: CallerId) -> SessionLog {
        SessionLog {
            id: EntityId::generate(),
            owner,
            athlete_id: self.athlete_id,
            performed_on: self.performed_on,
            duration_minutes: self.duration_minutes,
            perceived_effort: self.perceived_effort,
            notes: self.notes,
            created_at_ms: 0,
            updated_at_ms: 0,
            deleted_at_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAssistant {
    pub name: String,
    pub instructions: String,
}

impl NewAssistant {
    pub fn validate(&self) -> Result<(), ApiError> {
        require_text("assistant name", &self.name)?;
        require_text("assistant instructions", &self.instructions)
    }

    pub fn into_record(self, owner: CallerId) -> Assistant {
        Assistant {
            id: EntityId::generate(),
            owner,
            name: self.name.trim().to_string(),
            instructions: self.instructions,
            created_at_ms: 0,
            updated_at_ms: 0,
            deleted_at_ms: None,
        }
    }
}

fn require_text(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::InvalidInput(format!("{} cannot be empty", field)));
    }
    Ok(())
}

fn validate_iso_date(field: &str, value: &str) -> Result<(), ApiError> {
    chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| {
            ApiError::InvalidInput(format!("{} must be a YYYY-MM-DD date, got '{}'", field, value))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_athlete_requires_name() {
        let input = NewAthlete {
            name: "   ".to_string(),
            ..Default::default()
        };
        assert!(matches!(input.validate(), Err(ApiError::InvalidInput(_))));
    }

    #[test]
    fn test_session_log_effort_range() {
        let mut input = NewSessionLog {
            athlete_id: EntityId::new("a1"),
            performed_on: "2026-03-01".to_string(),
            duration_minutes: Some(45),
            perceived_effort: Some(11),
            notes: None,
        };
        assert!(input.validate().is_err());
        input.perceived_effort = Some(7);
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_athlete_update_leaves_unset_fields() {
        let mut athlete = NewAthlete {
            name: "Ada".to_string(),
            sport: Some("running".to_string()),
            ..Default::default()
        }
        .into_record(CallerId::new("coach-1"));
        let update = AthleteUpdate {
            level: Some("club".to_string()),
            ..Default::default()
        };
        assert!(update.validate().is_ok());
        update.apply(&mut athlete);
        assert_eq!(athlete.sport.as_deref(), Some("running"));
        assert_eq!(athlete.level.as_deref(), Some("club"));
        assert!(AthleteUpdate::default().is_empty());
    }

    #[test]
    fn test_goal_target_date_must_be_iso() {
        let goal = NewGoal {
            athlete_id: EntityId::new("a1"),
            title: "Sub-3 marathon".to_string(),
            description: None,
            target_date: Some("next spring".to_string()),
        };
        assert!(goal.validate().is_err());
    }

    #[test]
    fn test_into_record_trims_and_starts_active() {
        let goal = NewGoal {
            athlete_id: EntityId::new("a1"),
            title: "  Run 10k ".to_string(),
            description: None,
            target_date: Some("2026-09-01".to_string()),
        }
        .into_record(CallerId::new("coach-1"));
        assert_eq!(goal.title, "Run 10k");
        assert_eq!(goal.status, GoalStatus::Active);
        assert_eq!(goal.owner.as_str(), "coach-1");
    }
}
