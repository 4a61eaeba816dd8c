use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A member profile as projected for search and profile maintenance.
/// `team_name` comes from the `teams` join and is not a column of `members`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Member {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub description: String,
    pub skills: Vec<String>,
    pub profile_picture_url: Option<String>,
    pub team_id: Option<Uuid>,
    pub team_name: Option<String>,
}

/// One row of `match_members`.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct MemberMatch {
    #[sqlx(flatten)]
    pub member: Member,
    pub match_score: f64,
    pub distance: f64,
}

impl Member {
    /// The searchable fields, in the order they are embedded and matched.
    pub fn searchable_fields(&self) -> [String; 4] {
        [
            self.name.clone(),
            self.role.clone(),
            self.description.clone(),
            self.skills.join(" "),
        ]
    }
}
