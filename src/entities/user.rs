use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The `users` table. Role is stored as a plain string and parsed into
/// the closed `Role` enum at the service boundary.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub email: String,
    pub full_name: String,
    pub role: String,
    pub salesperson_code: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::user_location::Entity")]
    UserLocations,
}

impl Related<super::user_location::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserLocations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
