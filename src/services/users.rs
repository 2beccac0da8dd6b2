use std::sync::Arc;

use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use tracing::{error, instrument, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::user::{self, Entity as UserEntity};
use crate::entities::user_location::{self, Entity as UserLocationEntity};
use crate::errors::ServiceError;

/// The closed set of roles the service understands. Capabilities hang
/// off the enum, so role checks never compare raw strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Role {
    Admin,
    Sales,
}

impl Role {
    pub fn can_view_all_orders(&self) -> bool {
        match self {
            Role::Admin => true,
            Role::Sales => false,
        }
    }
}

/// Local user directory: the identity collaborator. Auth flows live
/// elsewhere; this service only resolves an already-identified user id
/// to its record, role and location assignments.
#[derive(Clone)]
pub struct UserDirectoryService {
    db_pool: Arc<DbPool>,
}

impl UserDirectoryService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Resolves an active user; missing and deactivated users are both
    /// reported as not found.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_user(&self, user_id: Uuid) -> Result<user::Model, ServiceError> {
        let db = &*self.db_pool;

        let found = UserEntity::find_by_id(user_id).one(db).await.map_err(|e| {
            error!(error = %e, user_id = %user_id, "Failed to fetch user");
            ServiceError::DatabaseError(e)
        })?;

        match found {
            Some(user) if user.active => Ok(user),
            Some(_) => {
                warn!(user_id = %user_id, "User is deactivated");
                Err(ServiceError::NotFound(format!("User {} not found", user_id)))
            }
            None => Err(ServiceError::NotFound(format!("User {} not found", user_id))),
        }
    }

    /// Parses the stored role string into the closed enum. An unknown
    /// role is a validation error, never a silent default.
    pub fn role(&self, user: &user::Model) -> Result<Role, ServiceError> {
        user.role.parse::<Role>().map_err(|_| {
            warn!(user_id = %user.id, role = %user.role, "User carries an unknown role");
            ServiceError::ValidationError(format!(
                "Unknown role '{}' for user {}",
                user.role, user.id
            ))
        })
    }

    /// The locations a user may order from. An empty list means the
    /// user is unrestricted.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn location_codes(&self, user_id: Uuid) -> Result<Vec<String>, ServiceError> {
        let db = &*self.db_pool;

        let rows = UserLocationEntity::find()
            .filter(user_location::Column::UserId.eq(user_id))
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, user_id = %user_id, "Failed to fetch user locations");
                ServiceError::DatabaseError(e)
            })?;

        Ok(rows.into_iter().map(|row| row.location_code).collect())
    }
}
