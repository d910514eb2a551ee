//! Authentication and user lookup service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::{
        component::ComponentFilter,
        user::{NotificationPreferences, UpdatePreferences, User, UserClaims},
        Actor, Role,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    config: AuthConfig,
}

impl UsersService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Authenticate by username and password, returning a JWT and the user
    pub async fn authenticate(&self, username: &str, password: &str) -> AppResult<(String, User)> {
        let user = self
            .repository
            .users
            .get_by_username(username)
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid credentials".to_string()))?;

        if !verify_password(&user.password_hash, password)? {
            return Err(AppError::Authentication("Invalid credentials".to_string()));
        }

        let token = self.create_token(&user)?;
        tracing::info!(user = %user.username, "User logged in");
        Ok((token, user))
    }

    fn create_token(&self, user: &User) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let exp = now + (self.config.jwt_expiration_hours as i64 * 3600);

        let claims = UserClaims {
            sub: user.username.clone(),
            user_id: user.id,
            name: user.name.clone(),
            role: user.role,
            exp,
            iat: now,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: Uuid) -> AppResult<User> {
        self.repository
            .users
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    pub async fn list(&self) -> AppResult<Vec<User>> {
        self.repository.users.list().await
    }

    /// Change notification opt-ins. Own account, or any account for admins.
    pub async fn update_preferences(
        &self,
        id: Uuid,
        actor: Actor,
        data: UpdatePreferences,
    ) -> AppResult<NotificationPreferences> {
        if actor.id != id && !actor.is_admin() {
            return Err(AppError::Forbidden("Access denied".to_string()));
        }

        let user = self.get_by_id(id).await?;
        let preferences = NotificationPreferences {
            email: data.email.unwrap_or(user.notification_preferences.email),
        };

        let user = self
            .repository
            .users
            .update_preferences(id, preferences)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        tracing::info!(user = %user.username, email = preferences.email, "Notification preferences updated");
        Ok(user.notification_preferences)
    }

    /// Admins cannot change their own role
    pub async fn update_role(&self, id: Uuid, actor: Actor, role: Role) -> AppResult<User> {
        if actor.id == id {
            return Err(AppError::InvalidState("Cannot change your own role".to_string()));
        }

        let user = self
            .repository
            .users
            .update_role(id, role)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        tracing::info!(user = %user.username, role = %role, "User role updated");
        Ok(user)
    }

    /// Delete a user who holds no components. Admins cannot delete themselves.
    pub async fn delete(&self, id: Uuid, actor: Actor) -> AppResult<()> {
        let user = self.get_by_id(id).await?;

        if actor.id == id {
            return Err(AppError::InvalidState(
                "Cannot delete your own account".to_string(),
            ));
        }

        let borrowed = self
            .repository
            .components
            .list(&ComponentFilter {
                current_borrower: Some(id),
                ..ComponentFilter::default()
            })
            .await?
            .len();
        if borrowed > 0 {
            return Err(AppError::InvalidState(format!(
                "Cannot delete user. They have {} borrowed item(s). Please ensure all items are returned first.",
                borrowed
            )));
        }

        if !self.repository.users.delete(id).await? {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        tracing::info!(user = %user.username, "User deleted");
        Ok(())
    }
}

/// Verify a password against an Argon2 PHC string
fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{email::MockEmailTransport, testing::Fixture};

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("challengers").unwrap();
        assert!(verify_password(&hash, "challengers").unwrap());
        assert!(!verify_password(&hash, "wrong").unwrap());
    }

    #[tokio::test]
    async fn test_authenticate() {
        let fx = Fixture::new(MockEmailTransport::new()).await;

        let (token, user) = fx
            .services
            .users
            .authenticate("Member1", Fixture::PASSWORD)
            .await
            .unwrap();
        assert_eq!(user.id, fx.member1.id);

        let claims = UserClaims::from_token(&token, &fx.config.auth.jwt_secret).unwrap();
        assert_eq!(claims.user_id, fx.member1.id);
        assert_eq!(claims.actor(), fx.member1.actor());

        let result = fx.services.users.authenticate("member1", "nope").await;
        assert!(matches!(result, Err(AppError::Authentication(_))));
        let result = fx.services.users.authenticate("ghost", "nope").await;
        assert!(matches!(result, Err(AppError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_email_opt_out_stops_checkout_notifications() {
        // No send expectation: any delivery attempt fails the test
        let mut fx = Fixture::new(MockEmailTransport::new()).await;
        let component = fx.component("ARD-001").await;

        let preferences = fx
            .services
            .users
            .update_preferences(
                fx.member1.id,
                fx.member1.actor(),
                UpdatePreferences { email: Some(false) },
            )
            .await
            .unwrap();
        assert!(!preferences.email);

        fx.services
            .components
            .checkout(component.id, fx.member1.actor(), None)
            .await
            .unwrap();
        assert_eq!(fx.drain().await, 1);
        assert!(fx.logs(fx.member1.id).await.is_empty());

        // Absent field keeps the current value
        let unchanged = fx
            .services
            .users
            .update_preferences(fx.member1.id, fx.admin.actor(), UpdatePreferences::default())
            .await
            .unwrap();
        assert!(!unchanged.email);
    }

    #[tokio::test]
    async fn test_preferences_of_someone_else() {
        let fx = Fixture::new(MockEmailTransport::new()).await;

        let result = fx
            .services
            .users
            .update_preferences(
                fx.member1.id,
                fx.member2.actor(),
                UpdatePreferences { email: Some(false) },
            )
            .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        let preferences = fx
            .services
            .users
            .update_preferences(
                fx.quiet.id,
                fx.admin.actor(),
                UpdatePreferences { email: Some(true) },
            )
            .await
            .unwrap();
        assert!(preferences.email);

        let result = fx
            .services
            .users
            .update_preferences(Uuid::new_v4(), fx.admin.actor(), UpdatePreferences::default())
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_role_changes() {
        let fx = Fixture::new(MockEmailTransport::new()).await;

        let result = fx
            .services
            .users
            .update_role(fx.admin.id, fx.admin.actor(), Role::Member)
            .await;
        assert!(matches!(result, Err(AppError::InvalidState(msg)) if msg == "Cannot change your own role"));

        let promoted = fx
            .services
            .users
            .update_role(fx.member2.id, fx.admin.actor(), Role::Admin)
            .await
            .unwrap();
        assert_eq!(promoted.role, Role::Admin);

        let admins = fx.repository.users.list_admins().await.unwrap();
        assert!(admins.iter().any(|u| u.id == fx.member2.id));
    }

    #[tokio::test]
    async fn test_delete_rules() {
        let fx = Fixture::new(MockEmailTransport::new()).await;
        let component = fx.component("ARD-001").await;
        fx.services
            .components
            .checkout(component.id, fx.member1.actor(), None)
            .await
            .unwrap();

        let result = fx.services.users.delete(fx.admin.id, fx.admin.actor()).await;
        assert!(matches!(result, Err(AppError::InvalidState(msg)) if msg == "Cannot delete your own account"));

        let result = fx.services.users.delete(fx.member1.id, fx.admin.actor()).await;
        assert!(matches!(
            result,
            Err(AppError::InvalidState(msg)) if msg == "Cannot delete user. They have 1 borrowed item(s). Please ensure all items are returned first."
        ));

        fx.services
            .components
            .return_component(component.id, fx.member1.actor(), None)
            .await
            .unwrap();
        fx.services
            .users
            .delete(fx.member1.id, fx.admin.actor())
            .await
            .unwrap();

        let result = fx.services.users.get_by_id(fx.member1.id).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        let users = fx.services.users.list().await.unwrap();
        assert!(users.iter().all(|u| u.id != fx.member1.id));
        // History survives the user
        assert_eq!(fx.services.components.history(component.id).await.unwrap().len(), 2);
    }
}
