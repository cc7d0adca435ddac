//! Accounts: registration, login, profiles and staff activation

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::db::sqlite_helpers::now_utc;
use crate::db::{
    CreateAnalyticsEvent, CreateUser, Database, EventType, MembershipType, NotificationCategory,
    Role, UniqueField, UpdateProfile, UserFilter, UserRecord,
};

use super::analytics::AnalyticsService;
use super::auth::{AuthService, IssuedToken};
use super::notifications::Notifier;
use super::rules;
use super::{Actor, ServiceError, ServiceResult};

const MIN_PASSWORD_LEN: usize = 8;

/// Registration input
#[derive(Debug, Clone, Default)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub membership_type: MembershipType,
    pub department: String,
    pub student_id: Option<String>,
    pub faculty_id: Option<String>,
    pub staff_id: Option<String>,
    pub phone: String,
}

/// Fields a user may change on their own profile
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub emergency_contact: Option<String>,
    pub password: Option<String>,
}

/// A user plus a token when the account may sign in right away
#[derive(Debug, Clone, Serialize)]
pub struct AuthPayload {
    pub user: UserRecord,
    pub token: Option<IssuedToken>,
}

#[derive(Clone)]
pub struct AccountsService {
    db: Database,
    auth: AuthService,
    analytics: AnalyticsService,
    notifier: Arc<dyn Notifier>,
}

impl AccountsService {
    pub fn new(
        db: Database,
        auth: AuthService,
        analytics: AnalyticsService,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            db,
            auth,
            analytics,
            notifier,
        }
    }

    // ========================================================================
    // Registration & Sessions
    // ========================================================================

    /// Register a new account. Staff accounts start inactive until approved
    /// and verified; the very first account becomes an admin.
    pub async fn register(&self, input: RegisterInput) -> ServiceResult<AuthPayload> {
        let input = normalize(input);
        validate_registration(&input)?;

        let users = self.db.users();
        let unique_checks = [
            (UniqueField::Username, Some(&input.username), "Username is already taken"),
            (UniqueField::Email, Some(&input.email), "Email is already registered"),
            (UniqueField::StudentId, input.student_id.as_ref(), "Student ID is already registered"),
            (UniqueField::FacultyId, input.faculty_id.as_ref(), "Faculty ID is already registered"),
            (UniqueField::StaffId, input.staff_id.as_ref(), "Staff ID is already registered"),
        ];
        for (field, value, message) in unique_checks {
            if let Some(value) = value
                && users.is_taken(field, value, None).await?
            {
                return Err(ServiceError::conflict(message));
            }
        }

        let first_user = users.count().await? == 0;
        let role = if first_user {
            info!(username = %input.username, "Creating first admin user");
            Role::Admin
        } else {
            Role::Member
        };
        // the first account approves itself
        let is_staff_approved = first_user;
        let email_verified = first_user;
        let is_active = first_user || input.membership_type != MembershipType::Staff;

        let user = users
            .create(CreateUser {
                password_hash: self.auth.hash_password(&input.password)?,
                username: input.username,
                email: input.email,
                first_name: input.first_name,
                last_name: input.last_name,
                membership_type: input.membership_type,
                department: input.department,
                student_id: input.student_id,
                faculty_id: input.faculty_id,
                staff_id: input.staff_id,
                phone: input.phone,
                role,
                is_staff_approved,
                email_verified,
                is_active,
            })
            .await?;

        info!(user_id = %user.id, membership = user.membership_type.as_str(), active = user.is_active, "User registered");
        self.analytics
            .record(CreateAnalyticsEvent::new(EventType::Registration, Some(&user.id)))
            .await;

        let token = if user.is_active {
            Some(self.auth.issue_token(&user)?)
        } else {
            None
        };
        Ok(AuthPayload { user, token })
    }

    /// Sign in with username or email
    pub async fn login(&self, username_or_email: &str, password: &str) -> ServiceResult<AuthPayload> {
        let users = self.db.users();
        let identifier = username_or_email.trim();

        let user = match users.get_by_username(identifier).await? {
            Some(user) => Some(user),
            None => users.get_by_email(identifier).await?,
        };
        let user = user
            .filter(|u| self.auth.verify_password(password, &u.password_hash))
            .ok_or_else(|| ServiceError::unauthorized("Invalid username or password"))?;

        if !user.is_active {
            return Err(ServiceError::forbidden("Account is not active"));
        }

        let now = now_utc();
        users.update_last_login(&user.id, now).await?;
        self.analytics
            .record(CreateAnalyticsEvent::new(EventType::Login, Some(&user.id)))
            .await;

        let token = self.auth.issue_token(&user)?;
        let user = users.get_by_id(&user.id).await?.unwrap_or(user);
        info!(user_id = %user.id, "User logged in");

        Ok(AuthPayload {
            user,
            token: Some(token),
        })
    }

    /// Revoke the presented token
    pub async fn logout(&self, token: &str) -> ServiceResult<()> {
        let user_id = self.auth.revoke(token).await?;
        self.analytics
            .record(CreateAnalyticsEvent::new(EventType::Logout, Some(&user_id)))
            .await;
        Ok(())
    }

    // ========================================================================
    // Profile
    // ========================================================================

    pub async fn me(&self, actor: &Actor) -> ServiceResult<UserRecord> {
        self.get_user(&actor.user_id).await
    }

    pub async fn groups(&self, user_id: &str) -> ServiceResult<Vec<String>> {
        Ok(self.db.users().groups(user_id).await?)
    }

    pub async fn update_profile(&self, actor: &Actor, patch: ProfilePatch) -> ServiceResult<UserRecord> {
        let password_hash = match patch.password.as_deref() {
            Some(password) => {
                validate_password(password)?;
                Some(self.auth.hash_password(password)?)
            }
            None => None,
        };

        let trimmed = |v: Option<String>| v.map(|s| s.trim().to_string());
        let first_name = trimmed(patch.first_name);
        let last_name = trimmed(patch.last_name);
        if first_name.as_deref() == Some("") || last_name.as_deref() == Some("") {
            return Err(ServiceError::validation("Names cannot be empty"));
        }

        let user = self
            .db
            .users()
            .update_profile(
                &actor.user_id,
                UpdateProfile {
                    first_name,
                    last_name,
                    department: trimmed(patch.department),
                    phone: trimmed(patch.phone),
                    emergency_contact: trimmed(patch.emergency_contact),
                    password_hash,
                },
            )
            .await?
            .ok_or_else(|| ServiceError::not_found("User not found"))?;

        info!(user_id = %user.id, "Profile updated");
        Ok(user)
    }

    // ========================================================================
    // Administration
    // ========================================================================

    pub async fn get_user(&self, user_id: &str) -> ServiceResult<UserRecord> {
        self.db
            .users()
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User not found"))
    }

    pub async fn list_users(&self, actor: &Actor, filter: UserFilter) -> ServiceResult<Vec<UserRecord>> {
        actor.require_admin()?;
        Ok(self.db.users().list(&filter).await?)
    }

    /// Mark a staff member as approved and re-evaluate activation
    pub async fn approve_staff(&self, actor: &Actor, user_id: &str) -> ServiceResult<UserRecord> {
        actor.require_admin()?;
        let user = self.get_user(user_id).await?;
        let user = self
            .apply_activation(&user, true, user.email_verified)
            .await?;

        self.notifier
            .notify(
                &user.id,
                NotificationCategory::Account,
                "Staff account approved",
                &activation_message(&user),
            )
            .await;
        info!(user_id = %user.id, approved_by = %actor.user_id, "Staff member approved");
        Ok(user)
    }

    /// Mark the e-mail address as verified and re-evaluate activation
    pub async fn verify_email(&self, actor: &Actor, user_id: &str) -> ServiceResult<UserRecord> {
        actor.require_admin()?;
        let user = self.get_user(user_id).await?;
        let user = self
            .apply_activation(&user, user.is_staff_approved, true)
            .await?;

        self.notifier
            .notify(
                &user.id,
                NotificationCategory::Account,
                "E-mail verified",
                &activation_message(&user),
            )
            .await;
        info!(user_id = %user.id, "E-mail verified");
        Ok(user)
    }

    /// Move a user to another tier; the group follows and staff activation is
    /// re-applied
    pub async fn set_membership_type(
        &self,
        actor: &Actor,
        user_id: &str,
        membership: MembershipType,
    ) -> ServiceResult<UserRecord> {
        actor.require_admin()?;
        let users = self.db.users();
        self.get_user(user_id).await?;

        users.set_membership_type(user_id, membership).await?;
        let user = self.get_user(user_id).await?;
        let user = self
            .apply_activation(&user, user.is_staff_approved, user.email_verified)
            .await?;

        info!(user_id = %user.id, membership = membership.as_str(), "Membership type changed");
        Ok(user)
    }

    pub async fn set_active(&self, actor: &Actor, user_id: &str, is_active: bool) -> ServiceResult<UserRecord> {
        actor.require_admin()?;
        if actor.user_id == user_id && !is_active {
            return Err(ServiceError::validation("You cannot deactivate your own account"));
        }
        if !self.db.users().set_active(user_id, is_active).await? {
            return Err(ServiceError::not_found("User not found"));
        }
        info!(user_id = %user_id, is_active, "User activation changed");
        self.get_user(user_id).await
    }

    async fn apply_activation(
        &self,
        user: &UserRecord,
        is_staff_approved: bool,
        email_verified: bool,
    ) -> ServiceResult<UserRecord> {
        let is_active = rules::staff_activation(user.membership_type, is_staff_approved, email_verified)
            .unwrap_or(user.is_active);
        self.db
            .users()
            .set_activation_flags(&user.id, is_staff_approved, email_verified, is_active)
            .await?;
        self.get_user(&user.id).await
    }
}

fn activation_message(user: &UserRecord) -> String {
    if user.is_active {
        "Your account is active. You can now sign in.".to_string()
    } else if !user.is_staff_approved {
        "Your account is waiting for staff approval.".to_string()
    } else {
        "Your account will be activated once your e-mail address is verified.".to_string()
    }
}

fn normalize(mut input: RegisterInput) -> RegisterInput {
    let opt = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    input.username = input.username.trim().to_string();
    input.email = input.email.trim().to_lowercase();
    input.first_name = input.first_name.trim().to_string();
    input.last_name = input.last_name.trim().to_string();
    input.department = input.department.trim().to_string();
    input.phone = input.phone.trim().to_string();
    input.student_id = opt(input.student_id);
    input.faculty_id = opt(input.faculty_id);
    input.staff_id = opt(input.staff_id);
    input
}

fn validate_registration(input: &RegisterInput) -> ServiceResult<()> {
    if input.username.is_empty() {
        return Err(ServiceError::validation("Username is required"));
    }
    if !rules::is_valid_email(&input.email) {
        return Err(ServiceError::validation("Enter a valid e-mail address"));
    }
    if input.first_name.is_empty() || input.last_name.is_empty() {
        return Err(ServiceError::validation("First and last name are required"));
    }
    validate_password(&input.password)
}

fn validate_password(password: &str) -> ServiceResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ServiceError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{test_db, test_services};
    use assert_matches::assert_matches;

    fn input(username: &str, membership: MembershipType) -> RegisterInput {
        RegisterInput {
            username: username.into(),
            email: format!("{}@uni.edu", username),
            password: "password123".into(),
            first_name: "Test".into(),
            last_name: "User".into(),
            membership_type: membership,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_first_user_is_admin() {
        let db = test_db().await;
        let services = test_services(&db);

        let first = services.accounts.register(input("root", MembershipType::Public)).await.unwrap();
        let second = services.accounts.register(input("pat", MembershipType::Public)).await.unwrap();

        assert_eq!(first.user.role, Role::Admin);
        assert_eq!(second.user.role, Role::Member);
        assert!(second.token.is_some());
        assert_eq!(services.accounts.groups(&second.user.id).await.unwrap(), vec!["Public"]);
    }

    #[tokio::test]
    async fn test_registration_rejects_duplicates_and_bad_input() {
        let db = test_db().await;
        let services = test_services(&db);
        services.accounts.register(input("ada", MembershipType::Student)).await.unwrap();

        let mut dup_name = input("ADA", MembershipType::Student);
        dup_name.email = "other@uni.edu".into();
        assert_matches!(
            services.accounts.register(dup_name).await,
            Err(ServiceError::Conflict(_))
        );

        let mut short = input("bob", MembershipType::Student);
        short.password = "short".into();
        assert_matches!(
            services.accounts.register(short).await,
            Err(ServiceError::Validation(_))
        );

        let mut bad_email = input("cy", MembershipType::Student);
        bad_email.email = "not-an-email".into();
        assert_matches!(
            services.accounts.register(bad_email).await,
            Err(ServiceError::Validation(_))
        );
    }

    #[tokio::test]
    async fn test_staff_activation_needs_approval_and_verification() {
        let db = test_db().await;
        let services = test_services(&db);
        let admin = services.accounts.register(input("root", MembershipType::Public)).await.unwrap();
        let admin = services.auth.actor_for(&admin.user).await.unwrap();

        let staff = services.accounts.register(input("sam", MembershipType::Staff)).await.unwrap();
        assert!(!staff.user.is_active);
        assert!(staff.token.is_none());
        assert_matches!(
            services.accounts.login("sam", "password123").await,
            Err(ServiceError::Forbidden(_))
        );

        let approved = services.accounts.approve_staff(&admin, &staff.user.id).await.unwrap();
        assert!(approved.is_staff_approved);
        assert!(!approved.is_active);

        let verified = services.accounts.verify_email(&admin, &staff.user.id).await.unwrap();
        assert!(verified.is_active);

        let session = services.accounts.login("sam", "password123").await.unwrap();
        let actor = services
            .auth
            .authenticate(&session.token.unwrap().token)
            .await
            .unwrap();
        assert!(actor.is_staff);
        assert!(!actor.is_admin());

        let notes = db.notifications().list_for_user(&staff.user.id, false, 10).await.unwrap();
        assert_eq!(notes.len(), 2);
    }

    #[tokio::test]
    async fn test_first_staff_account_is_approved_and_stays_active() {
        let db = test_db().await;
        let services = test_services(&db);

        let head = services.accounts.register(input("head", MembershipType::Staff)).await.unwrap();
        assert_eq!(head.user.role, Role::Admin);
        assert!(head.user.is_active);
        assert!(head.user.is_staff_approved);
        assert!(head.user.email_verified);
        let token = head.token.unwrap().token;
        let admin = services.auth.authenticate(&token).await.unwrap();

        let verified = services.accounts.verify_email(&admin, &admin.user_id).await.unwrap();
        assert!(verified.is_active);
        let moved = services
            .accounts
            .set_membership_type(&admin, &admin.user_id, MembershipType::Staff)
            .await
            .unwrap();
        assert!(moved.is_active);
        assert!(services.auth.authenticate(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_login_logout_cycle() {
        let db = test_db().await;
        let services = test_services(&db);
        services.accounts.register(input("ada", MembershipType::Student)).await.unwrap();

        assert_matches!(
            services.accounts.login("ada", "wrong-password").await,
            Err(ServiceError::Unauthorized(_))
        );

        let session = services.accounts.login("ada@uni.edu", "password123").await.unwrap();
        assert!(session.user.last_login_at.is_some());
        let token = session.token.unwrap().token;

        services.accounts.logout(&token).await.unwrap();
        assert_matches!(
            services.auth.authenticate(&token).await,
            Err(ServiceError::Unauthorized(_))
        );
    }

    #[tokio::test]
    async fn test_membership_change_moves_group() {
        let db = test_db().await;
        let services = test_services(&db);
        let admin = services.accounts.register(input("root", MembershipType::Public)).await.unwrap();
        let admin = services.auth.actor_for(&admin.user).await.unwrap();
        let user = services.accounts.register(input("ada", MembershipType::Student)).await.unwrap();

        let updated = services
            .accounts
            .set_membership_type(&admin, &user.user.id, MembershipType::Faculty)
            .await
            .unwrap();
        assert_eq!(updated.membership_type, MembershipType::Faculty);
        assert_eq!(services.accounts.groups(&user.user.id).await.unwrap(), vec!["Faculty"]);

        // Moving an active non-staff user to staff deactivates until approved
        let staffed = services
            .accounts
            .set_membership_type(&admin, &user.user.id, MembershipType::Staff)
            .await
            .unwrap();
        assert!(!staffed.is_active);
    }

    #[tokio::test]
    async fn test_profile_update_changes_password() {
        let db = test_db().await;
        let services = test_services(&db);
        let reg = services.accounts.register(input("ada", MembershipType::Student)).await.unwrap();
        let actor = services.auth.actor_for(&reg.user).await.unwrap();

        let updated = services
            .accounts
            .update_profile(
                &actor,
                ProfilePatch {
                    phone: Some(" 555-0100 ".into()),
                    password: Some("new-password".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.phone, "555-0100");
        assert!(services.accounts.login("ada", "new-password").await.is_ok());
    }

    #[tokio::test]
    async fn test_admin_operations_require_admin() {
        let db = test_db().await;
        let services = test_services(&db);
        services.accounts.register(input("root", MembershipType::Public)).await.unwrap();
        let member = services.accounts.register(input("pat", MembershipType::Public)).await.unwrap();
        let actor = services.auth.actor_for(&member.user).await.unwrap();

        assert_matches!(
            services.accounts.list_users(&actor, UserFilter::default()).await,
            Err(ServiceError::Forbidden(_))
        );
    }
}
