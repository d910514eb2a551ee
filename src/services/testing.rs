//! Shared fixture for service tests

use std::sync::{Arc, OnceLock};

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use super::{email::EmailTransport, notifications::NotificationWorker, users::hash_password, Services};
use crate::{
    clock::{Clock, FixedClock},
    config::AppConfig,
    models::{component::NewComponent, user::NewUser, Component, NotificationLog, Role, User},
    repository::Repository,
};

pub(crate) struct Fixture {
    pub services: Services,
    pub repository: Repository,
    pub clock: FixedClock,
    pub config: AppConfig,
    worker: NotificationWorker,
    pub admin: User,
    pub admin2: User,
    pub member1: User,
    pub member2: User,
    /// Member with email notifications turned off
    pub quiet: User,
}

fn password_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_password(Fixture::PASSWORD).unwrap())
}

impl Fixture {
    pub const PASSWORD: &'static str = "challengers123";

    pub async fn new(transport: impl EmailTransport + 'static) -> Self {
        Self::with_repository(transport, Repository::in_memory()).await
    }

    pub async fn with_repository(
        transport: impl EmailTransport + 'static,
        repository: Repository,
    ) -> Self {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap());
        let config = AppConfig::default();

        let (services, worker) = Services::new(
            repository.clone(),
            &config,
            Arc::new(transport),
            Arc::new(clock.clone()),
        );

        let user = |username: &str, role: Role, email_notifications: bool| NewUser {
            username: username.to_string(),
            name: username.to_string(),
            email: format!("{}@challengers.local", username),
            phone: None,
            role,
            email_notifications,
            password_hash: password_hash().to_string(),
        };

        let mut created = Vec::new();
        for data in [
            user("admin", Role::Admin, true),
            user("admin2", Role::Admin, true),
            user("member1", Role::Member, true),
            user("member2", Role::Member, true),
            user("quiet", Role::Member, false),
        ] {
            created.push(repository.users.create(&data, clock.now()).await.unwrap());
        }
        let mut created = created.into_iter();
        let mut next = || created.next().unwrap();

        Self {
            admin: next(),
            admin2: next(),
            member1: next(),
            member2: next(),
            quiet: next(),
            services,
            repository,
            clock,
            config,
            worker,
        }
    }

    /// Insert an available component with a 7 day duration
    pub async fn component(&self, code: &str) -> Component {
        self.repository
            .components
            .create(
                &NewComponent {
                    component_code: code.to_string(),
                    name: match code {
                        "ARD-001" => "Arduino Uno R3".to_string(),
                        other => format!("Component {}", other),
                    },
                    category: code.split('-').next().unwrap_or("Misc").to_string(),
                    description: String::new(),
                    image_url: String::new(),
                    checkout_duration: 7,
                },
                self.clock.now(),
            )
            .await
            .unwrap()
    }

    /// Dispatch everything currently queued
    pub async fn drain(&mut self) -> usize {
        self.worker.drain().await
    }

    pub async fn logs(&self, user_id: Uuid) -> Vec<NotificationLog> {
        self.repository.notifications.by_user(user_id).await.unwrap()
    }
}
