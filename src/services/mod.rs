//! Business logic services

pub mod components;
pub mod dashboard;
pub mod email;
pub mod notifications;
pub mod requests;
pub mod scanner;
pub mod scheduler;
pub mod users;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use crate::{clock::Clock, config::AppConfig, repository::Repository};

use self::{
    email::EmailTransport,
    notifications::{NotificationQueue, NotificationService, NotificationWorker},
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub users: users::UsersService,
    pub components: components::ComponentsService,
    pub requests: requests::RequestsService,
    pub notifications: NotificationService,
    pub scanner: scanner::OverdueScanner,
    pub dashboard: dashboard::DashboardService,
}

impl Services {
    /// Create all services with the given repository.
    ///
    /// The returned worker must be spawned for queued notifications to be delivered.
    pub fn new(
        repository: Repository,
        config: &AppConfig,
        transport: Arc<dyn EmailTransport>,
        clock: Arc<dyn Clock>,
    ) -> (Self, NotificationWorker) {
        let notifications = NotificationService::new(
            repository.clone(),
            transport,
            clock.clone(),
            config.notifications.clone(),
        );
        let (queue, worker) = NotificationQueue::channel(notifications.clone());

        let components =
            components::ComponentsService::new(repository.clone(), clock.clone(), queue.clone());

        let services = Self {
            users: users::UsersService::new(repository.clone(), config.auth.clone()),
            requests: requests::RequestsService::new(
                repository.clone(),
                clock.clone(),
                queue,
                components.clone(),
            ),
            scanner: scanner::OverdueScanner::new(
                repository.clone(),
                clock.clone(),
                notifications.clone(),
            ),
            dashboard: dashboard::DashboardService::new(repository, clock, components.clone()),
            components,
            notifications,
        };

        (services, worker)
    }
}
