// ============================
// location-sim/src/sim.rs
// ============================
//! Simulated device: permission prompts, a background task registry and a
//! GPS that walks a fixed route.
use async_trait::async_trait;
use dashmap::DashMap;
use headpat_common::{
    LocationFix, PermissionStatus, Session, TaskAvailability, TaskInvocation, TrackingOptions,
};
use location_core::error::{PlatformError, StoreError};
use location_core::platform::{LocationPermissions, SessionProvider, TaskCallback, TaskScheduler};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Answers the simulated user gives to permission prompts
#[derive(Debug, Clone, Copy)]
pub struct PromptAnswers {
    pub foreground: PermissionStatus,
    pub background: PermissionStatus,
}

#[derive(Debug, Clone, Copy)]
struct Granted {
    foreground: PermissionStatus,
    background: PermissionStatus,
}

pub struct SimulatedDevice {
    answers: PromptAnswers,
    granted: Mutex<Granted>,
    callbacks: DashMap<String, Arc<dyn TaskCallback>>,
    running: DashMap<String, JoinHandle<()>>,
    route: Arc<Vec<(f64, f64)>>,
    fixes: usize,
}

impl SimulatedDevice {
    pub fn new(answers: PromptAnswers, route: Vec<(f64, f64)>, fixes: usize) -> Self {
        Self {
            answers,
            granted: Mutex::new(Granted {
                foreground: PermissionStatus::Undetermined,
                background: PermissionStatus::Undetermined,
            }),
            callbacks: DashMap::new(),
            running: DashMap::new(),
            route: Arc::new(route),
            fixes,
        }
    }

    /// Bind the callback the scheduler invokes for `task_name`
    pub fn define_task(&self, task_name: &str, callback: Arc<dyn TaskCallback>) {
        self.callbacks.insert(task_name.to_string(), callback);
    }
}

#[async_trait]
impl LocationPermissions for SimulatedDevice {
    async fn request_foreground(&self) -> Result<PermissionStatus, PlatformError> {
        let answer = self.answers.foreground;
        self.granted.lock().foreground = answer;
        info!(?answer, "foreground location prompt answered");
        Ok(answer)
    }

    async fn request_background(&self) -> Result<PermissionStatus, PlatformError> {
        let answer = self.answers.background;
        self.granted.lock().background = answer;
        info!(?answer, "background location prompt answered");
        Ok(answer)
    }

    async fn foreground_status(&self) -> Result<PermissionStatus, PlatformError> {
        Ok(self.granted.lock().foreground)
    }

    async fn background_status(&self) -> Result<PermissionStatus, PlatformError> {
        Ok(self.granted.lock().background)
    }
}

#[async_trait]
impl TaskScheduler for SimulatedDevice {
    async fn availability(&self) -> Result<TaskAvailability, PlatformError> {
        Ok(TaskAvailability::Available)
    }

    async fn is_registered(&self, task_name: &str) -> Result<bool, PlatformError> {
        Ok(self.running.contains_key(task_name))
    }

    async fn start_location_updates(
        &self,
        task_name: &str,
        options: &TrackingOptions,
    ) -> Result<(), PlatformError> {
        let callback = self
            .callbacks
            .get(task_name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| PlatformError::Rejected(format!("task {task_name} is not defined")))?;

        let route = self.route.clone();
        let fixes = self.fixes;
        let interval = Duration::from_millis(options.time_interval.max(1));

        let gps = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            for (lat, long) in route.iter().cycle().take(fixes) {
                ticker.tick().await;
                debug!(lat, long, "simulated fix");
                callback
                    .run(TaskInvocation::with_fixes(vec![LocationFix::new(*lat, *long)]))
                    .await;
            }
        });

        if let Some(previous) = self.running.insert(task_name.to_string(), gps) {
            previous.abort();
        }
        info!(task = task_name, ?options, "location updates started");
        Ok(())
    }

    async fn stop_location_updates(&self, task_name: &str) -> Result<(), PlatformError> {
        match self.running.remove(task_name) {
            Some((_, gps)) => {
                gps.abort();
                info!(task = task_name, "location updates stopped");
            },
            None => debug!(task = task_name, "stop requested for an idle task"),
        }
        Ok(())
    }
}

/// Session pinned to one user for the life of the process
pub struct StaticSession {
    session: Option<Session>,
}

impl StaticSession {
    pub fn new(user_id: &str) -> Self {
        Self {
            session: Some(Session {
                user_id: user_id.to_string(),
                session_id: None,
            }),
        }
    }
}

#[async_trait]
impl SessionProvider for StaticSession {
    async fn current_session(&self) -> Result<Option<Session>, StoreError> {
        Ok(self.session.clone())
    }
}
