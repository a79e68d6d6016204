//! Callbacks applying live events to local state.

use crate::domain::{BuildUpdate, LiveEvent, NotificationEvent, PipelineUpdate, SystemEvent};

type Callback<T> = Box<dyn Fn(&T) + Send + Sync>;

/// One callback per event kind.
///
/// Callbacks run on the channel's reader task in arrival order, so they must
/// not block. Updates should be idempotent ("set status to X"): events in
/// flight during a reconnect can be lost and nothing is replayed.
#[derive(Default)]
pub struct EventHandlers {
    on_notification: Option<Callback<NotificationEvent>>,
    on_build_update: Option<Callback<BuildUpdate>>,
    on_pipeline_update: Option<Callback<PipelineUpdate>>,
    on_system_event: Option<Callback<SystemEvent>>,
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_notification(
        mut self,
        f: impl Fn(&NotificationEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_notification = Some(Box::new(f));
        self
    }

    pub fn on_build_update(mut self, f: impl Fn(&BuildUpdate) + Send + Sync + 'static) -> Self {
        self.on_build_update = Some(Box::new(f));
        self
    }

    pub fn on_pipeline_update(
        mut self,
        f: impl Fn(&PipelineUpdate) + Send + Sync + 'static,
    ) -> Self {
        self.on_pipeline_update = Some(Box::new(f));
        self
    }

    pub fn on_system_event(mut self, f: impl Fn(&SystemEvent) + Send + Sync + 'static) -> Self {
        self.on_system_event = Some(Box::new(f));
        self
    }

    /// Route `event` to its callback; returns `false` if none is registered
    pub fn dispatch(&self, event: &LiveEvent) -> bool {
        match event {
            LiveEvent::Notification(payload) => call(&self.on_notification, payload),
            LiveEvent::BuildUpdate(payload) => call(&self.on_build_update, payload),
            LiveEvent::PipelineUpdate(payload) => call(&self.on_pipeline_update, payload),
            LiveEvent::SystemEvent(payload) => call(&self.on_system_event, payload),
        }
    }
}

fn call<T>(callback: &Option<Callback<T>>, payload: &T) -> bool {
    match callback {
        Some(callback) => {
            callback(payload);
            true
        }
        None => false,
    }
}
