//! Event formatting utilities for the command-line client.

use pipedeck_shared::time::timestamp_to_rfc3339;

use crate::{
    context::Connectivity,
    domain::{
        Build, BuildUpdate, ConnectionStatus, LiveEvent, NotificationEvent, Pipeline,
        PipelineUpdate, RoomId, SystemEvent, Task,
    },
};

const RULE: &str = "============================================================";

/// Event formatter for terminal display
pub struct EventFormatter;

impl EventFormatter {
    /// Format any live event
    ///
    /// # Arguments
    ///
    /// * `event` - The event to render
    /// * `received_at` - Unix timestamp when the event arrived (milliseconds)
    ///
    /// # Returns
    ///
    /// A formatted string ending with a newline
    pub fn format_event(event: &LiveEvent, received_at: i64) -> String {
        match event {
            LiveEvent::BuildUpdate(update) => Self::format_build_update(update, received_at),
            LiveEvent::PipelineUpdate(update) => Self::format_pipeline_update(update, received_at),
            LiveEvent::Notification(notification) => {
                Self::format_notification(notification, received_at)
            }
            LiveEvent::SystemEvent(event) => Self::format_system_event(event),
        }
    }

    /// Format a build status change
    ///
    /// # Arguments
    ///
    /// * `update` - The build update payload
    /// * `received_at` - Unix timestamp when the update arrived (milliseconds)
    ///
    /// # Returns
    ///
    /// A formatted string with the build, its pipeline and the new status
    pub fn format_build_update(update: &BuildUpdate, received_at: i64) -> String {
        let number = update
            .number
            .map(|n| format!(" #{}", n))
            .unwrap_or_default();
        format!(
            "\n* build {}{} ({}) -> {} at {}\n",
            update.build_id,
            number,
            update.pipeline_id,
            update.status,
            timestamp_to_rfc3339(received_at)
        )
    }

    pub fn format_pipeline_update(update: &PipelineUpdate, received_at: i64) -> String {
        format!(
            "\n* pipeline {} -> {} at {}\n",
            update.pipeline_id,
            update.status,
            timestamp_to_rfc3339(received_at)
        )
    }

    /// Format a notification with its level, if the server sent one
    pub fn format_notification(notification: &NotificationEvent, received_at: i64) -> String {
        let level = notification.level.as_deref().unwrap_or("info");
        let mut output = format!(
            "\n[{}] {}\n",
            level.to_uppercase(),
            notification.title
        );
        if !notification.message.is_empty() {
            output.push_str(&format!("{}\n", notification.message));
        }
        output.push_str(&format!("received at {}\n", timestamp_to_rfc3339(received_at)));
        output
    }

    pub fn format_system_event(event: &SystemEvent) -> String {
        format!("\n! system ({}): {}\n", event.kind, event.message)
    }

    /// Format the connectivity banner
    ///
    /// Empty when everything is reachable.
    pub fn format_connectivity(connectivity: &Connectivity) -> String {
        let mut output = String::new();
        if connectivity.network_unavailable {
            output.push_str("API unreachable, showing cached data where possible\n");
        }
        match connectivity.live_status {
            ConnectionStatus::Reconnecting => output.push_str("Live updates reconnecting...\n"),
            ConnectionStatus::Exhausted => {
                output.push_str("Live updates stopped. Type 'reconnect' to try again.\n")
            }
            _ => {}
        }
        output
    }

    pub fn format_status(status: ConnectionStatus, rooms: &[RoomId]) -> String {
        let mut output = format!("live channel: {}\n", status);
        if rooms.is_empty() {
            output.push_str("(No subscriptions)\n");
        } else {
            for room in rooms {
                output.push_str(&format!("  - {}\n", room));
            }
        }
        output
    }

    /// Format a task list as a boxed table
    pub fn format_tasks(tasks: &[Task]) -> String {
        Self::boxed("Tasks", tasks.iter().map(|task| {
            format!("{} [{}] {}", task.id, task.status, task.title)
        }))
    }

    pub fn format_pipelines(pipelines: &[Pipeline]) -> String {
        Self::boxed("Pipelines", pipelines.iter().map(|pipeline| {
            format!("{} [{}] {}", pipeline.id, pipeline.status, pipeline.name)
        }))
    }

    pub fn format_builds(builds: &[Build]) -> String {
        Self::boxed("Builds", builds.iter().map(|build| {
            format!(
                "{} #{} ({}) [{}]",
                build.id, build.number, build.pipeline_id, build.status
            )
        }))
    }

    fn boxed(title: &str, lines: impl Iterator<Item = String>) -> String {
        let mut output = format!("\n{}\n{}:\n", RULE, title);
        let mut empty = true;
        for line in lines {
            empty = false;
            output.push_str(&line);
            output.push('\n');
        }
        if empty {
            output.push_str("(None)\n");
        }
        output.push_str(RULE);
        output.push('\n');
        output
    }
}
