//! Table output for `status` using comfy-table.

use chrono::{DateTime, Utc};
use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};

use crate::domain::models::{TaskRecord, TaskStatus};

/// Table formatter for CLI output.
pub struct TableFormatter {
    use_colors: bool,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: console::colors_enabled(),
        }
    }

    pub fn with_colors(use_colors: bool) -> Self {
        Self { use_colors }
    }

    /// Format running tasks. A zero-row table still prints its header.
    pub fn format_tasks(&self, tasks: &[TaskRecord]) -> String {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("ID").add_attribute(Attribute::Bold),
            Cell::new("Project").add_attribute(Attribute::Bold),
            Cell::new("Agent").add_attribute(Attribute::Bold),
            Cell::new("Progress").add_attribute(Attribute::Bold),
            Cell::new("ETA").add_attribute(Attribute::Bold),
            Cell::new("Started").add_attribute(Attribute::Bold),
            Cell::new("Cost").add_attribute(Attribute::Bold),
        ]);

        for task in tasks {
            let agent = task.current_agent.as_deref().unwrap_or("-");
            let eta = task
                .progress
                .eta_seconds
                .map_or_else(|| "-".to_string(), |s| format!("{s}s"));
            let status_color = status_color(task.status);
            let agent_cell = if self.use_colors {
                Cell::new(agent).fg(status_color)
            } else {
                Cell::new(agent)
            };
            table.add_row(vec![
                Cell::new(&task.id),
                Cell::new(&task.project),
                agent_cell,
                Cell::new(format!("{}%", task.progress.percent)),
                Cell::new(eta),
                Cell::new(time_ago(task.started_at)),
                Cell::new(format!("${:.4}", task.cost_usd)),
            ]);
        }
        table.to_string()
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn status_color(status: TaskStatus) -> Color {
    match status {
        TaskStatus::Running => Color::Green,
        TaskStatus::Completed => Color::Blue,
        TaskStatus::Failed | TaskStatus::Interrupted => Color::Red,
        TaskStatus::Cancelled => Color::Yellow,
    }
}

/// Human-readable "how long ago" for table rows.
pub fn time_ago(when: DateTime<Utc>) -> String {
    let elapsed = Utc::now().signed_duration_since(when);
    let seconds = elapsed.num_seconds().max(0);
    if seconds < 60 {
        format!("{seconds}s ago")
    } else if seconds < 3600 {
        format!("{}m ago", seconds / 60)
    } else if seconds < 86_400 {
        format!("{}h ago", seconds / 3600)
    } else {
        format!("{}d ago", seconds / 86_400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_row_table_has_header() {
        let formatter = TableFormatter::with_colors(false);
        let rendered = formatter.format_tasks(&[]);
        assert!(rendered.contains("ID"));
        assert!(rendered.contains("Progress"));
    }

    #[test]
    fn test_table_renders_task_row() {
        let mut task = TaskRecord::new("demo", "fix");
        task.current_agent = Some("coder".to_string());
        task.progress.percent = 40;
        task.cost_usd = 0.1234;
        let formatter = TableFormatter::with_colors(false);
        let rendered = formatter.format_tasks(&[task.clone()]);
        assert!(rendered.contains(&task.id));
        assert!(rendered.contains("coder"));
        assert!(rendered.contains("40%"));
        assert!(rendered.contains("$0.1234"));
    }

    #[test]
    fn test_time_ago_buckets() {
        assert!(time_ago(Utc::now()).ends_with("s ago"));
        assert!(time_ago(Utc::now() - chrono::Duration::minutes(5)).contains("5m"));
        assert!(time_ago(Utc::now() - chrono::Duration::hours(3)).contains("3h"));
        assert!(time_ago(Utc::now() - chrono::Duration::days(2)).contains("2d"));
    }
}
