//! Whitelisted task catalog.
//!
//! The catalog is the only source of commands the controller will run or
//! forward. Entries are kept in declaration order so viewers list them the
//! same way every time.

use serde::{Deserialize, Serialize};

/// One whitelisted command.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TaskSpec {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    pub command: Vec<String>,
}

impl TaskSpec {
    pub fn new(id: &str, label: &str, description: &str, command: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            description: description.to_string(),
            command: command.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Space-joined argv, shown to operators before they run a task.
    pub fn command_preview(&self) -> String {
        self.command.join(" ")
    }
}

/// Catalog entry as pushed to viewers in `task_catalog`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CatalogEntry {
    pub id: String,
    pub label: String,
    pub description: String,
    pub command_preview: String,
}

impl From<&TaskSpec> for CatalogEntry {
    fn from(task: &TaskSpec) -> Self {
        Self {
            id: task.id.clone(),
            label: task.label.clone(),
            description: task.description.clone(),
            command_preview: task.command_preview(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TaskCatalog {
    tasks: Vec<TaskSpec>,
}

impl TaskCatalog {
    pub fn new(tasks: Vec<TaskSpec>) -> Self {
        let mut deduped: Vec<TaskSpec> = Vec::with_capacity(tasks.len());
        for task in tasks {
            // Later definitions replace earlier ones in place.
            match deduped.iter_mut().find(|t| t.id == task.id) {
                Some(existing) => *existing = task,
                None => deduped.push(task),
            }
        }
        Self { tasks: deduped }
    }

    /// Built-in tasks merged with operator supplied ones.
    pub fn with_overrides(extra: Vec<TaskSpec>) -> Self {
        let mut tasks = builtin_tasks();
        tasks.extend(extra);
        Self::new(tasks)
    }

    pub fn get(&self, id: &str) -> Option<&TaskSpec> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.tasks.iter().map(CatalogEntry::from).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Default for TaskCatalog {
    fn default() -> Self {
        Self::new(builtin_tasks())
    }
}

fn builtin_tasks() -> Vec<TaskSpec> {
    vec![
        TaskSpec::new(
            "uptime",
            "System Uptime",
            "Show controller uptime and load averages.",
            &["uptime"],
        ),
        TaskSpec::new(
            "disk-usage",
            "Disk Utilization",
            "Summarize disk usage across mounted volumes.",
            &["df", "-h"],
        ),
        TaskSpec::new(
            "top-processes",
            "Top Processes",
            "List the most CPU hungry processes.",
            &["bash", "-lc", "ps -eo pid,comm,%cpu,%mem --sort=-%cpu | head -n 6"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_order() {
        let catalog = TaskCatalog::default();
        let ids: Vec<String> = catalog.entries().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["uptime", "disk-usage", "top-processes"]);
    }

    #[test]
    fn test_command_preview() {
        let catalog = TaskCatalog::default();
        let entry = CatalogEntry::from(catalog.get("disk-usage").unwrap());
        assert_eq!(entry.command_preview, "df -h");
        assert_eq!(entry.label, "Disk Utilization");
    }

    #[test]
    fn test_overrides_replace_in_place() {
        let catalog = TaskCatalog::with_overrides(vec![
            TaskSpec::new("uptime", "Uptime (short)", "", &["uptime", "-p"]),
            TaskSpec::new("temp", "SoC Temperature", "", &["vcgencmd", "measure_temp"]),
        ]);

        assert_eq!(catalog.len(), 4);
        assert_eq!(catalog.get("uptime").unwrap().command, vec!["uptime", "-p"]);
        assert_eq!(catalog.entries()[0].id, "uptime");
        assert_eq!(catalog.entries()[3].id, "temp");
        assert!(catalog.get("missing").is_none());
    }
}
