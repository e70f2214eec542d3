//! Concrete build and start commands

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::deploy::platform::Platform;
use crate::detect::ProjectType;
use crate::models::project::Project;

/// Replacement templates for one project type. An empty build template turns
/// the build step off.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
}

pub type CommandOverrides = HashMap<ProjectType, CommandOverride>;

/// Start/build templates per project type, with overrides applied
#[derive(Debug, Clone, Default)]
pub struct CommandTemplates {
    overrides: CommandOverrides,
}

impl CommandTemplates {
    pub fn new(overrides: CommandOverrides) -> Self {
        Self { overrides }
    }

    pub fn start_template(&self, project_type: ProjectType) -> &str {
        self.overrides
            .get(&project_type)
            .and_then(|o| o.start.as_deref())
            .unwrap_or(project_type.profile().start_command)
    }

    pub fn build_template(&self, project_type: ProjectType) -> Option<&str> {
        let template = match self.overrides.get(&project_type).and_then(|o| o.build.as_deref()) {
            Some(custom) => Some(custom),
            None => project_type.profile().build_command,
        };
        template.filter(|t| !t.trim().is_empty())
    }
}

/// Fills the `{python}`, `{pip}` and `{port}` placeholders
pub fn render(template: &str, platform: Platform, port: Option<u16>) -> String {
    let rendered = template
        .replace("{python}", platform.python())
        .replace("{pip}", platform.pip());
    match port {
        Some(port) => rendered.replace("{port}", &port.to_string()),
        None => rendered,
    }
}

/// Python on Windows consoles needs the UTF-8 code page
fn with_code_page(command_line: String, project_type: ProjectType, platform: Platform) -> String {
    if platform.is_windows() && project_type.is_python() {
        format!("chcp 65001 && {}", command_line)
    } else {
        command_line
    }
}

/// A shell command line ready to spawn
#[derive(Debug, Clone)]
pub struct LaunchCommand {
    pub command_line: String,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    platform: Platform,
}

impl LaunchCommand {
    /// Run command for `project` listening on `port`
    pub fn start(
        project: &Project,
        port: u16,
        platform: Platform,
        templates: &CommandTemplates,
    ) -> Self {
        let template = templates.start_template(project.project_type);
        let command_line = with_code_page(
            render(template, platform, Some(port)),
            project.project_type,
            platform,
        );
        let port = port.to_string();

        Self {
            command_line,
            cwd: project.path.clone(),
            env: vec![
                ("PORT".to_string(), port.clone()),
                ("FLASK_RUN_PORT".to_string(), port),
                ("FLASK_RUN_HOST".to_string(), "127.0.0.1".to_string()),
                ("FLASK_APP".to_string(), "app.py".to_string()),
                ("NODE_ENV".to_string(), "production".to_string()),
                ("PYTHONIOENCODING".to_string(), "utf-8".to_string()),
                ("PYTHONUNBUFFERED".to_string(), "1".to_string()),
            ],
            platform,
        }
    }

    /// Build command for `project`, if its type has one
    pub fn build(project: &Project, platform: Platform, templates: &CommandTemplates) -> Option<Self> {
        let template = templates.build_template(project.project_type)?;
        Some(Self {
            command_line: with_code_page(
                render(template, platform, None),
                project.project_type,
                platform,
            ),
            cwd: project.path.clone(),
            env: vec![("PYTHONIOENCODING".to_string(), "utf-8".to_string())],
            platform,
        })
    }

    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Spawnable command with piped output. On unix the child leads its own
    /// process group so the whole tree can be signalled at once.
    pub fn to_command(&self) -> Command {
        let (shell, flag) = self.platform.shell();
        let mut cmd = Command::new(shell);
        cmd.arg(flag)
            .arg(&self.command_line)
            .current_dir(&self.cwd)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }
}
