//! Directory classification.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use super::profile::{ProjectType, FILE_PROBE_ORDER};

/// Depth bound of the loose heuristic walk. The root's own files sit at depth 1.
const LOOSE_SCAN_MAX_DEPTH: usize = 3;

/// Directories that never contribute to the loose heuristics
const SKIPPED_DIRS: &[&str] = &["node_modules", ".git", ".svn", ".hg", "vendor", "__pycache__"];

/// Loose heuristic precedence: first matching extension wins
const LOOSE_EXTENSIONS: &[(&str, ProjectType)] = &[
    ("py", ProjectType::PythonFlask),
    ("php", ProjectType::Php),
    ("html", ProjectType::Static),
    ("js", ProjectType::NodeJs),
];

/// Result of classifying a directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub project_type: ProjectType,
    pub start_command: String,
    pub build_command: Option<String>,
    pub default_port: u16,
}

impl From<ProjectType> for Classification {
    fn from(project_type: ProjectType) -> Self {
        let profile = project_type.profile();
        Self {
            project_type,
            start_command: profile.start_command.to_string(),
            build_command: profile.build_command.map(str::to_string),
            default_port: profile.default_port,
        }
    }
}

/// The subset of `package.json` the detector and scanner care about
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageManifest {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub dependencies: HashMap<String, serde_json::Value>,

    #[serde(default, rename = "devDependencies")]
    pub dev_dependencies: HashMap<String, serde_json::Value>,
}

impl PackageManifest {
    /// Reads `package.json` from `dir`. A missing or malformed manifest is
    /// treated as absent.
    pub fn read(dir: &Path) -> Option<Self> {
        let path = dir.join("package.json");
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!("Ignoring unreadable manifest {}: {}", path.display(), e);
                None
            }
        }
    }

    fn declares(&self, package: &str) -> bool {
        self.dependencies.contains_key(package) || self.dev_dependencies.contains_key(package)
    }

    /// Framework implied by the declared dependencies
    pub fn framework(&self) -> Option<ProjectType> {
        if self.declares("react") {
            Some(ProjectType::React)
        } else if self.declares("vue") {
            Some(ProjectType::Vue)
        } else if ["express", "fastify", "koa"].iter().any(|p| self.declares(p)) {
            Some(ProjectType::NodeJs)
        } else {
            None
        }
    }
}

/// Classifies `dir`, returning the type along with its command templates and
/// default port. `None` means the directory holds nothing berth can run.
pub fn classify(dir: &Path) -> Option<Classification> {
    detect_project_type(dir).map(Classification::from)
}

/// Determines the project type of `dir`
pub fn detect_project_type(dir: &Path) -> Option<ProjectType> {
    if !dir.is_dir() {
        debug!("Not a directory: {}", dir.display());
        return None;
    }

    if let Some(project_type) = PackageManifest::read(dir).and_then(|m| m.framework()) {
        debug!("{} classified as {} from manifest", dir.display(), project_type);
        return Some(project_type);
    }

    if let Some(project_type) = probe_required_files(dir) {
        debug!("{} classified as {} from marker files", dir.display(), project_type);
        return Some(project_type);
    }

    let project_type = loose_heuristics(dir);
    if let Some(project_type) = project_type {
        debug!("{} classified as {} from source files", dir.display(), project_type);
    }
    project_type
}

fn probe_required_files(dir: &Path) -> Option<ProjectType> {
    FILE_PROBE_ORDER.iter().copied().find(|project_type| {
        let profile = project_type.profile();
        if !profile.required_files.iter().all(|f| dir.join(f).is_file()) {
            return false;
        }
        // manage.py alone is not enough; the requirements must name Django,
        // spelled as the package is published
        *project_type != ProjectType::PythonDjango || requirements_mention_django(dir)
    })
}

fn requirements_mention_django(dir: &Path) -> bool {
    std::fs::read_to_string(dir.join("requirements.txt"))
        .map(|content| content.contains("Django"))
        .unwrap_or(false)
}

fn is_skipped(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| SKIPPED_DIRS.contains(&name))
            .unwrap_or(false)
}

fn loose_heuristics(dir: &Path) -> Option<ProjectType> {
    let extensions: BTreeSet<String> = WalkDir::new(dir)
        .max_depth(LOOSE_SCAN_MAX_DEPTH)
        .into_iter()
        .filter_entry(|e| !is_skipped(e))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.to_ascii_lowercase())
        })
        .collect();

    LOOSE_EXTENSIONS
        .iter()
        .find(|(ext, _)| extensions.contains(*ext))
        .map(|(_, project_type)| *project_type)
}
