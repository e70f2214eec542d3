//! Projects directory scanner
//!
//! Every immediate subdirectory of the projects directory is a candidate
//! project. Candidates the detector cannot classify are skipped.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::detect::{detect_project_type, PackageManifest, ProjectType};
use crate::errors::BerthError;
use crate::filesys::dir::Dir;
use crate::models::project::NewProject;

/// Version reported for projects without a manifest version
pub const DEFAULT_VERSION: &str = "1.0.0";

/// A classified project directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannedProject {
    /// Directory name
    pub name: String,

    pub path: PathBuf,

    pub project_type: ProjectType,

    pub description: Option<String>,

    pub version: String,
}

impl From<ScannedProject> for NewProject {
    fn from(scanned: ScannedProject) -> Self {
        NewProject {
            name: scanned.name,
            path: scanned.path,
            project_type: scanned.project_type,
            description: scanned.description,
        }
    }
}

/// Classifies one directory. `None` when it holds nothing runnable.
pub fn scan_project(path: &Path) -> Option<ScannedProject> {
    let name = path.file_name()?.to_string_lossy().into_owned();
    let project_type = detect_project_type(path)?;
    let manifest = PackageManifest::read(path).unwrap_or_default();

    Some(ScannedProject {
        name,
        path: path.to_path_buf(),
        project_type,
        description: manifest.description.filter(|d| !d.trim().is_empty()),
        version: manifest
            .version
            .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
    })
}

/// Scan the projects directory, sorted by name
pub async fn scan_projects(projects_dir: &Dir) -> Result<Vec<ScannedProject>, BerthError> {
    let candidates = projects_dir.list_dirs().await?;
    info!(
        "Scanning {} candidate projects in {}",
        candidates.len(),
        projects_dir.path().display()
    );

    // Detection walks the tree synchronously
    let projects = tokio::task::spawn_blocking(move || {
        candidates
            .iter()
            .filter_map(|path| {
                let scanned = scan_project(path);
                if scanned.is_none() {
                    debug!("Skipping unclassifiable directory {}", path.display());
                }
                scanned
            })
            .collect::<Vec<_>>()
    })
    .await?;

    info!("Scan complete: {} projects found", projects.len());
    Ok(projects)
}
