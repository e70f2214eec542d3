//! Supported project types and their command templates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Runtime classification of a project directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProjectType {
    #[serde(rename = "nodejs")]
    NodeJs,
    #[serde(rename = "python-flask")]
    PythonFlask,
    #[serde(rename = "python-django")]
    PythonDjango,
    #[serde(rename = "php")]
    Php,
    #[serde(rename = "static")]
    Static,
    #[serde(rename = "react")]
    React,
    #[serde(rename = "vue")]
    Vue,
}

/// Static description of a project type.
///
/// Command templates may contain `{port}`, `{python}` and `{pip}` placeholders,
/// filled in when the concrete command is built for the host platform.
#[derive(Debug, Clone, Copy)]
pub struct TypeProfile {
    pub project_type: ProjectType,
    /// Files that must all exist at the project root
    pub required_files: &'static [&'static str],
    pub start_command: &'static str,
    pub build_command: Option<&'static str>,
    pub default_port: u16,
}

const NODEJS: TypeProfile = TypeProfile {
    project_type: ProjectType::NodeJs,
    required_files: &["package.json"],
    start_command: "npm start",
    build_command: Some("npm install"),
    default_port: 3000,
};

const PYTHON_FLASK: TypeProfile = TypeProfile {
    project_type: ProjectType::PythonFlask,
    required_files: &["requirements.txt"],
    start_command: "{python} -m flask run --host=127.0.0.1 --port={port}",
    build_command: Some("{pip} install -r requirements.txt"),
    default_port: 5000,
};

const PYTHON_DJANGO: TypeProfile = TypeProfile {
    project_type: ProjectType::PythonDjango,
    required_files: &["manage.py", "requirements.txt"],
    start_command: "{python} manage.py runserver 0.0.0.0:{port}",
    build_command: Some("{pip} install -r requirements.txt"),
    default_port: 8000,
};

const PHP: TypeProfile = TypeProfile {
    project_type: ProjectType::Php,
    required_files: &["index.php"],
    start_command: "php -S 0.0.0.0:{port}",
    build_command: None,
    default_port: 8080,
};

const STATIC: TypeProfile = TypeProfile {
    project_type: ProjectType::Static,
    required_files: &["index.html"],
    start_command: "npx --yes serve -l {port}",
    build_command: None,
    default_port: 8080,
};

const REACT: TypeProfile = TypeProfile {
    project_type: ProjectType::React,
    required_files: &["package.json"],
    start_command: "npm start",
    build_command: Some("npm install && npm run build"),
    default_port: 3000,
};

const VUE: TypeProfile = TypeProfile {
    project_type: ProjectType::Vue,
    required_files: &["package.json"],
    start_command: "npm run serve",
    build_command: Some("npm install && npm run build"),
    default_port: 8080,
};

/// Order of the required-file pass. Django precedes Flask because its marker
/// set is a superset of Flask's. React and Vue are only recognised through the
/// package manifest, so they are absent here.
pub(crate) const FILE_PROBE_ORDER: &[ProjectType] = &[
    ProjectType::PythonDjango,
    ProjectType::PythonFlask,
    ProjectType::NodeJs,
    ProjectType::Php,
    ProjectType::Static,
];

impl ProjectType {
    pub fn all() -> &'static [ProjectType] {
        &[
            ProjectType::NodeJs,
            ProjectType::PythonFlask,
            ProjectType::PythonDjango,
            ProjectType::Php,
            ProjectType::Static,
            ProjectType::React,
            ProjectType::Vue,
        ]
    }

    pub fn profile(&self) -> &'static TypeProfile {
        match self {
            ProjectType::NodeJs => &NODEJS,
            ProjectType::PythonFlask => &PYTHON_FLASK,
            ProjectType::PythonDjango => &PYTHON_DJANGO,
            ProjectType::Php => &PHP,
            ProjectType::Static => &STATIC,
            ProjectType::React => &REACT,
            ProjectType::Vue => &VUE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectType::NodeJs => "nodejs",
            ProjectType::PythonFlask => "python-flask",
            ProjectType::PythonDjango => "python-django",
            ProjectType::Php => "php",
            ProjectType::Static => "static",
            ProjectType::React => "react",
            ProjectType::Vue => "vue",
        }
    }

    pub fn is_python(&self) -> bool {
        matches!(self, ProjectType::PythonFlask | ProjectType::PythonDjango)
    }

    pub fn is_node(&self) -> bool {
        matches!(self, ProjectType::NodeJs | ProjectType::React | ProjectType::Vue)
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProjectType::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown project type: {}", s))
    }
}
