//! Project type detection tests

use std::fs;
use std::path::Path;

use berth::detect::{classify, detect_project_type, ProjectType};
use tempfile::TempDir;

fn write(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

#[test]
fn test_flask_requirements_only() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "requirements.txt", "Flask==2.3.3\n");

    let classification = classify(dir.path()).unwrap();
    assert_eq!(classification.project_type, ProjectType::PythonFlask);
    assert_eq!(classification.default_port, 5000);
    assert!(classification.build_command.is_some());
}

#[test]
fn test_django_needs_framework_in_requirements() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "manage.py", "#!/usr/bin/env python\n");
    write(dir.path(), "requirements.txt", "Django==4.2\n");

    let classification = classify(dir.path()).unwrap();
    assert_eq!(classification.project_type, ProjectType::PythonDjango);
    assert_eq!(classification.default_port, 8000);
}

#[test]
fn test_manage_py_without_django_falls_through() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "manage.py", "#!/usr/bin/env python\n");
    write(dir.path(), "requirements.txt", "requests==2.31\n");

    let project_type = detect_project_type(dir.path());
    assert_ne!(project_type, Some(ProjectType::PythonDjango));
    assert_eq!(project_type, Some(ProjectType::PythonFlask));
}

#[test]
fn test_lowercase_django_helper_is_not_django() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "manage.py", "#!/usr/bin/env python\n");
    write(dir.path(), "requirements.txt", "flask==2.3\ndjango-environ==0.11\n");

    assert_eq!(
        detect_project_type(dir.path()),
        Some(ProjectType::PythonFlask)
    );
}

#[test]
fn test_manifest_frameworks() {
    let react = TempDir::new().unwrap();
    write(react.path(), "package.json", r#"{"dependencies":{"react":"^18","react-dom":"^18"}}"#);
    assert_eq!(detect_project_type(react.path()), Some(ProjectType::React));

    let vue = TempDir::new().unwrap();
    write(vue.path(), "package.json", r#"{"dependencies":{"vue":"^3"}}"#);
    let classification = classify(vue.path()).unwrap();
    assert_eq!(classification.project_type, ProjectType::Vue);
    assert_eq!(classification.default_port, 8080);

    let api = TempDir::new().unwrap();
    write(api.path(), "package.json", r#"{"dependencies":{"fastify":"^4"}}"#);
    assert_eq!(detect_project_type(api.path()), Some(ProjectType::NodeJs));
}

#[test]
fn test_marker_files() {
    let php = TempDir::new().unwrap();
    write(php.path(), "index.php", "<?php echo 'hi';");
    let classification = classify(php.path()).unwrap();
    assert_eq!(classification.project_type, ProjectType::Php);
    assert!(classification.build_command.is_none());

    let site = TempDir::new().unwrap();
    write(site.path(), "index.html", "<html></html>");
    assert_eq!(detect_project_type(site.path()), Some(ProjectType::Static));
}

#[test]
fn test_loose_heuristics_by_extension() {
    let python = TempDir::new().unwrap();
    write(python.path(), "src/server.py", "print('hi')");
    write(python.path(), "public/page.html", "<html></html>");
    assert_eq!(detect_project_type(python.path()), Some(ProjectType::PythonFlask));

    let pages = TempDir::new().unwrap();
    write(pages.path(), "docs/about.html", "<html></html>");
    write(pages.path(), "docs/app.js", "console.log(1)");
    assert_eq!(detect_project_type(pages.path()), Some(ProjectType::Static));

    let script = TempDir::new().unwrap();
    write(script.path(), "lib/main.js", "console.log(1)");
    assert_eq!(detect_project_type(script.path()), Some(ProjectType::NodeJs));
}

#[test]
fn test_dependency_directories_are_ignored() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "node_modules/pkg/index.js", "module.exports = 1");
    write(dir.path(), ".git/hooks/hook.py", "pass");
    assert_eq!(detect_project_type(dir.path()), None);
}

#[test]
fn test_unclassifiable_directory() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "README.md", "# nothing to run");
    assert!(classify(dir.path()).is_none());
    assert!(classify(&dir.path().join("missing")).is_none());
}
