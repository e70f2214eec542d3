//! Project type detection
//!
//! Classifies an application directory into one of the supported runtimes and
//! exposes the command templates and default port that go with it.
//!
//! Detection runs three passes, most specific first:
//! 1. **Package manifest** - UI framework dependencies win over server frameworks
//! 2. **Required files** - every file of a type's marker set must be present
//! 3. **Loose heuristics** - source file extensions found in a bounded walk

mod classifier;
mod profile;

pub use classifier::{classify, detect_project_type, Classification, PackageManifest};
pub use profile::{ProjectType, TypeProfile};
