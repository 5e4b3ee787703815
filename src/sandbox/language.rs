use std::path::{Path, PathBuf};

use crate::models::Language;

/// Per-language launch recipe: how each backend turns a source file into a
/// running program. `-I` puts CPython in isolated mode (no user site
/// packages, no PYTHON* env influence).
#[derive(Debug, Clone)]
pub struct LanguageSpec {
    pub source_name: &'static str,
    pub interpreter: &'static [&'static str],
    pub docker_image: &'static str,
    pub docker_script: &'static str,
}

impl LanguageSpec {
    pub fn for_language(language: Language) -> Self {
        match language {
            Language::Python => Self {
                source_name: "main.py",
                interpreter: &["python3", "-I"],
                docker_image: "python:3.12-alpine",
                docker_script: "python3 -I /workspace/main.py",
            },
        }
    }

    pub fn source_path(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(self.source_name)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::LanguageSpec;
    use crate::models::Language;

    #[test]
    fn python_spec_places_source_in_work_dir() {
        let spec = LanguageSpec::for_language(Language::Python);
        assert_eq!(
            spec.source_path(Path::new("/tmp/run-1")),
            Path::new("/tmp/run-1/main.py")
        );
        assert_eq!(spec.interpreter[0], "python3");
    }
}
