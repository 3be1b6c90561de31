use std::{
    hash::{Hash, Hasher},
    path::{Path, PathBuf},
};

/// A helper for `build.rs` scripts to compute the revision of a service
/// definition.
///
/// The revision is reported next to the server descriptor so that a client
/// can tell which build of the server generated its bindings. It changes
/// whenever any of the hashed files changes or moves.
pub struct SourceDigest {
    root: PathBuf,
    paths: Vec<PathBuf>,
}

impl SourceDigest {
    /// Hash paths relative to the crate being built.
    pub fn new() -> Self {
        Self::with_root(".")
    }

    pub fn with_root<P: Into<PathBuf>>(root: P) -> Self {
        SourceDigest {
            root: root.into(),
            paths: Vec::new(),
        }
    }

    pub fn add_path<S: Into<PathBuf>>(&mut self, path: S) -> &mut Self {
        self.paths.push(path.into());
        self
    }

    pub fn add_glob<S: AsRef<str>>(&mut self, pattern: S) -> &mut Self {
        let pattern = self.root.join(pattern.as_ref());
        let pattern = pattern.to_string_lossy();
        let entries = glob::glob(&pattern).expect("failed to read glob pattern");
        for entry in entries {
            let path = entry.expect("failed to read glob entry");
            let rel = path.strip_prefix(&self.root).unwrap_or(&path).to_owned();
            self.paths.push(rel);
        }
        self
    }

    /// Tell cargo to rerun the build script when any hashed file changes.
    pub fn emit_rerun_if_changed(&mut self) -> &mut Self {
        for path in self.paths.iter() {
            println!("cargo:rerun-if-changed={}", self.root.join(path).display());
        }
        self
    }

    pub fn compute(&mut self) -> String {
        self.paths.sort();
        self.paths.dedup();

        let mut hasher = fnv::FnvHasher::default();
        for path in self.paths.iter() {
            normalized(path).hash(&mut hasher);
            std::fs::read(self.root.join(path))
                .unwrap_or_else(|e| panic!("could not read {:?}: {}", path, e))
                .hash(&mut hasher);
        }

        format!("{:08x}", hasher.finish() & 0xffffffff)
    }
}

impl Default for SourceDigest {
    fn default() -> Self {
        Self::new()
    }
}

fn normalized(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(root: &Path) -> String {
        SourceDigest::with_root(root).add_glob("src/**/*.rs").compute()
    }

    #[test]
    fn stable_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "fn a() {}").unwrap();

        let first = digest(dir.path());
        assert_eq!(first.len(), 8);
        assert_eq!(first, digest(dir.path()));
    }

    #[test]
    fn changes_with_content_and_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "fn a() {}").unwrap();
        let before = digest(dir.path());

        std::fs::write(dir.path().join("src/lib.rs"), "fn b() {}").unwrap();
        let edited = digest(dir.path());
        assert_ne!(before, edited);

        std::fs::rename(dir.path().join("src/lib.rs"), dir.path().join("src/api.rs")).unwrap();
        assert_ne!(edited, digest(dir.path()));
    }
}
