#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ModelError;
use crate::model::{ProgramModel, Snapshot};

/// Where the front end writes its snapshot, relative to the analyzed root.
pub const DEFAULT_SNAPSHOT: &str = ".mutex-check/program.json";

#[derive(Clone, Debug, Default)]
pub struct LoadConfig {
    /// Root package directory.
    pub root: PathBuf,
    /// Explicit snapshot path; defaults to `<root>/.mutex-check/program.json`.
    pub snapshot: Option<PathBuf>,
    /// Root module prefix override.
    pub module: Option<String>,
    /// Build flags the caller expects the snapshot to have been produced with.
    pub build_flags: Vec<String>,
}

impl LoadConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        match &self.snapshot {
            Some(p) => p.clone(),
            None => self.root.join(DEFAULT_SNAPSHOT),
        }
    }
}

/// Load the program model for `config.root`.
///
/// Only packages inside the root module take part in annotation scanning.
/// The module is the configured override, else the `module` line of
/// `<root>/go.mod`, else the module recorded in the snapshot.
pub fn resolve(config: &LoadConfig) -> Result<ProgramModel, ModelError> {
    let path = config.snapshot_path();
    let raw = fs::read_to_string(&path).map_err(|source| ModelError::Io {
        path: path.clone(),
        source,
    })?;
    let snapshot: Snapshot = serde_json::from_str(&raw).map_err(|source| ModelError::Parse {
        path: path.clone(),
        source,
    })?;

    if !config.build_flags.is_empty() && config.build_flags != snapshot.build_flags {
        tracing::warn!(
            expected = ?config.build_flags,
            recorded = ?snapshot.build_flags,
            "snapshot was produced with different build flags"
        );
    }

    let module = config
        .module
        .clone()
        .or_else(|| root_module(&config.root))
        .or_else(|| snapshot.module.clone());

    let mut model = ProgramModel::from_snapshot(snapshot)?;
    if let Some(prefix) = module {
        tracing::debug!(module = %prefix, "restricting analysis to root module");
        model.restrict_to_module(&prefix);
    }
    tracing::debug!(
        functions = model.snapshot().functions.len(),
        edges = model.snapshot().edges.len(),
        "program model loaded"
    );
    Ok(model)
}

/// Module path declared by `dir/go.mod`, if any.
pub fn root_module(dir: &Path) -> Option<String> {
    let raw = fs::read_to_string(dir.join("go.mod")).ok()?;
    raw.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("module")?;
        let name = rest.trim().trim_matches('"');
        (!name.is_empty()).then(|| name.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::PackageId;

    const SNAPSHOT: &str = r#"{
        "module": "example.com/recorded",
        "build_flags": ["-tags=prod"],
        "packages": [
            {"path": "example.com/app"},
            {"path": "example.com/other"}
        ],
        "files": [{"path": "app/main.go", "package": 0}],
        "functions": [{"name": "example.com/app.main", "package": 0}]
    }"#;

    fn write_root(snapshot: &str, go_mod: Option<&str>) -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join(".mutex-check")).expect("mkdir");
        fs::write(dir.path().join(DEFAULT_SNAPSHOT), snapshot).expect("write snapshot");
        if let Some(m) = go_mod {
            fs::write(dir.path().join("go.mod"), m).expect("write go.mod");
        }
        dir
    }

    #[test]
    fn go_mod_module_restricts_packages() {
        let dir = write_root(SNAPSHOT, Some("module example.com/app\n\ngo 1.22\n"));
        let model = resolve(&LoadConfig::new(dir.path())).expect("load");
        assert!(model.is_analyzed(PackageId(0)));
        assert!(!model.is_analyzed(PackageId(1)));
    }

    #[test]
    fn override_beats_go_mod() {
        let dir = write_root(SNAPSHOT, Some("module example.com/app\n"));
        let mut cfg = LoadConfig::new(dir.path());
        cfg.module = Some("example.com/other".into());
        let model = resolve(&cfg).expect("load");
        assert!(!model.is_analyzed(PackageId(0)));
        assert!(model.is_analyzed(PackageId(1)));
    }

    #[test]
    fn recorded_module_is_last_resort() {
        let dir = write_root(SNAPSHOT, None);
        let model = resolve(&LoadConfig::new(dir.path())).expect("load");
        assert!(!model.is_analyzed(PackageId(0)));
    }

    #[test]
    fn missing_snapshot_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = resolve(&LoadConfig::new(dir.path())).expect_err("must fail");
        assert!(matches!(err, ModelError::Io { .. }), "{err}");
    }

    #[test]
    fn malformed_snapshot_is_parse_error() {
        let dir = write_root("{ not json", None);
        let err = resolve(&LoadConfig::new(dir.path())).expect_err("must fail");
        assert!(matches!(err, ModelError::Parse { .. }), "{err}");
    }

    #[test]
    fn root_module_accepts_quoted_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("go.mod"), "// comment\nmodule \"example.com/q\"\n").expect("write");
        assert_eq!(root_module(dir.path()).as_deref(), Some("example.com/q"));
    }
}
