#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use mutex_check_core::VariantKind;
use thiserror::Error;

pub const MANIFEST_FILE: &str = "mutex-check.toml";

#[derive(Debug, Error, Diagnostic)]
#[error("manifest error: {message}")]
#[diagnostic(code(mutex_check::manifest))]
pub struct ManifestError {
    pub message: String,
}

/// `[analysis]` settings with relative paths resolved against the manifest
/// directory. Unset values stay `None` so CLI flags and defaults can fill
/// them in.
#[derive(Clone, Debug, Default)]
pub struct ResolvedManifest {
    pub manifest_path: Option<PathBuf>,
    pub snapshot: Option<PathBuf>,
    pub module: Option<String>,
    pub variants: Option<Vec<VariantKind>>,
    pub parallel: Option<bool>,
    pub build_flags: Vec<String>,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    #[serde(default)]
    analysis: Option<Analysis>,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct Analysis {
    #[serde(default)]
    snapshot: Option<String>,

    #[serde(default)]
    module: Option<String>,

    #[serde(default)]
    variants: Option<Vec<VariantKind>>,

    #[serde(default)]
    parallel: Option<bool>,

    #[serde(default)]
    build_flags: Vec<String>,
}

pub fn find_manifest(start: &Path) -> Option<PathBuf> {
    let mut cur = if start.is_file() {
        start.parent()?.to_path_buf()
    } else {
        start.to_path_buf()
    };

    loop {
        let candidate = cur.join(MANIFEST_FILE);
        if candidate.exists() {
            return Some(candidate);
        }
        match cur.parent() {
            Some(p) => cur = p.to_path_buf(),
            None => return None,
        }
    }
}

pub fn load_resolved_manifest(start: &Path) -> Result<ResolvedManifest, ManifestError> {
    let Some(manifest_path) = find_manifest(start) else {
        return Ok(ResolvedManifest::default());
    };

    let manifest_dir = manifest_path
        .parent()
        .ok_or_else(|| ManifestError {
            message: "manifest has no parent directory".to_string(),
        })?
        .to_path_buf();

    let raw = fs::read_to_string(&manifest_path).map_err(|e| ManifestError {
        message: format!("failed to read {}: {e}", manifest_path.display()),
    })?;

    let parsed: Manifest = toml::from_str(&raw).map_err(|e| ManifestError {
        message: format!("failed to parse {}: {e}", manifest_path.display()),
    })?;
    tracing::debug!(manifest = %manifest_path.display(), "using manifest");

    let analysis = parsed.analysis.unwrap_or_default();
    let variants = analysis.variants.map(dedup_variants);
    if variants.as_ref().is_some_and(Vec::is_empty) {
        return Err(ManifestError {
            message: format!("{}: `analysis.variants` must not be empty", manifest_path.display()),
        });
    }

    Ok(ResolvedManifest {
        snapshot: analysis.snapshot.map(|p| resolve_path(&manifest_dir, &p)),
        module: analysis.module.filter(|m| !m.trim().is_empty()),
        variants,
        parallel: analysis.parallel,
        build_flags: analysis.build_flags,
        manifest_path: Some(manifest_path),
    })
}

fn resolve_path(base: &Path, p: &str) -> PathBuf {
    let pb = PathBuf::from(p);
    if pb.is_absolute() { pb } else { base.join(pb) }
}

// Keeps first occurrence order.
fn dedup_variants(v: Vec<VariantKind>) -> Vec<VariantKind> {
    let mut out = Vec::with_capacity(v.len());
    for kind in v {
        if !out.contains(&kind) {
            out.push(kind);
        }
    }
    out
}
