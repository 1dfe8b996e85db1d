//! Variant discovery and selection
//!
//! Every `*.toml` file directly inside the config directory is a named
//! configuration. Variants are never merged: each one has its own graph and
//! its own state directory.

use crate::paths;
use crate::schema::VariantConfig;
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A loaded configuration variant
#[derive(Debug, Clone)]
pub struct Variant {
    pub name: String,
    pub path: PathBuf,
    pub config: VariantConfig,
}

impl Variant {
    /// Load a variant from a file; the name is the file stem
    pub fn load(path: &Path) -> Result<Self> {
        let name = variant_name(path)
            .with_context(|| format!("Invalid config file name: {}", path.display()))?;
        let config = VariantConfig::load(path)?;
        log::debug!(
            "Loaded variant '{}' with {} resources from {}",
            name,
            config.resources.len(),
            path.display()
        );
        Ok(Self {
            name,
            path: path.to_path_buf(),
            config,
        })
    }

    /// Directory holding this variant's recorded state
    pub fn state_dir(&self) -> Result<PathBuf> {
        paths::variant_state_dir(&self.name)
    }
}

fn variant_name(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// Find variant files in a directory, sorted by name
pub fn discover(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("Failed to read {}", dir.display()))?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "toml") {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Pick the configuration a command operates on
///
/// `--file` wins over `--variant`. With neither, the config directory must
/// hold exactly one variant.
pub fn select(variant: Option<&str>, file: Option<&Path>) -> Result<Variant> {
    if let Some(file) = file {
        return Variant::load(&paths::expand(&file.to_string_lossy()));
    }
    select_in(&paths::config_dir()?, variant)
}

/// Name of the variant a command operates on, without loading its config
///
/// State commands use this so records stay reachable while the config is
/// broken or gone.
pub fn select_name(variant: Option<&str>, file: Option<&Path>) -> Result<String> {
    if let Some(file) = file {
        return variant_name(file)
            .with_context(|| format!("Invalid config file name: {}", file.display()));
    }
    if let Some(name) = variant {
        return Ok(name.to_string());
    }
    let path = select_path_in(&paths::config_dir()?, None)?;
    variant_name(&path).with_context(|| format!("Invalid config file name: {}", path.display()))
}

fn select_in(dir: &Path, variant: Option<&str>) -> Result<Variant> {
    Variant::load(&select_path_in(dir, variant)?)
}

fn select_path_in(dir: &Path, variant: Option<&str>) -> Result<PathBuf> {
    if let Some(name) = variant {
        let path = dir.join(format!("{name}.toml"));
        if !path.exists() {
            bail!("Variant '{}' not found ({})", name, path.display());
        }
        return Ok(path);
    }

    let files = discover(dir)?;
    match files.as_slice() {
        [] => bail!(
            "No configuration found in {} (set {} or pass --file)",
            dir.display(),
            paths::ENV_CONFIG_DIR
        ),
        [only] => Ok(only.clone()),
        many => {
            let names: Vec<String> = many.iter().filter_map(|p| variant_name(p)).collect();
            bail!(
                "Multiple variants in {}; choose one with --variant: {}",
                dir.display(),
                names.join(", ")
            )
        }
    }
}
