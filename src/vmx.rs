//! VMX files: locating the one that describes a VM, and editing it in place.

use std::path::{Path, PathBuf};

use crate::error::WsfusionError;
use crate::paths;

pub const VMX_EXTENSION: &str = ".vmx";

/// Resolve a user-supplied path to the VMX file describing a VM.
///
/// Accepts either the VMX itself or the VM's directory, in which case the
/// first `*.vmx` entry in listing order wins. A path that exists but is
/// neither a directory nor named `*.vmx` is returned unchanged: callers may
/// point straight at a config file with an unusual name.
pub fn resolve(input: &Path) -> Option<PathBuf> {
    let path = paths::absolutize(input);

    if !path.exists() {
        return None;
    }

    if has_vmx_extension(&path) || !path.is_dir() {
        return Some(path);
    }

    let entries = std::fs::read_dir(&path).ok()?;
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| has_vmx_extension(p))
}

fn has_vmx_extension(path: &Path) -> bool {
    path.to_string_lossy().ends_with(VMX_EXTENSION)
}

/// Rewrite every `key = ...` line of a VMX file to `key = "value"`.
///
/// Only lines whose key starts the line (optionally followed by whitespace)
/// and is then followed by `=` are replaced; all other lines are written
/// back verbatim, in order.
pub fn set_variable(vmx: &Path, key: &str, value: &str) -> Result<(), WsfusionError> {
    let contents = std::fs::read_to_string(vmx).map_err(|source| WsfusionError::Io {
        context: format!("reading {}", vmx.display()),
        source,
    })?;

    let rewritten = rewrite_variable(&contents, key, value);

    std::fs::write(vmx, rewritten).map_err(|source| WsfusionError::Io {
        context: format!("writing {}", vmx.display()),
        source,
    })?;

    tracing::debug!(vmx = %vmx.display(), key, value, "updated vmx variable");
    Ok(())
}

fn rewrite_variable(contents: &str, key: &str, value: &str) -> String {
    let mut out = String::with_capacity(contents.len());
    for line in contents.split_inclusive('\n') {
        if line_sets_key(line, key) {
            out.push_str(&format!("{key} = \"{value}\"\n"));
        } else {
            out.push_str(line);
        }
    }
    out
}

fn line_sets_key(line: &str, key: &str) -> bool {
    line.strip_prefix(key)
        .map(|rest| rest.trim_start().starts_with('='))
        .unwrap_or(false)
}
