use std::path::{Component, Path, PathBuf};

/// Default settings file: `~/.config/wsfusion/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wsfusion")
        .join("config.toml")
}

/// Directory that holds VM directories, derived from a source VMX:
/// `/vms/base/base.vmx` → `/vms`.
pub fn vms_dir(src_vmx: &Path) -> Option<&Path> {
    src_vmx
        .parent()
        .and_then(Path::parent)
        .filter(|p| !p.as_os_str().is_empty())
}

/// Path to the VMX of a newly created VM: `<vm dir>/<name>.vmx`.
pub fn dest_vmx_path(vm_dir: &Path, name: &str) -> PathBuf {
    vm_dir.join(format!("{name}.vmx"))
}

/// Per-VM log file written during `create`.
pub fn log_path(vm_dir: &Path) -> PathBuf {
    vm_dir.join("wsfusion.log")
}

/// Expand a leading `~`, make the path absolute against the current dir and
/// fold away `.` and `..` segments.
pub fn absolutize(path: &Path) -> PathBuf {
    let expanded = match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    };
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(&expanded))
            .unwrap_or(expanded)
    };
    normalize(&absolute)
}

/// Lexical cleanup: `..` drops the previous segment, `..` at the root stays
/// at the root. Symlinks are not consulted.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
