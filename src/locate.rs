//! Finding `vmrun` and describing where each VMware product keeps things.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const VMRUN: &str = "vmrun";

/// Where a VMware product installs itself and how it names VM directories.
///
/// Detection only probes the filesystem, so alternate layouts can be added
/// without touching the locator or the orchestrator.
pub trait HypervisorLayout {
    fn name(&self) -> &'static str;

    /// Known installation roots, in probe order.
    fn install_dirs(&self) -> &[PathBuf];

    /// Location of the control executable relative to an install root.
    fn control_subpath(&self) -> &Path;

    /// Appended to the VM name when creating its directory.
    fn vm_dir_suffix(&self) -> &str {
        ""
    }

    fn is_installed(&self) -> bool {
        self.install_dirs().iter().any(|d| d.is_dir())
    }

    fn vm_dir_name(&self, vm_name: &str) -> String {
        format!("{vm_name}{}", self.vm_dir_suffix())
    }
}

/// VMware Fusion on macOS: app bundles under `/Applications`, VMs stored as
/// `<name>.vmwarevm` bundles.
pub struct Fusion {
    install_dirs: Vec<PathBuf>,
    control: PathBuf,
}

impl Fusion {
    pub fn with_install_dirs(install_dirs: Vec<PathBuf>) -> Self {
        Self {
            install_dirs,
            control: Path::new("Contents").join("Library").join(VMRUN),
        }
    }
}

impl Default for Fusion {
    fn default() -> Self {
        Self::with_install_dirs(vec![
            PathBuf::from("/Applications/VMware Fusion Tech Preview.app"),
            PathBuf::from("/Applications/VMware Fusion.app"),
        ])
    }
}

impl HypervisorLayout for Fusion {
    fn name(&self) -> &'static str {
        "fusion"
    }

    fn install_dirs(&self) -> &[PathBuf] {
        &self.install_dirs
    }

    fn control_subpath(&self) -> &Path {
        &self.control
    }

    fn vm_dir_suffix(&self) -> &str {
        ".vmwarevm"
    }
}

/// VMware Workstation. On Linux vmrun lives on `PATH`, so only the Windows
/// install roots are probed.
pub struct Workstation {
    install_dirs: Vec<PathBuf>,
    control: PathBuf,
}

impl Default for Workstation {
    fn default() -> Self {
        let install_dirs = if cfg!(windows) {
            vec![
                PathBuf::from(r"C:\Program Files (x86)\VMware\VMware Workstation"),
                PathBuf::from(r"C:\Program Files\VMware\VMware Workstation"),
            ]
        } else {
            Vec::new()
        };
        let control = if cfg!(windows) { "vmrun.exe" } else { VMRUN };
        Self {
            install_dirs,
            control: PathBuf::from(control),
        }
    }
}

impl HypervisorLayout for Workstation {
    fn name(&self) -> &'static str {
        "workstation"
    }

    fn install_dirs(&self) -> &[PathBuf] {
        &self.install_dirs
    }

    fn control_subpath(&self) -> &Path {
        &self.control
    }
}

/// Pick the layout of the installed product: Fusion when any of its bundles
/// exists, Workstation otherwise.
pub fn detect_layout() -> Box<dyn HypervisorLayout> {
    let fusion = Fusion::default();
    if fusion.is_installed() {
        Box::new(fusion)
    } else {
        Box::new(Workstation::default())
    }
}

/// Locate vmrun: explicit override, then `PATH`, then the layout's install dirs.
pub fn locate_vmrun(override_path: Option<&Path>, layout: &dyn HypervisorLayout) -> Option<PathBuf> {
    locate_with_search_path(override_path, std::env::var_os("PATH"), layout)
}

fn locate_with_search_path(
    override_path: Option<&Path>,
    search_path: Option<OsString>,
    layout: &dyn HypervisorLayout,
) -> Option<PathBuf> {
    if let Some(path) = override_path {
        return Some(path.to_path_buf());
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    if let Ok(path) = which::which_in(VMRUN, search_path, cwd) {
        tracing::debug!(path = %path.display(), "found vmrun on PATH");
        return Some(path);
    }

    layout
        .install_dirs()
        .iter()
        .filter(|dir| dir.is_dir())
        .map(|dir| dir.join(layout.control_subpath()))
        .find(|candidate| is_executable(candidate))
        .inspect(|path| {
            tracing::debug!(layout = layout.name(), path = %path.display(), "found vmrun in install dir");
        })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
