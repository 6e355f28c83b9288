use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::path::{Path, PathBuf};

fn wsfusion() -> assert_cmd::Command {
    cargo_bin_cmd!("wsfusion").into()
}

/// Settings that keep tests fast: no settle pause after sshd answers.
fn write_settings(dir: &tempfile::TempDir, extra: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, format!("ssh_settle_delay_s = 0\n{extra}")).unwrap();
    path
}

/// `<tmp>/vms/base/base.vmx`
fn source_vm(dir: &tempfile::TempDir) -> PathBuf {
    let base = dir.path().join("vms").join("base");
    std::fs::create_dir_all(&base).unwrap();
    let vmx = base.join("base.vmx");
    std::fs::write(&vmx, "displayName = \"base\"\n").unwrap();
    vmx
}

#[test]
fn help_works() {
    wsfusion()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Provision VMware"));
}

#[test]
fn create_help_lists_flags() {
    wsfusion()
        .args(["create", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--vm-source-path"))
        .stdout(predicate::str::contains("--clone-type"))
        .stdout(predicate::str::contains("--chef-solo"));
}

#[test]
fn missing_required_flags_fail() {
    wsfusion()
        .args(["create", "--vm-name", "web"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--vm-source-path"));
}

#[test]
fn invalid_clone_type_fails() {
    wsfusion()
        .args([
            "create",
            "--vm-source-path",
            "/vms/base",
            "--vm-name",
            "web",
            "--clone-type",
            "deep",
        ])
        .assert()
        .failure();
}

#[test]
fn missing_explicit_config_fails() {
    wsfusion()
        .args([
            "--config",
            "/nonexistent/wsfusion.toml",
            "create",
            "--vm-source-path",
            "/vms/base",
            "--vm-name",
            "web",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}

#[test]
fn invalid_vm_name_fails() {
    let dir = tempfile::tempdir().unwrap();
    let settings = write_settings(&dir, "");
    wsfusion()
        .args(["--config", settings.to_str().unwrap()])
        .args(["create", "--vm-source-path", "/vms/base", "--vm-name", "../etc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("VM name must match"));
}

#[test]
fn missing_vmrun_fails() {
    let dir = tempfile::tempdir().unwrap();
    let settings = write_settings(&dir, "");
    let src = source_vm(&dir);
    wsfusion()
        .env("PATH", dir.path())
        .args(["--config", settings.to_str().unwrap()])
        .args(["create", "--vm-source-path", src.to_str().unwrap(), "--vm-name", "web"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unable to locate vmrun"));
}

#[cfg(unix)]
mod fake_tools {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::os::unix::fs::PermissionsExt;

    fn write_script(path: &Path, body: &str) {
        std::fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// A vmrun stand-in that appends each invocation to `vmrun.calls`.
    fn fake_vmrun(dir: &tempfile::TempDir, tools: &str, clone_exit: i32) -> (PathBuf, PathBuf) {
        let path = dir.path().join("vmrun");
        let calls = dir.path().join("vmrun.calls");
        write_script(
            &path,
            &format!(
                r#"echo "$@" >> {calls}
case "$1" in
  checkToolsState) echo {tools} ;;
  clone) exit {clone_exit} ;;
  start) exit 0 ;;
  getGuestIPAddress) echo 127.0.0.1 ;;
esac"#,
                calls = calls.display(),
            ),
        );
        (path, calls)
    }

    /// A knife stand-in that records its arguments to `knife.args`.
    fn fake_knife(dir: &tempfile::TempDir) -> (PathBuf, PathBuf) {
        let path = dir.path().join("knife");
        let record = dir.path().join("knife.args");
        write_script(&path, &format!("echo \"$@\" > {}", record.display()));
        (path, record)
    }

    /// Accepts connections and greets them with an SSH banner.
    fn fake_sshd() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::thread::spawn(move || {
            for mut stream in listener.incoming().flatten() {
                let _ = stream.write_all(b"SSH-2.0-OpenSSH_9.6\r\n");
            }
        });
        port
    }

    #[test]
    fn missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let settings = write_settings(&dir, "");
        let (vmrun, calls) = fake_vmrun(&dir, "installed", 0);
        let missing = dir.path().join("vms").join("nope");

        wsfusion()
            .args(["--config", settings.to_str().unwrap()])
            .args(["create", "--vm-source-path", missing.to_str().unwrap()])
            .args(["--vm-name", "web", "--vmrun-path", vmrun.to_str().unwrap()])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No VM was found"));
        assert!(!calls.exists());
    }

    #[test]
    fn tools_not_installed_stops_before_clone() {
        let dir = tempfile::tempdir().unwrap();
        let settings = write_settings(&dir, "");
        let src = source_vm(&dir);
        let (vmrun, calls) = fake_vmrun(&dir, "notInstalled", 0);

        wsfusion()
            .args(["--config", settings.to_str().unwrap()])
            .args(["create", "--vm-source-path", src.to_str().unwrap()])
            .args(["--vm-name", "web", "--vmrun-path", vmrun.to_str().unwrap()])
            .assert()
            .failure()
            .stderr(predicate::str::contains("VMware Tools"));

        let recorded = std::fs::read_to_string(&calls).unwrap();
        assert!(recorded.starts_with("checkToolsState"));
        assert!(!recorded.contains("clone"));
    }

    #[test]
    fn clone_failure_stops_before_power_on() {
        let dir = tempfile::tempdir().unwrap();
        let settings = write_settings(&dir, "");
        let src = source_vm(&dir);
        let (vmrun, calls) = fake_vmrun(&dir, "installed", 1);

        wsfusion()
            .args(["--config", settings.to_str().unwrap()])
            .args(["create", "--vm-source-path", src.to_str().unwrap()])
            .args(["--vm-name", "web", "--vmrun-path", vmrun.to_str().unwrap()])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unable to clone the VM"));

        let recorded = std::fs::read_to_string(&calls).unwrap();
        assert!(recorded.contains("clone"));
        assert!(!recorded.contains("start"));

        // vmrun's invocation is captured in the per-VM log.
        let log = dir.path().join("vms").join("web").join("wsfusion.log");
        let log = std::fs::read_to_string(log).unwrap();
        assert!(log.contains("exit code"));
    }

    #[test]
    fn existing_vm_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let settings = write_settings(&dir, "");
        let src = source_vm(&dir);
        std::fs::create_dir(dir.path().join("vms").join("web")).unwrap();
        let (vmrun, calls) = fake_vmrun(&dir, "installed", 0);

        wsfusion()
            .args(["--config", settings.to_str().unwrap()])
            .args(["create", "--vm-source-path", src.to_str().unwrap()])
            .args(["--vm-name", "web", "--vmrun-path", vmrun.to_str().unwrap()])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unable to create the VM directory"));
        assert!(!calls.exists());
    }

    #[test]
    fn create_clones_boots_and_bootstraps() {
        let dir = tempfile::tempdir().unwrap();
        let settings = write_settings(&dir, "");
        let src = source_vm(&dir);
        let (vmrun, calls) = fake_vmrun(&dir, "installed", 0);
        let (knife, knife_args) = fake_knife(&dir);
        let port = fake_sshd().to_string();

        wsfusion()
            .args(["--config", settings.to_str().unwrap()])
            .args(["create", "--vm-source-path", src.parent().unwrap().to_str().unwrap()])
            .args(["--vm-name", "web", "--vmrun-path", vmrun.to_str().unwrap()])
            .args(["--knife-path", knife.to_str().unwrap()])
            .args(["-p", &port, "-r", "role[web]", "--clone-snapshot-name", "clean"])
            .assert()
            .success()
            .stdout(predicate::str::contains("VM 'web' is up at 127.0.0.1"));

        let dest = dir.path().join("vms").join("web").join("web.vmx");
        let recorded = std::fs::read_to_string(&calls).unwrap();
        let lines: Vec<&str> = recorded.lines().collect();
        assert_eq!(
            lines,
            vec![
                format!("checkToolsState {}", src.display()),
                format!(
                    "clone {} {} linked -snapshot=clean",
                    src.display(),
                    dest.display()
                ),
                format!("start {} nogui", dest.display()),
                format!("getGuestIPAddress {} -wait", dest.display()),
            ]
        );

        let args = std::fs::read_to_string(&knife_args).unwrap();
        assert!(args.starts_with("bootstrap 127.0.0.1 --run-list role[web] --node-name web"));
        assert!(args.contains(&format!("--ssh-port {port}")));
        assert!(!args.contains("--sudo"));
    }

    /// Binds `port` only after `delay`, so the first connections are refused.
    fn late_sshd(port: u16, delay: std::time::Duration) {
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            let listener = TcpListener::bind(("127.0.0.1", port)).unwrap();
            for mut stream in listener.incoming().flatten() {
                let _ = stream.write_all(b"SSH-2.0-OpenSSH_9.6\r\n");
            }
        });
    }

    #[test]
    fn refused_ssh_is_retried_until_sshd_starts() {
        let dir = tempfile::tempdir().unwrap();
        let settings = write_settings(&dir, "");
        let src = source_vm(&dir);
        let (vmrun, _calls) = fake_vmrun(&dir, "installed", 0);
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        // Refused at ~0 s and ~2 s (each followed by the 2 s pause), up at ~4 s.
        late_sshd(port, std::time::Duration::from_millis(3500));

        let start = std::time::Instant::now();
        wsfusion()
            .args(["--config", settings.to_str().unwrap()])
            .args(["create", "--vm-source-path", src.to_str().unwrap()])
            .args(["--vm-name", "web", "--vmrun-path", vmrun.to_str().unwrap()])
            .args(["-p", &port.to_string(), "--chef-solo"])
            .assert()
            .success()
            // One `.` per refused attempt, on the line after the step label.
            .stdout(predicate::str::is_match(r"(?m)^\.\.").unwrap())
            .stdout(predicate::str::contains("Waiting for sshd... done"));
        assert!(start.elapsed() >= std::time::Duration::from_millis(3500));
    }

    #[test]
    fn chef_solo_skips_knife() {
        let dir = tempfile::tempdir().unwrap();
        let settings = write_settings(&dir, "");
        let src = source_vm(&dir);
        let (vmrun, _calls) = fake_vmrun(&dir, "running", 0);
        let (knife, knife_args) = fake_knife(&dir);
        let port = fake_sshd().to_string();

        wsfusion()
            .args(["--config", settings.to_str().unwrap()])
            .args(["create", "--vm-source-path", src.to_str().unwrap()])
            .args(["--vm-name", "db", "--vmrun-path", vmrun.to_str().unwrap()])
            .args(["--knife-path", knife.to_str().unwrap()])
            .args(["-p", &port, "--chef-solo"])
            .assert()
            .success();

        assert!(!knife_args.exists());
        assert!(dir.path().join("vms").join("db").join("wsfusion.log").exists());
    }

    #[test]
    fn settings_supply_knife_and_port() {
        let dir = tempfile::tempdir().unwrap();
        let src = source_vm(&dir);
        let (vmrun, _calls) = fake_vmrun(&dir, "installed", 0);
        let (knife, knife_args) = fake_knife(&dir);
        let port = fake_sshd();
        let settings = write_settings(
            &dir,
            &format!(
                "knife_path = \"{}\"\nssh_port = {port}\nenvironment = \"staging\"\n",
                knife.display()
            ),
        );

        wsfusion()
            .args(["--config", settings.to_str().unwrap()])
            .args(["create", "--vm-source-path", src.to_str().unwrap()])
            .args(["--vm-name", "web", "--vmrun-path", vmrun.to_str().unwrap()])
            .args(["-x", "deploy"])
            .assert()
            .success();

        let args = std::fs::read_to_string(&knife_args).unwrap();
        assert!(args.contains("--environment staging"));
        assert!(args.contains("--ssh-user deploy"));
        assert!(args.contains("--sudo"));
    }

    #[test]
    fn ssh_timeout_gives_up() {
        let dir = tempfile::tempdir().unwrap();
        let settings = write_settings(&dir, "");
        let src = source_vm(&dir);
        let (vmrun, _calls) = fake_vmrun(&dir, "installed", 0);
        // Bound then dropped: nothing listens on this port.
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
            .to_string();

        wsfusion()
            .args(["--config", settings.to_str().unwrap()])
            .args(["create", "--vm-source-path", src.to_str().unwrap()])
            .args(["--vm-name", "web", "--vmrun-path", vmrun.to_str().unwrap()])
            .args(["-p", &port, "--ssh-timeout", "1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("did not become reachable"));
    }
}
