//! End-to-end runs of the `userredis` binary against a sandboxed settings file.
//!
//! The instance user and the privileged user are both the account running the
//! tests, so ownership changes succeed without root. Service and redis tools
//! point at paths that do not exist, which exercises the degraded paths.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn current_user() -> String {
    let out = Command::new("id").arg("-un").output().expect("run id");
    String::from_utf8(out.stdout).expect("utf8").trim().to_string()
}

struct Sandbox {
    root: TempDir,
    me: String,
}

impl Sandbox {
    fn new() -> Self {
        Self::with_admin(None)
    }

    /// `admin` overrides the privileged user; defaults to the test runner.
    fn with_admin(admin: Option<&str>) -> Self {
        let root = TempDir::new().expect("sandbox");
        let me = current_user();
        let sandbox = Self { root, me };
        fs::create_dir_all(sandbox.home()).unwrap();
        fs::create_dir_all(sandbox.packages()).unwrap();
        fs::write(
            sandbox.packages().join("default.conf"),
            "maxmemory 128mb\nmaxmemory-policy allkeys-lru\n",
        )
        .unwrap();
        sandbox.write_users(&[(sandbox.me.as_str(), "premium")]);
        sandbox.write_config(admin.unwrap_or(sandbox.me.as_str()), "/nonexistent/systemctl");
        sandbox
    }

    fn home(&self) -> PathBuf {
        self.root.path().join("home")
    }

    fn packages(&self) -> PathBuf {
        self.root.path().join("packages")
    }

    fn config(&self) -> PathBuf {
        self.root.path().join("config.yaml")
    }

    fn users_json(&self) -> PathBuf {
        self.root.path().join("users.json")
    }

    fn conf_of(&self, user: &str) -> PathBuf {
        self.home().join(user).join("redis").join("redis.conf")
    }

    fn write_users(&self, users: &[(&str, &str)]) {
        let body = users
            .iter()
            .map(|(name, package)| format!(r#""{name}": {{"PACKAGE": "{package}"}}"#))
            .collect::<Vec<_>>()
            .join(", ");
        fs::write(self.users_json(), format!("{{{body}}}")).unwrap();
    }

    fn write_config(&self, admin: &str, systemctl: &str) {
        let users = self.users_json().display().to_string();
        let yaml = format!(
            r#"home_root: "{home}"
packages_dir: "{packages}"
privileged_user: "{admin}"
systemctl: "{systemctl}"
redis_cli: /nonexistent/redis-cli
redis_server: /nonexistent/redis-server
runuser: /nonexistent/runuser
list_users_command: ["cat", "{users}"]
show_user_command: ["cat", "{users}"]
command_timeout_secs: 5
status_socket: "{socket}"
unit_dir: "{units}"
"#,
            home = self.home().display(),
            packages = self.packages().display(),
            socket = self.root.path().join("status.sock").display(),
            units = self.root.path().join("units").display(),
        );
        fs::write(self.config(), yaml).unwrap();
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("userredis"));
        cmd.env("USERREDIS_CONFIG", self.config())
            .env("RUST_LOG", "warn");
        cmd
    }
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).expect("read file")
}

// ---------------------------------------------------------------------------
// redis-admin
// ---------------------------------------------------------------------------

#[test]
fn get_packages_prints_json_map() {
    let sb = Sandbox::new();
    let assert = sb
        .cmd()
        .args(["redis-admin", "get_packages"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let packages: serde_json::Value = serde_json::from_str(stdout.trim()).expect("json");
    assert_eq!(
        packages["default"],
        serde_json::json!("maxmemory 128mb\nmaxmemory-policy allkeys-lru\n")
    );
}

#[test]
fn save_package_updates_bound_users() {
    let sb = Sandbox::new();
    sb.cmd()
        .args(["redis-admin", "save_package", "premium", "maxmemory 512mb\n"])
        .assert()
        .success()
        .stdout(contains("Package 'premium' saved; 1 user(s) updated."));

    assert_eq!(read(&sb.packages().join("premium.conf")), "maxmemory 512mb\n");
    let conf = read(&sb.conf_of(&sb.me));
    assert!(conf.starts_with("port 0\nunixsocket "));
    assert!(conf.ends_with("maxmemory 512mb\n"));
}

#[test]
fn invalid_package_name_is_rejected() {
    let sb = Sandbox::new();
    sb.cmd()
        .args(["redis-admin", "save_package", "***", "maxmemory 1mb"])
        .assert()
        .failure()
        .stderr(contains("Invalid package name: '***'"));
    assert!(!sb.packages().join(".conf").exists());
}

#[test]
fn default_package_cannot_be_deleted() {
    let sb = Sandbox::new();
    sb.cmd()
        .args(["redis-admin", "delete_package", "default"])
        .assert()
        .failure()
        .stderr(contains("Cannot delete default package."));
    assert!(sb.packages().join("default.conf").exists());
}

#[test]
fn delete_package_reports_outcome() {
    let sb = Sandbox::new();
    fs::write(sb.packages().join("basic.conf"), "maxmemory 64mb\n").unwrap();
    sb.cmd()
        .args(["redis-admin", "delete-package", "basic"])
        .assert()
        .success()
        .stdout(contains("Package 'basic' deleted."));
    sb.cmd()
        .args(["redis-admin", "delete_package", "basic"])
        .assert()
        .success()
        .stdout(contains("does not exist"));
}

#[test]
fn admin_verbs_need_the_privileged_user() {
    let sb = Sandbox::with_admin(Some("someone-else"));
    sb.cmd()
        .args(["redis-admin", "save_package", "premium", "maxmemory 1mb"])
        .assert()
        .failure()
        .stderr(contains("Permission denied."));
    assert!(!sb.packages().join("premium.conf").exists());
}

// ---------------------------------------------------------------------------
// redis
// ---------------------------------------------------------------------------

#[test]
fn status_degrades_without_service_manager() {
    let sb = Sandbox::new();
    sb.cmd()
        .args(["redis", "get_user_redis_info", sb.me.as_str()])
        .assert()
        .success()
        .stdout("{\"status\":\"inactive\",\"memory\":\"N/A\"}\n");
}

#[test]
fn service_verbs_swallow_failures() {
    let sb = Sandbox::new();
    for verb in ["enable", "disable", "restart"] {
        sb.cmd()
            .args(["redis", verb, sb.me.as_str()])
            .assert()
            .success()
            .stdout(predicate::str::is_empty());
    }
}

#[test]
fn provision_user_uses_bound_package() {
    let sb = Sandbox::new();
    fs::write(sb.packages().join("premium.conf"), "maxmemory 1gb\n").unwrap();
    sb.cmd()
        .args(["redis", "provision_user", sb.me.as_str()])
        .assert()
        .success();
    assert!(read(&sb.conf_of(&sb.me)).ends_with("maxmemory 1gb\n"));
}

#[test]
fn provision_unknown_user_is_a_no_op() {
    let sb = Sandbox::new();
    sb.cmd()
        .args(["redis", "provision_user", "ghost"])
        .assert()
        .success();
    assert!(!sb.home().join("ghost").exists());
}

#[test]
fn malformed_usernames_are_rejected() {
    let sb = Sandbox::new();
    sb.cmd()
        .args(["redis", "enable", "../etc"])
        .assert()
        .failure()
        .stderr(contains("Invalid username"));
}

// ---------------------------------------------------------------------------
// hooks, install, doctor, settings
// ---------------------------------------------------------------------------

#[test]
fn user_deleted_hook_removes_instance() {
    let sb = Sandbox::new();
    sb.cmd()
        .args(["hook", "user-changed", sb.me.as_str(), "premium"])
        .assert()
        .success();
    assert!(sb.conf_of(&sb.me).exists());

    sb.cmd()
        .args(["hook", "user-deleted", sb.me.as_str()])
        .assert()
        .success();
    assert!(!sb.home().join(&sb.me).join("redis").exists());
}

#[test]
fn install_writes_template_unit() {
    let sb = Sandbox::new();
    sb.write_config(&sb.me, "true");
    fs::remove_file(sb.packages().join("default.conf")).unwrap();

    sb.cmd()
        .arg("install")
        .assert()
        .success()
        .stdout(contains("installed systemd unit"))
        .stdout(contains("created default package"));

    let unit = read(&sb.root.path().join("units").join("redis-user@.service"));
    assert!(unit.contains("ExecStart=/nonexistent/redis-server "));
    assert_eq!(
        read(&sb.packages().join("default.conf")),
        "maxmemory 128mb\nmaxmemory-policy allkeys-lru\n"
    );

    sb.cmd()
        .arg("uninstall")
        .assert()
        .success()
        .stdout(contains("removed systemd unit"));
}

#[test]
fn doctor_lists_missing_tools() {
    let sb = Sandbox::new();
    let assert = sb.cmd().args(["doctor", "--json"]).assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let report: serde_json::Value = serde_json::from_str(&stdout).expect("json");
    assert_eq!(report["ok"], serde_json::json!(false));
    let missing = report["missing"].as_array().expect("missing array");
    assert!(missing.contains(&serde_json::json!("/nonexistent/systemctl")));
    assert!(!missing.contains(&serde_json::json!("cat")));
}

#[test]
fn malformed_settings_name_the_file() {
    let sb = Sandbox::new();
    fs::write(sb.config(), "home_root: [unterminated\n").unwrap();
    sb.cmd()
        .args(["redis-admin", "get_packages"])
        .assert()
        .failure()
        .stderr(contains("config.yaml"));
}

#[test]
fn daemon_status_when_not_running() {
    let sb = Sandbox::new();
    sb.cmd()
        .args(["daemon", "status"])
        .assert()
        .success()
        .stdout(contains("\"running\": false"));
}
