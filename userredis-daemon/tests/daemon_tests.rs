//! Status daemon over a real Unix socket, with in-memory ports.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use userredis_core::packages::DEFAULT_PACKAGE_CONTENT;
use userredis_core::{CoreError, Ownership, PackageStore, Settings, Username};
use userredis_daemon::{
    request_ping, request_status, request_stop, run, DaemonError, DEBOUNCE_WINDOW,
};
use userredis_provision::{
    AdminToken, Ports, ProvisionError, Provisioner, RedisProbe, ServiceAction, ServiceControl,
    UserDirectory, UserRecord,
};

struct NoServices;

impl ServiceControl for NoServices {
    fn apply(&self, _action: ServiceAction, _unit: &str) -> Result<(), ProvisionError> {
        Ok(())
    }

    fn active_state(&self, _unit: &str) -> Option<String> {
        None
    }
}

struct NoRedis;

impl RedisProbe for NoRedis {
    fn info_memory(&self, _user: &Username, _socket: &Path) -> Option<String> {
        None
    }
}

struct Users(Vec<UserRecord>);

impl UserDirectory for Users {
    fn package_of(&self, user: &Username) -> Result<Option<String>, ProvisionError> {
        Ok(self
            .0
            .iter()
            .find(|r| r.name == user.as_str())
            .and_then(|r| r.package.clone()))
    }

    fn list_users(&self) -> Result<Vec<UserRecord>, ProvisionError> {
        Ok(self.0.clone())
    }
}

struct NoopOwnership;

impl Ownership for NoopOwnership {
    fn chown(&self, _path: &Path, _account: &str) -> Result<(), CoreError> {
        Ok(())
    }
}

struct Fixture {
    root: TempDir,
    settings: Settings,
}

impl Fixture {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        let settings = Settings {
            home_root: root.path().join("home"),
            packages_dir: root.path().join("packages"),
            status_socket: root.path().join("run").join("status.sock"),
            ..Settings::default()
        };
        std::fs::create_dir_all(&settings.home_root).unwrap();
        PackageStore::new(&settings.packages_dir)
            .seed_default(DEFAULT_PACKAGE_CONTENT)
            .unwrap();
        Self { root, settings }
    }

    fn provisioner(&self) -> Arc<Provisioner> {
        let ports = Ports {
            services: Arc::new(NoServices),
            redis: Arc::new(NoRedis),
            users: Arc::new(Users(vec![UserRecord {
                name: "alice".into(),
                package: Some("premium".into()),
            }])),
            ownership: Arc::new(NoopOwnership),
        };
        Arc::new(Provisioner::new(self.settings.clone(), ports).unwrap())
    }

    fn socket(&self) -> PathBuf {
        self.settings.status_socket.clone()
    }

    fn conf_of(&self, user: &str) -> PathBuf {
        self.root.path().join("home").join(user).join("redis/redis.conf")
    }
}

async fn wait_for_socket(socket: &Path) {
    for _ in 0..100 {
        if socket.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("daemon did not bind {}", socket.display());
}

async fn blocking<T, F>(f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn status_endpoint_provisions_and_reports() {
    let fx = Fixture::new();
    let daemon = tokio::spawn(run(fx.provisioner(), None));
    let socket = fx.socket();
    wait_for_socket(&socket).await;

    let s = socket.clone();
    let ping = blocking(move || request_ping(&s)).await.unwrap();
    assert_eq!(ping["running"], serde_json::json!(true));
    assert_eq!(ping["watching_packages"], serde_json::json!(false));

    let s = socket.clone();
    let info = blocking(move || request_status(&s, "alice", None)).await.unwrap();
    assert_eq!(info.status, "inactive");
    assert_eq!(info.memory, "N/A");
    let conf = std::fs::read_to_string(fx.conf_of("alice")).unwrap();
    assert!(conf.ends_with(DEFAULT_PACKAGE_CONTENT));

    let s = socket.clone();
    let err = blocking(move || request_status(&s, "", Some("alice")))
        .await
        .unwrap_err();
    assert!(matches!(err, DaemonError::Protocol(ref m) if m == "Not authenticated"));

    let s = socket.clone();
    let info = blocking(move || request_status(&s, "admin", Some("bob")))
        .await
        .unwrap();
    assert_eq!(info.status, "inactive");
    assert!(!fx.conf_of("bob").exists(), "unknown users are not provisioned");

    let s = socket.clone();
    blocking(move || request_stop(&s)).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), daemon)
        .await
        .expect("daemon stops")
        .unwrap()
        .unwrap();
    assert!(!socket.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_step_package_edit_lands_in_final_state() {
    let fx = Fixture::new();
    let provisioner = fx.provisioner();
    let package = fx.settings.packages_dir.join("premium.conf");
    std::fs::write(&package, "maxmemory 1gb\n").unwrap();
    provisioner
        .generate_config(&Username::parse("alice").unwrap(), "premium")
        .unwrap();
    let token = AdminToken::verify("root", &fx.settings).unwrap();
    let daemon = tokio::spawn(run(provisioner, Some(token)));
    let socket = fx.socket();
    wait_for_socket(&socket).await;

    // Truncate, then write the new content shortly after, as editors and
    // `cp` over an existing file do.
    std::fs::File::create(&package).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    std::fs::write(&package, "maxmemory 2gb\n").unwrap();

    let deadline = tokio::time::Instant::now() + DEBOUNCE_WINDOW + Duration::from_secs(5);
    let conf = loop {
        let conf = std::fs::read_to_string(fx.conf_of("alice")).unwrap();
        if conf.ends_with("maxmemory 2gb\n") || tokio::time::Instant::now() >= deadline {
            break conf;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    };
    assert!(
        conf.ends_with("maxmemory 2gb\n"),
        "alice's config should carry the final package content, got:\n{conf}"
    );
    assert!(!conf.contains("1gb"));

    let s = socket.clone();
    blocking(move || request_stop(&s)).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), daemon)
        .await
        .expect("daemon stops")
        .unwrap()
        .unwrap();
}
