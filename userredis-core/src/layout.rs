//! Per-user instance paths.
//!
//! ```text
//! <home_root>/<user>/redis/
//!   redis.conf   (root:root 0644, generated)
//!   redis.sock
//!   redis.pid
//!   redis.log
//! ```

use std::path::{Path, PathBuf};

use crate::types::Username;

pub const INSTANCE_DIR: &str = "redis";
pub const CONF_FILE: &str = "redis.conf";
pub const SOCKET_FILE: &str = "redis.sock";
pub const PID_FILE: &str = "redis.pid";
pub const LOG_FILE: &str = "redis.log";

/// Mode written as `unixsocketperm`.
pub const SOCKET_PERM: &str = "770";

/// Resolved paths of one user's instance. Pure, no I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceLayout {
    pub dir: PathBuf,
    pub conf: PathBuf,
    pub socket: PathBuf,
    pub pidfile: PathBuf,
    pub logfile: PathBuf,
}

impl InstanceLayout {
    pub fn for_user(home_root: &Path, user: &Username) -> Self {
        let dir = home_root.join(user.as_str()).join(INSTANCE_DIR);
        Self {
            conf: dir.join(CONF_FILE),
            socket: dir.join(SOCKET_FILE),
            pidfile: dir.join(PID_FILE),
            logfile: dir.join(LOG_FILE),
            dir,
        }
    }

    /// True once the instance directory has been created.
    pub fn is_provisioned(&self) -> bool {
        self.dir.is_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_derive_from_home_and_user() {
        let user = Username::parse("alice").unwrap();
        let layout = InstanceLayout::for_user(Path::new("/home"), &user);
        assert_eq!(layout.dir, PathBuf::from("/home/alice/redis"));
        assert_eq!(layout.conf, PathBuf::from("/home/alice/redis/redis.conf"));
        assert_eq!(layout.socket, PathBuf::from("/home/alice/redis/redis.sock"));
        assert_eq!(layout.pidfile, PathBuf::from("/home/alice/redis/redis.pid"));
        assert_eq!(layout.logfile, PathBuf::from("/home/alice/redis/redis.log"));
    }
}
