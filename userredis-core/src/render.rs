//! Tera rendering of a user's `redis.conf`.
//!
//! The template is baked into the binary. It fixes the transport to a UNIX
//! socket (`port 0`) and pins every path into the instance directory; the
//! package content is appended after it unmodified.

use tera::{Context, Tera};

use crate::error::CoreError;
use crate::layout::{InstanceLayout, SOCKET_PERM};

const TEMPLATE_NAME: &str = "redis.conf";
const TEMPLATE: &str = include_str!("templates/redis.conf.tera");

pub struct ConfigRenderer {
    tera: Tera,
}

impl ConfigRenderer {
    pub fn new() -> Result<Self, CoreError> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.add_raw_template(TEMPLATE_NAME, TEMPLATE)?;
        Ok(Self { tera })
    }

    /// Fixed preamble for `layout` followed by `package_content` verbatim.
    pub fn render(
        &self,
        layout: &InstanceLayout,
        package_content: &str,
    ) -> Result<String, CoreError> {
        let mut ctx = Context::new();
        ctx.insert("socket", &layout.socket.display().to_string());
        ctx.insert("socket_perm", SOCKET_PERM);
        ctx.insert("pidfile", &layout.pidfile.display().to_string());
        ctx.insert("logfile", &layout.logfile.display().to_string());
        ctx.insert("dir", &layout.dir.display().to_string());
        ctx.insert("package", package_content);
        Ok(self.tera.render(TEMPLATE_NAME, &ctx)?)
    }
}

impl std::fmt::Debug for ConfigRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigRenderer").finish_non_exhaustive()
    }
}
