pub mod admin;
pub mod daemon;
pub mod doctor;
pub mod hook;
pub mod install;
pub mod redis;

use anyhow::Result;
use userredis_provision::Reply;

/// Print a dispatch reply on stdout; side-effect-only replies print nothing.
pub(crate) fn print_reply(reply: &Reply) -> Result<()> {
    if let Some(body) = reply.render() {
        println!("{body}");
    }
    Ok(())
}
