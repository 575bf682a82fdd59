//! External result-notification hook (spec §6 "External result hook", §9
//! "External process invocation for result notification").
//!
//! `original_source/src/results.c`'s `on_new_search_result` builds a shell
//! command line ending in `&` and hands it to `system()`. Spec §9 calls
//! that out for replacement: spawn the child directly, without a shell, so
//! a hash or contact string can never be interpreted as shell syntax.

use std::path::PathBuf;
use std::process::Stdio;

use dhtd_core::results::ResultHook;
use dhtd_core::{Endpoint, Id};
use tracing::warn;

pub struct ProcessHook {
    path: PathBuf,
}

impl ProcessHook {
    pub fn new(path: PathBuf) -> Self {
        ProcessHook { path }
    }
}

impl ResultHook for ProcessHook {
    /// Fire-and-forget (spec §6: "the core does not wait or interpret its
    /// exit code"): spawn and immediately drop the `Child` handle. Standard
    /// streams are not inherited, matching "closing inherited descriptors"
    /// in spec §9.
    fn notify(&self, target: Id, endpoint: Endpoint) {
        let result = std::process::Command::new(&self.path)
            .arg(target.to_hex())
            .arg(endpoint.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        if let Err(err) = result {
            warn!(path = %self.path.display(), %err, "failed to spawn result hook");
        }
    }
}
