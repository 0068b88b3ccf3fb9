//! Rendering context

use serde::Serialize;

use crate::config::{AppSpec, ServerSpec};
use crate::script::fragments;
use crate::storage::RemoteLayout;

/// Every field a script template may reference.
///
/// Templates refer to fields by their serialized name, e.g. `{{ SyncFiles }}`
/// or `{{ Server.Host }}`. Anything else is an undefined variable and fails
/// rendering.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScriptContext {
    /// Prepares the runtime: log/pid directories and helper scripts
    pub sync_files: String,

    /// Stops the previous process and starts the active release
    pub restart_server: String,

    /// Signals the recorded process and removes its pid file
    pub kill_server: String,

    pub app: AppSpec,
    pub server: ServerSpec,

    pub app_root: String,
    pub log_file: String,
    pub pid_file: String,
}

impl ScriptContext {
    pub fn new(app: &AppSpec, server: &ServerSpec, layout: &RemoteLayout) -> Self {
        Self {
            sync_files: fragments::sync_files(app, server, layout),
            restart_server: fragments::restart_server(app, server, layout),
            kill_server: fragments::kill_server(app, server, layout),
            app: app.clone(),
            server: server.clone(),
            app_root: layout.root(),
            log_file: layout.log_file(server),
            pid_file: layout.pid_file(server),
        }
    }
}
