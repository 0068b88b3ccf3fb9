//! Template engine for operation scripts

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;
use tera::{Context, Tera};
use tracing::debug;

use crate::config::AppSpec;
use crate::errors::RolloutError;
use crate::filesys::file::File;
use crate::script::ScriptContext;

pub const DEFAULT_DEPLOY: &str = "set -e\n{{ SyncFiles }}\n{{ RestartServer }}";
pub const DEFAULT_RESTART: &str = "set -e\n{{ RestartServer }}";
pub const DEFAULT_KILL: &str = "set -e\n{{ KillServer }}";

/// Scripts an operation can render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptName {
    Deploy,
    Restart,
    Kill,
}

impl ScriptName {
    pub const ALL: [ScriptName; 3] = [ScriptName::Deploy, ScriptName::Restart, ScriptName::Kill];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptName::Deploy => "deploy",
            ScriptName::Restart => "restart",
            ScriptName::Kill => "kill",
        }
    }
}

impl fmt::Display for ScriptName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScriptName {
    type Err = RolloutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deploy" => Ok(ScriptName::Deploy),
            "restart" => Ok(ScriptName::Restart),
            "kill" => Ok(ScriptName::Kill),
            other => Err(RolloutError::ConfigError(format!(
                "unknown script {:?}, expected deploy, restart or kill",
                other
            ))),
        }
    }
}

/// Renders named scripts from defaults or user overrides
pub struct ScriptEngine {
    tera: Tera,
}

impl ScriptEngine {
    /// Engine with the built-in templates only
    pub fn new() -> Result<Self, RolloutError> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.add_raw_templates(vec![
            (ScriptName::Deploy.as_str(), DEFAULT_DEPLOY),
            (ScriptName::Restart.as_str(), DEFAULT_RESTART),
            (ScriptName::Kill.as_str(), DEFAULT_KILL),
        ])?;
        Ok(Self { tera })
    }

    /// Engine with the app's `DeployScript`/`RestartScript` overrides, read
    /// relative to `project_dir`
    pub async fn load(app: &AppSpec, project_dir: &Path) -> Result<Self, RolloutError> {
        let mut engine = Self::new()?;
        let overrides = [
            (ScriptName::Deploy, app.deploy_script.as_deref()),
            (ScriptName::Restart, app.restart_script.as_deref()),
        ];
        for (name, path) in overrides {
            let Some(path) = path.filter(|p| !p.trim().is_empty()) else {
                continue;
            };
            let file = File::new(project_dir.join(path));
            let source = file.read_string().await.map_err(|e| {
                RolloutError::ConfigError(format!(
                    "unable to read {} script {}: {}",
                    name,
                    file.path().display(),
                    e
                ))
            })?;
            debug!("Using {} script from {}", name, file.path().display());
            engine.set_template(name, &source)?;
        }
        Ok(engine)
    }

    /// Replace one template
    pub fn set_template(&mut self, name: ScriptName, source: &str) -> Result<(), RolloutError> {
        self.tera.add_raw_template(name.as_str(), source)?;
        Ok(())
    }

    /// Render without side effects; undefined fields are a config error
    pub fn render(&self, name: ScriptName, context: &ScriptContext) -> Result<String, RolloutError> {
        let context = Context::from_serialize(context)?;
        Ok(self.tera.render(name.as_str(), &context)?)
    }
}
