//! Release manager for one server session

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::errors::RolloutError;
use crate::package::Archive;
use crate::release::{
    ReleaseEvent, ReleaseFsm, ReleaseHistory, ReleaseRecord, ReleaseState, Retention, Tag,
};
use crate::session::{shell, Env, RemoteSession};
use crate::storage::RemoteLayout;

/// Exit status of the activation script when the release directory is gone
const MISSING_RELEASE: i32 = 3;

/// Owns the release history and active pointer of the session's server
pub struct ReleaseManager<'a> {
    session: &'a dyn RemoteSession,
    layout: &'a RemoteLayout,
    retention: Retention,
    history: ReleaseHistory,
    fsm: ReleaseFsm,
}

impl<'a> ReleaseManager<'a> {
    /// Read the server's release history
    pub async fn open(
        session: &'a dyn RemoteSession,
        layout: &'a RemoteLayout,
        retention: Retention,
    ) -> Result<Self, RolloutError> {
        let history = read_history(session, layout).await?;
        let fsm = ReleaseFsm::new(history.active().map(|r| r.tag.clone()));
        debug!(
            "[{}] {} releases, active {:?}",
            session.server().id(),
            history.len(),
            fsm.active().map(Tag::as_str)
        );
        Ok(Self {
            session,
            layout,
            retention,
            history,
            fsm,
        })
    }

    pub fn history(&self) -> &ReleaseHistory {
        &self.history
    }

    pub fn state(&self) -> &ReleaseState {
        self.fsm.state()
    }

    pub fn active(&self) -> Option<&ReleaseRecord> {
        self.history.active()
    }

    /// History, newest first
    pub fn list(&self) -> Vec<ReleaseRecord> {
        self.history.newest_first()
    }

    /// Upload the archive and extract it into a new release directory
    pub async fn stage(&mut self, archive: &Archive, now: DateTime<Utc>) -> Result<Tag, RolloutError> {
        let tag = Tag::next(now, self.history.newest().map(|r| &r.tag));
        self.transition(ReleaseEvent::Stage(tag.clone()))?;

        match self.transfer(archive, &tag).await {
            Ok(()) => {
                self.history
                    .push(ReleaseRecord::new(tag.clone(), self.layout, false));
                info!("[{}] Staged release {}", self.server_id(), tag);
                Ok(tag)
            }
            Err(err) => {
                self.transition(ReleaseEvent::StageFailed(err.to_string()))?;
                Err(err)
            }
        }
    }

    async fn transfer(&self, archive: &Archive, tag: &Tag) -> Result<(), RolloutError> {
        let remote_archive = self.layout.release_archive();
        self.session.upload(archive.bytes(), &remote_archive).await?;

        let dir = self.layout.release_dir(tag.as_str());
        let partial = format!("{}.partial", dir);
        let script = format!(
            "set -e\n\
             rm -rf {partial}\n\
             mkdir -p {partial}\n\
             tar -xzf {archive} -C {partial}\n\
             mv {partial} {dir}",
            partial = shell::path(&partial),
            archive = shell::path(&remote_archive),
            dir = shell::path(&dir),
        );
        let output = self.session.run(&script, &Env::new()).await?;
        if !output.success() {
            return Err(RolloutError::TransferError(format!(
                "extracting release {} failed: {}",
                tag,
                output.stderr.trim()
            )));
        }
        Ok(())
    }

    /// Point `current` at `tag` with a single rename
    pub async fn activate(&mut self, tag: &Tag) -> Result<(), RolloutError> {
        if !self.history.contains(tag) {
            let err = RolloutError::ActivationError(format!("release {} is not staged", tag));
            self.transition(ReleaseEvent::ActivateFailed(err.to_string()))?;
            return Err(err);
        }

        let current = self.layout.current_file();
        let script = format!(
            "set -e\n\
             [ -d {dir} ] || exit {missing}\n\
             printf '%s\\n' {tag} > {tmp}\n\
             mv -f {tmp} {current}",
            dir = shell::path(&self.layout.release_dir(tag.as_str())),
            missing = MISSING_RELEASE,
            tag = shell::quote(tag.as_str()),
            tmp = shell::path(&format!("{}.tmp", current)),
            current = shell::path(&current),
        );

        let output = match self.session.run(&script, &Env::new()).await {
            Ok(output) => output,
            Err(err) => {
                self.transition(ReleaseEvent::ActivateFailed(err.to_string()))?;
                return Err(err);
            }
        };

        if !output.success() {
            let detail = if output.code == MISSING_RELEASE {
                format!("release directory of {} is missing", tag)
            } else {
                output.stderr.trim().to_string()
            };
            let err = RolloutError::ActivationError(detail);
            self.transition(ReleaseEvent::ActivateFailed(err.to_string()))?;
            warn!(
                "[{}] Activation of {} failed, {} stays active",
                self.server_id(),
                tag,
                self.fsm.active().map(Tag::as_str).unwrap_or("nothing")
            );
            return Err(err);
        }

        self.history.set_active(tag);
        self.transition(ReleaseEvent::Activate(tag.clone()))?;
        info!("[{}] Activated release {}", self.server_id(), tag);
        Ok(())
    }

    /// Delete releases beyond the retention limit and leftover partial
    /// extractions. Returns the pruned tags.
    pub async fn prune(&mut self) -> Result<Vec<Tag>, RolloutError> {
        let pruned = self.history.plan_prune(self.retention);

        let mut targets: Vec<String> = pruned
            .iter()
            .map(|tag| shell::path(&self.layout.release_dir(tag.as_str())))
            .collect();
        targets.push(format!("{}/*.partial", shell::path(&self.layout.releases_dir())));

        let script = format!("rm -rf {}", targets.join(" "));
        self.session.run(&script, &Env::new()).await?.into_result()?;

        self.history.remove(&pruned);
        if !pruned.is_empty() {
            info!("[{}] Pruned {} releases", self.server_id(), pruned.len());
        }
        Ok(pruned)
    }

    /// Re-activate a release still present in the history
    pub async fn rollback(&mut self, tag: &str) -> Result<Tag, RolloutError> {
        let tag = Tag::parse(tag)
            .filter(|t| self.history.contains(t))
            .ok_or_else(|| RolloutError::RollbackNotFound(tag.to_string()))?;
        self.activate(&tag).await?;
        Ok(tag)
    }

    fn transition(&mut self, event: ReleaseEvent) -> Result<(), RolloutError> {
        self.fsm
            .process(event)
            .map_err(RolloutError::ActivationError)
    }

    fn server_id(&self) -> String {
        self.session.server().id()
    }
}

/// List release directories and the active pointer
async fn read_history(
    session: &dyn RemoteSession,
    layout: &RemoteLayout,
) -> Result<ReleaseHistory, RolloutError> {
    let script = format!(
        "if [ -f {current} ]; then printf 'current %s\\n' \"$(cat {current})\"; fi\n\
         for d in {releases}/*/; do\n\
         [ -d \"$d\" ] || continue\n\
         name=$(basename \"$d\")\n\
         case \"$name\" in *.partial) continue ;; esac\n\
         printf 'release %s\\n' \"$name\"\n\
         done",
        current = shell::path(&layout.current_file()),
        releases = shell::path(&layout.releases_dir()),
    );
    let output = session.run(&script, &Env::new()).await?.into_result()?;
    Ok(ReleaseHistory::from_listing(&output.stdout, layout))
}
