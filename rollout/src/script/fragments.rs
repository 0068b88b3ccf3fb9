//! Shell fragments substituted into script templates

use crate::config::{AppSpec, ServerSpec};
use crate::session::{shell, Env};
use crate::storage::RemoteLayout;

/// Seconds to wait for the old process after signalling it
const KILL_WAIT_SECS: u32 = 10;

/// Environment of the started binary; server values win
pub fn runtime_env(app: &AppSpec, server: &ServerSpec) -> Env {
    let mut env: Env = app.envs.clone();
    env.extend(server.envs.iter().map(|(k, v)| (k.clone(), v.clone())));
    if !server.go_path.is_empty() {
        env.entry("GOPATH".to_string())
            .or_insert_with(|| server.go_path.clone());
    }
    env
}

/// Signal the recorded process, wait for it, then drop the pid file
pub fn kill_server(app: &AppSpec, server: &ServerSpec, layout: &RemoteLayout) -> String {
    format!(
        r#"pid_file={pid_file}
if [ -f "$pid_file" ]; then
  pid=$(cat "$pid_file")
  if [ -n "$pid" ] && kill -0 "$pid" 2>/dev/null; then
    kill -s {sig} "$pid" || true
    i=0
    while [ "$i" -lt {wait} ] && kill -0 "$pid" 2>/dev/null; do
      sleep 1
      i=$((i + 1))
    done
  fi
  rm -f "$pid_file"
fi"#,
        pid_file = shell::path(&layout.pid_file(server)),
        sig = shell::quote(app.signal()),
        wait = KILL_WAIT_SECS,
    )
}

/// Restart from the active release directory. Runs in a subshell so the
/// `cd` does not leak into the rest of the script.
pub fn restart_server(app: &AppSpec, server: &ServerSpec, layout: &RemoteLayout) -> String {
    let mut command = format!("nohup ./{}", shell::quote(&app.name));
    if !app.args.is_empty() {
        command.push(' ');
        command.push_str(&shell::join(&app.args));
    }

    format!(
        "(\n\
         tag=$(cat {current})\n\
         cd {releases}/\"$tag\"\n\
         {kill}\n\
         mkdir -p {log_dir} {pid_dir}\n\
         {exports}\
         {command} >> {log_file} 2>&1 < /dev/null &\n\
         echo $! > {pid_file}\n\
         )",
        current = shell::path(&layout.current_file()),
        releases = shell::path(&layout.releases_dir()),
        kill = kill_server(app, server, layout),
        log_dir = shell::path(&layout.log_dir(server)),
        pid_dir = shell::path(&layout.pid_dir(server)),
        exports = shell::exports(&runtime_env(app, server)),
        command = command,
        log_file = shell::path(&layout.log_file(server)),
        pid_file = shell::path(&layout.pid_file(server)),
    )
}

/// Create runtime directories and install `restart.sh` and `rollback.sh`
/// into the app root
pub fn sync_files(app: &AppSpec, server: &ServerSpec, layout: &RemoteLayout) -> String {
    let restart_sh = shell::path(&layout.restart_script());
    let rollback_sh = shell::path(&layout.rollback_script());
    format!(
        "mkdir -p {log_dir} {pid_dir}\n\
         cat > {restart_sh} <<'ROLLOUT_RESTART'\n\
         #!/bin/sh\n\
         set -e\n\
         {restart}\n\
         ROLLOUT_RESTART\n\
         chmod +x {restart_sh}\n\
         cat > {rollback_sh} <<'ROLLOUT_ROLLBACK'\n\
         {rollback}\n\
         ROLLOUT_ROLLBACK\n\
         chmod +x {rollback_sh}",
        log_dir = shell::path(&layout.log_dir(server)),
        pid_dir = shell::path(&layout.pid_dir(server)),
        restart_sh = restart_sh,
        restart = restart_server(app, server, layout),
        rollback_sh = rollback_sh,
        rollback = ROLLBACK_SH,
    )
}

/// Manual rollback helper, run from anywhere as `rollback.sh ls|<tag>`
const ROLLBACK_SH: &str = r#"#!/bin/sh
set -e
cd "$(dirname "$0")"
case "$1" in
  ""|-h|--help)
    echo "usage: $0 ls | $0 <tag>" >&2
    exit 2
    ;;
  ls)
    current=$(cat current 2>/dev/null || true)
    for d in releases/*/; do
      [ -d "$d" ] || continue
      name=$(basename "$d")
      case "$name" in *.partial) continue ;; esac
      if [ "$name" = "$current" ]; then
        echo "$name (current)"
      else
        echo "$name"
      fi
    done
    ;;
  */*|.*)
    echo "invalid release $1" >&2
    exit 2
    ;;
  *)
    if [ ! -d "releases/$1" ]; then
      echo "release $1 not found" >&2
      exit 1
    fi
    printf '%s\n' "$1" > current.tmp
    mv -f current.tmp current
    exec sh ./restart.sh
    ;;
esac"#;
