//! [`GitToolchain`] backed by the system `git` binary.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tracing::debug;

use super::{GitToolchain, NamedRef, ObjectId, format_head, parse_show_ref};
use crate::error::{GlbryError, Result};

/// Variables git exports to remote helpers that would redirect commands
/// aimed at the mirror back into the user's repository.
const REPO_ENV: &[&str] = &["GIT_DIR", "GIT_WORK_TREE", "GIT_INDEX_FILE", "GIT_PREFIX"];

#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
    worktree: Option<PathBuf>,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            program: PathBuf::from("git"),
            worktree: None,
        }
    }
}

impl GitCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run user-repository commands in `dir` instead of the current directory.
    pub fn with_worktree(mut self, dir: impl Into<PathBuf>) -> Self {
        self.worktree = Some(dir.into());
        self
    }

    /// Command operating on the bare mirror at `repo`.
    fn mirror_command(&self, repo: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        for var in REPO_ENV {
            cmd.env_remove(var);
        }
        cmd.arg("--git-dir").arg(repo);
        cmd
    }

    /// Command operating on the user's repository.
    fn user_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(dir) = &self.worktree {
            cmd.current_dir(dir);
        }
        cmd
    }

    fn output(cmd: &mut Command) -> Result<Output> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let command = describe(cmd);
        debug!(%command, "spawning git");
        let output = cmd.output()?;
        debug!(
            %command,
            status = %output.status,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "git finished"
        );
        Ok(output)
    }

    /// Run to completion, failing on a non-zero exit.
    fn run(cmd: &mut Command) -> Result<Output> {
        let output = Self::output(cmd)?;
        if !output.status.success() {
            return Err(subprocess_error(cmd, &output));
        }
        Ok(output)
    }
}

impl GitToolchain for GitCli {
    fn show_refs(&self, repo: &Path) -> Result<Vec<NamedRef>> {
        let mut cmd = self.mirror_command(repo);
        cmd.arg("show-ref");
        let output = Self::output(&mut cmd)?;
        // show-ref exits 1 without output when there are no refs.
        if output.stdout.is_empty() && output.status.code() == Some(1) {
            return Ok(Vec::new());
        }
        if !output.status.success() {
            return Err(subprocess_error(&cmd, &output));
        }
        parse_show_ref(&String::from_utf8_lossy(&output.stdout))
    }

    fn read_head(&self, repo: &Path) -> Result<String> {
        let path = repo.join("HEAD");
        let contents = fs::read_to_string(&path).map_err(|e| GlbryError::read(&path, e))?;
        Ok(format_head(&contents))
    }

    fn create_bundle(
        &self,
        repo: &Path,
        out: &Path,
        refs: &[String],
        exclude: &[ObjectId],
    ) -> Result<()> {
        let mut cmd = self.mirror_command(repo);
        cmd.arg("bundle").arg("create").arg(out).args(refs);
        cmd.args(exclude.iter().map(|id| format!("^{id}")));
        Self::run(&mut cmd)?;
        Ok(())
    }

    fn unbundle(&self, repo: &Path, bundle: &Path) -> Result<()> {
        // `git bundle unbundle` only stores objects; fetching from the
        // bundle also moves the mirror's refs to the bundled tips.
        let mut cmd = self.mirror_command(repo);
        cmd.args(["fetch", "--quiet", "--no-tags", "--update-head-ok"])
            .arg(bundle)
            .arg("+refs/*:refs/*");
        Self::run(&mut cmd)?;
        Ok(())
    }

    fn push_local(&self, mirror: &Path, spec: &str) -> Result<()> {
        let mut cmd = self.user_command();
        cmd.args(["push", "--quiet"]).arg(mirror).arg(spec);
        Self::run(&mut cmd)?;
        Ok(())
    }

    fn fetch_objects(&self, mirror: &Path, ids: &[ObjectId]) -> Result<()> {
        // Output is captured: fetch-pack reports refs on stdout, which
        // belongs to the remote-helper protocol.
        let mut cmd = self.user_command();
        cmd.args(["fetch-pack", "--quiet"]).arg(mirror);
        cmd.args(ids.iter().map(ObjectId::to_string));
        Self::run(&mut cmd)?;
        Ok(())
    }

    fn init_bare(&self, repo: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        for var in REPO_ENV {
            cmd.env_remove(var);
        }
        cmd.args(["init", "--quiet", "--bare"]).arg(repo);
        Self::run(&mut cmd)?;
        Ok(())
    }

    fn update_ref(&self, repo: &Path, name: &str, id: Option<ObjectId>) -> Result<()> {
        let mut cmd = self.mirror_command(repo);
        match id {
            Some(id) => cmd.args(["update-ref", name, &id.to_string()]),
            None => cmd.args(["update-ref", "-d", name]),
        };
        Self::run(&mut cmd)?;
        Ok(())
    }

    fn is_ancestor(&self, repo: &Path, ancestor: ObjectId, descendant: ObjectId) -> Result<bool> {
        if ancestor == descendant {
            return Ok(true);
        }
        let mut cmd = self.mirror_command(repo);
        cmd.args(["merge-base", "--is-ancestor"])
            .arg(ancestor.to_string())
            .arg(descendant.to_string());
        let output = Self::output(&mut cmd)?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(subprocess_error(&cmd, &output)),
        }
    }

    fn parents(&self, repo: &Path, id: ObjectId) -> Result<Vec<ObjectId>> {
        // Prints `<id> <parent>...` on one line.
        let mut cmd = self.mirror_command(repo);
        cmd.args(["rev-list", "--parents", "-n", "1"])
            .arg(id.to_string());
        let output = Self::run(&mut cmd)?;
        String::from_utf8_lossy(&output.stdout)
            .split_whitespace()
            .skip(1)
            .map(ObjectId::from_hex)
            .collect()
    }
}

fn describe(cmd: &Command) -> String {
    cmd.get_args()
        .map(OsStr::to_string_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}

fn subprocess_error(cmd: &Command, output: &Output) -> GlbryError {
    GlbryError::Subprocess {
        command: describe(cmd),
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}
