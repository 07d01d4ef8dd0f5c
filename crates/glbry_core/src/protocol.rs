//! The git remote-helper line protocol.
//!
//! git drives the helper strictly sequentially over stdin/stdout: it sends
//! one command (or a batch of `fetch`/`push` lines closed by a blank line)
//! and waits for the complete response before sending the next. A blank
//! line or end of input at the top level ends the session.
//!
//! ```text
//! capabilities          -> fetch, push, blank
//! list [for-push]       -> <head> HEAD, <id> <ref>..., blank
//! fetch <id> <ref>...   -> blank
//! push [+]<src>:<dst>...-> ok <dst>... | error <dst>..., blank
//! ```

use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::{GlbryError, Result};
use crate::git::{GitToolchain, ObjectId};
use crate::lbry::ContentNetwork;
use crate::push::{PushOutcome, PushSpec};
use crate::startup::Remote;

/// Capabilities advertised to git.
pub const CAPABILITIES: &[&str] = &["fetch", "push"];

/// Optional echo of every protocol line, for debugging a helper that git
/// is driving.
#[derive(Clone, Default)]
pub struct Transcript {
    sink: Option<Arc<Mutex<dyn Write + Send>>>,
}

impl Transcript {
    /// A transcript that records nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn stderr() -> Self {
        Self::to_writer(std::io::stderr())
    }

    pub fn to_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Some(Arc::new(Mutex::new(writer))),
        }
    }

    fn record(&self, prefix: &str, line: &str) {
        if let Some(sink) = &self.sink {
            let mut sink = sink.lock().unwrap_or_else(|p| p.into_inner());
            let _ = writeln!(sink, "{prefix}{line}");
        }
    }

    fn incoming(&self, line: &str) {
        self.record("<< ", line);
    }

    fn outgoing(&self, line: &str) {
        self.record(">> ", line);
    }
}

/// Parse the argument of a fetch line: `<id> <ref>` or `<id>:<ref>`.
pub fn parse_fetch_line(args: &str) -> Result<(ObjectId, String)> {
    let (id, name) = args
        .split_once([' ', ':'])
        .ok_or_else(|| GlbryError::Protocol(format!("malformed fetch line: {args:?}")))?;
    Ok((id.parse()?, name.to_string()))
}

/// Answers git's commands for one open [`Remote`].
pub struct Dispatcher<'a, N: ContentNetwork, G: GitToolchain, R, W> {
    remote: &'a mut Remote<N, G>,
    input: R,
    output: W,
    transcript: Transcript,
}

impl<'a, N, G, R, W> Dispatcher<'a, N, G, R, W>
where
    N: ContentNetwork,
    G: GitToolchain,
    R: BufRead,
    W: Write,
{
    pub fn new(remote: &'a mut Remote<N, G>, input: R, output: W) -> Self {
        Self {
            remote,
            input,
            output,
            transcript: Transcript::disabled(),
        }
    }

    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = transcript;
        self
    }

    /// Serve commands until git closes the session.
    pub fn run(&mut self) -> Result<()> {
        while let Some(line) = self.read_line()? {
            if line.is_empty() {
                break;
            }
            if line == "capabilities" {
                self.capabilities()?;
            } else if line == "list" || line == "list for-push" {
                self.list()?;
            } else if line.starts_with("fetch ") {
                self.fetch(line)?;
            } else if line.starts_with("push ") {
                self.push(line)?;
            } else {
                return Err(GlbryError::Protocol(format!("unknown command: {line:?}")));
            }
            self.output.flush()?;
        }
        debug!("session closed");
        Ok(())
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let line = line.trim_end_matches(['\n', '\r']).to_string();
        self.transcript.incoming(&line);
        Ok(Some(line))
    }

    /// Read the rest of a batch started by `first`, up to the blank line.
    fn read_batch(&mut self, first: String) -> Result<Vec<String>> {
        let mut lines = vec![first];
        loop {
            match self.read_line()? {
                Some(line) if line.is_empty() => return Ok(lines),
                Some(line) => lines.push(line),
                None => {
                    return Err(GlbryError::Protocol(
                        "input ended inside a command batch".into(),
                    ));
                }
            }
        }
    }

    fn emit(&mut self, line: &str) -> Result<()> {
        self.transcript.outgoing(line);
        writeln!(self.output, "{line}")?;
        Ok(())
    }

    fn capabilities(&mut self) -> Result<()> {
        for capability in CAPABILITIES {
            self.emit(capability)?;
        }
        self.emit("")
    }

    fn list(&mut self) -> Result<()> {
        let mut lines = vec![format!("{} HEAD", self.remote.head())];
        lines.extend(
            self.remote
                .refs()
                .iter()
                .map(|r| format!("{} {}", r.id, r.name)),
        );
        for line in &lines {
            self.emit(line)?;
        }
        self.emit("")
    }

    fn fetch(&mut self, first: String) -> Result<()> {
        let mut ids = Vec::new();
        for line in self.read_batch(first)? {
            let args = line
                .strip_prefix("fetch ")
                .ok_or_else(|| GlbryError::Protocol(format!("expected fetch, got {line:?}")))?;
            let (id, name) = parse_fetch_line(args)?;
            debug!(%id, %name, "fetch");
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        let mirror = self.remote.layout().mirror_path();
        self.remote.git().fetch_objects(&mirror, &ids)?;
        self.emit("")
    }

    fn push(&mut self, first: String) -> Result<()> {
        let specs = self
            .read_batch(first)?
            .iter()
            .map(|line| {
                line.strip_prefix("push ")
                    .ok_or_else(|| GlbryError::Protocol(format!("expected push, got {line:?}")))?
                    .parse::<PushSpec>()
            })
            .collect::<Result<Vec<_>>>()?;

        let status = match self.remote.push_batch(&specs)? {
            PushOutcome::Published { .. } | PushOutcome::Unchanged => "ok",
            PushOutcome::Failed(_) => "error",
        };
        for spec in &specs {
            self.emit(&format!("{status} {}", spec.dst))?;
        }
        self.emit("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Channel, Config};
    use crate::memory::{InMemoryGit, InMemoryNetwork};
    use crate::settings::RepoSettings;
    use std::io::Cursor;

    const ADDRESS: &str = "lbry://@alice/repo";
    const ID1: &str = "0101010101010101010101010101010101010101";

    struct Harness {
        _dir: tempfile::TempDir,
        remote: Remote<InMemoryNetwork, InMemoryGit>,
        network: InMemoryNetwork,
        git: InMemoryGit,
    }

    fn harness(push_as: bool) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let network = InMemoryNetwork::new();
        network.set_content(
            ADDRESS,
            RepoSettings::new_with_author("A1", "@alice", 1000)
                .to_json()
                .unwrap()
                .into_bytes(),
        );
        let git = InMemoryGit::new();
        git.set_local_ref("refs/heads/main", ObjectId::from_bytes([1; 20]));
        let config = Config {
            data_dir: Some(dir.path().to_path_buf()),
            push_as: push_as.then(|| Channel {
                claim_id: "A1".into(),
                name: "@alice".into(),
            }),
            ..Config::default()
        };
        let remote = Remote::open(ADDRESS, &config, network.clone(), git.clone()).unwrap();
        Harness {
            _dir: dir,
            remote,
            network,
            git,
        }
    }

    fn run(h: &mut Harness, input: &str) -> (Result<()>, String) {
        let mut output = Vec::new();
        let result = Dispatcher::new(&mut h.remote, Cursor::new(input.to_string()), &mut output).run();
        (result, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_capabilities() {
        let mut h = harness(true);
        let (result, out) = run(&mut h, "capabilities\n\n");
        result.unwrap();
        assert_eq!(out, "fetch\npush\n\n");
    }

    #[test]
    fn test_list_empty_repo() {
        let mut h = harness(true);
        let (result, out) = run(&mut h, "list\n\n");
        result.unwrap();
        assert_eq!(out, "@refs/heads/master HEAD\n\n");
    }

    #[test]
    fn test_push_then_list_for_push() {
        let mut h = harness(true);
        let (result, out) = run(
            &mut h,
            "push refs/heads/main:refs/heads/main\n\nlist for-push\n\n",
        );
        result.unwrap();
        assert_eq!(
            out,
            format!("ok refs/heads/main\n\n@refs/heads/master HEAD\n{ID1} refs/heads/main\n\n")
        );
        assert_eq!(h.network.published()[0].name, "repo-0");
    }

    #[test]
    fn test_push_batch_failure_reports_every_ref() {
        let mut h = harness(true);
        h.git.set_local_ref("refs/heads/dev", ObjectId::from_bytes([2; 20]));
        h.network.fail_publishes();
        let (result, out) = run(
            &mut h,
            "push refs/heads/main:refs/heads/main\npush +refs/heads/dev:refs/heads/dev\n\n",
        );
        result.unwrap();
        assert_eq!(out, "error refs/heads/main\nerror refs/heads/dev\n\n");
    }

    #[test]
    fn test_deleting_push_reports_ok() {
        let mut h = harness(true);
        let (result, out) = run(
            &mut h,
            "push refs/heads/main:refs/heads/main\n\npush :refs/heads/main\n\nlist for-push\n\n",
        );
        result.unwrap();
        assert_eq!(
            out,
            "ok refs/heads/main\n\nok refs/heads/main\n\n@refs/heads/master HEAD\n\n"
        );
        assert_eq!(h.network.published().len(), 1);
    }

    #[test]
    fn test_push_without_channel_is_fatal() {
        let mut h = harness(false);
        let (result, out) = run(&mut h, "push refs/heads/main:refs/heads/main\n\n");
        assert!(matches!(
            result.unwrap_err(),
            GlbryError::NoPublishingChannelConfigured
        ));
        assert_eq!(out, "");
    }

    #[test]
    fn test_fetch_accepts_both_forms() {
        let mut h = harness(true);
        let id2 = "0202020202020202020202020202020202020202";
        let (result, out) = run(
            &mut h,
            &format!("fetch {ID1} refs/heads/main\nfetch {id2}:refs/heads/dev\nfetch {ID1} HEAD\n\n"),
        );
        result.unwrap();
        assert_eq!(out, "\n");
        assert_eq!(
            h.git.fetched(),
            vec![ObjectId::from_bytes([1; 20]), ObjectId::from_bytes([2; 20])]
        );
    }

    #[test]
    fn test_eof_and_blank_line_end_session() {
        let mut h = harness(true);
        let (result, out) = run(&mut h, "");
        result.unwrap();
        assert_eq!(out, "");

        let (result, out) = run(&mut h, "\ncapabilities\n");
        result.unwrap();
        assert_eq!(out, "");
    }

    #[test]
    fn test_unknown_command_is_protocol_error() {
        let mut h = harness(true);
        let (result, _) = run(&mut h, "option verbosity 1\n");
        assert!(matches!(result.unwrap_err(), GlbryError::Protocol(_)));
    }

    #[test]
    fn test_malformed_fetch_is_protocol_error() {
        let mut h = harness(true);
        let (result, _) = run(&mut h, "fetch nothex refs/heads/main\n\n");
        assert!(matches!(result.unwrap_err(), GlbryError::Protocol(_)));
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_transcript_echoes_both_directions() {
        let mut h = harness(true);
        let buf = SharedBuf::default();
        let mut output = Vec::new();
        Dispatcher::new(&mut h.remote, Cursor::new("capabilities\n\n"), &mut output)
            .with_transcript(Transcript::to_writer(buf.clone()))
            .run()
            .unwrap();
        let transcript = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(
            transcript,
            "<< capabilities\n>> fetch\n>> push\n>> \n<< \n"
        );
    }
}
