//! External child-process wrapper (§9 "External child-process
//! decompressors... wrap in a `Stream` abstraction that owns pipe file
//! descriptors and the child handle; on drop, kills the child if still
//! alive"). Used directly by [`crate::bsc_codec::BscCodec`] (no maintained
//! pure-Rust BSC binding exists) and available to `gtz_engine` for the
//! gzip/bcftools/samtools/xz/unzip collaborators named in spec §6.

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread;

/// A spawned child process with piped stdin/stdout, fed and drained from a
/// helper thread so large payloads don't deadlock on a full pipe buffer.
pub struct Stream {
    child: Child,
    program: &'static str,
}

impl Stream {
    pub fn spawn(program: &'static str, args: &[&str]) -> anyhow::Result<Self> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| anyhow::anyhow!("failed to start external collaborator '{program}': {e}"))?;
        Ok(Stream { child, program })
    }

    /// Write `input` to the child's stdin on a helper thread, read all of
    /// its stdout on this thread, then wait for exit. This is the shape
    /// every external collaborator in spec §6 (gzip, bcftools, samtools,
    /// xz, unzip, and here bsc) is driven through.
    pub fn run(mut self, input: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut stdin = self
            .child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("{}: stdin pipe unavailable", self.program))?;
        let mut stdout = self
            .child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("{}: stdout pipe unavailable", self.program))?;

        let input = input.to_vec();
        let program = self.program;
        let writer = thread::spawn(move || -> anyhow::Result<()> {
            stdin
                .write_all(&input)
                .map_err(|e| anyhow::anyhow!("{program}: write to stdin failed: {e}"))?;
            drop(stdin);
            Ok(())
        });

        let mut out = Vec::new();
        stdout
            .read_to_end(&mut out)
            .map_err(|e| anyhow::anyhow!("{}: read from stdout failed: {e}", self.program))?;

        writer
            .join()
            .map_err(|_| anyhow::anyhow!("{}: writer thread panicked", self.program))??;

        let status = self
            .child
            .wait()
            .map_err(|e| anyhow::anyhow!("{}: wait failed: {e}", self.program))?;
        if !status.success() {
            let mut stderr = String::new();
            if let Some(mut s) = self.child.stderr.take() {
                let _ = s.read_to_string(&mut stderr);
            }
            anyhow::bail!("{} exited with {status}: {stderr}", self.program);
        }
        Ok(out)
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        if matches!(self.child.try_wait(), Ok(None)) {
            let _ = self.child.kill();
        }
    }
}
