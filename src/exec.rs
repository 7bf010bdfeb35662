//! # Process Execution Module
//!
//! All heavy lifting (probing, decoding, transcoding) is delegated to external
//! tools. This module holds the one seam the rest of the crate talks through:
//! the `CommandRunner` capability. Production code uses `SystemRunner` on top
//! of `tokio::process::Command`; tests swap in a fake that returns canned
//! output and records every invocation.
//!
//! Invocations block (from the caller's perspective) until the external
//! process exits. There is no cancellation here; the converter applies its
//! configured timeout around the whole run instead.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Exit status and captured output of one external process run
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Stdout decoded lossily, for tools with textual output
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Capability to run external tools, substitutable in tests
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput>;

    /// Run with bytes piped to the child's stdin (image-to-pipe transcode stage)
    async fn run_with_input(
        &self,
        program: &str,
        args: &[String],
        input: &[u8],
    ) -> std::io::Result<CommandOutput>;
}

/// Runs tools as real subprocesses via tokio
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        debug!("Running {} {}", program, args.join(" "));

        // kill_on_drop so a caller-side timeout reaps the child
        let output = Command::new(program).args(args).kill_on_drop(true).output().await?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    async fn run_with_input(
        &self,
        program: &str,
        args: &[String],
        input: &[u8],
    ) -> std::io::Result<CommandOutput> {
        debug!("Running {} {} with {} bytes on stdin", program, args.join(" "), input.len());

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input).await?;
            // Drop closes the pipe so the child sees EOF
        }

        let output = child.wait_with_output().await?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Converts an iterable of string-like items to `Vec<String>`.
///
/// Eliminates repetitive `.to_string()` calls when building tool argument
/// lists:
///
/// ```rust
/// use media_handler::exec::to_string_vec;
///
/// let quality = 85;
/// let args = to_string_vec(["-quality", &quality.to_string(), "-strip"]);
/// ```
pub fn to_string_vec<T, I>(items: I) -> Vec<String>
where
    T: ToString,
    I: IntoIterator<Item = T>,
{
    items.into_iter().map(|item| item.to_string()).collect()
}

#[cfg(test)]
pub(crate) mod fake {
    //! Canned-output runner used across the crate's tests.

    use super::*;
    use std::sync::Mutex;

    type SideEffect = Box<dyn Fn(&[String]) + Send + Sync>;

    struct Rule {
        needle: String,
        output: CommandOutput,
        side_effect: Option<SideEffect>,
    }

    /// Matches invocations by substring of the rendered command line.
    /// Unmatched invocations succeed with empty output.
    pub struct FakeRunner {
        rules: Mutex<Vec<Rule>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeRunner {
        pub fn new() -> Self {
            Self {
                rules: Mutex::new(Vec::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn on(self, needle: &str, output: CommandOutput) -> Self {
            self.rules.lock().unwrap().push(Rule {
                needle: needle.to_string(),
                output,
                side_effect: None,
            });
            self
        }

        pub fn on_with<F>(self, needle: &str, output: CommandOutput, effect: F) -> Self
        where
            F: Fn(&[String]) + Send + Sync + 'static,
        {
            self.rules.lock().unwrap().push(Rule {
                needle: needle.to_string(),
                output,
                side_effect: Some(Box::new(effect)),
            });
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count_matching(&self, needle: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.contains(needle))
                .count()
        }

        fn dispatch(&self, program: &str, args: &[String]) -> CommandOutput {
            let rendered = format!("{} {}", program, args.join(" "));
            self.calls.lock().unwrap().push(rendered.clone());

            let rules = self.rules.lock().unwrap();
            for rule in rules.iter() {
                if rendered.contains(&rule.needle) {
                    if let Some(effect) = &rule.side_effect {
                        effect(args);
                    }
                    return rule.output.clone();
                }
            }
            ok(b"")
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
            Ok(self.dispatch(program, args))
        }

        async fn run_with_input(
            &self,
            program: &str,
            args: &[String],
            _input: &[u8],
        ) -> std::io::Result<CommandOutput> {
            Ok(self.dispatch(program, args))
        }
    }

    pub fn ok(stdout: &[u8]) -> CommandOutput {
        CommandOutput {
            success: true,
            code: Some(0),
            stdout: stdout.to_vec(),
            stderr: Vec::new(),
        }
    }

    pub fn failed(code: i32, stderr: &[u8]) -> CommandOutput {
        CommandOutput {
            success: false,
            code: Some(code),
            stdout: Vec::new(),
            stderr: stderr.to_vec(),
        }
    }
}
