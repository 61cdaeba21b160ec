// Scripted command runner for driver tests.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::backend::{CommandOutput, CommandRunner, CommandSpec};

enum Reply {
    Output(CommandOutput),
    Error(String),
}

/// Records every command and answers from substring-matched rules.
///
/// Rules are checked in insertion order against the rendered command line;
/// an unmatched command succeeds with empty output.
#[derive(Clone, Default)]
pub struct FakeRunner {
    rules: Arc<Mutex<Vec<(String, Reply)>>>,
    calls: Arc<Mutex<Vec<CommandSpec>>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, pattern: &str, stdout: &str) -> &Self {
        self.rules.lock().push((
            pattern.to_string(),
            Reply::Output(CommandOutput {
                code: 0,
                stdout: stdout.to_string(),
                stderr: String::new(),
            }),
        ));
        self
    }

    pub fn fail(&self, pattern: &str, code: i32, stderr: &str) -> &Self {
        self.rules.lock().push((
            pattern.to_string(),
            Reply::Output(CommandOutput {
                code,
                stdout: String::new(),
                stderr: stderr.to_string(),
            }),
        ));
        self
    }

    /// The command cannot even be spawned.
    pub fn spawn_error(&self, pattern: &str, message: &str) -> &Self {
        self.rules
            .lock()
            .push((pattern.to_string(), Reply::Error(message.to_string())));
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls.lock().iter().map(CommandSpec::display).collect()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.calls.lock().push(spec.clone());
        let line = spec.display();
        let rules = self.rules.lock();
        for (pattern, reply) in rules.iter() {
            if line.contains(pattern.as_str()) {
                return match reply {
                    Reply::Output(out) => Ok(out.clone()),
                    Reply::Error(msg) => Err(anyhow::anyhow!("{msg}")),
                };
            }
        }
        Ok(CommandOutput::default())
    }
}
