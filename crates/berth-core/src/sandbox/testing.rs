//! Scripted in-memory `CommandRunner` for tests

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use super::runtime::{CommandOutput, CommandRunner};
use crate::error::{Result, SandboxError};

#[derive(Clone)]
enum Response {
    Output(CommandOutput),
    Fail,
}

/// Responses are keyed by the full space-joined argv or by the subcommand,
/// full argv taking precedence. Queued responses are consumed in order and the
/// last one repeats. Unscripted calls succeed with empty output.
#[derive(Default)]
pub struct FakeRunner {
    responses: Mutex<HashMap<String, VecDeque<Response>>>,
    calls: Mutex<Vec<Vec<String>>>,
    stdin: Mutex<Vec<Option<String>>>,
    delay: Option<Duration>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, key: &str, exit_code: i32, stdout: &str, stderr: &str) -> Self {
        self.push(
            key,
            Response::Output(CommandOutput {
                exit_code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            }),
        )
    }

    /// Make the runner itself error, as if the binary could not be spawned
    pub fn fail(self, key: &str) -> Self {
        self.push(key, Response::Fail)
    }

    /// Sleep before answering each call, to widen race windows
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn push(self, key: &str, response: Response) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, subcommand: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|c| c.first().map(String::as_str) == Some(subcommand))
            .collect()
    }

    pub fn subcommands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| c.first().cloned())
            .collect()
    }

    pub fn stdin_inputs(&self) -> Vec<Option<String>> {
        self.stdin.lock().unwrap().clone()
    }

    fn next_response(&self, args: &[String]) -> Option<Response> {
        let mut responses = self.responses.lock().unwrap();
        let full = args.join(" ");
        let key = if responses.contains_key(&full) {
            full
        } else {
            args.first().cloned().unwrap_or_default()
        };
        let queue = responses.get_mut(&key)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, args: &[String], stdin: Option<&str>) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(args.to_vec());
        self.stdin.lock().unwrap().push(stdin.map(str::to_string));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_response(args) {
            Some(Response::Output(output)) => Ok(output),
            Some(Response::Fail) => Err(SandboxError::RuntimeSpawn {
                binary: "fake".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted failure"),
            }),
            None => Ok(CommandOutput::default()),
        }
    }
}
