//! A host that answers from canned responses.
//!
//! Responses are keyed by the exact command line. A key registered with
//! [`ScriptedHost::respond_sequence`] hands out its responses in order and
//! keeps repeating the last one. Unknown commands get the default response
//! (exit 0, empty output) unless [`ScriptedHost::fail_unknown`] is set.
//! Every command that reaches the host is recorded.

use anyhow::Result;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use super::{CommandOutput, Host, HostCommand};

#[derive(Debug, Default)]
pub struct ScriptedHost {
    responses: RefCell<HashMap<String, VecDeque<CommandOutput>>>,
    log: RefCell<Vec<String>>,
    default: RefCell<Option<CommandOutput>>,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self {
            default: RefCell::new(Some(CommandOutput::ok(""))),
            ..Self::default()
        }
    }

    /// Always answer `command_line` with `output`.
    pub fn respond(&self, command_line: &str, output: CommandOutput) -> &Self {
        self.respond_sequence(command_line, vec![output])
    }

    /// Answer `command_line` with each output in turn, repeating the last.
    pub fn respond_sequence(&self, command_line: &str, outputs: Vec<CommandOutput>) -> &Self {
        self.responses
            .borrow_mut()
            .insert(command_line.to_string(), outputs.into());
        self
    }

    /// Make unscripted commands return an error instead of succeeding.
    pub fn fail_unknown(&self) -> &Self {
        *self.default.borrow_mut() = None;
        self
    }

    /// Every command line run so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    /// Number of times `command_line` was run.
    pub fn count(&self, command_line: &str) -> usize {
        self.log
            .borrow()
            .iter()
            .filter(|line| line.as_str() == command_line)
            .count()
    }

    /// Recorded commands starting with `prefix`.
    pub fn commands_starting_with(&self, prefix: &str) -> Vec<String> {
        self.log
            .borrow()
            .iter()
            .filter(|line| line.starts_with(prefix))
            .cloned()
            .collect()
    }
}

impl Host for ScriptedHost {
    fn run(&self, command: &HostCommand) -> Result<CommandOutput> {
        let line = command.command_line();
        self.log.borrow_mut().push(line.clone());

        let mut responses = self.responses.borrow_mut();
        if let Some(queue) = responses.get_mut(&line) {
            let output = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            if let Some(output) = output {
                return Ok(output);
            }
        }

        match self.default.borrow().clone() {
            Some(output) => Ok(output),
            None => anyhow::bail!("No scripted response for: {}", line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_repeats_last_response() {
        let host = ScriptedHost::new();
        host.respond_sequence(
            "systemctl is-active httpd",
            vec![
                CommandOutput::with_status(3, "inactive"),
                CommandOutput::ok("active"),
            ],
        );
        let cmd = HostCommand::query("systemctl", ["is-active", "httpd"]);
        assert_eq!(host.run(&cmd).unwrap().stdout, "inactive");
        assert_eq!(host.run(&cmd).unwrap().stdout, "active");
        assert_eq!(host.run(&cmd).unwrap().stdout, "active");
        assert_eq!(host.count("systemctl is-active httpd"), 3);
    }

    #[test]
    fn test_unknown_commands() {
        let host = ScriptedHost::new();
        let cmd = HostCommand::query("uptime", Vec::<String>::new());
        assert!(host.run(&cmd).unwrap().success());

        host.fail_unknown();
        assert!(host.run(&cmd).is_err());
        assert_eq!(host.commands().len(), 2);
    }
}
