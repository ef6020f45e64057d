//! Launch specifications for tool server scripts
//!
//! スクリプトの拡張子から起動コマンドを決定する

use std::path::Path;

use relay_core::LaunchConfig;

use crate::error::ConnectError;

/// How to start a tool server as a child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Program to execute
    pub command: String,
    /// Arguments passed to the program
    pub args: Vec<String>,
}

impl LaunchSpec {
    /// Create a launch spec for an arbitrary command
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    /// Pick the interpreter for a server script from its extension
    ///
    /// `.js` runs under Node.js and `.py` under Python (`python` on Windows,
    /// `python3` elsewhere). Anything else is rejected before launch.
    pub fn for_script(path: &str, config: &LaunchConfig) -> Result<Self, ConnectError> {
        let extension = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let command = match extension {
            "js" => config
                .node_command
                .clone()
                .unwrap_or_else(|| "node".to_string()),
            "py" => config
                .python_command
                .clone()
                .unwrap_or_else(|| default_python().to_string()),
            _ => {
                return Err(ConnectError::UnsupportedScript {
                    path: path.to_string(),
                });
            }
        };

        Ok(Self::new(command, vec![path.to_string()]))
    }

    /// Command line for logging
    pub fn display(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn default_python() -> &'static str {
    if cfg!(windows) { "python" } else { "python3" }
}
