use crate::error::{RunnerError, RunnerErrorCode};
use std::path::Path;

/// A supported worker language, selected by the step file's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Runner {
    Python,
    Ruby,
    Node,
    TypeScript,
}

impl Runner {
    /// Select a runner by the step file's extension. An unsupported extension is a fatal
    /// step error, not a silent fallback.
    pub fn for_step_file(path: &str) -> Result<Self, RunnerError> {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match ext {
            "py" => Ok(Runner::Python),
            "rb" => Ok(Runner::Ruby),
            "js" => Ok(Runner::Node),
            "ts" => Ok(Runner::TypeScript),
            other => Err(RunnerError {
                code: RunnerErrorCode::UnsupportedExtension,
                message: format!("no runner registered for extension '.{other}'"),
                step_name: Some(path.to_string()),
            }),
        }
    }

    /// The executable used to launch this runner's bridge process.
    pub fn command(&self) -> &'static str {
        match self {
            Runner::Python => "python3",
            Runner::Ruby => "ruby",
            Runner::Node | Runner::TypeScript => "node",
        }
    }

    /// Flags passed before the runner bridge file, e.g. a TypeScript source-transform
    /// pre-loader.
    pub fn runner_flags(&self) -> Vec<String> {
        match self {
            Runner::TypeScript => vec!["--loader".to_string(), "ts-node/esm".to_string()],
            _ => Vec::new(),
        }
    }

    /// Path to this runner's own bridge script, relative to a configured runners
    /// directory. The bridge is responsible for loading the user step file and speaking
    /// the RPC protocol back to the parent.
    pub fn bridge_file(&self) -> &'static str {
        match self {
            Runner::Python => "python_runner.py",
            Runner::Ruby => "ruby_runner.rb",
            Runner::Node | Runner::TypeScript => "node_runner.js",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_python_for_py_extension() {
        assert_eq!(Runner::for_step_file("ingest.step.py").unwrap(), Runner::Python);
    }

    #[test]
    fn selects_typescript_for_ts_extension() {
        assert_eq!(Runner::for_step_file("ingest.step.ts").unwrap(), Runner::TypeScript);
    }

    #[test]
    fn unsupported_extension_is_an_error() {
        let err = Runner::for_step_file("ingest.step.go").unwrap_err();
        assert_eq!(err.code, RunnerErrorCode::UnsupportedExtension);
    }

    #[test]
    fn typescript_runner_uses_node_command_with_loader_flag() {
        let runner = Runner::TypeScript;
        assert_eq!(runner.command(), "node");
        assert!(runner.runner_flags().contains(&"--loader".to_string()));
    }
}
