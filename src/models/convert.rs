use crate::config::schema::ConverterConfig;
use crate::error::{PullError, Result};
use crate::models::fetch::compile_patterns;
use glob::Pattern;
use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Rewrites a directory of downloaded checkpoint files into the runtime format, in place
pub trait Converter {
    /// Convert `model_dir`; when `remove_originals` is set, the pre-conversion
    /// weight files are deleted once conversion succeeded.
    fn convert(&self, model_dir: &Path, model_name: &str, remove_originals: bool) -> Result<()>;
}

/// Converter that shells out to an external conversion program
///
/// `{model_dir}` and `{model_name}` in the argument list are substituted before
/// the program runs. Files matching the configured remove patterns are deleted
/// afterwards when originals should not be kept.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    program: String,
    args: Vec<String>,
    remove_patterns: Vec<Pattern>,
}

impl CommandConverter {
    /// Create new converter
    pub fn new(program: &str, args: Vec<String>, remove_patterns: &[String]) -> Result<Self> {
        Ok(Self {
            program: program.to_string(),
            args,
            remove_patterns: compile_patterns(remove_patterns)?,
        })
    }

    /// Create converter from config
    pub fn from_config(config: &ConverterConfig) -> Result<Self> {
        Self::new(&config.program, config.args.clone(), &config.remove_patterns)
    }

    fn expand_args(&self, model_dir: &Path, model_name: &str) -> Vec<String> {
        let dir = model_dir.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{model_dir}", &dir)
                    .replace("{model_name}", model_name)
            })
            .collect()
    }

    fn remove_originals(&self, model_dir: &Path) -> Result<()> {
        for entry in fs::read_dir(model_dir)?.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if self.remove_patterns.iter().any(|p| p.matches(&name)) {
                debug!("Removing original {}", path.display());
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

impl Converter for CommandConverter {
    fn convert(&self, model_dir: &Path, model_name: &str, remove_originals: bool) -> Result<()> {
        if which::which(&self.program).is_err() {
            return Err(PullError::Conversion(format!(
                "Converter program '{}' not found in PATH",
                self.program
            )));
        }

        let args = self.expand_args(model_dir, model_name);
        info!("Converting {model_name}");
        debug!("Running {} {}", self.program, args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                PullError::Conversion(format!("Failed to spawn {}: {e}", self.program))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PullError::Conversion(format!(
                "{} exited with {} while converting {model_name}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        if remove_originals {
            self.remove_originals(model_dir)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str) -> CommandConverter {
        CommandConverter::new(
            "sh",
            vec!["-c".to_string(), script.to_string()],
            &["pytorch_model*.bin".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_expand_args() {
        let converter = CommandConverter::new(
            "python3",
            vec![
                "convert.py".to_string(),
                "--checkpoint-dir={model_dir}".to_string(),
                "{model_name}".to_string(),
            ],
            &[],
        )
        .unwrap();

        let args = converter.expand_args(Path::new("/m/stage"), "org/model");
        assert_eq!(
            args,
            vec!["convert.py", "--checkpoint-dir=/m/stage", "org/model"]
        );
    }

    #[test]
    fn test_convert_runs_and_removes_originals() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("pytorch_model-00001-of-00002.bin"), "w1").unwrap();
        fs::write(dir.join("pytorch_model-00002-of-00002.bin"), "w2").unwrap();
        fs::write(dir.join("tokenizer.model"), "tok").unwrap();

        sh("touch {model_dir}/model.pth")
            .convert(dir, "m", true)
            .unwrap();

        assert!(dir.join("model.pth").exists());
        assert!(dir.join("tokenizer.model").exists());
        assert!(!dir.join("pytorch_model-00001-of-00002.bin").exists());
        assert!(!dir.join("pytorch_model-00002-of-00002.bin").exists());
    }

    #[test]
    fn test_convert_keeps_originals_when_asked() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("pytorch_model.bin"), "w").unwrap();

        sh("true").convert(dir, "m", false).unwrap();
        assert!(dir.join("pytorch_model.bin").exists());
    }

    #[test]
    fn test_convert_failure_keeps_originals() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("pytorch_model.bin"), "w").unwrap();

        let err = sh("echo bad checkpoint >&2; exit 3")
            .convert(dir, "m", true)
            .unwrap_err();

        assert!(matches!(err, PullError::Conversion(_)));
        assert!(err.to_string().contains("bad checkpoint"));
        assert!(dir.join("pytorch_model.bin").exists());
    }

    #[test]
    fn test_convert_error_reports_stderr_only() {
        let temp_dir = TempDir::new().unwrap();

        let err = sh("echo converting layer 1; echo unsupported dtype >&2; exit 1")
            .convert(temp_dir.path(), "m", false)
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("unsupported dtype"));
        assert!(!message.contains("converting layer 1"));
    }

    #[test]
    fn test_missing_program() {
        let temp_dir = TempDir::new().unwrap();
        let converter =
            CommandConverter::new("modelpull-no-such-converter", Vec::new(), &[]).unwrap();
        let err = converter.convert(temp_dir.path(), "m", true).unwrap_err();
        assert!(err.to_string().contains("not found in PATH"));
    }
}
