//! Prepress pass through an external PDF optimizer (Ghostscript by default)

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{info, warn};

use crate::{Error, Result};

/// External optimizer invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepressOptimizer {
    pub program: OsString,
    pub compatibility_level: String,
    pub pdf_settings: String,
}

impl Default for PrepressOptimizer {
    fn default() -> Self {
        Self {
            program: OsString::from("gs"),
            compatibility_level: "1.4".to_string(),
            pdf_settings: "/prepress".to_string(),
        }
    }
}

/// `<dir>/<stem>-prepress.pdf`
pub fn prepress_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    input.with_file_name(format!("{}-prepress.pdf", stem))
}

impl PrepressOptimizer {
    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Whether the optimizer can be run at all
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Write an optimized copy of `input` beside it and return its path.
    ///
    /// `input` is never modified. A partial output is removed on failure.
    pub fn optimize_for_prepress(&self, input: &Path) -> Result<PathBuf> {
        if !input.is_file() {
            return Err(Error::OptimizerError(format!("input '{}' does not exist", input.display())));
        }
        let output = prepress_output_path(input);

        let mut out_arg = OsString::from("-sOutputFile=");
        out_arg.push(output.as_os_str());

        let result = Command::new(&self.program)
            .args([
                "-dBATCH".to_string(),
                "-dNOPAUSE".to_string(),
                "-sDEVICE=pdfwrite".to_string(),
                format!("-dCompatibilityLevel={}", self.compatibility_level),
                format!("-dPDFSETTINGS={}", self.pdf_settings),
                "-dQUIET".to_string(),
            ])
            .arg(out_arg)
            .arg(input)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output();

        let failure = match result {
            Err(e) => Some(format!("failed to run '{}': {}", self.program.to_string_lossy(), e)),
            Ok(out) if !out.status.success() => Some(format!(
                "'{}' exited with {}: {}",
                self.program.to_string_lossy(),
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )),
            Ok(_) if !output.is_file() => Some(format!("no output written to '{}'", output.display())),
            Ok(_) => None,
        };

        if let Some(message) = failure {
            if output.exists() {
                if let Err(e) = std::fs::remove_file(&output) {
                    warn!("Could not remove partial output '{}': {}", output.display(), e);
                }
            }
            return Err(Error::OptimizerError(message));
        }

        info!("Prepress copy written to {}", output.display());
        Ok(output)
    }
}
