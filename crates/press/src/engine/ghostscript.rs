//! Ghostscript engine for pdf-press
//!
//! Provides functionality to build and execute Ghostscript pdfwrite
//! commands with per-quality-level presets.

use crate::engine::{Engine, EngineError, EngineProvider, TransformRequest, TransformResponse};
use pdf_press_config::EngineConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;
use uuid::Uuid;

/// Fixed pdfwrite flags shared by every invocation
const GS_BASE_ARGS: &[&str] = &[
    "-dSAFER",
    "-dBATCH",
    "-dNOPAUSE",
    "-dQUIET",
    "-sDEVICE=pdfwrite",
    "-dCompatibilityLevel=1.4",
];

/// Build a Ghostscript command for one invocation
///
/// Creates a Command configured with:
/// - The pdfwrite device and safety/batch flags
/// - The `-dPDFSETTINGS` preset for the requested quality level
/// - Optional image downsampling overrides
/// - Staged input and output paths
///
/// # Arguments
/// * `bin` - Ghostscript binary to invoke
/// * `preset` - Preset name without the leading slash (e.g. "ebook")
/// * `image_dpi_override` - Optional image resolution override in dpi
/// * `input_path` - Staged input file
/// * `output_path` - Staged output file
pub fn build_gs_command(
    bin: &str,
    preset: &str,
    image_dpi_override: Option<u32>,
    input_path: &Path,
    output_path: &Path,
) -> Command {
    let mut cmd = Command::new(bin);

    for arg in GS_BASE_ARGS {
        cmd.arg(arg);
    }

    cmd.arg(format!("-dPDFSETTINGS=/{}", preset));

    if let Some(dpi) = image_dpi_override {
        cmd.arg("-dDownsampleColorImages=true");
        cmd.arg("-dDownsampleGrayImages=true");
        cmd.arg(format!("-dColorImageResolution={}", dpi));
        cmd.arg(format!("-dGrayImageResolution={}", dpi));
    }

    cmd.arg("-o").arg(output_path);
    cmd.arg(input_path);

    cmd
}

/// Staging files for a single invocation, removed on every path.
struct StagedInvocation {
    input_path: PathBuf,
    output_path: PathBuf,
}

impl StagedInvocation {
    fn cleanup(&self) {
        let _ = fs::remove_file(&self.input_path);
        let _ = fs::remove_file(&self.output_path);
    }
}

/// Subprocess-backed engine instance.
///
/// Each instance owns a private staging directory under the configured
/// base; the directory is removed when the instance is dropped, which is
/// how queue resets and lifecycle reinitialization discard engine-owned
/// temporary state.
pub struct GhostscriptEngine {
    bin: String,
    staging_dir: PathBuf,
}

impl GhostscriptEngine {
    /// Create a fresh engine instance with its own staging directory.
    pub fn provision(bin: &str, staging_base: &Path) -> Result<Self, EngineError> {
        let staging_dir = staging_base.join(format!("engine-{}", Uuid::new_v4()));
        fs::create_dir_all(&staging_dir)?;
        Ok(Self {
            bin: bin.to_string(),
            staging_dir,
        })
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    fn run_staged(
        &self,
        request: &TransformRequest,
        preset: &str,
        staged: &StagedInvocation,
    ) -> Result<Vec<u8>, EngineError> {
        fs::write(&staged.input_path, request.input.as_ref())?;

        let mut cmd = build_gs_command(
            &self.bin,
            preset,
            request.image_dpi_override,
            &staged.input_path,
            &staged.output_path,
        );

        let status = cmd.status()?;
        if !status.success() {
            return Err(match status.code() {
                Some(code) => EngineError::Failed(code),
                None => EngineError::Terminated,
            });
        }

        let output = fs::read(&staged.output_path)?;
        if output.is_empty() {
            return Err(EngineError::EmptyOutput);
        }

        Ok(output)
    }
}

impl Engine for GhostscriptEngine {
    fn transform(&mut self, request: &TransformRequest) -> Result<TransformResponse, EngineError> {
        let input_bytes = request.input.len() as u64;

        // The sentinel level never reaches the subprocess.
        if request.quality.bypasses_engine() {
            return Ok(TransformResponse {
                correlation_id: request.correlation_id,
                output: request.input.as_ref().clone(),
                input_bytes,
                output_bytes: input_bytes,
            });
        }

        let preset = request
            .quality
            .gs_preset()
            .expect("non-sentinel level has a preset");

        let staged = StagedInvocation {
            input_path: self.staging_dir.join(format!("in-{}.pdf", request.correlation_id)),
            output_path: self.staging_dir.join(format!("out-{}.pdf", request.correlation_id)),
        };

        let outcome = self.run_staged(request, preset, &staged);
        staged.cleanup();

        let output = outcome?;
        let output_bytes = output.len() as u64;

        debug!(
            quality = %request.quality,
            input_bytes,
            output_bytes,
            "ghostscript invocation complete"
        );

        Ok(TransformResponse {
            correlation_id: request.correlation_id,
            output,
            input_bytes,
            output_bytes,
        })
    }
}

impl Drop for GhostscriptEngine {
    fn drop(&mut self) {
        // Best-effort removal of the per-instance staging directory.
        let _ = fs::remove_dir_all(&self.staging_dir);
    }
}

/// Provider creating Ghostscript engine instances on demand.
#[derive(Debug, Clone)]
pub struct GhostscriptProvider {
    bin: String,
    staging_base: PathBuf,
}

impl GhostscriptProvider {
    pub fn new(bin: impl Into<String>, staging_base: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            staging_base: staging_base.into(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(&config.ghostscript_bin, &config.staging_dir)
    }
}

impl EngineProvider for GhostscriptProvider {
    fn provision(&self) -> Result<Box<dyn Engine>, EngineError> {
        Ok(Box::new(GhostscriptEngine::provision(
            &self.bin,
            &self.staging_base,
        )?))
    }
}
