// 📈 External statistical step (black box)
//
// Consumes the workbooks written by the scrape, produces the processed
// score workbook read back by ingest.

use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info};

use crate::config::StatsConfig;
use crate::error::{PipelineError, PipelineResult};

pub struct StatisticalStep {
    config: StatsConfig,
}

impl StatisticalStep {
    pub fn new(config: StatsConfig) -> Self {
        StatisticalStep { config }
    }

    /// First candidate command that answers `--version`.
    pub fn locate(&self) -> Option<String> {
        self.config.commands.iter().find_map(|cmd| {
            let ok = Command::new(cmd)
                .arg("--version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|s| s.success())
                .unwrap_or(false);
            debug!(command = %cmd, available = ok, "probing statistical tool");
            ok.then(|| cmd.clone())
        })
    }

    pub fn script_exists(&self) -> bool {
        self.config.working_dir.join(&self.config.script).exists()
    }

    /// Run the tool. `Ok(false)` when no candidate command is installed.
    pub fn run(&self) -> PipelineResult<bool> {
        let Some(command) = self.locate() else {
            return Ok(false);
        };
        self.run_with(&command)?;
        Ok(true)
    }

    pub fn run_with(&self, command: &str) -> PipelineResult<()> {
        let working_dir: &Path = &self.config.working_dir;
        info!(
            command,
            script = %self.config.script.display(),
            "running statistical step"
        );

        let output = Command::new(command)
            .arg(&self.config.script)
            .args(&self.config.args)
            .current_dir(working_dir)
            .output()
            .map_err(|e| PipelineError::ExternalTool(format!("{} could not start: {}", command, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::ExternalTool(format!(
                "{} exited with {}: {}",
                command,
                output.status,
                stderr.trim()
            )));
        }

        info!("statistical step finished");
        Ok(())
    }
}
