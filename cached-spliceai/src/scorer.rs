//! External SpliceAI scorer
//!
//! Runs the `spliceai` program once per cache miss: the record goes in on
//! stdin as a one-record VCF, the annotated VCF comes back on stdout.

use anyhow::{bail, Context, Result};
use spliceai_cache::cache::{AnnotationContext, CachedResult, ScoringParams};
use spliceai_cache::scorer::DeltaScorer;
use spliceai_cache::vcf::{VariantRecord, VcfHeader, VcfReader, VcfRecord};
use spliceai_cache::{SpliceAiScore, SPLICEAI_INFO_ID};
use std::io::Cursor;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Default scorer program looked up on `PATH`
pub const DEFAULT_PROGRAM: &str = "spliceai";

#[derive(Debug, Clone)]
pub struct CommandScorer {
    program: PathBuf,
    header: VcfHeader,
}

impl CommandScorer {
    /// Scorer for records read under `header`
    pub fn new(header: VcfHeader) -> Self {
        Self {
            program: PathBuf::from(DEFAULT_PROGRAM),
            header,
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    /// Scorer arguments; list parameters cannot be passed to the program
    pub fn command_args(
        context: &AnnotationContext,
        params: &ScoringParams,
    ) -> Result<Vec<String>> {
        let distance = params.max_distance.as_single().with_context(|| {
            format!("Per-allele distance {} cannot be scored", params.max_distance)
        })?;
        let mask = params
            .mask
            .as_single()
            .with_context(|| format!("Per-allele mask {} cannot be scored", params.mask))?;

        Ok(vec![
            "-R".to_string(),
            context.reference.clone(),
            "-A".to_string(),
            context.annotation.clone(),
            "-D".to_string(),
            distance.to_string(),
            "-M".to_string(),
            mask.to_string(),
        ])
    }

    /// One-record VCF fed to the program
    pub fn render_input(header: &VcfHeader, record: &VcfRecord) -> String {
        format!("{}{}\n", header, record)
    }

    /// SpliceAI values of the first record in the program's output
    pub fn extract_scores(stdout: &str) -> Result<CachedResult> {
        let mut reader = VcfReader::new(Cursor::new(stdout))
            .context("Failed to read scorer output header")?;
        let record = match reader.records().next() {
            Some(record) => record.context("Failed to parse scorer output record")?,
            None => bail!("Scorer output contains no record"),
        };

        let Some(value) = record.info_value(SPLICEAI_INFO_ID) else {
            return Ok(Vec::new());
        };

        value
            .split(',')
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<SpliceAiScore>()
                    .map(|score| score.to_string())
                    .context("Scorer produced a malformed annotation")
            })
            .collect()
    }
}

impl DeltaScorer for CommandScorer {
    async fn score(
        &self,
        record: &VcfRecord,
        context: &AnnotationContext,
        params: &ScoringParams,
    ) -> Result<CachedResult> {
        let mut cmd = Command::new(&self.program);
        cmd.args(Self::command_args(context, params)?);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Scoring {}:{} with {:?}", record.chrom(), record.pos(), cmd);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to execute {}", self.program.display()))?;
        let mut stdin = child.stdin.take().context("Scorer stdin not captured")?;
        let input = Self::render_input(&self.header, record);

        let write = async move {
            stdin.write_all(input.as_bytes()).await?;
            stdin.shutdown().await
        };
        let ((), output) = futures::try_join!(write, child.wait_with_output())
            .with_context(|| format!("Failed to communicate with {}", self.program.display()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            );
        }
        if !stderr.trim().is_empty() {
            tracing::debug!("{} stderr: {}", self.program.display(), stderr.trim());
        }

        Self::extract_scores(&stdout)
    }
}
