//! The stage orchestrator.
//!
//! A whole run ([`Pipeline::run`]) submits one scheduler job per sample,
//! each of which re-invokes this binary with `--run-on-sample <label>`, waits
//! for all of them, and then aggregates their outputs. A single-sample run
//! ([`Pipeline::run_on_sample`]) takes the sample through the fixed stage
//! sequence
//!
//! ```text
//! preprocess -> map -> qc -> analyze
//! ```
//!
//! where every stage takes the sample by value and returns it with the paths
//! it produced recorded in [`SampleOutputs`](crate::sample::SampleOutputs).

mod analyze;
mod map;
mod preprocess;
mod qc;

pub use self::preprocess::trim_polya;
pub use self::preprocess::trim_polya_file;
pub use self::preprocess::TrimSummary;

use std::env;
use std::path::Path;
use std::path::PathBuf;

use anyhow::bail;
use anyhow::Context;
use tracing::error;
use tracing::info;

use crate::aggregate;
use crate::config::Config;
use crate::dispatch::scheduler_for;
use crate::dispatch::Dispatcher;
use crate::dispatch::JobHandle;
use crate::errors::PipelineError;
use crate::layout::OutputLayout;
use crate::quantification::annotation::AnnotationSet;
use crate::sample::Sample;
use crate::utils::command::CommandLine;
use crate::utils::command::Invocation;

/// A configured pipeline run.
pub struct Pipeline {
    config: Config,
    layout: OutputLayout,
    samples: Vec<Sample>,
    annotation: AnnotationSet,
    dispatcher: Dispatcher,
    executable: PathBuf,
}

/// Returns the path recorded by an earlier stage, or an error naming what is
/// missing.
fn required<'a>(path: &'a Option<PathBuf>, what: &str) -> anyhow::Result<&'a Path> {
    match path {
        Some(path) => Ok(path),
        None => bail!("no {} recorded for this sample", what),
    }
}

impl Pipeline {
    /// Sets up a run: creates the output tree, builds the samples, and loads
    /// the reference tables.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let layout = OutputLayout::new(&config.output_dir);
        layout.create()?;

        let samples = config.samples()?;
        let annotation = AnnotationSet::discover(&config.init_dir)?;

        let working_dir = env::current_dir().context("getting the working directory")?;
        let dispatcher = Dispatcher::new(
            scheduler_for(config.cluster_type),
            layout.logs_dir(),
            working_dir,
        );
        let executable = env::current_exe().context("locating the running executable")?;

        Ok(Self {
            config,
            layout,
            samples,
            annotation,
            dispatcher,
            executable,
        })
    }

    /// Replaces the dispatcher jobs are submitted through.
    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Replaces the program sample jobs invoke with `--run-on-sample`.
    pub fn with_executable<P>(mut self, executable: P) -> Self
    where
        P: Into<PathBuf>,
    {
        self.executable = executable.into();
        self
    }

    /// The samples of this run.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// The output tree.
    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Looks up a sample by label.
    pub fn sample(&self, label: &str) -> Result<&Sample, PipelineError> {
        self.samples
            .iter()
            .find(|sample| sample.label == label)
            .ok_or_else(|| PipelineError::MissingSample(label.to_string()))
    }

    /// Runs every sample as a scheduler job, waits for all of them, and
    /// compiles the cross-sample outputs.
    pub fn run(&mut self) -> anyhow::Result<()> {
        info!("Running pipeline.");

        if self.samples.is_empty() {
            bail!(PipelineError::Configuration(String::from(
                "no samples to run on"
            )));
        }
        info!("Running on {} samples", self.samples.len());

        let handles = self.run_on_samples()?;
        let summary = self.dispatcher.wait_all(&handles)?;
        info!("All sample jobs finished ({} polls).", summary.polls);

        aggregate::compile_qc(&self.samples, &self.layout)?;
        aggregate::compile_quantification(&self.samples, &self.annotation, &self.layout)?;

        info!("Run completed!");
        Ok(())
    }

    /// The command a sample job runs.
    pub fn sample_command(&self, label: &str) -> anyhow::Result<CommandLine> {
        Ok(CommandLine::new(
            Invocation::new(self.executable.display().to_string())
                .arg("--run-on-sample")
                .arg(label)
                .arg("--settings")
                .path_arg(&self.config.settings_path)
                .arg("--output-dir")
                .path_arg(self.layout.root()),
        ))
    }

    fn run_on_samples(&mut self) -> anyhow::Result<Vec<JobHandle>> {
        info!("Running on samples..");

        let mut handles = Vec::with_capacity(self.samples.len());
        for i in 0..self.samples.len() {
            let label = self.samples[i].label.clone();
            info!("Processing sample {}", self.samples[i]);

            let command = self.sample_command(&label)?;
            let handle = self
                .dispatcher
                .submit_async(&command, &format!("pipeline_run_{}", label))?;
            handles.push(handle);
        }

        Ok(handles)
    }

    /// Takes one sample through every stage. A failure is logged with the
    /// sample's label and returned.
    pub fn run_on_sample(&mut self, label: &str) -> anyhow::Result<Sample> {
        info!("Running on sample: {}", label);
        let sample = self.sample(label)?.clone();

        self.process(sample).map_err(|err| {
            error!("Failed while running on sample {}: {:#}", label, err);
            err
        })
    }

    fn process(&mut self, sample: Sample) -> anyhow::Result<Sample> {
        info!("Preprocessing reads");
        let sample = self.preprocess(sample).context("preprocessing reads")?;

        info!("Mapping reads");
        let sample = self.map(sample).context("mapping reads")?;

        info!("Running QC");
        let sample = self.qc(sample).context("running QC")?;

        info!("Running analysis");
        let sample = self.analyze(sample).context("running analysis")?;

        Ok(sample)
    }
}
