use std::path::PathBuf;

use clap::Parser;
use git_testament::git_testament;
use git_testament::render_testament;
use tracing::info;

use seqflow::config::Config;
use seqflow::errors;
use seqflow::errors::ExitCode;
use seqflow::pipeline::Pipeline;

git_testament!(TESTAMENT);

/// Runs sequencing samples through preprocessing, alignment, QC, and analysis.
#[derive(Parser)]
#[command(author, version = render_testament!(TESTAMENT), about, long_about = None)]
struct Cli {
    /// The pipeline settings file.
    #[arg(short, long, value_name = "PATH")]
    settings: PathBuf,

    /// Root of the output tree. Overrides `[data] outdir` from the settings.
    #[arg(short, long, value_name = "PATH")]
    output_dir: Option<PathBuf>,

    /// Process only the sample with this label, in this process.
    #[arg(long, value_name = "LABEL")]
    run_on_sample: Option<String>,

    /// Only errors are printed to the stderr stream.
    #[arg(short, long)]
    quiet: bool,

    /// All available information, including debug information, is printed
    /// to stderr.
    #[arg(short, long)]
    verbose: bool,
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(&cli.settings)?;
    if let Some(output_dir) = cli.output_dir {
        config = config.with_output_dir(output_dir);
    }

    let mut pipeline = Pipeline::new(config)?;

    match cli.run_on_sample {
        Some(label) => {
            let sample = pipeline.run_on_sample(&label)?;
            info!("Finished {}", sample);
        }
        None => pipeline.run()?,
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let mut level = tracing::Level::INFO;
    if cli.quiet {
        level = tracing::Level::ERROR;
    } else if cli.verbose {
        level = tracing::Level::DEBUG;
    }

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    if let Err(err) = run(cli) {
        errors::exit(format!("{:#}", err), ExitCode::for_error(&err));
    }
}
