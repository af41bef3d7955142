use std::env::current_dir;
use std::path::Path;

use anyhow::{Context, Error};
use chrono::Local;
use console::{style, Term};
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, trace, warn};

use crate::booru::{
    create_run_folder, init_config, init_logger, FetchRequest, Pipeline, RunSummary, StopReason,
};
use crate::log_system_information;

/// The name of the cargo package.
const NAME: &str = env!("CARGO_PKG_NAME");

/// The version of the cargo package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Directory holding `config.toml`.
const CONFIG_DIR: &str = "config";

/// A program class that handles the flow of the downloader user experience and steps of execution.
pub(crate) struct Program;

impl Program {
    /// Creates a new instance of the program.
    pub(crate) fn new() -> Self {
        Self
    }

    /// Runs the downloader program.
    pub(crate) async fn run(&self) -> Result<(), Error> {
        Term::stdout().set_title("booru downloader");

        let config_manager = init_config(CONFIG_DIR).context("Failed to load configuration")?;
        let config = config_manager.get_app_config();
        let _logger = init_logger(&config.logging).context("Failed to initialize logging")?;

        trace!("Program Name: {}", NAME);
        trace!("Program Version: {}", VERSION);
        log_system_information();
        let working_dir = current_dir().context("Unable to get working directory")?;
        trace!("Program Working Directory: {}", working_dir.display());

        let (target, tags) = Self::prompt_request()?;
        let request = FetchRequest::new(&tags, target)?;

        // The run folder exists before the first page is requested
        let run_folder = create_run_folder(
            Path::new(&config.download.directory),
            request.tags(),
            Local::now().date_naive(),
        )?;
        info!("Saving files to {}", run_folder.display());

        let progress = ProgressBar::new(request.target() as u64);
        progress.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")?
                .progress_chars("=>-"),
        );

        let pipeline = Pipeline::from_config(config, request, run_folder, progress.clone())?;
        let summary = pipeline.run().await;
        progress.finish_and_clear();

        Self::report(&summary);
        Ok(())
    }

    /// Asks the operator for the target count and the tag string.
    fn prompt_request() -> Result<(usize, String), Error> {
        let target: usize = Input::new()
            .with_prompt("Number of images to download")
            .validate_with(|n: &usize| -> Result<(), &'static str> {
                if *n >= 1 {
                    Ok(())
                } else {
                    Err("Enter a number of at least 1")
                }
            })
            .interact_text()
            .context("Failed to read the image count")?;

        let tags: String = Input::new()
            .with_prompt("Tags")
            .allow_empty(true)
            .interact_text()
            .context("Failed to read the tags")?;

        Ok((target, tags))
    }

    fn report(summary: &RunSummary) {
        match &summary.stop {
            StopReason::TargetReached => trace!("Stopped after reaching the target"),
            StopReason::EndOfData => trace!("Stopped because the index ran out of posts"),
            StopReason::PageLimit => warn!("Stopped at the page limit before reaching the target"),
            StopReason::Halted(e) => warn!("Stopped early: {}", e),
        }
        if summary.stop.is_error() {
            println!("{}", style("The run was halted by an index error.").red());
        }

        trace!(
            required = summary.counters.required,
            downloaded = summary.counters.downloaded,
            failed = summary.failed,
            pages = summary.pages_fetched,
            peak_in_flight = summary.peak_in_flight,
            "Run summary"
        );

        println!(
            "Successfully downloaded {} images.",
            style(summary.succeeded).green().bold()
        );
    }
}
