//! `fetch` command: download URLs into a single file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use console::style;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use imgbundle::{BundleConfig, BundleReport, BundleRequest, Bundler, ConfigFile};

use crate::error::CliError;

/// Arguments for `imgbundle fetch`.
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// URLs to download, in archive order
    pub urls: Vec<String>,

    /// Read further URLs from a file, one per line ('#' starts a comment)
    #[arg(long, short = 'f', value_name = "PATH")]
    pub from_file: Option<PathBuf>,

    /// Archive name, without .zip
    #[arg(long, short = 'n')]
    pub name: Option<String>,

    /// Directory to save into
    #[arg(long, short = 'o', value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Number of downloads to run at once
    #[arg(long, short = 'c')]
    pub concurrency: Option<usize>,

    /// Per-request timeout in seconds (0 disables it)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

impl FetchArgs {
    /// Settings from the config file with command-line overrides applied.
    fn bundle_config(&self, file: &ConfigFile) -> BundleConfig {
        let mut config = BundleConfig::from_config_file(file);
        if let Some(n) = self.concurrency {
            config = config.with_concurrency(n);
        }
        if let Some(secs) = self.timeout {
            config = config.with_timeout((secs > 0).then(|| Duration::from_secs(secs)));
        }
        if let Some(dir) = &self.output_dir {
            config = config.with_output_dir(dir);
        }
        if let Some(name) = &self.name {
            config = config.with_archive_name(name);
        }
        config
    }

    /// Command-line URLs followed by those from `--from-file`.
    fn collect_urls(&self) -> Result<Vec<String>, CliError> {
        let mut urls: Vec<String> = self
            .urls
            .iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();

        if let Some(path) = &self.from_file {
            urls.extend(read_url_list(path)?);
        }

        if urls.is_empty() {
            return Err(CliError::Input(
                "No URLs given. Pass them as arguments or with --from-file.".to_string(),
            ));
        }
        Ok(urls)
    }
}

fn read_url_list(path: &Path) -> Result<Vec<String>, CliError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        CliError::Input(format!("Cannot read URL list {}: {}", path.display(), e))
    })?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn progress_bar(total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=> ");
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Run the fetch command.
pub fn run(args: FetchArgs, file: &ConfigFile) -> Result<(), CliError> {
    let urls = args.collect_urls()?;
    let config = args.bundle_config(file);
    debug!(?config, sources = urls.len(), "fetch command");

    let bundler = Bundler::new(config)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    ctrlc::set_handler(move || on_interrupt.cancel())
        .map_err(|e| CliError::Runtime(format!("cannot install Ctrl-C handler: {}", e)))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let total = urls.len();
    let bar = progress_bar(total);
    let progress = bar.clone();
    let failures = bar.clone();

    let request = BundleRequest::new(urls)
        .on_progress(move |done, _total| progress.set_position(done as u64))
        .on_error(move |url, err| {
            failures.println(format!("{} {} ({})", style("failed").red(), url, err));
        });

    let result = runtime.block_on(bundler.run(request, cancel));
    bar.finish_and_clear();

    let report = result?;
    print_summary(&report, total)
}

fn print_summary(report: &BundleReport, total: usize) -> Result<(), CliError> {
    match &report.output {
        Some(saved) => {
            println!(
                "{} {} ({} of {} images, {})",
                style("Saved").green().bold(),
                saved.path.display(),
                report.succeeded,
                total,
                HumanBytes(saved.bytes_written)
            );
            if report.has_failures() {
                println!(
                    "{} {} image(s) could not be downloaded",
                    style("Note:").yellow(),
                    report.failed.len()
                );
            }
            Ok(())
        }
        None => Err(CliError::NothingSaved {
            failed: report.failed.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn args(urls: &[&str]) -> FetchArgs {
        FetchArgs {
            urls: urls.iter().map(|u| u.to_string()).collect(),
            from_file: None,
            name: None,
            output_dir: None,
            concurrency: None,
            timeout: None,
        }
    }

    #[test]
    fn test_collect_urls_merges_file() {
        let mut list = NamedTempFile::new().unwrap();
        writeln!(list, "# gallery").unwrap();
        writeln!(list, "https://example.com/b.png").unwrap();
        writeln!(list).unwrap();
        writeln!(list, "  https://example.com/c.png  ").unwrap();

        let mut args = args(&["https://example.com/a.png"]);
        args.from_file = Some(list.path().to_path_buf());

        assert_eq!(
            args.collect_urls().unwrap(),
            vec![
                "https://example.com/a.png",
                "https://example.com/b.png",
                "https://example.com/c.png",
            ]
        );
    }

    #[test]
    fn test_collect_urls_requires_input() {
        let err = args(&[" "]).collect_urls().unwrap_err();
        assert!(matches!(err, CliError::Input(_)));
    }

    #[test]
    fn test_flags_override_config_file() {
        let file = ConfigFile::default();
        let mut args = args(&[]);
        args.concurrency = Some(0);
        args.timeout = Some(0);
        args.name = Some("trip".to_string());
        args.output_dir = Some(PathBuf::from("/tmp/out"));

        let config = args.bundle_config(&file);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.timeout, None);
        assert_eq!(config.archive_name, "trip");
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_config_file_values_are_defaults() {
        let file = ConfigFile::default();
        let config = args(&[]).bundle_config(&file);
        assert_eq!(config, BundleConfig::from_config_file(&file));
    }

    #[test]
    fn test_summary_without_output_is_an_error() {
        let report = BundleReport::default();
        assert!(matches!(
            print_summary(&report, 0),
            Err(CliError::NothingSaved { failed: 0 })
        ));
    }
}
