use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use plugin_verifier::dependencies::{pretty_print, Plugin};
use plugin_verifier::diagnostics::{CollectingRegistrar, Diagnostics};
use plugin_verifier::ir::{Origin, OriginKind};
use plugin_verifier::resolver::Resolver;
use plugin_verifier::source::{open_library_directory, open_source};
use plugin_verifier::{
    CancellationToken, VerificationRequest, VerificationSummary, Verifier, VerifierConfig,
};

/// CLI arguments for plugin-verifier execution.
#[derive(Parser, Debug)]
#[command(
    name = "plugin-verifier",
    about = "Checks that a JVM plugin stays binary compatible with one or more platform builds.",
    version
)]
struct Cli {
    /// Plugin classes: a jar, a class directory or a single class file.
    #[arg(long, value_name = "PATH")]
    plugin: PathBuf,
    #[arg(long, value_name = "ID")]
    plugin_id: Option<String>,
    /// Platform build to verify against; a distribution directory with a `lib/` folder or a
    /// single jar. Repeatable.
    #[arg(long, value_name = "PATH", required = true)]
    platform: Vec<PathBuf>,
    #[arg(long, value_name = "PATH")]
    jdk: Option<PathBuf>,
    #[arg(long, value_name = "PATH")]
    classpath: Vec<PathBuf>,
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    /// Print the dependency tree of the plugin to stderr.
    #[arg(long)]
    dependencies: bool,
}

#[derive(Serialize)]
struct PlatformReport {
    platform: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<VerificationSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    diagnostics: Diagnostics,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    for input in std::iter::once(&cli.plugin)
        .chain(&cli.platform)
        .chain(&cli.classpath)
        .chain(cli.jdk.as_ref())
    {
        if !input.exists() {
            anyhow::bail!("input not found: {}", input.display());
        }
    }

    let config = match &cli.config {
        Some(path) => VerifierConfig::from_json_file(path)?,
        None => VerifierConfig::default(),
    };
    let plugin_id = cli
        .plugin_id
        .clone()
        .unwrap_or_else(|| file_stem(&cli.plugin));
    let plugin_classes = open_source(&cli.plugin, Origin::new(OriginKind::Plugin, &plugin_id))
        .with_context(|| format!("failed to open plugin {}", cli.plugin.display()))?;
    let jdk = cli
        .jdk
        .as_deref()
        .map(|path| open_source(path, Origin::new(OriginKind::Jdk, path.display().to_string())))
        .transpose()?;
    let mut classpath = Vec::with_capacity(cli.classpath.len());
    for path in &cli.classpath {
        classpath.push(open_source(
            path,
            Origin::new(OriginKind::Library, path.display().to_string()),
        )?);
    }

    let started_at = Instant::now();
    let verifier = Verifier::new(config);
    let plugin = Plugin::new(&plugin_id, "");
    let cancellation = CancellationToken::new();
    let reports: Vec<PlatformReport> = std::thread::scope(|scope| {
        let handles: Vec<_> = cli
            .platform
            .iter()
            .map(|platform| {
                let request = (|| -> Result<VerificationRequest> {
                    let mut request =
                        VerificationRequest::new(plugin.clone(), Arc::clone(&plugin_classes))
                            .with_platform(open_platform(platform)?);
                    if let Some(jdk) = &jdk {
                        request = request.with_platform(Arc::clone(jdk));
                    }
                    for library in &classpath {
                        request = request.with_classpath(Arc::clone(library));
                    }
                    Ok(request)
                })();
                let verifier = &verifier;
                let cancellation = &cancellation;
                scope.spawn(move || verify_platform(verifier, platform, request, cancellation))
            })
            .collect();
        handles
            .into_iter()
            .zip(&cli.platform)
            .map(|(handle, platform)| {
                handle.join().unwrap_or_else(|_| PlatformReport {
                    platform: platform.clone(),
                    summary: None,
                    error: Some("verification thread panicked".to_string()),
                    diagnostics: Diagnostics::default(),
                })
            })
            .collect()
    });

    if cli.dependencies {
        if let Some(summary) = reports.iter().find_map(|report| report.summary.as_ref()) {
            eprint!("{}", pretty_print(&summary.dependency_graph));
        }
    }

    let mut writer = output_writer(cli.output.as_deref())?;
    serde_json::to_writer_pretty(&mut writer, &reports)
        .context("failed to serialize verification report")?;
    writer
        .write_all(b"\n")
        .context("failed to write verification report")?;
    log::info!(
        "verified {plugin_id} against {} platform(s) in {} ms",
        reports.len(),
        started_at.elapsed().as_millis()
    );

    Ok(())
}

fn verify_platform(
    verifier: &Verifier,
    platform: &Path,
    request: Result<VerificationRequest>,
    cancellation: &CancellationToken,
) -> PlatformReport {
    let registrar = CollectingRegistrar::new();
    let outcome = request.and_then(|request| {
        verifier
            .verify(&request, &registrar, cancellation)
            .map_err(anyhow::Error::from)
    });
    let (summary, error) = match outcome {
        Ok(summary) => (Some(summary), None),
        Err(err) => {
            log::error!("verification against {} failed: {err:#}", platform.display());
            (None, Some(format!("{err:#}")))
        }
    };
    PlatformReport {
        platform: platform.to_path_buf(),
        summary,
        error,
        diagnostics: registrar.snapshot(),
    }
}

/// A distribution directory contributes every jar under `lib/`; anything else is opened as a
/// single class source.
fn open_platform(path: &Path) -> Result<Arc<dyn Resolver>> {
    let origin = Origin::new(OriginKind::Platform, path.display().to_string());
    let lib = path.join("lib");
    let resolver: Arc<dyn Resolver> = if lib.is_dir() {
        Arc::new(open_library_directory(&lib, origin)?)
    } else {
        open_source(path, origin)?
    };
    Ok(resolver)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "plugin".to_string())
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Ok(Box::new(io::stdout())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_accepts_repeated_platforms() {
        let cli = Cli::try_parse_from([
            "plugin-verifier",
            "--plugin",
            "plugin.jar",
            "--platform",
            "a",
            "--platform",
            "b",
            "--classpath",
            "dep.jar",
        ])
        .expect("parse arguments");

        assert_eq!(cli.platform, vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert_eq!(cli.classpath, vec![PathBuf::from("dep.jar")]);
        assert!(cli.plugin_id.is_none());
    }

    #[test]
    fn cli_requires_a_platform() {
        assert!(Cli::try_parse_from(["plugin-verifier", "--plugin", "plugin.jar"]).is_err());
    }

    #[test]
    fn plugin_id_defaults_to_file_stem() {
        assert_eq!(file_stem(Path::new("/tmp/my-plugin.jar")), "my-plugin");
    }

    #[test]
    fn missing_input_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cli = Cli::try_parse_from([
            "plugin-verifier",
            "--plugin",
            dir.path().join("absent.jar").to_str().expect("utf-8 path"),
            "--platform",
            dir.path().to_str().expect("utf-8 path"),
        ])
        .expect("parse arguments");

        let err = run(cli).expect_err("absent plugin");
        assert!(err.to_string().contains("input not found"));
    }
}
