//! `resultpush` - Encode JUnit reports and push them to the server.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use resultpush_core::settings::{build_context, release_ref};
use resultpush_core::{
    Credentials, FileOutcome, FileReport, ProxySettings, PublishSettings, Publisher,
    ResultMetadata, Secret, SuiteRef, TypedValue,
};

use super::args::{Cli, MetadataArgs};
use crate::config::FileConfig;

pub async fn run(cli: Cli) -> Result<i32> {
    let inputs = readable_inputs(&cli.files);
    if inputs.is_empty() {
        bail!("no readable input files");
    }

    let config = FileConfig::load(cli.config_file.as_deref())?;
    let settings = build_settings(&cli, config, inputs.len())?;

    let result = Publisher::new(&settings)
        .publish_with(&inputs, |report| println!("{}", progress_line(report)))
        .await;
    match result {
        Ok(summary) => Ok(summary.exit_code()),
        Err(e) => {
            eprintln!("{e}");
            if e.to_string().contains("access_denied") {
                eprintln!("Validate proxy configuration.");
            }
            Ok(e.exit_code())
        }
    }
}

/// Human-readable result of one input file.
fn progress_line(report: &FileReport) -> String {
    let file = report.path.display();
    match &report.outcome {
        FileOutcome::Saved { .. } => "JUnit report was saved to the output file".to_string(),
        FileOutcome::Rejected { reason } => {
            format!("Test result from file '{file}' was not pushed\n{reason}")
        }
        FileOutcome::Pushed(outcome) => {
            let mut line = format!(
                "Test result from file '{file}' was pushed to the server with ID {}",
                outcome.id
            );
            if let Some(status) = &outcome.status {
                line.push_str(&format!(", injection status is '{}'", status.state));
                if let Some(details) = &status.error_details {
                    line.push_str(&format!(", error message is '{details}'"));
                }
            }
            line
        }
    }
}

/// Keep paths that are readable files; report and skip the rest.
fn readable_inputs(files: &[PathBuf]) -> Vec<PathBuf> {
    files
        .iter()
        .filter(|path| {
            if !path.is_file() {
                eprintln!("Path '{}' does not lead to a file", path.display());
                return false;
            }
            if std::fs::File::open(path).is_err() {
                eprintln!("File '{}' is not readable", path.display());
                return false;
            }
            true
        })
        .cloned()
        .collect()
}

/// Merge flags over the configuration file and validate the result before
/// any password prompt is shown.
fn build_settings(cli: &Cli, config: FileConfig, input_count: usize) -> Result<PublishSettings> {
    let conn = &cli.connection;
    let pushing = cli.output_file.is_none();

    let user = conn.user.clone().or(config.user).unwrap_or_default();
    let password = if pushing {
        stored_secret(
            conn.password.as_deref(),
            conn.password_file.as_deref(),
            config.password,
        )?
    } else {
        None
    };

    let proxy = match cli.proxy.proxy_host.clone().or(config.proxy_host) {
        Some(host) => Some(ProxySettings {
            host,
            port: cli.proxy.proxy_port.or(config.proxy_port),
            user: cli.proxy.proxy_user.clone().or(config.proxy_user),
            password: stored_secret(
                cli.proxy.proxy_password.as_deref(),
                cli.proxy.proxy_password_file.as_deref(),
                config.proxy_password,
            )?,
        }),
        None => None,
    };

    let mut settings = PublishSettings {
        server: conn.server.clone().or(config.server),
        shared_space: conn.shared_space.or(config.sharedspace),
        workspace: conn.workspace.or(config.workspace),
        credentials: credentials(
            user.clone(),
            password.clone().unwrap_or_default(),
            conn.access_token.as_deref(),
        ),
        proxy,
        skip_errors: cli.skip_errors,
        internal: cli.internal,
        output_file: cli.output_file.clone(),
        check_result: cli.check_result || cli.check_result_timeout.is_some(),
        check_result_timeout_secs: cli.check_result_timeout,
        metadata: build_metadata(&cli.metadata)?,
    };
    settings.validate(input_count)?;

    if !pushing {
        return Ok(settings);
    }
    if password.is_none() {
        let prompted = prompt_secret("Server password")?;
        settings.credentials = credentials(user, prompted, conn.access_token.as_deref());
    }
    if let Some(proxy) = settings.proxy.as_mut() {
        if proxy.user.is_some() && proxy.password.is_none() {
            proxy.password = Some(prompt_secret("Proxy password")?);
        }
    }
    Ok(settings)
}

fn credentials(user: String, password: Secret, access_token: Option<&str>) -> Credentials {
    match access_token {
        Some(token) => Credentials::AccessToken {
            user,
            password,
            token: Secret::from(token),
        },
        None => Credentials::Password { user, password },
    }
}

fn build_metadata(args: &MetadataArgs) -> Result<ResultMetadata> {
    Ok(ResultMetadata {
        release: release_ref(args.release, args.release_default)?,
        program: args.program,
        milestone: args.milestone,
        suite: args.suite.map(|id| SuiteRef {
            id,
            external_run_id: args.suite_external_run_id.clone(),
        }),
        build_context: build_context(
            args.build_context_server_id.clone(),
            args.build_context_job_id.clone(),
            args.build_context_build_id.clone(),
        )?,
        backlog_items: args.backlog_items.clone(),
        product_areas: args.product_areas.clone(),
        fields: parse_typed(&args.fields)?,
        environment: parse_typed(&args.tags)?,
        started: args.started,
    })
}

fn parse_typed(raw: &[String]) -> Result<Vec<TypedValue>> {
    raw.iter()
        .map(|value| TypedValue::parse(value).map_err(Into::into))
        .collect()
}

/// Flag, then password file, then configuration file.
fn stored_secret(
    flag: Option<&str>,
    file: Option<&Path>,
    from_config: Option<String>,
) -> Result<Option<Secret>> {
    if let Some(value) = flag {
        return Ok(Some(Secret::from(value)));
    }
    if let Some(path) = file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("can not read the password file: {}", path.display()))?;
        return Ok(Some(Secret::from(content.trim_end_matches(['\r', '\n']))));
    }
    Ok(from_config.map(Secret::from))
}

/// Ask on the terminal; empty when stdin is not one.
fn prompt_secret(prompt: &str) -> Result<Secret> {
    if !std::io::stdin().is_terminal() {
        return Ok(Secret::default());
    }
    let value = dialoguer::Password::new()
        .with_prompt(format!("{prompt} (leave empty if not required)"))
        .allow_empty_password(true)
        .interact()
        .context("failed to read password")?;
    Ok(Secret::from(value))
}
