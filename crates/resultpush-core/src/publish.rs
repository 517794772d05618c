//! Publish orchestrator.
//!
//! Drives decode, encode, push and the optional status poll for each input
//! file, strictly in input order. A validation rejection skips the file;
//! any other failure signs out and ends the run.

use std::fs::File;
use std::io::{BufWriter, Read, Seek};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::client::{PushOutcome, PushStatus, SessionClient};
use crate::encoder::TestResultEncoder;
use crate::error::{
    ClientResult, DecodeError, EncodeError, PublishError, PublishResult, EXIT_FAILURE,
    EXIT_SUCCESS,
};
use crate::junit::JunitDecoder;
use crate::settings::PublishSettings;

/// Delay between two status requests.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What happened to one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Encoded document written to the output file.
    Saved { records: usize },
    /// Accepted by the server.
    Pushed(PushOutcome),
    /// Refused by server-side validation; the run continued.
    Rejected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: FileOutcome,
}

/// Per-file results of a run, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub files: Vec<FileReport>,
}

impl PublishSummary {
    fn record<F: FnMut(&FileReport)>(&mut self, report: FileReport, on_file: &mut F) {
        on_file(&report);
        self.files.push(report);
    }

    pub fn pushed(&self) -> impl Iterator<Item = (&Path, &PushOutcome)> {
        self.files.iter().filter_map(|f| match &f.outcome {
            FileOutcome::Pushed(outcome) => Some((f.path.as_path(), outcome)),
            _ => None,
        })
    }

    pub fn rejected(&self) -> impl Iterator<Item = &Path> {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Rejected { .. }))
            .map(|f| f.path.as_path())
    }

    /// Failure only when there were files and every one was rejected.
    pub fn exit_code(&self) -> i32 {
        let all_rejected = !self.files.is_empty()
            && self
                .files
                .iter()
                .all(|f| matches!(f.outcome, FileOutcome::Rejected { .. }));
        if all_rejected {
            EXIT_FAILURE
        } else {
            EXIT_SUCCESS
        }
    }
}

/// Runs one publish over a list of input files.
#[derive(Debug)]
pub struct Publisher<'a> {
    settings: &'a PublishSettings,
    started_ms: i64,
}

impl<'a> Publisher<'a> {
    /// Tests without their own start time get the configured `started`
    /// value, or the moment the publisher was created.
    pub fn new(settings: &'a PublishSettings) -> Self {
        let started_ms = settings
            .metadata
            .started
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        Self {
            settings,
            started_ms,
        }
    }

    pub async fn publish(&self, inputs: &[PathBuf]) -> PublishResult<PublishSummary> {
        self.publish_with(inputs, |_| {}).await
    }

    /// Like [`Publisher::publish`], handing each file's report to `on_file`
    /// as soon as that file is done.
    pub async fn publish_with<F>(
        &self,
        inputs: &[PathBuf],
        mut on_file: F,
    ) -> PublishResult<PublishSummary>
    where
        F: FnMut(&FileReport),
    {
        self.settings.validate(inputs.len())?;

        if let Some(output) = &self.settings.output_file {
            let input = &inputs[0];
            let records = self.write_output(input, output)?;
            let mut summary = PublishSummary::default();
            summary.record(
                FileReport {
                    path: input.clone(),
                    outcome: FileOutcome::Saved { records },
                },
                &mut on_file,
            );
            return Ok(summary);
        }

        let mut client = SessionClient::new(self.settings)?;
        let result = self.push_all(&mut client, inputs, &mut on_file).await;
        let released = client.release().await;

        match (result, released) {
            (Ok(summary), Ok(())) => Ok(summary),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Err(release_err)) => {
                warn!(error = %release_err, "unable to release client session");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
        }
    }

    /// Encode one JUnit report into `output` without any network access.
    pub fn write_output(&self, input: &Path, output: &Path) -> PublishResult<usize> {
        let decoder = JunitDecoder::open(input, self.started_ms)?;
        let count = TestResultEncoder::new(self.settings)
            .encode_to_path(decoder, output)
            .map_err(|e| encode_failure(input, e))?;
        info!(input = %input.display(), output = %output.display(), records = count, "saved test results");
        Ok(count)
    }

    async fn push_all<F>(
        &self,
        client: &mut SessionClient,
        inputs: &[PathBuf],
        on_file: &mut F,
    ) -> PublishResult<PublishSummary>
    where
        F: FnMut(&FileReport),
    {
        let mut summary = PublishSummary::default();

        for path in inputs {
            let payload = self.payload(path).await?;

            let outcome = match client.push_result(payload).await {
                Ok(id) => {
                    let status = if self.settings.check_result {
                        Some(poll_status(client, id, self.settings.check_result_timeout()).await?)
                    } else {
                        None
                    };
                    info!(file = %path.display(), id, "test result pushed");
                    FileOutcome::Pushed(PushOutcome { id, status })
                }
                Err(e) if e.is_validation() => {
                    warn!(file = %path.display(), error = %e, "test result was refused");
                    FileOutcome::Rejected {
                        reason: e.to_string(),
                    }
                }
                Err(e) => return Err(e.into()),
            };

            summary.record(
                FileReport {
                    path: path.clone(),
                    outcome,
                },
                on_file,
            );
        }

        Ok(summary)
    }

    /// Bytes to push for one input: the file itself in internal mode,
    /// otherwise the encoded JUnit report.
    async fn payload(&self, path: &Path) -> PublishResult<Vec<u8>> {
        if self.settings.internal {
            return tokio::fs::read(path).await.map_err(|source| {
                PublishError::Decode(DecodeError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            });
        }

        let decoder = JunitDecoder::open(path, self.started_ms)?;
        let mut scratch = tempfile::tempfile().map_err(PublishError::Scratch)?;
        let sink = &mut scratch;
        let count = TestResultEncoder::new(self.settings)
            .encode(decoder, move || Ok(BufWriter::new(sink)))
            .map_err(|e| encode_failure(path, e))?;
        debug!(file = %path.display(), records = count, "encoded test results");

        read_back(scratch).map_err(PublishError::Scratch)
    }
}

fn read_back(mut file: File) -> std::io::Result<Vec<u8>> {
    file.rewind()?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn encode_failure(path: &Path, err: EncodeError) -> PublishError {
    match err {
        EncodeError::NoRecords => PublishError::EmptyResult {
            path: path.to_path_buf(),
        },
        EncodeError::Records(decode) => PublishError::Decode(decode),
        source => PublishError::Encode {
            path: path.to_path_buf(),
            source,
        },
    }
}

/// Poll the status of `id` until it is terminal or `timeout_secs * 10`
/// requests were made, [`POLL_INTERVAL`] apart.
///
/// Running out of attempts is not an error: the last non-terminal status is
/// returned.
pub async fn poll_status(
    client: &mut SessionClient,
    id: u64,
    timeout_secs: u32,
) -> ClientResult<PushStatus> {
    let attempts = timeout_secs.max(1).saturating_mul(10);

    let mut status = client.get_status(id).await?;
    let mut made = 1;
    while !status.state.is_terminal() && made < attempts {
        tokio::time::sleep(POLL_INTERVAL).await;
        status = client.get_status(id).await?;
        made += 1;
    }

    if !status.state.is_terminal() {
        info!(id, state = %status.state, attempts = made, "status still pending after timeout");
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str, outcome: FileOutcome) -> FileReport {
        FileReport {
            path: PathBuf::from(name),
            outcome,
        }
    }

    fn rejected() -> FileOutcome {
        FileOutcome::Rejected {
            reason: "test result XML was refused by server".into(),
        }
    }

    #[test]
    fn test_summary_exit_code() {
        let empty = PublishSummary::default();
        assert_eq!(empty.exit_code(), EXIT_SUCCESS);

        let all_rejected = PublishSummary {
            files: vec![report("a.xml", rejected()), report("b.xml", rejected())],
        };
        assert_eq!(all_rejected.exit_code(), EXIT_FAILURE);
        assert_eq!(all_rejected.rejected().count(), 2);

        let mixed = PublishSummary {
            files: vec![
                report("a.xml", rejected()),
                report(
                    "b.xml",
                    FileOutcome::Pushed(PushOutcome {
                        id: 7,
                        status: None,
                    }),
                ),
            ],
        };
        assert_eq!(mixed.exit_code(), EXIT_SUCCESS);
        let pushed: Vec<_> = mixed.pushed().collect();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].0, Path::new("b.xml"));
    }

    #[test]
    fn test_encode_failure_mapping() {
        let path = Path::new("junit.xml");
        assert!(matches!(
            encode_failure(path, EncodeError::NoRecords),
            PublishError::EmptyResult { .. }
        ));
        assert!(matches!(
            encode_failure(
                path,
                EncodeError::Records(DecodeError::Xml {
                    path: path.to_path_buf(),
                    position: 0,
                    message: "eof".into(),
                })
            ),
            PublishError::Decode(_)
        ));
    }

    #[test]
    fn test_write_output_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("junit.xml");
        let output = dir.path().join("result.xml");
        std::fs::write(
            &input,
            r#"<testsuite><testcase classname="a.B" name="one" time="0.5"/></testsuite>"#,
        )
        .unwrap();

        let settings = PublishSettings::write_only(&output);
        let count = Publisher::new(&settings)
            .write_output(&input, &output)
            .unwrap();
        assert_eq!(count, 1);
        let xml = std::fs::read_to_string(&output).unwrap();
        assert!(xml.contains(r#"duration="500""#));
    }

    #[test]
    fn test_write_output_empty_report() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("junit.xml");
        let output = dir.path().join("result.xml");
        std::fs::write(&input, "<testsuite></testsuite>").unwrap();

        let settings = PublishSettings::write_only(&output);
        let err = Publisher::new(&settings)
            .write_output(&input, &output)
            .unwrap_err();
        assert!(matches!(err, PublishError::EmptyResult { .. }));
        assert!(!output.exists());
    }
}
