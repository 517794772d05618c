//! Ingestion XML encoder.
//!
//! Streams a sequence of [`ResultRecord`]s plus the run metadata from
//! [`PublishSettings`] into one `test_result` document. Records are written
//! one at a time; nothing is buffered beyond the XML writer itself.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tracing::debug;

use crate::error::{DecodeResult, EncodeError, EncodeResult};
use crate::model::ResultRecord;
use crate::settings::{PublishSettings, ReleaseRef, ResultMetadata, TypedValue};

/// Name of the implicit release when results go to the default release.
pub const DEFAULT_RELEASE_NAME: &str = "_default_";

/// Writes ingestion documents for one set of publish settings.
#[derive(Debug, Clone, Copy)]
pub struct TestResultEncoder<'a> {
    metadata: &'a ResultMetadata,
}

impl<'a> TestResultEncoder<'a> {
    pub fn new(settings: &'a PublishSettings) -> Self {
        Self {
            metadata: &settings.metadata,
        }
    }

    /// Encode `records` into the sink returned by `open`.
    ///
    /// The sink is opened on the first record; an empty sequence returns
    /// [`EncodeError::NoRecords`] without calling `open`. If a record fails
    /// partway, every open element is still closed and the sink flushed
    /// before the record error is returned.
    pub fn encode<I, W, F>(&self, records: I, open: F) -> EncodeResult<usize>
    where
        I: IntoIterator<Item = DecodeResult<ResultRecord>>,
        W: Write,
        F: FnOnce() -> io::Result<W>,
    {
        let mut records = records.into_iter();
        let first = match records.next() {
            Some(record) => record?,
            None => return Err(EncodeError::NoRecords),
        };

        let mut doc = Document::new(open()?);
        let body = self.write_document(&mut doc, first, records);
        let closed = doc.finish();

        let count = body?;
        closed?;
        debug!(records = count, "encoded test results");
        Ok(count)
    }

    /// Encode `records` into a file created at `path` on the first record.
    pub fn encode_to_path<I>(&self, records: I, path: &Path) -> EncodeResult<usize>
    where
        I: IntoIterator<Item = DecodeResult<ResultRecord>>,
    {
        self.encode(records, || File::create(path).map(BufWriter::new))
    }

    fn write_document<W: Write>(
        &self,
        doc: &mut Document<W>,
        first: ResultRecord,
        rest: impl Iterator<Item = DecodeResult<ResultRecord>>,
    ) -> EncodeResult<usize> {
        doc.declaration()?;
        doc.start("test_result", &[])?;
        self.write_header(doc)?;

        doc.start("test_runs", &[])?;
        write_test_run(doc, &first)?;
        let mut count = 1;
        for record in rest {
            write_test_run(doc, &record?)?;
            count += 1;
        }
        Ok(count)
    }

    fn write_header<W: Write>(&self, doc: &mut Document<W>) -> EncodeResult<()> {
        let meta = self.metadata;

        if let Some(build) = &meta.build_context {
            doc.empty(
                "build",
                &[
                    ("server_id", build.server_id.as_str()),
                    ("job_id", build.job_id.as_str()),
                    ("build_id", build.build_id.as_str()),
                ],
            )?;
        }

        if let Some(suite) = &meta.suite {
            let id = suite.id.to_string();
            match &suite.external_run_id {
                Some(run) => doc.empty(
                    "suite_ref",
                    &[("id", id.as_str()), ("external_run_id", run.as_str())],
                )?,
                None => doc.empty("suite_ref", &[("id", id.as_str())])?,
            }
        }

        if let Some(program) = meta.program {
            doc.empty("program_ref", &[("id", program.to_string().as_str())])?;
        }

        match meta.release {
            Some(ReleaseRef::Id(id)) => {
                doc.empty("release_ref", &[("id", id.to_string().as_str())])?;
            }
            Some(ReleaseRef::Default) => doc.empty("release", &[("name", DEFAULT_RELEASE_NAME)])?,
            None => {}
        }

        if let Some(milestone) = meta.milestone {
            doc.empty("milestone_ref", &[("id", milestone.to_string().as_str())])?;
        }

        write_id_list(doc, "backlog_items", "backlog_item_ref", &meta.backlog_items)?;
        write_id_list(doc, "product_areas", "product_area_ref", &meta.product_areas)?;
        write_typed_list(doc, "test_fields", "test_field", &meta.fields)?;
        write_typed_list(doc, "environment", "taxonomy", &meta.environment)?;
        Ok(())
    }
}

fn write_id_list<W: Write>(
    doc: &mut Document<W>,
    list: &'static str,
    item: &'static str,
    ids: &[u64],
) -> EncodeResult<()> {
    if ids.is_empty() {
        return Ok(());
    }
    doc.start(list, &[])?;
    for id in ids {
        doc.empty(item, &[("id", id.to_string().as_str())])?;
    }
    doc.end()
}

fn write_typed_list<W: Write>(
    doc: &mut Document<W>,
    list: &'static str,
    item: &'static str,
    values: &[TypedValue],
) -> EncodeResult<()> {
    if values.is_empty() {
        return Ok(());
    }
    doc.start(list, &[])?;
    for value in values {
        doc.empty(item, &[("type", value.kind.as_str()), ("value", value.value.as_str())])?;
    }
    doc.end()
}

fn write_test_run<W: Write>(doc: &mut Document<W>, record: &ResultRecord) -> EncodeResult<()> {
    let duration = record.duration_ms().to_string();
    let started = record.started_ms().to_string();
    let attrs = [
        ("package", record.package()),
        ("class", record.class()),
        ("name", record.name()),
        ("status", record.status().external_name()),
        ("duration", duration.as_str()),
        ("started", started.as_str()),
    ];

    let Some(error) = record.error() else {
        return doc.empty("test_run", &attrs);
    };

    doc.start("test_run", &attrs)?;
    let mut error_attrs = Vec::with_capacity(2);
    if let Some(kind) = &error.kind {
        error_attrs.push(("type", kind.as_str()));
    }
    if let Some(message) = &error.message {
        error_attrs.push(("message", message.trim()));
    }
    doc.start("error", &error_attrs)?;
    if let Some(trace) = error.stack_trace.as_deref().map(str::trim) {
        if !trace.is_empty() {
            doc.text(trace)?;
        }
    }
    doc.end()?;
    doc.end()
}

/// XML writer that remembers which elements are open so they can all be
/// closed on any exit path.
struct Document<W: Write> {
    writer: Writer<W>,
    open: Vec<&'static str>,
}

impl<W: Write> Document<W> {
    #[cfg(feature = "pretty-xml")]
    fn new(sink: W) -> Self {
        Self {
            writer: Writer::new_with_indent(sink, b' ', 1),
            open: Vec::new(),
        }
    }

    #[cfg(not(feature = "pretty-xml"))]
    fn new(sink: W) -> Self {
        Self {
            writer: Writer::new(sink),
            open: Vec::new(),
        }
    }

    fn declaration(&mut self) -> EncodeResult<()> {
        self.writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        Ok(())
    }

    fn start(&mut self, name: &'static str, attrs: &[(&str, &str)]) -> EncodeResult<()> {
        let mut element = BytesStart::new(name);
        element.extend_attributes(attrs.iter().copied());
        self.writer.write_event(Event::Start(element))?;
        self.open.push(name);
        Ok(())
    }

    fn empty(&mut self, name: &'static str, attrs: &[(&str, &str)]) -> EncodeResult<()> {
        let mut element = BytesStart::new(name);
        element.extend_attributes(attrs.iter().copied());
        self.writer.write_event(Event::Empty(element))?;
        Ok(())
    }

    fn text(&mut self, text: &str) -> EncodeResult<()> {
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        Ok(())
    }

    fn end(&mut self) -> EncodeResult<()> {
        if let Some(name) = self.open.pop() {
            self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        }
        Ok(())
    }

    /// Close every open element and flush the sink.
    fn finish(mut self) -> EncodeResult<()> {
        while !self.open.is_empty() {
            self.end()?;
        }
        self.writer.get_mut().flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use crate::junit::JunitDecoder;
    use crate::model::{ErrorInfo, ResultStatus};
    use crate::settings::{BuildContext, SuiteRef};
    use quick_xml::Reader;
    use std::path::PathBuf;

    fn encode_to_string(settings: &PublishSettings, records: Vec<ResultRecord>) -> String {
        let mut out = Vec::new();
        let sink = &mut out;
        TestResultEncoder::new(settings)
            .encode(records.into_iter().map(Ok), move || Ok(sink))
            .expect("encode failed");
        String::from_utf8(out).expect("utf-8 output")
    }

    fn passed(name: &str) -> ResultRecord {
        ResultRecord::new("com.example", "SampleTest", name, ResultStatus::Passed, 5, 1_000)
    }

    fn with_metadata(metadata: ResultMetadata) -> PublishSettings {
        PublishSettings::write_only("out.xml").with_metadata(metadata)
    }

    /// Attributes of every `test_run` element, in document order.
    fn test_runs(xml: &str) -> Vec<Vec<(String, String)>> {
        let mut reader = Reader::from_str(xml);
        let mut runs = Vec::new();
        loop {
            match reader.read_event().expect("well-formed output") {
                Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"test_run" => {
                    let attrs = e
                        .attributes()
                        .map(|a| {
                            let a = a.expect("attribute");
                            (
                                String::from_utf8(a.key.as_ref().to_vec()).expect("key"),
                                a.unescape_value().expect("value").into_owned(),
                            )
                        })
                        .collect();
                    runs.push(attrs);
                }
                Event::Eof => break,
                _ => {}
            }
        }
        runs
    }

    #[test]
    fn test_release_id_and_default_release() {
        let xml = encode_to_string(
            &with_metadata(ResultMetadata {
                release: Some(ReleaseRef::Id(1010)),
                ..ResultMetadata::default()
            }),
            vec![passed("one")],
        );
        assert!(xml.contains(r#"<release_ref id="1010"/>"#));
        assert!(!xml.contains("<release "));

        let xml = encode_to_string(
            &with_metadata(ResultMetadata {
                release: Some(ReleaseRef::Default),
                ..ResultMetadata::default()
            }),
            vec![passed("one")],
        );
        assert!(xml.contains(r#"<release name="_default_"/>"#));
        assert!(!xml.contains("release_ref"));
    }

    #[test]
    fn test_header_order_and_typed_values() {
        let metadata = ResultMetadata {
            release: Some(ReleaseRef::Id(7)),
            program: Some(3),
            milestone: Some(8),
            suite: Some(SuiteRef {
                id: 2,
                external_run_id: Some("nightly run".into()),
            }),
            build_context: Some(BuildContext {
                server_id: "ci".into(),
                job_id: "job".into(),
                build_id: "42".into(),
            }),
            backlog_items: vec![11, 12],
            product_areas: vec![21],
            fields: vec![TypedValue::parse("Test_Level:Unit Test").unwrap()],
            environment: vec![TypedValue::parse("OS:Linux").unwrap()],
            started: None,
        };
        let xml = encode_to_string(&with_metadata(metadata), vec![passed("one")]);

        assert!(xml.contains(r#"<build server_id="ci" job_id="job" build_id="42"/>"#));
        assert!(xml.contains(r#"<suite_ref id="2" external_run_id="nightly run"/>"#));
        assert!(xml.contains(r#"<test_field type="Test_Level" value="Unit Test"/>"#));
        assert!(xml.contains(r#"<taxonomy type="OS" value="Linux"/>"#));
        assert!(xml.contains(r#"<backlog_item_ref id="12"/>"#));

        let order = [
            "<build ",
            "<suite_ref ",
            "<program_ref ",
            "<release_ref ",
            "<milestone_ref ",
            "<backlog_items>",
            "<product_areas>",
            "<test_fields>",
            "<environment>",
            "<test_runs>",
        ];
        let positions: Vec<usize> = order
            .iter()
            .map(|tag| xml.find(tag).unwrap_or_else(|| panic!("missing {tag}")))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{xml}");
    }

    #[test]
    fn test_no_optional_header_without_metadata() {
        let xml = encode_to_string(&PublishSettings::write_only("out.xml"), vec![passed("one")]);
        for tag in ["<build", "<suite_ref", "<release", "<test_fields", "<environment"] {
            assert!(!xml.contains(tag), "unexpected {tag}");
        }
        assert!(xml.starts_with("<?xml"));
    }

    #[test]
    fn test_error_only_under_failed_run() {
        let failed = ResultRecord::failed(
            "",
            "SampleTest",
            "testTwo",
            3,
            1_000,
            ErrorInfo {
                kind: Some("java.lang.AssertionError".into()),
                message: Some(" boom ".into()),
                stack_trace: Some("\n  at SampleTest.testTwo\n".into()),
            },
        );
        let xml = encode_to_string(
            &PublishSettings::write_only("out.xml"),
            vec![passed("testOne"), failed],
        );

        assert_eq!(xml.matches("<error ").count(), 1);
        let one = xml.find(r#"name="testOne""#).unwrap();
        let two = xml.find(r#"name="testTwo""#).unwrap();
        let error = xml.find("<error ").unwrap();
        assert!(one < two && two < error);
        assert!(xml.contains(r#"message="boom""#));
        assert!(xml.contains(">at SampleTest.testTwo</error>"));
    }

    #[test]
    fn test_junit_report_to_ingestion_document() {
        let junit = r#"<testsuite>
            <testcase classname="SampleTest" name="testOne" time="0.001"/>
            <testcase classname="SampleTest" name="testTwo" time="0.002">
                <failure message="boom" type="AssertionError">trace</failure>
            </testcase>
        </testsuite>"#;
        let decoder = JunitDecoder::from_reader(junit.as_bytes(), "junit.xml", 1_000);
        let mut out = Vec::new();
        let sink = &mut out;
        let count = TestResultEncoder::new(&PublishSettings::write_only("out.xml"))
            .encode(decoder, move || Ok(sink))
            .unwrap();
        assert_eq!(count, 2);

        let xml = String::from_utf8(out).unwrap();
        let runs = test_runs(&xml);
        assert_eq!(runs.len(), 2);
        assert!(runs[0].contains(&("status".into(), "Passed".into())));
        assert!(runs[1].contains(&("status".into(), "Failed".into())));

        let error_at = xml.find(r#"<error type="AssertionError" message="boom">"#).unwrap();
        let second_run = xml.find(r#"name="testTwo""#).unwrap();
        assert!(error_at > second_run);
        assert_eq!(xml.matches("<error").count(), 1);
    }

    #[test]
    fn test_test_run_attributes_survive_reparse() {
        let records = vec![
            ResultRecord::new("a.b", "C", "first", ResultStatus::Passed, 10, 1_500),
            ResultRecord::new("", "D", "second & <more>", ResultStatus::Skipped, 0, 1_600),
        ];
        let xml = encode_to_string(&PublishSettings::write_only("out.xml"), records.clone());
        let runs = test_runs(&xml);

        for (record, attrs) in records.iter().zip(&runs) {
            let get = |key: &str| {
                attrs
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.clone())
                    .unwrap()
            };
            assert_eq!(get("package"), record.package());
            assert_eq!(get("class"), record.class());
            assert_eq!(get("name"), record.name());
            assert_eq!(get("status"), record.status().external_name());
            assert_eq!(get("duration"), record.duration_ms().to_string());
            assert_eq!(get("started"), record.started_ms().to_string());
        }
    }

    #[test]
    fn test_empty_sequence_opens_nothing() {
        let settings = PublishSettings::write_only("out.xml");
        let mut opened = false;
        let result = TestResultEncoder::new(&settings).encode(
            std::iter::empty::<DecodeResult<ResultRecord>>(),
            || {
                opened = true;
                Ok(Vec::new())
            },
        );
        assert!(matches!(result, Err(EncodeError::NoRecords)));
        assert!(!opened);
    }

    #[test]
    fn test_document_closed_when_records_fail() {
        let settings = PublishSettings::write_only("out.xml");
        let records = vec![
            Ok(passed("one")),
            Err(DecodeError::Xml {
                path: PathBuf::from("junit.xml"),
                position: 10,
                message: "unexpected end of file".into(),
            }),
        ];
        let mut out = Vec::new();
        let sink = &mut out;
        let result = TestResultEncoder::new(&settings).encode(records, move || Ok(sink));
        assert!(matches!(result, Err(EncodeError::Records(_))));

        let xml = String::from_utf8(out).unwrap();
        assert!(xml.trim_end().ends_with("</test_result>"));
        assert_eq!(test_runs(&xml).len(), 1);
    }

    #[test]
    fn test_encode_to_path_creates_file_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.xml");
        let settings = PublishSettings::write_only(&path);
        let encoder = TestResultEncoder::new(&settings);

        let empty = encoder.encode_to_path(std::iter::empty::<DecodeResult<ResultRecord>>(), &path);
        assert!(matches!(empty, Err(EncodeError::NoRecords)));
        assert!(!path.exists());

        encoder
            .encode_to_path(vec![Ok(passed("one"))], &path)
            .unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains(r#"name="one""#));
    }
}
