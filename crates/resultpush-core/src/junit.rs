//! Streaming JUnit report decoder.
//!
//! Reads a JUnit XML report event by event (no DOM) and yields one
//! [`ResultRecord`] per named `testcase`. The decoder is single-pass: once it
//! has been drained, or has returned an error, it yields nothing more.
//!
//! DTDs and external entities are never resolved; `<!DOCTYPE>` declarations
//! are skipped and only the predefined XML entities are unescaped.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, warn};

use crate::error::{DecodeError, DecodeResult};
use crate::model::{truncate_name, ErrorInfo, ResultRecord, ResultStatus};

/// Iterator over the test results of one JUnit report.
pub struct JunitDecoder<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    path: PathBuf,
    default_started: i64,
    state: CaseState,
    depth: usize,
    finished: bool,
}

impl JunitDecoder<BufReader<File>> {
    /// Open a report file. `default_started` (epoch ms) is used as the start
    /// time of every test.
    pub fn open(path: impl AsRef<Path>, default_started: i64) -> DecodeResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| DecodeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_reader(BufReader::new(file), path, default_started))
    }
}

impl<R: BufRead> JunitDecoder<R> {
    /// Decode from any buffered reader; `source` names the input in errors.
    pub fn from_reader(reader: R, source: impl Into<PathBuf>, default_started: i64) -> Self {
        let mut reader = Reader::from_reader(reader);
        let config = reader.config_mut();
        // `<skipped/>` must behave like `<skipped></skipped>`.
        config.expand_empty_elements = true;
        config.check_end_names = true;

        Self {
            reader,
            buf: Vec::new(),
            path: source.into(),
            default_started,
            state: CaseState::Outside,
            depth: 0,
            finished: false,
        }
    }

    fn next_record(&mut self) -> DecodeResult<Option<ResultRecord>> {
        loop {
            self.buf.clear();
            let decoder = self.reader.decoder();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event,
                Err(e) => {
                    return Err(xml_error(&self.path, &self.reader, e.to_string()));
                }
            };

            match event {
                Event::Start(ref e) => {
                    self.depth += 1;
                    if let Err(message) = self.state.on_start(Element::classify(e), e, decoder) {
                        return Err(xml_error(&self.path, &self.reader, message));
                    }
                }
                Event::End(ref e) => {
                    self.depth = self.depth.saturating_sub(1);
                    let element = Element::from_local_name(e.local_name().as_ref());
                    if let Some(record) = self.state.on_end(element, self.default_started) {
                        return Ok(Some(record));
                    }
                }
                Event::Text(ref t) => {
                    if self.state.is_capturing() {
                        match t.unescape() {
                            Ok(text) => self.state.push_text(&text),
                            Err(e) => {
                                return Err(xml_error(&self.path, &self.reader, e.to_string()))
                            }
                        }
                    }
                }
                Event::CData(ref c) => {
                    if self.state.is_capturing() {
                        self.state.push_text(&String::from_utf8_lossy(c));
                    }
                }
                Event::DocType(_) => {
                    debug!(path = %self.path.display(), "ignoring DOCTYPE declaration");
                }
                Event::Eof => {
                    if self.depth > 0 {
                        return Err(xml_error(
                            &self.path,
                            &self.reader,
                            "unexpected end of document, unclosed element",
                        ));
                    }
                    return Ok(None);
                }
                _ => {}
            }
        }
    }
}

fn xml_error<R>(path: &Path, reader: &Reader<R>, message: impl Into<String>) -> DecodeError {
    DecodeError::Xml {
        path: path.to_path_buf(),
        position: reader.error_position() as u64,
        message: message.into(),
    }
}

impl<R: BufRead> Iterator for JunitDecoder<R> {
    type Item = DecodeResult<ResultRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Elements that change decoder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Element {
    TestCase,
    Skipped,
    Failure,
    Other,
}

impl Element {
    fn from_local_name(name: &[u8]) -> Self {
        match name {
            b"testcase" => Self::TestCase,
            b"skipped" => Self::Skipped,
            b"failure" | b"error" => Self::Failure,
            _ => Self::Other,
        }
    }

    fn classify(start: &BytesStart<'_>) -> Self {
        Self::from_local_name(start.local_name().as_ref())
    }
}

/// Accumulated state of the `testcase` being read.
#[derive(Debug)]
struct CaseAccumulator {
    package: String,
    class: String,
    name: String,
    status: ResultStatus,
    duration_ms: u64,
    error: ErrorInfo,
    trace: String,
    capturing: bool,
}

impl CaseAccumulator {
    fn new() -> Self {
        Self {
            package: String::new(),
            class: String::new(),
            name: String::new(),
            status: ResultStatus::Passed,
            duration_ms: 0,
            error: ErrorInfo::default(),
            trace: String::new(),
            capturing: false,
        }
    }

    fn into_record(self, started_ms: i64) -> Option<ResultRecord> {
        if self.name.is_empty() {
            return None;
        }
        let record = match self.status {
            ResultStatus::Failed => ResultRecord::failed(
                self.package,
                self.class,
                self.name,
                self.duration_ms,
                started_ms,
                ErrorInfo {
                    stack_trace: Some(self.trace),
                    ..self.error
                },
            ),
            status => ResultRecord::new(
                self.package,
                self.class,
                self.name,
                status,
                self.duration_ms,
                started_ms,
            ),
        };
        Some(record)
    }
}

#[derive(Debug)]
enum CaseState {
    Outside,
    InCase(CaseAccumulator),
}

impl CaseState {
    fn on_start(
        &mut self,
        element: Element,
        start: &BytesStart<'_>,
        decoder: quick_xml::encoding::Decoder,
    ) -> Result<(), String> {
        if element == Element::TestCase {
            let mut case = CaseAccumulator::new();
            for_each_attribute(start, decoder, |key, value| match key {
                b"classname" => {
                    let (package, class) = split_classname(&value);
                    case.package = package;
                    case.class = class;
                }
                b"name" => case.name = truncate_name(value),
                b"time" => case.duration_ms = parse_duration(&value),
                _ => {}
            })?;
            *self = CaseState::InCase(case);
            return Ok(());
        }

        let CaseState::InCase(case) = self else {
            return Ok(());
        };
        match element {
            Element::Skipped => case.status = ResultStatus::Skipped,
            Element::Failure => {
                case.status = ResultStatus::Failed;
                case.trace.clear();
                case.capturing = true;
                for_each_attribute(start, decoder, |key, value| match key {
                    b"message" => case.error.message = Some(value),
                    b"type" => case.error.kind = Some(value),
                    _ => {}
                })?;
            }
            Element::TestCase | Element::Other => {}
        }
        Ok(())
    }

    /// Any end tag stops text capture; a `testcase` end tag yields the record.
    fn on_end(&mut self, element: Element, started_ms: i64) -> Option<ResultRecord> {
        if let CaseState::InCase(case) = self {
            case.capturing = false;
        }
        if element != Element::TestCase {
            return None;
        }
        match std::mem::replace(self, CaseState::Outside) {
            CaseState::InCase(case) => case.into_record(started_ms),
            CaseState::Outside => None,
        }
    }

    fn is_capturing(&self) -> bool {
        matches!(self, CaseState::InCase(case) if case.capturing)
    }

    fn push_text(&mut self, text: &str) {
        if let CaseState::InCase(case) = self {
            case.trace.push_str(text);
        }
    }
}

fn for_each_attribute(
    start: &BytesStart<'_>,
    decoder: quick_xml::encoding::Decoder,
    mut f: impl FnMut(&[u8], String),
) -> Result<(), String> {
    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let value = attr
            .decode_and_unescape_value(decoder)
            .map_err(|e| e.to_string())?;
        f(attr.key.local_name().as_ref(), value.into_owned());
    }
    Ok(())
}

/// Split `a.b.C` into package `a.b` and class `C`.
pub fn split_classname(fqn: &str) -> (String, String) {
    match fqn.rfind('.') {
        Some(p) => (fqn[..p].to_string(), fqn[p + 1..].to_string()),
        None => (String::new(), fqn.to_string()),
    }
}

/// Parse a `time` attribute (seconds) into whole milliseconds; 0 if unparsable.
pub fn parse_duration(value: &str) -> u64 {
    match value.trim().parse::<f64>() {
        Ok(seconds) if seconds.is_finite() && seconds >= 0.0 => (seconds * 1000.0) as u64,
        _ => {
            warn!(time = %value, "unable to parse test duration");
            0
        }
    }
}
