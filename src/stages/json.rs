/*! Line-oriented JSON reading and writing.

One JSON object per line, UTF-8, with transparent gzip when the path ends in
`.gz`. No schema is enforced beyond "valid JSON per line".
!*/
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::Error;
use crate::pipeline::{Collect, Produce, Resource};
use crate::record::Record;

fn is_gzip(path: &Path) -> bool {
    path.extension().map(|e| e == "gz").unwrap_or(false)
}

/// Streaming source over a line-JSON file. Registry tag: `json_reader`.
///
/// The file is opened at acquire time and read line by line; memory stays
/// bounded by the longest line. Blank lines are skipped, lines that fail to
/// parse surface as per-record errors (logged and skipped by the driver).
pub struct JsonReader {
    path: PathBuf,
    lines: Option<Lines<BufReader<Box<dyn Read>>>>,
}

impl JsonReader {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            lines: None,
        }
    }
}

impl Resource for JsonReader {
    fn name(&self) -> &str {
        "json_reader"
    }

    fn acquire(&mut self) -> Result<(), Error> {
        let file = File::open(&self.path)?;
        let reader: Box<dyn Read> = if is_gzip(&self.path) {
            Box::new(MultiGzDecoder::new(file))
        } else {
            Box::new(file)
        };
        self.lines = Some(BufReader::new(reader).lines());
        Ok(())
    }

    fn release(&mut self, _failure: Option<&Error>) -> Result<bool, Error> {
        self.lines = None;
        Ok(false)
    }
}

impl Produce for JsonReader {
    fn next_record(&mut self) -> Option<Result<Record, Error>> {
        let lines = self.lines.as_mut()?;
        loop {
            match lines.next()? {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Some(serde_json::from_str(&line).map_err(Error::Serde));
                }
                Err(e) => return Some(Err(Error::Io(e))),
            }
        }
    }
}

enum Sink {
    Plain(BufWriter<File>),
    Gzip(BufWriter<GzEncoder<File>>),
}

impl Sink {
    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Sink::Plain(w) => w,
            Sink::Gzip(w) => w,
        }
    }

    /// Flush buffered data; for gzip, also write the stream trailer, so that
    /// a short write surfaces here instead of being swallowed on drop.
    fn finish(self) -> Result<(), Error> {
        match self {
            Sink::Plain(mut w) => Ok(w.flush()?),
            Sink::Gzip(w) => {
                let mut encoder = w.into_inner().map_err(std::io::Error::from)?;
                encoder.try_finish()?;
                Ok(())
            }
        }
    }
}

/// Line-JSON writer collector. Registry tag: `json_writer`.
///
/// Serializes one object per line, creating parent directories as needed.
/// The aggregate is empty: written corpora are re-read with [JsonReader],
/// not forwarded to a reducer.
pub struct JsonWriter {
    path: PathBuf,
    sink: Option<Sink>,
}

impl JsonWriter {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            sink: None,
        }
    }
}

impl Resource for JsonWriter {
    fn name(&self) -> &str {
        "json_writer"
    }

    fn acquire(&mut self) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(&self.path)?;
        let sink = if is_gzip(&self.path) {
            Sink::Gzip(BufWriter::new(GzEncoder::new(file, Compression::default())))
        } else {
            Sink::Plain(BufWriter::new(file))
        };
        self.sink = Some(sink);
        Ok(())
    }

    fn release(&mut self, _failure: Option<&Error>) -> Result<bool, Error> {
        if let Some(sink) = self.sink.take() {
            sink.finish()?;
        }
        Ok(false)
    }
}

impl Collect for JsonWriter {
    fn collect(&mut self, records: &mut dyn Iterator<Item = Record>) -> Result<Vec<Record>, Error> {
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| Error::Custom("json_writer used before acquire".to_string()))?
            .writer();
        for record in records {
            serde_json::to_writer(&mut *sink, &record)?;
            sink.write_all(b"\n")?;
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    fn drain(reader: &mut JsonReader) -> Vec<Record> {
        let mut out = Vec::new();
        while let Some(r) = reader.next_record() {
            out.push(r.unwrap());
        }
        out
    }

    #[test]
    fn round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("docs.jsonl");
        let docs = vec![
            json!({"url": "http://a", "content": "hello", "tf": {"hello": 1}}),
            json!({"url": "http://b", "n": 3.5, "tags": ["x", "y"]}),
        ];

        let mut writer = JsonWriter::new(&path);
        writer.acquire().unwrap();
        writer.collect(&mut docs.clone().into_iter()).unwrap();
        writer.release(None).unwrap();

        let mut reader = JsonReader::new(&path);
        reader.acquire().unwrap();
        assert_eq!(drain(&mut reader), docs);
    }

    #[test]
    fn round_trip_gzip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("docs.jsonl.gz");
        let docs = vec![json!({"a": 1}), json!({"b": [1, 2, 3]})];

        let mut writer = JsonWriter::new(&path);
        writer.acquire().unwrap();
        writer.collect(&mut docs.clone().into_iter()).unwrap();
        writer.release(None).unwrap();

        let mut reader = JsonReader::new(&path);
        reader.acquire().unwrap();
        assert_eq!(drain(&mut reader), docs);
    }

    #[test]
    fn release_completes_the_gzip_stream() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("docs.jsonl.gz");
        let docs = vec![json!({"a": 1}), json!({"b": 2})];

        let mut writer = JsonWriter::new(&path);
        writer.acquire().unwrap();
        writer.collect(&mut docs.clone().into_iter()).unwrap();
        writer.release(None).unwrap();

        // the stream, trailer included, must be complete before the writer
        // is dropped
        let mut reader = JsonReader::new(&path);
        reader.acquire().unwrap();
        assert_eq!(drain(&mut reader), docs);
        drop(writer);
    }

    #[test]
    fn malformed_line_is_one_bad_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("docs.jsonl");
        std::fs::write(&path, "{\"a\": 1}\nnot json\n{\"b\": 2}\n").unwrap();

        let mut reader = JsonReader::new(&path);
        reader.acquire().unwrap();
        assert_eq!(reader.next_record().unwrap().unwrap(), json!({"a": 1}));
        assert!(reader.next_record().unwrap().is_err());
        assert_eq!(reader.next_record().unwrap().unwrap(), json!({"b": 2}));
        assert!(reader.next_record().is_none());
    }

    #[test]
    fn missing_file_is_an_acquisition_error() {
        let mut reader = JsonReader::new("/nonexistent/docs.jsonl");
        assert!(matches!(reader.acquire(), Err(Error::Io(_))));
    }
}
