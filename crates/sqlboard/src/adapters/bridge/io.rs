use std::io::{BufRead, BufReader, BufWriter, Write};

use crate::error::{AppError, AppResult};

/// Newline-delimited JSON over a reader/writer pair (stdin/stdout in production).
pub struct NdjsonIo<R, W: Write> {
    reader: LineReader<R>,
    writer: JsonLineWriter<W>,
}

impl NdjsonIo<BufReader<std::io::Stdin>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(std::io::stdin()), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> NdjsonIo<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            reader: LineReader { input },
            writer: JsonLineWriter {
                output: BufWriter::new(output),
            },
        }
    }

    /// Separate halves so reading and writing can run on different threads.
    pub fn split(self) -> (LineReader<R>, JsonLineWriter<W>) {
        (self.reader, self.writer)
    }
}

pub struct LineReader<R> {
    input: R,
}

impl<R: BufRead> LineReader<R> {
    /// `None` at end of input; blank lines come back as empty strings.
    pub fn read_line(&mut self) -> AppResult<Option<String>> {
        let mut line = String::new();
        let n = self.input.read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

pub struct JsonLineWriter<W: Write> {
    output: BufWriter<W>,
}

impl<W: Write> JsonLineWriter<W> {
    pub fn write_json_line<T: serde::Serialize>(&mut self, v: &T) -> AppResult<()> {
        serde_json::to_writer(&mut self.output, v)?;
        self.output.write_all(b"\n")?;
        self.output.flush()?;
        Ok(())
    }

    pub fn into_output(self) -> AppResult<W> {
        self.output
            .into_inner()
            .map_err(|e| AppError::Io(e.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::adapters::bridge::BridgeResponse;

    #[test]
    fn reads_lines_and_eof() {
        let (mut reader, _) = NdjsonIo::new(Cursor::new("{\"a\":1}\r\n\n"), Vec::new()).split();
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("{\"a\":1}"));
        assert_eq!(reader.read_line().unwrap().as_deref(), Some(""));
        assert_eq!(reader.read_line().unwrap(), None);
    }

    #[test]
    fn protocol_error_is_one_json_line() {
        let (_, mut writer) = NdjsonIo::new(Cursor::new(""), Vec::new()).split();
        writer.write_json_line(&BridgeResponse::protocol_error("bad json".into())).unwrap();
        let out = String::from_utf8(writer.into_output().unwrap()).unwrap();
        assert!(out.ends_with('\n'));
        let v: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(v["code"], "INVALID_REQUEST");
        assert_eq!(v["error"], "invalid request: bad json");
    }

    #[test]
    fn split_halves_work_independently() {
        let (mut reader, mut writer) = NdjsonIo::new(Cursor::new("one\ntwo\n"), Vec::new()).split();
        writer.write_json_line(&serde_json::json!({"n": 1})).unwrap();
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("one"));
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("two"));
        assert_eq!(String::from_utf8(writer.into_output().unwrap()).unwrap(), "{\"n\":1}\n");
    }
}
