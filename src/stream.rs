//! Line-oriented tokenization of readers, writers and files.
//!
//! Every input line produces exactly one output line. Lines are processed in parallel batches
//! and written back in input order.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use bstr::ByteSlice;
use rayon::prelude::*;

use crate::error::{Result, RtokError};
use crate::tokenizer::{join_words, split_words, Tokenizer};

const BATCH_SIZE: usize = 1024;

/// Calls `f` with every line of `reader`, without its line terminator. Invalid UTF-8 is
/// replaced.
pub(crate) fn for_each_line(
    reader: &mut dyn BufRead,
    mut f: impl FnMut(&str) -> Result<()>,
) -> Result<()> {
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        let read = reader
            .read_until(b'\n', &mut buffer)
            .map_err(|err| RtokError::io(err, None))?;
        if read == 0 {
            return Ok(());
        }
        let line = buffer.to_str_lossy();
        f(line.trim_end_matches(['\n', '\r']))?;
    }
}

fn open_input(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).map_err(|err| RtokError::io(err, Some(path.to_path_buf())))?;
    Ok(BufReader::new(file))
}

fn create_output(path: &Path) -> Result<BufWriter<File>> {
    if path.is_dir() {
        return Err(RtokError::io(
            io::Error::new(io::ErrorKind::Other, "output path is a directory"),
            Some(path.to_path_buf()),
        ));
    }
    let file = File::create(path).map_err(|err| RtokError::io(err, Some(path.to_path_buf())))?;
    Ok(BufWriter::new(file))
}

fn process<F>(
    input: &mut dyn BufRead,
    output: &mut dyn Write,
    transform: F,
) -> Result<()>
where
    F: Fn(&str) -> Result<String> + Sync,
{
    let mut batch: Vec<String> = Vec::with_capacity(BATCH_SIZE);
    let flush = |batch: &mut Vec<String>, output: &mut dyn Write| -> Result<()> {
        let lines: Vec<String> = batch
            .par_iter()
            .map(|line| transform(line.as_str()))
            .collect::<Result<_>>()?;
        for line in lines {
            writeln!(output, "{line}").map_err(|err| RtokError::io(err, None))?;
        }
        batch.clear();
        Ok(())
    };

    for_each_line(input, |line| {
        batch.push(line.to_owned());
        if batch.len() >= BATCH_SIZE {
            flush(&mut batch, &mut *output)?;
        }
        Ok(())
    })?;
    flush(&mut batch, &mut *output)?;
    output.flush().map_err(|err| RtokError::io(err, None))
}

impl Tokenizer {
    /// Tokenizes every line of `input` into `output`, joining tokens with `delimiter`.
    pub fn tokenize_stream(
        &self,
        input: &mut dyn BufRead,
        output: &mut dyn Write,
        delimiter: &str,
    ) -> Result<()> {
        process(input, output, |line| {
            let (words, features) = self.tokenize(line);
            Ok(join_words(&words, &features, delimiter))
        })
    }

    /// Detokenizes every line of `input`, whose tokens are separated by `delimiter`.
    pub fn detokenize_stream(
        &self,
        input: &mut dyn BufRead,
        output: &mut dyn Write,
        delimiter: &str,
    ) -> Result<()> {
        process(input, output, |line| {
            let (words, features) = split_words(line, delimiter);
            self.detokenize_words(&words, &features)
        })
    }

    /// Tokenizes the file at `input` into the file at `output`.
    pub fn tokenize_file(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        delimiter: &str,
    ) -> Result<()> {
        let mut reader = open_input(input.as_ref())?;
        let mut writer = create_output(output.as_ref())?;
        log::debug!(
            "tokenizing {} into {}",
            input.as_ref().display(),
            output.as_ref().display()
        );
        self.tokenize_stream(&mut reader, &mut writer, delimiter)
    }

    /// Detokenizes the file at `input` into the file at `output`.
    pub fn detokenize_file(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        delimiter: &str,
    ) -> Result<()> {
        let mut reader = open_input(input.as_ref())?;
        let mut writer = create_output(output.as_ref())?;
        self.detokenize_stream(&mut reader, &mut writer, delimiter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Mode, TokenizerOptions};
    use std::fs;
    use tempfile::tempdir;

    fn joiner_tokenizer() -> Tokenizer {
        Tokenizer::new(TokenizerOptions {
            mode: Mode::Aggressive,
            joiner_annotate: true,
            ..TokenizerOptions::default()
        })
        .unwrap()
    }

    #[test]
    fn streams_keep_one_line_per_line() {
        let tok = joiner_tokenizer();
        let mut output = Vec::new();
        let mut input = "Hello, world!\n\nbye-bye\r\n".as_bytes();
        tok.tokenize_stream(&mut input, &mut output, " ").unwrap();
        let tokenized = String::from_utf8(output).unwrap();
        assert_eq!(tokenized, "Hello ￭, world ￭!\n\nbye ￭-￭ bye\n");

        let mut detokenized = Vec::new();
        tok.detokenize_stream(&mut tokenized.as_bytes(), &mut detokenized, " ")
            .unwrap();
        assert_eq!(
            String::from_utf8(detokenized).unwrap(),
            "Hello, world!\n\nbye-bye\n"
        );
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let tok = Tokenizer::new(TokenizerOptions::with_mode(Mode::Space)).unwrap();
        let mut output = Vec::new();
        let mut input: &[u8] = b"caf\xff ok\n";
        tok.tokenize_stream(&mut input, &mut output, " ").unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "caf\u{fffd} ok\n");
    }

    #[test]
    fn custom_delimiters_and_features() {
        let tok = Tokenizer::new(TokenizerOptions {
            mode: Mode::Space,
            case_feature: true,
            ..TokenizerOptions::default()
        })
        .unwrap();
        let mut output = Vec::new();
        tok.tokenize_stream(&mut "Hello WORLD".as_bytes(), &mut output, "|")
            .unwrap();
        let line = String::from_utf8(output).unwrap();
        assert_eq!(line, "hello￨C|world￨U\n");

        let mut restored = Vec::new();
        tok.detokenize_stream(&mut line.as_bytes(), &mut restored, "|")
            .unwrap();
        assert_eq!(String::from_utf8(restored).unwrap(), "Hello WORLD\n");
    }

    #[test]
    fn separator_tokens_survive_streams() {
        let tok = Tokenizer::new(TokenizerOptions {
            mode: Mode::Aggressive,
            with_separators: true,
            ..TokenizerOptions::default()
        })
        .unwrap();
        let mut output = Vec::new();
        tok.tokenize_stream(&mut "a  b\n".as_bytes(), &mut output, " ")
            .unwrap();
        let tokenized = String::from_utf8(output).unwrap();
        assert_eq!(tokenized, "a ％0020％0020 b\n");

        let mut restored = Vec::new();
        tok.detokenize_stream(&mut tokenized.as_bytes(), &mut restored, " ")
            .unwrap();
        assert_eq!(String::from_utf8(restored).unwrap(), "a  b\n");
    }

    #[test]
    fn files_are_checked() {
        let dir = tempdir().unwrap();
        let tok = joiner_tokenizer();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");

        let err = tok
            .tokenize_file(&input, &output, " ")
            .expect_err("missing input");
        assert!(matches!(err, RtokError::Io { .. }));

        fs::write(&input, "a-b\n").unwrap();
        let err = tok
            .tokenize_file(&input, dir.path(), " ")
            .expect_err("directory output");
        assert!(matches!(err, RtokError::Io { .. }));

        tok.tokenize_file(&input, &output, " ").unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "a ￭-￭ b\n");

        let restored = dir.path().join("restored.txt");
        tok.detokenize_file(&output, &restored, " ").unwrap();
        assert_eq!(fs::read_to_string(&restored).unwrap(), "a-b\n");
    }
}
