//! Text decoding and newline translation for the facade handles.
//!
//! Only UTF-8 is supported. On read, `newline = None` turns `\r\n` and
//! `\r` into `\n`; any other value leaves line endings alone. On write,
//! `\r` and `\r\n` replace every `\n`; the other values write `\n` as is.

use bytes::Bytes;

use crate::{Error, OpenOptions, Result};

/// What to do with bytes that are not valid UTF-8.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodeErrors {
    /// Fail with an `Io` error of kind `InvalidData`.
    #[default]
    Strict,
    /// Substitute U+FFFD for each invalid sequence.
    Replace,
    /// Drop invalid sequences.
    Ignore,
}

impl DecodeErrors {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "strict" => Ok(DecodeErrors::Strict),
            "replace" => Ok(DecodeErrors::Replace),
            "ignore" => Ok(DecodeErrors::Ignore),
            other => Err(Error::validation(format!(
                "unsupported errors value: {:?}",
                other
            ))),
        }
    }
}

/// Decoder/encoder derived from the text arguments of [`OpenOptions`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextCodec {
    errors: DecodeErrors,
    newline: Option<String>,
}

impl TextCodec {
    pub fn from_options(options: &OpenOptions) -> Result<Self> {
        let errors = match &options.errors {
            Some(raw) => DecodeErrors::parse(raw)?,
            None => DecodeErrors::Strict,
        };
        Ok(TextCodec {
            errors,
            newline: options.newline.clone(),
        })
    }

    pub fn decode(&self, key: &str, data: &[u8]) -> Result<String> {
        let text = match self.errors {
            DecodeErrors::Strict => String::from_utf8(data.to_vec()).map_err(|e| Error::Io {
                key: key.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            })?,
            DecodeErrors::Replace => String::from_utf8_lossy(data).into_owned(),
            DecodeErrors::Ignore => data.utf8_chunks().map(|chunk| chunk.valid()).collect(),
        };
        if self.newline.is_none() && text.contains('\r') {
            return Ok(text.replace("\r\n", "\n").replace('\r', "\n"));
        }
        Ok(text)
    }

    pub fn encode(&self, text: &str) -> Bytes {
        match self.newline.as_deref() {
            Some(nl @ ("\r" | "\r\n")) => Bytes::from(text.replace('\n', nl)),
            _ => Bytes::copy_from_slice(text.as_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(errors: Option<&str>, newline: Option<&str>) -> TextCodec {
        let mut options = OpenOptions::default();
        options.errors = errors.map(str::to_string);
        options.newline = newline.map(str::to_string);
        TextCodec::from_options(&options).unwrap()
    }

    #[test]
    fn error_policies() {
        let bad = b"ok \xff\xfe end";
        let err = codec(None, None).decode("k", bad).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(
            codec(Some("replace"), None).decode("k", bad).unwrap(),
            "ok \u{fffd}\u{fffd} end"
        );
        assert_eq!(codec(Some("ignore"), None).decode("k", bad).unwrap(), "ok  end");
        assert!(DecodeErrors::parse("backslashreplace").is_err());
    }

    #[test]
    fn universal_newlines_on_read() {
        let data = b"a\r\nb\rc\n";
        assert_eq!(codec(None, None).decode("k", data).unwrap(), "a\nb\nc\n");
        assert_eq!(codec(None, Some("")).decode("k", data).unwrap(), "a\r\nb\rc\n");
        assert_eq!(codec(None, Some("\n")).decode("k", data).unwrap(), "a\r\nb\rc\n");
    }

    #[test]
    fn newline_translation_on_write() {
        assert_eq!(codec(None, None).encode("a\nb"), Bytes::from_static(b"a\nb"));
        assert_eq!(codec(None, Some("")).encode("a\nb"), Bytes::from_static(b"a\nb"));
        assert_eq!(
            codec(None, Some("\r\n")).encode("a\nb\n"),
            Bytes::from_static(b"a\r\nb\r\n")
        );
        assert_eq!(codec(None, Some("\r")).encode("a\nb"), Bytes::from_static(b"a\rb"));
    }
}
