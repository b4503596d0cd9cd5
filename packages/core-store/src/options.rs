//! Argument bundles for the mutating and opening primitives.

use crate::text::DecodeErrors;
use crate::{Error, Result};

/// Arguments for `mkdir`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MkdirOptions {
    pub mode: u32,
    pub parents: bool,
    pub exist_ok: bool,
}

impl Default for MkdirOptions {
    fn default() -> Self {
        MkdirOptions {
            mode: 0o777,
            parents: false,
            exist_ok: false,
        }
    }
}

impl MkdirOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn parents(mut self, parents: bool) -> Self {
        self.parents = parents;
        self
    }

    pub fn exist_ok(mut self, exist_ok: bool) -> Self {
        self.exist_ok = exist_ok;
        self
    }
}

/// Arguments for `touch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchOptions {
    pub mode: u32,
    pub exist_ok: bool,
}

impl Default for TouchOptions {
    fn default() -> Self {
        TouchOptions {
            mode: 0o666,
            exist_ok: true,
        }
    }
}

impl TouchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn exist_ok(mut self, exist_ok: bool) -> Self {
        self.exist_ok = exist_ok;
        self
    }
}

/// How a file is opened.
///
/// Usually built from a mode string such as `"r"`, `"wb"` or `"a+"`.
/// Raw handles always move bytes. `buffering` sizes the write buffer of
/// the facade handle; `encoding`, `errors` and `newline` drive its text
/// helpers (`read_text` / `write_text`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOptions {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub truncate: bool,
    pub create: bool,
    pub create_new: bool,
    pub binary: bool,
    /// Buffer size hint. `Some(0)` asks for unbuffered access.
    pub buffering: Option<usize>,
    pub encoding: Option<String>,
    /// Decoding error policy: `strict` (default), `replace` or `ignore`.
    pub errors: Option<String>,
    pub newline: Option<String>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            read: true,
            write: false,
            append: false,
            truncate: false,
            create: false,
            create_new: false,
            binary: false,
            buffering: None,
            encoding: None,
            errors: None,
            newline: None,
        }
    }
}

impl OpenOptions {
    /// Parse a mode string.
    ///
    /// Exactly one of `r`, `w`, `a`, `x`; optionally one of `b`/`t`;
    /// optionally `+`.
    ///
    /// ```rust
    /// use storeloc_core::OpenOptions;
    ///
    /// let opts = OpenOptions::parse("wb").unwrap();
    /// assert!(opts.write && opts.truncate && opts.binary && !opts.read);
    /// assert!(OpenOptions::parse("rw").is_err());
    /// ```
    pub fn parse(mode: &str) -> Result<Self> {
        let bad = || Error::validation(format!("invalid mode: '{}'", mode));

        let mut primary = None;
        let mut binary = None;
        let mut plus = false;
        for c in mode.chars() {
            match c {
                'r' | 'w' | 'a' | 'x' if primary.is_none() => primary = Some(c),
                'b' | 't' if binary.is_none() => binary = Some(c == 'b'),
                '+' if !plus => plus = true,
                _ => return Err(bad()),
            }
        }

        let mut opts = OpenOptions {
            read: false,
            binary: binary.unwrap_or(false),
            ..OpenOptions::default()
        };
        match primary.ok_or_else(bad)? {
            'r' => opts.read = true,
            'w' => {
                opts.write = true;
                opts.create = true;
                opts.truncate = true;
            }
            'a' => {
                opts.append = true;
                opts.create = true;
            }
            _ => {
                opts.write = true;
                opts.create_new = true;
            }
        }
        if plus {
            opts.read = true;
            if !opts.append {
                opts.write = true;
            }
        }
        Ok(opts)
    }

    pub fn buffering(mut self, buffering: usize) -> Self {
        self.buffering = Some(buffering);
        self
    }

    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn errors(mut self, errors: impl Into<String>) -> Self {
        self.errors = Some(errors.into());
        self
    }

    pub fn newline(mut self, newline: impl Into<String>) -> Self {
        self.newline = Some(newline.into());
        self
    }

    /// Copy the text arguments of `text` onto these options.
    pub fn with_text(mut self, text: &TextOptions) -> Self {
        self.encoding = text.encoding.clone();
        self.errors = text.errors.clone();
        self.newline = text.newline.clone();
        self
    }

    /// True if opening with these options can change the target.
    pub fn is_mutating(&self) -> bool {
        self.write || self.append || self.truncate || self.create || self.create_new
    }

    /// Reject combinations that cannot be honoured.
    pub fn validate(&self) -> Result<()> {
        if self.binary
            && (self.encoding.is_some() || self.errors.is_some() || self.newline.is_some())
        {
            return Err(Error::validation(
                "binary mode does not take an encoding, errors or newline argument",
            ));
        }
        if !self.binary && self.buffering == Some(0) {
            return Err(Error::validation("can't have unbuffered text I/O"));
        }
        if let Some(errors) = &self.errors {
            DecodeErrors::parse(errors)?;
        }
        if let Some(encoding) = &self.encoding {
            let normalized = encoding.to_ascii_lowercase().replace('_', "-");
            if normalized != "utf-8" && normalized != "utf8" {
                return Err(Error::validation(format!(
                    "unsupported encoding: {}",
                    encoding
                )));
            }
        }
        if let Some(newline) = &self.newline {
            if !matches!(newline.as_str(), "" | "\n" | "\r" | "\r\n") {
                return Err(Error::validation(format!(
                    "illegal newline value: {:?}",
                    newline
                )));
            }
        }
        Ok(())
    }
}

/// Text arguments for `read_text` / `write_text` and their async forms.
///
/// ```rust
/// use storeloc_core::TextOptions;
///
/// let text = TextOptions::new().errors("replace").newline("\r\n");
/// assert_eq!(text.errors.as_deref(), Some("replace"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextOptions {
    pub encoding: Option<String>,
    pub errors: Option<String>,
    pub newline: Option<String>,
}

impl TextOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn errors(mut self, errors: impl Into<String>) -> Self {
        self.errors = Some(errors.into());
        self
    }

    pub fn newline(mut self, newline: impl Into<String>) -> Self {
        self.newline = Some(newline.into());
        self
    }
}

impl TryFrom<&str> for OpenOptions {
    type Error = Error;

    fn try_from(mode: &str) -> Result<Self> {
        OpenOptions::parse(mode)
    }
}
