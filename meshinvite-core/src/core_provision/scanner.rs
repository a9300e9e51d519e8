//! One-directive-at-a-time scanning of configuration text.
//!
//! A directive line is `Key = Value`, `Key Value` or `Key=Value`; the key
//! ends at the first space, tab or `=`.

use crate::core_proto::MAX_CONFIG_LINE;
use crate::error::{InviteError, InviteResult};

/// Iterator over the lines of a text blob.
///
/// Lines of [`MAX_CONFIG_LINE`] bytes or more, and lines starting with a
/// control character, end the scan with an error.
pub struct LineScanner<'a> {
    rest: Option<&'a str>,
    max_line: usize,
    terminated: bool,
}

impl<'a> LineScanner<'a> {
    pub fn new(data: &'a str) -> Self {
        Self { rest: Some(data), max_line: MAX_CONFIG_LINE, terminated: false }
    }

    /// Whether the last line returned ended with a newline
    pub fn terminated(&self) -> bool {
        self.terminated
    }
}

impl<'a> Iterator for LineScanner<'a> {
    type Item = InviteResult<&'a str>;

    fn next(&mut self) -> Option<Self::Item> {
        let data = self.rest.take().filter(|d| !d.is_empty())?;

        let (line, terminated) = match data.find('\n') {
            Some(end) => {
                self.rest = Some(&data[end + 1..]);
                (&data[..end], true)
            }
            None => (data, false),
        };
        self.terminated = terminated;

        if line.len() >= self.max_line {
            self.rest = None;
            return Some(Err(InviteError::Input("maximum line length exceeded".to_string())));
        }

        if line.starts_with(|c: char| c.is_control()) {
            self.rest = None;
            return Some(Err(InviteError::Input("line starts with a control character".into())));
        }

        Some(Ok(line))
    }
}

/// A `key`/`value` pair borrowed from one line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Directive<'a> {
    pub key: &'a str,
    pub value: &'a str,
}

impl<'a> Directive<'a> {
    pub fn parse(line: &'a str) -> Self {
        let key_end = line.find(['\t', ' ', '=']).unwrap_or(line.len());
        let key = &line[..key_end];

        let mut value = line[key_end..].trim_start_matches([' ', '\t']);
        if let Some(after) = value.strip_prefix('=') {
            value = after.trim_start_matches([' ', '\t']);
        }

        Directive { key, value: value.trim_end() }
    }

    pub fn is(&self, name: &str) -> bool {
        self.key.eq_ignore_ascii_case(name)
    }
}

/// Value of `var` if it is the very first line of `data`
pub fn first_value<'a>(data: &'a str, var: &str) -> Option<&'a str> {
    let line = LineScanner::new(data).next()?.ok()?;
    let directive = Directive::parse(line);
    directive.is(var).then_some(directive.value)
}

/// Value of the first `var` directive anywhere in `data`
pub fn find_value<'a>(data: &'a str, var: &str) -> Option<&'a str> {
    data.lines().map(Directive::parse).find(|d| d.is(var)).map(|d| d.value)
}
