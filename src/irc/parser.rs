/// An IRC protocol message per RFC 2812, with optional IRCv3 message tags.
///
/// Wire format: `[@tags] [:prefix] COMMAND [params...] [:trailing]\r\n`
///
/// Examples:
///   `:nick!user@host PRIVMSG alice :Hello world\r\n`
///   `@+typing=active PRIVMSG alice :hi\r\n`
///   `NICK alice\r\n`
///
/// A message with an empty command is the "no message" sentinel produced by
/// the stream parser for lines it could not make sense of.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IrcMessage {
    /// Tags in wire order. Values are kept in their escaped wire form.
    pub tags: Vec<(String, String)>,
    pub prefix: Option<String>,
    pub command: String,
    /// Middle parameters only; the colon-prefixed final argument lives in `trailing`.
    pub params: Vec<String>,
    pub trailing: Option<String>,
}

/// Longest line accepted or produced, excluding the `\r\n` terminator.
/// RFC 2812 says 512 bytes; IRCv3 `message-tags` pushes this to 8191.
pub const MAX_LINE_LENGTH: usize = 8191;

pub const CMD_CAP: &str = "CAP";
pub const CMD_NICK: &str = "NICK";
pub const CMD_PASS: &str = "PASS";
pub const CMD_USER: &str = "USER";
pub const CMD_QUIT: &str = "QUIT";
pub const CMD_PING: &str = "PING";
pub const CMD_PONG: &str = "PONG";
pub const CMD_PRIVMSG: &str = "PRIVMSG";

impl IrcMessage {
    /// A message with the given command and nothing else.
    pub fn new(command: &str) -> Self {
        IrcMessage {
            command: command.to_string(),
            ..Default::default()
        }
    }

    /// Create a server reply with the given prefix.
    pub fn server_reply(server_name: &str, command: &str, params: Vec<String>) -> Self {
        IrcMessage {
            prefix: Some(server_name.to_string()),
            command: command.to_string(),
            params,
            ..Default::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params.extend(params.into_iter().map(Into::into));
        self
    }

    pub fn with_trailing(mut self, trailing: impl Into<String>) -> Self {
        self.trailing = Some(trailing.into());
        self
    }

    /// Drop every tag, for recipients that never negotiated `message-tags`.
    pub fn without_tags(mut self) -> Self {
        self.tags.clear();
        self
    }

    /// True for the "no message" sentinel.
    pub fn is_empty(&self) -> bool {
        self.command.is_empty()
    }

    pub fn is(&self, command: &str) -> bool {
        self.command == command
    }

    /// The parameter at `n` if present, else the trailing text, else "".
    ///
    /// Used for commands like USER whose last argument is often sent without
    /// a colon.
    pub fn lax_trailing(&self, n: usize) -> &str {
        self.params
            .get(n)
            .or(self.trailing.as_ref())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Parse a single IRC line (with or without the trailing \r\n).
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);

        if line.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut remaining = line;
        let mut tags = Vec::new();

        if let Some(rest) = remaining.strip_prefix('@') {
            let Some(idx) = rest.find(' ') else {
                return Err(ParseError::MissingCommand);
            };
            tags = parse_tags(&rest[..idx])?;
            remaining = rest[idx..].trim_start_matches(' ');
        }

        let mut prefix = None;
        if let Some(rest) = remaining.strip_prefix(':') {
            let Some(idx) = rest.find(' ') else {
                return Err(ParseError::MissingCommand);
            };
            prefix = Some(rest[..idx].to_string());
            remaining = rest[idx..].trim_start_matches(' ');
        }

        let command = match remaining.find(' ') {
            Some(idx) => {
                let command = &remaining[..idx];
                remaining = remaining[idx..].trim_start_matches(' ');
                command
            }
            None => std::mem::take(&mut remaining),
        };

        if command.is_empty() {
            return Err(ParseError::MissingCommand);
        }

        let mut params = Vec::new();
        let mut trailing = None;
        while !remaining.is_empty() {
            if let Some(rest) = remaining.strip_prefix(':') {
                trailing = Some(rest.to_string());
                break;
            }

            match remaining.find(' ') {
                Some(idx) => {
                    params.push(remaining[..idx].to_string());
                    remaining = remaining[idx..].trim_start_matches(' ');
                }
                None => {
                    params.push(remaining.to_string());
                    break;
                }
            }
        }

        Ok(IrcMessage {
            tags,
            prefix,
            command: command.to_ascii_uppercase(),
            params,
            trailing,
        })
    }

    /// Format this message as a wire line including the `\r\n` terminator.
    ///
    /// Returns `None` for messages that cannot be represented on the wire.
    pub fn to_wire(&self) -> Option<String> {
        if !is_wire_command(&self.command) {
            return None;
        }

        let mut out = String::with_capacity(512);

        if !self.tags.is_empty() {
            out.push('@');
            for (i, (key, value)) in self.tags.iter().enumerate() {
                if key.is_empty()
                    || key.contains([' ', ';', '='])
                    || value.contains([' ', ';'])
                    || has_control(key)
                    || has_control(value)
                {
                    return None;
                }
                if i > 0 {
                    out.push(';');
                }
                out.push_str(key);
                if !value.is_empty() {
                    out.push('=');
                    out.push_str(value);
                }
            }
            out.push(' ');
        }

        if let Some(ref prefix) = self.prefix {
            if prefix.is_empty() || prefix.contains(' ') || has_control(prefix) {
                return None;
            }
            out.push(':');
            out.push_str(prefix);
            out.push(' ');
        }

        out.push_str(&self.command);

        for param in &self.params {
            if param.is_empty() || param.starts_with(':') || param.contains(' ') || has_control(param)
            {
                return None;
            }
            out.push(' ');
            out.push_str(param);
        }

        if let Some(ref trailing) = self.trailing {
            if has_control(trailing) {
                return None;
            }
            out.push_str(" :");
            out.push_str(trailing);
        }

        if out.len() > MAX_LINE_LENGTH {
            return None;
        }

        out.push_str("\r\n");
        Some(out)
    }
}

/// Commands go out exactly as `parse` would read them back: upper-case
/// letters or a numeric.
fn is_wire_command(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

fn has_control(s: &str) -> bool {
    s.contains(['\r', '\n', '\0'])
}

fn parse_tags(raw: &str) -> Result<Vec<(String, String)>, ParseError> {
    raw.split(';')
        .filter(|t| !t.is_empty())
        .map(|tag| {
            let (key, value) = tag.split_once('=').unwrap_or((tag, ""));
            if key.is_empty() {
                return Err(ParseError::MalformedTags);
            }
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("empty message")]
    Empty,
    #[error("missing command")]
    MissingCommand,
    #[error("malformed message tags")]
    MalformedTags,
}
