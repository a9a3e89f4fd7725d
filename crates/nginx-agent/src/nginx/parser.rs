// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! NGINX configuration parser.
//!
//! Reads the main configuration file and everything it includes, and
//! extracts what the agent needs to watch an instance: log files, the
//! `stub_status` and NGINX Plus `api` endpoints, and the file list.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::model::{ApiDetails, FileMeta, Instance, NginxConfigContext};

/// Errors from parsing NGINX configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The instance has no configuration path.
    #[error("instance {0} has no config path")]
    NoConfigPath(String),

    /// A configuration file could not be read.
    #[error("unable to read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration is malformed.
    #[error("{file}:{line}: {message}")]
    Syntax {
        /// File containing the error.
        file: String,
        /// 1-based line number.
        line: usize,
        /// What is wrong.
        message: String,
    },

    /// Includes nest deeper than allowed, usually an include cycle.
    #[error("include depth exceeded at {0}")]
    IncludeDepth(String),

    /// The blocking parse task failed.
    #[error("parser task failed: {0}")]
    Task(String),
}

/// Parses an instance's configuration.
#[async_trait]
pub trait ConfigParser: Send + Sync {
    /// Parse the configuration of `instance`.
    async fn parse(&self, instance: &Instance) -> Result<NginxConfigContext, ParseError>;
}

/// Parser for NGINX configuration files on the local filesystem.
#[derive(Debug, Clone)]
pub struct NginxConfigParser {
    max_include_depth: usize,
}

impl Default for NginxConfigParser {
    fn default() -> Self {
        Self {
            max_include_depth: 16,
        }
    }
}

impl NginxConfigParser {
    /// Create a parser with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `config_path` synchronously.
    pub fn parse_file(
        &self,
        instance_id: &str,
        config_path: &Path,
    ) -> Result<NginxConfigContext, ParseError> {
        let root_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let mut walker = Walker {
            root_dir,
            max_depth: self.max_include_depth,
            seen: HashSet::new(),
            context: NginxConfigContext {
                instance_id: instance_id.to_string(),
                config_path: config_path.to_string_lossy().into_owned(),
                ..Default::default()
            },
        };

        let directives = walker.load(config_path, 0)?;
        walker.walk(&directives, &Scope::default(), 0)?;

        debug!(
            instance_id,
            files = walker.context.files.len(),
            access_logs = walker.context.access_logs.len(),
            error_logs = walker.context.error_logs.len(),
            "Parsed NGINX config"
        );

        Ok(walker.context)
    }
}

#[async_trait]
impl ConfigParser for NginxConfigParser {
    async fn parse(&self, instance: &Instance) -> Result<NginxConfigContext, ParseError> {
        let config_path = &instance.runtime.config_path;
        if config_path.is_empty() {
            return Err(ParseError::NoConfigPath(instance.id().to_string()));
        }

        let parser = self.clone();
        let instance_id = instance.id().to_string();
        let path = PathBuf::from(config_path);

        tokio::task::spawn_blocking(move || parser.parse_file(&instance_id, &path))
            .await
            .map_err(|e| ParseError::Task(e.to_string()))?
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Semicolon,
    OpenBrace,
    CloseBrace,
}

#[derive(Debug)]
struct Lexed {
    token: Token,
    line: usize,
}

fn syntax(file: &str, line: usize, message: impl Into<String>) -> ParseError {
    ParseError::Syntax {
        file: file.to_string(),
        line,
        message: message.into(),
    }
}

fn tokenize(file: &str, source: &str) -> Result<Vec<Lexed>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line = 1;

    while let Some(c) = chars.next() {
        match c {
            '\n' => line += 1,
            c if c.is_whitespace() => {}
            '#' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        line += 1;
                        break;
                    }
                }
            }
            ';' => tokens.push(Lexed {
                token: Token::Semicolon,
                line,
            }),
            '{' => tokens.push(Lexed {
                token: Token::OpenBrace,
                line,
            }),
            '}' => tokens.push(Lexed {
                token: Token::CloseBrace,
                line,
            }),
            '"' | '\'' => {
                let quote = c;
                let start = line;
                let mut word = String::new();
                let mut closed = false;

                while let Some(c) = chars.next() {
                    if c == quote {
                        closed = true;
                        break;
                    }
                    if c == '\n' {
                        line += 1;
                    }
                    if c == '\\'
                        && let Some(escaped) = chars.next()
                    {
                        if escaped == '\n' {
                            line += 1;
                        }
                        word.push(escaped);
                        continue;
                    }
                    word.push(c);
                }

                if !closed {
                    return Err(syntax(file, start, "unterminated quoted string"));
                }
                tokens.push(Lexed {
                    token: Token::Word(word),
                    line: start,
                });
            }
            _ => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || matches!(next, ';' | '{' | '}') {
                        break;
                    }
                    chars.next();
                    word.push(next);
                    // ${var} keeps its braces
                    if next == '$' && chars.peek() == Some(&'{') {
                        for c in chars.by_ref() {
                            word.push(c);
                            if c == '}' {
                                break;
                            }
                        }
                    }
                }
                tokens.push(Lexed {
                    token: Token::Word(word),
                    line,
                });
            }
        }
    }

    Ok(tokens)
}

// ============================================================================
// Directive tree
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
struct Directive {
    name: String,
    args: Vec<String>,
    line: usize,
    block: Option<Vec<Directive>>,
}

impl Directive {
    fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

fn parse_block(
    file: &str,
    tokens: &[Lexed],
    pos: &mut usize,
    nested: bool,
) -> Result<Vec<Directive>, ParseError> {
    let mut directives = Vec::new();

    loop {
        let Some(lexed) = tokens.get(*pos) else {
            if nested {
                let line = tokens.last().map(|t| t.line).unwrap_or(1);
                return Err(syntax(file, line, "unexpected end of file, expecting \"}\""));
            }
            return Ok(directives);
        };

        let name = match &lexed.token {
            Token::CloseBrace if nested => {
                *pos += 1;
                return Ok(directives);
            }
            Token::CloseBrace => return Err(syntax(file, lexed.line, "unexpected \"}\"")),
            Token::Semicolon => return Err(syntax(file, lexed.line, "unexpected \";\"")),
            Token::OpenBrace => return Err(syntax(file, lexed.line, "unexpected \"{\"")),
            Token::Word(name) => name.clone(),
        };
        let line = lexed.line;
        *pos += 1;

        let mut args = Vec::new();
        loop {
            let Some(lexed) = tokens.get(*pos) else {
                return Err(syntax(
                    file,
                    line,
                    "unexpected end of file, expecting \";\" or \"}\"",
                ));
            };
            *pos += 1;
            match &lexed.token {
                Token::Word(arg) => args.push(arg.clone()),
                Token::Semicolon => {
                    directives.push(Directive {
                        name,
                        args,
                        line,
                        block: None,
                    });
                    break;
                }
                Token::OpenBrace => {
                    let block = parse_block(file, tokens, pos, true)?;
                    directives.push(Directive {
                        name,
                        args,
                        line,
                        block: Some(block),
                    });
                    break;
                }
                Token::CloseBrace => {
                    return Err(syntax(file, lexed.line, "unexpected \"}\""));
                }
            }
        }
    }
}

// ============================================================================
// Walker
// ============================================================================

#[derive(Debug, Clone, Default)]
struct Scope {
    listen: Option<String>,
    location: Option<String>,
}

struct Walker {
    root_dir: PathBuf,
    max_depth: usize,
    seen: HashSet<PathBuf>,
    context: NginxConfigContext,
}

impl Walker {
    fn load(&mut self, path: &Path, depth: usize) -> Result<Vec<Directive>, ParseError> {
        if depth > self.max_depth {
            return Err(ParseError::IncludeDepth(path.display().to_string()));
        }

        let bytes = std::fs::read(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let name = path.to_string_lossy().into_owned();
        if self.seen.insert(path.to_path_buf()) {
            self.context.files.push(FileMeta::from_contents(&name, &bytes));
        }

        let source = String::from_utf8_lossy(&bytes);
        let tokens = tokenize(&name, &source)?;
        let mut pos = 0;
        parse_block(&name, &tokens, &mut pos, false)
    }

    fn walk(
        &mut self,
        directives: &[Directive],
        scope: &Scope,
        depth: usize,
    ) -> Result<(), ParseError> {
        for directive in directives {
            match (directive.name.as_str(), &directive.block) {
                ("include", None) => {
                    let Some(pattern) = directive.arg(0) else {
                        continue;
                    };
                    for path in self.resolve_include(pattern)? {
                        let included = self.load(&path, depth + 1)?;
                        self.walk(&included, scope, depth + 1)?;
                    }
                }
                ("access_log", None) => {
                    if let Some(path) = directive.arg(0)
                        && path != "off"
                    {
                        push_unique(&mut self.context.access_logs, path);
                    }
                }
                ("error_log", None) => {
                    if let Some(path) = directive.arg(0) {
                        push_unique(&mut self.context.error_logs, path);
                    }
                }
                ("stub_status", None) => {
                    if let Some(location) = &scope.location
                        && self.context.stub_status.is_none()
                    {
                        self.context.stub_status = Some(api_details(scope, location));
                    }
                }
                ("api", None) => {
                    if let Some(location) = &scope.location
                        && self.context.plus_api.is_none()
                    {
                        self.context.plus_api = Some(api_details(scope, location));
                    }
                }
                ("server", Some(block)) => {
                    let listen = block
                        .iter()
                        .find(|d| d.name == "listen")
                        .and_then(|d| d.arg(0))
                        .map(str::to_string);
                    let inner = Scope {
                        listen,
                        location: None,
                    };
                    self.walk(block, &inner, depth)?;
                }
                ("location", Some(block)) => {
                    let inner = Scope {
                        listen: scope.listen.clone(),
                        location: directive.args.last().cloned(),
                    };
                    self.walk(block, &inner, depth)?;
                }
                (_, Some(block)) => self.walk(block, scope, depth)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn resolve_include(&self, pattern: &str) -> Result<Vec<PathBuf>, ParseError> {
        let path = if Path::new(pattern).is_absolute() {
            PathBuf::from(pattern)
        } else {
            self.root_dir.join(pattern)
        };

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !file_name.contains(['*', '?']) {
            return Ok(vec![path]);
        }

        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(ParseError::Io { path: dir, source }),
        };

        let mut matches: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.is_file())
            .filter(|p| {
                p.file_name()
                    .map(|n| wildcard_match(&file_name, &n.to_string_lossy()))
                    .unwrap_or(false)
            })
            .collect();
        matches.sort();
        Ok(matches)
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

fn api_details(scope: &Scope, location: &str) -> ApiDetails {
    let listen = scope.listen.clone().unwrap_or_else(|| "80".to_string());
    ApiDetails {
        url: format!("http://{}{}", listen_address(&listen), location),
        listen,
        location: location.to_string(),
    }
}

/// Address to reach a `listen` value from the local host.
fn listen_address(listen: &str) -> String {
    if listen.chars().all(|c| c.is_ascii_digit()) {
        return format!("127.0.0.1:{listen}");
    }
    for wildcard in ["*:", "0.0.0.0:"] {
        if let Some(port) = listen.strip_prefix(wildcard) {
            return format!("127.0.0.1:{port}");
        }
    }
    if let Some(port) = listen.strip_prefix("[::]:") {
        return format!("[::1]:{port}");
    }
    if listen.starts_with("unix:") || listen.contains(':') {
        return listen.to_string();
    }
    format!("{listen}:80")
}

/// Shell style match supporting `*` and `?`.
fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    let (mut p, mut n) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while n < name.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == name[n]) {
            p += 1;
            n += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, n));
            p += 1;
        } else if let Some((sp, sn)) = star {
            p = sp + 1;
            n = sn + 1;
            star = Some((sp, sn + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
