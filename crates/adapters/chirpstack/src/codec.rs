//! Discovery schema extraction from device-profile codec scripts.
//!
//! A profile opts in by defining `getHaDeviceInfo` in its payload codec. The
//! function must return an object literal:
//!
//! ```js
//! function getHaDeviceInfo() {
//!   return {
//!     device: { manufacturer: 'Acme', model: 'TH-1' },
//!     entities: {
//!       temp: { entity_conf: { device_class: 'temperature', unit_of_measurement: '°C' } },
//!       // comments are allowed
//!       door: { integration: 'binary_sensor', entity_conf: { device_class: 'door', }, },
//!     }
//!   };
//! }
//! ```
//!
//! The literal is normalised to JSON by a small lexer: bare keys are quoted,
//! single-quoted strings become double-quoted, comments and trailing commas
//! are dropped. Nothing is evaluated.

use std::mem;

use serde::Deserialize;
use serde_json::{Map, Value};

use chirpbridge_domain::entity::{DeviceBlock, EntityConfig, EntitySchema, Integration};

use crate::error::SchemaError;

const FUNCTION_ANCHOR: &str = "getHaDeviceInfo";
const RETURN_ANCHOR: &str = "return";

/// The object literal returned by `getHaDeviceInfo`, normalised to JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLiteral {
    pub json: String,
    /// The consumed script text, for diagnostics.
    pub source: String,
}

/// Discovery schema declared by a device profile.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiscoverySchema {
    /// Base `device` block shared by every entity.
    pub device: DeviceBlock,
    pub entities: Vec<EntitySchema>,
}

#[derive(Deserialize)]
struct RawSchema {
    #[serde(default)]
    device: Option<DeviceBlock>,
    #[serde(default)]
    entities: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct RawEntity {
    #[serde(default)]
    entity_conf: EntityConfig,
    #[serde(default)]
    integration: Option<Integration>,
    #[serde(default)]
    data_event: Option<String>,
}

impl RawEntity {
    fn into_schema(self, entity_id: String) -> EntitySchema {
        EntitySchema {
            entity_id,
            integration: self.integration,
            data_event: self.data_event,
            config: self.entity_conf,
        }
    }
}

/// Locate and normalise the object literal returned by `getHaDeviceInfo`.
///
/// # Errors
///
/// Returns [`SchemaError::MissingFunction`], [`SchemaError::MissingReturn`]
/// or [`SchemaError::MissingBrace`] when an anchor is absent.
pub fn extract(script: &str) -> Result<ExtractedLiteral, SchemaError> {
    let function = script
        .find(FUNCTION_ANCHOR)
        .ok_or(SchemaError::MissingFunction)?;
    let ret = script[function..]
        .find(RETURN_ANCHOR)
        .map(|offset| function + offset)
        .ok_or(SchemaError::MissingReturn)?;
    let brace = script[ret..]
        .find('{')
        .map(|offset| ret + offset)
        .ok_or(SchemaError::MissingBrace)?;

    let tail = &script[brace..];
    let (tokens, consumed) = tokenize(tail);
    Ok(ExtractedLiteral {
        json: render(&tokens),
        source: tail[..consumed].to_string(),
    })
}

/// Extract and parse the discovery schema of a codec script.
///
/// # Errors
///
/// Returns a [`SchemaError`] when the literal is missing, is not valid JSON
/// once normalised, or does not declare an `entities` mapping.
pub fn parse_schema(script: &str) -> Result<DiscoverySchema, SchemaError> {
    let literal = extract(script)?;
    let value: Value =
        serde_json::from_str(&literal.json).map_err(|source| SchemaError::InvalidJson {
            source,
            json: literal.json.clone(),
        })?;
    let raw: RawSchema = serde_json::from_value(value).map_err(SchemaError::Structure)?;
    let entities = raw
        .entities
        .ok_or(SchemaError::MissingEntities)?
        .into_iter()
        .map(|(entity_id, entity)| {
            serde_json::from_value::<RawEntity>(entity)
                .map(|entity| entity.into_schema(entity_id))
                .map_err(SchemaError::Structure)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(DiscoverySchema {
        device: raw.device.unwrap_or_default(),
        entities,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Punct(char),
    /// String contents, already escaped for JSON.
    Str(String),
    /// Bare word: key, number, literal.
    Word(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    AfterSlash,
    LineComment,
    BlockComment { star: bool },
    InString { quote: char, escaped: bool },
}

struct Lexer {
    state: State,
    tokens: Vec<Token>,
    word: String,
    text: String,
    depth: usize,
}

/// Tokenise from an opening brace until it is closed.
///
/// Returns the tokens and the number of bytes consumed.
fn tokenize(source: &str) -> (Vec<Token>, usize) {
    let mut lexer = Lexer {
        state: State::Normal,
        tokens: Vec::new(),
        word: String::new(),
        text: String::new(),
        depth: 0,
    };
    for (offset, c) in source.char_indices() {
        if lexer.feed(c) {
            return (lexer.finish(), offset + c.len_utf8());
        }
    }
    (lexer.finish(), source.len())
}

impl Lexer {
    /// Returns `true` once the outermost brace is closed.
    fn feed(&mut self, c: char) -> bool {
        match self.state {
            State::Normal => self.normal(c),
            State::AfterSlash => match c {
                '/' => {
                    self.state = State::LineComment;
                    false
                }
                '*' => {
                    self.state = State::BlockComment { star: false };
                    false
                }
                _ => {
                    // a lone slash is kept and will fail JSON parsing
                    self.word.push('/');
                    self.state = State::Normal;
                    self.normal(c)
                }
            },
            State::LineComment => {
                if c == '\n' {
                    self.state = State::Normal;
                }
                false
            }
            State::BlockComment { star } => {
                self.state = match (star, c) {
                    (true, '/') => State::Normal,
                    (_, '*') => State::BlockComment { star: true },
                    _ => State::BlockComment { star: false },
                };
                false
            }
            State::InString { quote, escaped } => {
                self.string(c, quote, escaped);
                false
            }
        }
    }

    fn normal(&mut self, c: char) -> bool {
        match c {
            '"' | '\'' => {
                self.flush_word();
                self.state = State::InString {
                    quote: c,
                    escaped: false,
                };
            }
            '/' => {
                self.flush_word();
                self.state = State::AfterSlash;
            }
            '{' | '}' | '[' | ']' | ':' | ',' => {
                self.flush_word();
                self.tokens.push(Token::Punct(c));
                if c == '{' {
                    self.depth += 1;
                } else if c == '}' {
                    self.depth = self.depth.saturating_sub(1);
                    return self.depth == 0;
                }
            }
            c if c.is_whitespace() => self.flush_word(),
            c => self.word.push(c),
        }
        false
    }

    fn string(&mut self, c: char, quote: char, escaped: bool) {
        let mut next = State::InString {
            quote,
            escaped: false,
        };
        if escaped {
            if c == '\'' {
                self.text.push('\'');
            } else {
                self.text.push('\\');
                self.text.push(c);
            }
        } else if c == '\\' {
            next = State::InString {
                quote,
                escaped: true,
            };
        } else if c == quote {
            self.tokens.push(Token::Str(mem::take(&mut self.text)));
            next = State::Normal;
        } else {
            match c {
                '"' => self.text.push_str("\\\""),
                '\n' => self.text.push_str("\\n"),
                '\t' => self.text.push_str("\\t"),
                '\r' => {}
                _ => self.text.push(c),
            }
        }
        self.state = next;
    }

    fn flush_word(&mut self) {
        if !self.word.is_empty() {
            self.tokens.push(Token::Word(mem::take(&mut self.word)));
        }
    }

    fn finish(mut self) -> Vec<Token> {
        self.flush_word();
        self.tokens
    }
}

fn render(tokens: &[Token]) -> String {
    let mut out = String::new();
    for (index, token) in tokens.iter().enumerate() {
        let next = tokens.get(index + 1);
        match token {
            Token::Punct(',') if matches!(next, Some(Token::Punct('}' | ']'))) => {}
            Token::Punct(c) => out.push(*c),
            Token::Str(text) => {
                out.push('"');
                out.push_str(text);
                out.push('"');
            }
            Token::Word(word) if matches!(next, Some(Token::Punct(':'))) => {
                out.push('"');
                out.push_str(word);
                out.push('"');
            }
            Token::Word(word) => out.push_str(word),
        }
    }
    out
}
