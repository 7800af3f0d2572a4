// tag-logic/src/parser.rs
// ============================================================================
// Module: Tag Query Parser
// Description: Lexer and recursive-descent parser for the query grammar.
// Purpose: Turn query text into a `TagExpr` tree with positioned, fail-closed
// diagnostics and no partial results.
// Dependencies: crate::expr, thiserror
// ============================================================================

//! ## Overview
//! Grammar (whitespace insignificant, keywords case-insensitive):
//!
//! ```text
//! Query     := OrExpr
//! OrExpr    := AndExpr ( "OR"  AndExpr )*
//! AndExpr   := NotExpr ( "AND" NotExpr )*
//! NotExpr   := "NOT" NotExpr | Primary
//! Primary   := "(" OrExpr ")" | Match
//! Match     := ident "=" ident      (ident = [a-z0-9_-*]+)
//! ```
//!
//! `AND` binds tighter than `OR`; `NOT` is prefix and right-associative.
//! Identifiers are lower-cased during lexing so evaluation stays
//! case-insensitive. Parenthesized sub-expressions keep their tree shape;
//! the parser never flattens across explicit parentheses, which is what
//! lets [`TagExpr`]'s printer round-trip exactly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::expr::TagExpr;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum nesting depth accepted by the parser.
const MAX_QUERY_DEPTH: usize = 64;

// ============================================================================
// SECTION: Parse Errors
// ============================================================================

/// Errors produced while parsing a tag query.
///
/// Every variant carries the byte offset of the offending position so
/// callers can surface precise diagnostics. Parsing never yields a partial
/// expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryParseError {
    /// The query was empty or contained only whitespace.
    #[error("query is empty")]
    Empty,
    /// A character outside the query alphabet was encountered.
    #[error("unexpected character {character:?} at position {pos}")]
    UnexpectedCharacter {
        /// Byte offset of the character.
        pos: usize,
        /// The offending character.
        character: char,
    },
    /// A parenthesis had no matching counterpart.
    #[error("unbalanced parenthesis at position {pos}")]
    UnbalancedParenthesis {
        /// Byte offset of the parenthesis.
        pos: usize,
    },
    /// An operator was missing an operand.
    #[error("missing operand for {operator} at position {pos}")]
    MissingOperand {
        /// Byte offset where an operand was expected.
        pos: usize,
        /// Operator that lacked its operand.
        operator: &'static str,
    },
    /// A match term was missing its `=` separator.
    #[error("expected '=' after key {key:?} at position {pos}")]
    MissingEquals {
        /// Byte offset where `=` was expected.
        pos: usize,
        /// Key that lacked a separator.
        key: String,
    },
    /// A match term started with `=` and had no key.
    #[error("match term is missing a key at position {pos}")]
    MissingKey {
        /// Byte offset of the `=` character.
        pos: usize,
    },
    /// A match term had no value after `=`.
    #[error("match term for key {key:?} is missing a value at position {pos}")]
    MissingValue {
        /// Byte offset where a value was expected.
        pos: usize,
        /// Key whose value was missing.
        key: String,
    },
    /// Input continued after a complete query.
    #[error("unexpected trailing input {lexeme:?} at position {pos}")]
    TrailingInput {
        /// Byte offset of the trailing token.
        pos: usize,
        /// Lexeme of the trailing token.
        lexeme: String,
    },
    /// The query nested deeper than [`MAX_QUERY_DEPTH`].
    #[error("query nests deeper than {max_depth} levels at position {pos}")]
    TooDeep {
        /// Byte offset where the limit was exceeded.
        pos: usize,
        /// Maximum permitted depth.
        max_depth: usize,
    },
}

impl QueryParseError {
    /// Returns the byte offset associated with this error, if any.
    #[must_use]
    pub const fn position(&self) -> Option<usize> {
        match self {
            Self::Empty => None,
            Self::UnexpectedCharacter {
                pos, ..
            }
            | Self::UnbalancedParenthesis {
                pos,
            }
            | Self::MissingOperand {
                pos, ..
            }
            | Self::MissingEquals {
                pos, ..
            }
            | Self::MissingKey {
                pos,
            }
            | Self::MissingValue {
                pos, ..
            }
            | Self::TrailingInput {
                pos, ..
            }
            | Self::TooDeep {
                pos, ..
            } => Some(*pos),
        }
    }
}

// ============================================================================
// SECTION: Tokens
// ============================================================================

/// Token kinds produced by the lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    /// Identifier (already lower-cased).
    Ident,
    /// `=` separator.
    Equals,
    /// `(` group open.
    LParen,
    /// `)` group close.
    RParen,
    /// `AND` keyword.
    And,
    /// `OR` keyword.
    Or,
    /// `NOT` keyword.
    Not,
}

/// A lexed token with its source position.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    /// Token kind.
    kind: TokenKind,
    /// Lower-cased lexeme.
    lexeme: String,
    /// Byte offset of the first character.
    pos: usize,
}

/// Returns true for characters allowed inside query identifiers.
const fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' || ch == '*'
}

/// Lexes query text into tokens.
fn lex(input: &str) -> Result<Vec<Token>, QueryParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        match ch {
            ch if ch.is_whitespace() => {}
            '(' => tokens.push(Token {
                kind: TokenKind::LParen,
                lexeme: "(".to_string(),
                pos,
            }),
            ')' => tokens.push(Token {
                kind: TokenKind::RParen,
                lexeme: ")".to_string(),
                pos,
            }),
            '=' => tokens.push(Token {
                kind: TokenKind::Equals,
                lexeme: "=".to_string(),
                pos,
            }),
            ch if is_ident_char(ch) => {
                let mut lexeme = String::new();
                lexeme.push(ch.to_ascii_lowercase());
                while let Some((_, next)) = chars.peek() {
                    if is_ident_char(*next) {
                        lexeme.push(next.to_ascii_lowercase());
                        chars.next();
                    } else {
                        break;
                    }
                }
                let kind = match lexeme.as_str() {
                    "and" => TokenKind::And,
                    "or" => TokenKind::Or,
                    "not" => TokenKind::Not,
                    _ => TokenKind::Ident,
                };
                tokens.push(Token {
                    kind,
                    lexeme,
                    pos,
                });
            }
            character => {
                return Err(QueryParseError::UnexpectedCharacter {
                    pos,
                    character,
                });
            }
        }
    }

    Ok(tokens)
}

// ============================================================================
// SECTION: Parser
// ============================================================================

/// Context describing why an operand is expected at the current position.
#[derive(Debug, Clone, Copy)]
enum OperandContext {
    /// Start of the query.
    TopLevel,
    /// Operand of a named operator at the given position.
    Operator(&'static str, usize),
    /// Expression inside a group opened at the given position.
    Group(usize),
}

/// Recursive-descent parser over the token stream.
struct Parser {
    /// Lexed tokens.
    tokens: Vec<Token>,
    /// Cursor into `tokens`.
    cursor: usize,
    /// Total input length, used for end-of-input positions.
    input_len: usize,
}

impl Parser {
    /// Returns the next token without consuming it.
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor)
    }

    /// Consumes and returns the next token.
    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    /// Returns the position where the next operand would start.
    fn here(&self) -> usize {
        self.peek().map_or(self.input_len, |token| token.pos)
    }

    /// Parses an `OrExpr`.
    fn parse_or(&mut self, depth: usize, ctx: OperandContext) -> Result<TagExpr, QueryParseError> {
        self.check_depth(depth)?;
        let mut operands = vec![self.parse_and(depth, ctx)?];
        while let Some(token) = self.peek() {
            if token.kind != TokenKind::Or {
                break;
            }
            let pos = token.pos;
            self.cursor += 1;
            operands.push(self.parse_and(depth, OperandContext::Operator("OR", pos))?);
        }
        Ok(fold_operands(operands, TagExpr::or))
    }

    /// Parses an `AndExpr`.
    fn parse_and(&mut self, depth: usize, ctx: OperandContext) -> Result<TagExpr, QueryParseError> {
        let mut operands = vec![self.parse_not(depth, ctx)?];
        while let Some(token) = self.peek() {
            if token.kind != TokenKind::And {
                break;
            }
            let pos = token.pos;
            self.cursor += 1;
            operands.push(self.parse_not(depth, OperandContext::Operator("AND", pos))?);
        }
        Ok(fold_operands(operands, TagExpr::and))
    }

    /// Parses a `NotExpr`.
    fn parse_not(&mut self, depth: usize, ctx: OperandContext) -> Result<TagExpr, QueryParseError> {
        self.check_depth(depth)?;
        if let Some(token) = self.peek() {
            if token.kind == TokenKind::Not {
                let pos = token.pos;
                self.cursor += 1;
                let child = self.parse_not(depth + 1, OperandContext::Operator("NOT", pos))?;
                return Ok(TagExpr::negate(child));
            }
        }
        self.parse_primary(depth, ctx)
    }

    /// Parses a `Primary`.
    fn parse_primary(
        &mut self,
        depth: usize,
        ctx: OperandContext,
    ) -> Result<TagExpr, QueryParseError> {
        let Some(token) = self.advance() else {
            return Err(match ctx {
                OperandContext::TopLevel => QueryParseError::Empty,
                OperandContext::Operator(operator, _) => QueryParseError::MissingOperand {
                    pos: self.input_len,
                    operator,
                },
                OperandContext::Group(pos) => QueryParseError::UnbalancedParenthesis {
                    pos,
                },
            });
        };

        match token.kind {
            TokenKind::LParen => {
                let open_pos = token.pos;
                let inner = self.parse_or(depth + 1, OperandContext::Group(open_pos))?;
                match self.advance() {
                    Some(close) if close.kind == TokenKind::RParen => Ok(inner),
                    _ => Err(QueryParseError::UnbalancedParenthesis {
                        pos: open_pos,
                    }),
                }
            }
            TokenKind::Ident => self.parse_match(token),
            TokenKind::Equals => Err(QueryParseError::MissingKey {
                pos: token.pos,
            }),
            TokenKind::RParen => match ctx {
                OperandContext::Operator(operator, _) => Err(QueryParseError::MissingOperand {
                    pos: token.pos,
                    operator,
                }),
                OperandContext::Group(_) => Err(QueryParseError::MissingOperand {
                    pos: token.pos,
                    operator: "(",
                }),
                OperandContext::TopLevel => Err(QueryParseError::UnbalancedParenthesis {
                    pos: token.pos,
                }),
            },
            TokenKind::And | TokenKind::Or | TokenKind::Not => {
                Err(QueryParseError::MissingOperand {
                    pos: token.pos,
                    operator: match token.kind {
                        TokenKind::And => "AND",
                        TokenKind::Or => "OR",
                        _ => "NOT",
                    },
                })
            }
        }
    }

    /// Parses the remainder of a `Match` after its key identifier.
    fn parse_match(&mut self, key_token: Token) -> Result<TagExpr, QueryParseError> {
        match self.peek() {
            Some(token) if token.kind == TokenKind::Equals => {
                self.cursor += 1;
            }
            _ => {
                return Err(QueryParseError::MissingEquals {
                    pos: self.here(),
                    key: key_token.lexeme,
                });
            }
        }

        // Keywords are valid match values; their lexeme carries the text.
        match self.advance() {
            Some(value) if value_token_usable(&value.kind) => {
                Ok(TagExpr::matches(key_token.lexeme, &value.lexeme))
            }
            Some(other) => Err(QueryParseError::MissingValue {
                pos: other.pos,
                key: key_token.lexeme,
            }),
            None => Err(QueryParseError::MissingValue {
                pos: self.input_len,
                key: key_token.lexeme,
            }),
        }
    }

    /// Enforces the nesting depth limit.
    fn check_depth(&self, depth: usize) -> Result<(), QueryParseError> {
        if depth > MAX_QUERY_DEPTH {
            return Err(QueryParseError::TooDeep {
                pos: self.here(),
                max_depth: MAX_QUERY_DEPTH,
            });
        }
        Ok(())
    }
}

/// Returns true when a token kind may serve as a match value.
const fn value_token_usable(kind: &TokenKind) -> bool {
    matches!(kind, TokenKind::Ident | TokenKind::And | TokenKind::Or | TokenKind::Not)
}

/// Wraps n-ary operands, unwrapping single-operand chains.
fn fold_operands(mut operands: Vec<TagExpr>, combine: fn(Vec<TagExpr>) -> TagExpr) -> TagExpr {
    if operands.len() == 1 {
        // A single operand contributes no chain node of its own.
        if let Some(only) = operands.pop() {
            return only;
        }
    }
    combine(operands)
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Parses query text into a [`TagExpr`].
///
/// # Errors
///
/// Returns [`QueryParseError`] on empty input, unexpected characters,
/// unbalanced parentheses, missing operands, or malformed match terms.
/// No partial expression is ever returned.
pub fn parse_query(input: &str) -> Result<TagExpr, QueryParseError> {
    let tokens = lex(input)?;
    if tokens.is_empty() {
        return Err(QueryParseError::Empty);
    }

    let input_len = input.len();
    let mut parser = Parser {
        tokens,
        cursor: 0,
        input_len,
    };

    let expr = parser.parse_or(0, OperandContext::TopLevel)?;

    if let Some(trailing) = parser.peek() {
        if trailing.kind == TokenKind::RParen {
            return Err(QueryParseError::UnbalancedParenthesis {
                pos: trailing.pos,
            });
        }
        return Err(QueryParseError::TrailingInput {
            pos: trailing.pos,
            lexeme: trailing.lexeme.clone(),
        });
    }

    Ok(expr)
}
