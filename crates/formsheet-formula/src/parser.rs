//! Formula parser
//!
//! Text is first split into tokens, then a recursive descent parser
//! builds the AST with the usual spreadsheet precedence. Anchoring `$`
//! flags on references are kept so formulas can be printed back.

use crate::ast::{BinaryOperator, CellReference, FormulaExpr, RangeReference, UnaryOperator};
use crate::error::{FormulaError, FormulaResult};
use formsheet_core::{CellAddress, CellError, CellRange};

/// Parse formula text, which must start with `=`
///
/// ```rust
/// use formsheet_formula::parse_formula;
///
/// assert!(parse_formula("=SUM($B$2:B9)*2").is_ok());
/// assert!(parse_formula("SUM(B2:B9)").is_err());
/// ```
pub fn parse_formula(formula: &str) -> FormulaResult<FormulaExpr> {
    let body = formula
        .trim()
        .strip_prefix('=')
        .ok_or_else(|| FormulaError::Parse("Formula must start with '='".into()))?;
    parse_expression(body)
}

/// Parse a bare expression such as `order.total > 0`
pub fn parse_expression(text: &str) -> FormulaResult<FormulaExpr> {
    let tokens = tokenize(text)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expression()?;
    match parser.peek() {
        Token::Eof => Ok(expr),
        other => Err(FormulaError::Parse(format!(
            "Unexpected {other:?} after end of expression"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    String(String),
    Boolean(bool),
    Error(CellError),
    /// Function name or defined name
    Ident(String),
    /// `A1`, `$A$1`
    Cell(String),
    /// `Sheet1!` or `'My Sheet'!`
    Sheet(String),
    Op(char),
    /// `<>`, `<=`, `>=`
    Cmp(&'static str),
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Colon,
    Eof,
}

fn tokenize(text: &str) -> FormulaResult<Vec<Token>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let next = chars.get(i + 1).copied();
        let token = match c {
            '+' | '-' | '*' | '/' | '^' | '%' | '&' | '=' => {
                i += 1;
                Token::Op(c)
            }
            '<' if next == Some('>') => {
                i += 2;
                Token::Cmp("<>")
            }
            '<' | '>' if next == Some('=') => {
                i += 2;
                Token::Cmp(if c == '<' { "<=" } else { ">=" })
            }
            '<' | '>' => {
                i += 1;
                Token::Op(c)
            }
            '(' | ')' | '{' | '}' | ',' | ';' | ':' => {
                i += 1;
                match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '{' => Token::LBrace,
                    '}' => Token::RBrace,
                    ',' => Token::Comma,
                    ';' => Token::Semicolon,
                    _ => Token::Colon,
                }
            }
            '"' => {
                let (s, end) = read_quoted(&chars, i, '"')?;
                i = end;
                Token::String(s)
            }
            '\'' => {
                let (s, end) = read_quoted(&chars, i, '\'')?;
                if chars.get(end) != Some(&'!') {
                    return Err(FormulaError::Parse(format!("Quoted name '{s}' must be a sheet")));
                }
                i = end + 1;
                Token::Sheet(s)
            }
            '#' => {
                let start = i;
                i += 1;
                while i < chars.len() && matches!(chars[i], 'A'..='Z' | 'a'..='z' | '0'..='9' | '/' | '!' | '?') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                Token::Error(
                    CellError::parse(&literal)
                        .ok_or_else(|| FormulaError::Parse(format!("Unknown error literal {literal}")))?,
                )
            }
            c if c.is_ascii_digit() || (c == '.' && next.map_or(false, |n| n.is_ascii_digit())) => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if i < chars.len() && matches!(chars[i], 'e' | 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && matches!(chars[j], '+' | '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let literal: String = chars[start..i].iter().collect();
                Token::Number(
                    literal
                        .parse()
                        .map_err(|_| FormulaError::Parse(format!("Bad number {literal}")))?,
                )
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '$' | '.'))
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                classify_word(word, chars.get(i).copied(), &mut i)
            }
            other => {
                return Err(FormulaError::Parse(format!("Unexpected character '{other}'")));
            }
        };
        tokens.push(token);
    }
    tokens.push(Token::Eof);
    Ok(tokens)
}

/// Read a quoted run starting at `start`; a doubled quote is an escape.
/// Returns the content and the index after the closing quote.
fn read_quoted(chars: &[char], start: usize, quote: char) -> FormulaResult<(String, usize)> {
    let mut out = String::new();
    let mut i = start + 1;
    loop {
        match chars.get(i) {
            None => return Err(FormulaError::Parse("Unterminated quoted text".into())),
            Some(&c) if c == quote => {
                if chars.get(i + 1) == Some(&quote) {
                    out.push(quote);
                    i += 2;
                } else {
                    return Ok((out, i + 1));
                }
            }
            Some(&c) => {
                out.push(c);
                i += 1;
            }
        }
    }
}

fn classify_word(word: String, following: Option<char>, i: &mut usize) -> Token {
    match following {
        Some('!') => {
            *i += 1;
            return Token::Sheet(word);
        }
        Some('(') => return Token::Ident(word),
        _ => {}
    }
    if word.eq_ignore_ascii_case("TRUE") {
        Token::Boolean(true)
    } else if word.eq_ignore_ascii_case("FALSE") {
        Token::Boolean(false)
    } else if looks_like_cell(&word) {
        Token::Cell(word)
    } else {
        Token::Ident(word)
    }
}

/// `[$]LETTERS[$]DIGITS` and nothing else
fn looks_like_cell(word: &str) -> bool {
    let rest = word.strip_prefix('$').unwrap_or(word);
    let letters = rest.chars().take_while(|c| c.is_ascii_alphabetic()).count();
    if letters == 0 || letters > 3 {
        return false;
    }
    let rest = &rest[letters..];
    let digits = rest.strip_prefix('$').unwrap_or(rest);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, want: Token) -> FormulaResult<()> {
        let got = self.bump();
        if got == want {
            Ok(())
        } else {
            Err(FormulaError::Parse(format!("Expected {want:?}, found {got:?}")))
        }
    }

    // Precedence, loosest first: comparison, &, + -, * /, ^, unary, :, primary

    fn expression(&mut self) -> FormulaResult<FormulaExpr> {
        self.binary_level(1)
    }

    fn binary_level(&mut self, level: u8) -> FormulaResult<FormulaExpr> {
        if level > BinaryOperator::Power.precedence() {
            return self.unary();
        }
        let mut left = self.binary_level(level + 1)?;
        while let Some(op) = self.peek_binary().filter(|op| op.precedence() == level) {
            self.bump();
            // ^ is right associative
            let right = if op == BinaryOperator::Power {
                self.binary_level(level)?
            } else {
                self.binary_level(level + 1)?
            };
            left = FormulaExpr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn peek_binary(&self) -> Option<BinaryOperator> {
        use BinaryOperator::*;
        Some(match self.peek() {
            Token::Op('+') => Add,
            Token::Op('-') => Subtract,
            Token::Op('*') => Multiply,
            Token::Op('/') => Divide,
            Token::Op('^') => Power,
            Token::Op('&') => Concat,
            Token::Op('=') => Equal,
            Token::Op('<') => LessThan,
            Token::Op('>') => GreaterThan,
            Token::Cmp("<>") => NotEqual,
            Token::Cmp("<=") => LessEqual,
            Token::Cmp(">=") => GreaterEqual,
            _ => return None,
        })
    }

    fn unary(&mut self) -> FormulaResult<FormulaExpr> {
        match self.peek() {
            Token::Op('-') => {
                self.bump();
                Ok(FormulaExpr::UnaryOp {
                    op: UnaryOperator::Negate,
                    operand: Box::new(self.unary()?),
                })
            }
            Token::Op('+') => {
                self.bump();
                self.unary()
            }
            _ => {
                let mut expr = self.range()?;
                while self.peek() == &Token::Op('%') {
                    self.bump();
                    expr = FormulaExpr::UnaryOp {
                        op: UnaryOperator::Percent,
                        operand: Box::new(expr),
                    };
                }
                Ok(expr)
            }
        }
    }

    fn range(&mut self) -> FormulaResult<FormulaExpr> {
        let left = self.primary()?;
        if self.peek() != &Token::Colon {
            return Ok(left);
        }
        self.bump();
        let right = self.primary()?;
        match (left, right) {
            (FormulaExpr::CellRef(a), FormulaExpr::CellRef(b)) => {
                if b.sheet.is_some() && b.sheet != a.sheet {
                    return Err(FormulaError::Parse(
                        "Range ends must be on the same sheet".into(),
                    ));
                }
                Ok(FormulaExpr::RangeRef(RangeReference {
                    sheet: a.sheet,
                    range: CellRange::new(a.address, b.address),
                }))
            }
            (left, right) => Ok(FormulaExpr::BinaryOp {
                op: BinaryOperator::Range,
                left: Box::new(left),
                right: Box::new(right),
            }),
        }
    }

    fn primary(&mut self) -> FormulaResult<FormulaExpr> {
        match self.bump() {
            Token::Number(n) => Ok(FormulaExpr::Number(n)),
            Token::String(s) => Ok(FormulaExpr::String(s)),
            Token::Boolean(b) => Ok(FormulaExpr::Boolean(b)),
            Token::Error(e) => Ok(FormulaExpr::Error(e)),
            Token::LParen => {
                let inner = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::LBrace => self.array(),
            Token::Cell(text) => cell_reference(None, &text),
            Token::Sheet(sheet) => match self.bump() {
                Token::Cell(text) => cell_reference(Some(sheet), &text),
                other => Err(FormulaError::Parse(format!(
                    "Expected a cell after {sheet}!, found {other:?}"
                ))),
            },
            Token::Ident(name) if self.peek() == &Token::LParen => self.call(name),
            Token::Ident(name) => Ok(FormulaExpr::NameRef(name)),
            other => Err(FormulaError::Parse(format!("Unexpected {other:?}"))),
        }
    }

    fn call(&mut self, name: String) -> FormulaResult<FormulaExpr> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if self.peek() != &Token::RParen {
            loop {
                args.push(self.expression()?);
                if self.peek() != &Token::Comma {
                    break;
                }
                self.bump();
            }
        }
        self.expect(Token::RParen)?;
        Ok(FormulaExpr::Function {
            name: name.to_uppercase(),
            args,
        })
    }

    fn array(&mut self) -> FormulaResult<FormulaExpr> {
        let mut rows = vec![Vec::new()];
        if self.peek() == &Token::RBrace {
            self.bump();
            return Ok(FormulaExpr::Array(Vec::new()));
        }
        loop {
            if let Some(row) = rows.last_mut() {
                row.push(self.expression()?);
            }
            match self.bump() {
                Token::Comma => {}
                Token::Semicolon => rows.push(Vec::new()),
                Token::RBrace => return Ok(FormulaExpr::Array(rows)),
                other => {
                    return Err(FormulaError::Parse(format!(
                        "Expected ',' ';' or '}}' in array, found {other:?}"
                    )))
                }
            }
        }
    }
}

fn cell_reference(sheet: Option<String>, text: &str) -> FormulaResult<FormulaExpr> {
    let address = CellAddress::parse(text)
        .map_err(|e| FormulaError::Parse(format!("Invalid cell reference '{text}': {e}")))?;
    Ok(FormulaExpr::CellRef(CellReference { sheet, address }))
}
