//! Body/Block/Attribute tree over the token stream
//!
//! A parsed [Document] owns every token of its source file. Attributes and
//! blocks keep their surrounding trivia (indentation, comments, newlines) in
//! dedicated decor fields, so serializing an unmodified tree reproduces the
//! input byte for byte, and replacing an attribute value touches nothing but
//! that attribute's value tokens.
//!
//! Nodes are exclusively owned by their parent and edited through `&mut`
//! access only; there is no sharing between documents or between files.
use crate::token::{decode_quoted, encode_quoted, tokenize, ParseError, Token, TokenKind};
use std::iter::Peekable;
use std::path::{Path, PathBuf};

/// One parsed configuration file.
#[derive(Debug)]
pub struct Document {
    body: Body,
    path: PathBuf,
}

impl Document {
    /// Parses `source`, keeping `path` for diagnostics only.
    pub fn parse(source: &str, path: impl Into<PathBuf>) -> Result<Self, ParseError> {
        let path = path.into();
        let tokens = tokenize(source, &path)?;
        let mut parser = Parser::new(tokens, path);
        let body = parser.parse_body(true)?;
        Ok(Self {
            body,
            path: parser.path,
        })
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Display for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.body, f)
    }
}

/// The attribute-and-nested-block contents of a file root or a [Block].
#[derive(Debug, Default)]
pub struct Body {
    structures: Vec<Structure>,
    /// Trivia between the last structure and the end of the body
    trailing: Vec<Token>,
}

/// A single item of a [Body], in source order.
#[derive(Debug)]
pub enum Structure {
    Attribute(Attribute),
    Block(Block),
}

impl Structure {
    fn for_each_token<F: FnMut(&Token)>(&self, f: &mut F) {
        match self {
            Structure::Attribute(attribute) => attribute.for_each_token(f),
            Structure::Block(block) => block.for_each_token(f),
        }
    }
}

impl Body {
    fn for_each_token<F: FnMut(&Token)>(&self, f: &mut F) {
        for structure in &self.structures {
            structure.for_each_token(f);
        }
        for token in &self.trailing {
            f(token);
        }
    }

    /// Copies the body's full token span, verbatim and in order.
    pub fn to_tokens(&self) -> Vec<Token> {
        let mut tokens = Vec::new();
        self.for_each_token(&mut |token| tokens.push(token.clone()));
        tokens
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.structures.iter().filter_map(|s| match s {
            Structure::Attribute(attribute) => Some(attribute),
            Structure::Block(_) => None,
        })
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.structures.iter().filter_map(|s| match s {
            Structure::Block(block) => Some(block),
            Structure::Attribute(_) => None,
        })
    }

    fn blocks_mut(&mut self) -> impl Iterator<Item = &mut Block> {
        self.structures.iter_mut().filter_map(|s| match s {
            Structure::Block(block) => Some(block),
            Structure::Attribute(_) => None,
        })
    }

    pub fn get_attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes().find(|attribute| attribute.name() == name)
    }

    pub fn get_attribute_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.structures.iter_mut().find_map(|s| match s {
            Structure::Attribute(attribute) if attribute.name() == name => Some(attribute),
            _ => None,
        })
    }

    /// The direct blocks whose type is `type_name` and whose first label is a
    /// quoted literal equal to `label`.
    ///
    /// Single pass over this body only; blocks nested inside other blocks are
    /// not searched. Blocks without a quoted first label never match.
    pub fn matching_blocks_mut<'a>(
        &'a mut self,
        type_name: &'a str,
        label: &'a str,
    ) -> impl Iterator<Item = &'a mut Block> + 'a {
        self.blocks_mut()
            .filter(move |block| block.matches_labeled(type_name, label))
    }

    /// First direct block of the given type, labels ignored.
    pub fn find_block(&self, type_name: &str) -> Option<&Block> {
        self.blocks().find(|block| block.ident() == type_name)
    }

    pub fn find_block_mut(&mut self, type_name: &str) -> Option<&mut Block> {
        self.blocks_mut().find(|block| block.ident() == type_name)
    }

    /// Sets `name` to the quoted literal `value`, replacing the existing
    /// value expression or appending a new attribute at the end of the body.
    pub fn set_string_attribute(&mut self, name: &str, value: &str) {
        match self.get_attribute_mut(name) {
            Some(attribute) => attribute.set_string_value(value),
            None => self.append_raw_attribute(name, quoted_value_tokens(value)),
        }
    }

    pub(crate) fn append_raw_attribute(&mut self, name: &str, value: Vec<Token>) {
        let leading = self.take_leading_for_append();
        self.structures
            .push(Structure::Attribute(Attribute::new_appended(
                leading, name, value,
            )));
    }

    pub(crate) fn append_block(&mut self, mut block: Block) -> &mut Block {
        let mut leading = self.take_leading_for_append();
        leading.append(&mut block.leading);
        block.leading = leading;
        self.structures.push(Structure::Block(block));
        match self.structures.last_mut() {
            Some(Structure::Block(block)) => block,
            _ => unreachable!(),
        }
    }

    /// Trivia to put in front of an appended structure. Moves the body's own
    /// trailing trivia onto the new structure and ensures it starts on a
    /// fresh line.
    fn take_leading_for_append(&mut self) -> Vec<Token> {
        let mut leading = std::mem::take(&mut self.trailing);
        let mut last = None;
        for structure in &self.structures {
            structure.for_each_token(&mut |token| last = Some(token.kind()));
        }
        if let Some(token) = leading.last() {
            last = Some(token.kind());
        }
        if matches!(last, Some(kind) if kind != TokenKind::Newline) {
            leading.push(Token::newline());
        }
        leading
    }
}

impl std::fmt::Display for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut result = Ok(());
        self.for_each_token(&mut |token| {
            if result.is_ok() {
                result = f.write_str(token.text());
            }
        });
        result
    }
}

/// A `name = value` pair and the trivia around it.
#[derive(Debug)]
pub struct Attribute {
    leading: Vec<Token>,
    name: Token,
    pre_eq: Vec<Token>,
    eq: Token,
    post_eq: Vec<Token>,
    /// The value expression; always a syntactically complete token run
    value: Vec<Token>,
    trailing: Vec<Token>,
}

impl Attribute {
    fn new_appended(leading: Vec<Token>, name: &str, value: Vec<Token>) -> Self {
        Self {
            leading,
            name: Token::new(TokenKind::Ident, name),
            pre_eq: vec![Token::space()],
            eq: Token::new(TokenKind::Equals, "="),
            post_eq: vec![Token::space()],
            value,
            trailing: vec![Token::newline()],
        }
    }

    fn for_each_token<F: FnMut(&Token)>(&self, f: &mut F) {
        for token in &self.leading {
            f(token);
        }
        f(&self.name);
        for token in &self.pre_eq {
            f(token);
        }
        f(&self.eq);
        for token in &self.post_eq {
            f(token);
        }
        for token in &self.value {
            f(token);
        }
        for token in &self.trailing {
            f(token);
        }
    }

    pub fn name(&self) -> &str {
        self.name.text()
    }

    pub fn value_tokens(&self) -> &[Token] {
        &self.value
    }

    /// The decoded string value, when the value expression is a plain quoted
    /// literal; anything else (references, numbers, objects) yields `None`.
    pub fn value_as_string(&self) -> Option<String> {
        let significant: Vec<&Token> = self
            .value
            .iter()
            .filter(|token| !token.is_trivia())
            .collect();
        match significant.as_slice() {
            [open, literal, close]
                if open.kind() == TokenKind::Quote
                    && literal.kind() == TokenKind::QuotedLit
                    && close.kind() == TokenKind::Quote =>
            {
                Some(decode_quoted(literal.text()))
            }
            _ => None,
        }
    }

    /// Replaces the value expression with a quoted literal. Decor around the
    /// attribute, trailing comment included, stays untouched.
    pub fn set_string_value(&mut self, value: &str) {
        self.value = quoted_value_tokens(value);
    }
}

fn quoted_value_tokens(value: &str) -> Vec<Token> {
    vec![
        Token::new(TokenKind::Quote, "\""),
        Token::new(TokenKind::QuotedLit, encode_quoted(value)),
        Token::new(TokenKind::Quote, "\""),
    ]
}

/// One block label, in its exact source spelling.
#[derive(Debug)]
pub struct Label {
    pre: Vec<Token>,
    tokens: Vec<Token>,
    value: String,
    quoted: bool,
}

impl Label {
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_quoted(&self) -> bool {
        self.quoted
    }

    fn for_each_token<F: FnMut(&Token)>(&self, f: &mut F) {
        for token in &self.pre {
            f(token);
        }
        for token in &self.tokens {
            f(token);
        }
    }
}

/// A typed, optionally labeled structural unit with its own [Body].
#[derive(Debug)]
pub struct Block {
    leading: Vec<Token>,
    ident: Token,
    labels: Vec<Label>,
    pre_brace: Vec<Token>,
    obrace: Token,
    body: Body,
    cbrace: Token,
    trailing: Vec<Token>,
}

impl Block {
    /// A synthetic `ident {}` block with an empty body, ready for appending.
    pub(crate) fn empty(ident: &str) -> Self {
        Self {
            leading: Vec::new(),
            ident: Token::new(TokenKind::Ident, ident),
            labels: Vec::new(),
            pre_brace: vec![Token::space()],
            obrace: Token::new(TokenKind::OBrace, "{"),
            body: Body {
                structures: Vec::new(),
                trailing: vec![Token::newline()],
            },
            cbrace: Token::new(TokenKind::CBrace, "}"),
            trailing: vec![Token::newline()],
        }
    }

    fn for_each_token<F: FnMut(&Token)>(&self, f: &mut F) {
        for token in &self.leading {
            f(token);
        }
        f(&self.ident);
        for label in &self.labels {
            label.for_each_token(f);
        }
        for token in &self.pre_brace {
            f(token);
        }
        f(&self.obrace);
        self.body.for_each_token(f);
        f(&self.cbrace);
        for token in &self.trailing {
            f(token);
        }
    }

    pub fn ident(&self) -> &str {
        self.ident.text()
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    fn matches_labeled(&self, type_name: &str, label: &str) -> bool {
        self.ident() == type_name
            && matches!(self.labels.first(), Some(l) if l.is_quoted() && l.value() == label)
    }
}

struct Parser {
    tokens: Peekable<std::vec::IntoIter<Token>>,
    line: usize,
    path: PathBuf,
}

impl Parser {
    fn new(tokens: Vec<Token>, path: PathBuf) -> Self {
        Self {
            tokens: tokens.into_iter().peekable(),
            line: 1,
            path,
        }
    }

    fn peek_kind(&mut self) -> Option<TokenKind> {
        self.tokens.peek().map(Token::kind)
    }

    fn bump_token(&mut self) -> Token {
        let token = self.tokens.next().expect("token stream exhausted");
        self.line += token.text().matches('\n').count();
        token
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.peek_kind() == Some(kind) {
            Ok(self.bump_token())
        } else {
            Err(self.syntax_error(format!("expected {what}")))
        }
    }

    fn syntax_error(&self, message: impl Into<String>) -> ParseError {
        ParseError::Syntax {
            path: self.path.clone(),
            line: self.line,
            message: message.into(),
        }
    }

    fn take_trivia(&mut self) -> Vec<Token> {
        let mut trivia = Vec::new();
        while matches!(
            self.peek_kind(),
            Some(TokenKind::Whitespace | TokenKind::Newline | TokenKind::Comment)
        ) {
            trivia.push(self.bump_token());
        }
        trivia
    }

    /// Horizontal trivia after a structure, up to and including the newline
    /// that ends its line.
    fn take_line_trailing(&mut self) -> Vec<Token> {
        let mut trailing = Vec::new();
        while matches!(
            self.peek_kind(),
            Some(TokenKind::Whitespace | TokenKind::Comment)
        ) {
            trailing.push(self.bump_token());
        }
        if self.peek_kind() == Some(TokenKind::Newline) {
            trailing.push(self.bump_token());
        }
        trailing
    }

    fn parse_body(&mut self, root: bool) -> Result<Body, ParseError> {
        let mut structures = Vec::new();
        loop {
            let trivia = self.take_trivia();
            match self.peek_kind() {
                None if root => {
                    return Ok(Body {
                        structures,
                        trailing: trivia,
                    })
                }
                None => return Err(self.syntax_error("unexpected end of input, expected `}`")),
                Some(TokenKind::CBrace) if !root => {
                    // the `}` itself belongs to the enclosing block
                    return Ok(Body {
                        structures,
                        trailing: trivia,
                    });
                }
                Some(TokenKind::Ident) => structures.push(self.parse_structure(trivia)?),
                Some(_) => {
                    let text = self
                        .tokens
                        .peek()
                        .map(|t| t.text().to_string())
                        .unwrap_or_default();
                    return Err(self.syntax_error(format!("unexpected `{text}`")));
                }
            }
        }
    }

    fn parse_structure(&mut self, leading: Vec<Token>) -> Result<Structure, ParseError> {
        let name = self.bump_token();
        let mut mid = Vec::new();
        while self.peek_kind() == Some(TokenKind::Whitespace) {
            mid.push(self.bump_token());
        }
        match self.peek_kind() {
            Some(TokenKind::Equals) => Ok(Structure::Attribute(
                self.parse_attribute(leading, name, mid)?,
            )),
            Some(TokenKind::OBrace | TokenKind::Quote | TokenKind::Ident) => {
                Ok(Structure::Block(self.parse_block(leading, name, mid)?))
            }
            _ => Err(self.syntax_error(format!(
                "expected `=` or a block body after `{}`",
                name.text()
            ))),
        }
    }

    fn parse_attribute(
        &mut self,
        leading: Vec<Token>,
        name: Token,
        pre_eq: Vec<Token>,
    ) -> Result<Attribute, ParseError> {
        let eq = self.bump_token();
        let mut post_eq = Vec::new();
        while self.peek_kind() == Some(TokenKind::Whitespace) {
            post_eq.push(self.bump_token());
        }

        // the value expression runs to the end of the line; brackets keep
        // multi-line objects, lists and calls together
        let mut value = Vec::new();
        let mut depth = 0usize;
        loop {
            let Some(kind) = self.peek_kind() else { break };
            match kind {
                TokenKind::Newline if depth == 0 => break,
                TokenKind::Comment if depth == 0 => {
                    let inline = self
                        .tokens
                        .peek()
                        .map(Token::is_inline_comment)
                        .unwrap_or(false);
                    if !inline {
                        break;
                    }
                    value.push(self.bump_token());
                }
                TokenKind::OBrace | TokenKind::OParen | TokenKind::OBracket => {
                    depth += 1;
                    value.push(self.bump_token());
                }
                TokenKind::CBrace | TokenKind::CParen | TokenKind::CBracket => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                    value.push(self.bump_token());
                }
                _ => value.push(self.bump_token()),
            }
        }

        // trailing trivia clings to the line, not the expression
        let keep = value
            .iter()
            .rposition(|token| !token.is_trivia())
            .map_or(0, |index| index + 1);
        let mut trailing = value.split_off(keep);
        trailing.extend(self.take_line_trailing());

        if value.is_empty() {
            return Err(self.syntax_error(format!(
                "attribute `{}` is missing a value",
                name.text()
            )));
        }

        Ok(Attribute {
            leading,
            name,
            pre_eq,
            eq,
            post_eq,
            value,
            trailing,
        })
    }

    fn parse_block(
        &mut self,
        leading: Vec<Token>,
        ident: Token,
        mut pending: Vec<Token>,
    ) -> Result<Block, ParseError> {
        let mut labels = Vec::new();
        let (pre_brace, obrace) = loop {
            match self.peek_kind() {
                Some(TokenKind::OBrace) => {
                    let obrace = self.bump_token();
                    break (std::mem::take(&mut pending), obrace);
                }
                Some(TokenKind::Whitespace) => pending.push(self.bump_token()),
                Some(TokenKind::Ident) => {
                    let token = self.bump_token();
                    labels.push(Label {
                        pre: std::mem::take(&mut pending),
                        value: token.text().to_string(),
                        tokens: vec![token],
                        quoted: false,
                    });
                }
                Some(TokenKind::Quote) => {
                    let open = self.bump_token();
                    let literal = self.expect(TokenKind::QuotedLit, "quoted block label")?;
                    let close = self.expect(TokenKind::Quote, "closing quote of block label")?;
                    labels.push(Label {
                        pre: std::mem::take(&mut pending),
                        value: decode_quoted(literal.text()),
                        tokens: vec![open, literal, close],
                        quoted: true,
                    });
                }
                _ => return Err(self.syntax_error("expected block label or `{`")),
            }
        };

        let body = self.parse_body(false)?;
        let cbrace = self.expect(TokenKind::CBrace, "`}` closing block body")?;
        let trailing = self.take_line_trailing();

        Ok(Block {
            leading,
            ident,
            labels,
            pre_brace,
            obrace,
            body,
            cbrace,
            trailing,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> Document {
        Document::parse(source, "test.tf").expect("source must parse")
    }

    #[test]
    fn round_trips_unmodified_source() {
        let sources = [
            "",
            "a = 1",
            "a = 1\n",
            "# only a comment\n",
            concat!(
                "# header\n",
                "provider \"aws\" {\n",
                "  region  = var.aws_region # keep\n",
                "\n",
                "  tags = {\n",
                "    Name = \"app-${var.env}\"\n",
                "  }\n",
                "}\n",
                "\n",
                "terraform {\n",
                "  backend \"s3\" {\n",
                "    bucket = \"state\"\n",
                "    key    = \"k\"\n",
                "  }\n",
                "}\n",
            ),
            "terraform { backend \"local\" { path = \"x\" } }\n",
            "list = [\n  1,\n  2,\n]\n",
            "doc = <<EOF\nanything { goes\nEOF\n",
        ];
        for source in sources {
            assert_eq!(parse(source).to_string(), source);
        }
    }

    #[test]
    fn structure_is_recovered() {
        let document = parse("a = 1\nouter \"one\" {\n  inner {}\n  b = 2\n}\n");
        assert_eq!(document.body().attributes().count(), 1);
        assert_eq!(document.body().blocks().count(), 1);

        let outer = document.body().find_block("outer").expect("outer block");
        assert_eq!(outer.labels().len(), 1);
        assert_eq!(outer.labels()[0].value(), "one");
        assert!(outer.labels()[0].is_quoted());
        assert_eq!(outer.body().blocks().count(), 1);
        assert_eq!(outer.body().attributes().count(), 1);
    }

    #[test]
    fn matching_requires_quoted_first_label() {
        let mut document = parse(
            "provider \"aws\" {}\nprovider aws {}\nprovider \"google\" {}\nprovider {}\n",
        );
        let matches = document
            .body_mut()
            .matching_blocks_mut("provider", "aws")
            .count();
        assert_eq!(matches, 1);
    }

    #[test]
    fn find_block_takes_first_match() {
        let document = parse("backend \"s3\" {\n  key = \"a\"\n}\nbackend \"gcs\" {}\n");
        let found = document.body().find_block("backend").expect("a backend");
        assert_eq!(found.labels()[0].value(), "s3");
    }

    #[test]
    fn replacing_a_value_keeps_alignment_and_comments() {
        let mut document = parse("region  = var.aws_region # pinned\n");
        document
            .body_mut()
            .get_attribute_mut("region")
            .expect("region attribute")
            .set_string_value("eu-west-1");
        assert_eq!(
            document.to_string(),
            "region  = \"eu-west-1\" # pinned\n"
        );
    }

    #[test]
    fn appending_lands_on_its_own_line() {
        let mut document = parse("a = 1\n");
        document.body_mut().set_string_attribute("b", "two");
        assert_eq!(document.to_string(), "a = 1\nb = \"two\"\n");

        // no final newline in the source
        let mut document = parse("a = 1");
        document.body_mut().set_string_attribute("b", "two");
        assert_eq!(document.to_string(), "a = 1\nb = \"two\"\n");
    }

    #[test]
    fn value_as_string_decodes_literals_only() {
        let document = parse("s = \"hello\"\nr = var.x\nn = 42\n");
        let body = document.body();
        assert_eq!(
            body.get_attribute("s").and_then(Attribute::value_as_string),
            Some("hello".to_string())
        );
        assert_eq!(
            body.get_attribute("r").and_then(Attribute::value_as_string),
            None
        );
        assert_eq!(
            body.get_attribute("n").and_then(Attribute::value_as_string),
            None
        );
    }

    #[test]
    fn set_string_attribute_is_idempotent() {
        let mut document = parse("region = var.aws_region\n");
        document.body_mut().set_string_attribute("region", "us-east-1");
        let once = document.to_string();
        document.body_mut().set_string_attribute("region", "us-east-1");
        assert_eq!(document.to_string(), once);
    }

    #[test]
    fn to_tokens_is_verbatim() {
        let source = "  # decorated\n  a = [1, 2]\n";
        let document = parse(source);
        let joined: String = document
            .body()
            .to_tokens()
            .iter()
            .map(Token::text)
            .collect();
        assert_eq!(joined, source);
    }

    #[test]
    fn rejects_malformed_input() {
        for source in ["}", "a {", "a = ", "a ="] {
            assert!(
                Document::parse(source, "bad.tf").is_err(),
                "{source:?} must not parse"
            );
        }
    }

    #[test]
    fn syntax_errors_carry_path_and_line() {
        let err = Document::parse("ok = 1\n}\n", "bad.tf").expect_err("must fail");
        assert_eq!(err.to_string(), "bad.tf:2: unexpected `}`");
    }
}
