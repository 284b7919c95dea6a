//! Test-map parser implementation.

use super::ParseError;
use crate::core::{BinaryOperator, CompileError, Literal};
use crate::model::{
    DynamicMap,
    ElementKind,
    Model,
    NodeId,
    PortElements,
    TensorShape,
};
use crate::nodes::{BinaryOperationNode, ConstantNode, DotProductNode, InputNode, OutputNode, SumNode};
use hashbrown::HashMap;

pub fn parse_map(text: &str) -> Result<DynamicMap, ParseError> {
    Parser::new(text).parse()
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
    model: Model,
    names: HashMap<&'a str, NodeId>,
    map: Option<(&'a str, NodeId, PortElements)>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            model: Model::new(),
            names: HashMap::new(),
            map: None,
        }
    }

    fn parse(mut self) -> Result<DynamicMap, ParseError> {
        self.skip_whitespace();
        while !self.is_eof() {
            let start = self.pos;
            if self.try_keyword("map") {
                self.parse_map_statement(start)?;
            } else {
                self.parse_node_statement(start)?;
            }
            self.skip_whitespace();
        }

        let (input_name, input, output) = self.map.take().ok_or_else(|| self.error("missing 'map' statement"))?;
        let end = self.pos;
        DynamicMap::new(
            self.model,
            vec![(input_name.to_string(), input)],
            vec![("output".to_string(), output)],
        )
        .map_err(|source| Self::model_error_at(self.text, end, source))
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn current_char(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch == ';' {
                // Comment to end of line
                while let Some(ch) = self.current_char() {
                    self.advance();
                    if ch == '\n' {
                        break;
                    }
                }
            } else if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn location(text: &str, pos: usize) -> (usize, usize) {
        let before = &text[..pos.min(text.len())];
        let line = before.matches('\n').count() + 1;
        let column = before.rfind('\n').map(|nl| before.len() - nl).unwrap_or(before.len() + 1);
        (line, column)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let (line, column) = Self::location(self.text, self.pos);
        ParseError::Syntax { line, column, message: message.into() }
    }

    fn model_error_at(text: &str, pos: usize, source: CompileError) -> ParseError {
        let (line, column) = Self::location(text, pos);
        ParseError::Model { line, column, source }
    }

    fn try_read(&mut self, ch: char) -> bool {
        self.skip_whitespace();
        if self.current_char() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> Result<(), ParseError> {
        if !self.try_read(ch) {
            return Err(self.error(format!("expected '{}' but found {:?}", ch, self.current_char())));
        }
        Ok(())
    }

    fn try_keyword(&mut self, keyword: &str) -> bool {
        self.skip_whitespace();
        let rest = &self.text[self.pos..];
        let followed_by_word = rest[keyword.len().min(rest.len())..]
            .chars()
            .next()
            .is_some_and(|ch| ch.is_alphanumeric() || ch == '_');
        if rest.starts_with(keyword) && !followed_by_word {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    fn read_word(&mut self) -> Result<&'a str, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
        if start == self.pos {
            return Err(self.error(format!("expected identifier but found {:?}", self.current_char())));
        }
        Ok(&self.text[start..self.pos])
    }

    fn read_usize(&mut self) -> Result<usize, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        while self.current_char().is_some_and(|ch| ch.is_ascii_digit()) {
            self.advance();
        }
        self.text[start..self.pos]
            .parse()
            .map_err(|_| self.error("expected a non-negative integer"))
    }

    /// A numeric or boolean literal token.
    fn read_literal_token(&mut self) -> Result<&'a str, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        while self
            .current_char()
            .is_some_and(|ch| ch.is_alphanumeric() || matches!(ch, '+' | '-' | '.'))
        {
            self.advance();
        }
        if start == self.pos {
            return Err(self.error(format!("expected a value but found {:?}", self.current_char())));
        }
        Ok(&self.text[start..self.pos])
    }

    fn read_name(&mut self) -> Result<&'a str, ParseError> {
        self.expect('%')?;
        self.read_word()
    }

    fn read_kind(&mut self) -> Result<ElementKind, ParseError> {
        let word = self.read_word()?;
        ElementKind::from_name(word).ok_or_else(|| self.error(format!("unknown element type '{}'", word)))
    }

    fn read_reference(&mut self) -> Result<NodeId, ParseError> {
        let name = self.read_name()?;
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| self.error(format!("unknown node '%{}'", name)))
    }

    /// `%n`, `%n[i]`, `%n[a..b]` or `{operand, ...}`.
    fn parse_operand(&mut self) -> Result<PortElements, ParseError> {
        if self.try_read('{') {
            let mut elements = PortElements::new();
            loop {
                elements.append(&self.parse_operand()?);
                if !self.try_read(',') {
                    break;
                }
            }
            self.expect('}')?;
            return Ok(elements);
        }

        let start = self.pos;
        let node = self.read_reference()?;
        let elements = if self.try_read('[') {
            let first = self.read_usize()?;
            let count = if self.try_read('.') {
                self.expect('.')?;
                let end = self.read_usize()?;
                if end <= first {
                    return Err(self.error(format!("empty range {}..{}", first, end)));
                }
                end - first
            } else {
                1
            };
            self.expect(']')?;
            self.model.output_range(node, 0, first, count)
        } else {
            self.model.full_output(node, 0)
        };
        elements.map_err(|source| Self::model_error_at(self.text, start, source))
    }

    fn parse_shape(&mut self) -> Result<Option<TensorShape>, ParseError> {
        if !self.try_keyword("shape") {
            return Ok(None);
        }
        self.expect('(')?;
        let rows = self.read_usize()?;
        self.expect(',')?;
        let columns = self.read_usize()?;
        self.expect(',')?;
        let channels = self.read_usize()?;
        self.expect(')')?;
        Ok(Some(TensorShape::new(rows, columns, channels)))
    }

    fn parse_literal(&mut self, kind: ElementKind) -> Result<Literal, ParseError> {
        let token = self.read_literal_token()?;
        let literal = match kind {
            ElementKind::Boolean => match token {
                "true" | "1" => Some(Literal::Boolean(true)),
                "false" | "0" => Some(Literal::Boolean(false)),
                _ => None,
            },
            ElementKind::Integer => token.parse().ok().map(Literal::Int32),
            ElementKind::BigInt => token.parse().ok().map(Literal::Int64),
            ElementKind::SmallReal => token.parse().ok().map(Literal::Float),
            ElementKind::Real => token.parse().ok().map(Literal::Double),
        };
        literal.ok_or_else(|| self.error(format!("'{}' is not a {} value", token, kind.name())))
    }

    fn parse_map_statement(&mut self, start: usize) -> Result<(), ParseError> {
        if self.map.is_some() {
            return Err(self.error("duplicate 'map' statement"));
        }
        let input_name = self.read_name()?;
        let input = self
            .names
            .get(input_name)
            .copied()
            .ok_or_else(|| self.error(format!("unknown node '%{}'", input_name)))?;
        self.expect('-')?;
        self.expect('>')?;
        let output = self.parse_operand()?;
        log::trace!("Map statement at {}: %{} -> {} elements", start, input_name, output.size());
        self.map = Some((input_name, input, output));
        Ok(())
    }

    fn parse_node_statement(&mut self, start: usize) -> Result<(), ParseError> {
        let name = self.read_name()?;
        if self.names.contains_key(name) {
            return Err(self.error(format!("node '%{}' is already defined", name)));
        }
        self.expect('=')?;
        let op = self.read_word()?;

        let id = match op {
            "input" => {
                let kind = self.read_kind()?;
                self.expect('[')?;
                let size = self.read_usize()?;
                self.expect(']')?;
                let shape = self.parse_shape()?.unwrap_or_else(|| TensorShape::vector(size));
                if shape.size() != size {
                    return Err(self.error(format!("shape {} does not hold {} elements", shape, size)));
                }
                self.model.add_node(InputNode::new(kind, shape))
            }
            "constant" => {
                let kind = self.read_kind()?;
                self.expect('[')?;
                let mut values = Vec::new();
                if !self.try_read(']') {
                    loop {
                        values.push(self.parse_literal(kind)?);
                        if !self.try_read(',') {
                            break;
                        }
                    }
                    self.expect(']')?;
                }
                ConstantNode::new(kind, values).and_then(|node| self.model.add_node(node))
            }
            "add" | "sub" | "mul" => {
                let operation = match op {
                    "add" => BinaryOperator::Add,
                    "sub" => BinaryOperator::Subtract,
                    _ => BinaryOperator::Multiply,
                };
                let lhs = self.parse_operand()?;
                self.expect(',')?;
                let rhs = self.parse_operand()?;
                BinaryOperationNode::new(operation, lhs, rhs).and_then(|node| self.model.add_node(node))
            }
            "dot" => {
                let lhs = self.parse_operand()?;
                self.expect(',')?;
                let rhs = self.parse_operand()?;
                DotProductNode::new(lhs, rhs).and_then(|node| self.model.add_node(node))
            }
            "sum" => {
                let input = self.parse_operand()?;
                SumNode::new(input).and_then(|node| self.model.add_node(node))
            }
            "output" => {
                let input = self.parse_operand()?;
                let shape = self.parse_shape()?.unwrap_or_else(|| TensorShape::vector(input.size()));
                if shape.size() != input.size() {
                    return Err(self.error(format!("shape {} does not hold {} elements", shape, input.size())));
                }
                ElementKind::try_from(input.port_type())
                    .and_then(|kind| self.model.add_node(OutputNode::new(kind, input, shape)))
            }
            other => return Err(self.error(format!("unknown operation '{}'", other))),
        }
        .map_err(|source| Self::model_error_at(self.text, start, source))?;

        self.names.insert(name, id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeRole, PortType};

    #[test]
    fn test_operands() {
        let map = parse_map(
            "%x = input int[4]\n\
             %o = output {%x[3], %x[0..2]}\n\
             map %x -> %o",
        )
        .unwrap();
        assert_eq!(map.model().size(), 2);
        assert_eq!(map.output_size(), 3);
        assert_eq!(map.output_type(), PortType::Integer);
        assert_eq!(map.model().node(NodeId(1)).unwrap().role(), NodeRole::Output);
    }

    #[test]
    fn test_errors_report_location() {
        let err = parse_map("%x = input real[4]\n%y = frobnicate %x\nmap %x -> %y").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 2, .. }));

        let err = parse_map("%x = input real[4]\n%y = add %x, %x[0..2]\nmap %x -> %y").unwrap_err();
        assert!(matches!(err, ParseError::Model { line: 2, column: 1, .. }));

        let err = parse_map("%x = input real[4]\n%y = sum %z\nmap %x -> %y").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 2, .. }));

        assert!(parse_map("%x = input real[4]").is_err());
        assert!(parse_map("%x = input real[4] shape(3,1,1)\nmap %x -> %x").is_err());
    }

    #[test]
    fn test_comments_and_literals() {
        let map = parse_map(
            "; weights\n\
             %x = input bool[2] ; flags\n\
             %c = constant int64 [-3, 4]\n\
             %f = constant bool [true, 0]\n\
             map %x -> %c",
        )
        .unwrap();
        assert_eq!(map.model().size(), 3);
        assert_eq!(map.output_type(), PortType::BigInt);
        assert!(parse_map("%x = input real[1]\n%c = constant int [1.5]\nmap %x -> %c").is_err());
    }
}
