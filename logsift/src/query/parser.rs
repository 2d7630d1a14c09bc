use tracing::debug;

use super::{Condition, FilterNode, Logic, Operator};
use crate::errors::QueryError;
use crate::value::Value;

/// Compiles query strings into [`FilterNode`] trees.
///
/// The top level is always an AND node. Comma-separated groups holding a
/// single term become its conditions; groups with several `|` terms become
/// OR children.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryParser;

impl QueryParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, query: &str) -> Result<FilterNode, QueryError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        let mut cursor = Cursor::new(query, 0);
        let tree = cursor.parse_and_groups()?;

        cursor.skip_whitespace();
        if !cursor.at_end() {
            return Err(QueryError::InvalidSyntax {
                position: cursor.position(),
            });
        }

        debug!(
            "Parsed query '{}' into {} conditions and {} groups",
            query,
            tree.conditions.len(),
            tree.children.len()
        );
        Ok(tree)
    }
}

/// Byte cursor over one query (or one parenthesized slice of it)
struct Cursor<'a> {
    input: &'a str,
    pos: usize,
    /// Offset of `input` inside the full query, for error positions
    base: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str, base: usize) -> Self {
        Self {
            input,
            pos: 0,
            base,
        }
    }

    fn position(&self) -> usize {
        self.base + self.pos
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn rest(&self) -> &'a str {
        let input = self.input;
        &input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    /// Consumes `c` if it is the next non-blank character
    fn eat(&mut self, c: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn parse_and_groups(&mut self) -> Result<FilterNode, QueryError> {
        let mut tree = FilterNode::new(Logic::And);
        loop {
            let mut terms = self.parse_or_terms()?;
            if terms.len() == 1 {
                tree.add_condition(terms.remove(0));
            } else {
                tree.add_child(FilterNode {
                    conditions: terms,
                    logic: Logic::Or,
                    children: Vec::new(),
                });
            }

            if !self.eat(',') {
                return Ok(tree);
            }
        }
    }

    fn parse_or_terms(&mut self) -> Result<Vec<Condition>, QueryError> {
        let mut terms = vec![self.parse_term()?];
        while self.eat('|') {
            terms.push(self.parse_term()?);
        }
        Ok(terms)
    }

    fn parse_term(&mut self) -> Result<Condition, QueryError> {
        self.skip_whitespace();
        if self.at_end() {
            return Err(QueryError::InvalidSyntax {
                position: self.position(),
            });
        }

        if self.peek() != Some('(') {
            return self.parse_condition();
        }

        let open = self.position();
        self.pos += 1;
        let start = self.pos;
        let mut depth = 1usize;
        let bytes = self.input.as_bytes();
        while self.pos < bytes.len() && depth > 0 {
            match bytes[self.pos] {
                b'(' => depth += 1,
                b')' => depth -= 1,
                _ => {}
            }
            self.pos += 1;
        }
        if depth != 0 {
            return Err(QueryError::UnclosedGroup { position: open });
        }

        // Only the first term of the group is read
        let inner = &self.input[start..self.pos - 1];
        Cursor::new(inner, self.base + start).parse_term()
    }

    fn parse_condition(&mut self) -> Result<Condition, QueryError> {
        self.skip_whitespace();

        let field_start = self.position();
        let field = self.parse_field();
        if field.is_empty() {
            return Err(QueryError::MissingField {
                position: field_start,
            });
        }

        if self.eat('?') {
            return Ok(Condition::exists(field));
        }

        let operator = self.parse_operator()?;
        let value = self.parse_value();
        Ok(Condition::new(field, operator, Value::infer(value)))
    }

    fn parse_field(&mut self) -> &'a str {
        let input = self.input;
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || matches!(c, '_' | '.' | '[' | ']') {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        &input[start..self.pos]
    }

    fn parse_operator(&mut self) -> Result<Operator, QueryError> {
        self.skip_whitespace();

        const TWO_CHAR: [(&str, Operator); 5] = [
            ("!=", Operator::Ne),
            (">=", Operator::Gte),
            ("<=", Operator::Lte),
            ("~=", Operator::Regex),
            ("*=", Operator::Contains),
        ];
        for (symbol, op) in TWO_CHAR {
            if self.rest().starts_with(symbol) {
                self.pos += 2;
                return Ok(op);
            }
        }

        let op = match self.peek() {
            Some(':') | Some('=') => Operator::Eq,
            Some('>') => Operator::Gt,
            Some('<') => Operator::Lt,
            _ => {
                return Err(QueryError::InvalidOperator {
                    position: self.position(),
                })
            }
        };
        self.pos += 1;
        Ok(op)
    }

    /// Reads a quoted or bare value; an absent value is the empty string
    fn parse_value(&mut self) -> &'a str {
        self.skip_whitespace();
        let input = self.input;
        let bytes = input.as_bytes();

        match self.peek() {
            None => "",
            Some(quote @ ('"' | '\'')) => {
                let quote = quote as u8;
                self.pos += 1;
                let start = self.pos;
                while self.pos < bytes.len() && bytes[self.pos] != quote {
                    if bytes[self.pos] == b'\\' && self.pos + 1 < bytes.len() {
                        self.pos += 1;
                    }
                    self.pos += 1;
                }
                let end = self.pos.min(bytes.len());
                let value = &input[start..end];
                if self.pos < bytes.len() {
                    self.pos += 1;
                }
                value
            }
            Some(_) => {
                let start = self.pos;
                while self.pos < bytes.len()
                    && !matches!(bytes[self.pos], b',' | b'|' | b')')
                    && !bytes[self.pos].is_ascii_whitespace()
                {
                    self.pos += 1;
                }
                &input[start..self.pos]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(query: &str) -> FilterNode {
        QueryParser::new().parse(query).unwrap()
    }

    #[test]
    fn test_operators() {
        let cases = [
            ("level:error", Operator::Eq),
            ("level=error", Operator::Eq),
            ("level!=error", Operator::Ne),
            ("status>400", Operator::Gt),
            ("status>=400", Operator::Gte),
            ("status<500", Operator::Lt),
            ("status<=500", Operator::Lte),
            ("message~=timeout.*retry", Operator::Regex),
            ("message*=timeout", Operator::Contains),
            ("error?", Operator::Exists),
        ];
        for (query, op) in cases {
            let tree = parse(query);
            assert_eq!(tree.logic, Logic::And, "{}", query);
            assert_eq!(tree.conditions.len(), 1, "{}", query);
            assert_eq!(tree.conditions[0].operator, op, "{}", query);
        }
    }

    #[test]
    fn test_comma_is_and() {
        let tree = parse("level:error,status:500");
        assert_eq!(tree.logic, Logic::And);
        assert_eq!(tree.conditions.len(), 2);
        assert!(tree.children.is_empty());
    }

    #[test]
    fn test_pipe_is_or_child() {
        let tree = parse("level:error|level:warn");
        assert!(tree.conditions.is_empty());
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].logic, Logic::Or);
        assert_eq!(tree.children[0].conditions.len(), 2);
    }

    #[test]
    fn test_mixed_and_or() {
        let tree = parse("level:error|level:warn,status>=400");
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.conditions.len(), 1);
        assert_eq!(tree.conditions[0].field, "status");
    }

    #[test]
    fn test_nested_field_paths() {
        let tree = parse("user.profile.role:admin");
        assert_eq!(tree.conditions[0].field, "user.profile.role");
        let tree = parse("items[0].sku:a1");
        assert_eq!(tree.conditions[0].field, "items[0].sku");
    }

    #[test]
    fn test_value_inference() {
        assert_eq!(parse("status:500").conditions[0].value, Value::Int(500));
        assert_eq!(parse("ratio:0.5").conditions[0].value, Value::Float(0.5));
        assert_eq!(parse("active:true").conditions[0].value, Value::Bool(true));
        assert_eq!(parse("active:FALSE").conditions[0].value, Value::Bool(false));
        assert_eq!(parse("trace:nil").conditions[0].value, Value::Null);
        assert_eq!(parse("level:error").conditions[0].value, Value::from("error"));
        // Quoted literals are typed too
        assert_eq!(parse(r#"status:"500""#).conditions[0].value, Value::Int(500));
    }

    #[test]
    fn test_quoted_values() {
        assert_eq!(
            parse(r#"message:"hello world""#).conditions[0].value,
            Value::from("hello world")
        );
        assert_eq!(
            parse("message:'hello world'").conditions[0].value,
            Value::from("hello world")
        );
        assert_eq!(
            parse(r#"message:"a, b | c""#).conditions[0].value,
            Value::from("a, b | c")
        );
        assert_eq!(
            parse(r#"message:"say \"hi\"""#).conditions[0].value,
            Value::from(r#"say \"hi\""#)
        );
    }

    #[test]
    fn test_whitespace_tolerance() {
        let tree = parse("  level : error , status >= 500 ");
        assert_eq!(tree.conditions.len(), 2);
        assert_eq!(tree.conditions[0].value, Value::from("error"));
        assert_eq!(tree.conditions[1].operator, Operator::Gte);
    }

    #[test]
    fn test_missing_value_is_empty_string() {
        assert_eq!(parse("level:").conditions[0].value, Value::from(""));
    }

    #[test]
    fn test_parenthesized_group_keeps_first_term() {
        let tree = parse("(level:error|level:warn),status>=400");
        assert_eq!(tree.conditions.len(), 2);
        assert!(tree.children.is_empty());
        assert_eq!(tree.conditions[0].value, Value::from("error"));
        assert_eq!(tree.conditions[1].field, "status");

        let tree = parse("((level:debug))");
        assert_eq!(tree.conditions[0].value, Value::from("debug"));
    }

    #[test]
    fn test_empty_queries() {
        let parser = QueryParser::new();
        assert_eq!(parser.parse(""), Err(QueryError::EmptyQuery));
        assert_eq!(parser.parse("   \t "), Err(QueryError::EmptyQuery));
    }

    #[test]
    fn test_errors() {
        let parser = QueryParser::new();
        assert!(matches!(
            parser.parse(":error"),
            Err(QueryError::MissingField { position: 0 })
        ));
        assert!(matches!(
            parser.parse("level"),
            Err(QueryError::InvalidOperator { position: 5 })
        ));
        assert!(matches!(
            parser.parse("level#error"),
            Err(QueryError::InvalidOperator { .. })
        ));
        assert!(matches!(
            parser.parse("(level:error"),
            Err(QueryError::UnclosedGroup { position: 0 })
        ));
        assert!(matches!(
            parser.parse("level:error,"),
            Err(QueryError::InvalidSyntax { .. })
        ));
        assert!(matches!(
            parser.parse("level:error|"),
            Err(QueryError::InvalidSyntax { .. })
        ));
        assert!(matches!(
            parser.parse("()"),
            Err(QueryError::InvalidSyntax { .. })
        ));
        assert!(matches!(
            parser.parse("level:error status:500"),
            Err(QueryError::InvalidSyntax { position: 12 })
        ));
    }

    #[test]
    fn test_error_position_inside_group() {
        let parser = QueryParser::new();
        assert!(matches!(
            parser.parse("a:1,(b#2)"),
            Err(QueryError::InvalidOperator { position: 6 })
        ));
    }
}
