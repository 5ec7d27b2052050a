//! The statement dialect the in-memory database understands.
//!
//! ```text
//! SELECT * | COUNT(*) | item [AS alias], ... FROM table [WHERE col = operand AND ...]
//! INSERT INTO table [(col, ...)] VALUES (operand, ...)
//! UPDATE table SET col = operand, ... [WHERE ...]
//! DELETE [FROM] table [WHERE ...]
//! BEGIN procedure[(operand, ...)]; END;
//! ```
//!
//! Operands are placeholders (`:name`, `:1`) or literals (numbers, quoted
//! strings, `NULL`). Unquoted identifiers are folded to upper case.

use std::str::FromStr;

use bigdecimal::BigDecimal;

use crate::oci8::native::constants::*;
use crate::oci8::Oci8Value;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    /// Placeholder name without the colon.
    Placeholder(String),
    Literal(Oci8Value),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Item {
    Star,
    Count,
    Column { name: String, label: String },
    Operand { operand: Operand, label: String },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Condition {
    pub(crate) column: String,
    pub(crate) operand: Operand,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Sql {
    Select {
        items: Vec<Item>,
        table: String,
        conditions: Vec<Condition>,
    },
    Insert {
        table: String,
        columns: Option<Vec<String>>,
        values: Vec<Operand>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Operand)>,
        conditions: Vec<Condition>,
    },
    Delete {
        table: String,
        conditions: Vec<Condition>,
    },
    Call {
        procedure: String,
        args: Vec<Operand>,
    },
}

impl Sql {
    pub(crate) fn stmt_type(&self) -> u16 {
        match self {
            Sql::Select { .. } => OCI_STMT_SELECT,
            Sql::Insert { .. } => OCI_STMT_INSERT,
            Sql::Update { .. } => OCI_STMT_UPDATE,
            Sql::Delete { .. } => OCI_STMT_DELETE,
            Sql::Call { .. } => OCI_STMT_BEGIN,
        }
    }

    /// Placeholder names in position order: every occurrence for SQL, each
    /// distinct name once for a block.
    pub(crate) fn placeholders(&self) -> Vec<String> {
        let mut operands: Vec<&Operand> = Vec::new();

        match self {
            Sql::Select {
                items, conditions, ..
            } => {
                operands.extend(items.iter().filter_map(|item| match item {
                    Item::Operand { operand, .. } => Some(operand),
                    _ => None,
                }));
                operands.extend(conditions.iter().map(|c| &c.operand));
            }
            Sql::Insert { values, .. } => operands.extend(values),
            Sql::Update {
                assignments,
                conditions,
                ..
            } => {
                operands.extend(assignments.iter().map(|(_, op)| op));
                operands.extend(conditions.iter().map(|c| &c.operand));
            }
            Sql::Delete { conditions, .. } => operands.extend(conditions.iter().map(|c| &c.operand)),
            Sql::Call { args, .. } => operands.extend(args),
        }

        let distinct = matches!(self, Sql::Call { .. });
        let mut names: Vec<String> = Vec::new();

        for operand in operands {
            if let Operand::Placeholder(name) = operand {
                if !distinct || !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                    names.push(name.clone());
                }
            }
        }

        names
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// Identifier or keyword; `quoted` identifiers keep their case.
    Word { text: String, quoted: bool },
    Number(String),
    Str(String),
    Placeholder(String),
    Symbol(char),
}

fn tokenize(sql: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        match c {
            c if c.is_whitespace() => i += 1,

            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }

            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
            }

            '\'' => {
                let mut text = String::new();
                i += 1;

                loop {
                    match chars.get(i) {
                        None => return Err("unterminated string literal".into()),
                        Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                            text.push('\'');
                            i += 2;
                        }
                        Some('\'') => {
                            i += 1;
                            break;
                        }
                        Some(c) => {
                            text.push(*c);
                            i += 1;
                        }
                    }
                }

                tokens.push(Token::Str(text));
            }

            '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|c| *c == '"')
                    .ok_or("unterminated quoted identifier")?;

                tokens.push(Token::Word {
                    text: chars[i + 1..i + 1 + end].iter().collect(),
                    quoted: true,
                });
                i += end + 2;
            }

            ':' if chars.get(i + 1) == Some(&'=') => {
                return Err("assignments are not supported".into());
            }

            ':' => {
                let len = chars[i + 1..]
                    .iter()
                    .take_while(|c| c.is_alphanumeric() || matches!(c, '_' | '$' | '#'))
                    .count();

                if len == 0 {
                    return Err("empty placeholder name".into());
                }

                tokens.push(Token::Placeholder(chars[i + 1..i + 1 + len].iter().collect()));
                i += len + 1;
            }

            c if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).map_or(false, char::is_ascii_digit)) => {
                let len = chars[i..]
                    .iter()
                    .take_while(|c| c.is_ascii_digit() || **c == '.')
                    .count();

                tokens.push(Token::Number(chars[i..i + len].iter().collect()));
                i += len;
            }

            c if c.is_alphabetic() || c == '_' => {
                let len = chars[i..]
                    .iter()
                    .take_while(|c| c.is_alphanumeric() || matches!(c, '_' | '$' | '#'))
                    .count();

                tokens.push(Token::Word {
                    text: chars[i..i + len].iter().collect(),
                    quoted: false,
                });
                i += len;
            }

            '(' | ')' | ',' | '=' | '*' | ';' | '-' => {
                tokens.push(Token::Symbol(c));
                i += 1;
            }

            other => return Err(format!("unexpected character {:?}", other)),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word { text, quoted: false }) if text.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let found = self.peek_keyword(keyword);
        if found {
            self.pos += 1;
        }
        found
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), String> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(format!("expected {} near {:?}", keyword, self.peek()))
        }
    }

    fn eat_symbol(&mut self, symbol: char) -> bool {
        let found = self.peek() == Some(&Token::Symbol(symbol));
        if found {
            self.pos += 1;
        }
        found
    }

    fn expect_symbol(&mut self, symbol: char) -> Result<(), String> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(format!("expected {:?} near {:?}", symbol, self.peek()))
        }
    }

    fn identifier(&mut self) -> Result<String, String> {
        match self.next() {
            Some(Token::Word { text, quoted: true }) => Ok(text),
            Some(Token::Word { text, quoted: false }) => Ok(text.to_ascii_uppercase()),
            other => Err(format!("expected an identifier, found {:?}", other)),
        }
    }

    fn operand(&mut self) -> Result<Operand, String> {
        let negative = self.eat_symbol('-');

        match self.next() {
            Some(Token::Placeholder(name)) if !negative => Ok(Operand::Placeholder(name)),
            Some(Token::Str(text)) if !negative => Ok(Operand::Literal(Oci8Value::Text(text))),
            Some(Token::Word { text, quoted: false })
                if !negative && text.eq_ignore_ascii_case("NULL") =>
            {
                Ok(Operand::Literal(Oci8Value::Null))
            }
            Some(Token::Number(text)) => {
                let text = if negative { format!("-{}", text) } else { text };
                number_literal(&text).map(Operand::Literal)
            }
            other => Err(format!("expected a value, found {:?}", other)),
        }
    }

    fn is_operand_start(&self) -> bool {
        match self.peek() {
            Some(Token::Placeholder(_) | Token::Str(_) | Token::Number(_) | Token::Symbol('-')) => {
                true
            }
            Some(Token::Word { text, quoted: false }) => text.eq_ignore_ascii_case("NULL"),
            _ => false,
        }
    }

    fn label(&mut self) -> Result<Option<String>, String> {
        if self.eat_keyword("AS") {
            return self.identifier().map(Some);
        }

        match self.peek() {
            Some(Token::Word { text, quoted }) if *quoted || !is_reserved(text) => {
                self.identifier().map(Some)
            }
            _ => Ok(None),
        }
    }

    fn item(&mut self) -> Result<Item, String> {
        if self.eat_symbol('*') {
            return Ok(Item::Star);
        }

        if self.peek_keyword("COUNT") {
            self.pos += 1;
            self.expect_symbol('(')?;
            self.expect_symbol('*')?;
            self.expect_symbol(')')?;
            self.label()?;
            return Ok(Item::Count);
        }

        if self.is_operand_start() {
            let start = self.pos;
            let operand = self.operand()?;
            let text = describe_tokens(&self.tokens[start..self.pos]);
            let label = self.label()?.unwrap_or(text);

            return Ok(Item::Operand { operand, label });
        }

        let name = self.identifier()?;
        let label = self.label()?.unwrap_or_else(|| name.clone());

        Ok(Item::Column { name, label })
    }

    fn conditions(&mut self) -> Result<Vec<Condition>, String> {
        let mut conditions = Vec::new();

        if !self.eat_keyword("WHERE") {
            return Ok(conditions);
        }

        loop {
            let column = self.identifier()?;
            self.expect_symbol('=')?;
            let operand = self.operand()?;
            conditions.push(Condition { column, operand });

            if !self.eat_keyword("AND") {
                return Ok(conditions);
            }
        }
    }

    fn list<T>(&mut self, mut element: impl FnMut(&mut Self) -> Result<T, String>) -> Result<Vec<T>, String> {
        let mut elements = vec![element(self)?];

        while self.eat_symbol(',') {
            elements.push(element(self)?);
        }

        Ok(elements)
    }

    fn statement(&mut self) -> Result<Sql, String> {
        if self.eat_keyword("SELECT") {
            let items = self.list(Self::item)?;
            self.expect_keyword("FROM")?;
            let table = self.identifier()?;
            let conditions = self.conditions()?;

            return Ok(Sql::Select {
                items,
                table,
                conditions,
            });
        }

        if self.eat_keyword("INSERT") {
            self.expect_keyword("INTO")?;
            let table = self.identifier()?;

            let columns = if self.eat_symbol('(') {
                let columns = self.list(Self::identifier)?;
                self.expect_symbol(')')?;
                Some(columns)
            } else {
                None
            };

            self.expect_keyword("VALUES")?;
            self.expect_symbol('(')?;
            let values = self.list(Self::operand)?;
            self.expect_symbol(')')?;

            return Ok(Sql::Insert {
                table,
                columns,
                values,
            });
        }

        if self.eat_keyword("UPDATE") {
            let table = self.identifier()?;
            self.expect_keyword("SET")?;

            let assignments = self.list(|p| {
                let column = p.identifier()?;
                p.expect_symbol('=')?;
                Ok((column, p.operand()?))
            })?;

            let conditions = self.conditions()?;

            return Ok(Sql::Update {
                table,
                assignments,
                conditions,
            });
        }

        if self.eat_keyword("DELETE") {
            self.eat_keyword("FROM");
            let table = self.identifier()?;
            let conditions = self.conditions()?;

            return Ok(Sql::Delete { table, conditions });
        }

        if self.eat_keyword("BEGIN") {
            let procedure = self.identifier()?;

            let args = if self.eat_symbol('(') {
                if self.eat_symbol(')') {
                    Vec::new()
                } else {
                    let args = self.list(Self::operand)?;
                    self.expect_symbol(')')?;
                    args
                }
            } else {
                Vec::new()
            };

            self.expect_symbol(';')?;
            self.expect_keyword("END")?;
            self.eat_symbol(';');

            return Ok(Sql::Call { procedure, args });
        }

        Err(format!("unsupported statement near {:?}", self.peek()))
    }
}

fn is_reserved(word: &str) -> bool {
    ["FROM", "WHERE", "AND", "AS", "SET", "VALUES"]
        .iter()
        .any(|k| word.eq_ignore_ascii_case(k))
}

fn number_literal(text: &str) -> Result<Oci8Value, String> {
    if !text.contains('.') {
        if let Ok(v) = text.parse::<i64>() {
            return Ok(Oci8Value::Integer(v));
        }
    }

    BigDecimal::from_str(text)
        .map(Oci8Value::Number)
        .map_err(|e| format!("invalid number {}: {}", text, e))
}

fn describe_tokens(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|token| match token {
            Token::Word { text, .. } | Token::Number(text) => text.clone(),
            Token::Str(text) => format!("'{}'", text.replace('\'', "''")),
            Token::Placeholder(name) => format!(":{}", name),
            Token::Symbol(c) => c.to_string(),
        })
        .collect()
}

pub(crate) fn parse(sql: &str) -> Result<Sql, String> {
    let mut parser = Parser {
        tokens: tokenize(sql)?,
        pos: 0,
    };

    let statement = parser.statement()?;

    if !parser.at_end() {
        return Err(format!("unexpected trailing input near {:?}", parser.peek()));
    }

    Ok(statement)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_parses_a_filtered_select() {
        let sql = parse("SELECT id, name AS n FROM t WHERE id = :1 AND name = 'it''s'").unwrap();

        assert_eq!(
            sql,
            Sql::Select {
                items: vec![
                    Item::Column {
                        name: "ID".into(),
                        label: "ID".into()
                    },
                    Item::Column {
                        name: "NAME".into(),
                        label: "N".into()
                    },
                ],
                table: "T".into(),
                conditions: vec![
                    Condition {
                        column: "ID".into(),
                        operand: Operand::Placeholder("1".into())
                    },
                    Condition {
                        column: "NAME".into(),
                        operand: Operand::Literal(Oci8Value::Text("it's".into()))
                    },
                ],
            }
        );
        assert_eq!(sql.stmt_type(), OCI_STMT_SELECT);
        assert_eq!(sql.placeholders(), vec!["1".to_owned()]);
    }

    #[test]
    fn it_parses_dml_and_calls() {
        let sql = parse("INSERT INTO t (id, name) VALUES (:id, NULL)").unwrap();
        assert_eq!(sql.stmt_type(), OCI_STMT_INSERT);
        assert_eq!(sql.placeholders(), vec!["id".to_owned()]);

        let sql = parse("UPDATE t SET name = :2 WHERE id = :1").unwrap();
        assert_eq!(sql.placeholders(), vec!["2".to_owned(), "1".to_owned()]);

        let sql = parse("DELETE FROM t WHERE id = :x AND name = :x").unwrap();
        assert_eq!(sql.placeholders(), vec!["x".to_owned(), "x".to_owned()]);

        let sql = parse("BEGIN add_one(:x, -1.5); END;").unwrap();
        assert_eq!(
            sql,
            Sql::Call {
                procedure: "ADD_ONE".into(),
                args: vec![
                    Operand::Placeholder("x".into()),
                    Operand::Literal(Oci8Value::Number(BigDecimal::from_str("-1.5").unwrap())),
                ],
            }
        );
    }

    #[test]
    fn it_labels_selected_values() {
        let sql = parse("SELECT :1, 42 AS answer, COUNT(*) FROM dual").unwrap();

        match sql {
            Sql::Select { items, .. } => {
                assert!(matches!(&items[0], Item::Operand { label, .. } if label == ":1"));
                assert!(matches!(&items[1], Item::Operand { label, .. } if label == "ANSWER"));
                assert_eq!(items[2], Item::Count);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn it_rejects_unsupported_statements() {
        assert!(parse("CREATE TABLE t (id NUMBER)").is_err());
        assert!(parse("SELECT * FROM t ORDER BY id").is_err());
    }
}
