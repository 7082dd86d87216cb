// SQL parser - converts tokens to statements, queries and expressions

use super::ast::*;
use super::lexer::Lexer;
use super::token::{SpannedToken, Token};
use crate::access::{DataType, Value};
use crate::constraint::{MatchType, ReferentialAction};
use crate::error::{SqlError, SqlResult};
use crate::executor::InsertSource;
use crate::expression::{
    BinaryOperator, Expression, Function, Quantifier, SetFunction, SubqueryKind, UnaryOperator,
};
use crate::query::{
    CteDefinition, QueryBody, QueryExpression, QuerySpecification, SelectItem, SetOperation,
    SetOperator, SortSpec, TableRef, WithClause,
};
use crate::range::JoinKind;

pub struct Parser {
    sql: String,
    tokens: Vec<SpannedToken>,
    position: usize,
    parameter_count: usize,
}

impl Parser {
    pub fn new(sql: &str) -> SqlResult<Self> {
        let tokens = Lexer::new(sql).tokenize()?;
        Ok(Parser {
            sql: sql.to_string(),
            tokens,
            position: 0,
            parameter_count: 0,
        })
    }

    /// Number of `?` markers consumed so far
    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    /// Parse one SQL statement, optionally followed by `;`
    pub fn parse(&mut self) -> SqlResult<Statement> {
        let statement = match self.current_token() {
            Token::Select | Token::With | Token::LeftParen => {
                Statement::Query(self.parse_query_expression()?)
            }
            Token::Insert => self.parse_insert()?,
            Token::Update => self.parse_update()?,
            Token::Delete => self.parse_delete()?,
            Token::Create => self.parse_create()?,
            Token::Alter => self.parse_alter()?,
            Token::Drop => self.parse_drop()?,
            _ => return Err(self.error("expected SQL statement")),
        };
        self.consume_token(&Token::Semicolon);
        self.expect_end()?;
        Ok(statement)
    }

    /// Parse a standalone value expression
    pub fn parse_standalone_expression(&mut self) -> SqlResult<Expression> {
        let expr = self.parse_expression()?;
        self.expect_end()?;
        Ok(expr)
    }

    fn expect_end(&self) -> SqlResult<()> {
        if self.match_token(&Token::Eof) {
            Ok(())
        } else {
            Err(self.error("unexpected trailing input"))
        }
    }

    // Queries

    /// `[WITH ...] body [ORDER BY ...] [LIMIT n] [OFFSET n]`
    fn parse_query_expression(&mut self) -> SqlResult<QueryExpression> {
        let start = self.current_start();
        let with = if self.match_token(&Token::With) {
            Some(self.parse_with_clause()?)
        } else {
            None
        };

        let mut query = self.parse_union_term()?;

        if let Some(with) = with {
            if query.with.is_some() {
                return Err(self.error("nested WITH clause"));
            }
            query.with = Some(with);
        }

        if self.consume_token(&Token::Order) {
            self.expect_token(Token::By)?;
            if !query.order_by.is_empty() {
                return Err(self.error("duplicate ORDER BY"));
            }
            query.order_by = self.parse_order_by_items()?;
        }

        if self.consume_token(&Token::Limit) {
            if query.limit.is_some() {
                return Err(self.error("duplicate LIMIT"));
            }
            query.limit = Some(self.parse_expression()?);
        }

        if self.consume_token(&Token::Offset) {
            if query.offset.is_some() {
                return Err(self.error("duplicate OFFSET"));
            }
            query.offset = Some(self.parse_expression()?);
        }

        let end = self.previous_end();
        Ok(query.with_sql(self.source(start, end)))
    }

    /// `WITH [RECURSIVE] name [(columns)] AS (query) {, ...}`
    fn parse_with_clause(&mut self) -> SqlResult<WithClause> {
        self.expect_token(Token::With)?;
        let recursive = self.consume_word("recursive");
        let mut ctes = Vec::new();
        loop {
            let name = self.expect_identifier()?;
            let columns = if self.match_token(&Token::LeftParen) {
                Some(self.parse_parenthesized_identifiers()?)
            } else {
                None
            };
            self.expect_token(Token::As)?;
            self.expect_token(Token::LeftParen)?;
            let query = self.parse_query_expression()?;
            self.expect_token(Token::RightParen)?;
            ctes.push(CteDefinition {
                name,
                columns,
                query,
            });
            if !self.consume_token(&Token::Comma) {
                break;
            }
        }
        Ok(WithClause { recursive, ctes })
    }

    /// UNION and EXCEPT, left associative over INTERSECT terms
    fn parse_union_term(&mut self) -> SqlResult<QueryExpression> {
        let start = self.current_start();
        let mut left = self.parse_intersect_term()?;
        loop {
            let operator = match self.current_token() {
                Token::Union => SetOperator::Union,
                Token::Except => SetOperator::Except,
                _ => break,
            };
            self.advance();
            left = self.parse_set_operation_tail(operator, left, start, false)?;
        }
        Ok(left)
    }

    fn parse_intersect_term(&mut self) -> SqlResult<QueryExpression> {
        let start = self.current_start();
        let mut left = self.parse_query_primary()?;
        while self.consume_token(&Token::Intersect) {
            left = self.parse_set_operation_tail(SetOperator::Intersect, left, start, true)?;
        }
        Ok(left)
    }

    /// Everything after the set operator keyword
    fn parse_set_operation_tail(
        &mut self,
        operator: SetOperator,
        left: QueryExpression,
        start: usize,
        intersect_operand: bool,
    ) -> SqlResult<QueryExpression> {
        let all = if self.consume_token(&Token::All) {
            true
        } else {
            self.consume_token(&Token::Distinct);
            false
        };
        let corresponding = if self.consume_word("corresponding") {
            if self.consume_token(&Token::By) {
                Some(self.parse_parenthesized_identifiers()?)
            } else {
                Some(Vec::new())
            }
        } else {
            None
        };
        let right = if intersect_operand {
            self.parse_query_primary()?
        } else {
            self.parse_intersect_term()?
        };

        let mut operation = SetOperation::new(operator, all, left, right);
        operation.corresponding = corresponding;
        let end = self.previous_end();
        Ok(QueryExpression::new(QueryBody::SetOperation(Box::new(operation)))
            .with_sql(self.source(start, end)))
    }

    /// A SELECT or a parenthesized query
    fn parse_query_primary(&mut self) -> SqlResult<QueryExpression> {
        match self.current_token() {
            Token::Select => {
                let start = self.current_start();
                let spec = self.parse_query_specification()?;
                let end = self.previous_end();
                Ok(QueryExpression::from_specification(spec).with_sql(self.source(start, end)))
            }
            Token::LeftParen => {
                self.advance();
                let query = self.parse_query_expression()?;
                self.expect_token(Token::RightParen)?;
                Ok(query)
            }
            _ => Err(self.error("expected SELECT")),
        }
    }

    fn parse_query_specification(&mut self) -> SqlResult<QuerySpecification> {
        self.expect_token(Token::Select)?;

        let distinct = if self.consume_token(&Token::Distinct) {
            true
        } else {
            self.consume_token(&Token::All);
            false
        };

        let mut spec = QuerySpecification::new(self.parse_select_items()?);
        spec.distinct = distinct;

        if self.consume_token(&Token::From) {
            loop {
                spec.from.push(self.parse_table_reference()?);
                if !self.consume_token(&Token::Comma) {
                    break;
                }
            }
        }

        if self.consume_token(&Token::Where) {
            spec.where_clause = Some(self.parse_expression()?);
        }

        if self.consume_token(&Token::Group) {
            self.expect_token(Token::By)?;
            spec.group_by = self.parse_expression_list()?;
        }

        if self.consume_token(&Token::Having) {
            spec.having = Some(self.parse_expression()?);
        }

        Ok(spec)
    }

    /// Parse SELECT items
    fn parse_select_items(&mut self) -> SqlResult<Vec<SelectItem>> {
        let mut items = vec![];

        loop {
            if self.consume_token(&Token::Star) {
                items.push(SelectItem::Wildcard(None));
            } else if self.peek_token(1) == &Token::Dot && self.peek_token(2) == &Token::Star {
                let qualifier = self.expect_identifier()?;
                self.advance();
                self.advance();
                items.push(SelectItem::Wildcard(Some(qualifier)));
            } else {
                let mut expr = self.parse_expression()?;
                if let Some(alias) = self.parse_optional_alias()? {
                    expr = expr.with_alias(alias);
                }
                items.push(SelectItem::Expr(expr));
            }

            if !self.consume_token(&Token::Comma) {
                break;
            }
        }

        Ok(items)
    }

    /// `AS name` or a bare identifier
    fn parse_optional_alias(&mut self) -> SqlResult<Option<String>> {
        if self.consume_token(&Token::As) {
            return Ok(Some(self.expect_identifier()?));
        }
        if let Token::Identifier(alias) = self.current_token() {
            let alias = alias.clone();
            self.advance();
            return Ok(Some(alias));
        }
        Ok(None)
    }

    /// A table primary followed by any number of joins
    fn parse_table_reference(&mut self) -> SqlResult<TableRef> {
        let mut left = self.parse_table_primary()?;

        while let Some(kind) = self.parse_join_kind()? {
            let right = self.parse_table_primary()?;
            let condition = if kind == JoinKind::Cross {
                None
            } else {
                self.expect_token(Token::On)?;
                Some(self.parse_expression()?)
            };
            left = TableRef::Join {
                kind,
                left: Box::new(left),
                right: Box::new(right),
                condition,
            };
        }

        Ok(left)
    }

    fn parse_join_kind(&mut self) -> SqlResult<Option<JoinKind>> {
        let kind = match self.current_token() {
            Token::Join => JoinKind::Inner,
            Token::Inner => {
                self.advance();
                JoinKind::Inner
            }
            Token::Left => {
                self.advance();
                self.consume_token(&Token::Outer);
                JoinKind::Left
            }
            Token::Right => {
                self.advance();
                self.consume_token(&Token::Outer);
                JoinKind::Right
            }
            Token::Cross => {
                self.advance();
                JoinKind::Cross
            }
            _ => return Ok(None),
        };
        self.expect_token(Token::Join)?;
        Ok(Some(kind))
    }

    fn parse_table_primary(&mut self) -> SqlResult<TableRef> {
        if self.match_token(&Token::LeftParen) {
            if matches!(
                self.peek_token(1),
                Token::Select | Token::With | Token::LeftParen
            ) {
                self.advance();
                let query = self.parse_query_expression()?;
                self.expect_token(Token::RightParen)?;
                let alias = self
                    .parse_optional_alias()?
                    .ok_or_else(|| self.error("derived table requires an alias"))?;
                let columns = if self.match_token(&Token::LeftParen) {
                    Some(self.parse_parenthesized_identifiers()?)
                } else {
                    None
                };
                return Ok(TableRef::Derived {
                    query: Box::new(query),
                    alias,
                    columns,
                });
            }
            self.advance();
            let table = self.parse_table_reference()?;
            self.expect_token(Token::RightParen)?;
            return Ok(table);
        }

        let name = self.expect_identifier()?;
        let alias = self.parse_optional_alias()?;
        Ok(TableRef::Named { name, alias })
    }

    /// Parse ORDER BY items
    fn parse_order_by_items(&mut self) -> SqlResult<Vec<SortSpec>> {
        let mut items = vec![];

        loop {
            let expr = self.parse_expression()?;
            let descending = if self.consume_token(&Token::Desc) {
                true
            } else {
                self.consume_token(&Token::Asc);
                false
            };
            items.push(SortSpec::new(expr, descending));

            if !self.consume_token(&Token::Comma) {
                break;
            }
        }

        Ok(items)
    }

    // Data change statements

    /// Parse INSERT statement
    fn parse_insert(&mut self) -> SqlResult<Statement> {
        self.expect_token(Token::Insert)?;
        self.expect_token(Token::Into)?;
        let table_name = self.expect_identifier()?;

        let columns = if self.match_token(&Token::LeftParen)
            && !matches!(self.peek_token(1), Token::Select | Token::With)
        {
            Some(self.parse_parenthesized_identifiers()?)
        } else {
            None
        };

        let source = if self.consume_token(&Token::Values) {
            let mut rows = vec![];
            loop {
                self.expect_token(Token::LeftParen)?;
                let mut row = vec![];
                loop {
                    if self.consume_token(&Token::Default) {
                        row.push(None);
                    } else {
                        row.push(Some(self.parse_expression()?));
                    }
                    if !self.consume_token(&Token::Comma) {
                        break;
                    }
                }
                self.expect_token(Token::RightParen)?;
                rows.push(row);
                if !self.consume_token(&Token::Comma) {
                    break;
                }
            }
            InsertSource::Values(rows)
        } else if self.consume_token(&Token::Default) {
            self.expect_token(Token::Values)?;
            InsertSource::DefaultValues
        } else {
            InsertSource::Query(Box::new(self.parse_query_expression()?))
        };

        Ok(Statement::Insert(InsertStatement {
            table_name,
            columns,
            source,
        }))
    }

    /// Parse UPDATE statement
    fn parse_update(&mut self) -> SqlResult<Statement> {
        self.expect_token(Token::Update)?;
        let table_name = self.expect_identifier()?;
        let alias = self.parse_optional_alias()?;
        self.expect_token(Token::Set)?;

        let mut assignments = vec![];
        loop {
            let mut column = self.expect_identifier()?;
            if self.consume_token(&Token::Dot) {
                column = self.expect_identifier()?;
            }
            self.expect_token(Token::Equal)?;
            let value = if self.consume_token(&Token::Default) {
                None
            } else {
                Some(self.parse_expression()?)
            };
            assignments.push((column, value));
            if !self.consume_token(&Token::Comma) {
                break;
            }
        }

        let where_clause = if self.consume_token(&Token::Where) {
            Some(self.parse_expression()?)
        } else {
            None
        };

        Ok(Statement::Update(UpdateStatement {
            table_name,
            alias,
            assignments,
            where_clause,
        }))
    }

    /// Parse DELETE statement
    fn parse_delete(&mut self) -> SqlResult<Statement> {
        self.expect_token(Token::Delete)?;
        self.expect_token(Token::From)?;
        let table_name = self.expect_identifier()?;
        let alias = self.parse_optional_alias()?;

        let where_clause = if self.consume_token(&Token::Where) {
            Some(self.parse_expression()?)
        } else {
            None
        };

        Ok(Statement::Delete(DeleteStatement {
            table_name,
            alias,
            where_clause,
        }))
    }

    // Schema statements

    fn parse_create(&mut self) -> SqlResult<Statement> {
        self.expect_token(Token::Create)?;
        match self.current_token() {
            Token::Table => self.parse_create_table(),
            Token::Unique | Token::Index => self.parse_create_index(),
            _ => Err(self.error("expected TABLE or INDEX after CREATE")),
        }
    }

    /// Parse CREATE TABLE statement
    fn parse_create_table(&mut self) -> SqlResult<Statement> {
        self.expect_token(Token::Table)?;
        let table_name = self.expect_identifier()?;
        self.expect_token(Token::LeftParen)?;

        let mut columns = vec![];
        let mut constraints = vec![];

        loop {
            if self.is_table_constraint() {
                constraints.push(self.parse_table_constraint()?);
            } else {
                let (column, column_constraints) = self.parse_column_definition()?;
                columns.push(column);
                constraints.extend(column_constraints);
            }

            if !self.consume_token(&Token::Comma) {
                break;
            }
        }

        self.expect_token(Token::RightParen)?;

        Ok(Statement::CreateTable(CreateTableStatement {
            table_name,
            columns,
            constraints,
        }))
    }

    /// Check if current token starts a table constraint
    fn is_table_constraint(&self) -> bool {
        matches!(
            self.current_token(),
            Token::Constraint | Token::Primary | Token::Foreign | Token::Unique | Token::Check
        )
    }

    /// Column definition plus the constraints written on the column,
    /// turned into table constraints over that column
    fn parse_column_definition(&mut self) -> SqlResult<(ColumnDefinition, Vec<TableConstraint>)> {
        let name = self.expect_identifier()?;
        let data_type = self.parse_data_type()?;
        let mut column = ColumnDefinition {
            name: name.clone(),
            data_type,
            not_null: false,
            default: None,
            identity: None,
        };
        let mut constraints = vec![];

        loop {
            if self.consume_token(&Token::Default) {
                column.default = Some(self.parse_expression()?);
                continue;
            }
            if self.consume_word("generated") {
                let always = if self.consume_word("always") {
                    true
                } else {
                    self.expect_token(Token::By)?;
                    self.expect_token(Token::Default)?;
                    false
                };
                self.expect_token(Token::As)?;
                self.expect_word("identity")?;
                column.identity = Some(always);
                continue;
            }
            if self.consume_word("identity") {
                column.identity = Some(false);
                continue;
            }
            if self.consume_token(&Token::Null) {
                continue;
            }
            if self.match_token(&Token::Not) && self.peek_token(1) == &Token::Null {
                self.advance();
                self.advance();
                column.not_null = true;
                continue;
            }

            let constraint_name = if self.consume_token(&Token::Constraint) {
                Some(self.expect_identifier()?)
            } else {
                None
            };
            let kind = match self.current_token() {
                Token::Primary => {
                    self.advance();
                    self.expect_word("key")?;
                    ConstraintKind::PrimaryKey(vec![name.clone()])
                }
                Token::Unique => {
                    self.advance();
                    ConstraintKind::Unique(vec![name.clone()])
                }
                Token::Check => ConstraintKind::Check(self.parse_check_condition()?),
                Token::References => ConstraintKind::ForeignKey {
                    columns: vec![name.clone()],
                    reference: self.parse_references()?,
                },
                Token::Not if self.peek_token(1) == &Token::Null => {
                    self.advance();
                    self.advance();
                    column.not_null = true;
                    continue;
                }
                _ if constraint_name.is_some() => {
                    return Err(self.error("expected constraint after CONSTRAINT name"))
                }
                _ => break,
            };
            constraints.push(TableConstraint {
                name: constraint_name,
                kind,
            });
        }

        Ok((column, constraints))
    }

    /// Parse a data type, including `ROW(...)` and `ARRAY` suffixes
    fn parse_data_type(&mut self) -> SqlResult<DataType> {
        let name = self.expect_identifier()?;
        let mut data_type = match name.as_str() {
            "int" | "integer" | "smallint" | "tinyint" => DataType::Int32,
            "bigint" => DataType::BigInt,
            "double" => {
                self.consume_word("precision");
                DataType::Double
            }
            "float" | "real" | "decimal" | "numeric" => {
                self.skip_type_length()?;
                DataType::Double
            }
            "varchar" | "char" | "character" | "longvarchar" | "text" => {
                self.consume_word("varying");
                self.skip_type_length()?;
                DataType::Varchar
            }
            "boolean" => DataType::Boolean,
            "blob" | "binary" | "varbinary" => {
                self.skip_type_length()?;
                DataType::Blob
            }
            "row" => {
                self.expect_token(Token::LeftParen)?;
                let mut fields = vec![self.parse_data_type()?];
                while self.consume_token(&Token::Comma) {
                    fields.push(self.parse_data_type()?);
                }
                self.expect_token(Token::RightParen)?;
                DataType::Row(fields)
            }
            other => return Err(SqlError::Parse(format!("unknown data type {}", other))),
        };

        while self.consume_word("array") {
            if self.consume_token(&Token::LeftBracket) {
                self.expect_number()?;
                self.expect_token(Token::RightBracket)?;
            }
            data_type = DataType::Array(Box::new(data_type));
        }

        Ok(data_type)
    }

    /// `(n)` or `(p, s)` after a type name; the engine does not enforce it
    fn skip_type_length(&mut self) -> SqlResult<()> {
        if self.consume_token(&Token::LeftParen) {
            self.expect_number()?;
            if self.consume_token(&Token::Comma) {
                self.expect_number()?;
            }
            self.expect_token(Token::RightParen)?;
        }
        Ok(())
    }

    /// `CHECK (condition)`, keeping the condition's source text
    fn parse_check_condition(&mut self) -> SqlResult<String> {
        self.expect_token(Token::Check)?;
        self.expect_token(Token::LeftParen)?;
        let start = self.current_start();
        self.parse_expression()?;
        let end = self.previous_end();
        self.expect_token(Token::RightParen)?;
        Ok(self.source(start, end))
    }

    /// `REFERENCES table [(columns)] [MATCH ...] [ON DELETE ...] [ON UPDATE ...]`
    fn parse_references(&mut self) -> SqlResult<ForeignKeyReference> {
        self.expect_token(Token::References)?;
        let table = self.expect_identifier()?;
        let columns = if self.match_token(&Token::LeftParen) {
            Some(self.parse_parenthesized_identifiers()?)
        } else {
            None
        };

        let match_type = if self.consume_word("match") {
            if self.consume_word("full") {
                Some(MatchType::Full)
            } else if self.consume_word("simple") {
                Some(MatchType::Simple)
            } else {
                return Err(self.error("expected FULL or SIMPLE after MATCH"));
            }
        } else {
            None
        };

        let mut on_delete = ReferentialAction::NoAction;
        let mut on_update = ReferentialAction::NoAction;
        while self.consume_token(&Token::On) {
            if self.consume_token(&Token::Delete) {
                on_delete = self.parse_referential_action()?;
            } else if self.consume_token(&Token::Update) {
                on_update = self.parse_referential_action()?;
            } else {
                return Err(self.error("expected DELETE or UPDATE after ON"));
            }
        }

        Ok(ForeignKeyReference {
            table,
            columns,
            match_type,
            on_delete,
            on_update,
        })
    }

    fn parse_referential_action(&mut self) -> SqlResult<ReferentialAction> {
        if self.consume_word("cascade") {
            Ok(ReferentialAction::Cascade)
        } else if self.consume_word("restrict") {
            Ok(ReferentialAction::Restrict)
        } else if self.consume_word("no") {
            self.expect_word("action")?;
            Ok(ReferentialAction::NoAction)
        } else if self.consume_token(&Token::Set) {
            if self.consume_token(&Token::Null) {
                Ok(ReferentialAction::SetNull)
            } else {
                self.expect_token(Token::Default)?;
                Ok(ReferentialAction::SetDefault)
            }
        } else {
            Err(self.error("expected referential action"))
        }
    }

    /// Parse table-level constraint
    fn parse_table_constraint(&mut self) -> SqlResult<TableConstraint> {
        let name = if self.consume_token(&Token::Constraint) {
            Some(self.expect_identifier()?)
        } else {
            None
        };

        let kind = match self.current_token() {
            Token::Primary => {
                self.advance();
                self.expect_word("key")?;
                ConstraintKind::PrimaryKey(self.parse_parenthesized_identifiers()?)
            }
            Token::Unique => {
                self.advance();
                ConstraintKind::Unique(self.parse_parenthesized_identifiers()?)
            }
            Token::Foreign => {
                self.advance();
                self.expect_word("key")?;
                let columns = self.parse_parenthesized_identifiers()?;
                let reference = self.parse_references()?;
                ConstraintKind::ForeignKey { columns, reference }
            }
            Token::Check => ConstraintKind::Check(self.parse_check_condition()?),
            _ => return Err(self.error("expected table constraint")),
        };

        Ok(TableConstraint { name, kind })
    }

    /// `CREATE [UNIQUE] INDEX name ON table (columns)`
    fn parse_create_index(&mut self) -> SqlResult<Statement> {
        let unique = self.consume_token(&Token::Unique);
        self.expect_token(Token::Index)?;
        let index_name = self.expect_identifier()?;
        self.expect_token(Token::On)?;
        let table_name = self.expect_identifier()?;
        let columns = self.parse_parenthesized_identifiers()?;

        Ok(Statement::CreateIndex(CreateIndexStatement {
            index_name,
            table_name,
            columns,
            unique,
        }))
    }

    fn parse_alter(&mut self) -> SqlResult<Statement> {
        self.expect_token(Token::Alter)?;
        self.expect_token(Token::Table)?;
        let table_name = self.expect_identifier()?;

        let action = if self.consume_word("add") {
            if self.is_table_constraint() {
                AlterTableAction::AddConstraint(self.parse_table_constraint()?)
            } else {
                if self.match_word("column") && self.peek_token(1).is_identifier() {
                    self.advance();
                }
                let (column, constraints) = self.parse_column_definition()?;
                AlterTableAction::AddColumn(column, constraints)
            }
        } else if self.consume_token(&Token::Drop) {
            if self.consume_token(&Token::Constraint) {
                AlterTableAction::DropConstraint(self.expect_identifier()?)
            } else {
                if self.match_word("column") && self.peek_token(1).is_identifier() {
                    self.advance();
                }
                AlterTableAction::DropColumn(self.expect_identifier()?)
            }
        } else if self.consume_token(&Token::Alter) {
            self.expect_token(Token::Constraint)?;
            let constraint = self.expect_identifier()?;
            self.expect_word("add")?;
            self.expect_token(Token::LeftParen)?;
            let column = self.expect_identifier()?;
            self.expect_token(Token::RightParen)?;
            self.expect_token(Token::References)?;
            self.expect_token(Token::LeftParen)?;
            let referenced_column = self.expect_identifier()?;
            self.expect_token(Token::RightParen)?;
            AlterTableAction::ExtendForeignKey {
                constraint,
                column,
                referenced_column,
            }
        } else {
            return Err(self.error("expected ADD, DROP or ALTER"));
        };

        Ok(Statement::AlterTable(AlterTableStatement { table_name, action }))
    }

    /// Parse DROP TABLE statement
    fn parse_drop(&mut self) -> SqlResult<Statement> {
        self.expect_token(Token::Drop)?;
        self.expect_token(Token::Table)?;

        let if_exists = if self.consume_word("if") {
            self.expect_token(Token::Exists)?;
            true
        } else {
            false
        };

        let table_name = self.expect_identifier()?;

        Ok(Statement::DropTable(DropTableStatement {
            table_name,
            if_exists,
        }))
    }

    // Expressions

    /// Parse expression
    fn parse_expression(&mut self) -> SqlResult<Expression> {
        self.parse_or()
    }

    /// Parse OR expression
    fn parse_or(&mut self) -> SqlResult<Expression> {
        let mut left = self.parse_and()?;

        while self.consume_token(&Token::Or) {
            let right = self.parse_and()?;
            left = Expression::or(left, right);
        }

        Ok(left)
    }

    /// Parse AND expression
    fn parse_and(&mut self) -> SqlResult<Expression> {
        let mut left = self.parse_not()?;

        while self.consume_token(&Token::And) {
            let right = self.parse_not()?;
            left = Expression::and(left, right);
        }

        Ok(left)
    }

    /// Parse NOT expression
    fn parse_not(&mut self) -> SqlResult<Expression> {
        if self.consume_token(&Token::Not) {
            let operand = self.parse_not()?;
            Ok(Expression::not(operand))
        } else {
            self.parse_comparison()
        }
    }

    /// Comparison and the other predicates over one row value
    fn parse_comparison(&mut self) -> SqlResult<Expression> {
        let left = self.parse_addition()?;

        if self.consume_token(&Token::Is) {
            let negated = self.consume_token(&Token::Not);
            self.expect_token(Token::Null)?;
            let op = if negated {
                UnaryOperator::IsNotNull
            } else {
                UnaryOperator::IsNull
            };
            return Ok(Expression::unary(op, left));
        }

        let negated = self.match_token(&Token::Not)
            && matches!(self.peek_token(1), Token::In | Token::Between | Token::Like);
        if negated {
            self.advance();
        }

        let predicate = match self.current_token() {
            Token::In => {
                self.advance();
                let right = self.parse_in_operand()?;
                Expression::in_list(left, right)
            }
            Token::Between => {
                self.advance();
                let low = self.parse_addition()?;
                self.expect_token(Token::And)?;
                let high = self.parse_addition()?;
                Expression::and(
                    Expression::binary(BinaryOperator::Ge, left.clone(), low),
                    Expression::binary(BinaryOperator::Le, left, high),
                )
            }
            Token::Like => {
                self.advance();
                let pattern = self.parse_addition()?;
                Expression::binary(BinaryOperator::Like, left, pattern)
            }
            _ => return self.parse_comparison_operator(left),
        };
        Ok(if negated {
            Expression::not(predicate)
        } else {
            predicate
        })
    }

    /// `left <op> right`, `left <op> ANY (...)` or `left <op> ALL (...)`
    fn parse_comparison_operator(&mut self, left: Expression) -> SqlResult<Expression> {
        let op = match self.current_token() {
            Token::Equal => BinaryOperator::Eq,
            Token::NotEqual => BinaryOperator::Ne,
            Token::Less => BinaryOperator::Lt,
            Token::Greater => BinaryOperator::Gt,
            Token::LessEqual => BinaryOperator::Le,
            Token::GreaterEqual => BinaryOperator::Ge,
            _ => return Ok(left),
        };
        self.advance();

        let quantifier = match (self.current_token(), self.peek_token(1)) {
            (Token::Any | Token::Some, Token::LeftParen) => Some(Quantifier::Any),
            (Token::All, Token::LeftParen) => Some(Quantifier::All),
            _ => None,
        };
        if let Some(quantifier) = quantifier {
            self.advance();
            let right = self.parse_in_operand()?;
            return Ok(Expression::quantified(op, quantifier, left, right));
        }

        let right = self.parse_addition()?;
        Ok(Expression::binary(op, left, right))
    }

    /// `(query)` as a table subquery, or `(value, ...)` as a value list
    fn parse_in_operand(&mut self) -> SqlResult<Expression> {
        self.expect_token(Token::LeftParen)?;
        let operand = if matches!(self.current_token(), Token::Select | Token::With) {
            let query = self.parse_query_expression()?;
            Expression::subquery(SubqueryKind::Table, query)
        } else {
            Expression::value_list(self.parse_expression_list()?)
        };
        self.expect_token(Token::RightParen)?;
        Ok(operand)
    }

    /// Parse addition/subtraction/concatenation expression
    fn parse_addition(&mut self) -> SqlResult<Expression> {
        let mut left = self.parse_multiplication()?;

        loop {
            let op = match self.current_token() {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Sub,
                Token::Concat => BinaryOperator::Concat,
                _ => break,
            };
            self.advance();

            let right = self.parse_multiplication()?;
            left = Expression::binary(op, left, right);
        }

        Ok(left)
    }

    /// Parse multiplication/division expression; `%` is MOD
    fn parse_multiplication(&mut self) -> SqlResult<Expression> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.current_token() {
                Token::Star => Some(BinaryOperator::Mul),
                Token::Slash => Some(BinaryOperator::Div),
                Token::Percent => None,
                _ => break,
            };
            self.advance();

            let right = self.parse_unary()?;
            left = match op {
                Some(op) => Expression::binary(op, left, right),
                None => Expression::function(Function::Mod, vec![left, right]),
            };
        }

        Ok(left)
    }

    /// Parse unary expression. A minus in front of a numeric literal folds
    /// into the literal.
    fn parse_unary(&mut self) -> SqlResult<Expression> {
        match self.current_token() {
            Token::Plus => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expression::unary(UnaryOperator::Plus, operand))
            }
            Token::Minus => {
                self.advance();
                let operand = self.parse_unary()?;
                let folded = match operand.as_value() {
                    Some(Value::Int32(n)) => n.checked_neg().map(Value::Int32),
                    Some(Value::BigInt(n)) => n.checked_neg().map(|n| match i32::try_from(n) {
                        Ok(small) => Value::Int32(small),
                        Err(_) => Value::BigInt(n),
                    }),
                    Some(Value::Double(d)) => Some(Value::Double(-d)),
                    _ => None,
                };
                Ok(match folded {
                    Some(value) => Expression::value(value),
                    None => Expression::unary(UnaryOperator::Minus, operand),
                })
            }
            _ => self.parse_primary(),
        }
    }

    /// Parse primary expression
    fn parse_primary(&mut self) -> SqlResult<Expression> {
        match self.current_token().clone() {
            Token::Number(n) => {
                self.advance();
                parse_number(&n).map(Expression::value)
            }
            Token::String(s) => {
                self.advance();
                Ok(Expression::value(Value::String(s)))
            }
            Token::True => {
                self.advance();
                Ok(Expression::boolean(true))
            }
            Token::False => {
                self.advance();
                Ok(Expression::boolean(false))
            }
            Token::Null => {
                self.advance();
                Ok(Expression::null())
            }
            Token::Parameter => {
                self.advance();
                let index = self.parameter_count;
                self.parameter_count += 1;
                Ok(Expression::parameter(index))
            }
            Token::LeftParen => {
                self.advance();
                if matches!(self.current_token(), Token::Select | Token::With) {
                    let query = self.parse_query_expression()?;
                    self.expect_token(Token::RightParen)?;
                    return Ok(Expression::subquery(SubqueryKind::Scalar, query));
                }
                let mut items = self.parse_expression_list()?;
                self.expect_token(Token::RightParen)?;
                if items.len() == 1 {
                    Ok(items.remove(0))
                } else {
                    Ok(Expression::row(items))
                }
            }
            Token::Exists => {
                self.advance();
                self.expect_token(Token::LeftParen)?;
                let query = self.parse_query_expression()?;
                self.expect_token(Token::RightParen)?;
                Ok(Expression::exists(Expression::subquery(
                    SubqueryKind::Table,
                    query,
                )))
            }
            Token::Case => self.parse_case_expression(),
            Token::Cast => self.parse_cast_expression(),
            Token::Any | Token::Some => {
                self.advance();
                self.parse_set_function(SetFunction::Some)
            }
            Token::Identifier(name) => {
                self.advance();
                self.parse_identifier_expression(name)
            }
            _ => Err(self.error("expected expression")),
        }
    }

    /// Column references, function calls and ROW / ARRAY constructors
    fn parse_identifier_expression(&mut self, name: String) -> SqlResult<Expression> {
        if name == "row" && self.match_token(&Token::LeftParen) {
            self.advance();
            let fields = self.parse_expression_list()?;
            self.expect_token(Token::RightParen)?;
            return Ok(Expression::row(fields));
        }

        if name == "array" && self.consume_token(&Token::LeftBracket) {
            let elements = if self.match_token(&Token::RightBracket) {
                vec![]
            } else {
                self.parse_expression_list()?
            };
            self.expect_token(Token::RightBracket)?;
            return Ok(Expression::array(elements));
        }

        if name == "array" && self.match_token(&Token::LeftParen) {
            self.advance();
            let query = self.parse_query_expression()?;
            self.expect_token(Token::RightParen)?;
            return Ok(Expression::subquery(SubqueryKind::Array, query));
        }

        if self.consume_token(&Token::LeftParen) {
            if let Some(function) = SetFunction::from_name(&name) {
                return self.parse_set_function_arguments(function);
            }
            let function = Function::from_name(&name)
                .ok_or_else(|| SqlError::ObjectNotFound(name.to_uppercase()))?;
            let args = if self.match_token(&Token::RightParen) {
                vec![]
            } else {
                self.parse_expression_list()?
            };
            self.expect_token(Token::RightParen)?;
            return Ok(Expression::function(function, args));
        }

        if let Some(function) = Function::from_name(&name) {
            if function.is_niladic_keyword() {
                return Ok(Expression::function(function, vec![]));
            }
        }

        if self.consume_token(&Token::Dot) {
            let column = self.expect_identifier()?;
            return Ok(Expression::column(column, Some(name)));
        }

        Ok(Expression::column(name, None))
    }

    /// A set function whose name was a reserved word
    fn parse_set_function(&mut self, function: SetFunction) -> SqlResult<Expression> {
        self.expect_token(Token::LeftParen)?;
        self.parse_set_function_arguments(function)
    }

    /// `(*)`, `([DISTINCT | ALL] expr)`; the opening parenthesis is consumed
    fn parse_set_function_arguments(&mut self, function: SetFunction) -> SqlResult<Expression> {
        if function == SetFunction::Count && self.consume_token(&Token::Star) {
            self.expect_token(Token::RightParen)?;
            return Ok(Expression::aggregate(function, false, None));
        }
        let distinct = if self.consume_token(&Token::Distinct) {
            true
        } else {
            self.consume_token(&Token::All);
            false
        };
        let arg = self.parse_expression()?;
        self.expect_token(Token::RightParen)?;
        Ok(Expression::aggregate(function, distinct, Some(arg)))
    }

    /// Parse CASE expression
    fn parse_case_expression(&mut self) -> SqlResult<Expression> {
        self.expect_token(Token::Case)?;

        let operand = if self.match_token(&Token::When) {
            None
        } else {
            Some(self.parse_expression()?)
        };

        let mut branches = vec![];
        while self.consume_token(&Token::When) {
            let when = self.parse_expression()?;
            self.expect_token(Token::Then)?;
            let then = self.parse_expression()?;
            branches.push((when, then));
        }
        if branches.is_empty() {
            return Err(self.error("CASE requires at least one WHEN"));
        }

        let else_result = if self.consume_token(&Token::Else) {
            Some(self.parse_expression()?)
        } else {
            None
        };

        self.expect_token(Token::End)?;
        Ok(Expression::case(operand, branches, else_result))
    }

    /// Parse CAST expression
    fn parse_cast_expression(&mut self) -> SqlResult<Expression> {
        self.expect_token(Token::Cast)?;
        self.expect_token(Token::LeftParen)?;
        let operand = self.parse_expression()?;
        self.expect_token(Token::As)?;
        let target = self.parse_data_type()?;
        self.expect_token(Token::RightParen)?;
        Ok(Expression::cast(operand, target))
    }

    /// Parse comma-separated expression list
    fn parse_expression_list(&mut self) -> SqlResult<Vec<Expression>> {
        let mut expressions = vec![self.parse_expression()?];

        while self.consume_token(&Token::Comma) {
            expressions.push(self.parse_expression()?);
        }

        Ok(expressions)
    }

    /// `(name, ...)`
    fn parse_parenthesized_identifiers(&mut self) -> SqlResult<Vec<String>> {
        self.expect_token(Token::LeftParen)?;
        let mut identifiers = vec![self.expect_identifier()?];
        while self.consume_token(&Token::Comma) {
            identifiers.push(self.expect_identifier()?);
        }
        self.expect_token(Token::RightParen)?;
        Ok(identifiers)
    }

    // Helper methods

    /// Get current token
    fn current_token(&self) -> &Token {
        self.peek_token(0)
    }

    fn peek_token(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.position + offset)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    /// Advance to next token
    fn advance(&mut self) {
        if self.position < self.tokens.len().saturating_sub(1) {
            self.position += 1;
        }
    }

    /// Check if current token matches
    fn match_token(&self, token: &Token) -> bool {
        self.current_token() == token
    }

    /// Advance past `token` if it is current
    fn consume_token(&mut self, token: &Token) -> bool {
        if self.match_token(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Expect a specific token
    fn expect_token(&mut self, token: Token) -> SqlResult<()> {
        if self.consume_token(&token) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {:?}", token)))
        }
    }

    /// Whether the current token is the unreserved word `word`
    fn match_word(&self, word: &str) -> bool {
        matches!(self.current_token(), Token::Identifier(name) if name == word)
    }

    fn consume_word(&mut self, word: &str) -> bool {
        if self.match_word(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_word(&mut self, word: &str) -> SqlResult<()> {
        if self.consume_word(word) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {}", word.to_uppercase())))
        }
    }

    /// Expect an identifier
    fn expect_identifier(&mut self) -> SqlResult<String> {
        match self.current_token() {
            Token::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error("expected identifier")),
        }
    }

    /// Expect a number
    fn expect_number(&mut self) -> SqlResult<String> {
        match self.current_token() {
            Token::Number(n) => {
                let n = n.clone();
                self.advance();
                Ok(n)
            }
            _ => Err(self.error("expected number")),
        }
    }

    fn current_start(&self) -> usize {
        self.tokens
            .get(self.position)
            .map_or(self.sql.len(), |t| t.start)
    }

    /// End offset of the last consumed token
    fn previous_end(&self) -> usize {
        match self.position.checked_sub(1).and_then(|p| self.tokens.get(p)) {
            Some(token) => token.end,
            None => 0,
        }
    }

    fn source(&self, start: usize, end: usize) -> String {
        self.sql
            .get(start..end.max(start))
            .unwrap_or_default()
            .to_string()
    }

    fn error(&self, message: &str) -> SqlError {
        SqlError::Parse(format!(
            "{}, found {:?} at offset {}",
            message,
            self.current_token(),
            self.current_start()
        ))
    }
}

/// Integer literals are INTEGER when they fit, then BIGINT; anything with a
/// fraction or exponent is DOUBLE
fn parse_number(text: &str) -> SqlResult<Value> {
    let invalid = || SqlError::Parse(format!("invalid number {}", text));
    if text.contains(['.', 'e', 'E']) {
        return text.parse::<f64>().map(Value::Double).map_err(|_| invalid());
    }
    if let Ok(n) = text.parse::<i32>() {
        return Ok(Value::Int32(n));
    }
    if let Ok(n) = text.parse::<i64>() {
        return Ok(Value::BigInt(n));
    }
    text.parse::<f64>().map(Value::Double).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::ExprKind;

    fn parse(sql: &str) -> Statement {
        Parser::new(sql).unwrap().parse().unwrap()
    }

    fn parse_query(sql: &str) -> QueryExpression {
        match parse(sql) {
            Statement::Query(query) => query,
            other => panic!("Expected query, got {:?}", other),
        }
    }

    fn expr(sql: &str) -> Expression {
        Parser::new(sql)
            .unwrap()
            .parse_standalone_expression()
            .unwrap()
    }

    #[test]
    fn test_parse_select_simple() {
        let query = parse_query("SELECT id, name FROM users");
        match &query.body {
            QueryBody::Specification(spec) => {
                assert_eq!(spec.select_list.len(), 2);
                assert!(matches!(
                    &spec.from[0],
                    TableRef::Named { name, alias: None } if name == "users"
                ));
            }
            _ => panic!("Expected query specification"),
        }
        assert_eq!(query.get_sql(), "SELECT id, name FROM users");
    }

    #[test]
    fn test_parse_select_with_where() {
        let query = parse_query("SELECT * FROM users WHERE age > 18 AND status = 'active'");
        match &query.body {
            QueryBody::Specification(spec) => {
                assert!(matches!(spec.select_list[0], SelectItem::Wildcard(None)));
                assert!(spec.where_clause.is_some());
            }
            _ => panic!("Expected query specification"),
        }
    }

    #[test]
    fn test_parse_join() {
        let sql = "SELECT u.id, p.title
                   FROM users u
                   INNER JOIN posts p ON u.id = p.user_id
                   LEFT OUTER JOIN tags AS t ON t.id = p.tag";
        let query = parse_query(sql);
        let QueryBody::Specification(spec) = &query.body else {
            panic!("Expected query specification");
        };
        match &spec.from[0] {
            TableRef::Join {
                kind, left, right, ..
            } => {
                assert_eq!(*kind, JoinKind::Left);
                assert!(matches!(**right, TableRef::Named { ref name, .. } if name == "tags"));
                assert!(matches!(**left, TableRef::Join { kind: JoinKind::Inner, .. }));
            }
            _ => panic!("Expected join"),
        }
    }

    #[test]
    fn test_set_operation_precedence() {
        let query = parse_query(
            "SELECT a FROM t UNION ALL CORRESPONDING BY (a) SELECT a FROM u INTERSECT SELECT a FROM v ORDER BY 1 LIMIT 2",
        );
        match &query.body {
            QueryBody::SetOperation(op) => {
                assert_eq!(op.operator, SetOperator::Union);
                assert!(op.all);
                assert_eq!(op.corresponding, Some(vec!["a".to_string()]));
                assert!(matches!(
                    op.right.body,
                    QueryBody::SetOperation(ref r) if r.operator == SetOperator::Intersect
                ));
            }
            _ => panic!("Expected set operation"),
        }
        assert_eq!(query.order_by.len(), 1);
        assert!(query.limit.is_some());
    }

    #[test]
    fn test_recursive_with() {
        let query = parse_query(
            "WITH RECURSIVE t(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM t WHERE n < 5) SELECT n FROM t",
        );
        let with = query.with.as_ref().unwrap();
        assert!(with.recursive);
        assert_eq!(with.ctes[0].name, "t");
        assert_eq!(with.ctes[0].columns, Some(vec!["n".to_string()]));
        assert_eq!(
            with.ctes[0].query.get_sql(),
            "SELECT 1 UNION ALL SELECT n + 1 FROM t WHERE n < 5"
        );
    }

    #[test]
    fn test_parenthesized_query_limits() {
        let query = parse_query("(SELECT a FROM t ORDER BY a) LIMIT 1");
        assert_eq!(query.order_by.len(), 1);
        assert!(query.limit.is_some());
        assert!(Parser::new("(SELECT a FROM t ORDER BY a) ORDER BY a")
            .unwrap()
            .parse()
            .is_err());
    }

    #[test]
    fn test_parse_insert() {
        match parse("INSERT INTO users (id, name) VALUES (1, 'John'), (2, DEFAULT)") {
            Statement::Insert(insert) => {
                assert_eq!(insert.table_name, "users");
                assert_eq!(
                    insert.columns,
                    Some(vec!["id".to_string(), "name".to_string()])
                );
                match insert.source {
                    InsertSource::Values(rows) => {
                        assert_eq!(rows.len(), 2);
                        assert!(rows[1][1].is_none());
                    }
                    _ => panic!("Expected VALUES"),
                }
            }
            _ => panic!("Expected INSERT statement"),
        }
        assert!(matches!(
            parse("INSERT INTO t (SELECT * FROM u)"),
            Statement::Insert(InsertStatement {
                columns: None,
                source: InsertSource::Query(_),
                ..
            })
        ));
    }

    #[test]
    fn test_parse_update_and_delete() {
        match parse("UPDATE users SET name = 'John Doe', age = DEFAULT WHERE id = 1") {
            Statement::Update(update) => {
                assert_eq!(update.table_name, "users");
                assert_eq!(update.assignments.len(), 2);
                assert!(update.assignments[1].1.is_none());
                assert!(update.where_clause.is_some());
            }
            _ => panic!("Expected UPDATE statement"),
        }
        match parse("DELETE FROM users u WHERE u.id = 1;") {
            Statement::Delete(delete) => {
                assert_eq!(delete.table_name, "users");
                assert_eq!(delete.alias, Some("u".to_string()));
            }
            _ => panic!("Expected DELETE statement"),
        }
    }

    #[test]
    fn test_parse_create_table() {
        let sql = "CREATE TABLE Orders (
            id BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY,
            customer INT NOT NULL REFERENCES customers ON DELETE CASCADE,
            note VARCHAR(100) DEFAULT 'none',
            qty INT CONSTRAINT qty_positive CHECK (qty > 0),
            tags VARCHAR ARRAY,
            CONSTRAINT fk_x FOREIGN KEY (customer, qty) REFERENCES c2 (a, b) MATCH FULL ON UPDATE SET NULL
        )";
        let Statement::CreateTable(create) = parse(sql) else {
            panic!("Expected CREATE TABLE statement");
        };
        assert_eq!(create.table_name, "orders");
        assert_eq!(create.columns.len(), 5);
        assert_eq!(create.columns[0].identity, Some(false));
        assert!(create.columns[1].not_null);
        assert!(create.columns[2].default.is_some());
        assert_eq!(
            create.columns[4].data_type,
            DataType::Array(Box::new(DataType::Varchar))
        );

        assert_eq!(create.constraints.len(), 4);
        assert!(matches!(
            &create.constraints[0].kind,
            ConstraintKind::PrimaryKey(cols) if cols == &vec!["id".to_string()]
        ));
        match &create.constraints[1].kind {
            ConstraintKind::ForeignKey { reference, .. } => {
                assert_eq!(reference.table, "customers");
                assert_eq!(reference.columns, None);
                assert_eq!(reference.on_delete, ReferentialAction::Cascade);
            }
            _ => panic!("Expected foreign key"),
        }
        assert_eq!(create.constraints[2].name, Some("qty_positive".to_string()));
        assert!(matches!(
            &create.constraints[2].kind,
            ConstraintKind::Check(sql) if sql == "qty > 0"
        ));
        match &create.constraints[3].kind {
            ConstraintKind::ForeignKey { reference, .. } => {
                assert_eq!(reference.match_type, Some(MatchType::Full));
                assert_eq!(reference.on_update, ReferentialAction::SetNull);
                assert_eq!(reference.on_delete, ReferentialAction::NoAction);
            }
            _ => panic!("Expected foreign key"),
        }
    }

    #[test]
    fn test_parse_alter_table() {
        assert!(matches!(
            parse("ALTER TABLE t ADD COLUMN c INT DEFAULT 0"),
            Statement::AlterTable(AlterTableStatement {
                action: AlterTableAction::AddColumn(..),
                ..
            })
        ));
        assert!(matches!(
            parse("ALTER TABLE t ADD CONSTRAINT u1 UNIQUE (a, b)"),
            Statement::AlterTable(AlterTableStatement {
                action: AlterTableAction::AddConstraint(_),
                ..
            })
        ));
        assert!(matches!(
            parse("ALTER TABLE t DROP COLUMN c"),
            Statement::AlterTable(AlterTableStatement {
                action: AlterTableAction::DropColumn(ref c),
                ..
            }) if c == "c"
        ));
        assert!(matches!(
            parse("ALTER TABLE child ALTER CONSTRAINT fk ADD (y) REFERENCES (b)"),
            Statement::AlterTable(AlterTableStatement {
                action: AlterTableAction::ExtendForeignKey { .. },
                ..
            })
        ));
        assert!(matches!(
            parse("DROP TABLE IF EXISTS t"),
            Statement::DropTable(DropTableStatement { if_exists: true, .. })
        ));
    }

    #[test]
    fn test_predicates() {
        let between = expr("a NOT BETWEEN 1 AND 5");
        assert_eq!(between.get_sql(), "(NOT ((a >= 1) AND (a <= 5)))");

        let in_list = expr("a IN (1, 2)");
        assert_eq!(in_list.get_sql(), "(a IN (1, 2))");

        let quantified = expr("a > ALL (SELECT b FROM t)");
        assert!(matches!(
            quantified.kind,
            ExprKind::Quantified {
                quantifier: Quantifier::All,
                ..
            }
        ));
        assert_eq!(quantified.get_sql(), "(a > ALL (SELECT b FROM t))");

        assert_eq!(expr("x IS NOT NULL").get_sql(), "(x IS NOT NULL)");
        assert_eq!(expr("name NOT LIKE 'a%'").get_sql(), "(NOT (name LIKE 'a%'))");
    }

    #[test]
    fn test_predicates_mix_with_comparisons() {
        assert_eq!(
            expr("a NOT IN (1, 2) AND b < 3").get_sql(),
            "((NOT (a IN (1, 2))) AND (b < 3))"
        );
        assert_eq!(
            expr("a LIKE 'x%' OR a BETWEEN b AND 4").get_sql(),
            "((a LIKE 'x%') OR ((a >= b) AND (a <= 4)))"
        );
        assert_eq!(expr("a >= SOME (SELECT b FROM t)").get_sql(), "(a >= ANY (SELECT b FROM t))");
        assert_eq!(expr("a").get_sql(), "a");
    }

    #[test]
    fn test_literals_and_functions() {
        assert_eq!(expr("-5").as_value(), Some(&Value::Int32(-5)));
        assert_eq!(expr("3000000000").as_value(), Some(&Value::BigInt(3_000_000_000)));
        assert_eq!(expr("1.5").as_value(), Some(&Value::Double(1.5)));
        assert_eq!(expr("7 % 3").get_sql(), "MOD(7, 3)");
        assert_eq!(expr("current_timestamp").get_sql(), "CURRENT_TIMESTAMP");
        assert_eq!(expr("count(*)").get_sql(), "COUNT(*)");
        assert_eq!(expr("SUM(DISTINCT a)").get_sql(), "SUM(DISTINCT a)");
        assert_eq!(expr("ARRAY[1, 2]").get_sql(), "ARRAY[1, 2]");
        assert_eq!(expr("(1, 'a')").get_sql(), "ROW(1, 'a')");
        assert_eq!(
            expr("CAST(a AS VARCHAR(10))").get_sql(),
            "CAST(a AS VARCHAR)"
        );
        assert!(matches!(
            Parser::new("no_such_fn(1)").unwrap().parse_standalone_expression(),
            Err(SqlError::ObjectNotFound(_))
        ));
    }

    #[test]
    fn test_get_sql_reparses() {
        let sources = [
            "CASE WHEN a > 1 THEN 'big' ELSE 'small' END",
            "COALESCE(a, b, 0) || 'x'",
            "EXISTS (SELECT 1 FROM t WHERE t.a = b)",
            "a = ANY (SELECT b FROM t)",
            "CAST(-7 AS BIGINT) + CARDINALITY(ARRAY[1])",
        ];
        for source in sources {
            let first = expr(source).get_sql();
            let second = expr(&first).get_sql();
            assert_eq!(first, second, "round trip of {}", source);
        }
    }

    #[test]
    fn test_parameters_are_numbered() {
        let mut parser = Parser::new("SELECT a FROM t WHERE a = ? AND b > ?").unwrap();
        parser.parse().unwrap();
        assert_eq!(parser.parameter_count(), 2);
    }

    #[test]
    fn test_syntax_errors() {
        for sql in [
            "SELECT FROM",
            "SELECT a FROM t WHERE",
            "CREATE TABLE t (a)",
            "SELECT 1 2 3",
            "UPDATE t",
        ] {
            let result = Parser::new(sql).and_then(|mut p| p.parse());
            assert!(matches!(result, Err(SqlError::Parse(_))), "{}", sql);
        }
    }
}
