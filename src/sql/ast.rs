// SQL Abstract Syntax Tree (AST) definitions
//
// Queries and expressions parse straight into the engine's unresolved
// `QueryExpression` / `Expression` trees; only statement shells live here.

use crate::access::DataType;
use crate::constraint::{MatchType, ReferentialAction};
use crate::executor::InsertSource;
use crate::expression::Expression;
use crate::query::QueryExpression;

#[derive(Debug, Clone)]
pub enum Statement {
    Query(QueryExpression),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    CreateTable(CreateTableStatement),
    CreateIndex(CreateIndexStatement),
    AlterTable(AlterTableStatement),
    DropTable(DropTableStatement),
}

impl Statement {
    /// Whether the statement changes the schema
    pub fn is_ddl(&self) -> bool {
        matches!(
            self,
            Statement::CreateTable(_)
                | Statement::CreateIndex(_)
                | Statement::AlterTable(_)
                | Statement::DropTable(_)
        )
    }
}

#[derive(Debug, Clone)]
pub struct InsertStatement {
    pub table_name: String,
    pub columns: Option<Vec<String>>,
    pub source: InsertSource,
}

#[derive(Debug, Clone)]
pub struct UpdateStatement {
    pub table_name: String,
    pub alias: Option<String>,
    /// `None` is `SET column = DEFAULT`
    pub assignments: Vec<(String, Option<Expression>)>,
    pub where_clause: Option<Expression>,
}

#[derive(Debug, Clone)]
pub struct DeleteStatement {
    pub table_name: String,
    pub alias: Option<String>,
    pub where_clause: Option<Expression>,
}

#[derive(Debug, Clone)]
pub struct CreateTableStatement {
    pub table_name: String,
    pub columns: Vec<ColumnDefinition>,
    /// Table constraints, column constraints included
    pub constraints: Vec<TableConstraint>,
}

#[derive(Debug, Clone)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: DataType,
    pub not_null: bool,
    pub default: Option<Expression>,
    /// `Some(always)` for `GENERATED { ALWAYS | BY DEFAULT } AS IDENTITY`
    pub identity: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct TableConstraint {
    pub name: Option<String>,
    pub kind: ConstraintKind,
}

#[derive(Debug, Clone)]
pub enum ConstraintKind {
    PrimaryKey(Vec<String>),
    Unique(Vec<String>),
    ForeignKey {
        columns: Vec<String>,
        reference: ForeignKeyReference,
    },
    /// Condition source text
    Check(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyReference {
    pub table: String,
    /// `None` references the primary key
    pub columns: Option<Vec<String>>,
    pub match_type: Option<MatchType>,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

#[derive(Debug, Clone)]
pub struct CreateIndexStatement {
    pub index_name: String,
    pub table_name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

#[derive(Debug, Clone)]
pub struct AlterTableStatement {
    pub table_name: String,
    pub action: AlterTableAction,
}

#[derive(Debug, Clone)]
pub enum AlterTableAction {
    /// The column plus constraints declared on it
    AddColumn(ColumnDefinition, Vec<TableConstraint>),
    DropColumn(String),
    AddConstraint(TableConstraint),
    DropConstraint(String),
    /// `ALTER CONSTRAINT fk ADD (column) REFERENCES (referenced_column)`
    ExtendForeignKey {
        constraint: String,
        column: String,
        referenced_column: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropTableStatement {
    pub table_name: String,
    pub if_exists: bool,
}
