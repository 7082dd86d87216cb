//! Statement-wide compilation state: id counters and the common table
//! expressions in scope.

use crate::catalog::Catalog;
use crate::error::{SqlError, SqlResult};
use crate::query::{QueryExpression, RecursiveQuery, WithClause};
use crate::range::{RangeColumn, RangeVariable};
use log::debug;
use std::sync::Arc;

/// `name [(columns)] AS (query)` of a WITH clause. The query is kept
/// unresolved; every reference compiles its own copy.
#[derive(Debug, Clone)]
pub struct CteDefinition {
    pub name: String,
    pub columns: Option<Vec<String>>,
    pub query: QueryExpression,
}

#[derive(Debug, Clone)]
pub(crate) enum CteState {
    Available,
    /// The definition is being compiled; references from inside it are
    /// only legal in the recursive member of a recursive CTE.
    Compiling,
    /// Compiling the recursive member: references read the work table.
    Recursive {
        work_id: usize,
        columns: Vec<RangeColumn>,
    },
}

struct CteEntry {
    definition: CteDefinition,
    recursive: bool,
    state: CteState,
}

enum CompiledCte {
    Query(QueryExpression),
    Recursive(RecursiveQuery),
}

/// Shared state for compiling one statement
pub struct CompileContext {
    pub catalog: Arc<Catalog>,
    next_range_id: usize,
    next_subquery_id: usize,
    next_aggregate_slot: usize,
    next_work_id: usize,
    cte_scopes: Vec<Vec<CteEntry>>,
}

impl CompileContext {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            next_range_id: 0,
            next_subquery_id: 0,
            next_aggregate_slot: 0,
            next_work_id: 0,
            cte_scopes: Vec::new(),
        }
    }

    pub fn next_range_id(&mut self) -> usize {
        let id = self.next_range_id;
        self.next_range_id += 1;
        id
    }

    pub fn next_subquery_id(&mut self) -> usize {
        let id = self.next_subquery_id;
        self.next_subquery_id += 1;
        id
    }

    pub fn next_aggregate_slot(&mut self) -> usize {
        let slot = self.next_aggregate_slot;
        self.next_aggregate_slot += 1;
        slot
    }

    pub fn next_work_id(&mut self) -> usize {
        let id = self.next_work_id;
        self.next_work_id += 1;
        id
    }

    pub(crate) fn push_ctes(&mut self, with: &WithClause) {
        let entries = with
            .ctes
            .iter()
            .map(|definition| CteEntry {
                definition: definition.clone(),
                recursive: with.recursive,
                state: CteState::Available,
            })
            .collect();
        self.cte_scopes.push(entries);
    }

    pub(crate) fn pop_ctes(&mut self) {
        self.cte_scopes.pop();
    }

    pub(crate) fn set_cte_state(&mut self, (scope, index): (usize, usize), state: CteState) {
        if let Some(entry) = self
            .cte_scopes
            .get_mut(scope)
            .and_then(|entries| entries.get_mut(index))
        {
            entry.state = state;
        }
    }

    fn find_cte(&self, name: &str) -> Option<(usize, usize)> {
        self.cte_scopes
            .iter()
            .enumerate()
            .rev()
            .find_map(|(scope, entries)| {
                entries
                    .iter()
                    .position(|e| e.definition.name == name)
                    .map(|index| (scope, index))
            })
    }

    /// Range variable for a name in a FROM clause: a CTE in scope, else a
    /// catalog table.
    pub fn resolve_named_range(
        &mut self,
        name: &str,
        alias: Option<String>,
    ) -> SqlResult<RangeVariable> {
        let location = match self.find_cte(name) {
            Some(location) => location,
            None => {
                let table = self.catalog.get_table(name)?;
                let range_id = self.next_range_id();
                return Ok(RangeVariable::for_table(range_id, alias, table));
            }
        };

        let (definition, recursive, state) = {
            let entry = &self.cte_scopes[location.0][location.1];
            (entry.definition.clone(), entry.recursive, entry.state.clone())
        };
        let range_name = alias.unwrap_or_else(|| name.to_string());
        match state {
            CteState::Recursive { work_id, columns } => {
                let range_id = self.next_range_id();
                return Ok(RangeVariable::for_work_table(
                    range_id, range_name, work_id, columns,
                ));
            }
            CteState::Compiling if recursive => {
                return Err(SqlError::Unsupported(format!(
                    "reference to {} outside the recursive member of its definition",
                    name
                )))
            }
            CteState::Compiling => return Err(SqlError::ObjectNotFound(name.to_string())),
            CteState::Available => {}
        }

        debug!("compiling common table expression {}", name);
        self.set_cte_state(location, CteState::Compiling);
        // Only the CTE's own scope and the scopes enclosing it are visible
        // from its body.
        let hidden = self.cte_scopes.split_off(location.0 + 1);
        let compiled = self.compile_cte(&definition, recursive, location);
        self.cte_scopes.extend(hidden);
        self.set_cte_state(location, CteState::Available);

        let range_id = self.next_range_id();
        match compiled? {
            CompiledCte::Recursive(query) => {
                Ok(RangeVariable::for_recursive(range_id, range_name, query))
            }
            CompiledCte::Query(query) => RangeVariable::for_query(
                range_id,
                range_name,
                definition.columns.as_deref(),
                query,
            ),
        }
    }

    fn compile_cte(
        &mut self,
        definition: &CteDefinition,
        recursive: bool,
        location: (usize, usize),
    ) -> SqlResult<CompiledCte> {
        if recursive {
            if let Some(query) = RecursiveQuery::compile(self, definition, location)? {
                return Ok(CompiledCte::Recursive(query));
            }
        }
        let mut query = definition.query.clone();
        query.resolve(self, &[])?;
        Ok(CompiledCte::Query(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::DataType;
    use crate::catalog::ColumnInfo;

    #[test]
    fn test_counters_are_independent() {
        let mut compiler = CompileContext::new(Arc::new(Catalog::new()));
        assert_eq!(compiler.next_range_id(), 0);
        assert_eq!(compiler.next_range_id(), 1);
        assert_eq!(compiler.next_subquery_id(), 0);
        assert_eq!(compiler.next_aggregate_slot(), 0);
        assert_eq!(compiler.next_work_id(), 0);
        assert_eq!(compiler.next_range_id(), 2);
    }

    #[test]
    fn test_named_range_falls_back_to_catalog() {
        let catalog = Arc::new(Catalog::new());
        catalog
            .create_table("t", vec![ColumnInfo::new("a", DataType::Int32)])
            .unwrap();
        let mut compiler = CompileContext::new(catalog);
        let range = compiler
            .resolve_named_range("t", Some("x".to_string()))
            .unwrap();
        assert_eq!(range.name, "x");
        assert!(range.table().is_some());
        assert!(matches!(
            compiler.resolve_named_range("missing", None),
            Err(SqlError::ObjectNotFound(_))
        ));
    }
}
