//! Schema statements: CREATE TABLE, CREATE INDEX, ALTER TABLE, DROP TABLE.
//!
//! Changes to a table's column layout build a new [`Table`], copy the rows
//! across and swap it into the catalog; constraints move to the new object
//! with their columns renumbered and CHECK conditions compiled again from
//! their text. Index and constraint changes are made in place and recorded
//! with [`Catalog::mark_schema_changed`] so that prepared statements rebind.

use crate::access::{DataType, Row, Value};
use crate::catalog::{Catalog, ColumnInfo, Table};
use crate::constraint::{CheckDefinition, Constraint, ConstraintCore, ConstraintType};
use crate::error::{SqlError, SqlResult};
use crate::executor::ExecutionContext;
use crate::expression::type_checker::coerce_to;
use crate::expression::Expression;
use crate::query::CompileContext;
use crate::sql::ast::*;
use crate::sql::statement::resolve_free_expression;
use log::info;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

/// Execute a schema statement
pub fn execute(ctx: &mut ExecutionContext, statement: Statement) -> SqlResult<()> {
    match statement {
        Statement::CreateTable(create) => create_table(ctx, create),
        Statement::CreateIndex(create) => create_index(ctx, create),
        Statement::AlterTable(alter) => alter_table(ctx, alter),
        Statement::DropTable(drop) => drop_table(ctx, drop),
        _ => Err(SqlError::invariant("data statement passed to schema execution")),
    }
}

/// A constraint checked and ready to install, with the objects it needs
struct PreparedConstraint {
    constraint: Constraint,
    /// Index to create on the constrained table: name, key, unique
    index: Option<(String, Vec<usize>, bool)>,
    /// Referenced table and MAIN registration of a foreign key
    main: Option<(Arc<Table>, Constraint)>,
}

fn create_table(ctx: &mut ExecutionContext, create: CreateTableStatement) -> SqlResult<()> {
    let catalog = ctx.catalog.clone();
    if catalog.find_table(&create.table_name).is_some() {
        return Err(SqlError::ObjectExists(create.table_name));
    }

    let primary_keys = create
        .constraints
        .iter()
        .filter(|c| matches!(c.kind, ConstraintKind::PrimaryKey(_)))
        .count();
    if primary_keys > 1 {
        return Err(SqlError::ObjectExists(format!(
            "primary key of {}",
            create.table_name
        )));
    }

    let mut names = HashSet::new();
    let mut columns = Vec::with_capacity(create.columns.len());
    for definition in create.columns {
        if !names.insert(definition.name.clone()) {
            return Err(SqlError::ObjectExists(format!(
                "{}.{}",
                create.table_name, definition.name
            )));
        }
        columns.push(build_column(ctx, definition)?);
    }
    if columns.iter().filter(|c| c.is_identity).count() > 1 {
        return Err(SqlError::Unsupported(format!(
            "more than one identity column in {}",
            create.table_name
        )));
    }
    for constraint in &create.constraints {
        if let ConstraintKind::PrimaryKey(key) = &constraint.kind {
            for column in columns.iter_mut().filter(|c| key.contains(&c.column_name)) {
                column.nullable = false;
            }
        }
    }

    let table = Arc::new(Table::new(
        catalog.next_table_id(),
        create.table_name.as_str(),
        columns,
    ));
    let mut mains = Vec::new();
    for definition in in_install_order(create.constraints) {
        let prepared = prepare_constraint(ctx, &table, definition)?;
        mains.extend(install(&table, prepared));
    }

    catalog.add_table(table.clone())?;
    for (parent, main) in mains {
        parent.add_constraint(main);
    }
    info!(
        "CREATE TABLE {} ({} columns, {} constraints)",
        table.name(),
        table.column_count(),
        table.constraints().len()
    );
    Ok(())
}

/// Keys first, so that a foreign key of the same statement can reference
/// them
fn in_install_order(mut constraints: Vec<TableConstraint>) -> Vec<TableConstraint> {
    constraints.sort_by_key(|c| match c.kind {
        ConstraintKind::PrimaryKey(_) => 0,
        ConstraintKind::Unique(_) => 1,
        ConstraintKind::Check(_) => 2,
        ConstraintKind::ForeignKey { .. } => 3,
    });
    constraints
}

fn build_column(ctx: &mut ExecutionContext, definition: ColumnDefinition) -> SqlResult<ColumnInfo> {
    let mut column = ColumnInfo::new(definition.name, definition.data_type);
    if let Some(always) = definition.identity {
        if !column.column_type.is_integral() {
            return Err(SqlError::type_mismatch(format!(
                "identity column {} must be INTEGER or BIGINT",
                column.column_name
            )));
        }
        column = column.identity(always);
    }
    if let Some(default) = definition.default {
        let value = evaluate_default(ctx, default, &column.column_type)?;
        column = column.with_default(value);
    }
    if definition.not_null {
        column = column.not_null();
    }
    Ok(column)
}

/// Defaults are constant expressions, evaluated once
fn evaluate_default(
    ctx: &mut ExecutionContext,
    mut expr: Expression,
    data_type: &DataType,
) -> SqlResult<Value> {
    if expr.contains_subquery() || expr.contains_parameter() {
        return Err(SqlError::Unsupported(format!(
            "DEFAULT {} is not a constant",
            expr.get_sql()
        )));
    }
    let mut compiler = CompileContext::new(ctx.catalog.clone());
    resolve_free_expression(&mut compiler, &mut expr)?;
    coerce_to(&mut expr, data_type)?;
    expr.get_value(ctx)?.convert_to_type(data_type)
}

fn create_index(ctx: &mut ExecutionContext, create: CreateIndexStatement) -> SqlResult<()> {
    let catalog = &ctx.catalog;
    let table = catalog.get_table(&create.table_name)?;
    if catalog.find_index_owner(&create.index_name).is_some() {
        return Err(SqlError::ObjectExists(create.index_name));
    }
    let columns = key_columns(&table, &create.columns)?;
    if create.unique {
        if let Some(row) = find_duplicate(&table, &columns) {
            return Err(SqlError::UniqueViolation {
                constraint: create.index_name,
                table: table.name().to_string(),
                key: crate::access::format_key(&row.key(&columns)),
            });
        }
    }
    table.add_index(create.index_name.as_str(), columns, create.unique);
    catalog.mark_schema_changed();
    info!(
        "CREATE {}INDEX {} ON {} ({})",
        if create.unique { "UNIQUE " } else { "" },
        create.index_name,
        table.name(),
        create.columns.join(", ")
    );
    Ok(())
}

fn alter_table(ctx: &mut ExecutionContext, alter: AlterTableStatement) -> SqlResult<()> {
    let table = ctx.catalog.get_table(&alter.table_name)?;
    match alter.action {
        AlterTableAction::AddColumn(definition, constraints) => {
            add_column(ctx, &table, definition, constraints)
        }
        AlterTableAction::DropColumn(name) => drop_column(ctx, &table, &name),
        AlterTableAction::AddConstraint(definition) => add_constraint(ctx, &table, definition),
        AlterTableAction::DropConstraint(name) => drop_constraint(ctx, &table, &name),
        AlterTableAction::ExtendForeignKey {
            constraint,
            column,
            referenced_column,
        } => extend_foreign_key(ctx, &table, &constraint, &column, &referenced_column),
    }
}

fn add_column(
    ctx: &mut ExecutionContext,
    table: &Arc<Table>,
    definition: ColumnDefinition,
    constraints: Vec<TableConstraint>,
) -> SqlResult<()> {
    if table.find_column(&definition.name).is_some() {
        return Err(SqlError::ObjectExists(format!(
            "{}.{}",
            table.name(),
            definition.name
        )));
    }
    let is_primary = constraints
        .iter()
        .any(|c| matches!(c.kind, ConstraintKind::PrimaryKey(_)));
    let mut column = build_column(ctx, definition)?;
    if is_primary {
        column.nullable = false;
    }
    if column.is_identity && table.columns().iter().any(|c| c.is_identity) {
        return Err(SqlError::Unsupported(format!(
            "{} already has an identity column",
            table.name()
        )));
    }

    let fill = column.default.clone().unwrap_or(Value::Null);
    if !column.nullable && !column.is_identity && fill.is_null() && table.row_count() > 0 {
        return Err(SqlError::NotNullViolation {
            column: column.column_name,
            table: table.name().to_string(),
        });
    }

    let name = column.column_name.clone();
    let identity_type = column.is_identity.then(|| column.column_type.clone());
    let mut columns = table.columns().to_vec();
    columns.push(column);
    let map: Vec<Option<usize>> = (0..table.column_count()).map(Some).collect();

    let mut next_identity = 0i64;
    let convert = |mut values: Vec<Value>| -> SqlResult<Vec<Value>> {
        match &identity_type {
            Some(data_type) => {
                next_identity += 1;
                values.push(Value::BigInt(next_identity).convert_to_type(data_type)?);
            }
            None => values.push(fill.clone()),
        }
        Ok(values)
    };
    restructure(ctx, table, columns, &map, convert, constraints)?;
    info!("ALTER TABLE {} ADD COLUMN {}", table.name(), name);
    Ok(())
}

fn drop_column(ctx: &mut ExecutionContext, table: &Arc<Table>, name: &str) -> SqlResult<()> {
    let column = table.find_column(name).ok_or_else(|| {
        SqlError::UnresolvedColumn(vec![format!("{}.{}", table.name(), name)])
    })?;
    if table.column_count() == 1 {
        return Err(SqlError::Unsupported(format!(
            "cannot drop the only column of {}",
            table.name()
        )));
    }
    if let Some(dependent) = table
        .constraints()
        .iter()
        .find(|c| c.uses_column(table.name(), column))
    {
        return Err(SqlError::DependentObjects(format!(
            "{} uses {}.{}",
            dependent.name(),
            table.name(),
            name
        )));
    }

    let mut columns = table.columns().to_vec();
    columns.remove(column);
    let map: Vec<Option<usize>> = (0..table.column_count())
        .map(|i| match i.cmp(&column) {
            std::cmp::Ordering::Less => Some(i),
            std::cmp::Ordering::Equal => None,
            std::cmp::Ordering::Greater => Some(i - 1),
        })
        .collect();
    let convert = |mut values: Vec<Value>| -> SqlResult<Vec<Value>> {
        values.remove(column);
        Ok(values)
    };
    restructure(ctx, table, columns, &map, convert, Vec::new())?;
    info!("ALTER TABLE {} DROP COLUMN {}", table.name(), name);
    Ok(())
}

/// Rebuild `table` with a new column layout and swap it into the catalog.
/// `map[old]` is the new position of each old column, `None` when dropped.
/// Constraint cores are shared with other tables, so they are put back if
/// any step fails.
fn restructure(
    ctx: &mut ExecutionContext,
    table: &Arc<Table>,
    columns: Vec<ColumnInfo>,
    map: &[Option<usize>],
    convert: impl FnMut(Vec<Value>) -> SqlResult<Vec<Value>>,
    added: Vec<TableConstraint>,
) -> SqlResult<()> {
    let saved: Vec<(Constraint, ConstraintCore)> = table
        .constraints()
        .into_iter()
        .map(|c| {
            let core = c.core();
            (c, core)
        })
        .collect();
    match rebuild_table(ctx, table, columns, map, convert, added) {
        Ok((rebuilt, mains)) => {
            ctx.catalog.replace_table(rebuilt)?;
            for (parent, main) in mains {
                parent.add_constraint(main);
            }
            Ok(())
        }
        Err(e) => {
            for (constraint, core) in saved {
                constraint.restore_core(core);
            }
            Err(e)
        }
    }
}

type Rebuilt = (Arc<Table>, Vec<(Arc<Table>, Constraint)>);

fn rebuild_table(
    ctx: &mut ExecutionContext,
    table: &Arc<Table>,
    columns: Vec<ColumnInfo>,
    map: &[Option<usize>],
    mut convert: impl FnMut(Vec<Value>) -> SqlResult<Vec<Value>>,
    added: Vec<TableConstraint>,
) -> SqlResult<Rebuilt> {
    let catalog = ctx.catalog.clone();
    let rebuilt = Arc::new(Table::new(catalog.next_table_id(), table.name(), columns));
    let rows = table
        .row_iterator()
        .map(|row| convert(row.values))
        .collect::<SqlResult<Vec<_>>>()?;
    let row_count = rows.len();
    rebuilt.load_rows(rows);
    rebuilt.observe_identity(table.identity_position() - 1);
    if let Some(position) = rebuilt.columns().iter().position(|c| c.is_identity) {
        for row in rebuilt.row_iterator() {
            if let Some(value) = row.values[position].as_integer() {
                rebuilt.observe_identity(value);
            }
        }
    }

    for index in table.indexes() {
        let key: Option<Vec<usize>> = index.key_columns.iter().map(|&c| map[c]).collect();
        match key {
            Some(key) => {
                rebuilt.add_index(index.index_name, key, index.is_unique);
            }
            None => info!("dropped index {} with its column", index.index_name),
        }
    }

    let mut remapped: Vec<Constraint> = Vec::new();
    let mut constraints = Vec::new();
    for constraint in table.constraints() {
        if !remapped.iter().any(|c| c.shares_core(&constraint)) {
            constraint.remap_columns(table.name(), map)?;
            remapped.push(constraint.clone());
        }
        constraints.push(constraint.recompile(catalog.clone(), &rebuilt)?);
    }
    rebuilt.set_constraints(constraints);
    for constraint in rebuilt.constraints() {
        if constraint.constraint_type() == ConstraintType::Check {
            constraint.check_referenced_rows(ctx, &rebuilt)?;
        }
    }

    let mut mains = Vec::new();
    for definition in in_install_order(added) {
        let prepared = prepare_constraint(ctx, &rebuilt, definition)?;
        validate_existing_rows(ctx, &rebuilt, &prepared.constraint)?;
        mains.extend(install(&rebuilt, prepared));
    }
    info!(
        "rebuilt table {} with {} columns and {} rows",
        rebuilt.name(),
        rebuilt.column_count(),
        row_count
    );
    Ok((rebuilt, mains))
}

fn add_constraint(
    ctx: &mut ExecutionContext,
    table: &Arc<Table>,
    definition: TableConstraint,
) -> SqlResult<()> {
    if matches!(definition.kind, ConstraintKind::PrimaryKey(_)) && table.primary_key().is_some() {
        return Err(SqlError::ObjectExists(format!("primary key of {}", table.name())));
    }
    let prepared = prepare_constraint(ctx, table, definition)?;
    validate_existing_rows(ctx, table, &prepared.constraint)?;
    let name = prepared.constraint.name().to_string();
    if let Some((parent, main)) = install(table, prepared) {
        parent.add_constraint(main);
    }
    ctx.catalog.mark_schema_changed();
    info!("ALTER TABLE {} ADD CONSTRAINT {}", table.name(), name);
    Ok(())
}

/// Reject a new constraint that rows already in `table` violate
fn validate_existing_rows(
    ctx: &ExecutionContext,
    table: &Table,
    constraint: &Constraint,
) -> SqlResult<()> {
    if constraint.is_unique_kind() {
        if let Some(row) = find_duplicate(table, &constraint.core().main_columns) {
            return Err(constraint.get_exception(&row.values));
        }
    }
    constraint.check_referenced_rows(ctx, table)
}

fn drop_constraint(ctx: &mut ExecutionContext, table: &Arc<Table>, name: &str) -> SqlResult<()> {
    let catalog = &ctx.catalog;
    let constraint = table
        .get_constraint(name)
        .filter(|c| c.constraint_type() != ConstraintType::Main)
        .ok_or_else(|| SqlError::ObjectNotFound(name.to_string()))?;
    let core = constraint.core();

    match constraint.constraint_type() {
        ConstraintType::PrimaryKey | ConstraintType::Unique => {
            if let Some(referencing) = table.constraints().iter().find(|c| {
                c.constraint_type() == ConstraintType::Main
                    && c.core().main_index == core.main_index
            }) {
                return Err(SqlError::DependentObjects(format!(
                    "{} references {}",
                    referencing.name(),
                    name
                )));
            }
            table.remove_constraint(name);
            if let Some(index) = &core.main_index {
                table.remove_index(index);
            }
        }
        ConstraintType::ForeignKey => {
            table.remove_constraint(name);
            if let Some(index) = &core.ref_index {
                table.remove_index(index);
            }
            if let Some(parent) = catalog.find_table(&core.main_table) {
                parent.remove_constraint(name);
            }
        }
        ConstraintType::Check | ConstraintType::Main => {
            table.remove_constraint(name);
        }
    }
    catalog.mark_schema_changed();
    info!("ALTER TABLE {} DROP CONSTRAINT {}", table.name(), name);
    Ok(())
}

fn extend_foreign_key(
    ctx: &mut ExecutionContext,
    table: &Arc<Table>,
    name: &str,
    column: &str,
    referenced_column: &str,
) -> SqlResult<()> {
    let catalog = ctx.catalog.clone();
    let fk = table
        .get_constraint(name)
        .filter(|c| c.constraint_type() == ConstraintType::ForeignKey)
        .ok_or_else(|| SqlError::ObjectNotFound(name.to_string()))?;
    let saved = fk.core();
    let parent = catalog.get_table(&saved.main_table)?;
    let ref_column = key_columns(table, &[column.to_string()])?[0];
    let main_column = key_columns(&parent, &[referenced_column.to_string()])?[0];
    if saved.ref_columns.contains(&ref_column) {
        return Err(SqlError::Parse(format!("column {} is already in {}", column, name)));
    }
    check_comparable(table, ref_column, &parent, main_column)?;

    let mut main_columns = saved.main_columns.clone();
    main_columns.push(main_column);
    let main_index = parent
        .unique_index_for(&main_columns)
        .ok_or_else(|| missing_unique_key(&parent, &main_columns))?;
    let mut ref_columns = saved.ref_columns.clone();
    ref_columns.push(ref_column);
    let ref_index = catalog.generate_index_name();
    table.add_index(ref_index.as_str(), ref_columns, false);

    fk.extend_fk_index_columns(
        (ref_column, column.to_string()),
        (main_column, referenced_column.to_string()),
        main_index.index_name,
        ref_index.clone(),
    );
    if let Err(e) = fk.check_referenced_rows(ctx, table) {
        fk.restore_core(saved);
        table.remove_index(&ref_index);
        return Err(e);
    }
    if let Some(old_index) = &saved.ref_index {
        table.remove_index(old_index);
    }
    catalog.mark_schema_changed();
    Ok(())
}

fn drop_table(ctx: &mut ExecutionContext, drop: DropTableStatement) -> SqlResult<()> {
    let catalog = &ctx.catalog;
    let table = match catalog.find_table(&drop.table_name) {
        Some(table) => table,
        None if drop.if_exists => return Ok(()),
        None => return Err(SqlError::ObjectNotFound(drop.table_name)),
    };
    let constraints = table.constraints();
    for main in constraints
        .iter()
        .filter(|c| c.constraint_type() == ConstraintType::Main)
    {
        let core = main.core();
        if core.ref_table_name() != table.name() {
            return Err(SqlError::DependentObjects(format!(
                "{} on {} references {}",
                main.name(),
                core.ref_table_name(),
                table.name()
            )));
        }
    }
    for fk in constraints
        .iter()
        .filter(|c| c.constraint_type() == ConstraintType::ForeignKey)
    {
        let core = fk.core();
        if core.main_table != table.name() {
            if let Some(parent) = catalog.find_table(&core.main_table) {
                parent.remove_constraint(fk.name());
            }
        }
    }
    catalog.drop_table(&drop.table_name)?;
    Ok(())
}

fn prepare_constraint(
    ctx: &ExecutionContext,
    table: &Arc<Table>,
    definition: TableConstraint,
) -> SqlResult<PreparedConstraint> {
    let catalog = &ctx.catalog;
    let name = match definition.name {
        Some(name) => {
            if constraint_exists(catalog, table, &name) {
                return Err(SqlError::ObjectExists(name));
            }
            name
        }
        None => catalog.generate_constraint_name(),
    };
    match definition.kind {
        ConstraintKind::PrimaryKey(columns) => prepare_key(catalog, table, name, &columns, true),
        ConstraintKind::Unique(columns) => prepare_key(catalog, table, name, &columns, false),
        ConstraintKind::ForeignKey { columns, reference } => {
            prepare_foreign_key(ctx, table, name, &columns, reference)
        }
        ConstraintKind::Check(sql) => {
            let definition = CheckDefinition::compile(&name, &sql, table, catalog.clone())?;
            Ok(PreparedConstraint {
                constraint: Constraint::check(name, table.name(), definition),
                index: None,
                main: None,
            })
        }
    }
}

fn prepare_key(
    catalog: &Catalog,
    table: &Table,
    name: String,
    column_names: &[String],
    primary: bool,
) -> SqlResult<PreparedConstraint> {
    let columns = key_columns(table, column_names)?;
    let key_set: BTreeSet<usize> = columns.iter().copied().collect();
    if let Some(existing) = table.constraints().iter().find(|c| {
        c.is_unique_kind()
            && c.core().main_columns.iter().copied().collect::<BTreeSet<_>>() == key_set
    }) {
        return Err(SqlError::ObjectExists(format!(
            "{} already covers ({})",
            existing.name(),
            column_names.join(", ")
        )));
    }
    let index_name = catalog.generate_index_name();
    let core = ConstraintCore::for_key(
        table.name(),
        columns.clone(),
        column_names_of(table, &columns),
        index_name.as_str(),
    );
    let constraint = if primary {
        Constraint::primary_key(name, core)
    } else {
        Constraint::unique(name, core)
    };
    Ok(PreparedConstraint {
        constraint,
        index: Some((index_name, columns, true)),
        main: None,
    })
}

fn prepare_foreign_key(
    ctx: &ExecutionContext,
    table: &Arc<Table>,
    name: String,
    column_names: &[String],
    reference: ForeignKeyReference,
) -> SqlResult<PreparedConstraint> {
    let catalog = &ctx.catalog;
    let ref_columns = key_columns(table, column_names)?;
    let parent = if reference.table == table.name() {
        table.clone()
    } else {
        catalog.get_table(&reference.table)?
    };
    let main_columns = match &reference.columns {
        Some(names) => key_columns(&parent, names)?,
        None => parent
            .primary_key()
            .map(|pk| pk.core().main_columns)
            .ok_or_else(|| SqlError::ObjectNotFound(format!("primary key of {}", parent.name())))?,
    };
    if main_columns.len() != ref_columns.len() {
        return Err(SqlError::DegreeMismatch {
            expected: main_columns.len(),
            actual: ref_columns.len(),
        });
    }
    for (&r, &m) in ref_columns.iter().zip(main_columns.iter()) {
        check_comparable(table, r, &parent, m)?;
    }
    let main_index = parent
        .unique_index_for(&main_columns)
        .ok_or_else(|| missing_unique_key(&parent, &main_columns))?;

    let ref_index = catalog.generate_index_name();
    let core = ConstraintCore {
        main_table: parent.name().to_string(),
        main_column_names: column_names_of(&parent, &main_columns),
        main_columns,
        main_index: Some(main_index.index_name),
        ref_table: Some(table.name().to_string()),
        ref_column_names: column_names_of(table, &ref_columns),
        ref_columns: ref_columns.clone(),
        ref_index: Some(ref_index.clone()),
        delete_action: reference.on_delete,
        update_action: reference.on_update,
        match_type: reference.match_type.unwrap_or(ctx.config.default_match_type),
    };
    let (fk, main) = Constraint::foreign_key(name, core);
    Ok(PreparedConstraint {
        constraint: fk,
        index: Some((ref_index, ref_columns, false)),
        main: Some((parent, main)),
    })
}

/// Create the constraint's index and register it. Returns the MAIN half
/// of a foreign key, for the caller to register once the table is in place.
fn install(table: &Table, prepared: PreparedConstraint) -> Option<(Arc<Table>, Constraint)> {
    if let Some((index_name, columns, unique)) = prepared.index {
        table.add_index(index_name, columns, unique);
    }
    info!(
        "constraint {} on {}: {}",
        prepared.constraint.name(),
        table.name(),
        prepared.constraint.get_sql()
    );
    table.add_constraint(prepared.constraint);
    prepared.main
}

fn constraint_exists(catalog: &Catalog, table: &Table, name: &str) -> bool {
    table.get_constraint(name).is_some()
        || catalog
            .list_tables()
            .iter()
            .any(|t| t.get_constraint(name).is_some())
}

/// Positions of key columns; each column may appear once
fn key_columns(table: &Table, names: &[String]) -> SqlResult<Vec<usize>> {
    let columns = table.column_indexes(names)?;
    let mut seen = HashSet::new();
    if let Some(duplicate) = names.iter().find(|n| !seen.insert(n.as_str())) {
        return Err(SqlError::Parse(format!(
            "column {} appears twice in a key",
            duplicate
        )));
    }
    Ok(columns)
}

fn column_names_of(table: &Table, columns: &[usize]) -> Vec<String> {
    columns
        .iter()
        .map(|&c| table.column(c).column_name.clone())
        .collect()
}

fn check_comparable(
    table: &Table,
    column: usize,
    parent: &Table,
    main_column: usize,
) -> SqlResult<()> {
    let ref_type = &table.column(column).column_type;
    let main_type = &parent.column(main_column).column_type;
    if ref_type.is_comparable_with(main_type) {
        Ok(())
    } else {
        Err(SqlError::type_mismatch(format!(
            "{}.{} {} cannot reference {}.{} {}",
            table.name(),
            table.column(column).column_name,
            ref_type,
            parent.name(),
            parent.column(main_column).column_name,
            main_type
        )))
    }
}

fn missing_unique_key(parent: &Table, columns: &[usize]) -> SqlError {
    SqlError::ObjectNotFound(format!(
        "unique constraint on {} ({})",
        parent.name(),
        column_names_of(parent, columns).join(", ")
    ))
}

/// A row whose key repeats an earlier row's. Keys with a NULL never clash.
fn find_duplicate(table: &Table, columns: &[usize]) -> Option<Row> {
    let mut seen = BTreeSet::new();
    table.row_iterator().find(|row| {
        let key = row.key(columns);
        !key.iter().any(Value::is_null) && !seen.insert(key)
    })
}
