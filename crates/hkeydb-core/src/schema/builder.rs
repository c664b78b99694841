use crate::{
    MAX_KEY_COLUMNS,
    error::InternalError,
    rowtype::{RowType, RowTypeId},
    schema::{
        Column, Group, GroupId, Index, IndexColumn, IndexId, PRIMARY_INDEX_NAME, Schema, Sequence,
        Table, TableId,
    },
    value::ColumnType,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::atomic::AtomicU32,
};

///
/// TableDef
///
/// Declarative table definition. Parents must be declared before children.
///

#[derive(Clone, Debug)]
pub struct TableDef {
    name: String,
    columns: Vec<Column>,
    key: Vec<String>,
    parent: Option<(String, Vec<String>)>,
}

impl TableDef {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            key: Vec::new(),
            parent: None,
        }
    }

    #[must_use]
    pub fn column(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        self.columns.push(Column {
            name: name.into(),
            ty,
            nullable: false,
        });
        self
    }

    #[must_use]
    pub fn nullable_column(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        self.columns.push(Column {
            name: name.into(),
            ty,
            nullable: true,
        });
        self
    }

    #[must_use]
    pub fn key(mut self, columns: &[&str]) -> Self {
        self.key = columns.iter().map(ToString::to_string).collect();
        self
    }

    /// Nest this table under `parent`; `join` names this table's columns
    /// holding the parent key, in parent key order.
    #[must_use]
    pub fn parent(mut self, parent: impl Into<String>, join: &[&str]) -> Self {
        self.parent = Some((parent.into(), join.iter().map(ToString::to_string).collect()));
        self
    }
}

///
/// IndexDef
///

#[derive(Clone, Debug)]
pub struct IndexDef {
    name: String,
    leaf: String,
    columns: Vec<(String, String)>,
    unique: bool,
}

impl IndexDef {
    #[must_use]
    pub fn new(name: impl Into<String>, leaf: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            leaf: leaf.into(),
            columns: Vec::new(),
            unique: false,
        }
    }

    /// Add a column of the leaf table or one of its ancestors.
    #[must_use]
    pub fn column(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.columns.push((table.into(), column.into()));
        self
    }

    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

///
/// SchemaBuilder
///

#[derive(Debug, Default)]
pub struct SchemaBuilder {
    tables: Vec<TableDef>,
    indexes: Vec<IndexDef>,
    sequences: Vec<Sequence>,
}

impl SchemaBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn table(mut self, def: TableDef) -> Self {
        self.tables.push(def);
        self
    }

    #[must_use]
    pub fn index(mut self, def: IndexDef) -> Self {
        self.indexes.push(def);
        self
    }

    #[must_use]
    pub fn sequence(mut self, name: impl Into<String>, start: i64, increment: i64) -> Self {
        self.sequences.push(Sequence {
            name: name.into(),
            start,
            increment,
        });
        self
    }

    pub fn build(self) -> Result<Schema, InternalError> {
        let mut tables: Vec<Table> = Vec::with_capacity(self.tables.len());
        let mut groups: Vec<Group> = Vec::new();
        let mut indexes: Vec<Index> = Vec::new();

        for def in &self.tables {
            let table = build_table(def, &tables, &mut groups, &mut indexes)?;
            if let Some(parent) = table.parent {
                tables[parent.0 as usize].children.push(table.id);
            }
            tables.push(table);
        }

        for def in &self.indexes {
            let index = build_index(def, &tables, &indexes)?;
            indexes.push(index);
        }

        link_indexes(&mut tables, &indexes);
        let sequences = build_sequences(self.sequences)?;

        // Row types: tables, then hkeys, then indexes; derived types follow.
        let mut next = 0u32;
        let mut mint = || {
            let id = RowTypeId::new(next);
            next += 1;
            id
        };

        let table_row_types = tables
            .iter()
            .map(|table| {
                let fields = table.columns.iter().map(|column| column.ty).collect();
                RowType::table(mint(), table.table_ref(), fields)
            })
            .collect::<Vec<_>>();
        let hkey_row_types = tables
            .iter()
            .map(|table| {
                let fields = table
                    .ancestors
                    .iter()
                    .flat_map(|ancestor| {
                        let ancestor = &tables[ancestor.0 as usize];
                        ancestor.key.iter().map(|&pos| ancestor.columns[pos].ty)
                    })
                    .collect();
                RowType::hkey(mint(), table.table_ref(), fields)
            })
            .collect::<Vec<_>>();
        let index_row_types = indexes
            .iter()
            .map(|index| {
                let fields = index
                    .columns
                    .iter()
                    .map(|column| tables[column.table.0 as usize].columns[column.position].ty)
                    .collect();
                let leaf = tables[index.leaf.0 as usize].table_ref();
                RowType::index(mint(), index.id, leaf, fields)
            })
            .collect::<Vec<_>>();

        Ok(Schema {
            tables,
            indexes,
            groups,
            sequences,
            table_row_types,
            hkey_row_types,
            index_row_types,
            next_row_type: AtomicU32::new(next),
        })
    }
}

fn build_table(
    def: &TableDef,
    tables: &[Table],
    groups: &mut Vec<Group>,
    indexes: &mut Vec<Index>,
) -> Result<Table, InternalError> {
    if tables.iter().any(|table| table.name == def.name) {
        return Err(InternalError::schema_invariant(format!(
            "duplicate table '{}'",
            def.name
        )));
    }
    let mut seen = BTreeSet::new();
    for column in &def.columns {
        if !seen.insert(column.name.as_str()) {
            return Err(InternalError::schema_invariant(format!(
                "duplicate column '{}.{}'",
                def.name, column.name
            )));
        }
    }

    if def.key.is_empty() {
        return Err(InternalError::schema_invariant(format!(
            "table '{}' declares no key columns",
            def.name
        )));
    }
    if def.key.len() > MAX_KEY_COLUMNS {
        return Err(InternalError::schema_invariant(format!(
            "table '{}' declares {} key columns (limit {MAX_KEY_COLUMNS})",
            def.name,
            def.key.len()
        )));
    }
    let key = resolve_columns(def, &def.key)?;
    if let Some(&nullable) = key.iter().find(|&&pos| def.columns[pos].nullable) {
        return Err(InternalError::schema_invariant(format!(
            "key column '{}.{}' must not be nullable",
            def.name, def.columns[nullable].name
        )));
    }

    let id = TableId(u32::try_from(tables.len()).map_err(|_| {
        InternalError::schema_invariant("table count exceeds the table id space")
    })?);

    let (parent, join, depth, group, mut ancestors) = match &def.parent {
        None => {
            let group = GroupId(u32::try_from(groups.len()).map_err(|_| {
                InternalError::schema_invariant("group count exceeds the group id space")
            })?);
            groups.push(Group {
                id: group,
                name: def.name.clone(),
                root: id,
            });
            (None, Vec::new(), 0, group, Vec::new())
        }
        Some((parent_name, join_names)) => {
            let parent = tables
                .iter()
                .find(|table| &table.name == parent_name)
                .ok_or_else(|| {
                    InternalError::schema_invariant(format!(
                        "table '{}' names unknown parent '{parent_name}'",
                        def.name
                    ))
                })?;
            if join_names.len() != parent.key.len() {
                return Err(InternalError::schema_invariant(format!(
                    "table '{}' joins {} columns to parent '{}' with {} key columns",
                    def.name,
                    join_names.len(),
                    parent.name,
                    parent.key.len()
                )));
            }
            let join = resolve_columns(def, join_names)?;
            (
                Some(parent.id),
                join,
                parent.depth + 1,
                parent.group,
                parent.ancestors.clone(),
            )
        }
    };
    ancestors.push(id);

    let primary = IndexId(u32::try_from(indexes.len()).map_err(|_| {
        InternalError::schema_invariant("index count exceeds the index id space")
    })?);
    indexes.push(Index {
        id: primary,
        name: PRIMARY_INDEX_NAME.to_string(),
        leaf: id,
        columns: key
            .iter()
            .map(|&position| IndexColumn {
                table: id,
                position,
            })
            .collect(),
        unique: true,
        primary: true,
        span: vec![id],
    });

    Ok(Table {
        id,
        name: def.name.clone(),
        columns: def.columns.clone(),
        key,
        parent,
        join,
        depth,
        group,
        ancestors,
        children: Vec::new(),
        primary,
        covering_indexes: Vec::new(),
        cascade_columns: Vec::new(),
    })
}

fn resolve_columns(def: &TableDef, names: &[String]) -> Result<Vec<usize>, InternalError> {
    names
        .iter()
        .map(|name| {
            def.columns
                .iter()
                .position(|column| &column.name == name)
                .ok_or_else(|| {
                    InternalError::schema_invariant(format!(
                        "unknown column '{}.{name}'",
                        def.name
                    ))
                })
        })
        .collect()
}

fn build_index(def: &IndexDef, tables: &[Table], existing: &[Index]) -> Result<Index, InternalError> {
    let leaf = tables
        .iter()
        .find(|table| table.name == def.leaf)
        .ok_or_else(|| {
            InternalError::schema_invariant(format!(
                "index '{}' names unknown table '{}'",
                def.name, def.leaf
            ))
        })?;
    if def.name == PRIMARY_INDEX_NAME
        || existing
            .iter()
            .any(|index| index.leaf == leaf.id && index.name == def.name)
    {
        return Err(InternalError::schema_invariant(format!(
            "duplicate index '{}.{}'",
            leaf.name, def.name
        )));
    }
    if def.columns.is_empty() {
        return Err(InternalError::schema_invariant(format!(
            "index '{}.{}' declares no columns",
            leaf.name, def.name
        )));
    }

    let mut columns = Vec::with_capacity(def.columns.len());
    let mut shallowest = leaf.depth;
    for (table_name, column_name) in &def.columns {
        let table = tables
            .iter()
            .find(|table| &table.name == table_name)
            .ok_or_else(|| {
                InternalError::schema_invariant(format!(
                    "index '{}.{}' names unknown table '{table_name}'",
                    leaf.name, def.name
                ))
            })?;
        if !table.is_ancestor_or_self_of(leaf) {
            return Err(InternalError::schema_invariant(format!(
                "index '{}.{}' column '{table_name}.{column_name}' is not on the leaf or an ancestor",
                leaf.name, def.name
            )));
        }
        let position = table.column_position(column_name).ok_or_else(|| {
            InternalError::schema_invariant(format!(
                "unknown column '{table_name}.{column_name}'"
            ))
        })?;
        shallowest = shallowest.min(table.depth);
        columns.push(IndexColumn {
            table: table.id,
            position,
        });
    }

    let id = IndexId(u32::try_from(existing.len()).map_err(|_| {
        InternalError::schema_invariant("index count exceeds the index id space")
    })?);

    Ok(Index {
        id,
        name: def.name.clone(),
        leaf: leaf.id,
        columns,
        unique: def.unique,
        primary: false,
        span: leaf.ancestors[shallowest..].to_vec(),
    })
}

// Record, per table, the indexes holding its entries and the columns that
// descendant index entries read.
fn link_indexes(tables: &mut [Table], indexes: &[Index]) {
    for index in indexes {
        for table in &index.span {
            tables[table.0 as usize].covering_indexes.push(index.id);
        }
        for column in &index.columns {
            if column.table == index.leaf {
                continue;
            }
            let cascade = &mut tables[column.table.0 as usize].cascade_columns;
            if !cascade.contains(&column.position) {
                cascade.push(column.position);
            }
        }
    }

    for table in tables.iter_mut() {
        table.cascade_columns.sort_unstable();
    }
}

fn build_sequences(defs: Vec<Sequence>) -> Result<BTreeMap<String, Sequence>, InternalError> {
    let mut sequences = BTreeMap::new();
    for sequence in defs {
        if sequence.increment == 0 {
            return Err(InternalError::schema_invariant(format!(
                "sequence '{}' has a zero increment",
                sequence.name
            )));
        }
        if sequences.contains_key(&sequence.name) {
            return Err(InternalError::schema_invariant(format!(
                "duplicate sequence '{}'",
                sequence.name
            )));
        }
        sequences.insert(sequence.name.clone(), sequence);
    }

    Ok(sequences)
}
