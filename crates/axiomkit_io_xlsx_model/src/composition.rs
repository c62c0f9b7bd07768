//! Composition resolver: maps a schema onto sheets, columns and links.
//!
//! The resulting [`SpecLayoutPlan`] is deterministic for a given schema and is
//! shared read-only by [`crate::writer::export`] and [`crate::reader::import`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::conf::{C_SEP_NESTED_HEADER, C_SUFFIX_LINK_COUNT, N_NCOLS_EXCEL_MAX};
use crate::error::SchemaError;
use crate::schema::{
    EnumFieldKind, SpecFieldDescriptor, SpecRecordSchema, SpecSchema, SpecSchemaDefinition,
};
use crate::util::{derive_table_name, sanitize_sheet_name};

////////////////////////////////////////////////////////////////////////////////
// #region PlanTypes

/// Overall mapping strategy, decided on the root record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumComposition {
    /// Root has only scalar/enumeration fields: one sheet, one data row.
    SingleModel,
    /// Root wraps exactly one collection field: one row per element.
    RootCollection,
    /// General case: one sheet per record type reached through collections.
    Collection,
}

/// What a column holds.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumColumnKind {
    /// Scalar or enumeration leaf.
    Value(SpecFieldDescriptor),
    /// Number of child rows linked by `plan.links[link]`.
    LinkCount { link: usize },
}

/// One column of a sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecColumnPlan {
    /// Header text.
    pub header: String,
    /// Field names from the sheet record to the leaf.
    pub path: Vec<String>,
    /// Record type declaring the leaf field (key prefix of number format
    /// overrides).
    pub record_name: String,
    pub kind: EnumColumnKind,
}

impl SpecColumnPlan {
    /// Field of a value column.
    pub fn value_field(&self) -> Option<&SpecFieldDescriptor> {
        match &self.kind {
            EnumColumnKind::Value(field) => Some(field),
            EnumColumnKind::LinkCount { .. } => None,
        }
    }

    /// Key of the number format override map, `"<RecordType>.<field>"`.
    pub fn format_key(&self) -> String {
        let c_leaf = self.path.last().map(String::as_str).unwrap_or_default();
        format!("{}.{c_leaf}", self.record_name)
    }
}

/// Parent-to-child row-order association realizing one collection field.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecLinkPlan {
    /// Owning sheet; `None` when the parent is an implicit root.
    pub parent_sheet: Option<usize>,
    pub child_sheet: usize,
    /// Field names from the parent sheet record to the collection field.
    pub field_path: Vec<String>,
    pub field: SpecFieldDescriptor,
    /// Link-count column on the parent sheet.
    pub count_column: Option<u16>,
}

impl SpecLinkPlan {
    /// Dotted field path, e.g. `address.items`.
    pub fn field_label(&self) -> String {
        self.field_path.join(".")
    }
}

/// One sheet of the document.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecSheetPlan {
    pub sheet_name: String,
    pub table_name: String,
    pub record: Arc<SpecRecordSchema>,
    pub columns: Vec<SpecColumnPlan>,
    /// Outgoing links in column order.
    pub child_links: Vec<usize>,
    /// Incoming links.
    pub parent_links: Vec<usize>,
}

impl SpecSheetPlan {
    pub fn headers(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.header.as_str()).collect()
    }
}

/// Immutable layout decision for one schema.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecLayoutPlan {
    pub composition: EnumComposition,
    pub schema: SpecSchema,
    /// Sheet of the root record; `None` for an implicit root.
    pub root_sheet: Option<usize>,
    /// Sheets in dependency order (parents first).
    pub sheets: Vec<SpecSheetPlan>,
    pub links: Vec<SpecLinkPlan>,
    /// Links owned by the implicit root, in field order.
    pub root_links: Vec<usize>,
}

impl SpecLayoutPlan {
    pub fn sheet_by_name(&self, name: &str) -> Option<&SpecSheetPlan> {
        self.sheets.iter().find(|s| s.sheet_name == name)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.sheet_name.as_str()).collect()
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Compose

/// Classify the root record type.
pub fn derive_composition(root: &SpecRecordSchema) -> EnumComposition {
    let if_single_model = root.fields.iter().all(|f| {
        !matches!(
            f.kind,
            EnumFieldKind::NestedRecord(_) | EnumFieldKind::CollectionOfRecord(_)
        )
    });
    if if_single_model {
        return EnumComposition::SingleModel;
    }
    if root.fields.len() == 1 && matches!(root.fields[0].kind, EnumFieldKind::CollectionOfRecord(_)) {
        return EnumComposition::RootCollection;
    }
    EnumComposition::Collection
}

/// Build the layout plan of a schema.
pub fn compose(schema: &SpecSchema) -> Result<SpecLayoutPlan, SchemaError> {
    let root = Arc::clone(schema.root());
    let composition = derive_composition(&root);

    let mut planner = LayoutPlanner::default();
    planner.plan_sheet(&root)?;

    // The root sheet is implicit when it would carry nothing but link counts
    // for sheets that no other record feeds.
    let if_root_implicit = root
        .fields
        .iter()
        .all(|f| matches!(f.kind, EnumFieldKind::CollectionOfRecord(_)))
        && planner
            .l_links
            .iter()
            .filter(|link| link.parent_sheet == Some(0))
            .all(|link| {
                planner
                    .l_links
                    .iter()
                    .filter(|other| other.child_sheet == link.child_sheet)
                    .count()
                    == 1
            });

    let plan = planner.finish(schema.clone(), composition, if_root_implicit)?;
    tracing::info!(
        root = %root.name,
        composition = ?plan.composition,
        n_sheets = plan.sheets.len(),
        if_root_implicit,
        "layout plan composed"
    );
    Ok(plan)
}

/// Build the schema from its definition, then compose it.
pub fn compose_definition(
    definition: &SpecSchemaDefinition,
    root: &str,
) -> Result<SpecLayoutPlan, SchemaError> {
    compose(&SpecSchema::build(definition, root)?)
}

#[derive(Default)]
struct LayoutPlanner {
    /// Record type name -> discovery index.
    dict_sheet_by_record: IndexMap<String, usize>,
    l_sheets: Vec<SpecSheetPlan>,
    l_links: Vec<SpecLinkPlan>,
}

impl LayoutPlanner {
    fn plan_sheet(&mut self, record: &Arc<SpecRecordSchema>) -> Result<usize, SchemaError> {
        if let Some(n_idx) = self.dict_sheet_by_record.get(&record.name) {
            return Ok(*n_idx);
        }
        let n_idx = self.l_sheets.len();
        self.dict_sheet_by_record.insert(record.name.clone(), n_idx);
        self.l_sheets.push(SpecSheetPlan {
            sheet_name: sanitize_sheet_name(record.display_name(), "_"),
            table_name: String::new(),
            record: Arc::clone(record),
            columns: Vec::new(),
            child_links: Vec::new(),
            parent_links: Vec::new(),
        });

        let mut l_columns = Vec::new();
        self.plan_columns(n_idx, record, None, &[], &mut l_columns)?;
        self.l_sheets[n_idx].columns = l_columns;
        Ok(n_idx)
    }

    fn plan_columns(
        &mut self,
        n_sheet: usize,
        record: &SpecRecordSchema,
        header_prefix: Option<&str>,
        path_prefix: &[String],
        l_columns: &mut Vec<SpecColumnPlan>,
    ) -> Result<(), SchemaError> {
        for field in &record.fields {
            let c_header = match header_prefix {
                Some(c_prefix) => format!("{c_prefix}{C_SEP_NESTED_HEADER}{}", field.display_alias),
                None => field.display_alias.clone(),
            };
            let mut l_path = path_prefix.to_vec();
            l_path.push(field.name.clone());

            match &field.kind {
                EnumFieldKind::Scalar(_) | EnumFieldKind::Enumeration(_) => {
                    l_columns.push(SpecColumnPlan {
                        header: c_header,
                        path: l_path,
                        record_name: record.name.clone(),
                        kind: EnumColumnKind::Value(field.clone()),
                    });
                }
                EnumFieldKind::NestedRecord(nested) => {
                    self.plan_columns(n_sheet, nested, Some(&c_header), &l_path, l_columns)?;
                }
                EnumFieldKind::CollectionOfRecord(element) => {
                    let n_child = self.plan_sheet(element)?;
                    let n_link = self.l_links.len();
                    self.l_links.push(SpecLinkPlan {
                        parent_sheet: Some(n_sheet),
                        child_sheet: n_child,
                        field_path: l_path.clone(),
                        field: field.clone(),
                        count_column: None,
                    });
                    l_columns.push(SpecColumnPlan {
                        header: format!("{c_header}{C_SUFFIX_LINK_COUNT}"),
                        path: l_path,
                        record_name: record.name.clone(),
                        kind: EnumColumnKind::LinkCount { link: n_link },
                    });
                }
            }
        }
        Ok(())
    }

    fn finish(
        mut self,
        schema: SpecSchema,
        composition: EnumComposition,
        if_root_implicit: bool,
    ) -> Result<SpecLayoutPlan, SchemaError> {
        let set_sheets_kept: BTreeSet<usize> = if if_root_implicit {
            (1..self.l_sheets.len()).collect()
        } else {
            (0..self.l_sheets.len()).collect()
        };

        let l_order = derive_topological_order(&self.l_sheets, &self.l_links, &set_sheets_kept);
        let dict_new_idx: BTreeMap<usize, usize> = l_order
            .iter()
            .enumerate()
            .map(|(n_new, n_old)| (*n_old, n_new))
            .collect();

        for link in &mut self.l_links {
            link.child_sheet = dict_new_idx
                .get(&link.child_sheet)
                .copied()
                .unwrap_or(link.child_sheet);
            link.parent_sheet = link
                .parent_sheet
                .and_then(|n_old| dict_new_idx.get(&n_old).copied());
        }

        let mut l_sheets_old: Vec<Option<SpecSheetPlan>> =
            self.l_sheets.into_iter().map(Some).collect();
        let mut l_sheets: Vec<SpecSheetPlan> = Vec::with_capacity(l_order.len());
        for n_old in &l_order {
            if let Some(sheet) = l_sheets_old[*n_old].take() {
                l_sheets.push(sheet);
            }
        }

        let mut dict_owner_by_name: BTreeMap<String, String> = BTreeMap::new();
        let mut set_table_names = BTreeSet::new();
        for (n_sheet, sheet) in l_sheets.iter_mut().enumerate() {
            if let Some(c_first) =
                dict_owner_by_name.insert(sheet.sheet_name.to_lowercase(), sheet.record.name.clone())
            {
                return Err(SchemaError::SheetNameCollision {
                    sheet: sheet.sheet_name.clone(),
                    first: c_first,
                    second: sheet.record.name.clone(),
                });
            }
            if sheet.columns.len() > N_NCOLS_EXCEL_MAX {
                return Err(SchemaError::TooManyColumns {
                    sheet: sheet.sheet_name.clone(),
                    n_cols: sheet.columns.len(),
                });
            }
            let mut set_headers = BTreeSet::new();
            for (n_col, column) in sheet.columns.iter().enumerate() {
                if !set_headers.insert(column.header.as_str()) {
                    return Err(SchemaError::ColumnNameCollision {
                        sheet: sheet.sheet_name.clone(),
                        column: column.header.clone(),
                    });
                }
                if let EnumColumnKind::LinkCount { link } = column.kind {
                    sheet.child_links.push(link);
                    // bounded by N_NCOLS_EXCEL_MAX above
                    self.l_links[link].count_column = u16::try_from(n_col).ok();
                }
            }
            sheet.parent_links = self
                .l_links
                .iter()
                .enumerate()
                .filter(|(_, link)| link.child_sheet == n_sheet)
                .map(|(n_link, _)| n_link)
                .collect();
            sheet.table_name = derive_table_name(&sheet.sheet_name, &mut set_table_names);
            tracing::debug!(
                sheet = %sheet.sheet_name,
                record = %sheet.record.name,
                n_cols = sheet.columns.len(),
                n_links_out = sheet.child_links.len(),
                "sheet planned"
            );
        }

        let root_links = self
            .l_links
            .iter()
            .enumerate()
            .filter(|(_, link)| link.parent_sheet.is_none())
            .map(|(n_link, _)| n_link)
            .collect();
        let root_sheet = (!if_root_implicit).then_some(0);

        Ok(SpecLayoutPlan {
            composition,
            schema,
            root_sheet,
            sheets: l_sheets,
            links: self.l_links,
            root_links,
        })
    }
}

/// Kahn's algorithm over the kept sheets, ties broken by discovery index.
fn derive_topological_order(
    l_sheets: &[SpecSheetPlan],
    l_links: &[SpecLinkPlan],
    set_sheets_kept: &BTreeSet<usize>,
) -> Vec<usize> {
    let mut dict_in_degree: BTreeMap<usize, usize> =
        set_sheets_kept.iter().map(|n_idx| (*n_idx, 0)).collect();
    let mut set_edges = BTreeSet::new();
    for link in l_links {
        if let Some(n_parent) = link.parent_sheet
            && set_sheets_kept.contains(&n_parent)
            && set_edges.insert((n_parent, link.child_sheet))
            && let Some(n_deg) = dict_in_degree.get_mut(&link.child_sheet)
        {
            *n_deg += 1;
        }
    }

    let mut set_ready: BTreeSet<usize> = dict_in_degree
        .iter()
        .filter(|(_, n_deg)| **n_deg == 0)
        .map(|(n_idx, _)| *n_idx)
        .collect();
    let mut l_order = Vec::with_capacity(l_sheets.len());
    while let Some(n_idx) = set_ready.pop_first() {
        l_order.push(n_idx);
        for (n_parent, n_child) in &set_edges {
            if *n_parent != n_idx {
                continue;
            }
            if let Some(n_deg) = dict_in_degree.get_mut(n_child) {
                *n_deg -= 1;
                if *n_deg == 0 {
                    set_ready.insert(*n_child);
                }
            }
        }
    }
    l_order
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        EnumTypeDefinition, SpecFieldDefinition, SpecRecordDefinition, SpecSchemaDefinition,
    };

    fn field(name: &str, ty: EnumTypeDefinition) -> SpecFieldDefinition {
        SpecFieldDefinition::new(name, ty)
    }

    fn derive_invoice_definition() -> SpecSchemaDefinition {
        SpecSchemaDefinition::new()
            .record(
                SpecRecordDefinition::new("Address")
                    .field(field("street", EnumTypeDefinition::text()))
                    .field(field("city", EnumTypeDefinition::text())),
            )
            .record(
                SpecRecordDefinition::new("Line")
                    .title("Lines")
                    .field(field("sku", EnumTypeDefinition::text()))
                    .field(field("qty", EnumTypeDefinition::integer())),
            )
            .record(
                SpecRecordDefinition::new("Invoice")
                    .field(field("number", EnumTypeDefinition::text()))
                    .field(field("billing", EnumTypeDefinition::record("Address")).alias("bill"))
                    .field(field(
                        "lines",
                        EnumTypeDefinition::list(EnumTypeDefinition::record("Line")),
                    ))
                    .field(field("paid", EnumTypeDefinition::boolean())),
            )
    }

    #[test]
    fn test_collection_plan_flattens_nested_and_counts_links() {
        let plan = compose_definition(&derive_invoice_definition(), "Invoice").unwrap();

        assert_eq!(plan.composition, EnumComposition::Collection);
        assert_eq!(plan.sheet_names(), vec!["Invoice", "Lines"]);
        assert_eq!(plan.root_sheet, Some(0));
        assert_eq!(
            plan.sheets[0].headers(),
            vec!["number", "bill.street", "bill.city", "lines count", "paid"]
        );
        assert_eq!(plan.sheets[0].columns[1].path, vec!["billing", "street"]);
        assert_eq!(plan.sheets[0].columns[1].format_key(), "Address.street");
        assert_eq!(plan.sheets[1].headers(), vec!["sku", "qty"]);

        let link = &plan.links[0];
        assert_eq!(link.parent_sheet, Some(0));
        assert_eq!(link.child_sheet, 1);
        assert_eq!(link.count_column, Some(3));
        assert_eq!(plan.sheets[0].child_links, vec![0]);
        assert_eq!(plan.sheets[1].parent_links, vec![0]);
    }

    #[test]
    fn test_compose_is_deterministic() {
        let definition = derive_invoice_definition();
        assert_eq!(
            compose_definition(&definition, "Invoice").unwrap(),
            compose_definition(&definition, "Invoice").unwrap()
        );
    }

    #[test]
    fn test_single_model_and_root_collection() {
        let definition = derive_invoice_definition().record(
            SpecRecordDefinition::new("LineList").field(field(
                "items",
                EnumTypeDefinition::list(EnumTypeDefinition::record("Line")),
            )),
        );

        let plan_single = compose_definition(&definition, "Address").unwrap();
        assert_eq!(plan_single.composition, EnumComposition::SingleModel);
        assert_eq!(plan_single.sheet_names(), vec!["Address"]);

        let plan_wrapper = compose_definition(&definition, "LineList").unwrap();
        assert_eq!(plan_wrapper.composition, EnumComposition::RootCollection);
        assert_eq!(plan_wrapper.root_sheet, None);
        assert_eq!(plan_wrapper.sheet_names(), vec!["Lines"]);
        assert_eq!(plan_wrapper.root_links, vec![0]);
        assert_eq!(plan_wrapper.links[0].parent_sheet, None);
        assert_eq!(plan_wrapper.links[0].count_column, None);
    }

    #[test]
    fn test_sheet_order_is_topological() {
        // Root discovers `Tag` before `Post`, yet `Post` also feeds `Tag`.
        let definition = SpecSchemaDefinition::new()
            .record(SpecRecordDefinition::new("Tag").field(field("label", EnumTypeDefinition::text())))
            .record(
                SpecRecordDefinition::new("Post")
                    .field(field("title", EnumTypeDefinition::text()))
                    .field(field("tags", EnumTypeDefinition::list(EnumTypeDefinition::record("Tag")))),
            )
            .record(
                SpecRecordDefinition::new("Blog")
                    .field(field("name", EnumTypeDefinition::text()))
                    .field(field("tags", EnumTypeDefinition::list(EnumTypeDefinition::record("Tag"))))
                    .field(field("posts", EnumTypeDefinition::list(EnumTypeDefinition::record("Post")))),
            );

        let plan = compose_definition(&definition, "Blog").unwrap();
        assert_eq!(plan.sheet_names(), vec!["Blog", "Post", "Tag"]);
        let tag = plan.sheet_by_name("Tag").unwrap();
        assert_eq!(tag.parent_links.len(), 2);
    }

    #[test]
    fn test_shared_child_sheet_keeps_explicit_root() {
        let definition = SpecSchemaDefinition::new()
            .record(SpecRecordDefinition::new("Tag").field(field("label", EnumTypeDefinition::text())))
            .record(
                SpecRecordDefinition::new("Post")
                    .field(field("tags", EnumTypeDefinition::list(EnumTypeDefinition::record("Tag")))),
            )
            .record(
                SpecRecordDefinition::new("Feed")
                    .field(field("tags", EnumTypeDefinition::list(EnumTypeDefinition::record("Tag"))))
                    .field(field("posts", EnumTypeDefinition::list(EnumTypeDefinition::record("Post")))),
            );

        let plan = compose_definition(&definition, "Feed").unwrap();
        assert_eq!(plan.root_sheet, Some(0));
        assert_eq!(plan.sheets[0].headers(), vec!["tags count", "posts count"]);
    }

    #[test]
    fn test_sheet_name_collision_is_rejected() {
        let definition = SpecSchemaDefinition::new()
            .record(SpecRecordDefinition::new("A").title("Data").field(field("x", EnumTypeDefinition::text())))
            .record(SpecRecordDefinition::new("B").title("data").field(field("y", EnumTypeDefinition::text())))
            .record(
                SpecRecordDefinition::new("Root")
                    .field(field("a", EnumTypeDefinition::list(EnumTypeDefinition::record("A"))))
                    .field(field("b", EnumTypeDefinition::list(EnumTypeDefinition::record("B")))),
            );

        assert!(matches!(
            compose_definition(&definition, "Root"),
            Err(SchemaError::SheetNameCollision { .. })
        ));
    }

    #[test]
    fn test_column_name_collision_is_rejected() {
        let definition = SpecSchemaDefinition::new()
            .record(SpecRecordDefinition::new("Inner").field(field("b", EnumTypeDefinition::text())))
            .record(
                SpecRecordDefinition::new("Outer")
                    .field(field("a", EnumTypeDefinition::record("Inner")))
                    .field(field("ab", EnumTypeDefinition::text()).alias("a.b")),
            );

        assert_eq!(
            compose_definition(&definition, "Outer").unwrap_err(),
            SchemaError::ColumnNameCollision {
                sheet: "Outer".to_string(),
                column: "a.b".to_string()
            }
        );
    }

    #[test]
    fn test_collection_of_collection_fails_compose_with_path() {
        let definition = SpecSchemaDefinition::new().record(
            SpecRecordDefinition::new("Matrix").field(field(
                "rows",
                EnumTypeDefinition::list(EnumTypeDefinition::list(EnumTypeDefinition::float())),
            )),
        );

        match compose_definition(&definition, "Matrix") {
            Err(SchemaError::UnsupportedShape { path, .. }) => assert_eq!(path, "Matrix.rows"),
            other => panic!("unexpected result {other:?}"),
        }
    }
}
