//! Typed-struct layer over the record graph.

use std::path::Path;

use crate::backend::SpreadsheetBackend;
use crate::composition::{SpecLayoutPlan, compose_definition};
use crate::document::XlsxDocument;
use crate::error::XlsxModelError;
use crate::reader::import;
use crate::schema::SpecSchemaDefinition;
use crate::spec::SpecXlsxDocumentConfig;
use crate::value::SpecRecord;
use crate::writer::export;

/// A Rust type that maps onto a workbook through its schema.
///
/// Implementors describe the schema and convert to and from [`SpecRecord`];
/// everything else is provided.
pub trait XlsxModel: Sized {
    fn schema_definition() -> SpecSchemaDefinition;

    /// Name of the root record type in [`XlsxModel::schema_definition`].
    fn root_name() -> &'static str;

    fn to_record(&self) -> SpecRecord;

    fn from_record(record: SpecRecord) -> Result<Self, XlsxModelError>;

    fn layout_plan() -> Result<SpecLayoutPlan, XlsxModelError> {
        Ok(compose_definition(&Self::schema_definition(), Self::root_name())?)
    }

    fn to_document(&self, config: &SpecXlsxDocumentConfig) -> Result<XlsxDocument, XlsxModelError> {
        let plan = Self::layout_plan()?;
        Ok(export(&self.to_record(), &plan, config)?)
    }

    fn from_document(doc: &XlsxDocument) -> Result<Self, XlsxModelError> {
        let plan = Self::layout_plan()?;
        Self::from_record(import(doc, &plan)?)
    }

    fn to_file(
        &self,
        backend: &dyn SpreadsheetBackend,
        path: &Path,
        config: &SpecXlsxDocumentConfig,
    ) -> Result<(), XlsxModelError> {
        let doc = self.to_document(config)?;
        backend.save(&doc, path)?;
        Ok(())
    }

    fn from_file(backend: &dyn SpreadsheetBackend, path: &Path) -> Result<Self, XlsxModelError> {
        let doc = backend.open(path)?;
        Self::from_document(&doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EnumTypeDefinition, SpecFieldDefinition, SpecRecordDefinition};

    #[derive(Debug, Clone, PartialEq)]
    struct Contact {
        name: String,
        age: Option<i64>,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct AddressBook {
        contacts: Vec<Contact>,
    }

    impl XlsxModel for AddressBook {
        fn schema_definition() -> SpecSchemaDefinition {
            SpecSchemaDefinition::new()
                .record(
                    SpecRecordDefinition::new("Contact")
                        .title("Contacts")
                        .field(SpecFieldDefinition::new("name", EnumTypeDefinition::text()))
                        .field(SpecFieldDefinition::new(
                            "age",
                            EnumTypeDefinition::optional(EnumTypeDefinition::integer()),
                        )),
                )
                .record(SpecRecordDefinition::new("AddressBook").field(
                    SpecFieldDefinition::new(
                        "contacts",
                        EnumTypeDefinition::list(EnumTypeDefinition::record("Contact")),
                    ),
                ))
        }

        fn root_name() -> &'static str {
            "AddressBook"
        }

        fn to_record(&self) -> SpecRecord {
            let l_contacts: Vec<SpecRecord> = self
                .contacts
                .iter()
                .map(|c| {
                    SpecRecord::new("Contact")
                        .with("name", c.name.as_str())
                        .with("age", c.age)
                })
                .collect();
            SpecRecord::new("AddressBook").with("contacts", l_contacts)
        }

        fn from_record(record: SpecRecord) -> Result<Self, XlsxModelError> {
            let l_contacts = record
                .get_list("contacts")
                .ok_or_else(|| XlsxModelError::Conversion("contacts missing".to_string()))?;
            let contacts = l_contacts
                .iter()
                .map(|c| {
                    Ok(Contact {
                        name: c
                            .get_str("name")
                            .ok_or_else(|| XlsxModelError::Conversion("name missing".to_string()))?
                            .to_string(),
                        age: c.get_i64("age"),
                    })
                })
                .collect::<Result<Vec<_>, XlsxModelError>>()?;
            Ok(Self { contacts })
        }
    }

    #[test]
    fn test_model_document_round_trip() {
        let book = AddressBook {
            contacts: vec![
                Contact {
                    name: "Ada".to_string(),
                    age: Some(36),
                },
                Contact {
                    name: "Grace".to_string(),
                    age: None,
                },
            ],
        };

        let doc = book.to_document(&SpecXlsxDocumentConfig::default()).unwrap();
        assert_eq!(doc.sheet_names(), vec!["Contacts"]);
        assert_eq!(AddressBook::from_document(&doc).unwrap(), book);
    }
}
