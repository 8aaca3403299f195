//! Row normalization: raw snapshot row in, validated document out.

use crate::coerce;
use crate::document::{Document, FieldValue};
use crate::schema::{FieldType, RecordSchema, ID_FIELD};
use crate::snapshot::{Cell, Row};
use crate::{Error, Result};

/// Coerce one cell to the declared field type.
///
/// Returns `None` when the cell is missing, cannot be converted, or is an
/// empty nested structure.
pub fn coerce_field(field_type: FieldType, cell: &Cell) -> Option<FieldValue> {
    match field_type {
        FieldType::String => coerce::to_string(cell).map(FieldValue::String),
        FieldType::Text => coerce::to_text(cell).map(FieldValue::String),
        FieldType::Int => coerce::to_int(cell).map(FieldValue::Int),
        FieldType::Float => coerce::to_float(cell).map(FieldValue::Float),
        FieldType::Bool => coerce::to_bool(cell).map(FieldValue::Bool),
        FieldType::Timestamp => coerce::to_timestamp(cell).map(FieldValue::Timestamp),
        FieldType::Object => coerce::to_object(cell).map(FieldValue::Object),
        FieldType::List => coerce::to_list(cell).map(FieldValue::List),
    }
}

/// Turn a snapshot row into a document following `schema`.
///
/// Every declared field is coerced independently and left out when it has no
/// value. The only failure is a row without a usable identifier.
pub fn normalize(schema: &RecordSchema, row: &Row<'_>) -> Result<Document> {
    let id = coerce::to_string(row.get(ID_FIELD))
        .filter(|id| !id.trim().is_empty())
        .ok_or(Error::MissingIdentifier)?;

    let mut doc = Document::new(id);
    for field in &schema.fields {
        if field.name == ID_FIELD {
            continue;
        }
        if let Some(value) = coerce_field(field.field_type, row.get(&field.name)) {
            doc.insert(field.name.as_str(), value);
        }
    }
    Ok(doc)
}
