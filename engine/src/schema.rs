//! Record schema declaration.
//!
//! The schema lists every attribute the engine copies from a snapshot row into
//! a stored document, together with the semantic type the raw cell is coerced
//! to. Columns not declared here are ignored.

use serde::{Deserialize, Serialize};

/// Field name of the record identifier.
pub const ID_FIELD: &str = "id";

/// Field name of the creation timestamp that drives incremental sync.
pub const CREATED_FIELD: &str = "created";

/// Semantic field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    /// String that is dropped when blank
    Text,
    Int,
    Float,
    Bool,
    Timestamp,
    /// Non-empty mapping, native or JSON-encoded
    Object,
    /// Non-empty sequence, native or JSON-encoded
    List,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::String => write!(f, "String"),
            FieldType::Text => write!(f, "Text"),
            FieldType::Int => write!(f, "Int"),
            FieldType::Float => write!(f, "Float"),
            FieldType::Bool => write!(f, "Bool"),
            FieldType::Timestamp => write!(f, "Timestamp"),
            FieldType::Object => write!(f, "Object"),
            FieldType::List => write!(f, "List"),
        }
    }
}

/// Definition of one record attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    /// Column and document key
    pub name: String,
    pub field_type: FieldType,
    /// Informational: describes the source data and is serialized with the
    /// schema, but normalization does not enforce it. Only a missing `id`
    /// skips a row; any other field that is missing or fails coercion is left
    /// out of the document.
    pub required: bool,
}

impl FieldDef {
    /// Create a new required field definition.
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
        }
    }

    /// Create a new optional field definition.
    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
        }
    }
}

/// Ordered set of field definitions for one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSchema {
    pub fields: Vec<FieldDef>,
}

impl RecordSchema {
    pub fn new(fields: Vec<FieldDef>) -> Self {
        Self { fields }
    }

    /// Get a field definition by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of all fields with the given type, in declaration order.
    pub fn fields_of(&self, field_type: FieldType) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(move |f| f.field_type == field_type)
            .map(|f| f.name.as_str())
    }

    /// Schema of the complaints collection.
    pub fn complaints() -> Self {
        let optional = |names: &[&str], ty: FieldType| -> Vec<FieldDef> {
            names.iter().map(|n| FieldDef::optional(*n, ty)).collect()
        };

        let mut fields = vec![
            FieldDef::required(ID_FIELD, FieldType::String),
            FieldDef::required(CREATED_FIELD, FieldType::Timestamp),
        ];
        fields.extend(optional(&["oldComplainId", "legacyId"], FieldType::String));
        fields.extend(optional(
            &[
                "modified",
                "deletedDate",
                "firstInteractionDate",
                "failedToValidatePolicies",
            ],
            FieldType::Timestamp,
        ));

        // company
        fields.extend(optional(
            &[
                "companyName",
                "companyShortname",
                "fantasyName",
                "company",
                "empresa_origem",
                "category",
                "company_index_type",
            ],
            FieldType::String,
        ));
        fields.extend(optional(
            &[
                "company_finalScore",
                "company_consumerScore",
                "company_solvedPercentual",
                "company_dealAgainPercentual",
                "company_answeredPercentual",
            ],
            FieldType::Float,
        ));
        fields.push(FieldDef::optional("company_totalComplains", FieldType::Int));

        // content and classification
        fields.extend(optional(
            &[
                "title",
                "titleMasked",
                "description",
                "descriptionMasked",
                "problemType",
                "otherProblemType",
                "productType",
                "otherProductType",
                "problema_categoria",
            ],
            FieldType::String,
        ));

        // status
        fields.extend(optional(&["status", "evaluation"], FieldType::String));
        fields.extend(optional(
            &[
                "solved",
                "dealAgain",
                "evaluated",
                "canBeEvaluated",
                "compliment",
            ],
            FieldType::Bool,
        ));
        fields.push(FieldDef::optional("score", FieldType::Float));

        // user
        fields.extend(optional(
            &[
                "userName",
                "requesterName",
                "userEmail",
                "userCity",
                "userState",
                "user",
            ],
            FieldType::String,
        ));

        // interactions
        fields.push(FieldDef::optional("hasReply", FieldType::Bool));
        fields.push(FieldDef::optional("lastReplyOrigin", FieldType::String));
        fields.push(FieldDef::optional("interactions", FieldType::List));

        // moderation and policies
        fields.extend(optional(&["inModeration", "moderateRequested"], FieldType::Bool));
        fields.extend(optional(
            &[
                "moderateReason",
                "moderationReasonDescription",
                "moderationUserName",
                "maskingStatus",
            ],
            FieldType::String,
        ));
        fields.push(FieldDef::optional("contentViolatesPolicies", FieldType::Bool));
        fields.push(FieldDef::optional("contentPoliciesViolation", FieldType::String));
        fields.push(FieldDef::optional("policiesViolationScore", FieldType::Float));

        // deletion
        fields.extend(optional(&["deleted", "userRequestedDelete"], FieldType::Bool));
        fields.extend(optional(&["deletionReason", "deletedIp"], FieldType::String));

        // misc
        fields.extend(optional(
            &[
                "type",
                "presence",
                "complainOrigin",
                "url",
                "ip",
                "Operadora",
                "company_name",
            ],
            FieldType::String,
        ));
        fields.extend(optional(
            &[
                "read",
                "frozen",
                "indexable",
                "marketplaceComplain",
                "publishedEmailSent",
                "requestEvaluation",
            ],
            FieldType::Bool,
        ));
        fields.push(FieldDef::optional("count", FieldType::Int));
        fields.push(FieldDef::optional("additionalInfo", FieldType::Text));

        fields.extend(optional(
            &["additionalFields", "address", "raFormsAnswer"],
            FieldType::Object,
        ));
        fields.extend(optional(
            &[
                "phones",
                "files",
                "companyIndexes",
                "complainMediaInfos",
            ],
            FieldType::List,
        ));

        Self::new(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn complaints_schema_has_unique_names() {
        let schema = RecordSchema::complaints();
        let names: HashSet<_> = schema.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names.len(), schema.fields.len());
    }

    #[test]
    fn identity_and_created_are_required() {
        let schema = RecordSchema::complaints();

        let id = schema.field(ID_FIELD).unwrap();
        assert!(id.required);
        assert_eq!(id.field_type, FieldType::String);

        let created = schema.field(CREATED_FIELD).unwrap();
        assert!(created.required);
        assert_eq!(created.field_type, FieldType::Timestamp);

        assert!(!schema.field("title").unwrap().required);
    }

    #[test]
    fn nested_fields_are_declared() {
        let schema = RecordSchema::complaints();

        let objects: Vec<_> = schema.fields_of(FieldType::Object).collect();
        assert_eq!(objects, ["additionalFields", "address", "raFormsAnswer"]);

        let lists: Vec<_> = schema.fields_of(FieldType::List).collect();
        assert_eq!(
            lists,
            [
                "interactions",
                "phones",
                "files",
                "companyIndexes",
                "complainMediaInfos"
            ]
        );
    }

    #[test]
    fn field_type_display() {
        assert_eq!(FieldType::Timestamp.to_string(), "Timestamp");
        assert_eq!(FieldType::List.to_string(), "List");
    }

    #[test]
    fn serialization_uses_lowercase_types() {
        let def = FieldDef::optional("score", FieldType::Float);
        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["fieldType"], "float");
        assert_eq!(json["required"], false);
    }
}
