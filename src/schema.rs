use crate::error::Error;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The column types a model may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int,
    Float,
    Boolean,
    Json,
    DateTime,
}

impl FromStr for FieldType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(FieldType::String),
            "int" => Ok(FieldType::Int),
            "float" => Ok(FieldType::Float),
            "boolean" => Ok(FieldType::Boolean),
            "json" => Ok(FieldType::Json),
            "datetime" => Ok(FieldType::DateTime),
            other => Err(Error::InvalidSchema(format!(
                "unknown field type `{other}`"
            ))),
        }
    }
}

/// One fully normalized column of a model.
///
/// Fields are public so callers can inspect (or hand-assemble) models; the
/// `Repository` re-validates the primary-key invariant on construction for
/// exactly that reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub required: bool,
    pub unique: bool,
    pub default_value: Option<Value>,
}

/// The caller-facing shorthand for a column: either a bare type (all flags
/// false) or a full options form. Resolved into a [`Field`] once, at
/// [`Model::define`] time, and never re-inspected afterwards.
#[derive(Debug, Clone)]
pub enum FieldSpec {
    Bare(FieldType),
    Options(FieldOptions),
}

impl From<FieldType> for FieldSpec {
    fn from(field_type: FieldType) -> Self {
        FieldSpec::Bare(field_type)
    }
}

impl From<FieldOptions> for FieldSpec {
    fn from(options: FieldOptions) -> Self {
        FieldSpec::Options(options)
    }
}

/// The full options form of a field spec, built with chained setters:
///
/// ```ignore
/// FieldOptions::new(FieldType::Int).primary_key().auto_increment()
/// ```
#[derive(Debug, Clone)]
pub struct FieldOptions {
    pub field_type: FieldType,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub required: bool,
    pub unique: bool,
    pub default_value: Option<Value>,
}

impl FieldOptions {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            primary_key: false,
            auto_increment: false,
            required: false,
            unique: false,
            default_value: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

/// Referential actions available on a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferentialAction {
    Cascade,
    SetNull,
    Restrict,
}

impl ReferentialAction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::Restrict => "RESTRICT",
        }
    }
}

/// A foreign key from one column of the owning model to a referenced table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
    pub on_delete: Option<ReferentialAction>,
    pub on_update: Option<ReferentialAction>,
}

impl ForeignKey {
    pub fn new(
        column: impl Into<String>,
        referenced_table: impl Into<String>,
        referenced_column: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            referenced_table: referenced_table.into(),
            referenced_column: referenced_column.into(),
            on_delete: None,
            on_update: None,
        }
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = Some(action);
        self
    }
}

/// A secondary index over one or more columns of the owning model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    /// Explicit index name; when absent the name is derived deterministically
    /// as `idx_<table>_<col1>_<col2>...`.
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl Index {
    pub fn on<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: None,
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The effective index name for DDL generation.
    pub fn resolved_name(&self, table: &str) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("idx_{}_{}", table, self.columns.join("_")),
        }
    }
}

/// A declared entity: table name, ordered columns, foreign keys and indexes.
///
/// Field order is meaningful — it fixes the column order of generated
/// `CREATE TABLE` statements and of insert column lists. Models are built once
/// via [`Model::define`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    pub fields: Vec<Field>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<Index>,
}

impl Model {
    /// Normalizes the caller-supplied shorthand into canonical [`Field`]s and
    /// validates the result. Fails with `InvalidSchema` when the model has no
    /// primary key (or more than one), duplicate field names, an
    /// `auto_increment` flag on anything but an `int` primary key, or a
    /// foreign key / index that names an unknown column.
    pub fn define<N, I, S, F>(
        name: N,
        field_specs: I,
        foreign_keys: Vec<ForeignKey>,
        indexes: Vec<Index>,
    ) -> Result<Model, Error>
    where
        N: Into<String>,
        I: IntoIterator<Item = (S, F)>,
        S: Into<String>,
        F: Into<FieldSpec>,
    {
        let name = name.into();
        let mut fields: Vec<Field> = Vec::new();

        for (field_name, spec) in field_specs {
            let field_name = field_name.into();
            if fields.iter().any(|f| f.name == field_name) {
                return Err(Error::InvalidSchema(format!(
                    "model `{name}` declares field `{field_name}` more than once"
                )));
            }
            let field = match spec.into() {
                FieldSpec::Bare(field_type) => Field {
                    name: field_name,
                    field_type,
                    primary_key: false,
                    auto_increment: false,
                    required: false,
                    unique: false,
                    default_value: None,
                },
                FieldSpec::Options(options) => Field {
                    name: field_name,
                    field_type: options.field_type,
                    primary_key: options.primary_key,
                    auto_increment: options.auto_increment,
                    required: options.required,
                    unique: options.unique,
                    default_value: options.default_value,
                },
            };
            fields.push(field);
        }

        let key_count = fields.iter().filter(|f| f.primary_key).count();
        if key_count == 0 {
            return Err(Error::InvalidSchema(format!(
                "model `{name}` declares no primary key field"
            )));
        }
        if key_count > 1 {
            return Err(Error::InvalidSchema(format!(
                "model `{name}` declares {key_count} primary key fields; at most one is allowed"
            )));
        }

        for field in &fields {
            if field.auto_increment
                && !(field.primary_key && field.field_type == FieldType::Int)
            {
                return Err(Error::InvalidSchema(format!(
                    "field `{}` of model `{name}` is auto-increment but not an int primary key",
                    field.name
                )));
            }
        }

        for fk in &foreign_keys {
            if !fields.iter().any(|f| f.name == fk.column) {
                return Err(Error::InvalidSchema(format!(
                    "foreign key on model `{name}` references unknown column `{}`",
                    fk.column
                )));
            }
        }

        for index in &indexes {
            if index.columns.is_empty() {
                return Err(Error::InvalidSchema(format!(
                    "index on model `{name}` has no columns"
                )));
            }
            for column in &index.columns {
                if !fields.iter().any(|f| &f.name == column) {
                    return Err(Error::InvalidSchema(format!(
                        "index on model `{name}` references unknown column `{column}`"
                    )));
                }
            }
        }

        Ok(Model {
            name,
            fields,
            foreign_keys,
            indexes,
        })
    }

    /// Looks up a declared field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The model's primary key field. Always `Some` for a model built via
    /// [`Model::define`].
    pub fn primary_key(&self) -> Option<&Field> {
        self.fields.iter().find(|f| f.primary_key)
    }

    /// The primary key field, but only when it is database-assigned.
    pub fn auto_increment_key(&self) -> Option<&Field> {
        self.primary_key().filter(|f| f.auto_increment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_model() -> Model {
        Model::define(
            "users",
            vec![
                (
                    "id",
                    FieldSpec::from(
                        FieldOptions::new(FieldType::Int)
                            .primary_key()
                            .auto_increment(),
                    ),
                ),
                (
                    "email",
                    FieldSpec::from(FieldOptions::new(FieldType::String).required().unique()),
                ),
                ("created_at", FieldSpec::from(FieldType::DateTime)),
            ],
            vec![],
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn define_normalizes_bare_specs_with_all_flags_false() {
        let model = user_model();
        let created_at = model.field("created_at").unwrap();
        assert_eq!(created_at.field_type, FieldType::DateTime);
        assert!(!created_at.primary_key);
        assert!(!created_at.required);
        assert!(!created_at.unique);
        assert!(created_at.default_value.is_none());
    }

    #[test]
    fn primary_key_returns_the_single_marked_field() {
        let model = user_model();
        assert_eq!(model.primary_key().unwrap().name, "id");
        assert_eq!(model.auto_increment_key().unwrap().name, "id");
    }

    #[test]
    fn define_rejects_models_without_a_primary_key() {
        let result = Model::define(
            "notes",
            vec![("body", FieldSpec::from(FieldType::String))],
            vec![],
            vec![],
        );
        assert!(matches!(result, Err(Error::InvalidSchema(_))));
    }

    #[test]
    fn define_rejects_multiple_primary_keys() {
        let result = Model::define(
            "pairs",
            vec![
                (
                    "a",
                    FieldSpec::from(FieldOptions::new(FieldType::Int).primary_key()),
                ),
                (
                    "b",
                    FieldSpec::from(FieldOptions::new(FieldType::Int).primary_key()),
                ),
            ],
            vec![],
            vec![],
        );
        assert!(matches!(result, Err(Error::InvalidSchema(_))));
    }

    #[test]
    fn define_rejects_duplicate_field_names() {
        let result = Model::define(
            "dupes",
            vec![
                (
                    "id",
                    FieldSpec::from(FieldOptions::new(FieldType::Int).primary_key()),
                ),
                ("id", FieldSpec::from(FieldType::Int)),
            ],
            vec![],
            vec![],
        );
        assert!(matches!(result, Err(Error::InvalidSchema(_))));
    }

    #[test]
    fn define_rejects_auto_increment_on_non_int_keys() {
        let result = Model::define(
            "codes",
            vec![(
                "code",
                FieldSpec::from(
                    FieldOptions::new(FieldType::String)
                        .primary_key()
                        .auto_increment(),
                ),
            )],
            vec![],
            vec![],
        );
        assert!(matches!(result, Err(Error::InvalidSchema(_))));
    }

    #[test]
    fn define_rejects_foreign_keys_and_indexes_on_unknown_columns() {
        let fk = Model::define(
            "posts",
            vec![(
                "id",
                FieldSpec::from(FieldOptions::new(FieldType::Int).primary_key()),
            )],
            vec![ForeignKey::new("author_id", "users", "id")],
            vec![],
        );
        assert!(matches!(fk, Err(Error::InvalidSchema(_))));

        let idx = Model::define(
            "posts",
            vec![(
                "id",
                FieldSpec::from(FieldOptions::new(FieldType::Int).primary_key()),
            )],
            vec![],
            vec![Index::on(vec!["missing"])],
        );
        assert!(matches!(idx, Err(Error::InvalidSchema(_))));
    }

    #[test]
    fn index_names_are_derived_deterministically_when_absent() {
        let index = Index::on(vec!["email", "created_at"]);
        assert_eq!(index.resolved_name("users"), "idx_users_email_created_at");
        let named = Index::on(vec!["email"]).named("custom");
        assert_eq!(named.resolved_name("users"), "custom");
    }

    #[test]
    fn field_type_parses_the_lowercase_shorthand_names() {
        assert_eq!("datetime".parse::<FieldType>().unwrap(), FieldType::DateTime);
        assert_eq!("string".parse::<FieldType>().unwrap(), FieldType::String);
        assert!("varchar".parse::<FieldType>().is_err());
    }
}
