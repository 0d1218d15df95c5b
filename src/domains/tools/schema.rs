//! Input schema descriptors and validation.
//!
//! Tools declare their input as a JSON Schema document. The document is
//! compiled once, at registration time, with the `jsonschema` crate; every
//! call is then checked against the compiled form before the handler runs.
//!
//! Two rules go beyond standard JSON Schema:
//!
//! - a required property that is present but `null` is reported as
//!   [`ViolationKind::RequiredNull`] unless its own schema admits `null`;
//! - in strict mode every object schema is closed, so properties the schema
//!   does not declare are rejected.
//!
//! Local references (`#/$defs/...`) are resolved; remote ones are not.

use std::fmt;

use jsonschema::JSONSchema;
use jsonschema::error::{TypeKind, ValidationError, ValidationErrorKind};
use serde_json::Value;
use thiserror::Error;

/// Path of the root value in violation reports.
const ROOT_PATH: &str = "$";

/// Keywords whose values are instance data rather than subschemas.
const DATA_KEYWORDS: &[&str] = &["enum", "const", "default", "examples", "required"];

/// Keywords whose values map names to subschemas.
const NAMED_SCHEMA_KEYWORDS: &[&str] = &[
    "properties",
    "patternProperties",
    "$defs",
    "definitions",
    "dependentSchemas",
];

/// Name of the JSON type of `value`, as used in violation messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Errors raised while compiling a schema descriptor.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("schema must be a JSON object or boolean, found {found}")]
    NotAnObject { found: &'static str },

    #[error("invalid schema at {path}: {reason}")]
    Invalid { path: String, reason: String },
}

/// A compiled input schema.
pub struct Schema {
    raw: Value,
    lenient: JSONSchema,
    strict: JSONSchema,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("raw", &self.raw)
            .finish_non_exhaustive()
    }
}

/// Options that change how strictly values are checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationOptions {
    /// Reject object properties the schema does not declare.
    pub strict: bool,
}

impl ValidationOptions {
    pub fn strict() -> Self {
        Self { strict: true }
    }
}

/// What went wrong at a given path.
#[derive(Debug, Clone, PartialEq)]
pub enum ViolationKind {
    /// A required property is absent.
    MissingRequired,
    /// A required property is present but `null`.
    RequiredNull,
    /// The value has the wrong type.
    TypeMismatch {
        expected: String,
        actual: &'static str,
    },
    /// The value is not one of the enumerated values.
    NotInEnum,
    /// The property is not declared and undeclared properties are rejected.
    UnexpectedProperty,
    /// Any other keyword (`minimum`, `pattern`, `anyOf`, ...) failed.
    Constraint(String),
}

/// A single schema violation.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    /// Path of the offending value, e.g. `$.city` or `$.tags[2]`.
    pub path: String,
    pub kind: ViolationKind,
}

impl Violation {
    fn new(path: impl Into<String>, kind: ViolationKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ViolationKind::MissingRequired => {
                write!(f, "{}: required property is missing", self.path)
            }
            ViolationKind::RequiredNull => write!(f, "{}: required property is null", self.path),
            ViolationKind::TypeMismatch { expected, actual } => {
                write!(f, "{}: expected {}, found {}", self.path, expected, actual)
            }
            ViolationKind::NotInEnum => {
                write!(f, "{}: value is not one of the allowed values", self.path)
            }
            ViolationKind::UnexpectedProperty => {
                write!(f, "{}: property is not declared in the schema", self.path)
            }
            ViolationKind::Constraint(message) => write!(f, "{}: {}", self.path, message),
        }
    }
}

/// All violations found in a value, ordered by path. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationErrors(Vec<Violation>);

impl ValidationErrors {
    pub fn violations(&self) -> &[Violation] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for violation in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}", violation)?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Result of validating a value against a schema.
pub type ValidationResult = Result<(), ValidationErrors>;

// ============================================================================
// Compilation
// ============================================================================

impl Schema {
    /// Compile a schema descriptor.
    ///
    /// The descriptor itself is checked against its meta-schema, so unknown
    /// type names or malformed keywords fail here rather than at call time.
    pub fn from_value(value: &Value) -> Result<Self, SchemaError> {
        if !(value.is_object() || value.is_boolean()) {
            return Err(SchemaError::NotAnObject {
                found: json_type_name(value),
            });
        }

        let lenient = compile(value)?;
        let mut closed = value.clone();
        close_objects(&mut closed);
        let strict = compile(&closed)?;

        Ok(Self {
            raw: value.clone(),
            lenient,
            strict,
        })
    }

    /// The descriptor this schema was compiled from.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Names listed in the root `required` keyword.
    pub fn required(&self) -> Vec<&str> {
        self.raw
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    pub fn description(&self) -> Option<&str> {
        self.raw.get("description").and_then(Value::as_str)
    }

    /// The subschema declared for a root property, with `$ref` followed.
    pub fn property(&self, name: &str) -> Option<&Value> {
        let property = self.raw.get("properties")?.get(name)?;
        Some(follow_ref(&self.raw, property).unwrap_or(property))
    }
}

fn compile(schema: &Value) -> Result<JSONSchema, SchemaError> {
    JSONSchema::compile(schema).map_err(|e| SchemaError::Invalid {
        path: pointer_to_path(schema, &e.instance_path.to_string()),
        reason: e.to_string(),
    })
}

/// Close every object schema: `additionalProperties: false` unless the
/// schema already says otherwise.
fn close_objects(schema: &mut Value) {
    match schema {
        Value::Object(map) => {
            let is_object_schema = map.get("properties").is_some_and(Value::is_object)
                || map.get("type").and_then(Value::as_str) == Some("object");
            if is_object_schema && !map.contains_key("additionalProperties") {
                map.insert("additionalProperties".to_string(), Value::Bool(false));
            }

            for (keyword, sub) in map.iter_mut() {
                let keyword = keyword.as_str();
                if NAMED_SCHEMA_KEYWORDS.contains(&keyword) {
                    if let Value::Object(named) = sub {
                        named.values_mut().for_each(close_objects);
                    }
                } else if !DATA_KEYWORDS.contains(&keyword) {
                    close_objects(sub);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(close_objects),
        _ => {}
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Validate `value` against `schema`.
///
/// Pure and side-effect free. All violations are
/// collected rather than stopping at the first one.
pub fn validate(schema: &Schema, value: &Value, options: ValidationOptions) -> ValidationResult {
    schema.validate(value, options)
}

impl Schema {
    /// Validate `value` against this schema.
    pub fn validate(&self, value: &Value, options: ValidationOptions) -> ValidationResult {
        let compiled = if options.strict {
            &self.strict
        } else {
            &self.lenient
        };

        let errors = match compiled.validate(value) {
            Ok(()) => return Ok(()),
            Err(errors) => errors,
        };

        let mut violations = Vec::new();
        for error in errors {
            self.collect(value, &error, &mut violations);
        }
        violations.sort_by(|a, b| a.path.cmp(&b.path));
        violations.dedup();
        Err(ValidationErrors(violations))
    }

    fn collect(&self, root: &Value, error: &ValidationError<'_>, out: &mut Vec<Violation>) {
        let path = pointer_to_path(root, &error.instance_path.to_string());

        match &error.kind {
            ValidationErrorKind::Required { property } => {
                let name = property
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| property.to_string());
                out.push(Violation::new(
                    child_path(&path, &name),
                    ViolationKind::MissingRequired,
                ));
            }
            ValidationErrorKind::AdditionalProperties { unexpected } if !unexpected.is_empty() => {
                for name in unexpected {
                    out.push(Violation::new(
                        child_path(&path, name),
                        ViolationKind::UnexpectedProperty,
                    ));
                }
            }
            ValidationErrorKind::Type { kind } => {
                let kind = if error.instance.is_null()
                    && self.is_required_property(&error.schema_path.to_string())
                {
                    ViolationKind::RequiredNull
                } else {
                    ViolationKind::TypeMismatch {
                        expected: expected_types(kind),
                        actual: json_type_name(&error.instance),
                    }
                };
                out.push(Violation::new(path, kind));
            }
            ValidationErrorKind::Enum { .. } => {
                out.push(Violation::new(path, ViolationKind::NotInEnum));
            }
            _ => out.push(Violation::new(
                path,
                ViolationKind::Constraint(error.to_string()),
            )),
        }
    }

    /// Whether a failed `type` keyword at `schema_path` belongs to a property
    /// its parent object lists as required.
    fn is_required_property(&self, schema_path: &str) -> bool {
        let mut tokens: Vec<&str> = schema_path.split('/').skip(1).collect();
        if tokens.pop() != Some("type") {
            return false;
        }
        while tokens.last() == Some(&"$ref") {
            tokens.pop();
        }

        let [parent @ .., "properties", name] = tokens.as_slice() else {
            return false;
        };
        resolve(&self.raw, parent)
            .and_then(|schema| schema.get("required"))
            .and_then(Value::as_array)
            .is_some_and(|required| required.iter().any(|r| r.as_str() == Some(*name)))
    }
}

fn expected_types(kind: &TypeKind) -> String {
    match kind {
        TypeKind::Single(single) => single.to_string(),
        TypeKind::Multiple(types) => (*types)
            .into_iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(" or "),
    }
}

// ============================================================================
// Paths
// ============================================================================

fn child_path(parent: &str, name: &str) -> String {
    format!("{}.{}", parent, name)
}

/// Turn a JSON pointer into a `$.a[0].b` path, using `root` to tell array
/// indices from property names.
fn pointer_to_path(root: &Value, pointer: &str) -> String {
    let mut path = String::from(ROOT_PATH);
    let mut current = Some(root);

    for token in pointer.split('/').skip(1) {
        let token = token.replace("~1", "/").replace("~0", "~");
        match current {
            Some(Value::Array(items)) => {
                path.push_str(&format!("[{}]", token));
                current = token.parse::<usize>().ok().and_then(|i| items.get(i));
            }
            Some(Value::Object(map)) => {
                path = child_path(&path, &token);
                current = map.get(&token);
            }
            _ => {
                path = child_path(&path, &token);
                current = None;
            }
        }
    }
    path
}

/// Walk `tokens` from the schema root, following local `$ref`s.
fn resolve<'a>(root: &'a Value, tokens: &[&str]) -> Option<&'a Value> {
    let mut current = root;
    for token in tokens {
        if *token == "$ref" {
            current = follow_ref(root, current)?;
            continue;
        }
        current = match current {
            Value::Object(map) => match map.get(*token) {
                Some(next) => next,
                None => follow_ref(root, current)?.get(*token)?,
            },
            Value::Array(items) => items.get(token.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(follow_ref(root, current).unwrap_or(current))
}

fn follow_ref<'a>(root: &'a Value, schema: &'a Value) -> Option<&'a Value> {
    let reference = schema.get("$ref")?.as_str()?;
    root.pointer(reference.strip_prefix('#')?)
}
