use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How many rows a request creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Count {
    Exact(u64),
    /// Inclusive range; the row count is drawn from the request seed.
    Range { min: u64, max: u64 },
}

impl Default for Count {
    fn default() -> Self {
        Count::Exact(1)
    }
}

/// Realistic value category used by templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Email,
    FirstName,
    LastName,
    FullName,
    Username,
    Password,
    Phone,
    City,
    Country,
    CountryCode,
    State,
    StreetAddress,
    ZipCode,
    Latitude,
    Longitude,
    Url,
    DomainName,
    IpAddress,
    Company,
    JobTitle,
    Title,
    Description,
    Word,
    Color,
    Currency,
    Price,
    Age,
    Uuid,
    Slug,
}

impl Shape {
    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Shape::Email => "email",
            Shape::FirstName => "first_name",
            Shape::LastName => "last_name",
            Shape::FullName => "full_name",
            Shape::Username => "username",
            Shape::Password => "password",
            Shape::Phone => "phone",
            Shape::City => "city",
            Shape::Country => "country",
            Shape::CountryCode => "country_code",
            Shape::State => "state",
            Shape::StreetAddress => "street_address",
            Shape::ZipCode => "zip_code",
            Shape::Latitude => "latitude",
            Shape::Longitude => "longitude",
            Shape::Url => "url",
            Shape::DomainName => "domain_name",
            Shape::IpAddress => "ip_address",
            Shape::Company => "company",
            Shape::JobTitle => "job_title",
            Shape::Title => "title",
            Shape::Description => "description",
            Shape::Word => "word",
            Shape::Color => "color",
            Shape::Currency => "currency",
            Shape::Price => "price",
            Shape::Age => "age",
            Shape::Uuid => "uuid",
            Shape::Slug => "slug",
        }
    }
}

/// Template used to generate a field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    Shape(Shape),
    /// Regular expression the generated text must match.
    Pattern(String),
    /// Shape from hints or the field name, else the declared type.
    Auto,
}

/// Read-only view handed to field callbacks.
#[derive(Debug, Clone, Copy)]
pub struct FieldContext<'a> {
    pub table: &'a str,
    pub field: &'a str,
    /// Textual path the seed was derived from.
    pub seed_path: &'a str,
    pub seed: u64,
    /// Values already assigned to the row, in JSON form.
    pub row: &'a BTreeMap<String, Value>,
}

type CallbackFn = dyn Fn(&FieldContext<'_>) -> Result<Value, String> + Send + Sync;

/// User closure producing a field value.
#[derive(Clone)]
pub struct FieldCallback(Arc<CallbackFn>);

impl FieldCallback {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&FieldContext<'_>) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    pub fn call(&self, ctx: &FieldContext<'_>) -> Result<Value, String> {
        (self.0)(ctx)
    }
}

impl fmt::Debug for FieldCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FieldCallback(..)")
    }
}

/// How a single field gets its value.
///
/// JSON documents can express every variant except `Callback`, which is
/// programmatic only.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FieldRule {
    Constant(Value),
    #[serde(skip)]
    Callback(FieldCallback),
    Template(Template),
    /// Pick one of the listed values.
    OneOf(Vec<Value>),
}

impl FieldRule {
    pub fn constant(value: impl Into<Value>) -> Self {
        FieldRule::Constant(value.into())
    }

    pub fn callback<F>(callback: F) -> Self
    where
        F: Fn(&FieldContext<'_>) -> Result<Value, String> + Send + Sync + 'static,
    {
        FieldRule::Callback(FieldCallback::new(callback))
    }

    pub fn shape(shape: Shape) -> Self {
        FieldRule::Template(Template::Shape(shape))
    }

    pub fn pattern(pattern: impl Into<String>) -> Self {
        FieldRule::Template(Template::Pattern(pattern.into()))
    }
}

/// What to do about one parent relationship of a requested table.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ParentRequest {
    /// Create a fresh parent row for every child row.
    Create(Box<TableRequest>),
    /// Reuse parent rows already known to the session.
    Connect,
    /// Leave the foreign key empty (nullable relationships only).
    Null,
}

/// Nested, per-table generation request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TableRequest {
    /// Qualified table id (`schema.name`).
    pub table: String,
    #[serde(default)]
    pub count: Count,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, FieldRule>,
    /// Keyed by relationship name, for relationships where this table is the child.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parents: BTreeMap<String, ParentRequest>,
    /// Keyed by relationship name, for relationships where this table is the parent.
    /// Children are created for every row of this table.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, TableRequest>,
    /// Prefer existing parent rows for unspecified relationships.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect: Option<bool>,
}

impl TableRequest {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            count: Count::default(),
            fields: BTreeMap::new(),
            parents: BTreeMap::new(),
            children: BTreeMap::new(),
            connect: None,
        }
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Count::Exact(count);
        self
    }

    pub fn with_range(mut self, min: u64, max: u64) -> Self {
        self.count = Count::Range { min, max };
        self
    }

    pub fn with_field(mut self, field: impl Into<String>, rule: FieldRule) -> Self {
        self.fields.insert(field.into(), rule);
        self
    }

    pub fn with_parent(mut self, relationship: impl Into<String>, parent: ParentRequest) -> Self {
        self.parents.insert(relationship.into(), parent);
        self
    }

    pub fn with_child(mut self, relationship: impl Into<String>, child: TableRequest) -> Self {
        self.children.insert(relationship.into(), child);
        self
    }

    pub fn connecting(mut self, connect: bool) -> Self {
        self.connect = Some(connect);
        self
    }

    /// Every table id mentioned by this request tree.
    pub fn tables(&self) -> Vec<String> {
        let mut tables = vec![self.table.clone()];
        for parent in self.parents.values() {
            if let ParentRequest::Create(request) = parent {
                tables.extend(request.tables());
            }
        }
        for child in self.children.values() {
            tables.extend(child.tables());
        }
        tables.sort();
        tables.dedup();
        tables
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_json() {
        let raw = r#"{
            "table": "public.users",
            "count": {"min": 2, "max": 4},
            "fields": {
                "email": {"template": {"shape": "email"}},
                "role": {"one_of": ["admin", "member"]},
                "bio": {"template": "auto"},
                "code": {"template": {"pattern": "[A-Z]{3}"}},
                "active": {"constant": true}
            },
            "children": {
                "posts_author_fk": {"table": "public.posts", "count": 3}
            }
        }"#;

        let request: TableRequest = serde_json::from_str(raw).expect("parse request");
        assert_eq!(request.count, Count::Range { min: 2, max: 4 });
        assert!(matches!(
            request.fields.get("email"),
            Some(FieldRule::Template(Template::Shape(Shape::Email)))
        ));
        assert!(matches!(
            request.fields.get("bio"),
            Some(FieldRule::Template(Template::Auto))
        ));
        let child = request.children.get("posts_author_fk").expect("child");
        assert_eq!(child.count, Count::Exact(3));
        assert_eq!(request.tables(), vec!["public.posts", "public.users"]);
    }

    #[test]
    fn count_defaults_to_one() {
        let request: TableRequest =
            serde_json::from_str(r#"{"table": "public.users"}"#).expect("parse request");
        assert_eq!(request.count, Count::Exact(1));
        assert!(request.connect.is_none());
    }

    #[test]
    fn callbacks_receive_context() {
        let rule = FieldRule::callback(|ctx| Ok(Value::from(format!("{}#{}", ctx.field, ctx.seed))));
        let row = BTreeMap::new();
        let ctx = FieldContext {
            table: "public.users",
            field: "nickname",
            seed_path: "s/0/public.users/0/nickname",
            seed: 7,
            row: &row,
        };
        let FieldRule::Callback(callback) = rule else {
            panic!("expected callback");
        };
        assert_eq!(callback.call(&ctx), Ok(Value::from("nickname#7")));
    }
}
