use std::borrow::Cow;

use serde::Deserialize;

/// Entry of the fixed field catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Correlation id. Example: 7b77f3f1-8e15-4b6a-9b3f-7f4b6f4b6f4b
    Id,
    /// Client address, proxy headers first. Example: 192.168.0.1
    RemoteIp,
    /// Host. Example: localhost:8080
    Host,
    /// Method. Example: GET
    Method,
    /// Path with query string. Example: /search?q=actix
    Uri,
    /// User agent. Example: Mozilla/5.0
    UserAgent,
    /// Request `Content-Length`, "0" when missing. Example: 512
    BytesIn,
    /// Status code. Example: 200
    Status,
    /// Handler error, "" when the handler succeeded.
    Error,
    /// Handler duration in nanoseconds.
    Latency,
    /// Handler duration for humans. Example: 5.2ms
    LatencyHuman,
    /// Bytes written to the response body. Example: 1024
    BytesOut,
}

/// Fields known to the request (pre-handler) event.
pub const REQUEST_FIELDS: [Field; 7] = [
    Field::Id,
    Field::RemoteIp,
    Field::Host,
    Field::Method,
    Field::Uri,
    Field::UserAgent,
    Field::BytesIn,
];

/// Fields known to the response (post-handler) event.
pub const RESPONSE_FIELDS: [Field; 12] = [
    Field::Id,
    Field::RemoteIp,
    Field::Host,
    Field::Method,
    Field::Uri,
    Field::UserAgent,
    Field::Status,
    Field::Error,
    Field::Latency,
    Field::LatencyHuman,
    Field::BytesIn,
    Field::BytesOut,
];

impl Field {
    pub fn name(&self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::RemoteIp => "remote_ip",
            Field::Host => "host",
            Field::Method => "method",
            Field::Uri => "uri",
            Field::UserAgent => "user_agent",
            Field::BytesIn => "bytes_in",
            Field::Status => "status",
            Field::Error => "error",
            Field::Latency => "latency",
            Field::LatencyHuman => "latency_human",
            Field::BytesOut => "bytes_out",
        }
    }

    /// Whether the field can be rendered before the handler runs.
    pub fn is_request_field(&self) -> bool {
        REQUEST_FIELDS.contains(self)
    }
}

/// Allowlist of field names for one event.
///
/// `Fields::all()` (the unset list) selects every catalog field. A set list selects exactly the
/// names it contains; names outside the catalog never match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Fields(Option<Vec<Cow<'static, str>>>);

impl Fields {
    pub fn builder() -> FieldsBuilder {
        FieldsBuilder::new()
    }

    /// Selects every field of the event's catalog.
    pub fn all() -> Self {
        Fields(None)
    }

    /// Selects exactly `names`.
    pub fn only<I, T>(names: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Cow<'static, str>>,
    {
        Fields(Some(names.into_iter().map(Into::into).collect()))
    }

    pub fn names(&self) -> Option<&[Cow<'static, str>]> {
        self.0.as_deref()
    }

    pub fn includes(&self, name: &str) -> bool {
        included(self.names(), name)
    }

    pub fn includes_field(&self, field: Field) -> bool {
        self.includes(field.name())
    }
}

impl From<&[Field]> for Fields {
    fn from(fields: &[Field]) -> Self {
        Fields::only(fields.iter().map(Field::name))
    }
}

/// True when `configured` is unset or lists `name` literally.
pub fn included<T: AsRef<str>>(configured: Option<&[T]>, name: &str) -> bool {
    match configured {
        None => true,
        Some(names) => names.iter().any(|n| n.as_ref() == name),
    }
}

pub struct FieldsBuilder {
    fields: Vec<Cow<'static, str>>,
}

impl FieldsBuilder {
    pub fn new() -> Self {
        FieldsBuilder { fields: Vec::new() }
    }

    pub fn build(self) -> Fields {
        Fields(Some(self.fields))
    }

    fn with(mut self, field: Field) -> Self {
        let name = field.name();
        if !self.fields.iter().any(|f| f == name) {
            self.fields.push(Cow::Borrowed(name));
        }
        self
    }

    /// Adds a field by name. Names outside the catalog are kept but never emitted.
    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        let name = name.into();
        if !self.fields.contains(&name) {
            self.fields.push(name);
        }
        self
    }

    pub fn with_id(self) -> Self {
        self.with(Field::Id)
    }

    pub fn with_remote_ip(self) -> Self {
        self.with(Field::RemoteIp)
    }

    pub fn with_host(self) -> Self {
        self.with(Field::Host)
    }

    pub fn with_method(self) -> Self {
        self.with(Field::Method)
    }

    pub fn with_uri(self) -> Self {
        self.with(Field::Uri)
    }

    pub fn with_user_agent(self) -> Self {
        self.with(Field::UserAgent)
    }

    pub fn with_bytes_in(self) -> Self {
        self.with(Field::BytesIn)
    }

    pub fn with_status(self) -> Self {
        self.with(Field::Status)
    }

    pub fn with_error(self) -> Self {
        self.with(Field::Error)
    }

    pub fn with_latency(self) -> Self {
        self.with(Field::Latency)
    }

    pub fn with_latency_human(self) -> Self {
        self.with(Field::LatencyHuman)
    }

    pub fn with_bytes_out(self) -> Self {
        self.with(Field::BytesOut)
    }
}

impl Default for FieldsBuilder {
    fn default() -> Self {
        FieldsBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_includes_everything() {
        let fields = Fields::all();
        for field in RESPONSE_FIELDS {
            assert!(fields.includes_field(field));
        }
        assert!(fields.includes("anything"));
        assert!(included::<&str>(None, "whatever"));
    }

    #[test]
    fn test_set_includes_only_members() {
        let fields = Fields::only(["method", "uri"]);
        assert!(fields.includes("method"));
        assert!(fields.includes("uri"));
        assert!(!fields.includes("status"));
        assert!(!fields.includes("Method"));
        assert!(!fields.includes("meth"));
    }

    #[test]
    fn test_empty_set_includes_nothing() {
        let fields = Fields::only(Vec::<String>::new());
        for field in RESPONSE_FIELDS {
            assert!(!fields.includes_field(field));
        }
    }

    #[test]
    fn test_unknown_names_are_inert() {
        let fields = Fields::builder().with_name("referer").with_status().build();
        assert!(fields.includes_field(Field::Status));
        for field in RESPONSE_FIELDS.iter().filter(|f| **f != Field::Status) {
            assert!(!fields.includes_field(*field));
        }
    }

    #[test]
    fn test_builder_deduplicates() {
        let fields = Fields::builder()
            .with_method()
            .with_method()
            .with_name("method")
            .build();
        assert_eq!(fields.names().map(<[_]>::len), Some(1));
    }

    #[test]
    fn test_catalogs() {
        assert!(REQUEST_FIELDS.iter().all(|f| RESPONSE_FIELDS.contains(f)));
        assert!(Field::BytesIn.is_request_field());
        assert!(!Field::Status.is_request_field());
        let names: Vec<_> = RESPONSE_FIELDS.iter().map(Field::name).collect();
        assert_eq!(
            names,
            [
                "id",
                "remote_ip",
                "host",
                "method",
                "uri",
                "user_agent",
                "status",
                "error",
                "latency",
                "latency_human",
                "bytes_in",
                "bytes_out"
            ]
        );
    }

    #[test]
    fn test_from_slice() {
        let fields = Fields::from(&REQUEST_FIELDS[..]);
        assert!(fields.includes("bytes_in"));
        assert!(!fields.includes("status"));
    }

    #[test]
    fn test_deserialize() {
        let fields: Fields = serde_json::from_str(r#"["id", "status"]"#).unwrap();
        assert_eq!(fields, Fields::only(["id", "status"]));
        let fields: Fields = serde_json::from_str("null").unwrap();
        assert_eq!(fields, Fields::all());
    }
}
