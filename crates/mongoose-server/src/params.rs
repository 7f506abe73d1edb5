//! Request parameter bag
//!
//! Operations care whether their parameters came from a form body or from a
//! query string, so the bag remembers its source.

use bson::Document;
use mongoose_common::{GatewayError, Result};
use std::str::FromStr;

/// How the parameters reached the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSource {
    /// `application/x-www-form-urlencoded` POST body
    Form,
    /// URL query string
    Query,
}

impl ParamSource {
    /// Name of the HTTP method that produces this source
    pub fn method(self) -> &'static str {
        match self {
            ParamSource::Form => "POST",
            ParamSource::Query => "GET",
        }
    }
}

/// Decoded request parameters; a name may repeat, reads take the first value
#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    source: ParamSource,
    values: Vec<(String, String)>,
}

impl Params {
    pub fn new(source: ParamSource) -> Self {
        Self {
            source,
            values: Vec::new(),
        }
    }

    /// Parameters from a URL query string
    pub fn from_query(query: Option<&str>) -> Self {
        let mut params = Self::new(ParamSource::Query);
        params.extend_urlencoded(query.unwrap_or_default().as_bytes());
        params
    }

    /// Parameters from a form body, followed by any query-string values
    pub fn from_form(body: &[u8], query: Option<&str>) -> Self {
        let mut params = Self::new(ParamSource::Form);
        params.extend_urlencoded(body);
        params.extend_urlencoded(query.unwrap_or_default().as_bytes());
        params
    }

    fn extend_urlencoded(&mut self, input: &[u8]) {
        self.values.extend(
            url::form_urlencoded::parse(input).map(|(k, v)| (k.into_owned(), v.into_owned())),
        );
    }

    /// Append a value
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.push((name.into(), value.into()));
    }

    /// Builder form of [`Params::push`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    pub fn source(&self) -> ParamSource {
        self.source
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// First value given for `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Truthiness of a flag: absent, empty, `0`, `false`, `no` and `off` are false
    pub fn flag(&self, name: &str) -> bool {
        match self.get(name) {
            None => false,
            Some(value) => {
                let value = value.trim();
                !(value.is_empty()
                    || value == "0"
                    || value.eq_ignore_ascii_case("false")
                    || value.eq_ignore_ascii_case("no")
                    || value.eq_ignore_ascii_case("off"))
            }
        }
    }

    /// Parse a numeric parameter, `None` when absent
    pub fn number<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| GatewayError::InvalidNumber {
                    field: name.to_string(),
                    value: value.to_string(),
                }),
        }
    }

    /// Decode a JSON document parameter, `None` when absent
    pub fn document(&self, name: &str) -> Result<Option<Document>> {
        self.get(name).map(mongoose_mongodb::decode).transpose()
    }

    /// Decode a JSON document parameter that must be present
    pub fn require_document(&self, name: &str) -> Result<Document> {
        self.document(name)?
            .ok_or_else(|| GatewayError::MissingField(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_from_query() {
        let params = Params::from_query(Some("criteria=%7B%22a%22%3A1%7D&batch_size=2"));
        assert_eq!(params.source(), ParamSource::Query);
        assert_eq!(params.get("criteria"), Some(r#"{"a":1}"#));
        assert_eq!(params.get("batch_size"), Some("2"));
        assert!(!params.contains("skip"));
    }

    #[test]
    fn test_from_query_empty() {
        let params = Params::from_query(None);
        assert_eq!(params.source(), ParamSource::Query);
        assert!(params.get("anything").is_none());
    }

    #[test]
    fn test_from_form_body_before_query() {
        let params = Params::from_form(b"name=body&docs=%7B%7D", Some("name=query&safe=1"));
        assert_eq!(params.source(), ParamSource::Form);
        assert_eq!(params.get("name"), Some("body"));
        assert_eq!(params.get("docs"), Some("{}"));
        assert_eq!(params.get("safe"), Some("1"));
    }

    #[test]
    fn test_plus_decodes_to_space() {
        let params = Params::from_form(b"server=db1%3A27018&msg=a+b", None);
        assert_eq!(params.get("server"), Some("db1:27018"));
        assert_eq!(params.get("msg"), Some("a b"));
    }

    #[test]
    fn test_flag() {
        let params = Params::new(ParamSource::Form)
            .with("a", "1")
            .with("b", "true")
            .with("c", "0")
            .with("d", "False")
            .with("e", "")
            .with("f", "off")
            .with("g", "no")
            .with("h", "yes");

        assert!(params.flag("a"));
        assert!(params.flag("b"));
        assert!(!params.flag("c"));
        assert!(!params.flag("d"));
        assert!(!params.flag("e"));
        assert!(!params.flag("f"));
        assert!(!params.flag("g"));
        assert!(params.flag("h"));
        assert!(!params.flag("missing"));
    }

    #[test]
    fn test_number() {
        let params = Params::new(ParamSource::Query)
            .with("limit", "10")
            .with("skip", "ten");

        assert_eq!(params.number::<i64>("limit"), Ok(Some(10)));
        assert_eq!(params.number::<i64>("missing"), Ok(None));
        assert_eq!(
            params.number::<u64>("skip"),
            Err(GatewayError::InvalidNumber {
                field: "skip".to_string(),
                value: "ten".to_string(),
            })
        );
    }

    #[test]
    fn test_document() {
        let params = Params::new(ParamSource::Form)
            .with("criteria", r#"{"a": 1}"#)
            .with("bad", "{nope");

        assert_eq!(params.document("criteria"), Ok(Some(doc! { "a": 1 })));
        assert_eq!(params.document("absent"), Ok(None));
        assert!(matches!(params.document("bad"), Err(GatewayError::Parse(_))));
        assert_eq!(
            params.require_document("newobj"),
            Err(GatewayError::MissingField("newobj".to_string()))
        );
    }
}
