use crate::FlowError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Longest string rendered by the `Display` implementation
pub const MAX_STRING_LENGTH: usize = 1024 * 10;

/// HTTP-style status codes carried by envelopes
pub mod status {
    pub const OK: u16 = 200;
    pub const BAD_REQUEST: u16 = 400;
    pub const NOT_FOUND: u16 = 404;
    pub const CONFLICT: u16 = 409;
    pub const EXPECTATION_FAILED: u16 = 417;
    pub const INTERNAL_SERVER_ERROR: u16 = 500;
    pub const SERVICE_UNAVAILABLE: u16 = 503;
    pub const GATEWAY_TIMEOUT: u16 = 504;
}

/// Payload of an output envelope
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Empty,
    Error(String),
    Plain(String),
    Bytes(Vec<u8>),
    Integer(i64),
    Float(f64),
    Object(serde_json::Value),
    /// Outputs of a whole flow, keyed by step name
    Outputs(BTreeMap<String, OperatorIO>),
}

/// Input and output of an operator. Once created it is not modified.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorIO {
    output: Output,
    status: u16,
    content_type: Option<String>,
}

impl OperatorIO {
    fn ok(output: Output) -> Self {
        Self {
            output,
            status: status::OK,
            content_type: None,
        }
    }

    pub fn empty() -> Self {
        Self::ok(Output::Empty)
    }

    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self {
            output: Output::Error(message.into()),
            status: code,
            content_type: None,
        }
    }

    pub fn from_error(err: &FlowError) -> Self {
        Self::error(err.status_code(), err.to_string())
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self::ok(Output::Plain(text.into()))
    }

    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::ok(Output::Bytes(data.into()))
    }

    pub fn bytes_with_content_type(data: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
            ..Self::bytes(data)
        }
    }

    pub fn integer(value: i64) -> Self {
        Self::ok(Output::Integer(value))
    }

    pub fn float(value: f64) -> Self {
        Self::ok(Output::Float(value))
    }

    pub fn object(value: serde_json::Value) -> Self {
        Self::ok(Output::Object(value))
    }

    /// Serializes `value` into an object envelope, or an error envelope if that fails
    pub fn object_from<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(v) => Self::object(v),
            Err(e) => Self::error(
                status::INTERNAL_SERVER_ERROR,
                format!("Cannot serialize output: {}", e),
            ),
        }
    }

    pub fn outputs(outputs: BTreeMap<String, OperatorIO>) -> Self {
        Self::ok(Output::Outputs(outputs))
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    pub fn status_code(&self) -> u16 {
        self.status
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn kind(&self) -> &'static str {
        match &self.output {
            Output::Empty => "empty",
            Output::Error(_) => "error",
            Output::Plain(_) => "plain",
            Output::Bytes(_) => "bytes",
            Output::Integer(_) => "integer",
            Output::Float(_) => "float",
            Output::Object(_) => "object",
            Output::Outputs(_) => "outputs",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.output, Output::Error(_))
    }

    /// True for the error used to mark a step that was intentionally not run
    pub fn is_expectation_failed(&self) -> bool {
        self.is_error() && self.status == status::EXPECTATION_FAILED
    }

    pub fn is_empty(&self) -> bool {
        match &self.output {
            Output::Empty => true,
            Output::Plain(s) => s.is_empty(),
            Output::Bytes(b) => b.is_empty(),
            _ => false,
        }
    }

    pub fn is_plain(&self) -> bool {
        matches!(self.output, Output::Plain(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self.output, Output::Object(_) | Output::Outputs(_))
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.output {
            Output::Error(msg) => Some(msg),
            _ => None,
        }
    }

    /// Step outputs if this envelope is the map result of a flow
    pub fn as_outputs(&self) -> Option<&BTreeMap<String, OperatorIO>> {
        match &self.output {
            Output::Outputs(map) => Some(map),
            _ => None,
        }
    }

    /// String form of the payload; structured payloads are rendered as pretty JSON
    pub fn get_string(&self) -> String {
        match &self.output {
            Output::Empty => String::new(),
            Output::Error(msg) => msg.clone(),
            Output::Plain(s) => s.clone(),
            Output::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            Output::Integer(i) => i.to_string(),
            Output::Float(f) => f.to_string(),
            Output::Object(_) | Output::Outputs(_) => {
                serde_json::to_string_pretty(&self.to_json()).unwrap_or_default()
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match &self.output {
            Output::Empty => Value::Null,
            Output::Error(msg) => serde_json::json!({ "error": msg, "status": self.status }),
            Output::Plain(s) => Value::String(s.clone()),
            Output::Bytes(b) => serde_json::from_slice(b)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(b).into_owned())),
            Output::Integer(i) => Value::from(*i),
            Output::Float(f) => Value::from(*f),
            Output::Object(v) => v.clone(),
            Output::Outputs(map) => Value::Object(
                map.iter()
                    .map(|(name, io)| (name.clone(), io.to_json()))
                    .collect(),
            ),
        }
    }

    /// Flat string map of the payload, used for variable interpolation and `argumentsFrom`
    pub fn get_args_map(&self) -> Result<BTreeMap<String, String>, FlowError> {
        let mut map = BTreeMap::new();
        match &self.output {
            Output::Empty => return Ok(map),
            Output::Outputs(outputs) => {
                for (name, io) in outputs {
                    map.insert(name.clone(), io.get_string());
                }
                return Ok(map);
            }
            Output::Object(serde_json::Value::Object(obj)) => {
                flatten_into(&mut map, "", obj);
                return Ok(map);
            }
            Output::Plain(s) => {
                if let Ok(serde_json::Value::Object(obj)) = serde_json::from_str(s) {
                    flatten_into(&mut map, "", &obj);
                    return Ok(map);
                }
            }
            Output::Bytes(b) => {
                if let Ok(serde_json::Value::Object(obj)) = serde_json::from_slice(b) {
                    flatten_into(&mut map, "", &obj);
                    return Ok(map);
                }
            }
            _ => {}
        }
        Err(FlowError::Conversion(format!(
            "Output is not convertible to type map, type is {}",
            self.kind()
        )))
    }
}

impl Default for OperatorIO {
    fn default() -> Self {
        Self::empty()
    }
}

fn flatten_into(
    map: &mut BTreeMap<String, String>,
    prefix: &str,
    obj: &serde_json::Map<String, serde_json::Value>,
) {
    for (key, value) in obj {
        let full = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        flatten_value(map, full, value);
    }
}

fn flatten_value(map: &mut BTreeMap<String, String>, key: String, value: &serde_json::Value) {
    use serde_json::Value;
    match value {
        Value::Object(obj) => flatten_into(map, &key, obj),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                flatten_value(map, format!("{}.{}", key, i), item);
            }
        }
        Value::String(s) => {
            map.insert(key, s.clone());
        }
        Value::Null => {
            map.insert(key, String::new());
        }
        other => {
            map.insert(key, other.to_string());
        }
    }
}

impl fmt::Display for OperatorIO {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Output::Error(msg) = &self.output {
            return write!(f, "Error Code: {}, {}", self.status, msg);
        }
        if self.status != status::OK {
            write!(f, "HTTP Code: {}, ", self.status)?;
        }
        if self.is_empty() {
            return write!(f, "Empty Output");
        }
        if let Some(ct) = &self.content_type {
            write!(f, "Content Type: {}, ", ct)?;
        }
        let text = self.get_string();
        if text.len() > MAX_STRING_LENGTH {
            let mut end = MAX_STRING_LENGTH;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            write!(f, "{}...", &text[..end])
        } else {
            write!(f, "{}", text)
        }
    }
}

impl From<String> for OperatorIO {
    fn from(s: String) -> Self {
        OperatorIO::plain(s)
    }
}

impl From<&str> for OperatorIO {
    fn from(s: &str) -> Self {
        OperatorIO::plain(s)
    }
}

impl From<serde_json::Value> for OperatorIO {
    fn from(v: serde_json::Value) -> Self {
        OperatorIO::object(v)
    }
}
