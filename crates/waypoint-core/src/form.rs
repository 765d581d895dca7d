//! Structured form data
//!
//! [`FormData`] is the ordered field list produced by parsing a request
//! body and consumed when serializing a form-data response. Both
//! `application/x-www-form-urlencoded` and `multipart/form-data` are
//! understood; responses are always written as multipart.

use crate::error::RequestBodyError;
use bytes::{BufMut, Bytes, BytesMut};

/// Value of a single form field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    Text(String),
    File {
        file_name: String,
        content_type: Option<String>,
        data: Bytes,
    },
}

impl FormValue {
    /// Text content, if this is a plain text field
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FormValue::Text(text) => Some(text),
            FormValue::File { .. } => None,
        }
    }

    /// Raw bytes of the value
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FormValue::Text(text) => text.as_bytes(),
            FormValue::File { data, .. } => data,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, FormValue::File { .. })
    }
}

/// Ordered collection of named form fields
///
/// Repeated names are kept; [`get`](FormData::get) returns the first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    fields: Vec<(String, FormValue)>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text field
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), FormValue::Text(value.into())));
        self
    }

    /// Append a file field
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: Option<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        self.fields.push((
            name.into(),
            FormValue::File {
                file_name: file_name.into(),
                content_type,
                data: data.into(),
            },
        ));
        self
    }

    pub fn append(&mut self, name: impl Into<String>, value: FormValue) {
        self.fields.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&FormValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FormValue> + 'a {
        self.fields
            .iter()
            .filter(move |(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FormValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parse an urlencoded body
    pub fn parse_urlencoded(body: &[u8]) -> Result<Self, RequestBodyError> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body)
            .map_err(|err| RequestBodyError::InvalidForm(err.to_string()))?;
        Ok(Self {
            fields: pairs
                .into_iter()
                .map(|(name, value)| (name, FormValue::Text(value)))
                .collect(),
        })
    }

    /// Parse a multipart body delimited by `boundary`
    pub fn parse_multipart(body: &[u8], boundary: &str) -> Result<Self, RequestBodyError> {
        let delimiter = format!("--{}", boundary);
        let delimiter = delimiter.as_bytes();
        let mut form = FormData::new();

        let mut cursor = match find(body, delimiter) {
            Some(pos) => pos + delimiter.len(),
            None => {
                return Err(RequestBodyError::InvalidForm(
                    "multipart boundary not found".to_string(),
                ))
            }
        };

        loop {
            let rest = &body[cursor..];
            if rest.starts_with(b"--") {
                return Ok(form);
            }
            let rest = strip_line_break(rest);
            let end = find(rest, delimiter).ok_or_else(|| {
                RequestBodyError::InvalidForm("unterminated multipart body".to_string())
            })?;
            let part = &rest[..end];
            form.fields.push(parse_part(part)?);
            cursor = body.len() - rest.len() + end + delimiter.len();
        }
    }

    /// Encode as a multipart body using `boundary`
    pub fn encode_multipart(&self, boundary: &str) -> Bytes {
        let mut buf = BytesMut::new();
        for (name, value) in &self.fields {
            buf.put_slice(format!("--{}\r\n", boundary).as_bytes());
            match value {
                FormValue::Text(text) => {
                    buf.put_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                            escape_quoted(name)
                        )
                        .as_bytes(),
                    );
                    buf.put_slice(text.as_bytes());
                }
                FormValue::File {
                    file_name,
                    content_type,
                    data,
                } => {
                    buf.put_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                            escape_quoted(name),
                            escape_quoted(file_name)
                        )
                        .as_bytes(),
                    );
                    let content_type = content_type
                        .as_deref()
                        .unwrap_or("application/octet-stream");
                    buf.put_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
                    buf.put_slice(data);
                }
            }
            buf.put_slice(b"\r\n");
        }
        buf.put_slice(format!("--{}--\r\n", boundary).as_bytes());
        buf.freeze()
    }
}

/// Extract the boundary parameter from a multipart Content-Type
pub(crate) fn extract_boundary(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        part.trim()
            .strip_prefix("boundary=")
            .map(|boundary| boundary.trim_matches('"').to_string())
    })
}

/// Fresh boundary for an outgoing multipart body
pub(crate) fn new_boundary() -> String {
    format!("waypoint-{}", uuid::Uuid::new_v4().simple())
}

fn parse_part(part: &[u8]) -> Result<(String, FormValue), RequestBodyError> {
    let (head, data) = match find(part, b"\r\n\r\n") {
        Some(pos) => (&part[..pos], &part[pos + 4..]),
        None => match find(part, b"\n\n") {
            Some(pos) => (&part[..pos], &part[pos + 2..]),
            None => {
                return Err(RequestBodyError::InvalidForm(
                    "multipart part without headers".to_string(),
                ))
            }
        },
    };
    // the line break before the next delimiter belongs to the delimiter
    let data = data
        .strip_suffix(b"\r\n")
        .or_else(|| data.strip_suffix(b"\n"))
        .unwrap_or(data);

    let head = std::str::from_utf8(head)?;
    let mut name = None;
    let mut file_name = None;
    let mut content_type = None;

    for line in head.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "content-disposition" => {
                for param in value.split(';').map(str::trim) {
                    if let Some(v) = param.strip_prefix("name=") {
                        name = Some(v.trim_matches('"').to_string());
                    } else if let Some(v) = param.strip_prefix("filename=") {
                        file_name = Some(v.trim_matches('"').to_string());
                    }
                }
            }
            "content-type" => content_type = Some(value.to_string()),
            _ => {}
        }
    }

    let name = name.ok_or_else(|| {
        RequestBodyError::InvalidForm("multipart part without a field name".to_string())
    })?;
    let value = match file_name {
        Some(file_name) => FormValue::File {
            file_name,
            content_type,
            data: Bytes::copy_from_slice(data),
        },
        None => FormValue::Text(std::str::from_utf8(data)?.to_string()),
    };
    Ok((name, value))
}

fn strip_line_break(bytes: &[u8]) -> &[u8] {
    bytes
        .strip_prefix(b"\r\n")
        .or_else(|| bytes.strip_prefix(b"\n"))
        .unwrap_or(bytes)
}

fn escape_quoted(value: &str) -> String {
    value.replace('"', "%22")
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
