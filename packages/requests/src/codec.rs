//! Body encoders: JSON, urlencoded form and multipart/form-data.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use serde::Serialize;

use crate::header::CONTENT_TYPE_MULTIPART;

/// Serialize a value as a JSON body.
pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(value)
}

/// Percent-encode pairs as `application/x-www-form-urlencoded`.
///
/// Keys come out sorted, one pair per key.
pub fn encode_form(pairs: &BTreeMap<String, String>) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// `Basic` credentials for an Authorization header.
pub fn basic_credentials(username: &str, password: &str) -> String {
    let encoded = BASE64_STANDARD.encode(format!("{}:{}", username, password));
    format!("Basic {}", encoded)
}

/// Incremental multipart/form-data encoder.
///
/// Parts are written into an in-memory buffer as they are added. The body is
/// not valid until [`MultipartWriter::finish`] appends the closing boundary.
#[derive(Debug)]
pub struct MultipartWriter {
    boundary: String,
    buffer: Vec<u8>,
    parts: usize,
}

impl MultipartWriter {
    pub fn new() -> Self {
        Self::with_boundary(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            buffer: Vec::new(),
            parts: 0,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Content-Type announcing this writer's boundary.
    pub fn content_type(&self) -> String {
        format!("{}; boundary={}", CONTENT_TYPE_MULTIPART, self.boundary)
    }

    pub fn part_count(&self) -> usize {
        self.parts
    }

    /// Add a file part, copying the reader to its end.
    pub fn write_file<R: Read + ?Sized>(
        &mut self,
        field_name: &str,
        file_name: &str,
        reader: &mut R,
    ) -> io::Result<u64> {
        self.begin_part(
            field_name,
            Some(file_name),
            Some("application/octet-stream"),
        )?;
        io::copy(reader, &mut self.buffer)
    }

    /// Add a plain text field.
    pub fn write_field(&mut self, field_name: &str, value: &str) -> io::Result<()> {
        self.begin_part(field_name, None, None)?;
        self.buffer.write_all(value.as_bytes())
    }

    /// Add a field whose content is streamed from a reader.
    pub fn write_stream_field<R: Read + ?Sized>(
        &mut self,
        field_name: &str,
        reader: &mut R,
    ) -> io::Result<u64> {
        self.begin_part(field_name, None, None)?;
        io::copy(reader, &mut self.buffer)
    }

    /// Append the closing boundary and return the complete body.
    pub fn finish(mut self) -> io::Result<Vec<u8>> {
        if self.parts > 0 {
            self.buffer.write_all(b"\r\n")?;
        }
        write!(self.buffer, "--{}--\r\n", self.boundary)?;
        Ok(self.buffer)
    }

    fn begin_part(
        &mut self,
        field_name: &str,
        file_name: Option<&str>,
        content_type: Option<&str>,
    ) -> io::Result<()> {
        if self.parts > 0 {
            self.buffer.write_all(b"\r\n")?;
        }
        write!(self.buffer, "--{}\r\n", self.boundary)?;
        write!(
            self.buffer,
            "Content-Disposition: form-data; name=\"{}\"",
            escape_quotes(field_name)
        )?;
        if let Some(file_name) = file_name {
            write!(self.buffer, "; filename=\"{}\"", escape_quotes(file_name))?;
        }
        self.buffer.write_all(b"\r\n")?;
        if let Some(content_type) = content_type {
            write!(self.buffer, "Content-Type: {}\r\n", content_type)?;
        }
        self.buffer.write_all(b"\r\n")?;
        self.parts += 1;
        Ok(())
    }
}

impl Default for MultipartWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_quotes(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
