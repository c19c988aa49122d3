//! Flattening of a serializable record into named form fields.
//!
//! The serialized field name doubles as a tag of the form
//! `name,opt1,opt2`: set it with `#[serde(rename = "q,omitempty")]`. A name
//! of `-` skips the field; the only option understood is `omitempty`, which
//! drops zero scalars (`0`, `0.0`, `false`, `""`) and empty sequences.
//!
//! Scalars become one field, sequences repeat the name once per element, and
//! byte sequences (`Vec<u8>`, `[u8; N]`, `serialize_bytes`) collapse into a
//! single raw value, even when empty. `None` is always skipped. [`FilePart`]
//! values are carried through for multipart encoding.

use crate::error::HttpError;
use bytes::Bytes;
use serde::Serialize;
use serde::ser::{self, Impossible, SerializeStruct};
use std::fmt::Display;
use std::path::PathBuf;

/// Struct name marking a [`FilePart`] to the field walker
const FILE_PART_TOKEN: &str = "$restkit::FilePart";

impl ser::Error for HttpError {
    fn custom<T: Display>(msg: T) -> Self {
        HttpError::Encode(msg.to_string())
    }
}

/// Where the contents of a file part come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// Read asynchronously while encoding
    Path(PathBuf),
    Bytes(Bytes),
}

/// A file upload field for multipart payloads.
///
/// ```ignore
/// #[derive(Serialize)]
/// struct Upload {
///     purpose: String,
///     file: FilePart,
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    file_name: String,
    source: FileSource,
}

impl FilePart {
    /// A file on disk; the part's file name is the path's last component.
    #[must_use]
    pub fn path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            file_name,
            source: FileSource::Path(path),
        }
    }

    /// In-memory contents sent under `file_name`.
    #[must_use]
    pub fn bytes(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            source: FileSource::Bytes(bytes.into()),
        }
    }

    /// Override the file name announced to the server.
    #[must_use]
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    #[must_use]
    pub fn source(&self) -> &FileSource {
        &self.source
    }
}

struct RawBytes<'a>(&'a [u8]);

impl Serialize for RawBytes<'_> {
    fn serialize<S: ser::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(self.0)
    }
}

impl Serialize for FilePart {
    fn serialize<S: ser::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct(FILE_PART_TOKEN, 2)?;
        state.serialize_field("file_name", &self.file_name)?;
        match &self.source {
            FileSource::Path(path) => state.serialize_field("path", &path.to_string_lossy())?,
            FileSource::Bytes(bytes) => state.serialize_field("bytes", &RawBytes(bytes))?,
        }
        state.end()
    }
}

/// Value of one flattened field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    /// A byte string, sent as is (not necessarily UTF-8)
    Bytes(Bytes),
    File(FilePart),
}

/// One `name=value` pair, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

/// Flatten `value` (a struct or a string-keyed map) into fields.
///
/// # Errors
/// `HttpError::Encode` for unsupported shapes: nested structs or maps,
/// nested sequences, enum variants carrying data, top-level scalars.
pub fn to_fields<T: Serialize + ?Sized>(value: &T) -> Result<Vec<Field>, HttpError> {
    value.serialize(RecordSerializer)
}

/// Intermediate result of serializing one field value.
enum Shape {
    Skip,
    Scalar { text: String, zero: bool },
    Byte(u8),
    Bytes(Vec<u8>),
    Seq(Vec<Shape>),
    File(FilePart),
}

fn scalar(text: impl ToString, zero: bool) -> Shape {
    Shape::Scalar {
        text: text.to_string(),
        zero,
    }
}

fn unsupported(what: &str) -> HttpError {
    HttpError::Encode(format!("{what} cannot be encoded as a form field"))
}

/// Split a tag into its name and whether `omitempty` is set.
fn parse_tag(tag: &str) -> (&str, bool) {
    let mut parts = tag.split(',');
    let name = parts.next().unwrap_or_default().trim();
    let omitempty = parts.any(|opt| opt.trim() == "omitempty");
    (name, omitempty)
}

fn push_field(
    fields: &mut Vec<Field>,
    name: &str,
    omitempty: bool,
    shape: Shape,
) -> Result<(), HttpError> {
    if name == "-" {
        return Ok(());
    }
    if name.is_empty() {
        return Err(HttpError::Encode("field with an empty name".to_owned()));
    }
    match shape {
        // omitempty on a sequence only concerns the sequence itself; an empty
        // sequence emits nothing either way
        Shape::Seq(items) => {
            for item in items {
                push_value(fields, name, false, item);
            }
        }
        other => push_value(fields, name, omitempty, other),
    }
    Ok(())
}

fn push_value(fields: &mut Vec<Field>, name: &str, omitempty: bool, shape: Shape) {
    let (value, zero) = match shape {
        Shape::Skip | Shape::Seq(_) => return,
        Shape::File(part) => (FieldValue::File(part), false),
        Shape::Scalar { text, zero } => (FieldValue::Text(text), zero),
        Shape::Byte(b) => (FieldValue::Text(b.to_string()), b == 0),
        Shape::Bytes(bytes) => {
            let zero = bytes.is_empty();
            (FieldValue::Bytes(Bytes::from(bytes)), zero)
        }
    };
    if omitempty && zero {
        return;
    }
    fields.push(Field {
        name: name.to_owned(),
        value,
    });
}

/// Whether `T` is a plain byte container (`Vec<u8>`, `[u8]`, `[u8; N]`),
/// possibly behind references or `Option`.
///
/// Serde gives an empty `Vec<u8>` the same shape as any other empty
/// sequence, so the declared type decides whether it is an empty value or
/// no value at all.
fn is_byte_string<T: ?Sized>() -> bool {
    let mut name = std::any::type_name::<T>();
    loop {
        if let Some(inner) = name.strip_prefix('&') {
            name = inner.trim_start_matches("mut ");
        } else if let Some(inner) = name
            .strip_prefix("core::option::Option<")
            .and_then(|rest| rest.strip_suffix('>'))
        {
            name = inner;
        } else {
            break;
        }
    }
    name == "alloc::vec::Vec<u8>" || name == "[u8]" || name.starts_with("[u8; ")
}

/// Top-level serializer: accepts structs and string-keyed maps.
struct RecordSerializer;

/// Collects the fields of the top-level record.
struct RecordFields {
    fields: Vec<Field>,
    key: Option<String>,
}

impl RecordFields {
    fn new() -> Self {
        Self {
            fields: Vec::new(),
            key: None,
        }
    }
}

macro_rules! reject {
    ($($method:ident($($arg:ty),*)),* $(,)?) => {
        $(
            fn $method(self, $(_: $arg),*) -> Result<Self::Ok, Self::Error> {
                Err(unsupported(concat!("top-level ", stringify!($method))))
            }
        )*
    };
}

impl ser::Serializer for RecordSerializer {
    type Ok = Vec<Field>;
    type Error = HttpError;
    type SerializeSeq = Impossible<Vec<Field>, HttpError>;
    type SerializeTuple = Impossible<Vec<Field>, HttpError>;
    type SerializeTupleStruct = Impossible<Vec<Field>, HttpError>;
    type SerializeTupleVariant = Impossible<Vec<Field>, HttpError>;
    type SerializeMap = RecordFields;
    type SerializeStruct = RecordFields;
    type SerializeStructVariant = Impossible<Vec<Field>, HttpError>;

    reject! {
        serialize_bool(bool),
        serialize_i8(i8),
        serialize_i16(i16),
        serialize_i32(i32),
        serialize_i64(i64),
        serialize_u8(u8),
        serialize_u16(u16),
        serialize_u32(u32),
        serialize_u64(u64),
        serialize_f32(f32),
        serialize_f64(f64),
        serialize_char(char),
        serialize_str(&str),
        serialize_bytes(&[u8]),
        serialize_unit_variant(&'static str, u32, &'static str),
    }

    fn serialize_none(self) -> Result<Self::Ok, Self::Error> {
        Ok(Vec::new())
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Self::Ok, Self::Error> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Self::Ok, Self::Error> {
        Ok(Vec::new())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Self::Ok, Self::Error> {
        Ok(Vec::new())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Self::Ok, Self::Error> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<Self::Ok, Self::Error> {
        Err(unsupported("an enum variant"))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        Err(unsupported("a top-level sequence"))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, Self::Error> {
        Err(unsupported("a top-level tuple"))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, Self::Error> {
        Err(unsupported("a top-level tuple struct"))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        Err(unsupported("an enum variant"))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        Ok(RecordFields::new())
    }

    fn serialize_struct(
        self,
        name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, Self::Error> {
        if name == FILE_PART_TOKEN {
            return Err(unsupported("a bare file part"));
        }
        Ok(RecordFields::new())
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        Err(unsupported("an enum variant"))
    }
}

impl ser::SerializeStruct for RecordFields {
    type Ok = Vec<Field>;
    type Error = HttpError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        let (name, omitempty) = parse_tag(key);
        if name == "-" {
            return Ok(());
        }
        let shape = value.serialize(ValueSerializer::field::<T>())?;
        push_field(&mut self.fields, name, omitempty, shape)
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        Ok(self.fields)
    }
}

impl ser::SerializeMap for RecordFields {
    type Ok = Vec<Field>;
    type Error = HttpError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), Self::Error> {
        let key = match key.serialize(ValueSerializer::default())? {
            Shape::Scalar { text, .. } => text,
            Shape::Byte(b) => b.to_string(),
            _ => return Err(unsupported("a non-scalar map key")),
        };
        self.key = Some(key);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        let key = self
            .key
            .take()
            .ok_or_else(|| HttpError::Encode("map value without a key".to_owned()))?;
        let shape = value.serialize(ValueSerializer::field::<T>())?;
        push_field(&mut self.fields, &key, false, shape)
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        Ok(self.fields)
    }
}

/// Serializer for a single field value.
#[derive(Default)]
struct ValueSerializer {
    /// An empty sequence is an empty byte string, not an absent value
    byte_string: bool,
}

impl ValueSerializer {
    fn field<T: ?Sized>() -> Self {
        Self {
            byte_string: is_byte_string::<T>(),
        }
    }
}

impl ser::Serializer for ValueSerializer {
    type Ok = Shape;
    type Error = HttpError;
    type SerializeSeq = SeqShape;
    type SerializeTuple = SeqShape;
    type SerializeTupleStruct = SeqShape;
    type SerializeTupleVariant = Impossible<Shape, HttpError>;
    type SerializeMap = Impossible<Shape, HttpError>;
    type SerializeStruct = FilePartShape;
    type SerializeStructVariant = Impossible<Shape, HttpError>;

    fn serialize_bool(self, v: bool) -> Result<Shape, HttpError> {
        Ok(scalar(v, !v))
    }

    fn serialize_i8(self, v: i8) -> Result<Shape, HttpError> {
        Ok(scalar(v, v == 0))
    }

    fn serialize_i16(self, v: i16) -> Result<Shape, HttpError> {
        Ok(scalar(v, v == 0))
    }

    fn serialize_i32(self, v: i32) -> Result<Shape, HttpError> {
        Ok(scalar(v, v == 0))
    }

    fn serialize_i64(self, v: i64) -> Result<Shape, HttpError> {
        Ok(scalar(v, v == 0))
    }

    fn serialize_i128(self, v: i128) -> Result<Shape, HttpError> {
        Ok(scalar(v, v == 0))
    }

    fn serialize_u8(self, v: u8) -> Result<Shape, HttpError> {
        Ok(Shape::Byte(v))
    }

    fn serialize_u16(self, v: u16) -> Result<Shape, HttpError> {
        Ok(scalar(v, v == 0))
    }

    fn serialize_u32(self, v: u32) -> Result<Shape, HttpError> {
        Ok(scalar(v, v == 0))
    }

    fn serialize_u64(self, v: u64) -> Result<Shape, HttpError> {
        Ok(scalar(v, v == 0))
    }

    fn serialize_u128(self, v: u128) -> Result<Shape, HttpError> {
        Ok(scalar(v, v == 0))
    }

    #[allow(clippy::float_cmp)]
    fn serialize_f32(self, v: f32) -> Result<Shape, HttpError> {
        Ok(scalar(v, v == 0.0))
    }

    #[allow(clippy::float_cmp)]
    fn serialize_f64(self, v: f64) -> Result<Shape, HttpError> {
        Ok(scalar(v, v == 0.0))
    }

    fn serialize_char(self, v: char) -> Result<Shape, HttpError> {
        Ok(scalar(v, false))
    }

    fn serialize_str(self, v: &str) -> Result<Shape, HttpError> {
        Ok(scalar(v, v.is_empty()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Shape, HttpError> {
        Ok(Shape::Bytes(v.to_vec()))
    }

    fn serialize_none(self) -> Result<Shape, HttpError> {
        Ok(Shape::Skip)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Shape, HttpError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Shape, HttpError> {
        Ok(Shape::Skip)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Shape, HttpError> {
        Ok(Shape::Skip)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Shape, HttpError> {
        Ok(scalar(variant, variant.is_empty()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Shape, HttpError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<Shape, HttpError> {
        Err(unsupported("an enum variant with data"))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqShape, HttpError> {
        Ok(SeqShape::new(len.unwrap_or_default(), self.byte_string))
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqShape, HttpError> {
        Ok(SeqShape::new(len, self.byte_string))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SeqShape, HttpError> {
        Ok(SeqShape::new(len, false))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, HttpError> {
        Err(unsupported("an enum variant with data"))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, HttpError> {
        Err(unsupported("a nested map"))
    }

    fn serialize_struct(self, name: &'static str, _len: usize) -> Result<FilePartShape, HttpError> {
        if name == FILE_PART_TOKEN {
            Ok(FilePartShape::default())
        } else {
            Err(unsupported(&format!("nested struct {name}")))
        }
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, HttpError> {
        Err(unsupported("an enum variant with data"))
    }
}

/// Elements of a sequence field.
struct SeqShape {
    items: Vec<Shape>,
    byte_string: bool,
}

impl SeqShape {
    fn new(len: usize, byte_string: bool) -> Self {
        Self {
            items: Vec::with_capacity(len),
            byte_string,
        }
    }

    fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), HttpError> {
        match value.serialize(ValueSerializer::default())? {
            Shape::Skip => {}
            Shape::Seq(_) => return Err(unsupported("a nested sequence")),
            shape => self.items.push(shape),
        }
        Ok(())
    }

    fn finish(self) -> Shape {
        if self.items.is_empty() {
            return if self.byte_string {
                Shape::Bytes(Vec::new())
            } else {
                Shape::Seq(self.items)
            };
        }
        let all_bytes = self.items.iter().all(|s| matches!(s, Shape::Byte(_)));
        if !all_bytes {
            return Shape::Seq(self.items);
        }
        let bytes = self
            .items
            .into_iter()
            .filter_map(|s| match s {
                Shape::Byte(b) => Some(b),
                _ => None,
            })
            .collect();
        Shape::Bytes(bytes)
    }
}

impl ser::SerializeSeq for SeqShape {
    type Ok = Shape;
    type Error = HttpError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), HttpError> {
        self.push(value)
    }

    fn end(self) -> Result<Shape, HttpError> {
        Ok(self.finish())
    }
}

impl ser::SerializeTuple for SeqShape {
    type Ok = Shape;
    type Error = HttpError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), HttpError> {
        self.push(value)
    }

    fn end(self) -> Result<Shape, HttpError> {
        Ok(self.finish())
    }
}

impl ser::SerializeTupleStruct for SeqShape {
    type Ok = Shape;
    type Error = HttpError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), HttpError> {
        self.push(value)
    }

    fn end(self) -> Result<Shape, HttpError> {
        Ok(self.finish())
    }
}

/// Reassembles a [`FilePart`] from its serialized fields.
#[derive(Default)]
struct FilePartShape {
    file_name: String,
    source: Option<FileSource>,
}

impl ser::SerializeStruct for FilePartShape {
    type Ok = Shape;
    type Error = HttpError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), HttpError> {
        let shape = value.serialize(ValueSerializer::default())?;
        match (key, shape) {
            ("file_name", Shape::Scalar { text, .. }) => self.file_name = text,
            ("path", Shape::Scalar { text, .. }) => {
                self.source = Some(FileSource::Path(PathBuf::from(text)));
            }
            ("bytes", Shape::Bytes(bytes)) => {
                self.source = Some(FileSource::Bytes(Bytes::from(bytes)));
            }
            _ => return Err(unsupported(&format!("file part field {key}"))),
        }
        Ok(())
    }

    fn end(self) -> Result<Shape, HttpError> {
        let source = self
            .source
            .ok_or_else(|| HttpError::Encode("file part without contents".to_owned()))?;
        Ok(Shape::File(FilePart {
            file_name: self.file_name,
            source,
        }))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn text(name: &str, value: &str) -> Field {
        Field {
            name: name.to_owned(),
            value: FieldValue::Text(value.to_owned()),
        }
    }

    fn bytes(name: &str, value: &'static [u8]) -> Field {
        Field {
            name: name.to_owned(),
            value: FieldValue::Bytes(Bytes::from_static(value)),
        }
    }

    #[derive(Serialize)]
    struct Search {
        q: String,
        #[serde(rename = "page,omitempty")]
        page: u32,
        #[serde(rename = "tag")]
        tags: Vec<String>,
        #[serde(rename = "-")]
        internal: String,
        limit: Option<u32>,
        #[serde(rename = "exact,omitempty")]
        exact: bool,
        #[serde(rename = "empty,omitempty")]
        empty: Vec<String>,
    }

    #[test]
    fn test_struct_fields_in_order() {
        let fields = to_fields(&Search {
            q: "rust".to_owned(),
            page: 0,
            tags: vec!["a".to_owned(), "b".to_owned()],
            internal: "hidden".to_owned(),
            limit: None,
            exact: false,
            empty: Vec::new(),
        })
        .unwrap();
        assert_eq!(fields, vec![text("q", "rust"), text("tag", "a"), text("tag", "b")]);
    }

    #[test]
    fn test_omitempty_keeps_non_zero() {
        let fields = to_fields(&Search {
            q: String::new(),
            page: 3,
            tags: Vec::new(),
            internal: String::new(),
            limit: Some(10),
            exact: true,
            empty: Vec::new(),
        })
        .unwrap();
        assert_eq!(
            fields,
            vec![
                text("q", ""),
                text("page", "3"),
                text("limit", "10"),
                text("exact", "true"),
            ]
        );
    }

    #[test]
    fn test_byte_sequences_are_single_values() {
        #[derive(Serialize)]
        struct Blob {
            data: Vec<u8>,
            fixed: [u8; 2],
        }
        let fields = to_fields(&Blob {
            data: b"hi".to_vec(),
            fixed: [b'o', b'k'],
        })
        .unwrap();
        assert_eq!(fields, vec![bytes("data", b"hi"), bytes("fixed", b"ok")]);
    }

    #[test]
    fn test_byte_strings_keep_raw_bytes() {
        #[derive(Serialize)]
        struct Bin {
            data: Vec<u8>,
            empty: Vec<u8>,
            #[serde(rename = "gone,omitempty")]
            gone: Vec<u8>,
            maybe: Option<Vec<u8>>,
            names: Vec<String>,
        }
        let fields = to_fields(&Bin {
            data: vec![0xff, 0x41],
            empty: Vec::new(),
            gone: Vec::new(),
            maybe: Some(Vec::new()),
            names: Vec::new(),
        })
        .unwrap();
        assert_eq!(
            fields,
            vec![
                bytes("data", &[0xff, 0x41]),
                bytes("empty", b""),
                bytes("maybe", b""),
            ]
        );
    }

    #[test]
    fn test_is_byte_string() {
        assert!(is_byte_string::<Vec<u8>>());
        assert!(is_byte_string::<&[u8]>());
        assert!(is_byte_string::<[u8; 4]>());
        assert!(is_byte_string::<Option<Vec<u8>>>());
        assert!(!is_byte_string::<Vec<u16>>());
        assert!(!is_byte_string::<Vec<String>>());
        assert!(!is_byte_string::<String>());
    }

    #[test]
    fn test_string_keyed_map() {
        let mut map = BTreeMap::new();
        map.insert("b", vec!["2", "3"]);
        map.insert("a", vec!["1"]);
        let fields = to_fields(&map).unwrap();
        assert_eq!(fields, vec![text("a", "1"), text("b", "2"), text("b", "3")]);
    }

    #[test]
    fn test_file_parts_pass_through() {
        #[derive(Serialize)]
        struct Upload {
            purpose: &'static str,
            file: FilePart,
            attachments: Vec<FilePart>,
        }
        let file = FilePart::bytes("a.bin", vec![0u8, 159, 146, 150]);
        let other = FilePart::path("/tmp/report.pdf");
        assert_eq!(other.file_name(), "report.pdf");

        let fields = to_fields(&Upload {
            purpose: "test",
            file: file.clone(),
            attachments: vec![other.clone()],
        })
        .unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[1].value, FieldValue::File(file));
        assert_eq!(fields[2].value, FieldValue::File(other));
    }

    #[test]
    fn test_rejects_unsupported_shapes() {
        #[derive(Serialize)]
        struct Inner {
            x: u8,
        }
        #[derive(Serialize)]
        struct Outer {
            inner: Inner,
        }
        assert!(matches!(
            to_fields(&Outer { inner: Inner { x: 1 } }),
            Err(HttpError::Encode(_))
        ));
        assert!(matches!(to_fields(&42), Err(HttpError::Encode(_))));
        assert!(matches!(to_fields(&vec![1, 2]), Err(HttpError::Encode(_))));
    }

    #[test]
    fn test_unit_enum_variants_are_names() {
        #[derive(Serialize)]
        #[serde(rename_all = "lowercase")]
        enum Order {
            Asc,
        }
        #[derive(Serialize)]
        struct Sort {
            order: Order,
        }
        assert_eq!(
            to_fields(&Sort { order: Order::Asc }).unwrap(),
            vec![text("order", "asc")]
        );
    }
}
