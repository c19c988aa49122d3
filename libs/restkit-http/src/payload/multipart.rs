//! `multipart/form-data` encoding of flattened fields.

use super::fields::{Field, FieldValue, FileSource};
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use std::io;
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;

/// Size of the chunks file contents are sent in
pub(crate) const CHUNK_SIZE: usize = 64 * 1024;

/// A fresh random boundary (32 hex characters).
pub(crate) fn boundary() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

pub(crate) fn content_type(boundary: &str) -> String {
    format!("multipart/form-data; boundary={boundary}")
}

fn escape_quotes(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn text_head(boundary: &str, name: &str) -> String {
    format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n")
}

/// Destination of encoded chunks.
pub(crate) enum Output<'a> {
    Buffer(&'a mut BytesMut),
    Channel(&'a mpsc::Sender<io::Result<Bytes>>),
}

impl Output<'_> {
    async fn write(&mut self, chunk: Bytes) -> io::Result<()> {
        match self {
            Output::Buffer(buf) => {
                buf.extend_from_slice(&chunk);
                Ok(())
            }
            Output::Channel(tx) => tx.send(Ok(chunk)).await.map_err(|_| {
                io::Error::new(io::ErrorKind::BrokenPipe, "payload reader closed")
            }),
        }
    }
}

/// Write every field as a part, then the closing boundary.
pub(crate) async fn encode(
    fields: Vec<Field>,
    boundary: &str,
    out: &mut Output<'_>,
) -> io::Result<()> {
    for field in fields {
        let name = escape_quotes(&field.name);
        match field.value {
            FieldValue::Text(text) => {
                out.write(Bytes::from(text_head(boundary, &name))).await?;
                out.write(Bytes::from(text)).await?;
            }
            FieldValue::Bytes(bytes) => {
                out.write(Bytes::from(text_head(boundary, &name))).await?;
                out.write(bytes).await?;
            }
            FieldValue::File(part) => {
                let head = format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    escape_quotes(part.file_name())
                );
                out.write(Bytes::from(head)).await?;
                match part.source() {
                    FileSource::Path(path) => {
                        let file = tokio::fs::File::open(path).await.map_err(|e| {
                            io::Error::new(e.kind(), format!("{}: {e}", path.display()))
                        })?;
                        let mut chunks = ReaderStream::with_capacity(file, CHUNK_SIZE);
                        while let Some(chunk) = chunks.next().await {
                            out.write(chunk?).await?;
                        }
                    }
                    FileSource::Bytes(bytes) => {
                        let mut offset = 0;
                        while offset < bytes.len() {
                            let end = (offset + CHUNK_SIZE).min(bytes.len());
                            out.write(bytes.slice(offset..end)).await?;
                            offset = end;
                        }
                    }
                }
            }
        }
        out.write(Bytes::from_static(b"\r\n")).await?;
    }
    out.write(Bytes::from(format!("--{boundary}--\r\n"))).await
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::payload::FilePart;

    fn text(name: &str, value: &str) -> Field {
        Field {
            name: name.to_owned(),
            value: FieldValue::Text(value.to_owned()),
        }
    }

    #[test]
    fn test_boundary_is_random_hex() {
        let a = boundary();
        let b = boundary();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_encode_text_and_file() {
        let fields = vec![
            text("say \"hi\"", "hello"),
            Field {
                name: "upload".to_owned(),
                value: FieldValue::File(FilePart::bytes("a.txt", "contents")),
            },
        ];
        let mut buf = BytesMut::new();
        encode(fields, "XYZ", &mut Output::Buffer(&mut buf))
            .await
            .unwrap();

        let expected = concat!(
            "--XYZ\r\nContent-Disposition: form-data; name=\"say \\\"hi\\\"\"\r\n\r\nhello\r\n",
            "--XYZ\r\nContent-Disposition: form-data; name=\"upload\"; filename=\"a.txt\"\r\n",
            "Content-Type: application/octet-stream\r\n\r\ncontents\r\n",
            "--XYZ--\r\n",
        );
        assert_eq!(std::str::from_utf8(&buf).unwrap(), expected);
    }

    #[tokio::test]
    async fn test_missing_file_fails() {
        let fields = vec![Field {
            name: "f".to_owned(),
            value: FieldValue::File(FilePart::path("/definitely/not/here.bin")),
        }];
        let mut buf = BytesMut::new();
        let err = encode(fields, "b", &mut Output::Buffer(&mut buf))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
