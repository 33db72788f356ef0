use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use aihuman::session::SessionConfig;

pub const BOUNDARY: &str = "aihuman-test-boundary";

/// A valid base-tier session configuration
#[allow(dead_code)]
pub fn session_config() -> SessionConfig {
    SessionConfig {
        project_name: "Demo".to_string(),
        niche: "education".to_string(),
        avatar_id: "Anna_public_3_20240108".to_string(),
        knowledge_base: "You are a friendly tutor.".to_string(),
        language: "en".to_string(),
        emotion: "friendly".to_string(),
        ..SessionConfig::default()
    }
}

#[allow(dead_code)]
pub fn temp_file(name: &str, contents: &[u8]) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let path = temp_dir.path().join(name);
    fs::write(&path, contents).expect("failed to write file");
    (temp_dir, path)
}

/// One multipart field: name, optional file name, content
#[allow(dead_code)]
pub struct Field<'a> {
    pub name: &'a str,
    pub file_name: Option<&'a str>,
    pub data: &'a [u8],
}

/// Encodes `fields` as a `multipart/form-data` body delimited by [`BOUNDARY`]
#[allow(dead_code)]
pub fn multipart_body(fields: &[Field<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for field in fields {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match field.file_name {
            Some(file_name) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        field.name, file_name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", field.name)
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(field.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}
