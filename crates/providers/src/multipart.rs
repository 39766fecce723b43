//! Multipart form assembly for audio uploads.
//!
//! Only adapters that implement speech-to-text use this. Content type is
//! inferred from the uploaded file's extension.

use wh_domain::error::{Error, Result};

/// Map an audio file extension to its MIME type.
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "mp3" | "mpga" => "audio/mpeg",
        "mp4" | "m4a" => "audio/mp4",
        "wav" => "audio/wav",
        "webm" => "audio/webm",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        _ => "application/octet-stream",
    }
}

/// Build a transcription form: the audio file part plus the model and
/// optional language fields.
pub fn transcription_form(
    data: Vec<u8>,
    filename: &str,
    model: &str,
    language: Option<&str>,
) -> Result<reqwest::multipart::Form> {
    let part = reqwest::multipart::Part::bytes(data)
        .file_name(filename.to_string())
        .mime_str(content_type_for(filename))
        .map_err(|e| Error::request(format!("invalid audio content type: {e}")))?;

    let mut form = reqwest::multipart::Form::new()
        .part("file", part)
        .text("model", model.to_string());
    if let Some(language) = language {
        form = form.text("language", language.to_string());
    }
    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions_map_to_audio_types() {
        assert_eq!(content_type_for("clip.mp3"), "audio/mpeg");
        assert_eq!(content_type_for("clip.M4A"), "audio/mp4");
        assert_eq!(content_type_for("clip.wav"), "audio/wav");
        assert_eq!(content_type_for("clip.flac"), "audio/flac");
    }

    #[test]
    fn unknown_extension_is_octet_stream() {
        assert_eq!(content_type_for("clip.xyz"), "application/octet-stream");
        assert_eq!(content_type_for("no_extension"), "application/octet-stream");
    }

    #[test]
    fn form_builds_with_language() {
        let form = transcription_form(vec![1, 2, 3], "a.wav", "whisper-1", Some("en"));
        assert!(form.is_ok());
    }
}
