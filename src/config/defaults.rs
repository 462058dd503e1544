//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

// ============================================================================
// Common Defaults
// ============================================================================

pub fn r#true() -> bool {
    true
}

pub fn r#false() -> bool {
    false
}

// ============================================================================
// [watch] Section Defaults
// ============================================================================

pub mod watch {
    use std::path::PathBuf;

    pub fn root() -> Option<PathBuf> {
        None
    }

    pub fn extension() -> String {
        "md".into()
    }

    pub fn settle_ms() -> u64 {
        300
    }

    pub fn stable_retries() -> usize {
        20
    }

    pub fn ignore_prefixes() -> Vec<String> {
        vec![".~".into()]
    }
}

// ============================================================================
// [upload] Section Defaults
// ============================================================================

pub mod upload {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    pub fn field() -> String {
        "file".into()
    }

    pub fn hosted_markers() -> Vec<String> {
        vec!["995120".into(), "jsdelivr".into(), "zshipu".into()]
    }

    /// One upload plus exactly one retry.
    pub fn max_attempts() -> usize {
        2
    }

    pub fn timeout_secs() -> u64 {
        60
    }

    pub fn temp_dir() -> Option<PathBuf> {
        None
    }

    /// CDN hosts that carry the real image format in a query parameter.
    pub fn format_params() -> BTreeMap<String, String> {
        BTreeMap::from([("qpic.cn".into(), "wx_fmt".into())])
    }
}

// ============================================================================
// [classify] Section Defaults
// ============================================================================

pub mod classify {
    use super::super::Signature;

    pub fn probe_bytes() -> usize {
        16
    }

    pub fn image_extensions() -> Vec<String> {
        [
            "jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "webp", "svg", "ico", "cur",
            "psd", "eps", "ai", "pcx", "tga", "exif", "fpx", "cdr", "pcd", "dxf", "ufo", "raw",
            "wmf", "emf", "flic", "avif", "heic", "pdf",
        ]
        .into_iter()
        .map(Into::into)
        .collect()
    }

    /// Version tag of the built-in signature table.
    pub fn signatures_version() -> String {
        "2".into()
    }

    /// Built-in magic-number table.
    ///
    /// Entries are checked in order; the first match wins.
    pub fn signatures() -> Vec<Signature> {
        vec![
            Signature::new("png", 0, b"\x89PNG\r\n\x1a\n"),
            Signature::new("jpg", 0, b"\xFF\xD8\xFF"),
            Signature::new("gif", 0, b"GIF87a"),
            Signature::new("gif", 0, b"GIF89a"),
            Signature::new("bmp", 0, b"BM"),
            Signature::new("tif", 0, b"II*\x00"),
            Signature::new("tif", 0, b"MM\x00*"),
            Signature::new("webp", 8, b"WEBP"),
            Signature::new("avif", 4, b"ftypavif"),
            Signature::new("heic", 4, b"ftypheic"),
            Signature::new("ico", 0, b"\x00\x00\x01\x00"),
            Signature::new("cur", 0, b"\x00\x00\x02\x00"),
            Signature::new("svg", 0, b"<svg"),
            Signature::new("pdf", 0, b"%PDF"),
            Signature::new("eps", 0, b"%!PS"),
            Signature::new("psd", 0, b"8BPS"),
        ]
    }
}

// ============================================================================
// [rewrite] Section Defaults
// ============================================================================

pub mod rewrite {
    pub fn redirect_base() -> String {
        "http://zshipu.com/t/index.html?url=".into()
    }
}

// ============================================================================
// [front_matter] Section Defaults
// ============================================================================

pub mod front_matter {
    pub fn clock_offset_hours() -> i64 {
        8
    }

    pub fn step_secs() -> i64 {
        60
    }
}

// ============================================================================
// [tagger] Section Defaults
// ============================================================================

pub mod tagger {
    use super::super::TaggerInput;

    pub fn endpoint() -> Option<String> {
        None
    }

    pub fn user() -> String {
        "md2article".into()
    }

    pub fn input() -> TaggerInput {
        TaggerInput::default()
    }

    pub fn max_attempts() -> usize {
        5
    }

    pub fn timeout_secs() -> u64 {
        30
    }

    pub fn rewrite_min_len() -> usize {
        300
    }
}
