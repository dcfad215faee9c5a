//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

pub fn r#true() -> bool {
    true
}

pub fn r#false() -> bool {
    false
}

// ============================================================================
// [site] Section Defaults
// ============================================================================

pub mod site {
    pub fn title() -> String {
        "My Blog".into()
    }

    pub fn url() -> Option<String> {
        None
    }

    pub fn language() -> String {
        "en".into()
    }
}

// ============================================================================
// [build] Section Defaults
// ============================================================================

pub mod build {
    use std::path::PathBuf;

    pub fn posts() -> PathBuf {
        "_posts".into()
    }

    pub fn layouts() -> PathBuf {
        "_layouts".into()
    }

    pub fn includes() -> PathBuf {
        "_includes".into()
    }

    pub fn assets() -> PathBuf {
        "assets".into()
    }

    pub fn output() -> PathBuf {
        "_site".into()
    }

    pub fn permalink() -> String {
        "pretty".into()
    }

    pub mod rss {
        use std::path::PathBuf;

        pub fn path() -> PathBuf {
            "feed.xml".into()
        }

        pub fn limit() -> usize {
            20
        }
    }
}
