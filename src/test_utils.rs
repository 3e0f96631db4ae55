pub mod test_helpers {
    use std::fmt::Write;
    use std::sync::Arc;

    use crate::pdf::backend::synthetic::HEADER;

    /// Builder for documents understood by the synthetic backend
    #[derive(Clone, Debug)]
    pub struct SyntheticDoc {
        text: String,
    }

    impl Default for SyntheticDoc {
        fn default() -> Self {
            Self::new()
        }
    }

    impl SyntheticDoc {
        pub fn new() -> Self {
            Self {
                text: format!("{HEADER}\n"),
            }
        }

        fn line(mut self, width: f32, height: f32, suffix: &str) -> Self {
            let _ = writeln!(self.text, "{width}x{height}{suffix}");
            self
        }

        /// Add an unrotated page
        pub fn page(self, width: f32, height: f32) -> Self {
            self.line(width, height, "")
        }

        /// Add a page with an intrinsic rotation
        pub fn rotated_page(self, width: f32, height: f32, degrees: i32) -> Self {
            self.line(width, height, &format!("@{degrees}"))
        }

        /// Add a page whose renders always fail
        pub fn failing_page(self, width: f32, height: f32) -> Self {
            self.line(width, height, "!fail")
        }

        /// Add a page whose renders panic inside the engine
        pub fn panicking_page(self, width: f32, height: f32) -> Self {
            self.line(width, height, "!panic")
        }

        /// Add a page that takes `millis` to render
        pub fn slow_page(self, width: f32, height: f32, millis: u64) -> Self {
            self.line(width, height, &format!("~{millis}"))
        }

        /// Add `count` identical unrotated pages
        pub fn pages(self, count: usize, width: f32, height: f32) -> Self {
            (0..count).fold(self, |doc, _| doc.page(width, height))
        }

        pub fn as_str(&self) -> &str {
            &self.text
        }

        pub fn to_vec(&self) -> Vec<u8> {
            self.text.clone().into_bytes()
        }

        pub fn into_bytes(self) -> Arc<[u8]> {
            Arc::from(self.text.into_bytes())
        }
    }

    /// Portrait A4 pages, as produced by most office exports
    pub fn portrait_doc(pages: usize) -> SyntheticDoc {
        SyntheticDoc::new().pages(pages, 595.28, 841.89)
    }

    /// A landscape A4 page followed by a portrait Letter page
    pub fn mixed_doc() -> SyntheticDoc {
        SyntheticDoc::new().page(841.89, 595.28).page(612.0, 792.0)
    }
}
