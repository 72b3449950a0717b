use regex::{Matches, Regex};
use std::iter::Peekable;
use std::sync::LazyLock;

/// Either the bilingual header or the plain English one. The bilingual
/// alternative comes first so it wins at the position where it starts.
static HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)LISTE D['’]ENVOI\s*/\s*PACKING LIST|PACKING LIST")
        .expect("section header pattern is valid")
});

/// Lazy iterator over packing-list sections. Each item starts at a header
/// and runs until the next header or the end of the text.
pub struct Sections<'t> {
    text: &'t str,
    headers: Peekable<Matches<'static, 't>>,
}

impl<'t> Iterator for Sections<'t> {
    type Item = &'t str;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.headers.next()?.start();
        let end = self
            .headers
            .peek()
            .map_or(self.text.len(), |next| next.start());
        Some(&self.text[start..end])
    }
}

/// Text before the first header is not part of any section.
pub fn split_sections(text: &str) -> Sections<'_> {
    Sections {
        text,
        headers: HEADER.find_iter(text).peekable(),
    }
}
